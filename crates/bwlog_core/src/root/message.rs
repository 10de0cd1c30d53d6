//! The message handed to a root writer by the transport.

use crate::types::Address;

/// One raw log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Sender address.
    pub address: Address,
    /// Owning user.
    pub uid: u16,
    /// Sender process id.
    pub pid: i32,
    /// Wire protocol version of `args`.
    pub version: u8,
    /// Process type name, e.g. `cellapp`.
    pub component_name: String,
    /// Raw message priority.
    pub priority: u8,
    /// printf-style format text.
    pub format: String,
    /// Argument stream matching `format`.
    pub args: Vec<u8>,
}
