//! Per-user logs: a directory of segments plus a component registry.

mod reader;
mod username;
mod writer;

pub(crate) use reader::read_uid;
pub use reader::{Extremity, UserLogReader};
pub use username::{resolve_username, PasswdResolver, UsernameResolver};
pub use writer::{EntryInput, UserLogWriter};

/// File holding the user's uid.
pub const UID_FILE: &str = "uid";
/// File holding the user's component records.
pub const COMPONENTS_FILE: &str = "components";
