//! On-disk layout of a logging component.
//!
//! ```text
//! [record_len u32][ip u32][port u16][version u8][uid u16][pid i32][id i32]
//! [app_id i32][type_id i32][suffix_len u16][suffix][index u32]
//! ```
//!
//! `record_len` counts the bytes after itself. All fields little-endian.

use crate::codec::ByteCursor;
use crate::error::{CoreError, CoreResult};
use crate::types::{Address, EntryAddress};

/// Byte offset of `app_id` from the start of a record.
pub const APP_ID_OFFSET: u64 = 21;

const HEADER_SIZE: usize = 4;

/// What makes a sender the same sender across messages.
///
/// Any change for a known address (a restarted process, a new protocol
/// version) means a new component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentIdentity {
    /// Sender address.
    pub address: Address,
    /// Wire protocol version.
    pub version: u8,
    /// Owning user.
    pub uid: u16,
    /// Process id.
    pub pid: i32,
    /// Process type id in the component names catalog.
    pub type_id: u8,
}

/// A process that has logged to a user's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingComponent {
    /// Sender address.
    pub address: Address,
    /// Wire protocol version.
    pub version: u8,
    /// Owning user.
    pub uid: u16,
    /// Process id.
    pub pid: i32,
    /// Per-user id referenced by log entries.
    pub id: i32,
    /// Application instance id, 0 until assigned.
    pub app_id: i32,
    /// Process type id in the component names catalog.
    pub type_id: u8,
    /// Address of the component's first entry, once written.
    pub first_entry: Option<EntryAddress>,
    /// Offset of the record in the `components` file, once written.
    pub file_offset: Option<u64>,
}

impl LoggingComponent {
    /// Creates an in-memory component for `identity`.
    #[must_use]
    pub fn new(identity: &ComponentIdentity, id: i32) -> Self {
        Self {
            address: identity.address,
            version: identity.version,
            uid: identity.uid,
            pid: identity.pid,
            id,
            app_id: 0,
            type_id: identity.type_id,
            first_entry: None,
            file_offset: None,
        }
    }

    /// Returns the identity tuple.
    #[must_use]
    pub fn identity(&self) -> ComponentIdentity {
        ComponentIdentity {
            address: self.address,
            version: self.version,
            uid: self.uid,
            pid: self.pid,
            type_id: self.type_id,
        }
    }

    /// Encodes the full record including its length header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the first entry is not known yet.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let first = self.first_entry.as_ref().ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "component {} has no first entry to record",
                self.id
            ))
        })?;
        let suffix = first.suffix.as_bytes();
        let suffix_len = u16::try_from(suffix.len())
            .map_err(|_| CoreError::invalid_operation("segment suffix too long"))?;

        let mut body = Vec::with_capacity(31 + suffix.len());
        body.extend_from_slice(&self.address.ip.to_le_bytes());
        body.extend_from_slice(&self.address.port.to_le_bytes());
        body.push(self.version);
        body.extend_from_slice(&self.uid.to_le_bytes());
        body.extend_from_slice(&self.pid.to_le_bytes());
        body.extend_from_slice(&self.id.to_le_bytes());
        body.extend_from_slice(&self.app_id.to_le_bytes());
        body.extend_from_slice(&i32::from(self.type_id).to_le_bytes());
        body.extend_from_slice(&suffix_len.to_le_bytes());
        body.extend_from_slice(suffix);
        body.extend_from_slice(&first.index.to_le_bytes());

        let mut record = Vec::with_capacity(HEADER_SIZE + body.len());
        record.extend_from_slice(&(body.len() as u32).to_le_bytes());
        record.extend_from_slice(&body);
        Ok(record)
    }

    /// Decodes a record body (after the length header) found at `file_offset`.
    ///
    /// # Errors
    ///
    /// Returns `ComponentCorruption` if the body is truncated or malformed.
    pub fn decode(body: &[u8], file_offset: u64) -> CoreResult<Self> {
        let corrupt =
            |e| CoreError::component_corruption(format!("record at {file_offset}: {e}"));
        let mut cursor = ByteCursor::new(body);

        let ip = cursor.u32().map_err(corrupt)?;
        let port = cursor.u16().map_err(corrupt)?;
        let version = cursor.u8().map_err(corrupt)?;
        let uid = cursor.u16().map_err(corrupt)?;
        let pid = cursor.i32().map_err(corrupt)?;
        let id = cursor.i32().map_err(corrupt)?;
        let app_id = cursor.i32().map_err(corrupt)?;
        let type_id = cursor.i32().map_err(corrupt)?;
        let suffix_len = cursor.u16().map_err(corrupt)?;
        let suffix = cursor.take(usize::from(suffix_len)).map_err(corrupt)?;
        let index = cursor.u32().map_err(corrupt)?;

        let suffix = std::str::from_utf8(suffix).map_err(|_| {
            CoreError::component_corruption(format!("record at {file_offset}: suffix not utf-8"))
        })?;
        let type_id = u8::try_from(type_id).map_err(|_| {
            CoreError::component_corruption(format!(
                "record at {file_offset}: type id {type_id} out of range"
            ))
        })?;

        Ok(Self {
            address: Address::new(ip, port),
            version,
            uid,
            pid,
            id,
            app_id,
            type_id,
            first_entry: Some(EntryAddress::new(suffix, index)),
            file_offset: Some(file_offset),
        })
    }
}
