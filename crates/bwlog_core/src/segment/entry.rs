//! The fixed-size log entry record.

use crate::codec::ByteCursor;
use crate::error::{CoreError, CoreResult};
use crate::types::LogTime;

/// One entry in an `entries.<suffix>` file.
///
/// Layout (little-endian, packed):
///
/// | Field         | Size |
/// |---------------|------|
/// | secs          | 8    |
/// | millis        | 2    |
/// | component_id  | 4    |
/// | priority      | 1    |
/// | string_offset | 4    |
/// | args_offset   | 4    |
/// | args_len      | 2    |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    /// When the writer accepted the message.
    pub time: LogTime,
    /// Sender id in the user's component registry.
    pub component_id: i32,
    /// Raw message priority.
    pub priority: u8,
    /// Offset of the format string in the `strings` catalog.
    pub string_offset: u32,
    /// Offset of the args blob in the segment's args file.
    pub args_offset: u32,
    /// Length of the args blob.
    pub args_len: u16,
}

impl LogEntry {
    /// Encoded size in bytes.
    pub const SIZE: usize = 25;

    /// Encodes to the on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&self.time.secs.to_le_bytes());
        out[8..10].copy_from_slice(&self.time.millis.to_le_bytes());
        out[10..14].copy_from_slice(&self.component_id.to_le_bytes());
        out[14] = self.priority;
        out[15..19].copy_from_slice(&self.string_offset.to_le_bytes());
        out[19..23].copy_from_slice(&self.args_offset.to_le_bytes());
        out[23..25].copy_from_slice(&self.args_len.to_le_bytes());
        out
    }

    /// Decodes an entry.
    ///
    /// # Errors
    ///
    /// Returns `SegmentCorruption` if `data` is short or the time is invalid.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let corrupt = |e| CoreError::segment_corruption(format!("log entry: {e}"));
        let mut cursor = ByteCursor::new(data);
        let secs = cursor.i64().map_err(corrupt)?;
        let millis = cursor.u16().map_err(corrupt)?;
        if millis >= 1000 {
            return Err(CoreError::segment_corruption(format!(
                "log entry millis {millis} out of range"
            )));
        }
        Ok(Self {
            time: LogTime { secs, millis },
            component_id: cursor.i32().map_err(corrupt)?,
            priority: cursor.u8().map_err(corrupt)?,
            string_offset: cursor.u32().map_err(corrupt)?,
            args_offset: cursor.u32().map_err(corrupt)?,
            args_len: cursor.u16().map_err(corrupt)?,
        })
    }

    /// Decodes only the time prefix.
    ///
    /// # Errors
    ///
    /// Returns `SegmentCorruption` if `data` is short.
    pub fn decode_time(data: &[u8]) -> CoreResult<LogTime> {
        let corrupt = |e| CoreError::segment_corruption(format!("log entry time: {e}"));
        let mut cursor = ByteCursor::new(data);
        let secs = cursor.i64().map_err(corrupt)?;
        let millis = cursor.u16().map_err(corrupt)?;
        Ok(LogTime { secs, millis })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_layout() {
        let entry = LogEntry {
            time: LogTime::new(0x0102_0304, 999),
            component_id: -1,
            priority: 4,
            string_offset: 77,
            args_offset: 1000,
            args_len: 12,
        };
        let bytes = entry.encode();
        assert_eq!(bytes.len(), 25);
        assert_eq!(&bytes[0..8], &0x0102_0304i64.to_le_bytes());
        assert_eq!(bytes[14], 4);
        assert_eq!(LogEntry::decode(&bytes).unwrap(), entry);
        assert_eq!(LogEntry::decode_time(&bytes[..10]).unwrap(), entry.time);
    }

    #[test]
    fn short_or_bad_entries() {
        assert!(LogEntry::decode(&[0u8; 24]).is_err());

        let mut bytes = LogEntry {
            time: LogTime::new(5, 0),
            component_id: 0,
            priority: 0,
            string_offset: 0,
            args_offset: 0,
            args_len: 0,
        }
        .encode();
        bytes[8..10].copy_from_slice(&5000u16.to_le_bytes());
        assert!(matches!(
            LogEntry::decode(&bytes),
            Err(CoreError::SegmentCorruption { .. })
        ));
    }
}
