//! Builders for wire argument streams.
//!
//! Widths follow the current protocol version: `long` and pointers are
//! eight bytes, `int` four, `short` two, `char` one, floating point values
//! are doubles, and strings carry a packed length prefix.

use bwlog_core::put_packed_bytes;

/// Builds the argument bytes for one message.
#[derive(Debug, Clone, Default)]
pub struct ArgsBuilder {
    buf: Vec<u8>,
}

impl ArgsBuilder {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// A `%hhd`/`%c` argument.
    pub fn byte(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    /// A `%hd` argument.
    pub fn short(mut self, value: i16) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// A `%d`/`%u`/`%x` argument, or a `*` width.
    pub fn int(mut self, value: i32) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// A `%u` argument.
    pub fn uint(self, value: u32) -> Self {
        self.int(value as i32)
    }

    /// A `%ld`/`%lld`/`%zu` argument.
    pub fn long(mut self, value: i64) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// A `%f`/`%e`/`%g` argument.
    pub fn double(mut self, value: f64) -> Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// A `%p` argument.
    pub fn pointer(self, value: u64) -> Self {
        self.long(value as i64)
    }

    /// A `%s` argument.
    pub fn string(mut self, value: &str) -> Self {
        put_packed_bytes(&mut self.buf, value.as_bytes());
        self
    }

    /// Finishes the stream.
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}
