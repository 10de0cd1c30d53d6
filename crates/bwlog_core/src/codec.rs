//! Little-endian byte cursor shared by the record decoders.
//!
//! Every binary file in a log root (entries, components, strings) and the
//! argument streams are little-endian and packed. Decoders walk them with a
//! [`ByteCursor`]; running off the end yields an [`Underrun`], which each
//! caller maps to the error that fits its file.

use crate::error::CoreError;
use std::fmt;

/// A read that needed more bytes than were left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Underrun {
    /// Bytes the read needed.
    pub needed: usize,
    /// Bytes that were left.
    pub available: usize,
}

impl fmt::Display for Underrun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "needed {} bytes, {} available",
            self.needed, self.available
        )
    }
}

impl From<Underrun> for CoreError {
    fn from(u: Underrun) -> Self {
        CoreError::ArgumentUnderrun {
            needed: u.needed,
            available: u.available,
        }
    }
}

/// Forward-only reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Takes the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], Underrun> {
        if self.remaining() < n {
            return Err(Underrun {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], Underrun> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a `u8`.
    pub fn u8(&mut self) -> Result<u8, Underrun> {
        Ok(self.take(1)?[0])
    }

    /// Reads an `i8`.
    pub fn i8(&mut self) -> Result<i8, Underrun> {
        Ok(i8::from_le_bytes(self.array()?))
    }

    /// Reads a `u16`.
    pub fn u16(&mut self) -> Result<u16, Underrun> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    /// Reads an `i16`.
    pub fn i16(&mut self) -> Result<i16, Underrun> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    /// Reads a `u32`.
    pub fn u32(&mut self) -> Result<u32, Underrun> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Reads an `i32`.
    pub fn i32(&mut self) -> Result<i32, Underrun> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    /// Reads a `u64`.
    pub fn u64(&mut self) -> Result<u64, Underrun> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Reads an `i64`.
    pub fn i64(&mut self) -> Result<i64, Underrun> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Reads an `f64`.
    pub fn f64(&mut self) -> Result<f64, Underrun> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// Reads a string with a compressed length prefix.
    ///
    /// Lengths below 255 take one byte; longer strings are marked with
    /// `0xFF` followed by a 3-byte length.
    pub fn packed_bytes(&mut self) -> Result<&'a [u8], Underrun> {
        let first = self.u8()?;
        let len = if first == 0xFF {
            let b = self.take(3)?;
            usize::from(b[0]) | usize::from(b[1]) << 8 | usize::from(b[2]) << 16
        } else {
            usize::from(first)
        };
        self.take(len)
    }
}

/// Appends a compressed length prefix followed by the bytes.
///
/// Strings longer than 2^24 - 1 bytes are truncated to fit the prefix.
pub fn put_packed_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len().min(0x00FF_FFFF);
    if len < 0xFF {
        out.push(len as u8);
    } else {
        out.push(0xFF);
        out.push(len as u8);
        out.push((len >> 8) as u8);
        out.push((len >> 16) as u8);
    }
    out.extend_from_slice(&bytes[..len]);
}

/// Splits `[len u32][body]` records into `(offset, body)` pairs.
///
/// Stops before a partially written trailing record. Returns the records and
/// the number of bytes they cover.
#[must_use]
pub fn split_records(data: &[u8]) -> (Vec<(usize, &[u8])>, usize) {
    let mut records = Vec::new();
    let mut pos = 0usize;
    while data.len() - pos >= 4 {
        let mut len = [0u8; 4];
        len.copy_from_slice(&data[pos..pos + 4]);
        let body_len = u32::from_le_bytes(len) as usize;
        let body_start = pos + 4;
        if data.len() - body_start < body_len {
            break;
        }
        records.push((pos, &data[body_start..body_start + body_len]));
        pos = body_start + body_len;
    }
    (records, pos)
}
