//! Argument stream decoding.
//!
//! [`interpolate`] walks a compiled [`FormatString`] and pulls one typed value
//! per token from an argument stream, handing literals and values to an
//! [`ArgVisitor`]. Three visitors cover every caller: [`MessageRenderer`]
//! produces the printf-style text, [`BlobEncoder`] re-encodes the values into
//! the canonical on-disk blob and [`DualVisitor`] does both in one pass.
//!
//! Senders older than [`WIDE_ARGS_PROTOCOL_VERSION`] send `l` integers and
//! pointers as 4 bytes. They are widened here, so stored blobs always use
//! the current widths.

use super::printf::{self, Resolved};
use super::token::{FormatString, FormatToken, SizeModifier, ValueKind, TAG_LITERAL};
use crate::codec::{put_packed_bytes, ByteCursor};
use crate::error::CoreResult;

/// First protocol version whose `l` integers and pointers are 8 bytes.
pub const WIDE_ARGS_PROTOCOL_VERSION: u8 = 7;

/// Protocol version of canonical blobs.
pub const CURRENT_PROTOCOL_VERSION: u8 = WIDE_ARGS_PROTOCOL_VERSION;

/// One decoded argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue<'a> {
    /// `d`, `i`
    Signed(i64),
    /// `u`, `o`, `x`, `X`
    Unsigned(u64),
    /// Floating point conversions.
    Float(f64),
    /// `c`
    Char(u8),
    /// `s`
    Str(&'a [u8]),
    /// `p`
    Pointer(u64),
}

/// `*` width and precision read ahead of a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StarArgs {
    /// Width read from the stream.
    pub width: Option<i32>,
    /// Precision read from the stream.
    pub precision: Option<i32>,
}

/// Receives the pieces of a message in order.
pub trait ArgVisitor {
    /// A literal span of the format text.
    fn visit_literal(&mut self, text: &str);

    /// One decoded argument.
    fn visit_arg(&mut self, token: &FormatToken, star: StarArgs, value: ArgValue<'_>);
}

/// Renders a message as text.
#[derive(Debug, Default)]
pub struct MessageRenderer {
    out: String,
}

impl MessageRenderer {
    /// Creates an empty renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rendered text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.out
    }
}

impl ArgVisitor for MessageRenderer {
    fn visit_literal(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn visit_arg(&mut self, token: &FormatToken, star: StarArgs, value: ArgValue<'_>) {
        let spec = Resolved::new(token, star.width, star.precision);
        let out = &mut self.out;
        match value {
            ArgValue::Signed(v) => printf::signed(out, v, &spec),
            ArgValue::Unsigned(v) => printf::unsigned(out, v, token.type_char, &spec),
            ArgValue::Float(v) => printf::float(out, v, token.type_char, &spec),
            ArgValue::Char(v) => printf::character(out, v, &spec),
            ArgValue::Str(v) => printf::string(out, v, &spec),
            ArgValue::Pointer(v) => printf::pointer(out, v, &spec),
        }
    }
}

/// Re-encodes arguments at current-protocol widths.
#[derive(Debug, Default)]
pub struct BlobEncoder {
    out: Vec<u8>,
}

impl BlobEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the encoded blob.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

impl ArgVisitor for BlobEncoder {
    fn visit_literal(&mut self, _text: &str) {}

    fn visit_arg(&mut self, token: &FormatToken, star: StarArgs, value: ArgValue<'_>) {
        let out = &mut self.out;
        if let Some(w) = star.width {
            out.extend_from_slice(&w.to_le_bytes());
        }
        if let Some(p) = star.precision {
            out.extend_from_slice(&p.to_le_bytes());
        }

        let width = int_width(token.size, CURRENT_PROTOCOL_VERSION);
        // Truncating casts keep exactly the bytes that were decoded
        match value {
            ArgValue::Signed(v) => put_int(out, v as u64, width),
            ArgValue::Unsigned(v) => put_int(out, v, width),
            ArgValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            ArgValue::Char(v) => out.push(v),
            ArgValue::Str(v) => put_packed_bytes(out, v),
            ArgValue::Pointer(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

fn put_int(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_le_bytes()[..width]);
}

/// Renders and re-encodes in one pass.
#[derive(Debug, Default)]
pub struct DualVisitor {
    /// Text output.
    pub renderer: MessageRenderer,
    /// Blob output.
    pub encoder: BlobEncoder,
}

impl ArgVisitor for DualVisitor {
    fn visit_literal(&mut self, text: &str) {
        self.renderer.visit_literal(text);
    }

    fn visit_arg(&mut self, token: &FormatToken, star: StarArgs, value: ArgValue<'_>) {
        self.renderer.visit_arg(token, star, value);
        self.encoder.visit_arg(token, star, value);
    }
}

/// Bytes an integer conversion occupies on the wire.
fn int_width(size: SizeModifier, version: u8) -> usize {
    match size {
        SizeModifier::Char => 1,
        SizeModifier::Short => 2,
        SizeModifier::Default => 4,
        SizeModifier::Long if version < WIDE_ARGS_PROTOCOL_VERSION => 4,
        SizeModifier::Long
        | SizeModifier::LongLong
        | SizeModifier::Size
        | SizeModifier::LongDouble => 8,
    }
}

fn read_signed(cursor: &mut ByteCursor<'_>, width: usize) -> CoreResult<i64> {
    Ok(match width {
        1 => i64::from(cursor.i8()?),
        2 => i64::from(cursor.i16()?),
        4 => i64::from(cursor.i32()?),
        _ => cursor.i64()?,
    })
}

fn read_unsigned(cursor: &mut ByteCursor<'_>, width: usize) -> CoreResult<u64> {
    Ok(match width {
        1 => u64::from(cursor.u8()?),
        2 => u64::from(cursor.u16()?),
        4 => u64::from(cursor.u32()?),
        _ => cursor.u64()?,
    })
}

fn read_value<'a>(
    cursor: &mut ByteCursor<'a>,
    token: &FormatToken,
    version: u8,
) -> CoreResult<ArgValue<'a>> {
    Ok(match token.kind() {
        ValueKind::Signed => {
            ArgValue::Signed(read_signed(cursor, int_width(token.size, version))?)
        }
        ValueKind::Unsigned => {
            ArgValue::Unsigned(read_unsigned(cursor, int_width(token.size, version))?)
        }
        ValueKind::Float => ArgValue::Float(cursor.f64()?),
        ValueKind::Char => ArgValue::Char(cursor.u8()?),
        ValueKind::Str => ArgValue::Str(cursor.packed_bytes()?),
        ValueKind::Pointer => {
            if version < WIDE_ARGS_PROTOCOL_VERSION {
                ArgValue::Pointer(u64::from(cursor.u32()?))
            } else {
                ArgValue::Pointer(cursor.u64()?)
            }
        }
    })
}

/// Walks `format`, decoding one value per token from `args`.
///
/// Returns the number of argument bytes consumed. Trailing bytes are
/// ignored.
///
/// # Errors
///
/// Returns `ArgumentUnderrun` if the stream ends early. The visitor will
/// have seen a prefix of the message and its output should be discarded.
pub fn interpolate<V: ArgVisitor + ?Sized>(
    format: &FormatString,
    args: &[u8],
    version: u8,
    visitor: &mut V,
) -> CoreResult<usize> {
    let mut cursor = ByteCursor::new(args);
    let mut literals = 0usize;
    let mut tokens = format.tokens.iter();

    for &tag in &format.components {
        if tag == TAG_LITERAL {
            visitor.visit_literal(format.literal(literals));
            literals += 1;
            continue;
        }

        let Some(token) = tokens.next() else {
            break;
        };
        let mut star = StarArgs::default();
        if token.width.is_from_stream() {
            star.width = Some(cursor.i32()?);
        }
        if token.precision.is_from_stream() {
            star.precision = Some(cursor.i32()?);
        }
        let value = read_value(&mut cursor, token, version)?;
        visitor.visit_arg(token, star, value);
    }

    Ok(cursor.position())
}

/// Renders a message from a canonical or wire argument stream.
///
/// # Errors
///
/// Returns `ArgumentUnderrun` if the stream is too short.
pub fn render_message(format: &FormatString, args: &[u8], version: u8) -> CoreResult<String> {
    let mut renderer = MessageRenderer::new();
    interpolate(format, args, version, &mut renderer)?;
    Ok(renderer.into_string())
}

/// Converts a wire argument stream into the canonical blob.
///
/// # Errors
///
/// Returns `ArgumentUnderrun` if the stream is too short.
pub fn canonical_blob(format: &FormatString, args: &[u8], version: u8) -> CoreResult<Vec<u8>> {
    let mut encoder = BlobEncoder::new();
    interpolate(format, args, version, &mut encoder)?;
    Ok(encoder.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn fmt(text: &str) -> FormatString {
        FormatString::parse(text).unwrap()
    }

    #[test]
    fn renders_mixed_message() {
        let f = fmt("user %s logged in %d times (%.1f%%)");
        let mut args = Vec::new();
        put_packed_bytes(&mut args, b"alice");
        args.extend_from_slice(&3i32.to_le_bytes());
        args.extend_from_slice(&42.5f64.to_le_bytes());

        assert_eq!(
            render_message(&f, &args, CURRENT_PROTOCOL_VERSION).unwrap(),
            "user alice logged in 3 times (42.5%)"
        );
    }

    #[test]
    fn size_modifiers_pick_widths() {
        let f = fmt("%hhd %hu %lld %c %p");
        let mut args = Vec::new();
        args.push(0xFF); // -1 as i8
        args.extend_from_slice(&65535u16.to_le_bytes());
        args.extend_from_slice(&(-5i64).to_le_bytes());
        args.push(b'Q');
        args.extend_from_slice(&0xBEEFu64.to_le_bytes());

        assert_eq!(
            render_message(&f, &args, CURRENT_PROTOCOL_VERSION).unwrap(),
            "-1 65535 -5 Q 0xbeef"
        );
    }

    #[test]
    fn star_arguments_precede_value() {
        let f = fmt("[%*d]");
        let mut args = Vec::new();
        args.extend_from_slice(&5i32.to_le_bytes());
        args.extend_from_slice(&42i32.to_le_bytes());
        assert_eq!(render_message(&f, &args, 7).unwrap(), "[   42]");
    }

    #[test]
    fn old_protocol_is_widened() {
        let f = fmt("%ld %lx %p");
        let mut old = Vec::new();
        old.extend_from_slice(&(-7i32).to_le_bytes());
        old.extend_from_slice(&0xABCu32.to_le_bytes());
        old.extend_from_slice(&0x1000u32.to_le_bytes());

        let text = render_message(&f, &old, 6).unwrap();
        assert_eq!(text, "-7 abc 0x1000");

        let blob = canonical_blob(&f, &old, 6).unwrap();
        assert_eq!(blob.len(), 24);
        assert_eq!(render_message(&f, &blob, CURRENT_PROTOCOL_VERSION).unwrap(), text);
    }

    #[test]
    fn canonical_blob_keeps_star_and_strings() {
        let f = fmt("%-*s|%.*f");
        let mut args = Vec::new();
        args.extend_from_slice(&6i32.to_le_bytes());
        put_packed_bytes(&mut args, b"ab");
        args.extend_from_slice(&2i32.to_le_bytes());
        args.extend_from_slice(&1.5f64.to_le_bytes());

        let blob = canonical_blob(&f, &args, CURRENT_PROTOCOL_VERSION).unwrap();
        assert_eq!(blob, args);
    }

    #[test]
    fn underrun_is_reported() {
        let f = fmt("%d %d");
        let args = 1i32.to_le_bytes();
        let err = render_message(&f, &args, CURRENT_PROTOCOL_VERSION).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ArgumentUnderrun {
                needed: 4,
                available: 0
            }
        ));
    }

    #[test]
    fn dual_visitor_matches_separate_passes() {
        let f = fmt("%s=%u");
        let mut args = Vec::new();
        put_packed_bytes(&mut args, b"count");
        args.extend_from_slice(&9u32.to_le_bytes());

        let mut dual = DualVisitor::default();
        let used = interpolate(&f, &args, CURRENT_PROTOCOL_VERSION, &mut dual).unwrap();
        assert_eq!(used, args.len());
        assert_eq!(dual.renderer.into_string(), "count=9");
        assert_eq!(dual.encoder.into_bytes(), args);
    }
}
