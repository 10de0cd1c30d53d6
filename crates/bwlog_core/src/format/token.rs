//! Format string compilation.
//!
//! A printf-style format is parsed once into literal spans and typed tokens.
//! The `components` tag string records the interleaving: `s` for the next
//! literal span, `t` for the next token.

use crate::codec::ByteCursor;
use crate::error::{CoreError, CoreResult};

/// Tag for a literal span in [`FormatString::components`].
pub const TAG_LITERAL: u8 = b's';
/// Tag for a token in [`FormatString::components`].
pub const TAG_TOKEN: u8 = b't';

/// C length modifier of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SizeModifier {
    /// No modifier (`int`, `double`).
    #[default]
    Default = 0,
    /// `hh`
    Char = 1,
    /// `h`
    Short = 2,
    /// `l`
    Long = 3,
    /// `ll` or `j`
    LongLong = 4,
    /// `z` or `t`
    Size = 5,
    /// `L`
    LongDouble = 6,
}

impl SizeModifier {
    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::Default,
            1 => Self::Char,
            2 => Self::Short,
            3 => Self::Long,
            4 => Self::LongLong,
            5 => Self::Size,
            6 => Self::LongDouble,
            _ => return None,
        })
    }
}

/// Printf flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormatFlags(u8);

impl FormatFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// `-` left-justify.
    pub const LEFT: Self = Self(0x01);
    /// `+` always print a sign.
    pub const PLUS: Self = Self(0x02);
    /// ` ` space before positive numbers.
    pub const SPACE: Self = Self(0x04);
    /// `#` alternate form.
    pub const ALT: Self = Self(0x08);
    /// `0` zero padding.
    pub const ZERO: Self = Self(0x10);

    /// Creates flags from a raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b & 0x1F)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns these flags plus `other`.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Width or precision of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldSpec {
    /// Not given.
    #[default]
    Unset,
    /// Given in the format text.
    Fixed(u32),
    /// `*`: read from the argument stream before the value.
    FromStream,
}

impl FieldSpec {
    fn kind(self) -> u8 {
        match self {
            Self::Unset => 0,
            Self::Fixed(_) => 1,
            Self::FromStream => 2,
        }
    }

    fn value(self) -> u32 {
        match self {
            Self::Fixed(v) => v,
            _ => 0,
        }
    }

    fn from_parts(kind: u8, value: u32) -> Option<Self> {
        Some(match kind {
            0 => Self::Unset,
            1 => Self::Fixed(value),
            2 => Self::FromStream,
            _ => return None,
        })
    }

    /// Returns whether the value travels in the argument stream.
    #[must_use]
    pub const fn is_from_stream(self) -> bool {
        matches!(self, Self::FromStream)
    }
}

/// What kind of value a token consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `d`, `i`
    Signed,
    /// `u`, `o`, `x`, `X`
    Unsigned,
    /// `f`, `F`, `e`, `E`, `g`, `G`
    Float,
    /// `c`
    Char,
    /// `s`
    Str,
    /// `p`
    Pointer,
}

/// One compiled `%` conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatToken {
    /// Conversion character (`d`, `x`, `s`, ...).
    pub type_char: u8,
    /// Length modifier.
    pub size: SizeModifier,
    /// Printf flags.
    pub flags: FormatFlags,
    /// Minimum field width.
    pub width: FieldSpec,
    /// Precision.
    pub precision: FieldSpec,
}

impl FormatToken {
    /// Encoded size of a token in the catalog.
    pub const ENCODED_SIZE: usize = 13;

    /// Returns the kind of value this token reads.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self.type_char {
            b'd' | b'i' => ValueKind::Signed,
            b'u' | b'o' | b'x' | b'X' => ValueKind::Unsigned,
            b'c' => ValueKind::Char,
            b's' => ValueKind::Str,
            b'p' => ValueKind::Pointer,
            _ => ValueKind::Float,
        }
    }

    /// Numeric base used when rendering.
    #[must_use]
    pub fn base(&self) -> u32 {
        match self.type_char {
            b'o' => 8,
            b'x' | b'X' | b'p' => 16,
            _ => 10,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.type_char);
        out.push(self.size as u8);
        out.push(self.flags.as_byte());
        out.push(self.width.kind());
        out.extend_from_slice(&self.width.value().to_le_bytes());
        out.push(self.precision.kind());
        out.extend_from_slice(&self.precision.value().to_le_bytes());
    }

    fn decode(cursor: &mut ByteCursor<'_>) -> CoreResult<Self> {
        let corrupt = |e| CoreError::catalog_corruption(format!("truncated token: {e}"));
        let type_char = cursor.u8().map_err(corrupt)?;
        let size = cursor.u8().map_err(corrupt)?;
        let flags = cursor.u8().map_err(corrupt)?;
        let width_kind = cursor.u8().map_err(corrupt)?;
        let width = cursor.u32().map_err(corrupt)?;
        let precision_kind = cursor.u8().map_err(corrupt)?;
        let precision = cursor.u32().map_err(corrupt)?;

        if !CONVERSIONS.contains(&type_char) {
            return Err(CoreError::catalog_corruption(format!(
                "unknown conversion byte {type_char}"
            )));
        }

        Ok(Self {
            type_char,
            size: SizeModifier::from_byte(size)
                .ok_or_else(|| CoreError::catalog_corruption("bad size modifier"))?,
            flags: FormatFlags::from_byte(flags),
            width: FieldSpec::from_parts(width_kind, width)
                .ok_or_else(|| CoreError::catalog_corruption("bad width kind"))?,
            precision: FieldSpec::from_parts(precision_kind, precision)
                .ok_or_else(|| CoreError::catalog_corruption("bad precision kind"))?,
        })
    }
}

const CONVERSIONS: &[u8] = b"diuoxXcspfFeEgG";

/// A compiled format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatString {
    /// The original format text.
    pub text: String,
    /// Interleaving of literal spans (`s`) and tokens (`t`).
    pub components: Vec<u8>,
    /// Byte ranges of `text` emitted verbatim.
    pub literals: Vec<(u32, u32)>,
    /// Conversions in order.
    pub tokens: Vec<FormatToken>,
    /// Offset of this record in the catalog; its stable identity.
    pub offset: u32,
}

impl FormatString {
    /// Parses `text`.
    ///
    /// `%%` becomes a literal `%`; a lone `%` at the very end is kept as a
    /// literal. `%n` and unknown conversions are rejected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormatString` if a conversion is malformed.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let bytes = text.as_bytes();
        let mut components = Vec::new();
        let mut literals = Vec::new();
        let mut tokens = Vec::new();

        let mut literal_start = 0usize;
        let mut i = 0usize;

        let mut push_literal = |start: usize, end: usize, components: &mut Vec<u8>| {
            if end > start {
                literals.push((start as u32, end as u32));
                components.push(TAG_LITERAL);
            }
        };

        while i < bytes.len() {
            if bytes[i] != b'%' {
                i += 1;
                continue;
            }

            // Trailing lone '%'
            if i + 1 >= bytes.len() {
                break;
            }

            if bytes[i + 1] == b'%' {
                // Keep the first '%' in the span, skip the second
                push_literal(literal_start, i + 1, &mut components);
                i += 2;
                literal_start = i;
                continue;
            }

            push_literal(literal_start, i, &mut components);
            let (token, next) = parse_conversion(bytes, i + 1).map_err(|message| {
                CoreError::invalid_format_string(format!("{message} at byte {i} of {text:?}"))
            })?;
            tokens.push(token);
            components.push(TAG_TOKEN);
            i = next;
            literal_start = i;
        }

        push_literal(literal_start, bytes.len(), &mut components);

        Ok(Self {
            text: text.to_string(),
            components,
            literals,
            tokens,
            offset: 0,
        })
    }

    /// Returns the text of literal span `i`.
    #[must_use]
    pub fn literal(&self, i: usize) -> &str {
        let (start, end) = self.literals[i];
        &self.text[start as usize..end as usize]
    }

    /// Encodes the catalog record body (without the length header).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            self.text.len()
                + self.components.len()
                + self.literals.len() * 8
                + self.tokens.len() * FormatToken::ENCODED_SIZE
                + 16,
        );

        buf.extend_from_slice(&(self.text.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.text.as_bytes());

        buf.extend_from_slice(&(self.components.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.components);

        buf.extend_from_slice(&(self.literals.len() as u32).to_le_bytes());
        for (start, end) in &self.literals {
            buf.extend_from_slice(&start.to_le_bytes());
            buf.extend_from_slice(&end.to_le_bytes());
        }

        buf.extend_from_slice(&(self.tokens.len() as u32).to_le_bytes());
        for token in &self.tokens {
            token.encode(&mut buf);
        }

        buf
    }

    /// Decodes a record body stored at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogCorruption` if the body is truncated or inconsistent.
    pub fn decode(data: &[u8], offset: u32) -> CoreResult<Self> {
        let corrupt = |e| CoreError::catalog_corruption(format!("record at {offset}: {e}"));
        let mut cursor = ByteCursor::new(data);

        let text_len = cursor.u32().map_err(corrupt)? as usize;
        let text = std::str::from_utf8(cursor.take(text_len).map_err(corrupt)?)
            .map_err(|_| {
                CoreError::catalog_corruption(format!("record at {offset}: text not utf-8"))
            })?
            .to_string();

        let tags_len = cursor.u32().map_err(corrupt)? as usize;
        let components = cursor.take(tags_len).map_err(corrupt)?.to_vec();

        let span_count = cursor.u32().map_err(corrupt)? as usize;
        let mut literals = Vec::with_capacity(span_count.min(1024));
        for _ in 0..span_count {
            let start = cursor.u32().map_err(corrupt)?;
            let end = cursor.u32().map_err(corrupt)?;
            if start > end || end as usize > text.len() || !text.is_char_boundary(start as usize)
                || !text.is_char_boundary(end as usize)
            {
                return Err(CoreError::catalog_corruption(format!(
                    "record at {offset}: span {start}..{end} outside text"
                )));
            }
            literals.push((start, end));
        }

        let token_count = cursor.u32().map_err(corrupt)? as usize;
        let mut tokens = Vec::with_capacity(token_count.min(1024));
        for _ in 0..token_count {
            tokens.push(FormatToken::decode(&mut cursor)?);
        }

        let literal_tags = components.iter().filter(|&&t| t == TAG_LITERAL).count();
        let token_tags = components.iter().filter(|&&t| t == TAG_TOKEN).count();
        if literal_tags != literals.len()
            || token_tags != tokens.len()
            || literal_tags + token_tags != components.len()
        {
            return Err(CoreError::catalog_corruption(format!(
                "record at {offset}: tag string does not match spans and tokens"
            )));
        }

        Ok(Self {
            text,
            components,
            literals,
            tokens,
            offset,
        })
    }
}

/// Parses one conversion starting just after the `%`.
///
/// Returns the token and the index just past the conversion character.
fn parse_conversion(bytes: &[u8], mut i: usize) -> Result<(FormatToken, usize), String> {
    let mut flags = FormatFlags::NONE;
    while let Some(&b) = bytes.get(i) {
        let flag = match b {
            b'-' => FormatFlags::LEFT,
            b'+' => FormatFlags::PLUS,
            b' ' => FormatFlags::SPACE,
            b'#' => FormatFlags::ALT,
            b'0' => FormatFlags::ZERO,
            _ => break,
        };
        flags = flags.with(flag);
        i += 1;
    }

    let (width, next) = parse_field(bytes, i);
    i = next;

    let mut precision = FieldSpec::Unset;
    if bytes.get(i) == Some(&b'.') {
        let (spec, next) = parse_field(bytes, i + 1);
        i = next;
        // "%.f" means precision zero
        precision = match spec {
            FieldSpec::Unset => FieldSpec::Fixed(0),
            other => other,
        };
    }

    let mut size = SizeModifier::Default;
    match bytes.get(i) {
        Some(b'h') if bytes.get(i + 1) == Some(&b'h') => {
            size = SizeModifier::Char;
            i += 2;
        }
        Some(b'h') => {
            size = SizeModifier::Short;
            i += 1;
        }
        Some(b'l') if bytes.get(i + 1) == Some(&b'l') => {
            size = SizeModifier::LongLong;
            i += 2;
        }
        Some(b'l') => {
            size = SizeModifier::Long;
            i += 1;
        }
        Some(b'j') | Some(b'q') => {
            size = SizeModifier::LongLong;
            i += 1;
        }
        Some(b'z') | Some(b't') => {
            size = SizeModifier::Size;
            i += 1;
        }
        Some(b'L') => {
            size = SizeModifier::LongDouble;
            i += 1;
        }
        _ => {}
    }

    let Some(&type_char) = bytes.get(i) else {
        return Err("unterminated conversion".to_string());
    };
    if !CONVERSIONS.contains(&type_char) {
        return Err(format!("unsupported conversion '{}'", type_char as char));
    }

    Ok((
        FormatToken {
            type_char,
            size,
            flags,
            width,
            precision,
        },
        i + 1,
    ))
}

fn parse_field(bytes: &[u8], mut i: usize) -> (FieldSpec, usize) {
    if bytes.get(i) == Some(&b'*') {
        return (FieldSpec::FromStream, i + 1);
    }
    let start = i;
    let mut value: u32 = 0;
    while let Some(&b) = bytes.get(i) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value.saturating_mul(10).saturating_add(u32::from(b - b'0'));
        i += 1;
    }
    if i == start {
        (FieldSpec::Unset, i)
    } else {
        (FieldSpec::Fixed(value), i)
    }
}
