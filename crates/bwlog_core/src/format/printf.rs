//! C printf rendering of single conversions.

use super::token::{FormatFlags, FormatToken};

/// Largest width or precision honoured; larger values are clamped to it.
pub const MAX_FIELD: usize = 4096;

/// Width and precision after `*` values have been read from the stream.
///
/// A negative `*` width means left-justify; a negative `*` precision means
/// "not given", as in C. Both are clamped to [`MAX_FIELD`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Minimum field width.
    pub width: Option<usize>,
    /// Precision.
    pub precision: Option<usize>,
    /// Flags, including `-` implied by a negative `*` width.
    pub flags: FormatFlags,
}

impl Resolved {
    /// Combines a token with the `*` values read for it.
    #[must_use]
    pub fn new(token: &FormatToken, star_width: Option<i32>, star_precision: Option<i32>) -> Self {
        use super::token::FieldSpec;

        let mut flags = token.flags;
        let width = match token.width {
            FieldSpec::Unset => None,
            FieldSpec::Fixed(w) => Some(w as usize),
            FieldSpec::FromStream => match star_width {
                Some(w) if w < 0 => {
                    flags = flags.with(FormatFlags::LEFT);
                    Some(w.unsigned_abs() as usize)
                }
                Some(w) => Some(w as usize),
                None => None,
            },
        };
        let precision = match token.precision {
            FieldSpec::Unset => None,
            FieldSpec::Fixed(p) => Some(p as usize),
            FieldSpec::FromStream => star_precision.and_then(|p| usize::try_from(p).ok()),
        };

        Self {
            width: width.map(|w| w.min(MAX_FIELD)),
            precision: precision.map(|p| p.min(MAX_FIELD)),
            flags,
        }
    }
}

/// Pads `prefix + body` to the field width.
///
/// `numeric_zero` allows `0` padding between prefix and body.
fn pad(out: &mut String, prefix: &str, body: &str, spec: &Resolved, numeric_zero: bool) {
    let len = prefix.chars().count() + body.chars().count();
    let fill = spec.width.map_or(0, |w| w.saturating_sub(len));

    if spec.flags.contains(FormatFlags::LEFT) {
        out.push_str(prefix);
        out.push_str(body);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if numeric_zero && spec.flags.contains(FormatFlags::ZERO) {
        out.push_str(prefix);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(body);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(prefix);
        out.push_str(body);
    }
}

fn sign_prefix(negative: bool, flags: FormatFlags) -> &'static str {
    if negative {
        "-"
    } else if flags.contains(FormatFlags::PLUS) {
        "+"
    } else if flags.contains(FormatFlags::SPACE) {
        " "
    } else {
        ""
    }
}

fn apply_int_precision(mut digits: String, precision: Option<usize>, is_zero: bool) -> String {
    match precision {
        Some(0) if is_zero => String::new(),
        Some(p) if digits.len() < p => {
            let mut padded = "0".repeat(p - digits.len());
            padded.push_str(&digits);
            digits = padded;
            digits
        }
        _ => digits,
    }
}

/// Renders `%d` / `%i`.
pub fn signed(out: &mut String, value: i64, spec: &Resolved) {
    let digits = apply_int_precision(value.unsigned_abs().to_string(), spec.precision, value == 0);
    let prefix = sign_prefix(value < 0, spec.flags);
    pad(out, prefix, &digits, spec, spec.precision.is_none());
}

/// Renders `%u`, `%o`, `%x`, `%X`.
pub fn unsigned(out: &mut String, value: u64, type_char: u8, spec: &Resolved) {
    let alt = spec.flags.contains(FormatFlags::ALT);
    let (raw, mut prefix) = match type_char {
        b'o' => (format!("{value:o}"), ""),
        b'x' => (format!("{value:x}"), if alt && value != 0 { "0x" } else { "" }),
        b'X' => (format!("{value:X}"), if alt && value != 0 { "0X" } else { "" }),
        _ => (value.to_string(), ""),
    };
    let mut digits = apply_int_precision(raw, spec.precision, value == 0);
    if type_char == b'o' && alt && !digits.starts_with('0') {
        digits.insert(0, '0');
        prefix = "";
    }
    pad(out, prefix, &digits, spec, spec.precision.is_none());
}

/// Renders `%c`.
pub fn character(out: &mut String, value: u8, spec: &Resolved) {
    let body = char::from(value).to_string();
    pad(out, "", &body, spec, false);
}

/// Renders `%s`; precision limits the number of bytes taken.
pub fn string(out: &mut String, value: &[u8], spec: &Resolved) {
    let take = spec.precision.map_or(value.len(), |p| p.min(value.len()));
    let body = String::from_utf8_lossy(&value[..take]);
    pad(out, "", &body, spec, false);
}

/// Renders `%p` the way glibc does.
pub fn pointer(out: &mut String, value: u64, spec: &Resolved) {
    if value == 0 {
        pad(out, "", "(nil)", spec, false);
    } else {
        let digits = format!("{value:x}");
        pad(out, "0x", &digits, spec, true);
    }
}

/// Renders the floating point conversions.
pub fn float(out: &mut String, value: f64, type_char: u8, spec: &Resolved) {
    let upper = type_char.is_ascii_uppercase();
    let prefix = sign_prefix(value.is_sign_negative() && !value.is_nan(), spec.flags);

    if !value.is_finite() {
        let body = match (value.is_nan(), upper) {
            (true, false) => "nan",
            (true, true) => "NAN",
            (false, false) => "inf",
            (false, true) => "INF",
        };
        pad(out, prefix, body, spec, false);
        return;
    }

    let abs = value.abs();
    let alt = spec.flags.contains(FormatFlags::ALT);
    let precision = spec.precision.unwrap_or(6);

    let body = match type_char.to_ascii_lowercase() {
        b'f' => fixed(abs, precision, alt),
        b'e' => exponent(abs, precision, alt, upper),
        _ => general(abs, precision, alt, upper),
    };
    pad(out, prefix, &body, spec, true);
}

fn fixed(abs: f64, precision: usize, alt: bool) -> String {
    let mut s = format!("{abs:.precision$}");
    if alt && precision == 0 {
        s.push('.');
    }
    s
}

/// Splits Rust's `{:e}` output into mantissa and decimal exponent.
fn split_exponent(abs: f64, precision: usize) -> (String, i32) {
    let s = format!("{abs:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => (mantissa.to_string(), exp.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

fn exponent(abs: f64, precision: usize, alt: bool, upper: bool) -> String {
    let (mut mantissa, exp) = split_exponent(abs, precision);
    if alt && precision == 0 {
        mantissa.push('.');
    }
    join_exponent(&mantissa, exp, upper)
}

fn join_exponent(mantissa: &str, exp: i32, upper: bool) -> String {
    let marker = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{marker}{sign}{:02}", exp.unsigned_abs())
}

fn strip_fraction_zeros(s: &mut String) {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
}

fn general(abs: f64, precision: usize, alt: bool, upper: bool) -> String {
    let p = precision.max(1);
    let (_, x) = split_exponent(abs, p - 1);

    if (p as i32) > x && x >= -4 {
        let frac = (p as i32 - 1 - x) as usize;
        let mut s = format!("{abs:.frac$}");
        if alt {
            if !s.contains('.') {
                s.push('.');
            }
        } else {
            strip_fraction_zeros(&mut s);
        }
        s
    } else {
        let (mut mantissa, exp) = split_exponent(abs, p - 1);
        if alt {
            if !mantissa.contains('.') {
                mantissa.push('.');
            }
        } else {
            strip_fraction_zeros(&mut mantissa);
        }
        join_exponent(&mantissa, exp, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::token::FormatString;

    /// Renders a single-conversion format with fixed (non-`*`) fields.
    fn render(fmt: &str, f: impl FnOnce(&mut String, &FormatToken, &Resolved)) -> String {
        let parsed = FormatString::parse(fmt).unwrap();
        let token = parsed.tokens[0];
        let spec = Resolved::new(&token, None, None);
        let mut out = String::new();
        f(&mut out, &token, &spec);
        out
    }

    fn d(fmt: &str, v: i64) -> String {
        render(fmt, |o, _, s| signed(o, v, s))
    }

    fn u(fmt: &str, v: u64) -> String {
        render(fmt, |o, t, s| unsigned(o, v, t.type_char, s))
    }

    fn g(fmt: &str, v: f64) -> String {
        render(fmt, |o, t, s| float(o, v, t.type_char, s))
    }

    #[test]
    fn oversized_fields_are_clamped() {
        let fixed = g("%.70000f", 1.0);
        assert_eq!(fixed.len(), 2 + MAX_FIELD);
        assert!(fixed.starts_with("1.000"));

        let parsed = FormatString::parse("%*.*e").unwrap();
        let token = parsed.tokens[0];
        let spec = Resolved::new(&token, Some(i32::MIN), Some(i32::MAX));
        assert_eq!(spec.width, Some(MAX_FIELD));
        assert_eq!(spec.precision, Some(MAX_FIELD));
        assert!(spec.flags.contains(FormatFlags::LEFT));

        let mut out = String::new();
        float(&mut out, 2.5, token.type_char, &spec);
        assert!(out.starts_with("2.5000"));
        assert!(out.trim_end().ends_with("e+00"));
        assert_eq!(out.len(), MAX_FIELD + "2.e+00".len());
    }

    #[test]
    fn signed_integers() {
        assert_eq!(d("%d", 42), "42");
        assert_eq!(d("%d", -42), "-42");
        assert_eq!(d("%5d", 42), "   42");
        assert_eq!(d("%-5d|", 42), "42   ");
        assert_eq!(d("%05d", -42), "-0042");
        assert_eq!(d("%+d", 7), "+7");
        assert_eq!(d("% d", 7), " 7");
        assert_eq!(d("%.3d", 7), "007");
        assert_eq!(d("%08.3d", 7), "     007");
        assert_eq!(d("%.0d", 0), "");
        assert_eq!(d("%d", i64::MIN), "-9223372036854775808");
    }

    #[test]
    fn unsigned_integers() {
        assert_eq!(u("%u", 42), "42");
        assert_eq!(u("%x", 255), "ff");
        assert_eq!(u("%X", 255), "FF");
        assert_eq!(u("%#x", 255), "0xff");
        assert_eq!(u("%#x", 0), "0");
        assert_eq!(u("%#08x", 255), "0x0000ff");
        assert_eq!(u("%o", 8), "10");
        assert_eq!(u("%#o", 8), "010");
        assert_eq!(u("%#o", 0), "0");
    }

    #[test]
    fn chars_strings_pointers() {
        assert_eq!(render("%c", |o, _, s| character(o, b'z', s)), "z");
        assert_eq!(render("%3c", |o, _, s| character(o, b'z', s)), "  z");
        assert_eq!(render("%s", |o, _, s| string(o, b"hello", s)), "hello");
        assert_eq!(render("%.2s", |o, _, s| string(o, b"hello", s)), "he");
        assert_eq!(render("%-7s", |o, _, s| string(o, b"hi", s)), "hi     ");
        assert_eq!(render("%p", |o, _, s| pointer(o, 0x1234, s)), "0x1234");
        assert_eq!(render("%p", |o, _, s| pointer(o, 0, s)), "(nil)");
    }

    #[test]
    fn fixed_and_exponent() {
        assert_eq!(g("%f", 1.5), "1.500000");
        assert_eq!(g("%.2f", -3.14159), "-3.14");
        assert_eq!(g("%8.2f", 3.14159), "    3.14");
        assert_eq!(g("%08.2f", -3.14159), "-0003.14");
        assert_eq!(g("%.0f", 2.0), "2");
        assert_eq!(g("%#.0f", 2.0), "2.");
        assert_eq!(g("%e", 1.5), "1.500000e+00");
        assert_eq!(g("%.2E", 12345.678), "1.23E+04");
        assert_eq!(g("%e", 0.000123), "1.230000e-04");
        assert_eq!(g("%f", f64::INFINITY), "inf");
        assert_eq!(g("%F", f64::NAN), "NAN");
        assert_eq!(g("%f", f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn general_format() {
        assert_eq!(g("%g", 100000.0), "100000");
        assert_eq!(g("%g", 1000000.0), "1e+06");
        assert_eq!(g("%g", 0.0001), "0.0001");
        assert_eq!(g("%g", 0.00001), "1e-05");
        assert_eq!(g("%g", 3.14159), "3.14159");
        assert_eq!(g("%.3g", 3.14159), "3.14");
        assert_eq!(g("%g", 1.5), "1.5");
        assert_eq!(g("%g", 0.0), "0");
        assert_eq!(g("%#g", 1.5), "1.50000");
        assert_eq!(g("%G", 1e-10), "1E-10");
        assert_eq!(g("%.0g", 30.0), "3e+01");
    }

    #[test]
    fn star_fields() {
        let parsed = FormatString::parse("%*.*d").unwrap();
        let token = parsed.tokens[0];

        let spec = Resolved::new(&token, Some(-6), Some(3));
        let mut out = String::new();
        signed(&mut out, 5, &spec);
        assert_eq!(out, "005   ");

        let spec = Resolved::new(&token, Some(4), Some(-1));
        let mut out = String::new();
        signed(&mut out, 5, &spec);
        assert_eq!(out, "   5");
    }
}
