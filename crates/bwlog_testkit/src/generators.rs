//! Property-based test generators using proptest.
//!
//! Provides strategies for messages whose rendering is known in advance,
//! so stored entries can be checked against what was sent.

use crate::args::ArgsBuilder;
use proptest::prelude::*;

/// A format string, its arguments, and the text it renders to.
#[derive(Debug, Clone)]
pub struct GeneratedMessage {
    /// The format text.
    pub format: String,
    /// The argument stream.
    pub args: Vec<u8>,
    /// What rendering must produce.
    pub expected: String,
}

#[derive(Debug, Clone)]
enum Piece {
    Literal(String),
    Int(i32),
    Uint(u32),
    Hex(u32),
    Long(i64),
    Str(String),
    Percent,
}

fn piece_strategy() -> impl Strategy<Value = Piece> {
    prop_oneof![
        prop::string::string_regex("[a-zA-Z .,:=]{1,8}")
            .expect("Invalid regex")
            .prop_map(Piece::Literal),
        any::<i32>().prop_map(Piece::Int),
        any::<u32>().prop_map(Piece::Uint),
        any::<u32>().prop_map(Piece::Hex),
        any::<i64>().prop_map(Piece::Long),
        prop::string::string_regex("[a-z0-9 ]{0,300}")
            .expect("Invalid regex")
            .prop_map(Piece::Str),
        Just(Piece::Percent),
    ]
}

/// Strategy for messages built from literals and integer and string
/// conversions.
pub fn message_strategy() -> impl Strategy<Value = GeneratedMessage> {
    prop::collection::vec(piece_strategy(), 0..8).prop_map(|pieces| {
        let mut format = String::new();
        let mut expected = String::new();
        let mut args = ArgsBuilder::new();
        for piece in pieces {
            match piece {
                Piece::Literal(text) => {
                    format.push_str(&text);
                    expected.push_str(&text);
                }
                Piece::Int(v) => {
                    format.push_str("%d");
                    expected.push_str(&v.to_string());
                    args = args.int(v);
                }
                Piece::Uint(v) => {
                    format.push_str("%u");
                    expected.push_str(&v.to_string());
                    args = args.uint(v);
                }
                Piece::Hex(v) => {
                    format.push_str("%x");
                    expected.push_str(&format!("{v:x}"));
                    args = args.uint(v);
                }
                Piece::Long(v) => {
                    format.push_str("%lld");
                    expected.push_str(&v.to_string());
                    args = args.long(v);
                }
                Piece::Str(s) => {
                    format.push_str("%s");
                    expected.push_str(&s);
                    args = args.string(&s);
                }
                Piece::Percent => {
                    format.push_str("%%");
                    expected.push('%');
                }
            }
        }
        GeneratedMessage {
            format,
            args: args.build(),
            expected,
        }
    })
}

/// Strategy for raw priorities, including ones with no name.
pub fn priority_strategy() -> impl Strategy<Value = u8> {
    0u8..12
}

/// Strategy for gaps between consecutive entries, in milliseconds.
pub fn time_step_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), 1u64..1000, 1000u64..5000]
}
