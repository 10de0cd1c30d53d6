//! Format string catalog and argument interpolation.

mod catalog;
mod interpolate;
mod printf;
mod token;

pub use catalog::{CatalogMode, FormatCatalog};
pub use interpolate::{
    canonical_blob, interpolate, render_message, ArgValue, ArgVisitor, BlobEncoder, DualVisitor,
    MessageRenderer, StarArgs, CURRENT_PROTOCOL_VERSION, WIDE_ARGS_PROTOCOL_VERSION,
};
pub use printf::MAX_FIELD;
pub use token::{
    FieldSpec, FormatFlags, FormatString, FormatToken, SizeModifier, ValueKind, TAG_LITERAL,
    TAG_TOKEN,
};
