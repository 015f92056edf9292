//! YAML support for tslgen data files.
//!
//! Two independent views of a data file live here:
//! - a span-tracking tree built from a real YAML parser ([`parse_stream`]),
//!   used for diagnostics, outlines and previews of complete documents;
//! - a line-textual scanner and cursor-context resolver ([`scan`], [`context`])
//!   that work on partially written text, used for completions.

mod builder;
pub mod context;
pub mod scan;
mod span;
mod value;

pub use builder::parse_stream;
pub use context::{CursorContext, KeyChain, resolve};
pub use span::{LineIndex, LinePosition, Span};
pub use value::{Document, DocumentRange, Entry, Node, Problem, Scalar, ScalarKind, Severity, Stream, Value};
