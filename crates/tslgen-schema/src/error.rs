//! Schema loading errors.

/// Why a schema source could not be turned into [`crate::Schemata`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema source is not valid YAML: {0}")]
    Syntax(String),

    #[error("no valid data found in schema source")]
    Empty,

    #[error("expected 1 YAML document in schema source but found {0}")]
    MultipleDocuments(usize),

    #[error("required top-level key `{0}` is not present in schema source")]
    MissingKey(&'static str),

    #[error("invalid schema field `{path}`: {reason}")]
    InvalidField { path: String, reason: String },
}
