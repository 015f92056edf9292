//! Schema model for tslgen data files.
//!
//! The generator ships one YAML schema source describing extensions,
//! primitives and primitive classes. [`parse_schemata`] turns it into typed
//! [`SchemaNode`] trees once per project; the trees are then only read.

mod defaults;
mod error;
pub mod fields;
mod model;
mod transform;

pub use defaults::{SchemaDefaults, create_default_entry, extend};
pub use error::SchemaError;
pub use model::{Cardinality, FieldMeta, NodeKind, ObjectShape, ScalarType, SchemaNode, Schemata};
pub use transform::{TOP_LEVEL_KEYS, parse_schemata, transform_complex_field};
