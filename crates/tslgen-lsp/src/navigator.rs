//! Walking a schema along an ancestor key chain.

use tslgen_schema::{NodeKind, ObjectShape, SchemaNode};
use tslgen_yaml::KeyChain;
use tslgen_yaml::scan::ITEMS_KEY;

/// The schema level the cursor sits at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Level<'s> {
    /// A homogeneous sequence; new entries follow `element`.
    Sequence {
        /// Key of the sequence field.
        key: &'s str,
        element: &'s SchemaNode,
    },
    /// A mapping with the given legal fields.
    Fields(&'s ObjectShape),
}

/// Follow `ancestors` from the document root down to the cursor's level.
///
/// Returns `None` when a key has no counterpart in the schema or the chain
/// ends at a scalar.
pub fn navigate<'s>(root: &'s ObjectShape, ancestors: &KeyChain) -> Option<Level<'s>> {
    let mut level = Level::Fields(root);
    for key in ancestors.from_root() {
        let (name, node) = match level {
            Level::Fields(shape) => shape.get_key_value(key)?,
            // A sequence directly inside a sequence keeps the outer key.
            Level::Sequence { key: outer, element } if key == ITEMS_KEY => (outer, element),
            Level::Sequence { .. } => return None,
        };
        level = match &node.kind {
            NodeKind::Sequence(element) => Level::Sequence { key: name, element },
            NodeKind::Object(shape) => Level::Fields(shape),
            NodeKind::Scalar(_) => return None,
        };
    }
    Some(level)
}
