//! Default entries derived from a schema.

use serde_json::{Map, Value as Json};

use crate::fields;
use crate::model::{NodeKind, ObjectShape, Schemata};

/// Default values of a level: every field with a `default` as written in
/// the schema source, plus object fields whose own fields carry defaults.
pub fn create_default_entry(shape: &ObjectShape) -> Map<String, Json> {
    let mut entry = Map::new();
    for (name, node) in shape.iter() {
        if let Some(default) = &node.meta.source_default {
            entry.insert(name.to_string(), default.clone());
        } else if let NodeKind::Object(nested) = &node.kind {
            let nested = create_default_entry(nested);
            if !nested.is_empty() {
                entry.insert(name.to_string(), Json::Object(nested));
            }
        }
    }
    entry
}

/// Insert the keys of `extender` that `base` does not have yet.
pub fn extend(base: &mut Map<String, Json>, extender: &Map<String, Json>) {
    for (key, value) in extender {
        if !base.contains_key(key) {
            base.insert(key.clone(), value.clone());
        }
    }
}

/// Defaults for the three kinds of entries a data file can hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDefaults {
    pub extension: Map<String, Json>,
    /// A primitive document without its `definitions`.
    pub primitive_declaration: Map<String, Json>,
    /// One element of `definitions`.
    pub primitive_definition: Map<String, Json>,
}

impl SchemaDefaults {
    /// Collect defaults, adding `namespace_key: namespace` to the extension
    /// and declaration defaults.
    pub fn from_schemata(schemata: &Schemata, namespace_key: &str, namespace: &str) -> Self {
        let mut extension = create_default_entry(&schemata.extension);
        extension.insert(namespace_key.to_string(), Json::from(namespace));

        let mut primitive_declaration =
            create_default_entry(&schemata.primitive.without(fields::DEFINITIONS));
        primitive_declaration.insert(namespace_key.to_string(), Json::from(namespace));

        let primitive_definition = schemata
            .primitive
            .get(fields::DEFINITIONS)
            .and_then(|definitions| definitions.element())
            .and_then(|element| element.as_object())
            .map(create_default_entry)
            .unwrap_or_default();

        SchemaDefaults {
            extension,
            primitive_declaration,
            primitive_definition,
        }
    }
}
