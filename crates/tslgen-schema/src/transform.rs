//! Turning the generator's schema source into [`SchemaNode`] trees.
//!
//! The source is a single YAML document whose top-level entries are
//! "complex fields": mappings with a `required` and/or `optional` section,
//! each listing field specs by name. A field spec looks like
//!
//! ```yaml
//! lscpu_flags:
//!   type: list
//!   entry_type: str
//!   brief: "Flags the definition depends on."
//!   default: []
//! ```

use serde_json::{Map, Value as Json};
use tracing::debug;
use tslgen_yaml::{Severity, parse_stream};

use crate::error::SchemaError;
use crate::model::{Cardinality, FieldMeta, NodeKind, ObjectShape, ScalarType, SchemaNode, Schemata};

/// Top-level entries every schema source has to provide.
pub const TOP_LEVEL_KEYS: [&str; 3] = ["extension", "primitive", "primitive_class"];

const REQUIRED: &str = "required";
const OPTIONAL: &str = "optional";

/// Parse and transform a schema source.
pub fn parse_schemata(source: &str) -> Result<Schemata, SchemaError> {
    let stream = parse_stream(source);
    if let Some(problem) = stream
        .problems
        .iter()
        .find(|problem| problem.severity == Severity::Error)
    {
        return Err(SchemaError::Syntax(problem.message.clone()));
    }

    let documents: Vec<Json> = stream
        .documents
        .iter()
        .filter(|doc| doc.root.is_some())
        .map(|doc| doc.to_json())
        .collect();
    let document = match documents.as_slice() {
        [] => return Err(SchemaError::Empty),
        [document] => document,
        _ => return Err(SchemaError::MultipleDocuments(documents.len())),
    };

    let [extension, primitive, primitive_class] = TOP_LEVEL_KEYS;
    let top_level = |key: &'static str| document.get(key).ok_or(SchemaError::MissingKey(key));
    let (extension_source, primitive_source, primitive_class_source) = (
        top_level(extension)?,
        top_level(primitive)?,
        top_level(primitive_class)?,
    );

    let schemata = Schemata {
        extension: transform_complex_field(extension_source, extension)?,
        primitive: transform_complex_field(primitive_source, primitive)?,
        primitive_class: transform_complex_field(primitive_class_source, primitive_class)?,
    };
    debug!(
        extension = schemata.extension.len(),
        primitive = schemata.primitive.len(),
        primitive_class = schemata.primitive_class.len(),
        "Transformed schema source"
    );
    Ok(schemata)
}

/// Whether `value` has a `required` or `optional` section.
fn is_complex_field(value: &Json) -> bool {
    value.as_object().is_some_and(has_sections)
}

fn has_sections(map: &Map<String, Json>) -> bool {
    map.contains_key(REQUIRED) || map.contains_key(OPTIONAL)
}

/// Transform a complex field into the shape of the level it describes.
///
/// Fields are kept in source order, `required` and `optional` sections
/// interleaved as they appear. `path` names the field for error messages.
pub fn transform_complex_field(value: &Json, path: &str) -> Result<ObjectShape, SchemaError> {
    let Some(sections) = value.as_object() else {
        return Err(invalid(path, "expected a mapping with `required`/`optional` sections"));
    };
    transform_sections(sections, path)
}

fn transform_sections(sections: &Map<String, Json>, path: &str) -> Result<ObjectShape, SchemaError> {
    let mut shape = ObjectShape::new();
    for (section, fields) in sections {
        let cardinality = match section.as_str() {
            REQUIRED => Cardinality::REQUIRED,
            OPTIONAL => Cardinality::OPTIONAL,
            other => {
                debug!(path, section = other, "Ignoring unknown schema section");
                continue;
            }
        };
        let fields = match fields {
            Json::Object(fields) => fields,
            Json::Null => continue,
            _ => return Err(invalid(&format!("{path}.{section}"), "expected a mapping of fields")),
        };
        for (name, spec) in fields {
            let field_path = format!("{path}.{name}");
            shape.insert(name.clone(), transform_field(spec, cardinality, &field_path)?);
        }
    }
    Ok(shape)
}

fn transform_field(spec: &Json, cardinality: Cardinality, path: &str) -> Result<SchemaNode, SchemaError> {
    let spec = match spec {
        Json::Object(spec) => spec,
        Json::Null => return Ok(SchemaNode::scalar(ScalarType::Any, cardinality)),
        _ => return Err(invalid(path, "expected a mapping")),
    };

    let kind = match spec.get("type") {
        Some(Json::String(name)) => kind_for(name, spec, path)?,
        Some(other) => return Err(invalid(path, &format!("`type` must be a string, found {other}"))),
        None if has_sections(spec) => NodeKind::Object(transform_sections(spec, path)?),
        None => NodeKind::Scalar(ScalarType::Any),
    };

    let default = spec.get("default").map(|default| match &kind {
        NodeKind::Object(_) => Json::Object(Map::new()),
        NodeKind::Sequence(_) => Json::Array(Vec::new()),
        NodeKind::Scalar(_) => default.clone(),
    });
    let comment = spec.get("brief").map(|brief| match brief {
        Json::String(text) => text.clone(),
        other => other.to_string(),
    });
    let examples = match spec.get("example") {
        Some(Json::Array(items)) => items.clone(),
        Some(Json::Null) | None => Vec::new(),
        Some(single) => vec![single.clone()],
    };
    let recommended = spec
        .get("recommended")
        .is_some_and(|flag| flag.as_bool().unwrap_or(!flag.is_null()));

    Ok(SchemaNode {
        meta: FieldMeta {
            cardinality,
            recommended,
            comment,
            default,
            source_default: spec.get("default").cloned(),
            examples,
        },
        kind,
    })
}

fn kind_for(type_name: &str, spec: &Map<String, Json>, path: &str) -> Result<NodeKind, SchemaError> {
    let kind = match type_name {
        "list" | "array" => NodeKind::Sequence(Box::new(element_for(spec.get("entry_type"), path)?)),
        "dict" | "object" => {
            let shape = match spec.get("entry_type") {
                Some(entry) if is_complex_field(entry) => transform_complex_field(entry, path)?,
                _ if has_sections(spec) => transform_sections(spec, path)?,
                _ => ObjectShape::new(),
            };
            NodeKind::Object(shape)
        }
        other => NodeKind::Scalar(scalar_type(other).unwrap_or_else(|| {
            debug!(path, type_name = other, "Unknown schema type, treating as untyped");
            ScalarType::Any
        })),
    };
    Ok(kind)
}

/// Element node of a sequence field, from its `entry_type`.
fn element_for(entry_type: Option<&Json>, path: &str) -> Result<SchemaNode, SchemaError> {
    let element_path = format!("{path}.items");
    let element = match entry_type {
        None | Some(Json::Null) => SchemaNode::scalar(ScalarType::Any, Cardinality::UNSPECIFIED),
        Some(Json::String(name)) => match scalar_type(name) {
            Some(ty) => SchemaNode::scalar(ty, Cardinality::UNSPECIFIED),
            None => match kind_for(name, &Map::new(), &element_path)? {
                NodeKind::Scalar(ty) => SchemaNode::scalar(ty, Cardinality::UNSPECIFIED),
                kind => SchemaNode {
                    meta: FieldMeta::default(),
                    kind,
                },
            },
        },
        Some(entry) if is_complex_field(entry) => SchemaNode::object(
            transform_complex_field(entry, &element_path)?,
            Cardinality::UNSPECIFIED,
        ),
        Some(entry) => transform_field(entry, Cardinality::UNSPECIFIED, &element_path)?,
    };
    Ok(element)
}

fn scalar_type(name: &str) -> Option<ScalarType> {
    match name {
        "str" | "string" => Some(ScalarType::String),
        "int" | "integer" => Some(ScalarType::Integer),
        "bool" | "boolean" => Some(ScalarType::Boolean),
        "float" | "double" => Some(ScalarType::Float),
        _ => None,
    }
}

fn invalid(path: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidField {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SCHEMA: &str = r#"
extension:
  required:
    extension_name:
      type: str
      brief: "Name of the extension."
    vector_width:
      type: int
  optional:
    lscpu_flags:
      type: list
      entry_type: str
      default: []
      recommended: true
primitive:
  required:
    primitive_name:
      type: str
  optional:
    definitions:
      type: list
      entry_type:
        required:
          target_extension:
            type: str
          ctype:
            type: str
        optional:
          lscpu_flags:
            type: list
            entry_type: str
            default: ['sse2']
primitive_class:
  required:
    name:
      type: str
"#;

    #[test]
    fn test_transforms_cardinality_and_types() {
        let schemata = parse_schemata(SCHEMA).unwrap();
        let name = schemata.extension.get("extension_name").unwrap();
        assert_eq!(name.meta.cardinality, Cardinality::REQUIRED);
        assert_eq!(name.kind, NodeKind::Scalar(ScalarType::String));
        assert_eq!(name.meta.comment.as_deref(), Some("Name of the extension."));

        let width = schemata.extension.get("vector_width").unwrap();
        assert_eq!(width.kind, NodeKind::Scalar(ScalarType::Integer));

        let flags = schemata.extension.get("lscpu_flags").unwrap();
        assert_eq!(flags.meta.cardinality, Cardinality::OPTIONAL);
        assert!(flags.is_recommended());
        assert_eq!(
            flags.element().unwrap().kind,
            NodeKind::Scalar(ScalarType::String)
        );
    }

    #[test]
    fn test_structured_sequence_elements_become_objects() {
        let schemata = parse_schemata(SCHEMA).unwrap();
        let definitions = schemata.primitive.get("definitions").unwrap();
        let element = definitions.element().unwrap().as_object().unwrap();
        assert_eq!(
            element.keys().collect::<Vec<_>>(),
            vec!["target_extension", "ctype", "lscpu_flags"]
        );
        assert!(element.get("ctype").unwrap().is_required());
    }

    #[test]
    fn test_collection_defaults_are_emptied() {
        let schemata = parse_schemata(SCHEMA).unwrap();
        let element = schemata
            .primitive
            .get("definitions")
            .and_then(SchemaNode::element)
            .and_then(SchemaNode::as_object)
            .unwrap()
            .clone();
        assert_eq!(element.get("lscpu_flags").unwrap().meta.default, Some(json!([])));
    }

    #[test]
    fn test_object_field_with_entry_type() {
        let value = json!({
            "optional": {
                "vendor": {
                    "type": "dict",
                    "default": {"name": "intel"},
                    "entry_type": {"required": {"name": {"type": "str"}}}
                }
            }
        });
        let shape = transform_complex_field(&value, "extension").unwrap();
        let vendor = shape.get("vendor").unwrap();
        assert_eq!(vendor.meta.default, Some(json!({})));
        assert_eq!(vendor.meta.source_default, Some(json!({"name": "intel"})));
        assert!(vendor.as_object().unwrap().contains("name"));
    }

    #[test]
    fn test_unknown_type_is_untyped() {
        let value = json!({"required": {"blob": {"type": "bytes"}, "free": null}});
        let shape = transform_complex_field(&value, "x").unwrap();
        assert_eq!(shape.get("blob").unwrap().kind, NodeKind::Scalar(ScalarType::Any));
        assert_eq!(shape.get("free").unwrap().kind, NodeKind::Scalar(ScalarType::Any));
    }

    #[test]
    fn test_source_errors() {
        assert_eq!(parse_schemata(""), Err(SchemaError::Empty));
        assert_eq!(
            parse_schemata("a: 1\n---\nb: 2\n"),
            Err(SchemaError::MultipleDocuments(2))
        );
        assert_eq!(
            parse_schemata("extension: {}\nprimitive: {}\n"),
            Err(SchemaError::MissingKey("primitive_class"))
        );
        assert!(matches!(
            parse_schemata("extension: [unclosed\n"),
            Err(SchemaError::Syntax(_))
        ));
    }

    #[test]
    fn test_malformed_field_reports_path() {
        let value = json!({"required": {"name": {"type": 3}}});
        let err = transform_complex_field(&value, "primitive").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"invalid schema field `primitive.name`: `type` must be a string, found 3");
    }
}
