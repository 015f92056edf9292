//! Typed schema trees.

use indexmap::IndexMap;
use serde_json::{Map, Value as Json, json};

/// Scalar types a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Integer,
    Boolean,
    Float,
    /// Untyped or unknown type name.
    Any,
}

impl ScalarType {
    /// Name used in the flat schema contract.
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Boolean => "boolean",
            ScalarType::Float => "float",
            ScalarType::Any => "any",
        }
    }
}

/// How often a field may appear: `(1,1)` required, `(0,1)` optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub min: u8,
    pub max: u8,
}

impl Cardinality {
    pub const REQUIRED: Cardinality = Cardinality { min: 1, max: 1 };
    pub const OPTIONAL: Cardinality = Cardinality { min: 0, max: 1 };
    /// Nodes that are not fields of an object, e.g. sequence elements.
    pub const UNSPECIFIED: Cardinality = Cardinality { min: 0, max: 0 };

    pub fn is_required(self) -> bool {
        self.min == 1
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::UNSPECIFIED
    }
}

/// Bookkeeping shared by every schema node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMeta {
    pub cardinality: Cardinality,
    /// Optional fields users are nudged to fill in.
    pub recommended: bool,
    /// Human-readable description.
    pub comment: Option<String>,
    /// Default the field is compared against. Sequence and object defaults
    /// are normalized to `[]` and `{}`.
    pub default: Option<Json>,
    /// Default exactly as written in the schema source.
    pub source_default: Option<Json>,
    pub examples: Vec<Json>,
}

/// What a schema node describes.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Scalar(ScalarType),
    /// Homogeneous collection of elements.
    Sequence(Box<SchemaNode>),
    /// Fixed-shape level with named fields.
    Object(ObjectShape),
}

/// One node of a schema tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub meta: FieldMeta,
    pub kind: NodeKind,
}

impl SchemaNode {
    pub fn scalar(ty: ScalarType, cardinality: Cardinality) -> Self {
        SchemaNode {
            meta: FieldMeta {
                cardinality,
                ..FieldMeta::default()
            },
            kind: NodeKind::Scalar(ty),
        }
    }

    pub fn sequence(element: SchemaNode, cardinality: Cardinality) -> Self {
        SchemaNode {
            meta: FieldMeta {
                cardinality,
                ..FieldMeta::default()
            },
            kind: NodeKind::Sequence(Box::new(element)),
        }
    }

    pub fn object(shape: ObjectShape, cardinality: Cardinality) -> Self {
        SchemaNode {
            meta: FieldMeta {
                cardinality,
                ..FieldMeta::default()
            },
            kind: NodeKind::Object(shape),
        }
    }

    pub fn with_default(mut self, default: Json) -> Self {
        self.meta.source_default = Some(default.clone());
        self.meta.default = Some(default);
        self
    }

    /// Keep `source` as the written default next to the normalized one.
    pub fn with_source_default(mut self, source: Json) -> Self {
        self.meta.source_default = Some(source);
        self
    }

    pub fn recommended(mut self) -> Self {
        self.meta.recommended = true;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.meta.comment = Some(comment.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.meta.cardinality.is_required()
    }

    /// Optional and flagged as recommended.
    pub fn is_recommended(&self) -> bool {
        !self.is_required() && self.meta.recommended
    }

    pub fn as_object(&self) -> Option<&ObjectShape> {
        match &self.kind {
            NodeKind::Object(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&SchemaNode> {
        match &self.kind {
            NodeKind::Sequence(element) => Some(element),
            _ => None,
        }
    }

    /// The node in the flat `{type, minValue, maxValue, items, default,
    /// comment}` shape.
    pub fn to_json(&self) -> Json {
        let mut out = Map::new();
        let ty = match &self.kind {
            NodeKind::Scalar(ty) => ty.name(),
            NodeKind::Sequence(_) => "array",
            NodeKind::Object(_) => "object",
        };
        out.insert("type".into(), json!(ty));
        if self.meta.cardinality != Cardinality::UNSPECIFIED {
            out.insert("minValue".into(), json!(self.meta.cardinality.min));
            out.insert("maxValue".into(), json!(self.meta.cardinality.max));
        }
        if self.meta.recommended {
            out.insert("recommended".into(), json!(true));
        }
        match &self.kind {
            NodeKind::Scalar(_) => {}
            NodeKind::Sequence(element) => {
                out.insert("items".into(), element.to_json());
            }
            NodeKind::Object(shape) => {
                out.insert("items".into(), shape.to_json());
            }
        }
        if let Some(default) = &self.meta.default {
            out.insert("default".into(), default.clone());
        }
        if let Some(comment) = &self.meta.comment {
            out.insert("comment".into(), json!(comment));
        }
        if !self.meta.examples.is_empty() {
            out.insert("examples".into(), Json::Array(self.meta.examples.clone()));
        }
        Json::Object(out)
    }
}

/// Named fields of an object level, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectShape {
    fields: IndexMap<String, SchemaNode>,
}

impl ObjectShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, node: SchemaNode) {
        self.fields.insert(name.into(), node);
    }

    pub fn with(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        self.insert(name, node);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.fields.get(name)
    }

    /// The field with the name as stored in the shape.
    pub fn get_key_value(&self, name: &str) -> Option<(&str, &SchemaNode)> {
        self.fields
            .get_key_value(name)
            .map(|(name, node)| (name.as_str(), node))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.fields.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A copy without the field `name`.
    pub fn without(&self, name: &str) -> ObjectShape {
        let mut fields = self.fields.clone();
        fields.shift_remove(name);
        ObjectShape { fields }
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.fields
                .iter()
                .map(|(name, node)| (name.clone(), node.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, SchemaNode)> for ObjectShape {
    fn from_iter<T: IntoIterator<Item = (String, SchemaNode)>>(iter: T) -> Self {
        ObjectShape {
            fields: iter.into_iter().collect(),
        }
    }
}

/// The three schema trees of one generator project.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schemata {
    pub extension: ObjectShape,
    pub primitive: ObjectShape,
    pub primitive_class: ObjectShape,
}

impl Schemata {
    pub fn to_json(&self) -> Json {
        json!({
            "extension": self.extension.to_json(),
            "primitive": self.primitive.to_json(),
            "primitive_class": self.primitive_class.to_json(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_keeps_declaration_order() {
        let shape = ObjectShape::new()
            .with("zeta", SchemaNode::scalar(ScalarType::String, Cardinality::REQUIRED))
            .with("alpha", SchemaNode::scalar(ScalarType::String, Cardinality::OPTIONAL));
        assert_eq!(shape.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        let trimmed = shape.without("zeta");
        assert_eq!(trimmed.keys().collect::<Vec<_>>(), vec!["alpha"]);
    }

    #[test]
    fn test_recommended_requires_optional() {
        let required = SchemaNode::scalar(ScalarType::String, Cardinality::REQUIRED).recommended();
        assert!(!required.is_recommended());
        let optional = SchemaNode::scalar(ScalarType::String, Cardinality::OPTIONAL).recommended();
        assert!(optional.is_recommended());
    }

    #[test]
    fn test_flat_contract_shape() {
        let node = SchemaNode::sequence(
            SchemaNode::scalar(ScalarType::String, Cardinality::UNSPECIFIED),
            Cardinality::OPTIONAL,
        )
        .with_default(json!([]))
        .with_comment("Flags");
        insta::assert_snapshot!(node.to_json().to_string(), @r#"{"type":"array","minValue":0,"maxValue":1,"items":{"type":"string"},"default":[],"comment":"Flags"}"#);
    }
}
