//! Value types for parsed YAML streams.
//!
//! Every node carries the byte span it was parsed from, so consumers can map
//! schema findings back onto the source text. Anchors are already resolved:
//! an alias is a copy of the anchored node, spanned at the alias.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number};

use crate::span::Span;

/// Key that merges another mapping into the enclosing one.
const MERGE_KEY: &str = "<<";

/// All documents of one YAML stream plus everything the parser complained about.
#[derive(Debug, Clone, Default)]
pub struct Stream {
    /// Documents in source order.
    pub documents: Vec<Document>,
    /// Syntax errors and warnings, in the order they were found.
    pub problems: Vec<Problem>,
}

impl Stream {
    /// The document whose range contains `offset`, with its index.
    pub fn document_at(&self, offset: usize) -> Option<(usize, &Document)> {
        self.documents
            .iter()
            .enumerate()
            .find(|(_, doc)| doc.range.start <= offset && offset <= doc.range.end)
    }
}

/// One YAML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Root node, `None` for a document without content.
    pub root: Option<Node>,
    /// Where the document sits in the source.
    pub range: DocumentRange,
}

impl Document {
    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.root.as_ref()?.get(key)
    }

    /// Whether the document has a top-level key.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The document contents as JSON (`null` when empty).
    pub fn to_json(&self) -> serde_json::Value {
        self.root
            .as_ref()
            .map_or(serde_json::Value::Null, Node::to_json)
    }
}

/// Byte offsets of a document: where it starts (including a `---` marker),
/// where its content ends and where the document ends (including a `...`
/// marker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentRange {
    pub start: usize,
    pub content_end: usize,
    pub end: usize,
}

/// A node with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: Value,
    pub span: Span,
}

/// The payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(Vec<Entry>),
}

/// A scalar value.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    /// The text content, with quotes and escapes already processed.
    pub text: String,
    /// What kind of scalar syntax was used.
    pub kind: ScalarKind,
}

/// Scalar syntax. Only plain scalars take part in type resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Plain,
    Quoted,
    Block,
}

/// A key/value pair in a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: Node,
    pub value: Node,
}

/// Severity of a parser problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A syntax error or warning reported while building the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub severity: Severity,
    /// Stable identifier, e.g. `SCAN_ERROR` or `DUPLICATE_KEY`.
    pub code: &'static str,
    /// Message as produced by the parser, location text included.
    pub message: String,
    pub span: Span,
}

impl Problem {
    /// Label used when surfacing the problem to users.
    pub fn name(&self) -> &'static str {
        match self.severity {
            Severity::Error => "YAMLParseError",
            Severity::Warning => "YAMLWarning",
        }
    }
}

impl Node {
    /// Create a plain scalar node.
    pub fn scalar(text: impl Into<String>, span: Span) -> Self {
        Node {
            value: Value::Scalar(Scalar {
                text: text.into(),
                kind: ScalarKind::Plain,
            }),
            span,
        }
    }

    /// Create an implicit null at a position.
    pub fn null(at: usize) -> Self {
        Node::scalar("", Span::empty(at))
    }

    /// Get a mapping value by key. Keys pulled in through `<<` merge keys are
    /// found as well; explicit keys win.
    pub fn get(&self, key: &str) -> Option<&Node> {
        let entries = self.as_mapping()?;
        if let Some(entry) = entries.iter().find(|e| e.key.as_str() == Some(key)) {
            return Some(&entry.value);
        }
        merge_sources(entries).find_map(|source| source.get(key))
    }

    /// Whether this is a mapping containing `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get the text of a non-null scalar.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Scalar(scalar) if !scalar.is_null() => Some(&scalar.text),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.value {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[Entry]> {
        match &self.value {
            Value::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// Whether this node is a null scalar (`~`, `null`, or nothing at all).
    pub fn is_null(&self) -> bool {
        matches!(&self.value, Value::Scalar(scalar) if scalar.is_null())
    }

    /// Keys of a mapping in source order. Empty for other nodes.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.as_mapping()
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| entry.key.as_str())
    }

    /// Scalar text or the items of a sequence of scalars, as strings.
    pub fn string_list(&self) -> Vec<String> {
        match &self.value {
            Value::Sequence(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Value::Scalar(_) => self.as_str().map(str::to_string).into_iter().collect(),
            Value::Mapping(_) => Vec::new(),
        }
    }

    /// Convert to JSON, resolving plain scalars with the YAML core schema and
    /// applying merge keys.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.value {
            Value::Scalar(scalar) => scalar.to_json(),
            Value::Sequence(items) => items.iter().map(Node::to_json).collect(),
            Value::Mapping(entries) => {
                let mut map = Map::new();
                for entry in entries {
                    if is_merge_key(&entry.key) {
                        continue;
                    }
                    map.insert(entry.key.key_string(), entry.value.to_json());
                }
                for source in merge_sources(entries) {
                    if let serde_json::Value::Object(merged) = source.to_json() {
                        for (key, value) in merged {
                            map.entry(key).or_insert(value);
                        }
                    }
                }
                serde_json::Value::Object(map)
            }
        }
    }

    fn key_string(&self) -> String {
        match &self.value {
            Value::Scalar(scalar) => scalar.text.clone(),
            _ => self.to_json().to_string(),
        }
    }
}

fn is_merge_key(key: &Node) -> bool {
    matches!(&key.value, Value::Scalar(s) if s.kind == ScalarKind::Plain && s.text == MERGE_KEY)
}

/// Mappings referenced by `<<` entries, in precedence order.
fn merge_sources(entries: &[Entry]) -> impl Iterator<Item = &Node> {
    entries
        .iter()
        .filter(|entry| is_merge_key(&entry.key))
        .flat_map(|entry| match &entry.value.value {
            Value::Mapping(_) => std::slice::from_ref(&entry.value),
            Value::Sequence(items) => items.as_slice(),
            Value::Scalar(_) => &[],
        })
        .filter(|node| node.as_mapping().is_some())
}

static INT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-+]?[0-9]+|0o[0-7]+|0x[0-9a-fA-F]+)$").expect("int pattern"));
static FLOAT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(?:\.[0-9]+|[0-9]+(?:\.[0-9]*)?)(?:[eE][-+]?[0-9]+)?$").expect("float pattern")
});

impl Scalar {
    /// Whether this scalar resolves to null.
    pub fn is_null(&self) -> bool {
        self.kind == ScalarKind::Plain && matches!(self.text.as_str(), "" | "~" | "null" | "Null" | "NULL")
    }

    /// Resolve to JSON with the YAML core schema. Non-plain scalars are
    /// always strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        if self.kind != ScalarKind::Plain {
            return Json::String(self.text.clone());
        }
        let text = self.text.as_str();
        if self.is_null() {
            return Json::Null;
        }
        match text {
            "true" | "True" | "TRUE" => return Json::Bool(true),
            "false" | "False" | "FALSE" => return Json::Bool(false),
            _ => {}
        }
        if INT_PATTERN.is_match(text) {
            let parsed = if let Some(octal) = text.strip_prefix("0o") {
                i64::from_str_radix(octal, 8).ok()
            } else if let Some(hex) = text.strip_prefix("0x") {
                i64::from_str_radix(hex, 16).ok()
            } else {
                text.parse::<i64>().ok()
            };
            if let Some(n) = parsed {
                return Json::Number(n.into());
            }
        }
        if FLOAT_PATTERN.is_match(text) {
            if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
                return Json::Number(n);
            }
        }
        Json::String(self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain(text: &str) -> Scalar {
        Scalar {
            text: text.to_string(),
            kind: ScalarKind::Plain,
        }
    }

    #[test]
    fn test_core_schema_resolution() {
        assert_eq!(plain("").to_json(), json!(null));
        assert_eq!(plain("~").to_json(), json!(null));
        assert_eq!(plain("True").to_json(), json!(true));
        assert_eq!(plain("42").to_json(), json!(42));
        assert_eq!(plain("-7").to_json(), json!(-7));
        assert_eq!(plain("0x1f").to_json(), json!(31));
        assert_eq!(plain("0o17").to_json(), json!(15));
        assert_eq!(plain("1.5").to_json(), json!(1.5));
        assert_eq!(plain("1e3").to_json(), json!(1000.0));
        assert_eq!(plain("int32_t").to_json(), json!("int32_t"));
        assert_eq!(plain("yes").to_json(), json!("yes"));
    }

    #[test]
    fn test_quoted_scalars_stay_strings() {
        let scalar = Scalar {
            text: "42".to_string(),
            kind: ScalarKind::Quoted,
        };
        assert_eq!(scalar.to_json(), json!("42"));
        let empty = Scalar {
            text: String::new(),
            kind: ScalarKind::Quoted,
        };
        assert!(!empty.is_null());
        assert_eq!(empty.to_json(), json!(""));
    }

    #[test]
    fn test_merge_keys() {
        let span = Span::default();
        let base = Node {
            value: Value::Mapping(vec![
                Entry {
                    key: Node::scalar("a", span),
                    value: Node::scalar("1", span),
                },
                Entry {
                    key: Node::scalar("b", span),
                    value: Node::scalar("2", span),
                },
            ]),
            span,
        };
        let node = Node {
            value: Value::Mapping(vec![
                Entry {
                    key: Node::scalar("<<", span),
                    value: base,
                },
                Entry {
                    key: Node::scalar("b", span),
                    value: Node::scalar("3", span),
                },
            ]),
            span,
        };
        assert_eq!(node.to_json(), json!({"b": 3, "a": 1}));
        assert_eq!(node.get("a").and_then(Node::as_str), Some("1"));
        assert_eq!(node.get("b").and_then(Node::as_str), Some("3"));
        assert!(!node.has("c"));
    }
}
