//! Parser and schema diagnostics for data files.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Range};
use tslgen_schema::{NodeKind, ObjectShape, Schemata};
use tslgen_yaml::{LineIndex, Node, Problem, Severity, Span, Stream};

use crate::project::DataFileKind;

/// Source tag of every diagnostic.
pub const SOURCE: &str = "yaml";

pub const KEY_ERROR: &str = "KEY_ERROR";
pub const KEY_WARNING: &str = "KEY_WARNING";
pub const VALUE_WARNING: &str = "VALUE_WARNING";

/// Location text the parser appends to its messages.
static LOCATION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" at (line|byte) \d+").expect("valid location pattern"));

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warning,
    Information,
    Hint,
}

impl Level {
    pub fn to_lsp(self) -> DiagnosticSeverity {
        match self {
            Level::Error => DiagnosticSeverity::ERROR,
            Level::Warning => DiagnosticSeverity::WARNING,
            Level::Information => DiagnosticSeverity::INFORMATION,
            Level::Hint => DiagnosticSeverity::HINT,
        }
    }
}

/// One problem found in a data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub span: Span,
    pub level: Level,
    pub code: &'static str,
    pub message: String,
}

impl Finding {
    pub fn to_diagnostic(&self, index: &LineIndex<'_>) -> Diagnostic {
        let start = index.position(self.span.start);
        let end = index.position(self.span.end);
        Diagnostic {
            range: Range {
                start: crate::server::to_lsp_position(start),
                end: crate::server::to_lsp_position(end),
            },
            severity: Some(self.level.to_lsp()),
            code: Some(NumberOrString::String(self.code.to_string())),
            code_description: None,
            source: Some(SOURCE.to_string()),
            message: self.message.clone(),
            related_information: None,
            tags: None,
            data: None,
        }
    }
}

/// All findings for a parsed data file.
///
/// Parser problems are always reported. Schema findings need a schema and a
/// known file kind: in primitive files the first document is the class-level
/// preamble and is checked against `primitive_class`, every other document
/// against `primitive`; extension files are checked against `extension`.
pub fn check(stream: &Stream, kind: DataFileKind, schemata: Option<&Schemata>) -> Vec<Finding> {
    let mut findings: Vec<Finding> = stream.problems.iter().map(parser_finding).collect();

    let Some(schemata) = schemata else {
        return findings;
    };
    for (index, document) in stream.documents.iter().enumerate() {
        let shape = match kind {
            DataFileKind::Primitive if index == 0 => &schemata.primitive_class,
            DataFileKind::Primitive => &schemata.primitive,
            DataFileKind::Extension => &schemata.extension,
            DataFileKind::Unknown => return findings,
        };
        if let Some(root) = &document.root {
            validate(root, shape, &mut findings);
        }
    }
    findings
}

fn parser_finding(problem: &Problem) -> Finding {
    let message = match LOCATION_SUFFIX.find(&problem.message) {
        Some(location) => &problem.message[..location.start()],
        None => problem.message.as_str(),
    };
    Finding {
        span: problem.span,
        level: match problem.severity {
            Severity::Error => Level::Error,
            Severity::Warning => Level::Warning,
        },
        code: problem.code,
        message: format!("{}: {}", problem.name(), message.trim_end()),
    }
}

/// Check a mapping node against the fields of a schema level.
fn validate(node: &Node, shape: &ObjectShape, findings: &mut Vec<Finding>) {
    if node.as_mapping().is_none() {
        return;
    }
    let anchor = Span::new(node.span.start, node.span.start + 1);

    for (name, field) in shape.iter() {
        let Some(value) = node.get(name) else {
            if field.is_required() {
                findings.push(Finding {
                    span: anchor,
                    level: Level::Error,
                    code: KEY_ERROR,
                    message: format!("Missing required field `{name}`"),
                });
            } else if field.is_recommended() {
                findings.push(Finding {
                    span: anchor,
                    level: Level::Information,
                    code: KEY_WARNING,
                    message: format!("Missing recommended field `{name}`"),
                });
            }
            continue;
        };

        if field.meta.recommended
            && field
                .meta
                .default
                .as_ref()
                .is_some_and(|default| *default == value.to_json())
        {
            findings.push(Finding {
                span: value.span,
                level: Level::Hint,
                code: VALUE_WARNING,
                message: format!("Recommended field `{name}` is set to default value"),
            });
        }

        match &field.kind {
            NodeKind::Object(nested) => validate(value, nested, findings),
            NodeKind::Sequence(element) => {
                if let (Some(items), Some(nested)) = (value.as_sequence(), element.as_object()) {
                    for item in items {
                        validate(item, nested, findings);
                    }
                }
            }
            NodeKind::Scalar(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tslgen_schema::{Cardinality, ScalarType, SchemaNode};
    use tslgen_yaml::parse_stream;

    use super::*;

    fn string(cardinality: Cardinality) -> SchemaNode {
        SchemaNode::scalar(ScalarType::String, cardinality)
    }

    fn schemata() -> Schemata {
        let definition = ObjectShape::new()
            .with("target_extension", string(Cardinality::REQUIRED))
            .with("ctype", string(Cardinality::REQUIRED))
            .with(
                "lscpu_flags",
                SchemaNode::sequence(string(Cardinality::UNSPECIFIED), Cardinality::OPTIONAL)
                    .with_default(json!([]))
                    .recommended(),
            );
        Schemata {
            extension: ObjectShape::new()
                .with("extension_name", string(Cardinality::REQUIRED))
                .with(
                    "arch",
                    string(Cardinality::OPTIONAL).with_default(json!("x86")).recommended(),
                ),
            primitive: ObjectShape::new()
                .with("primitive_name", string(Cardinality::REQUIRED))
                .with(
                    "definitions",
                    SchemaNode::sequence(
                        SchemaNode::object(definition, Cardinality::UNSPECIFIED),
                        Cardinality::OPTIONAL,
                    ),
                ),
            primitive_class: ObjectShape::new().with("name", string(Cardinality::REQUIRED)),
        }
    }

    fn codes(findings: &[Finding]) -> Vec<(&'static str, Level)> {
        findings.iter().map(|f| (f.code, f.level)).collect()
    }

    #[test]
    fn test_recommended_field_missing_in_definition() {
        let text = "name: ls\n---\nprimitive_name: foo\ndefinitions:\n  - target_extension: sse\n    ctype: int32_t\n";
        let findings = check(&parse_stream(text), DataFileKind::Primitive, Some(&schemata()));
        assert_eq!(codes(&findings), vec![(KEY_WARNING, Level::Information)]);
        assert_eq!(findings[0].message, "Missing recommended field `lscpu_flags`");
        let item_start = text.find("target_extension").unwrap();
        assert_eq!(findings[0].span, Span::new(item_start, item_start + 1));
    }

    #[test]
    fn test_first_primitive_document_is_the_class() {
        let text = "primitive_name: foo\n";
        let findings = check(&parse_stream(text), DataFileKind::Primitive, Some(&schemata()));
        assert_eq!(codes(&findings), vec![(KEY_ERROR, Level::Error)]);
        assert_eq!(findings[0].message, "Missing required field `name`");
    }

    #[test]
    fn test_extension_fields() {
        let text = "arch: x86\n";
        let findings = check(&parse_stream(text), DataFileKind::Extension, Some(&schemata()));
        assert_eq!(
            codes(&findings),
            vec![(KEY_ERROR, Level::Error), (VALUE_WARNING, Level::Hint)]
        );
        assert_eq!(findings[1].span, Span::new(6, 9));
    }

    #[test]
    fn test_parser_problems_lose_location_text() {
        let text = "a: [1, 2\n";
        let findings = check(&parse_stream(text), DataFileKind::Unknown, None);
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.level, Level::Error);
        assert_eq!(finding.code, "SCAN_ERROR");
        assert!(finding.message.starts_with("YAMLParseError: "), "{}", finding.message);
        assert!(!finding.message.contains(" at line "), "{}", finding.message);
        assert!(!finding.message.contains(" at byte "), "{}", finding.message);
    }

    #[test]
    fn test_duplicate_keys_warn() {
        let findings = check(&parse_stream("a: 1\na: 2\n"), DataFileKind::Unknown, None);
        assert_eq!(codes(&findings), vec![("DUPLICATE_KEY", Level::Warning)]);
    }

    #[test]
    fn test_unknown_kind_skips_schema() {
        let findings = check(&parse_stream("x: 1\n"), DataFileKind::Unknown, Some(&schemata()));
        assert!(findings.is_empty());
    }

    #[test]
    fn test_to_diagnostic() {
        let text = "arch: x86\n";
        let findings = check(&parse_stream(text), DataFileKind::Extension, Some(&schemata()));
        let diagnostic = findings[1].to_diagnostic(&LineIndex::new(text));
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::HINT));
        assert_eq!(diagnostic.source.as_deref(), Some("yaml"));
        assert_eq!(
            diagnostic.code,
            Some(NumberOrString::String("VALUE_WARNING".into()))
        );
        assert_eq!(diagnostic.range.start.character, 6);
        assert_eq!(diagnostic.range.end.character, 9);
    }
}
