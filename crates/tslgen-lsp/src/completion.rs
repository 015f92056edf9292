//! Completion suggestions for partially written data files.

use tslgen_schema::{NodeKind, ObjectShape, ScalarType, SchemaNode, Schemata};
use tslgen_yaml::context::document_markers;
use tslgen_yaml::scan::{DOCUMENT_END, DOCUMENT_START};
use tslgen_yaml::{CursorContext, LineIndex, LinePosition, Span, resolve};

use crate::navigator::{Level, navigate};
use crate::project::DataFileKind;

/// What a suggestion inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    /// A whole new document.
    Document,
    /// A new entry of a sequence.
    Element,
    /// A missing field of a mapping.
    Field,
}

/// An editor-neutral completion item.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub label: String,
    pub kind: SuggestionKind,
    /// Snippet text, in the editor's snippet syntax.
    pub snippet: String,
    /// Text already typed before the cursor that the snippet continues.
    pub replaced_prefix: String,
    /// Markdown documentation.
    pub documentation: Option<String>,
    /// Line to replace with `replaced_prefix + snippet` instead of inserting.
    pub delete_range: Option<Span>,
}

/// The schema completions are offered from.
pub fn completion_schema(schemata: &Schemata, kind: DataFileKind) -> Option<&ObjectShape> {
    match kind {
        DataFileKind::Extension => Some(&schemata.extension),
        DataFileKind::Primitive => Some(&schemata.primitive),
        DataFileKind::Unknown => None,
    }
}

/// Suggestions for the cursor at `position` in `text`.
///
/// `indent_unit` is one level of indentation in generated snippets.
pub fn complete(
    text: &str,
    position: LinePosition,
    schema: &ObjectShape,
    kind: DataFileKind,
    indent_unit: &str,
) -> Vec<Suggestion> {
    let cursor_line = position.line as usize;
    let Some(context) = resolve(text, cursor_line) else {
        return Vec::new();
    };
    let index = LineIndex::new(text);
    let Some(line) = index.line_span(cursor_line) else {
        return Vec::new();
    };
    let typed = text[line.start..index.offset(position)].trim_start();

    match context {
        CursorContext::NewDocument => {
            let (opened, closed) = document_markers(text, cursor_line);
            let start = if opened { "" } else { DOCUMENT_START };
            let end = if closed { "" } else { DOCUMENT_END };
            let full = format!("{start}\n{}\n{end}", skeleton(schema, "", true));
            let (replaced_prefix, snippet) = continue_typed(&full, typed);
            vec![Suggestion {
                label: format!("New {}:", kind.name()),
                kind: SuggestionKind::Document,
                snippet,
                replaced_prefix,
                documentation: None,
                delete_range: Some(line),
            }]
        }
        CursorContext::Nested { ancestors, siblings } => match navigate(schema, &ancestors) {
            None => Vec::new(),
            Some(Level::Sequence { key, element }) => {
                let full = format!("- {}", element_skeleton(element, indent_unit));
                let (replaced_prefix, snippet) = continue_typed(&full, typed);
                vec![Suggestion {
                    label: format!("New Element of {key}:"),
                    kind: SuggestionKind::Element,
                    snippet,
                    replaced_prefix,
                    documentation: None,
                    delete_range: None,
                }]
            }
            Some(Level::Fields(shape)) => shape
                .iter()
                .filter(|(name, _)| !siblings.iter().any(|sibling| sibling == name))
                .map(|(name, node)| Suggestion {
                    label: format!("{name}:"),
                    kind: SuggestionKind::Field,
                    snippet: field_snippet(name, node, indent_unit),
                    replaced_prefix: String::new(),
                    documentation: node.meta.comment.clone(),
                    delete_range: None,
                })
                .collect(),
        },
    }
}

/// Split `full` into the part the user already typed and the rest.
fn continue_typed(full: &str, typed: &str) -> (String, String) {
    match full.strip_prefix(typed) {
        Some(rest) if !typed.is_empty() => (typed.to_string(), rest.to_string()),
        _ => (String::new(), full.to_string()),
    }
}

/// Snippet for a field that is not present yet.
fn field_snippet(name: &str, node: &SchemaNode, indent_unit: &str) -> String {
    let name = escape(name);
    match &node.kind {
        NodeKind::Sequence(element) => match &element.kind {
            NodeKind::Object(shape) => format!(
                "{name}:\n{indent_unit}- {}",
                skeleton(shape, &indent_unit.repeat(2), false)
            ),
            _ => format!("{name}: []"),
        },
        NodeKind::Object(shape) => format!("{name}:\n{}", skeleton(shape, indent_unit, true)),
        NodeKind::Scalar(_) => format!("{name}: "),
    }
}

/// Body of a new sequence entry, without the dash.
fn element_skeleton(element: &SchemaNode, indent_unit: &str) -> String {
    match &element.kind {
        NodeKind::Object(shape) => skeleton(shape, indent_unit, false),
        NodeKind::Scalar(ScalarType::String) => "'${1}'".to_string(),
        NodeKind::Scalar(ty) => format!("${{1:{}}}", ty.name()),
        NodeKind::Sequence(_) => "[]".to_string(),
    }
}

/// One line per required field, each indented by `indent`; the first line
/// only when `indent_first` is set.
fn skeleton(shape: &ObjectShape, indent: &str, indent_first: bool) -> String {
    shape
        .iter()
        .filter(|(_, node)| node.is_required())
        .enumerate()
        .map(|(i, (name, node))| {
            let value = match &node.kind {
                NodeKind::Scalar(ScalarType::String) => " ''",
                NodeKind::Sequence(_) => " []",
                NodeKind::Object(_) => " {}",
                NodeKind::Scalar(_) => " ",
            };
            let indent = if i > 0 || indent_first { indent } else { "" };
            format!("{indent}{}:{value}", escape(name))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape snippet syntax in literal text.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '$' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
