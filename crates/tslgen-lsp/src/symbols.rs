//! Document outline of data files.

use tower_lsp::lsp_types::{DocumentSymbol, Range, SymbolKind};
use tslgen_schema::fields;
use tslgen_yaml::{Document, LineIndex, Node, Span, Stream};

use crate::ctype::type_signature;
use crate::project::DataFileKind;

/// Flags label of a definition without `lscpu_flags`.
const DEFAULT_FLAGS: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineKind {
    /// A primitive or an extension document.
    Class,
    /// The definitions of a primitive for one target extension.
    Namespace,
    /// One definition.
    Field,
}

/// One node of the outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineSymbol {
    pub name: String,
    pub kind: OutlineKind,
    pub span: Span,
    pub children: Vec<OutlineSymbol>,
}

impl OutlineSymbol {
    fn leaf(name: String, kind: OutlineKind, span: Span) -> Self {
        OutlineSymbol {
            name,
            kind,
            span,
            children: Vec::new(),
        }
    }

    pub fn to_document_symbol(&self, index: &LineIndex<'_>) -> DocumentSymbol {
        let range = Range {
            start: crate::server::to_lsp_position(index.position(self.span.start)),
            end: crate::server::to_lsp_position(index.position(self.span.end)),
        };
        let kind = match self.kind {
            OutlineKind::Class => SymbolKind::CLASS,
            OutlineKind::Namespace => SymbolKind::NAMESPACE,
            OutlineKind::Field => SymbolKind::FIELD,
        };
        #[allow(deprecated)]
        let symbol = DocumentSymbol {
            name: self.name.clone(),
            detail: None,
            kind,
            tags: None,
            deprecated: None,
            range,
            selection_range: range,
            children: (!self.children.is_empty()).then(|| {
                self.children
                    .iter()
                    .map(|child| child.to_document_symbol(index))
                    .collect()
            }),
        };
        symbol
    }
}

/// The outline of a data file.
pub fn outline(stream: &Stream, kind: DataFileKind) -> Vec<OutlineSymbol> {
    match kind {
        DataFileKind::Extension => stream.documents.iter().filter_map(extension_symbol).collect(),
        DataFileKind::Primitive => stream.documents.iter().filter_map(primitive_symbol).collect(),
        DataFileKind::Unknown => Vec::new(),
    }
}

fn extension_symbol(document: &Document) -> Option<OutlineSymbol> {
    let name = document.get(fields::EXTENSION_NAME)?.as_str()?;
    Some(OutlineSymbol::leaf(
        name.to_string(),
        OutlineKind::Class,
        Span::new(document.range.start, document.range.content_end),
    ))
}

fn primitive_symbol(document: &Document) -> Option<OutlineSymbol> {
    let primitive_name = document.get(fields::PRIMITIVE_NAME)?.as_str()?;
    let name = match document.get(fields::FUNCTOR_NAME).and_then(Node::as_str) {
        Some(functor) => format!("{primitive_name} (overload {functor})"),
        None => primitive_name.to_string(),
    };

    let mut groups: Vec<OutlineSymbol> = Vec::new();
    let definitions = document
        .get(fields::DEFINITIONS)
        .and_then(Node::as_sequence)
        .unwrap_or_default();
    for definition in definitions {
        let label = definition_label(definition);
        let extensions = definition
            .get(fields::TARGET_EXTENSION)
            .map(Node::string_list)
            .unwrap_or_default();
        for extension in extensions {
            let symbol = OutlineSymbol::leaf(label.clone(), OutlineKind::Field, definition.span);
            match groups.iter_mut().find(|group| group.name == extension) {
                Some(group) => {
                    group.span = group.span.cover(definition.span);
                    group.children.push(symbol);
                }
                None => groups.push(OutlineSymbol {
                    name: extension,
                    kind: OutlineKind::Namespace,
                    span: definition.span,
                    children: vec![symbol],
                }),
            }
        }
    }

    Some(OutlineSymbol {
        name,
        kind: OutlineKind::Class,
        span: Span::new(document.range.start, document.range.end),
        children: groups,
    })
}

/// `<type signature> (<flags>)`
fn definition_label(definition: &Node) -> String {
    let ctypes = definition
        .get(fields::CTYPE)
        .map(Node::string_list)
        .unwrap_or_default();
    let mut flags = definition
        .get(fields::LSCPU_FLAGS)
        .map(Node::string_list)
        .unwrap_or_default();
    flags.sort();
    let flags = if flags.is_empty() {
        DEFAULT_FLAGS.to_string()
    } else {
        flags.join(", ")
    };
    let signature = type_signature(&ctypes);
    if signature.is_empty() {
        format!("({flags})")
    } else {
        format!("{signature} ({flags})")
    }
}

#[cfg(test)]
mod tests {
    use tslgen_yaml::parse_stream;

    use super::*;

    fn render(symbols: &[OutlineSymbol], depth: usize, out: &mut String) {
        for symbol in symbols {
            out.push_str(&format!("{}{:?} {}\n", "  ".repeat(depth), symbol.kind, symbol.name));
            render(&symbol.children, depth + 1, out);
        }
    }

    fn tree(symbols: &[OutlineSymbol]) -> String {
        let mut out = String::new();
        render(symbols, 0, &mut out);
        out
    }

    #[test]
    fn test_signedness_pair_collapses() {
        let text = "primitive_name: add\ndefinitions:\n  - target_extension: avx2\n    ctype: [\"int32_t\", \"uint32_t\"]\n    lscpu_flags: ['avx2', 'avx']\n";
        let symbols = outline(&parse_stream(text), DataFileKind::Primitive);
        insta::assert_snapshot!(tree(&symbols), @r"
        Class add
          Namespace avx2
            Field (u)int32_t (avx, avx2)
        ");
    }

    #[test]
    fn test_target_extensions_fan_out() {
        let text = "\
primitive_name: load
functor_name: load_masked
definitions:
  - target_extension: [sse, avx2]
    ctype: float
  - target_extension: sse
    ctype: [double, uint8_t]
    lscpu_flags: sse2
---
primitive_name: store
";
        let symbols = outline(&parse_stream(text), DataFileKind::Primitive);
        insta::assert_snapshot!(tree(&symbols), @r"
        Class load (overload load_masked)
          Namespace sse
            Field float (default)
            Field uint8_t, double (sse2)
          Namespace avx2
            Field float (default)
        Class store
        ");
        let sse = &symbols[0].children[0];
        assert_eq!(sse.span.start, text.find("target_extension: [sse").unwrap());
        assert_eq!(symbols[0].span.start, 0);
    }

    #[test]
    fn test_extension_documents() {
        let text = "---\nextension_name: avx2\nvendor: intel\n...\n---\nextension_name: sse\n";
        let symbols = outline(&parse_stream(text), DataFileKind::Extension);
        assert_eq!(
            symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["avx2", "sse"]
        );
        assert!(symbols.iter().all(|s| s.kind == OutlineKind::Class && s.children.is_empty()));
        assert_eq!(symbols[0].span.start, 0);
    }

    #[test]
    fn test_document_symbol_conversion() {
        let text = "primitive_name: add\ndefinitions:\n  - target_extension: sse\n    ctype: int8_t\n";
        let symbols = outline(&parse_stream(text), DataFileKind::Primitive);
        let symbol = symbols[0].to_document_symbol(&LineIndex::new(text));
        assert_eq!(symbol.kind, SymbolKind::CLASS);
        let namespace = &symbol.children.as_ref().unwrap()[0];
        assert_eq!(namespace.kind, SymbolKind::NAMESPACE);
        assert_eq!(namespace.range.start.line, 2);
        assert_eq!(namespace.children.as_ref().unwrap()[0].name, "int8_t (default)");
    }
}
