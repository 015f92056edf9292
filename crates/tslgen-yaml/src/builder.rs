//! Tree builder over saphyr parser events.
//!
//! The builder is tolerant: when the scanner fails mid-stream, everything
//! parsed up to that point is still turned into documents, and the failure is
//! recorded as a [`Problem`].

use std::collections::{HashMap, HashSet};

use saphyr_parser::{Event, Parser, ScalarStyle, Span as MarkerSpan};
use tracing::debug;

use crate::span::Span;
use crate::value::{
    Document, DocumentRange, Entry, Node, Problem, Scalar, ScalarKind, Severity, Stream, Value,
};

/// Parse every document of a YAML stream.
pub fn parse_stream(source: &str) -> Stream {
    let offsets = CharOffsets::new(source);
    let mut events = Vec::new();
    let mut problems = Vec::new();

    for item in Parser::new_from_str(source) {
        match item {
            Ok(event) => events.push(event),
            Err(error) => {
                let at = offsets.byte(error.marker().index());
                problems.push(Problem {
                    severity: Severity::Error,
                    code: "SCAN_ERROR",
                    message: error.to_string(),
                    span: Span::new(at, next_char_end(source, at)),
                });
                break;
            }
        }
    }

    let mut builder = TreeBuilder {
        source,
        events: &events,
        pos: 0,
        offsets,
        anchors: HashMap::new(),
        problems,
    };
    let documents = builder.documents();
    debug!(
        documents = documents.len(),
        problems = builder.problems.len(),
        "Parsed YAML stream"
    );

    Stream {
        documents,
        problems: builder.problems,
    }
}

/// Maps saphyr's char indices to byte offsets.
struct CharOffsets {
    bytes: Vec<usize>,
}

impl CharOffsets {
    fn new(source: &str) -> Self {
        let mut bytes: Vec<usize> = source.char_indices().map(|(b, _)| b).collect();
        bytes.push(source.len());
        Self { bytes }
    }

    fn byte(&self, char_index: usize) -> usize {
        match self.bytes.get(char_index) {
            Some(&b) => b,
            None => self.bytes.last().copied().unwrap_or_default(),
        }
    }
}

fn next_char_end(source: &str, at: usize) -> usize {
    source
        .get(at..)
        .and_then(|rest| rest.chars().next())
        .map_or(at, |c| at + c.len_utf8())
}

struct TreeBuilder<'e, 's> {
    source: &'s str,
    events: &'e [(Event<'s>, MarkerSpan)],
    pos: usize,
    offsets: CharOffsets,
    anchors: HashMap<usize, Node>,
    problems: Vec<Problem>,
}

impl<'e, 's> TreeBuilder<'e, 's> {
    fn peek(&self) -> Option<&'e (Event<'s>, MarkerSpan)> {
        self.events.get(self.pos)
    }

    fn start_of(&self, span: &MarkerSpan) -> usize {
        self.offsets.byte(span.start.index())
    }

    fn end_of(&self, span: &MarkerSpan) -> usize {
        self.offsets.byte(span.end.index())
    }

    fn documents(&mut self) -> Vec<Document> {
        let mut documents = Vec::new();
        while let Some((event, span)) = self.peek() {
            self.pos += 1;
            if let Event::DocumentStart(_) = event {
                let start = self.start_of(span);
                documents.push(self.document(start));
            }
        }
        documents
    }

    fn document(&mut self, start: usize) -> Document {
        let root = self.node();
        let content_end = root.as_ref().map_or(start, |node| node.span.end.max(start));
        let mut end = content_end;

        while let Some((event, span)) = self.peek() {
            match event {
                Event::DocumentEnd => {
                    self.pos += 1;
                    end = end.max(self.end_of(span));
                    break;
                }
                Event::DocumentStart(_) | Event::StreamEnd => break,
                _ => self.pos += 1,
            }
        }

        Document {
            root,
            range: DocumentRange {
                start,
                content_end,
                end,
            },
        }
    }

    fn node(&mut self) -> Option<Node> {
        let (event, span) = self.peek()?;
        let node = match event {
            Event::Scalar(text, style, anchor, _) => {
                self.pos += 1;
                let node = self.scalar(text, *style, span);
                self.anchored(*anchor, node)
            }
            Event::SequenceStart(anchor, _) => {
                self.pos += 1;
                let node = self.sequence(span);
                self.anchored(*anchor, node)
            }
            Event::MappingStart(anchor, _) => {
                self.pos += 1;
                let node = self.mapping(span);
                self.anchored(*anchor, node)
            }
            Event::Alias(id) => {
                self.pos += 1;
                let at = Span::new(self.start_of(span), self.end_of(span));
                match self.anchors.get(id) {
                    Some(target) => Node {
                        value: target.value.clone(),
                        span: at,
                    },
                    None => {
                        self.problems.push(Problem {
                            severity: Severity::Error,
                            code: "UNKNOWN_ALIAS",
                            message: "Alias refers to an unknown anchor".to_string(),
                            span: at,
                        });
                        Node::scalar("", at)
                    }
                }
            }
            _ => return None,
        };
        Some(node)
    }

    fn anchored(&mut self, anchor: usize, node: Node) -> Node {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
        node
    }

    fn scalar(&self, text: &str, style: ScalarStyle, span: &MarkerSpan) -> Node {
        let start = self.start_of(span);
        let end = self.end_of(span).max(start);
        let kind = match style {
            ScalarStyle::Plain => ScalarKind::Plain,
            ScalarStyle::SingleQuoted | ScalarStyle::DoubleQuoted => ScalarKind::Quoted,
            _ => ScalarKind::Block,
        };
        let implicit_null = kind == ScalarKind::Plain
            && text == "~"
            && !self
                .source
                .get(start..end)
                .is_some_and(|raw| raw.contains('~'));
        Node {
            value: Value::Scalar(Scalar {
                text: if implicit_null {
                    String::new()
                } else {
                    text.to_string()
                },
                kind,
            }),
            span: Span::new(start, end),
        }
    }

    fn is_flow_at(&self, offset: usize, open: u8) -> bool {
        self.source.as_bytes().get(offset) == Some(&open)
    }

    fn sequence(&mut self, span: &MarkerSpan) -> Node {
        let start = self.start_of(span);
        let flow = self.is_flow_at(start, b'[');
        let mut end = start;
        let mut items = Vec::new();

        loop {
            if let Some((Event::SequenceEnd, close)) = self.peek() {
                self.pos += 1;
                if flow {
                    end = end.max(self.end_of(close));
                }
                break;
            }
            match self.node() {
                Some(item) => {
                    end = end.max(item.span.end);
                    items.push(item);
                }
                None => break,
            }
        }

        Node {
            value: Value::Sequence(items),
            span: Span::new(start, end),
        }
    }

    fn mapping(&mut self, span: &MarkerSpan) -> Node {
        let start = self.start_of(span);
        let flow = self.is_flow_at(start, b'{');
        let mut end = start;
        let mut entries: Vec<Entry> = Vec::new();
        let mut seen = HashSet::new();

        loop {
            if let Some((Event::MappingEnd, close)) = self.peek() {
                self.pos += 1;
                if flow {
                    end = end.max(self.end_of(close));
                }
                break;
            }
            let Some(key) = self.node() else {
                break;
            };
            let value = self.node().unwrap_or_else(|| Node::null(key.span.end));
            end = end.max(key.span.end).max(value.span.end);

            if let Some(name) = key.as_str() {
                if !seen.insert(name.to_string()) {
                    self.problems.push(Problem {
                        severity: Severity::Warning,
                        code: "DUPLICATE_KEY",
                        message: format!("Map keys must be unique; \"{name}\" is repeated"),
                        span: key.span,
                    });
                }
            }
            entries.push(Entry { key, value });
        }

        Node {
            value: Value::Mapping(entries),
            span: Span::new(start, end),
        }
    }
}
