//! Structural-context resolver.
//!
//! Reconstructs where the cursor sits in a YAML document by walking the raw
//! lines around it. Nothing here parses YAML: the resolver only looks at
//! indentation and the structural keys of [`crate::scan`], which keeps it
//! usable while the document is half written.

use tracing::error;

use crate::scan::{
    DOCUMENT_END, DOCUMENT_START, ITEMS_KEY, entry_column, first_key, has_finished_key,
    indent_count, is_document_boundary, is_relevant, structural_keys,
};

/// Scan direction relative to the cursor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

/// How [`search_structure_keys`] collects keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Record the key of every line that dedents further than the last
    /// recorded one. Yields the ancestor chain, closest first.
    ParentLevelGreedy,
    /// Record the keys of lines at the reference indentation, stopping at the
    /// first dedent. Yields sibling keys.
    SameLevelRelaxed,
}

/// Ancestor keys from the cursor's level up to the document root, closest
/// ancestor first. [`ITEMS_KEY`] marks a sequence entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyChain(Vec<String>);

impl KeyChain {
    pub fn new(closest_first: Vec<String>) -> Self {
        Self(closest_first)
    }

    /// Keys ordered closest ancestor first.
    pub fn closest_first(&self) -> &[String] {
        &self.0
    }

    /// Keys ordered from the document root down to the cursor.
    pub fn from_root(&self) -> impl Iterator<Item = &str> {
        self.0.iter().rev().map(String::as_str)
    }
}

/// What the cursor is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorContext {
    /// The document around the cursor has no structure yet.
    NewDocument,
    /// The cursor sits at a nesting level reached through `ancestors`, next to
    /// the keys in `siblings`. Siblings are not deduplicated.
    Nested {
        ancestors: KeyChain,
        siblings: Vec<String>,
    },
}

/// Split text into lines the way editors count them: a trailing newline
/// opens one more (empty) line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

/// Relevant lines walked from a start line, stopping at a document boundary.
///
/// The start line is included. Blank and comment lines are skipped but never
/// end the walk.
pub struct Traverse<'a> {
    lines: &'a [&'a str],
    next: Option<usize>,
    direction: Direction,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.next?;
            let Some(line) = self.lines.get(index) else {
                self.next = None;
                return None;
            };
            if is_document_boundary(line) {
                self.next = None;
                return None;
            }
            self.next = match self.direction {
                Direction::Backward => index.checked_sub(1),
                Direction::Forward => Some(index + 1),
            };
            if is_relevant(line) {
                return Some((index, line));
            }
        }
    }
}

/// Walk relevant lines from `from` in `direction`.
pub fn traverse<'a>(lines: &'a [&'a str], from: usize, direction: Direction) -> Traverse<'a> {
    Traverse {
        lines,
        next: Some(from),
        direction,
    }
}

/// Collect structural keys around `cursor_line`.
///
/// Indentation is measured against the cursor line. The cursor line itself
/// never contributes: the scan starts at the adjacent line in `direction`.
pub fn search_structure_keys(
    lines: &[&str],
    cursor_line: usize,
    direction: Direction,
    strategy: SearchStrategy,
) -> Vec<String> {
    let Some(line) = lines.get(cursor_line) else {
        return Vec::new();
    };
    search_from_indent(lines, cursor_line, indent_count(line), direction, strategy)
}

fn search_from_indent(
    lines: &[&str],
    cursor_line: usize,
    level: usize,
    direction: Direction,
    strategy: SearchStrategy,
) -> Vec<String> {
    let start = match direction {
        Direction::Backward => match cursor_line.checked_sub(1) {
            Some(start) => start,
            None => return Vec::new(),
        },
        Direction::Forward => cursor_line + 1,
    };

    let mut keys = Vec::new();
    match strategy {
        SearchStrategy::ParentLevelGreedy => {
            let mut current = level;
            for (_, line) in traverse(lines, start, direction) {
                let indent = indent_count(line);
                if indent < current {
                    if let Some(key) = first_key(line) {
                        keys.push(key.to_string());
                    }
                    current = indent;
                }
            }
        }
        SearchStrategy::SameLevelRelaxed => {
            for (_, line) in traverse(lines, start, direction) {
                let indent = indent_count(line);
                if indent == level {
                    if let Some(key) = first_key(line) {
                        keys.push(key.to_string());
                    }
                } else if indent < level {
                    let tokens = structural_keys(line);
                    if direction == Direction::Backward && tokens.len() == 2 {
                        keys.push(tokens[1].to_string());
                    }
                    break;
                }
            }
        }
    }
    keys
}

/// Nearest line starting with one of `tokens`, scanning from the line next to
/// `cursor_line` in `direction`. Returns the token it starts with.
pub fn first_token<'t>(
    lines: &[&str],
    cursor_line: usize,
    direction: Direction,
    tokens: &[&'t str],
) -> Option<&'t str> {
    let found = |index: usize| {
        lines
            .get(index)
            .and_then(|line| crate::scan::starts_with_any(line, tokens))
    };
    match direction {
        Direction::Backward => (0..cursor_line.min(lines.len())).rev().find_map(found),
        Direction::Forward => (cursor_line + 1..lines.len()).find_map(found),
    }
}

/// Whether the document around the cursor is already opened by `---` above
/// and closed by `...` below, in that order of the returned pair.
pub fn document_markers(text: &str, cursor_line: usize) -> (bool, bool) {
    let lines = split_lines(text);
    let markers = [DOCUMENT_START, DOCUMENT_END];
    let opened = first_token(&lines, cursor_line, Direction::Backward, &markers) == Some(DOCUMENT_START);
    let closed = first_token(&lines, cursor_line, Direction::Forward, &markers) == Some(DOCUMENT_END);
    (opened, closed)
}

/// Resolve the cursor context of `cursor_line` in `text`.
///
/// Returns `None` when the line does not exist.
pub fn resolve(text: &str, cursor_line: usize) -> Option<CursorContext> {
    let lines = split_lines(text);
    let Some(&line) = lines.get(cursor_line) else {
        error!(cursor_line, lines = lines.len(), "Cursor line outside of the text");
        return None;
    };

    if is_document_boundary(line) {
        return Some(CursorContext::NewDocument);
    }

    let own_key = has_finished_key(line)
        .then(|| structural_keys(line).last().map(|key| key.to_string()))
        .flatten();

    let (ancestors, siblings) = match entry_column(line) {
        // The cursor line opens a sequence entry: the cursor's level is the
        // entry's mapping, whose keys start after the dash.
        Some(column) => {
            let mut ancestors = vec![ITEMS_KEY.to_string()];
            ancestors.extend(search_from_indent(
                &lines,
                cursor_line,
                indent_count(line),
                Direction::Backward,
                SearchStrategy::ParentLevelGreedy,
            ));
            let mut siblings: Vec<String> = own_key.into_iter().collect();
            siblings.extend(search_from_indent(
                &lines,
                cursor_line,
                column,
                Direction::Forward,
                SearchStrategy::SameLevelRelaxed,
            ));
            (ancestors, siblings)
        }
        None => {
            let level = indent_count(line);
            let ancestors = search_from_indent(
                &lines,
                cursor_line,
                level,
                Direction::Backward,
                SearchStrategy::ParentLevelGreedy,
            );
            let mut siblings = search_from_indent(
                &lines,
                cursor_line,
                level,
                Direction::Backward,
                SearchStrategy::SameLevelRelaxed,
            );
            siblings.extend(own_key);
            siblings.extend(search_from_indent(
                &lines,
                cursor_line,
                level,
                Direction::Forward,
                SearchStrategy::SameLevelRelaxed,
            ));
            (ancestors, siblings)
        }
    };

    if ancestors.is_empty() && siblings.is_empty() {
        return Some(CursorContext::NewDocument);
    }
    Some(CursorContext::Nested {
        ancestors: KeyChain::new(ancestors),
        siblings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = "primitive_name: foo\ndefinitions:\n  - target_extension: sse\n    ctype: int32_t\n";

    fn nested(context: Option<CursorContext>) -> (Vec<String>, Vec<String>) {
        match context {
            Some(CursorContext::Nested { ancestors, siblings }) => {
                (ancestors.closest_first().to_vec(), siblings)
            }
            other => panic!("expected nested context, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_file_is_new_document() {
        assert_eq!(resolve("", 0), Some(CursorContext::NewDocument));
    }

    #[test]
    fn test_cursor_after_sequence_entry_key() {
        let (ancestors, siblings) = nested(resolve(DEFINITION, 3));
        assert_eq!(ancestors, vec!["items", "definitions"]);
        assert_eq!(siblings, vec!["target_extension", "ctype"]);
    }

    #[test]
    fn test_cursor_on_sequence_entry_line() {
        let (ancestors, siblings) = nested(resolve(DEFINITION, 2));
        assert_eq!(ancestors, vec!["items", "definitions"]);
        assert_eq!(siblings, vec!["target_extension", "ctype"]);
    }

    #[test]
    fn test_top_level_siblings() {
        let text = "primitive_name: foo\n\nfunctor_name: bar\n";
        let (ancestors, siblings) = nested(resolve(text, 1));
        assert!(ancestors.is_empty());
        assert_eq!(siblings, vec!["primitive_name", "functor_name"]);
    }

    #[test]
    fn test_key_being_typed_is_not_a_sibling() {
        let text = "primitive_name: foo\nfunc";
        let (_, siblings) = nested(resolve(text, 1));
        assert_eq!(siblings, vec!["primitive_name"]);
    }

    #[test]
    fn test_scans_stop_at_document_boundaries() {
        let text = "---\nextension_name: a\n...\n---\n\n...\n";
        assert_eq!(resolve(text, 4), Some(CursorContext::NewDocument));
        assert_eq!(document_markers(text, 4), (true, true));
        assert_eq!(document_markers("", 0), (false, false));
        assert_eq!(document_markers("a: b\n...\n\n", 2), (false, false));
    }

    #[test]
    fn test_first_line_is_visited_backward() {
        let text = "definitions:\n  ";
        let (ancestors, _) = nested(resolve(text, 1));
        assert_eq!(ancestors, vec!["definitions"]);
    }

    #[test]
    fn test_cursor_outside_text() {
        assert_eq!(resolve("a: b", 5), None);
    }

    #[test]
    fn test_traverse_skips_irrelevant_lines() {
        let lines = split_lines("a: 1\n# note\n\nb: 2\n---\nc: 3");
        let forward: Vec<_> = traverse(&lines, 0, Direction::Forward).map(|(i, _)| i).collect();
        assert_eq!(forward, vec![0, 3]);
        let backward: Vec<_> = traverse(&lines, 3, Direction::Backward).map(|(i, _)| i).collect();
        assert_eq!(backward, vec![3, 0]);
    }

    #[test]
    fn test_first_token_excludes_cursor_line() {
        let lines = split_lines("---\na: b\n...");
        assert_eq!(first_token(&lines, 0, Direction::Backward, &["---"]), None);
        assert_eq!(first_token(&lines, 1, Direction::Backward, &["---"]), Some("---"));
        assert_eq!(first_token(&lines, 1, Direction::Forward, &["---", "..."]), Some("..."));
    }
}
