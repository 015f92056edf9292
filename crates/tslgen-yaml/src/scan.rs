//! Line-indentation scanner.
//!
//! Classifies single lines of raw text without parsing them as YAML, so it
//! works on documents that are still being typed.

use std::sync::LazyLock;

use regex::Regex;

/// Structural key standing for "this line opens a sequence entry".
pub const ITEMS_KEY: &str = "items";
/// Document start marker.
pub const DOCUMENT_START: &str = "---";
/// Document end marker.
pub const DOCUMENT_END: &str = "...";

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-\s*)?([^:]+)?").expect("structural key pattern"));

/// Number of leading whitespace characters.
pub fn indent_count(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// The leading whitespace itself.
pub fn indentation(line: &str) -> &str {
    let content = line.trim_start();
    &line[..line.len() - content.len()]
}

/// Blank lines and comment lines carry no structure.
pub fn is_relevant(line: &str) -> bool {
    let content = line.trim_start();
    !content.is_empty() && !content.starts_with('#')
}

/// Whether the line starts with a document marker.
pub fn is_document_boundary(line: &str) -> bool {
    starts_with_any(line, &[DOCUMENT_START, DOCUMENT_END]).is_some()
}

/// The first of `tokens` the trimmed line starts with.
pub fn starts_with_any<'t>(line: &str, tokens: &[&'t str]) -> Option<&'t str> {
    let content = line.trim();
    tokens.iter().copied().find(|token| content.starts_with(token))
}

/// Structural tokens of a line: [`ITEMS_KEY`] when the line opens a sequence
/// entry, then the text before the first colon. Yields zero, one or two
/// tokens, e.g. `- name: x` gives `["items", "name"]`.
pub fn structural_keys(line: &str) -> Vec<&str> {
    let mut keys = Vec::with_capacity(2);
    let Some(captures) = KEY_PATTERN.captures(line) else {
        return keys;
    };
    if captures.get(1).is_some() {
        keys.push(ITEMS_KEY);
    }
    if let Some(key) = captures.get(2) {
        let key = key.as_str().trim_end();
        if !key.is_empty() {
            keys.push(key);
        }
    }
    keys
}

/// First structural token of a line, if any.
pub fn first_key(line: &str) -> Option<&str> {
    structural_keys(line).into_iter().next()
}

/// Whether the line's key has been completed with a colon.
pub fn has_finished_key(line: &str) -> bool {
    KEY_PATTERN
        .captures(line)
        .and_then(|captures| captures.get(2))
        .is_some_and(|key| line[key.end()..].starts_with(':'))
}

/// Column (in chars) where the mapping of a sequence entry starts, i.e. the
/// position right after the dash and its padding. `None` when the line does
/// not open a sequence entry.
pub fn entry_column(line: &str) -> Option<usize> {
    let dash = KEY_PATTERN.captures(line)?.get(1)?;
    Some(line[..dash.end()].chars().count())
}
