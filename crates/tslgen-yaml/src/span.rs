//! Byte spans and line/column conversion.

/// A span representing a range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset of the start (inclusive)
    pub start: usize,
    /// Byte offset of the end (exclusive)
    pub end: usize,
}

impl Span {
    /// Create a new span from start and end byte offsets.
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Create an empty span at a position.
    #[inline]
    pub fn empty(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    /// Length of this span in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether this span is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` lies inside the span, both ends included.
    #[inline]
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Smallest span covering both spans.
    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Zero-based line and character of a text position. Characters count UTF-16
/// code units, as LSP positions do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LinePosition {
    pub line: u32,
    pub character: u32,
}

impl LinePosition {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Maps byte offsets to line positions and back.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, line_starts }
    }

    /// Number of lines, counting a trailing empty line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Convert a byte offset to a line position. Offsets past the end clamp
    /// to the end of the text.
    pub fn position(&self, offset: usize) -> LinePosition {
        let offset = offset.min(self.text.len());
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[line];
        let character = self
            .text
            .get(start..offset)
            .map_or(offset - start, |prefix| prefix.encode_utf16().count());
        LinePosition::new(line as u32, character as u32)
    }

    /// Convert a line position to a byte offset. Positions past the end of
    /// a line clamp to the line end.
    pub fn offset(&self, position: LinePosition) -> usize {
        let Some(&start) = self.line_starts.get(position.line as usize) else {
            return self.text.len();
        };
        let line = self.line_text(position.line as usize);
        let mut units = 0;
        for (i, ch) in line.char_indices() {
            if units >= position.character as usize {
                return start + i;
            }
            units += ch.len_utf16();
        }
        start + line.len()
    }

    /// Span of a whole line, without its line terminator.
    pub fn line_span(&self, line: usize) -> Option<Span> {
        let start = *self.line_starts.get(line)?;
        Some(Span::new(start, start + self.line_text(line).len()))
    }

    fn line_text(&self, line: usize) -> &'a str {
        let start = self.line_starts[line];
        let end = self
            .line_starts
            .get(line + 1)
            .map_or(self.text.len(), |next| next - 1);
        self.text[start..end].trim_end_matches('\r')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_position() {
        let content = "hello\nworld";
        let index = LineIndex::new(content);
        assert_eq!(index.position(0), LinePosition::new(0, 0));
        assert_eq!(index.position(5), LinePosition::new(0, 5));
        assert_eq!(index.position(6), LinePosition::new(1, 0));
        assert_eq!(index.position(8), LinePosition::new(1, 2));
        assert_eq!(index.position(100), LinePosition::new(1, 5));
    }

    #[test]
    fn test_position_to_offset() {
        let content = "a: 1\nbb: 2\n";
        let index = LineIndex::new(content);
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.offset(LinePosition::new(1, 0)), 5);
        assert_eq!(index.offset(LinePosition::new(1, 99)), 10);
        assert_eq!(index.offset(LinePosition::new(2, 0)), 11);
        assert_eq!(index.offset(LinePosition::new(7, 0)), content.len());
    }

    #[test]
    fn test_multibyte_characters() {
        let content = "name: ä\nnext: b";
        let index = LineIndex::new(content);
        let offset = content.find("next").unwrap();
        assert_eq!(index.position(offset), LinePosition::new(1, 0));
        assert_eq!(index.position(offset - 1), LinePosition::new(0, 7));
        assert_eq!(index.offset(LinePosition::new(0, 7)), offset - 1);
    }

    #[test]
    fn test_characters_count_utf16_units() {
        let content = "brief: \u{1F680} fast\nnext: b";
        let index = LineIndex::new(content);
        let rocket = content.find('\u{1F680}').unwrap();
        let fast = content.find("fast").unwrap();
        assert_eq!(index.position(rocket), LinePosition::new(0, 7));
        assert_eq!(index.position(fast), LinePosition::new(0, 10));
        assert_eq!(index.offset(LinePosition::new(0, 7)), rocket);
        assert_eq!(index.offset(LinePosition::new(0, 10)), fast);
        assert_eq!(index.offset(LinePosition::new(0, 14)), fast + 4);
    }

    #[test]
    fn test_line_span() {
        let content = "a\r\nbc\n";
        let index = LineIndex::new(content);
        assert_eq!(index.line_span(0), Some(Span::new(0, 1)));
        assert_eq!(index.line_span(1), Some(Span::new(3, 5)));
        assert_eq!(index.line_span(2), Some(Span::new(6, 6)));
        assert_eq!(index.line_span(3), None);
    }
}
