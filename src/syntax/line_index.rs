use tower_lsp::lsp_types::{Position, Range};

/// Maps byte offsets to editor positions (UTF-16 columns) and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    text: String,
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            text: text.to_string(),
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte offset where `line` starts.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Byte offset of the end of `line`, excluding the line terminator.
    pub fn line_end(&self, line: usize) -> Option<usize> {
        let start = self.line_start(line)?;
        let next = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text.len() + 1);
        let mut end = next.saturating_sub(1).min(self.text.len());
        if end > start && self.text.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        Some(end.max(start))
    }

    /// Text of one line without its terminator.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = self.line_start(line)?;
        let end = self.line_end(line)?;
        self.text.get(start..end)
    }

    /// Zero-based line containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        }
    }

    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = self.line_of(offset);
        let start = self.line_starts[line];
        let character = self
            .text
            .get(start..offset)
            .map(|prefix| prefix.encode_utf16().count())
            .unwrap_or(offset - start);
        Position {
            line: line as u32,
            character: character as u32,
        }
    }

    /// Byte offset for an editor position. Columns past the end of the line
    /// clamp to the line end; lines past the end of the text yield `None`.
    pub fn offset_at(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;
        let start = self.line_start(line)?;
        let end = self.line_end(line)?;
        let target = position.character as usize;

        let mut units = 0;
        for (i, ch) in self.text[start..end].char_indices() {
            if units >= target {
                return Some(start + i);
            }
            units += ch.len_utf16();
        }
        Some(end)
    }

    pub fn range_of(&self, span: std::ops::Range<usize>) -> Range {
        Range {
            start: self.position_at(span.start),
            end: self.position_at(span.end),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
