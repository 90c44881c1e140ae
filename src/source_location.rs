use serde::Serialize;
use std::fmt;

/// 1-based line/column of a token or node in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Byte offset to line/column lookup for one source text.
#[derive(Debug)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    content_length: usize,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in content.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }

        Self {
            line_starts,
            content_length: content.len(),
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.content_length);

        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };

        let line = (line_idx + 1) as u32;
        let column = (offset - self.line_starts[line_idx] + 1) as u32;
        Position::new(line, column)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_after_newline() {
        let index = LineIndex::new("line1\nline2\nline3");
        assert_eq!(index.position(6), Position::new(2, 1));
        assert_eq!(index.position(8), Position::new(2, 3));
    }

    #[test]
    fn test_empty_source() {
        let index = LineIndex::new("");
        assert_eq!(index.position(0), Position::new(1, 1));
        assert_eq!(index.line_count(), 1);
    }

    #[test]
    fn test_position_at_end() {
        let index = LineIndex::new("line1\nline2");
        assert_eq!(index.position(11), Position::new(2, 6));
        assert_eq!(index.position(500), Position::new(2, 6));
    }
}
