use crate::error::Position;

/// Maps byte offsets to line/column positions within expression text.
#[derive(Debug, Clone)]
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        SourceMap { line_starts }
    }

    /// Returns (line, col), both 1-based. Columns count characters, not bytes.
    pub fn lookup(&self, source: &str, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let start = self.line_starts.get(line).copied().unwrap_or(0);
        let col = source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or_else(|| offset.saturating_sub(start));
        (line + 1, col + 1)
    }

    pub fn position(&self, source: &str, offset: usize) -> Position {
        let (line, column) = self.lookup(source, offset);
        Position::new(line, column, offset)
    }
}
