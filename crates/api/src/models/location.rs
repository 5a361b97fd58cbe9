use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Half-open byte range `[start, end)` into a file's text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        if self.is_empty() || other.is_empty() {
            // Insertions only collide when they replace inside the other span
            return self.start > other.start && self.start < other.end
                || other.start > self.start && other.start < self.end;
        }
        self.start < other.end && other.start < self.end
    }
}

/// A navigable position: file plus 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }

    /// Resolve a byte offset in `text` to a line/column location.
    pub fn at_offset(path: &Path, text: &str, offset: usize) -> Self {
        let offset = offset.min(text.len());
        let mut line = 1;
        let mut line_start = 0;
        for (i, ch) in text.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                line_start = i + 1;
            }
        }
        let column = text
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0)
            + 1;
        Self::new(path, line, column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_at_offset() {
        let text = "table 50100 X\n{\n    fields\n";
        let offset = text.find("fields").unwrap();
        let loc = Location::at_offset(Path::new("a.al"), text, offset);
        assert_eq!((loc.line, loc.column), (3, 5));
        assert_eq!(loc.to_string(), "a.al:3:5");
    }

    #[test]
    fn test_span_overlap() {
        assert!(Span::new(0, 5).overlaps(&Span::new(4, 8)));
        assert!(!Span::new(0, 5).overlaps(&Span::new(5, 8)));
        assert!(!Span::empty(5).overlaps(&Span::new(5, 8)));
        assert!(Span::empty(6).overlaps(&Span::new(5, 8)));
    }
}
