//! Source locations attached to tokens and synthesized fragments.

use serde::Serialize;

/// A source location: the line a construct starts on plus its byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub offset: usize,
    pub end: usize,
}

impl Position {
    pub fn new(line: usize, offset: usize, end: usize) -> Self {
        Self { line, offset, end }
    }

    /// Extend this position so it spans through `other`.
    pub fn merge(self, other: Position) -> Position {
        let (line, offset) = if other.offset < self.offset {
            (other.line, other.offset)
        } else {
            (self.line, self.offset)
        };
        Position {
            line,
            offset,
            end: self.end.max(other.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_spans_to_later_token() {
        let a = Position::new(1, 4, 6);
        let b = Position::new(2, 20, 25);
        let m = a.merge(b);
        assert_eq!(m, Position::new(1, 4, 25));
        assert_eq!(b.merge(a), Position::new(1, 4, 25));
    }
}
