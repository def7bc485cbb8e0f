//! Zero-based source positions and ranges.

use serde::{Deserialize, Serialize};

/// A zero-based (line, column) pair.
///
/// Ordering is lexicographic, which makes `Range` ordering and the sorted
/// symbol tables in `QueryFile` defs cheap to maintain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[inline]
    pub const fn new(line: u32, column: u32) -> Position {
        Position { line, column }
    }
}

/// A half-open `[start, end)` source range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[inline]
    pub const fn new(start: Position, end: Position) -> Range {
        Range { start, end }
    }

    /// A zero-width range at `position`.
    #[inline]
    pub const fn point(position: Position) -> Range {
        Range {
            start: position,
            end: position,
        }
    }

    /// Whether `position` falls inside the range.
    ///
    /// The end bound is inclusive here: an LSP client asking for the symbol
    /// under the cursor places the cursor *after* the last character of the
    /// token it is on.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Position::new(1, 9) < Position::new(2, 0));
        assert!(Position::new(2, 0) < Position::new(2, 1));
    }

    #[test]
    fn contains_is_end_inclusive() {
        let range = Range::new(Position::new(1, 2), Position::new(1, 5));
        assert!(range.contains(Position::new(1, 2)));
        assert!(range.contains(Position::new(1, 5)));
        assert!(!range.contains(Position::new(1, 6)));
        assert!(!range.contains(Position::new(0, 3)));
    }
}
