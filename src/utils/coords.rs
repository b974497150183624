//! Source location tracking

use std::fmt;

use serde::Serialize;

/// A line/column position in the source text (both 1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Coordinates {
    pub line: usize,
    pub column: usize,
}

impl Coordinates {
    /// Create a new coordinate pair
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Coordinate used by nodes that are not tied to a token (for testing)
    pub fn dummy() -> Self {
        Self { line: 0, column: 0 }
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::dummy()
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
