//! Source locations.
//!
//! A `SourceLoc` is a plain value carried by every IL instruction and by
//! parser/verifier diagnostics. It never owns anything and never resolves a
//! file id to a path itself — that mapping lives with whatever file table the
//! embedder maintains.

use core::fmt;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// An absolute position within a source file.
///
/// `file_id == 0` means "no file" (an unknown/synthetic location).
/// `line`/`column` are one-based; `0` means "not tracked" even when a file is
/// known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SourceLoc {
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    /// The location used for instructions that can't be attributed to source.
    pub const UNKNOWN: SourceLoc = SourceLoc { file_id: 0, line: 0, column: 0 };

    pub fn new(file_id: u32, line: u32, column: u32) -> Self {
        SourceLoc { file_id, line, column }
    }

    pub fn is_valid(self) -> bool {
        self.has_file()
    }

    pub fn has_file(self) -> bool {
        self.file_id != 0
    }

    pub fn has_line(self) -> bool {
        self.line != 0
    }

    pub fn has_column(self) -> bool {
        self.column != 0
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "-")
        } else if self.has_column() {
            write!(f, "{}:{}:{}", self.file_id, self.line, self.column)
        } else if self.has_line() {
            write!(f, "{}:{}", self.file_id, self.line)
        } else {
            write!(f, "{}", self.file_id)
        }
    }
}

/// A half-open range `[begin, end)` within a single source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SourceRange {
    pub begin: SourceLoc,
    pub end: SourceLoc,
}

impl SourceRange {
    pub fn new(begin: SourceLoc, end: SourceLoc) -> Self {
        SourceRange { begin, end }
    }

    /// Both endpoints reference tracked locations in the same file.
    pub fn is_valid(self) -> bool {
        self.begin.is_valid() && self.end.is_valid() && self.begin.file_id == self.end.file_id
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_invalid() {
        assert!(!SourceLoc::UNKNOWN.is_valid());
        assert_eq!(SourceLoc::UNKNOWN.to_string(), "-");
    }

    #[test]
    fn display_with_column() {
        let loc = SourceLoc::new(3, 10, 4);
        assert_eq!(loc.to_string(), "3:10:4");
    }

    #[test]
    fn range_requires_same_file() {
        let a = SourceLoc::new(1, 1, 1);
        let b = SourceLoc::new(2, 1, 1);
        assert!(!SourceRange::new(a, b).is_valid());
        assert!(SourceRange::new(a, a).is_valid());
    }
}
