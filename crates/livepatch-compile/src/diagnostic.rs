//! Compiler diagnostics

use crate::ast::Span;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

/// Diagnostic codes
pub mod codes {
    /// Unexpected or missing token
    pub const SYNTAX: &str = "LP0001";
    /// Character that starts no token
    pub const INVALID_CHARACTER: &str = "LP0002";
    /// Type name does not resolve
    pub const UNKNOWN_TYPE: &str = "LP0101";
    /// Type declared twice in one batch
    pub const DUPLICATE_TYPE: &str = "LP0102";
    /// Two methods with the same name and parameter types
    pub const DUPLICATE_METHOD: &str = "LP0103";
    /// Name is not a local or parameter
    pub const UNDEFINED_VARIABLE: &str = "LP0201";
    /// Expression has the wrong type
    pub const TYPE_MISMATCH: &str = "LP0202";
    /// Non-unit function can finish without returning
    pub const MISSING_RETURN: &str = "LP0203";
    /// No method with this name
    pub const UNKNOWN_METHOD: &str = "LP0301";
    /// Method exists but no overload takes these argument types
    pub const NO_MATCHING_OVERLOAD: &str = "LP0302";
    /// `unsafe` used while not permitted
    pub const UNSAFE_NOT_ALLOWED: &str = "LP0401";
    /// Batch file no longer exists
    pub const FILE_NOT_FOUND: &str = "LP1001";
    /// Batch file could not be read
    pub const FILE_UNREADABLE: &str = "LP1002";
    /// Nothing left to compile
    pub const NO_SOURCES: &str = "LP1003";
    /// Compiled module was rejected by the program
    pub const LOAD_FAILED: &str = "LP1004";
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; does not fail the build
    Warning,
    /// Fails the build
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Position in a source file, 1-based
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceLocation {
    /// File path
    pub file: PathBuf,
    /// Line number
    pub line: usize,
    /// Column number, in characters
    pub column: usize,
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// A compiler message tied to a source location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Where the problem is
    pub location: SourceLocation,
    /// Human-readable message
    pub message: String,
    /// Stable `LPxxxx` code
    pub code: &'static str,
}

impl Diagnostic {
    /// Create an error
    #[must_use]
    pub fn error(code: &'static str, location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            location,
            message: message.into(),
            code,
        }
    }

    /// Create a warning
    #[must_use]
    pub fn warning(
        code: &'static str,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            location,
            message: message.into(),
            code,
        }
    }

    /// Whether this diagnostic fails the build
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}[{}]: {}",
            self.location, self.severity, self.code, self.message
        )
    }
}

/// Maps byte offsets to line/column positions
#[derive(Debug, Clone)]
pub struct LineIndex {
    file: PathBuf,
    line_starts: Vec<usize>,
    text: String,
}

impl LineIndex {
    /// Index `text` belonging to `file`
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            file: file.into(),
            line_starts,
            text: text.to_string(),
        }
    }

    /// File this index belongs to
    #[inline]
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Location of a byte offset
    #[must_use]
    pub fn location(&self, offset: usize) -> SourceLocation {
        let offset = offset.min(self.text.len());
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[line];
        let column = self
            .text
            .get(start..offset)
            .map_or(offset - start, |prefix| prefix.chars().count())
            + 1;
        SourceLocation {
            file: self.file.clone(),
            line: line + 1,
            column,
        }
    }

    /// Location of the start of a span
    #[inline]
    #[must_use]
    pub fn span_location(&self, span: Span) -> SourceLocation {
        self.location(span.start)
    }
}

/// Location for diagnostics that have no position inside a file
#[must_use]
pub fn file_location(file: impl Into<PathBuf>) -> SourceLocation {
    SourceLocation {
        file: file.into(),
        line: 0,
        column: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_and_column() {
        let index = LineIndex::new("a.src", "type A {\n  fn x\n}");
        let loc = index.location(0);
        assert_eq!((loc.line, loc.column), (1, 1));
        let loc = index.location(11);
        assert_eq!((loc.line, loc.column), (2, 3));
        let loc = index.location(999);
        assert_eq!(loc.line, 3);
    }

    #[test]
    fn display_format() {
        let diag = Diagnostic::error(
            codes::SYNTAX,
            SourceLocation {
                file: "Bad.src".into(),
                line: 3,
                column: 5,
            },
            "expected ';'",
        );
        assert_eq!(diag.to_string(), "Bad.src:3:5: error[LP0001]: expected ';'");
        assert!(diag.is_error());
    }
}
