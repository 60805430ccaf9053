//! Editor diagnostics
//!
//! Positions here are 0-based (line, character) pairs, the shape editor
//! protocols expect. Source tokens use 1-based positions; the conversion lives
//! in the diagnostic engine.

use serde::{Deserialize, Serialize};

/// Diagnostic severity level
///
/// Dry-run failures are the only source of diagnostics, and they are always
/// reported as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The warehouse rejected the query
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
        }
    }
}

/// A position in a document (0-indexed)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line (0-indexed)
    pub line: u32,

    /// Character offset within the line (0-indexed)
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Position of the end of `text`
    pub fn end_of(text: &str) -> Self {
        let line = text.matches('\n').count() as u32;
        let last = text.rsplit('\n').next().unwrap_or("");
        Self {
            line,
            character: last.chars().count() as u32,
        }
    }
}

/// A half-open range in a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range covering all of `text`
    pub fn whole_document(text: &str) -> Self {
        Self {
            start: Position::default(),
            end: Position::end_of(text),
        }
    }
}

/// A diagnostic message attached to a document range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Range in the document
    pub range: Range,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(range: Range, message: impl Into<String>) -> Self {
        Self {
            range,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}
