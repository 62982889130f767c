//! Errors raised while reading query text.

use std::fmt;

/// Byte range of a token in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Empty span at `pos`, used for end of input.
    pub fn at(pos: usize) -> Self {
        Self::new(pos, pos)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// The query text could not be tokenized or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    pub fn unexpected_token(expected: &str, found: &str, span: Span) -> Self {
        Self::new(format!("expected {expected}, found {found}"), span)
    }

    pub fn unexpected_eof(expected: &str, pos: usize) -> Self {
        Self::new(format!("query ended early, expected {expected}"), Span::at(pos))
    }

    pub fn invalid_number(span: Span) -> Self {
        Self::new("malformed numeric literal", span)
    }

    /// Returns the text of `sql` the error points at, or `None` for an
    /// error at the end of input.
    pub fn excerpt<'a>(&self, sql: &'a str) -> Option<&'a str> {
        if self.span.is_empty() {
            return None;
        }
        sql.get(self.span.start..self.span.end)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Offsets are reported 1-based.
        write!(f, "{} (offset {})", self.message, self.span.start + 1)
    }
}

impl std::error::Error for SyntaxError {}
