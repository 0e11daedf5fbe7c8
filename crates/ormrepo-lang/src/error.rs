//! Parse error type.

use crate::span::{column_of, Span};
use thiserror::Error;

/// Error raised while lexing or parsing a query string.
#[derive(Debug, Clone, Error)]
#[error("{message} at column {column}")]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// 1-based column of `span.start`.
    pub column: usize,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl ParseError {
    /// Create a new parse error positioned in `source`.
    pub fn new(message: impl Into<String>, span: Span, source: &str) -> Self {
        Self {
            message: message.into(),
            span,
            column: column_of(source, span.start),
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Render the error with a caret under the offending text.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut out = format!("error: {}\n  | {}\n  | ", self.message, source.trim_end());
        out.push_str(&" ".repeat(self.column.saturating_sub(1)));
        let width = self.span.end.saturating_sub(self.span.start).max(1);
        out.push_str(&"^".repeat(width));
        out.push('\n');
        if let Some(hint) = &self.hint {
            out.push_str(&format!("  = hint: {hint}\n"));
        }
        out
    }
}
