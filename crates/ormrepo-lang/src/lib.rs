//! Query string language for ormrepo repositories.
//!
//! Explicit repository queries are written against entity and field names,
//! native queries against table and column names. Both share one grammar:
//!
//! ```text
//! select m from Member m where m.username = :username
//! select new MemberDto(m.id, m.username, m.age) from Member m
//! select count(m) from Member m where age = :age
//! update Member m set m.age = m.age + 1 where m.age >= :age
//! select * from member where username = ?
//! ```
//!
//! # Usage
//!
//! ```rust
//! use ormrepo_lang::{parse, Statement};
//!
//! let stmt = parse("select m from Member m where m.username = :username").unwrap();
//! assert!(matches!(stmt, Statement::Select(_)));
//! assert_eq!(stmt.parameters().len(), 1);
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

pub use ast::{
    ArithOp, Assignment, CompareOp, Condition, Expr, FromClause, InList, JoinClause, JoinKind,
    Operand, OrderItem, Parameter, ParameterKind, Path, SelectItem, SelectList, SelectStatement,
    Statement, UpdateStatement,
};
pub use error::ParseError;
pub use span::Span;

/// Parse a query string into a statement.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    parser::parse(source)
}

/// Tokenize a source string (for debugging/testing).
pub fn tokenize(source: &str) -> Vec<lexer::SpannedToken> {
    lexer::tokenize(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_renders_with_source() {
        let source = "select m form Member m";
        let err = parse(source).unwrap_err();
        let rendered = err.format_with_source(source);
        assert!(rendered.starts_with("error:"));
        assert!(rendered.contains(source));
    }

    #[test]
    fn test_tokenize_counts_tokens() {
        assert_eq!(tokenize("select count(m) from Member m").len(), 8);
    }
}
