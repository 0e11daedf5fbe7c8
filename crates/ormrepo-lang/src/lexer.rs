//! Lexer for repository query strings using logos.

use crate::span::Span;
use logos::Logos;

/// Token types. Keywords match case-insensitively.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Statement keywords
    #[token("select", ignore(ascii_case))]
    Select,
    #[token("update", ignore(ascii_case))]
    Update,
    #[token("set", ignore(ascii_case))]
    Set,
    #[token("from", ignore(ascii_case))]
    From,
    #[token("where", ignore(ascii_case))]
    Where,
    #[token("distinct", ignore(ascii_case))]
    Distinct,
    #[token("new", ignore(ascii_case))]
    New,
    #[token("count", ignore(ascii_case))]
    Count,
    #[token("as", ignore(ascii_case))]
    As,

    // Joins
    #[token("left", ignore(ascii_case))]
    Left,
    #[token("inner", ignore(ascii_case))]
    Inner,
    #[token("outer", ignore(ascii_case))]
    Outer,
    #[token("join", ignore(ascii_case))]
    Join,
    #[token("fetch", ignore(ascii_case))]
    Fetch,
    #[token("on", ignore(ascii_case))]
    On,

    // Ordering
    #[token("order", ignore(ascii_case))]
    Order,
    #[token("by", ignore(ascii_case))]
    By,
    #[token("asc", ignore(ascii_case))]
    Asc,
    #[token("desc", ignore(ascii_case))]
    Desc,

    // Logical and keyword operators
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("not", ignore(ascii_case))]
    Not,
    #[token("in", ignore(ascii_case))]
    In,
    #[token("like", ignore(ascii_case))]
    Like,
    #[token("is", ignore(ascii_case))]
    Is,

    // Literals
    #[token("null", ignore(ascii_case))]
    Null,
    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,

    // Comparison operators
    #[token("=")]
    Eq,
    #[token("<>")]
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Arithmetic
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,

    // Placeholders
    #[regex(r":[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice()[1..].to_string())]
    NamedParam(String),
    #[regex(r"\?[0-9]*", |lex| lex.slice()[1..].parse::<u32>().ok())]
    PositionalParam(Option<u32>),

    // Identifier
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // String literal, single-quoted with '' as the escaped quote
    #[regex(r"'([^']|'')*'", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].replace("''", "'")
    })]
    String(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    // Punctuation
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer that produces spanned tokens with one token of lookahead.
///
/// Unrecognized input is skipped but remembered; the parser reports the
/// first one once the statement has been read.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    peeked: Option<Option<SpannedToken>>,
    invalid: Option<Span>,
}

impl<'source> Lexer<'source> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
            peeked: None,
            invalid: None,
        }
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> Option<&SpannedToken> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_inner());
        }
        self.peeked.as_ref().and_then(|o| o.as_ref())
    }

    /// Check whether the next token has the same variant as `token`.
    pub fn peek_is(&mut self, token: &Token) -> bool {
        self.peek()
            .map(|t| std::mem::discriminant(&t.token) == std::mem::discriminant(token))
            .unwrap_or(false)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Option<SpannedToken> {
        match self.peeked.take() {
            Some(peeked) => peeked,
            None => self.next_inner(),
        }
    }

    fn next_inner(&mut self) -> Option<SpannedToken> {
        loop {
            match self.inner.next() {
                Some(Ok(token)) => {
                    return Some(SpannedToken {
                        token,
                        span: self.inner.span().into(),
                    });
                }
                Some(Err(())) => {
                    if self.invalid.is_none() {
                        self.invalid = Some(self.inner.span().into());
                    }
                }
                None => return None,
            }
        }
    }

    /// Span of the first unrecognized input, if any.
    pub fn invalid(&self) -> Option<Span> {
        self.invalid
    }

    /// Get the source string.
    pub fn source(&self) -> &'source str {
        self.inner.source()
    }
}

impl Iterator for Lexer<'_> {
    type Item = SpannedToken;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Tokenize a source string into a vector of spanned tokens.
pub fn tokenize(source: &str) -> Vec<SpannedToken> {
    Lexer::new(source).collect()
}
