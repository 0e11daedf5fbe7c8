//! Recursive descent parser for repository query strings.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::span::Span;
use ormrepo_proto::Value;

/// Parser state.
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    source: &'source str,
    positional: u32,
}

impl<'source> Parser<'source> {
    /// Create a new parser for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            source,
            positional: 0,
        }
    }

    /// Parse a complete statement and require end of input.
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let first = self.next_token()?;
        let stmt = match first.token {
            Token::Select => Statement::Select(self.parse_select(first.span)?),
            Token::Update => Statement::Update(self.parse_update(first.span)?),
            other => {
                return Err(self
                    .error(format!("expected 'select' or 'update', found {other:?}"), first.span)
                    .with_hint("query strings start with select or update"))
            }
        };

        if let Some(extra) = self.lexer.next_token() {
            return Err(self.error(format!("unexpected {:?}", extra.token), extra.span));
        }
        if let Some(span) = self.lexer.invalid() {
            return Err(self.error("unexpected character", span));
        }
        Ok(stmt)
    }

    fn parse_select(&mut self, start: Span) -> Result<SelectStatement, ParseError> {
        let distinct = self.eat(&Token::Distinct);
        let output = self.parse_select_list()?;
        self.expect_token(Token::From)?;
        let from = self.parse_from()?;

        let mut joins = Vec::new();
        while let Some(join) = self.parse_join()? {
            joins.push(join);
        }

        let condition = if self.eat(&Token::Where) {
            Some(self.parse_condition()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.eat(&Token::Order) {
            self.expect_token(Token::By)?;
            loop {
                let path = self.parse_path()?;
                let descending = if self.eat(&Token::Desc) {
                    true
                } else {
                    self.eat(&Token::Asc);
                    false
                };
                order_by.push(OrderItem { path, descending });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        Ok(SelectStatement {
            distinct,
            output,
            from,
            joins,
            condition,
            order_by,
            span: start.merge(Span::eof(self.source)),
        })
    }

    fn parse_select_list(&mut self) -> Result<SelectList, ParseError> {
        if self.eat(&Token::Star) {
            return Ok(SelectList::Star);
        }

        if self.eat(&Token::Count) {
            self.expect_token(Token::LParen)?;
            let target = if self.eat(&Token::Star) {
                None
            } else {
                Some(self.parse_path()?)
            };
            self.expect_token(Token::RParen)?;
            return Ok(SelectList::Count(target));
        }

        if self.eat(&Token::New) {
            let class = self.parse_path()?.dotted();
            self.expect_token(Token::LParen)?;
            let mut args = vec![self.parse_path()?];
            while self.eat(&Token::Comma) {
                args.push(self.parse_path()?);
            }
            self.expect_token(Token::RParen)?;
            return Ok(SelectList::Constructor { class, args });
        }

        let mut items = Vec::new();
        loop {
            let path = self.parse_path()?;
            let alias = self.parse_alias()?;
            items.push(SelectItem { path, alias });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(SelectList::Items(items))
    }

    fn parse_from(&mut self) -> Result<FromClause, ParseError> {
        let tok = self.next_token()?;
        let name = match tok.token {
            Token::Ident(name) => name,
            other => {
                return Err(self.error(format!("expected entity name, found {other:?}"), tok.span))
            }
        };
        let alias = self.parse_alias()?;
        Ok(FromClause {
            name,
            alias,
            span: tok.span,
        })
    }

    /// `[as] ident`, only when an identifier follows.
    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.eat(&Token::As) {
            return Ok(Some(self.expect_ident()?));
        }
        if let Some(SpannedToken {
            token: Token::Ident(_),
            ..
        }) = self.lexer.peek()
        {
            return Ok(Some(self.expect_ident()?));
        }
        Ok(None)
    }

    fn parse_join(&mut self) -> Result<Option<JoinClause>, ParseError> {
        let kind = if self.eat(&Token::Left) {
            self.eat(&Token::Outer);
            JoinKind::Left
        } else if self.eat(&Token::Inner) {
            JoinKind::Inner
        } else if self.lexer.peek_is(&Token::Join) {
            JoinKind::Inner
        } else {
            return Ok(None);
        };
        self.expect_token(Token::Join)?;

        let fetch = self.eat(&Token::Fetch);
        let target = self.parse_path()?;
        let alias = self.parse_alias()?;
        let on = if self.eat(&Token::On) {
            Some(self.parse_condition()?)
        } else {
            None
        };

        Ok(Some(JoinClause {
            kind,
            fetch,
            target,
            alias,
            on,
        }))
    }

    fn parse_update(&mut self, start: Span) -> Result<UpdateStatement, ParseError> {
        let target = self.parse_from()?;
        self.expect_token(Token::Set)?;

        let mut assignments = Vec::new();
        loop {
            let path = self.parse_path()?;
            self.expect_token(Token::Eq)?;
            let value = self.parse_expr()?;
            assignments.push(Assignment {
                target: path,
                value,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        let condition = if self.eat(&Token::Where) {
            Some(self.parse_condition()?)
        } else {
            None
        };

        Ok(UpdateStatement {
            target,
            assignments,
            condition,
            span: start.merge(Span::eof(self.source)),
        })
    }

    /// Parse a condition (OR has the lowest precedence).
    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        let mut items = vec![self.parse_and_condition()?];
        while self.eat(&Token::Or) {
            items.push(self.parse_and_condition()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Condition::Or(items)
        })
    }

    fn parse_and_condition(&mut self) -> Result<Condition, ParseError> {
        let mut items = vec![self.parse_unary_condition()?];
        while self.eat(&Token::And) {
            items.push(self.parse_unary_condition()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Condition::And(items)
        })
    }

    fn parse_unary_condition(&mut self) -> Result<Condition, ParseError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_unary_condition()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        if self.eat(&Token::LParen) {
            let inner = self.parse_condition()?;
            self.expect_token(Token::RParen)?;
            return Ok(inner);
        }
        self.parse_primary_condition()
    }

    /// Comparison, `in`, `like` or `is null` with an operand on the left.
    fn parse_primary_condition(&mut self) -> Result<Condition, ParseError> {
        let left = self.parse_operand()?;
        let tok = self.next_token()?;

        let op = match tok.token {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            Token::Is => {
                let path = self.require_path(left, tok.span)?;
                let negated = self.eat(&Token::Not);
                self.expect_token(Token::Null)?;
                return Ok(Condition::IsNull { path, negated });
            }
            Token::Not => {
                let path = self.require_path(left, tok.span)?;
                let next = self.next_token()?;
                return match next.token {
                    Token::In => self.parse_in(path, true),
                    Token::Like => self.parse_like(path, true),
                    other => Err(self.error(
                        format!("expected 'in' or 'like' after 'not', found {other:?}"),
                        next.span,
                    )),
                };
            }
            Token::In => {
                let path = self.require_path(left, tok.span)?;
                return self.parse_in(path, false);
            }
            Token::Like => {
                let path = self.require_path(left, tok.span)?;
                return self.parse_like(path, false);
            }
            other => {
                return Err(self.error(format!("expected operator, found {other:?}"), tok.span))
            }
        };

        let right = self.parse_operand()?;
        Ok(Condition::Compare { left, op, right })
    }

    fn parse_in(&mut self, path: Path, negated: bool) -> Result<Condition, ParseError> {
        if self.eat(&Token::LParen) {
            let mut items = vec![self.parse_operand()?];
            while self.eat(&Token::Comma) {
                items.push(self.parse_operand()?);
            }
            self.expect_token(Token::RParen)?;
            return Ok(Condition::In {
                path,
                negated,
                list: InList::Items(items),
            });
        }

        let tok = self.next_token()?;
        let parameter = self.parameter_from(tok)?;
        Ok(Condition::In {
            path,
            negated,
            list: InList::Parameter(parameter),
        })
    }

    fn parse_like(&mut self, path: Path, negated: bool) -> Result<Condition, ParseError> {
        let pattern = self.parse_operand()?;
        Ok(Condition::Like {
            path,
            negated,
            pattern,
        })
    }

    /// Additive expression for update assignments.
    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                ArithOp::Add
            } else if self.eat(&Token::Minus) {
                ArithOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_term()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        while self.eat(&Token::Star) {
            let right = self.parse_factor()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: ArithOp::Mul,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_expr()?;
            self.expect_token(Token::RParen)?;
            return Ok(inner);
        }
        Ok(Expr::Operand(self.parse_operand()?))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        let tok = self.next_token()?;
        let operand = match tok.token {
            Token::Ident(first) => {
                let path = self.parse_path_rest(first, tok.span)?;
                Operand::Path(path)
            }
            Token::NamedParam(_) | Token::PositionalParam(_) => {
                Operand::Parameter(self.parameter_from(tok)?)
            }
            Token::String(s) => Operand::Literal(Value::String(s)),
            Token::Int(i) => Operand::Literal(int_literal(i)),
            Token::Float(f) => Operand::Literal(Value::Float64(f)),
            Token::True => Operand::Literal(Value::Bool(true)),
            Token::False => Operand::Literal(Value::Bool(false)),
            Token::Null => Operand::Literal(Value::Null),
            Token::Minus => {
                let next = self.next_token()?;
                match next.token {
                    Token::Int(i) => Operand::Literal(int_literal(-i)),
                    Token::Float(f) => Operand::Literal(Value::Float64(-f)),
                    other => {
                        return Err(self.error(
                            format!("expected number after '-', found {other:?}"),
                            next.span,
                        ))
                    }
                }
            }
            other => {
                return Err(self.error(format!("expected operand, found {other:?}"), tok.span))
            }
        };
        Ok(operand)
    }

    fn parameter_from(&mut self, tok: SpannedToken) -> Result<Parameter, ParseError> {
        let kind = match tok.token {
            Token::NamedParam(name) => ParameterKind::Named(name),
            Token::PositionalParam(Some(index)) => ParameterKind::Positional(index),
            Token::PositionalParam(None) => {
                self.positional += 1;
                ParameterKind::Positional(self.positional)
            }
            other => {
                return Err(self.error(format!("expected parameter, found {other:?}"), tok.span))
            }
        };
        Ok(Parameter {
            kind,
            span: tok.span,
        })
    }

    fn parse_path(&mut self) -> Result<Path, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Ident(first) => self.parse_path_rest(first, tok.span),
            other => Err(self.error(format!("expected identifier, found {other:?}"), tok.span)),
        }
    }

    fn parse_path_rest(&mut self, first: String, start: Span) -> Result<Path, ParseError> {
        let mut segments = vec![first];
        let mut span = start;
        while self.eat(&Token::Dot) {
            let tok = self.next_token()?;
            match tok.token {
                Token::Ident(name) => {
                    segments.push(name);
                    span = span.merge(tok.span);
                }
                other => {
                    return Err(self.error(
                        format!("expected identifier after '.', found {other:?}"),
                        tok.span,
                    ))
                }
            }
        }
        Ok(Path::new(segments, span))
    }

    fn require_path(&self, operand: Operand, at: Span) -> Result<Path, ParseError> {
        match operand {
            Operand::Path(path) => Ok(path),
            _ => Err(self.error("left side of this operator must be a path", at)),
        }
    }

    /// Consume the next token if it has the same variant as `token`.
    fn eat(&mut self, token: &Token) -> bool {
        if self.lexer.peek_is(token) {
            self.lexer.next_token();
            true
        } else {
            false
        }
    }

    /// Expect and consume an identifier.
    fn expect_ident(&mut self) -> Result<String, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Ident(name) => Ok(name),
            other => Err(self.error(format!("expected identifier, found {other:?}"), tok.span)),
        }
    }

    /// Expect and consume a specific token.
    fn expect_token(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        let tok = self.next_token()?;
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(self.error(
                format!("expected {:?}, found {:?}", expected, tok.token),
                tok.span,
            ))
        }
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        let source = self.source;
        self.lexer
            .next_token()
            .ok_or_else(|| ParseError::new("unexpected end of input", Span::eof(source), source))
    }

    fn error(&self, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::new(message, span, self.source)
    }
}

/// Integer literals narrow to `Int32` when they fit.
fn int_literal(i: i64) -> Value {
    match i32::try_from(i) {
        Ok(small) => Value::Int32(small),
        Err(_) => Value::Int64(i),
    }
}

/// Parse a source string into a statement.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    Parser::new(source).parse_statement()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(dotted: &str) -> Vec<String> {
        dotted.split('.').map(str::to_string).collect()
    }

    fn select(source: &str) -> SelectStatement {
        match parse(source).unwrap() {
            Statement::Select(s) => s,
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_root_select_with_named_parameters() {
        let s = select("select m from Member m where m.username = :username and m.age = :age");
        assert_eq!(s.from.name, "Member");
        assert_eq!(s.from.alias.as_deref(), Some("m"));
        let SelectList::Items(items) = &s.output else {
            panic!("expected items");
        };
        assert_eq!(items[0].path.segments, path("m"));

        let Some(Condition::And(parts)) = &s.condition else {
            panic!("expected and");
        };
        assert_eq!(parts.len(), 2);
        let names: Vec<_> = parse("select m from Member m where m.username = :username and m.age = :age")
            .unwrap()
            .parameters()
            .into_iter()
            .map(|p| p.kind.clone())
            .collect();
        assert_eq!(
            names,
            vec![
                ParameterKind::Named("username".into()),
                ParameterKind::Named("age".into())
            ]
        );
    }

    #[test]
    fn test_parse_in_parameter() {
        let s = select("select m from Member m where m.username in :names");
        assert_eq!(
            s.condition,
            Some(Condition::In {
                path: Path::new(path("m.username"), Span::new(29, 39)),
                negated: false,
                list: InList::Parameter(Parameter {
                    kind: ParameterKind::Named("names".into()),
                    span: Span::new(43, 49),
                }),
            })
        );
    }

    #[test]
    fn test_parse_constructor_select() {
        let s = select(
            "select new study.dto.MemberDto(m.id, m.username, m.age) from Member m where username = :username",
        );
        let SelectList::Constructor { class, args } = s.output else {
            panic!("expected constructor");
        };
        assert_eq!(class, "study.dto.MemberDto");
        assert_eq!(args.len(), 3);
        assert_eq!(args[2].segments, path("m.age"));
    }

    #[test]
    fn test_parse_join_and_order() {
        let s = select(
            "select m from Member m left join fetch m.team t where age = :age order by m.username desc, m.age",
        );
        assert_eq!(s.joins.len(), 1);
        assert_eq!(s.joins[0].kind, JoinKind::Left);
        assert!(s.joins[0].fetch);
        assert_eq!(s.joins[0].target.segments, path("m.team"));
        assert_eq!(s.joins[0].alias.as_deref(), Some("t"));
        assert_eq!(s.order_by.len(), 2);
        assert!(s.order_by[0].descending);
        assert!(!s.order_by[1].descending);
    }

    #[test]
    fn test_parse_count() {
        let s = select("select count(m) from Member m where age = :age");
        assert!(matches!(s.output, SelectList::Count(Some(_))));
        let s = select("SELECT COUNT(*) FROM member");
        assert_eq!(s.output, SelectList::Count(None));
    }

    #[test]
    fn test_parse_update_with_arithmetic() {
        let stmt = parse("update Member m set m.age = m.age + 1 where m.age >= :age").unwrap();
        let Statement::Update(u) = stmt else {
            panic!("expected update");
        };
        assert_eq!(u.target.name, "Member");
        assert_eq!(u.assignments.len(), 1);
        assert!(matches!(
            u.assignments[0].value,
            Expr::Binary {
                op: ArithOp::Add,
                ..
            }
        ));
        assert!(matches!(
            u.condition,
            Some(Condition::Compare {
                op: CompareOp::Ge,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_native_join_with_positional_parameters() {
        let s = select(
            "select m.member_id as id, m.username, t.name as teamName from member m \
             left outer join team t on m.team_id = t.team_id where m.username = ? and m.age > ?",
        );
        let SelectList::Items(items) = &s.output else {
            panic!("expected items");
        };
        assert_eq!(items[0].alias.as_deref(), Some("id"));
        assert_eq!(items[1].alias, None);
        assert_eq!(items[2].alias.as_deref(), Some("teamName"));
        assert!(s.joins[0].on.is_some());

        let stmt = Statement::Select(s);
        let kinds: Vec<_> = stmt.parameters().into_iter().map(|p| p.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![ParameterKind::Positional(1), ParameterKind::Positional(2)]
        );
    }

    #[test]
    fn test_parse_null_not_in_and_like() {
        let s = select(
            "select m from Member m where m.team is not null or (m.username not in ('a', 'b') and not m.username like 'mem%')",
        );
        let Some(Condition::Or(parts)) = s.condition else {
            panic!("expected or");
        };
        assert!(matches!(parts[0], Condition::IsNull { negated: true, .. }));
        let Condition::And(inner) = &parts[1] else {
            panic!("expected and");
        };
        assert!(matches!(inner[0], Condition::In { negated: true, .. }));
        assert!(matches!(inner[1], Condition::Not(_)));
    }

    #[test]
    fn test_parse_negative_literal() {
        let s = select("select m from Member m where m.age > -5");
        assert!(matches!(
            s.condition,
            Some(Condition::Compare {
                right: Operand::Literal(Value::Int32(-5)),
                ..
            })
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("delete from Member").is_err());
        assert!(parse("select m from").is_err());
        assert!(parse("select m from Member m where").is_err());
        assert!(parse("select m from Member m where m.age").is_err());
        assert!(parse("select m from Member m extra tokens").is_err());
        assert!(parse("select m from Member m where m.age = #").is_err());
    }
}
