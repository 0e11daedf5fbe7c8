//! Abstract syntax tree for repository query strings.

use crate::span::Span;
use ormrepo_proto::Value;

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Update(UpdateStatement),
}

impl Statement {
    /// Every placeholder in order of appearance.
    pub fn parameters(&self) -> Vec<&Parameter> {
        let mut out = Vec::new();
        match self {
            Statement::Select(select) => {
                for join in &select.joins {
                    if let Some(on) = &join.on {
                        on.collect_parameters(&mut out);
                    }
                }
                if let Some(condition) = &select.condition {
                    condition.collect_parameters(&mut out);
                }
            }
            Statement::Update(update) => {
                for assignment in &update.assignments {
                    assignment.value.collect_parameters(&mut out);
                }
                if let Some(condition) = &update.condition {
                    condition.collect_parameters(&mut out);
                }
            }
        }
        out
    }
}

/// `select ... from ... [join ...] [where ...] [order by ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub output: SelectList,
    pub from: FromClause,
    pub joins: Vec<JoinClause>,
    pub condition: Option<Condition>,
    pub order_by: Vec<OrderItem>,
    pub span: Span,
}

/// `update Entity alias set ... [where ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub target: FromClause,
    pub assignments: Vec<Assignment>,
    pub condition: Option<Condition>,
    pub span: Span,
}

/// What a select statement returns.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectList {
    /// `select *`
    Star,
    /// `select count(m)` or `select count(*)`
    Count(Option<Path>),
    /// `select new pkg.Dto(m.a, m.b)`
    Constructor { class: String, args: Vec<Path> },
    /// `select m` or `select m.a, m.b as c`
    Items(Vec<SelectItem>),
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub path: Path,
    pub alias: Option<String>,
}

/// The `from` target of a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub name: String,
    pub alias: Option<String>,
    pub span: Span,
}

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// `[left [outer] | inner] join [fetch] target [alias] [on cond]`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub fetch: bool,
    pub target: Path,
    pub alias: Option<String>,
    pub on: Option<Condition>,
}

/// A dotted path such as `m.team.name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<String>,
    pub span: Span,
}

impl Path {
    /// Create a path from its segments.
    pub fn new(segments: Vec<String>, span: Span) -> Self {
        Self { segments, span }
    }

    /// First segment.
    pub fn head(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or_default()
    }

    /// Last segment.
    pub fn last(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The segments joined with `.`.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

/// A boolean condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    In {
        path: Path,
        negated: bool,
        list: InList,
    },
    Like {
        path: Path,
        negated: bool,
        pattern: Operand,
    },
    IsNull {
        path: Path,
        negated: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a Parameter>) {
        match self {
            Condition::Compare { left, right, .. } => {
                left.collect_parameters(out);
                right.collect_parameters(out);
            }
            Condition::In { list, .. } => match list {
                InList::Parameter(p) => out.push(p),
                InList::Items(items) => {
                    for item in items {
                        item.collect_parameters(out);
                    }
                }
            },
            Condition::Like { pattern, .. } => pattern.collect_parameters(out),
            Condition::IsNull { .. } => {}
            Condition::And(items) | Condition::Or(items) => {
                for item in items {
                    item.collect_parameters(out);
                }
            }
            Condition::Not(inner) => inner.collect_parameters(out),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// The operator with its operands swapped (`a < b` == `b > a`).
    pub fn flipped(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }
}

/// Right-hand side of `in`.
#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    /// `in :names`
    Parameter(Parameter),
    /// `in (1, 2, :x)`
    Items(Vec<Operand>),
}

/// A leaf of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(Path),
    Parameter(Parameter),
    Literal(Value),
}

impl Operand {
    fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a Parameter>) {
        if let Operand::Parameter(p) = self {
            out.push(p);
        }
    }
}

/// A placeholder. Bare `?` placeholders are numbered from 1 in order of
/// appearance by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub kind: ParameterKind,
    pub span: Span,
}

/// Named or positional placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Named(String),
    Positional(u32),
}

/// `order by` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub path: Path,
    pub descending: bool,
}

/// `alias.field = expr` in an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: Path,
    pub value: Expr,
}

/// Arithmetic operator in update expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

/// Update value expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Operand(Operand),
    Binary {
        left: Box<Expr>,
        op: ArithOp,
        right: Box<Expr>,
    },
}

impl Expr {
    fn collect_parameters<'a>(&'a self, out: &mut Vec<&'a Parameter>) {
        match self {
            Expr::Operand(operand) => operand.collect_parameters(out),
            Expr::Binary { left, right, .. } => {
                left.collect_parameters(out);
                right.collect_parameters(out);
            }
        }
    }
}
