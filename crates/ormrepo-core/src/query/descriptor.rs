//! Query descriptors: the resolved, immutable plan of one query method.

use ormrepo_lang::ArithOp;
use ormrepo_proto::{OrderSpec, Value};

use crate::catalog::ScalarType;
use crate::storage::{ClauseOp, JoinSpec};

/// What a method hands back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// A sequence, empty when nothing matches.
    Many,
    /// At most one result; more than one match is an error.
    One,
    /// A page with a total count.
    Page,
    /// A page without a total count.
    Slice,
    /// The number of matches.
    Count,
    /// Whether anything matches.
    Exists,
    /// Delete every match, returning how many were removed.
    Delete,
    /// A bulk update returning the affected row count.
    Modifying { clear: bool },
}

impl ResultShape {
    pub fn name(&self) -> &'static str {
        match self {
            ResultShape::Many => "a list",
            ResultShape::One => "a single result",
            ResultShape::Page => "a page",
            ResultShape::Slice => "a slice",
            ResultShape::Count => "a count",
            ResultShape::Exists => "an existence check",
            ResultShape::Delete => "a delete count",
            ResultShape::Modifying { .. } => "an update count",
        }
    }
}

/// A value feeding a clause: a call argument or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Index into the call arguments.
    Param(usize),
    Literal(Value),
}

/// One predicate clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// Dotted property path relative to the root entity.
    pub field: String,
    pub op: ClauseOp,
    pub args: Vec<Arg>,
}

/// A predicate tree over clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Clause(Clause),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Visit every clause in order.
    pub fn clauses(&self) -> Vec<&Clause> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Clause>) {
        match self {
            Predicate::Clause(c) => out.push(c),
            Predicate::And(items) | Predicate::Or(items) => {
                for item in items {
                    item.collect(out);
                }
            }
            Predicate::Not(inner) => inner.collect(out),
        }
    }
}

/// A selected column of an explicit query.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Dotted property path relative to the root entity.
    pub path: String,
    /// Output name.
    pub name: String,
}

/// What a select produces per matching row.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// The root entity.
    Entity,
    /// Selected columns keyed by output name.
    Columns(Vec<Column>),
    /// A value object built from the columns in order.
    Constructor { projection: String, columns: Vec<Column> },
    /// `select count(..)`.
    Count,
}

/// The count-only variant of a select.
#[derive(Debug, Clone, PartialEq)]
pub struct CountPlan {
    pub predicate: Option<Predicate>,
    pub joins: Vec<JoinSpec>,
    pub distinct: bool,
}

/// A select against the root entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub predicate: Option<Predicate>,
    pub joins: Vec<JoinSpec>,
    /// Static ordering; caller-supplied ordering is appended.
    pub order: Vec<OrderSpec>,
    /// Relations loaded in the same round-trip.
    pub fetch: Vec<String>,
    pub output: Output,
    /// Root columns to fetch, when the result shape needs only those.
    pub columns: Option<Vec<String>>,
    /// `First<N>` / `Top<N>` limit.
    pub limit: Option<u32>,
    pub distinct: bool,
    pub count: CountPlan,
}

/// Right-hand side of an update assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateExpr {
    Field(String),
    Arg(Arg),
    Binary {
        left: Box<UpdateExpr>,
        op: ArithOp,
        right: Box<UpdateExpr>,
    },
}

/// A bulk update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub assignments: Vec<(String, UpdateExpr)>,
    pub predicate: Option<Predicate>,
}

/// Literal native query text.
#[derive(Debug, Clone, PartialEq)]
pub struct NativePlan {
    pub sql: String,
    /// Separate native count text for page totals.
    pub count_sql: Option<String>,
}

/// The executable body of a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Select(SelectPlan),
    Update(UpdatePlan),
    Native(NativePlan),
}

/// A call parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSlot {
    pub name: String,
    /// Expected type, when the parameter feeds a typed field.
    pub scalar: Option<ScalarType>,
    /// Whether the parameter must be a collection (`in`).
    pub collection: bool,
}

/// The resolved plan of one method signature.
///
/// Descriptors are pure functions of the signature and the catalog; once
/// resolved they are cached and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    /// Cache key (`Member.findByUsername`, `Member.findUsernameByUsername<UsernameOnly>`).
    pub signature: String,
    pub entity: String,
    pub method: String,
    pub plan: Plan,
    pub shape: ResultShape,
    pub params: Vec<ParamSlot>,
    /// Results are not registered in the persistence context.
    pub read_only: bool,
    /// Projection applied to each result.
    pub projection: Option<String>,
    /// Whether a caller-supplied ordering is accepted.
    pub accepts_sort: bool,
}

impl QueryDescriptor {
    /// The select plan, if this is a select.
    pub fn select_plan(&self) -> Option<&SelectPlan> {
        match &self.plan {
            Plan::Select(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.plan, Plan::Native(_))
    }
}
