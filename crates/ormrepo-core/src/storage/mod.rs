//! Store collaborator.
//!
//! The repository layer talks to persistence only through the [`Store`]
//! trait. [`SledStore`] is the embedded implementation: one sled tree per
//! table, rkyv-encoded rows, and an undo log per unit of work.

mod config;
mod engine;
mod key;
mod native;
mod transaction;

pub use config::StorageConfig;
pub use engine::SledStore;
pub use key::{decode_identity, encode_identity};

use crate::error::Result;
use ormrepo_lang::ArithOp;
use ormrepo_proto::{FilterExpr, OrderSpec, Pagination, Row, Value};
use std::fmt;

/// Handle of an open unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Comparison operator of a predicate clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Between,
    In,
    NotIn,
    Like,
    NotLike,
    StartingWith,
    EndingWith,
    Containing,
    NotContaining,
    IsNull,
    IsNotNull,
    True,
    False,
}

impl ClauseOp {
    /// Number of values the operator consumes.
    pub fn arity(&self) -> usize {
        match self {
            ClauseOp::IsNull | ClauseOp::IsNotNull | ClauseOp::True | ClauseOp::False => 0,
            ClauseOp::Between => 2,
            _ => 1,
        }
    }

    /// Whether the operator expects a collection value.
    pub fn takes_collection(&self) -> bool {
        matches!(self, ClauseOp::In | ClauseOp::NotIn)
    }

    /// Whether the operator matches string patterns.
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            ClauseOp::Like
                | ClauseOp::NotLike
                | ClauseOp::StartingWith
                | ClauseOp::EndingWith
                | ClauseOp::Containing
                | ClauseOp::NotContaining
        )
    }
}

/// A predicate clause with its values bound.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundClause {
    /// Dotted property path relative to the queried entity.
    pub field: String,
    pub op: ClauseOp,
    pub values: Vec<Value>,
}

impl BoundClause {
    pub fn new(field: impl Into<String>, op: ClauseOp, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            values,
        }
    }
}

/// A relation join applied by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Dotted relation path (`team`).
    pub relation: String,
    /// Inner join: rows whose relation is null are dropped.
    pub required: bool,
}

/// An entity query handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub entity: String,
    pub filter: Option<FilterExpr>,
    pub joins: Vec<JoinSpec>,
    pub order: Vec<OrderSpec>,
    /// Relations returned loaded on each row.
    pub fetch: Vec<String>,
    /// Root fields to return; `None` returns every field.
    pub columns: Option<Vec<String>>,
    pub pagination: Option<Pagination>,
    pub distinct: bool,
}

impl StoreQuery {
    /// Query every row of an entity.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
            joins: Vec::new(),
            order: Vec::new(),
            fetch: Vec::new(),
            columns: None,
            pagination: None,
            distinct: false,
        }
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order: Vec<OrderSpec>) -> Self {
        self.order = order;
        self
    }

    pub fn with_fetch(mut self, fetch: Vec<String>) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// The count-only variant: same predicates and joins, no ordering,
    /// fetch graph, column narrowing or pagination.
    pub fn for_count(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            filter: self.filter.clone(),
            joins: self.joins.clone(),
            order: Vec::new(),
            fetch: Vec::new(),
            columns: None,
            pagination: None,
            distinct: self.distinct,
        }
    }
}

/// Right-hand side of a bulk assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateValue {
    Value(Value),
    /// Current value of a root field.
    Field(String),
    Binary {
        left: Box<UpdateValue>,
        op: ArithOp,
        right: Box<UpdateValue>,
    },
}

/// A set-based update executed without materializing entities.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkStatement {
    pub entity: String,
    pub assignments: Vec<(String, UpdateValue)>,
    pub filter: Option<FilterExpr>,
}

/// Literal native query text with its bound placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    pub sql: String,
    /// Values for `?` / `?N` placeholders, `?1` first.
    pub positional: Vec<Value>,
    /// Values for `:name` placeholders.
    pub named: Vec<(String, Value)>,
    pub sort: Vec<OrderSpec>,
    pub pagination: Option<Pagination>,
}

impl NativeQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            positional: Vec::new(),
            named: Vec::new(),
            sort: Vec::new(),
            pagination: None,
        }
    }
}

/// Capabilities the repository layer requires from persistence.
///
/// Writes take the unit of work they belong to; reads see every write made
/// so far, committed or not.
pub trait Store: Send + Sync {
    /// Translate a bound predicate clause into a native filter.
    fn translate(&self, clause: &BoundClause) -> Result<FilterExpr>;

    /// Execute an entity query.
    fn query(&self, query: &StoreQuery) -> Result<Vec<Row>>;

    /// Count the rows an entity query matches, ignoring pagination.
    fn count(&self, query: &StoreQuery) -> Result<u64>;

    /// Execute a bulk update, returning the number of affected rows.
    fn execute_bulk(&self, tx: TransactionId, statement: &BulkStatement) -> Result<u64>;

    /// Execute native query text. Rows are keyed by output column name.
    fn execute_native(&self, query: &NativeQuery) -> Result<Vec<Row>>;

    /// Count the rows native query text returns, ignoring pagination.
    fn count_native(&self, query: &NativeQuery) -> Result<u64>;

    /// Insert a row, assigning a sequence identity when it has none.
    /// Returns the stored row.
    fn insert(&self, tx: TransactionId, entity: &str, row: Row) -> Result<Row>;

    /// Overwrite the row stored under the row's identity.
    fn update(&self, tx: TransactionId, entity: &str, row: &Row) -> Result<()>;

    /// Delete by identity. Returns whether a row existed.
    fn delete(&self, tx: TransactionId, entity: &str, id: &Value) -> Result<bool>;

    /// Fetch one row by identity with the given relations loaded.
    fn find_by_id(&self, entity: &str, id: &Value, fetch: &[String]) -> Result<Option<Row>>;

    /// Open a unit of work.
    fn begin(&self) -> Result<TransactionId>;

    /// Make a unit of work's writes permanent.
    fn commit(&self, tx: TransactionId) -> Result<()>;

    /// Undo every write of a unit of work.
    fn rollback(&self, tx: TransactionId) -> Result<()>;
}
