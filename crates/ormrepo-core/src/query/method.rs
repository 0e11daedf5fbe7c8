//! Declarative query method tables.
//!
//! Each repository declares its operations up front instead of having them
//! discovered from method signatures at runtime:
//!
//! ```rust
//! use ormrepo_core::query::{QueryMethod, QueryTable};
//!
//! let table = QueryTable::new("Member")
//!     .method(QueryMethod::derived("findByUsername"))
//!     .method(QueryMethod::named("findUser").params(["username"]))
//!     .method(
//!         QueryMethod::query("findByAge2", "select m from Member m left join m.team t where age = :age")
//!             .params(["age"])
//!             .paged()
//!             .count_query("select count(m) from Member m where age = :age"),
//!     );
//! assert_eq!(table.methods().len(), 3);
//! ```

use crate::entity::Entity;
use crate::projection::Projection;

/// Where a method's query comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySource {
    /// Parsed from the method name.
    Derived,
    /// An explicit query string.
    Explicit(String),
    /// A named query declared on an entity; `None` means `Entity.method`.
    Named(Option<String>),
    /// Literal native query text.
    Native(String),
}

/// Declared result shape, before the subject of a derived name is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Many,
    One,
    Page,
    Slice,
}

/// Where a method's projection comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionSource {
    /// Full entities.
    None,
    /// A projection fixed at declaration.
    Fixed(String),
    /// A projection chosen per call.
    Dynamic,
}

/// One declared repository operation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMethod {
    pub name: String,
    pub source: QuerySource,
    /// Call parameter names, in call order.
    pub params: Vec<String>,
    pub returns: Returns,
    /// Accept a caller-supplied ordering on list results.
    pub sorted: bool,
    pub count_query: Option<String>,
    /// `Some(clear)` marks an update statement.
    pub modifying: Option<bool>,
    /// Relations loaded in the same round-trip.
    pub fetch: Vec<String>,
    pub read_only: bool,
    pub projection: ProjectionSource,
}

impl QueryMethod {
    fn with_source(name: impl Into<String>, source: QuerySource) -> Self {
        Self {
            name: name.into(),
            source,
            params: Vec::new(),
            returns: Returns::Many,
            sorted: false,
            count_query: None,
            modifying: None,
            fetch: Vec::new(),
            read_only: false,
            projection: ProjectionSource::None,
        }
    }

    /// A method whose query is derived from its name.
    pub fn derived(name: impl Into<String>) -> Self {
        Self::with_source(name, QuerySource::Derived)
    }

    /// A method running an explicit query.
    pub fn query(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::with_source(name, QuerySource::Explicit(query.into()))
    }

    /// A method running the named query `Entity.method`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_source(name, QuerySource::Named(None))
    }

    /// A method running a named query under a different name.
    pub fn named_as(name: impl Into<String>, query_name: impl Into<String>) -> Self {
        Self::with_source(name, QuerySource::Named(Some(query_name.into())))
    }

    /// A method running native query text.
    pub fn native(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::with_source(name, QuerySource::Native(sql.into()))
    }

    /// Declare the call parameter names.
    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = names.into_iter().map(Into::into).collect();
        self
    }

    /// Return at most one result.
    pub fn single(mut self) -> Self {
        self.returns = Returns::One;
        self
    }

    /// Return a page with a total count.
    pub fn paged(mut self) -> Self {
        self.returns = Returns::Page;
        self
    }

    /// Return a slice without a total count.
    pub fn slice(mut self) -> Self {
        self.returns = Returns::Slice;
        self
    }

    /// Accept a caller-supplied ordering.
    pub fn sorted(mut self) -> Self {
        self.sorted = true;
        self
    }

    /// Use a separate query for the page total.
    pub fn count_query(mut self, query: impl Into<String>) -> Self {
        self.count_query = Some(query.into());
        self
    }

    /// Mark an update statement; `clear` empties the persistence context
    /// once it completes.
    pub fn modifying(mut self, clear: bool) -> Self {
        self.modifying = Some(clear);
        self
    }

    /// Load relations in the same round-trip.
    pub fn fetch<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetch = relations.into_iter().map(Into::into).collect();
        self
    }

    /// Do not track results in the persistence context.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Project results onto a named projection.
    pub fn projection(mut self, name: impl Into<String>) -> Self {
        self.projection = ProjectionSource::Fixed(name.into());
        self
    }

    /// Project results onto a typed projection.
    pub fn returning<P: Projection>(self) -> Self {
        self.projection(P::NAME)
    }

    /// Let each call choose its projection.
    pub fn dynamic_projection(mut self) -> Self {
        self.projection = ProjectionSource::Dynamic;
        self
    }
}

/// The query methods of one entity's repository.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTable {
    entity: String,
    methods: Vec<QueryMethod>,
}

impl QueryTable {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            methods: Vec::new(),
        }
    }

    /// Start a table for a typed entity.
    pub fn for_entity<E: Entity>() -> Self {
        Self::new(E::NAME)
    }

    /// Declare a method, replacing an earlier one of the same name.
    pub fn method(mut self, method: QueryMethod) -> Self {
        self.methods.retain(|m| m.name != method.name);
        self.methods.push(method);
        self
    }

    pub fn get(&self, name: &str) -> Option<&QueryMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn methods(&self) -> &[QueryMethod] {
        &self.methods
    }
}
