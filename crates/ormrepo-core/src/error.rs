//! Core error types.

use thiserror::Error;

/// Repository layer errors.
///
/// `Resolution`, `Binding` and `Projection` are raised before any store
/// round-trip and never leave partial writes behind.
#[derive(Debug, Error)]
pub enum Error {
    /// A method signature names a property, relation, entity or query that does not exist.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Call arguments do not match the declared parameters or placeholders.
    #[error("binding error: {0}")]
    Binding(String),

    /// A single-result operation matched more than one row.
    #[error("cardinality error: '{operation}' expected at most one result, found {found}")]
    Cardinality { operation: String, found: usize },

    /// A projection could not be built, or projections nest each other.
    #[error("projection error: {0}")]
    Projection(String),

    /// Caller supplied an invalid page request or sort.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An entity required by a by-id operation does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: String, id: String },
}

/// Failures raised by the store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// sled failure.
    #[error("storage: {0}")]
    Sled(#[from] sled::Error),

    /// Row encoding failure.
    #[error("encoding: {0}")]
    Encoding(#[from] ormrepo_proto::Error),

    /// Native query text could not be parsed or resolved.
    #[error("native query: {0}")]
    Native(String),

    /// Unit of work misuse (unknown or finished transaction).
    #[error("transaction: {0}")]
    Transaction(String),

    /// Write rejected by the store (duplicate key, missing identity).
    #[error("constraint: {0}")]
    Constraint(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Store(StoreError::Sled(e))
    }
}

impl From<ormrepo_proto::Error> for Error {
    fn from(e: ormrepo_proto::Error) -> Self {
        Error::Store(StoreError::Encoding(e))
    }
}

impl Error {
    /// Shorthand for a resolution error.
    pub fn resolution(message: impl Into<String>) -> Self {
        Error::Resolution(message.into())
    }

    /// Shorthand for a binding error.
    pub fn binding(message: impl Into<String>) -> Self {
        Error::Binding(message.into())
    }

    /// Shorthand for a projection error.
    pub fn projection(message: impl Into<String>) -> Self {
        Error::Projection(message.into())
    }

    /// Shorthand for an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Shorthand for a native query failure.
    pub fn native(message: impl Into<String>) -> Self {
        Error::Store(StoreError::Native(message.into()))
    }

    /// Whether this error was raised by the store collaborator.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
