//! Shared types for the ormrepo repository layer.
//!
//! # Modules
//!
//! - [`value`] - Runtime values for parameters and rows
//! - [`row`] - Rows returned by the store
//! - [`query`] - Store-facing filters, ordering and pagination
//! - [`error`] - Encoding error types
//!
//! # Serialization
//!
//! [`Value`] derives `rkyv::Archive`, `rkyv::Serialize` and `rkyv::Deserialize`
//! so stored rows can be read back without copying:
//!
//! ```ignore
//! use ormrepo_proto::Value;
//!
//! let value = Value::String("memberA".into());
//! let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&value).unwrap();
//! let archived = rkyv::access::<ArchivedValue, rkyv::rancor::Error>(&bytes).unwrap();
//! let deserialized: Value = rkyv::deserialize::<Value, rkyv::rancor::Error>(archived).unwrap();
//! ```

pub mod error;
pub mod query;
pub mod row;
pub mod value;

pub use error::Error;
pub use query::{FilterExpr, OrderDirection, OrderSpec, Pagination};
pub use row::Row;
pub use value::Value;
