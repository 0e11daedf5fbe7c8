//! Mapping catalog.
//!
//! The catalog holds entity mappings (fields, columns, relations, named
//! queries), projection definitions and the declared query methods of each
//! repository.

mod catalog;
mod entity;
mod field;
mod relation;
mod types;

pub use catalog::{Catalog, ResolvedPath};
pub(crate) use catalog::uncapitalize;
pub use entity::{
    EntityDef, IdGeneration, NamedQuery, CREATED_BY, CREATED_DATE, LAST_MODIFIED_BY,
    LAST_MODIFIED_DATE,
};
pub use field::FieldDef;
pub use relation::RelationDef;
pub use types::ScalarType;
