//! Field definitions for entities.

use super::types::ScalarType;

/// A mapped scalar field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Property name used by query methods and projections.
    pub name: String,
    /// Column name used by native queries.
    pub column: String,
    /// Field data type.
    pub scalar: ScalarType,
    /// Whether the column may hold null.
    pub nullable: bool,
}

impl FieldDef {
    /// Create a non-null field whose column name equals its property name.
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            scalar,
            nullable: false,
        }
    }

    /// Create a nullable field.
    pub fn optional(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            nullable: true,
            ..Self::new(name, scalar)
        }
    }

    /// Override the column name.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}
