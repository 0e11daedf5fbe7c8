//! Entity definitions.

use super::field::FieldDef;
use super::relation::RelationDef;
use super::types::ScalarType;

/// Property holding the creation timestamp of an audited entity.
pub const CREATED_DATE: &str = "createdDate";
/// Property holding the last modification timestamp of an audited entity.
pub const LAST_MODIFIED_DATE: &str = "lastModifiedDate";
/// Property holding the creating auditor of an audited entity.
pub const CREATED_BY: &str = "createdBy";
/// Property holding the last modifying auditor of an audited entity.
pub const LAST_MODIFIED_BY: &str = "lastModifiedBy";

/// How an entity's identity is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGeneration {
    /// The store assigns the next sequence value on insert.
    Sequence,
    /// The caller assigns the identity before the first save.
    Assigned,
}

/// A named explicit query declared on an entity (`Member.findUser`).
#[derive(Debug, Clone, PartialEq)]
pub struct NamedQuery {
    pub name: String,
    pub query: String,
}

/// A mapped entity: identity, scalar fields and many-to-one relations.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    /// Entity name used in explicit queries.
    pub name: String,
    /// Table name used by the store and native queries.
    pub table: String,
    /// Name of the identity field.
    pub identity: String,
    /// Identity assignment strategy.
    pub id_generation: IdGeneration,
    /// Scalar fields, identity first.
    pub fields: Vec<FieldDef>,
    /// Relations owned by this entity.
    pub relations: Vec<RelationDef>,
    /// Named explicit queries.
    pub named_queries: Vec<NamedQuery>,
    /// Whether saves stamp audit fields.
    pub audited: bool,
}

impl EntityDef {
    /// Create an entity without fields.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            identity: String::new(),
            id_generation: IdGeneration::Sequence,
            fields: Vec::new(),
            relations: Vec::new(),
            named_queries: Vec::new(),
            audited: false,
        }
    }

    /// Declare the identity field. It is kept as the first field.
    pub fn with_identity(mut self, field: FieldDef, generation: IdGeneration) -> Self {
        self.identity = field.name.clone();
        self.id_generation = generation;
        self.fields.retain(|f| f.name != field.name);
        self.fields.insert(0, field);
        self
    }

    /// Add a scalar field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    /// Add a many-to-one relation. A nullable `Int64` foreign key field is
    /// added when the entity does not declare it already.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        if self.field(&relation.foreign_key).is_none() {
            self.fields
                .push(FieldDef::optional(relation.foreign_key.clone(), ScalarType::Int64));
        }
        self.relations.push(relation);
        self
    }

    /// Declare a named explicit query.
    pub fn with_named_query(mut self, name: impl Into<String>, query: impl Into<String>) -> Self {
        self.named_queries.push(NamedQuery {
            name: name.into(),
            query: query.into(),
        });
        self
    }

    /// Add the four audit fields and enable stamping on save.
    pub fn audited(mut self) -> Self {
        self.audited = true;
        self = self
            .with_field(FieldDef::optional(CREATED_DATE, ScalarType::Timestamp).with_column("created_date"))
            .with_field(
                FieldDef::optional(LAST_MODIFIED_DATE, ScalarType::Timestamp)
                    .with_column("last_modified_date"),
            )
            .with_field(FieldDef::optional(CREATED_BY, ScalarType::String).with_column("created_by"))
            .with_field(
                FieldDef::optional(LAST_MODIFIED_BY, ScalarType::String)
                    .with_column("last_modified_by"),
            );
        self
    }

    /// Get a field by property name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a field by column name, case-insensitively.
    pub fn field_by_column(&self, column: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.column.eq_ignore_ascii_case(column))
    }

    /// Get a relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// The identity field definition.
    pub fn identity_field(&self) -> Option<&FieldDef> {
        self.field(&self.identity)
    }

    /// Get a named query declared on this entity.
    pub fn named_query(&self, name: &str) -> Option<&NamedQuery> {
        self.named_queries.iter().find(|q| q.name == name)
    }
}
