//! Relation definitions between entities.

/// A many-to-one reference from an owning entity to a target entity.
///
/// The owning side stores the target's identity in `foreign_key`; it does not
/// own the target's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    /// Relation (property) name on the owning entity.
    pub name: String,
    /// Target entity name.
    pub target: String,
    /// Field on the owning entity holding the target identity.
    pub foreign_key: String,
}

impl RelationDef {
    /// Create a many-to-one relation.
    pub fn many_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            foreign_key: foreign_key.into(),
        }
    }
}
