//! The catalog: entity mappings, projections and declared query methods.

use super::{EntityDef, FieldDef, RelationDef};
use crate::error::{Error, Result};
use crate::projection::{Projection, ProjectionDef, ProjectionRegistry};
use crate::query::QueryTable;

/// A property path resolved against an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// Canonical dotted path (`team.name`).
    pub path: String,
    /// Relation hops leading to the field, in order.
    pub relations: Vec<String>,
    /// The field the path ends at.
    pub field: FieldDef,
}

impl ResolvedPath {
    /// Whether the path crosses a relation.
    pub fn is_nested(&self) -> bool {
        !self.relations.is_empty()
    }
}

/// Immutable mapping metadata shared by every session.
///
/// Built once at startup and then read concurrently behind an `Arc`.
#[derive(Debug, Default)]
pub struct Catalog {
    entities: Vec<EntityDef>,
    projections: ProjectionRegistry,
    queries: Vec<QueryTable>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity mapping.
    pub fn with_entity(mut self, def: EntityDef) -> Self {
        self.entities.retain(|e| e.name != def.name);
        self.entities.push(def);
        self
    }

    /// Register a projection definition.
    pub fn with_projection(mut self, def: ProjectionDef) -> Self {
        self.projections.register(def);
        self
    }

    /// Register a typed projection.
    pub fn with_projection_type<P: Projection>(self) -> Self {
        self.with_projection(P::definition())
    }

    /// Register the query methods declared for an entity.
    pub fn with_queries(mut self, table: QueryTable) -> Self {
        self.queries.retain(|t| t.entity() != table.entity());
        self.queries.push(table);
        self
    }

    /// Get an entity by name.
    pub fn entity(&self, name: &str) -> Result<&EntityDef> {
        self.find_entity(name)
            .ok_or_else(|| Error::resolution(format!("unknown entity '{}'", name)))
    }

    /// Get an entity by name, if mapped.
    pub fn find_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Get an entity by table name, case-insensitively.
    pub fn entity_by_table(&self, table: &str) -> Option<&EntityDef> {
        self.entities
            .iter()
            .find(|e| e.table.eq_ignore_ascii_case(table))
    }

    /// All mapped entities.
    pub fn entities(&self) -> &[EntityDef] {
        &self.entities
    }

    /// The projection registry.
    pub fn projections(&self) -> &ProjectionRegistry {
        &self.projections
    }

    /// Get a projection by name.
    pub fn projection(&self, name: &str) -> Result<&ProjectionDef> {
        self.projections
            .get(name)
            .ok_or_else(|| Error::projection(format!("unknown projection '{}'", name)))
    }

    /// Query methods declared for an entity.
    pub fn queries(&self, entity: &str) -> Option<&QueryTable> {
        self.queries.iter().find(|t| t.entity() == entity)
    }

    /// Look up a named query by its full name (`Member.findUser`) or by its
    /// short name on the given entity.
    pub fn named_query(&self, entity: &str, name: &str) -> Option<&str> {
        if let Some((owner, short)) = name.split_once('.') {
            if let Some(q) = self.find_entity(owner).and_then(|e| e.named_query(short)) {
                return Some(&q.query);
            }
        }
        self.entities
            .iter()
            .flat_map(|e| e.named_queries.iter())
            .find(|q| q.name == name)
            .or_else(|| self.find_entity(entity).and_then(|e| e.named_query(name)))
            .map(|q| q.query.as_str())
    }

    /// Resolve a dotted property path (`team.name`) against `root`.
    pub fn resolve_path(&self, root: &str, path: &str) -> Result<ResolvedPath> {
        let mut entity = self.entity(root)?;
        let mut relations = Vec::new();
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                let field = entity.field(segment).ok_or_else(|| {
                    Error::resolution(format!(
                        "no property '{}' found for type '{}'",
                        segment, entity.name
                    ))
                })?;
                return Ok(ResolvedPath {
                    path: path.to_string(),
                    relations,
                    field: field.clone(),
                });
            }
            let relation = entity.relation(segment).ok_or_else(|| {
                Error::resolution(format!(
                    "no relation '{}' found for type '{}'",
                    segment, entity.name
                ))
            })?;
            relations.push(relation.name.clone());
            entity = self.entity(&relation.target)?;
        }

        Err(Error::resolution(format!("empty property path on '{}'", root)))
    }

    /// Resolve a chain of relations (`team`) against `root`.
    pub fn resolve_relation_path(&self, root: &str, path: &str) -> Result<Vec<&RelationDef>> {
        let mut entity = self.entity(root)?;
        let mut hops = Vec::new();
        for segment in path.split('.') {
            let relation = entity.relation(segment).ok_or_else(|| {
                Error::resolution(format!(
                    "no relation '{}' found for type '{}'",
                    segment, entity.name
                ))
            })?;
            entity = self.entity(&relation.target)?;
            hops.push(relation);
        }
        Ok(hops)
    }

    /// Resolve a capitalized property token from a method name
    /// (`TeamName`) to a dotted path (`team.name`).
    ///
    /// A direct field match wins; otherwise the longest prefix naming a
    /// relation is split off and the rest is resolved on the target.
    pub fn resolve_property_token(&self, root: &str, token: &str) -> Option<String> {
        let entity = self.find_entity(root)?;
        let direct = uncapitalize(token);
        if entity.field(&direct).is_some() {
            return Some(direct);
        }

        let boundaries: Vec<usize> = token
            .char_indices()
            .skip(1)
            .filter(|(_, c)| c.is_ascii_uppercase())
            .map(|(i, _)| i)
            .collect();
        for &split in boundaries.iter().rev() {
            let (head, tail) = token.split_at(split);
            let Some(relation) = entity.relation(&uncapitalize(head)) else {
                continue;
            };
            if let Some(rest) = self.resolve_property_token(&relation.target, tail) {
                return Some(format!("{}.{}", relation.name, rest));
            }
        }
        None
    }
}

/// Lower-case the first character (`Username` -> `username`).
pub(crate) fn uncapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IdGeneration, ScalarType};

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                EntityDef::new("Team", "team")
                    .with_identity(
                        FieldDef::new("id", ScalarType::Int64).with_column("team_id"),
                        IdGeneration::Sequence,
                    )
                    .with_field(FieldDef::new("name", ScalarType::String)),
            )
            .with_entity(
                EntityDef::new("Member", "member")
                    .with_identity(
                        FieldDef::new("id", ScalarType::Int64).with_column("member_id"),
                        IdGeneration::Sequence,
                    )
                    .with_field(FieldDef::new("username", ScalarType::String))
                    .with_field(FieldDef::new("age", ScalarType::Int32))
                    .with_relation(RelationDef::many_to_one("team", "Team", "team_id"))
                    .with_named_query(
                        "findUser",
                        "select m from Member m where m.username = :username",
                    ),
            )
    }

    #[test]
    fn test_resolve_nested_path() {
        let catalog = catalog();
        let resolved = catalog.resolve_path("Member", "team.name").unwrap();
        assert_eq!(resolved.relations, vec!["team".to_string()]);
        assert_eq!(resolved.field.scalar, ScalarType::String);
        assert!(resolved.is_nested());
    }

    #[test]
    fn test_resolve_unknown_property() {
        let err = catalog().resolve_path("Member", "nickname").unwrap_err();
        assert!(matches!(err, Error::Resolution(ref m) if m.contains("nickname")));
    }

    #[test]
    fn test_resolve_property_token() {
        let catalog = catalog();
        assert_eq!(
            catalog.resolve_property_token("Member", "Username").as_deref(),
            Some("username")
        );
        assert_eq!(
            catalog.resolve_property_token("Member", "TeamName").as_deref(),
            Some("team.name")
        );
        assert_eq!(catalog.resolve_property_token("Member", "Nickname"), None);
    }

    #[test]
    fn test_named_query_lookup() {
        let catalog = catalog();
        assert!(catalog.named_query("Member", "Member.findUser").is_some());
        assert!(catalog.named_query("Member", "findUser").is_some());
        assert!(catalog.named_query("Member", "Member.missing").is_none());
    }

    #[test]
    fn test_entity_by_table() {
        assert_eq!(catalog().entity_by_table("MEMBER").unwrap().name, "Member");
    }
}
