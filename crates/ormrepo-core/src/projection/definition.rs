//! Projection definitions and the registry that holds them.

use std::collections::HashMap;

use super::template::Template;
use super::view::View;
use crate::error::{Error, Result};

/// How a projection treats absent source fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionKind {
    /// Narrow view: absent fields read as null.
    Interface,
    /// Value object: every field must be present in the source.
    Dto,
}

/// One field of a projection.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionField {
    /// Copies the value at `source` (a dotted path).
    Property { name: String, source: String },
    /// Renders a template over the source row.
    Computed { name: String, template: Template },
    /// Embeds another projection of a related entity.
    Nested {
        name: String,
        relation: String,
        projection: String,
    },
}

impl ProjectionField {
    /// Output name of the field.
    pub fn name(&self) -> &str {
        match self {
            ProjectionField::Property { name, .. }
            | ProjectionField::Computed { name, .. }
            | ProjectionField::Nested { name, .. } => name,
        }
    }
}

/// A named read shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionDef {
    pub name: String,
    pub kind: ProjectionKind,
    pub fields: Vec<ProjectionField>,
}

impl ProjectionDef {
    /// Start an interface (narrow view) projection.
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProjectionKind::Interface,
            fields: Vec::new(),
        }
    }

    /// Start a value-object projection.
    pub fn dto(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProjectionKind::Dto,
            fields: Vec::new(),
        }
    }

    /// Copy a property of the same name.
    pub fn property(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.property_from(name.clone(), name)
    }

    /// Copy the property at `source` into `name`.
    pub fn property_from(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.fields.push(ProjectionField::Property {
            name: name.into(),
            source: source.into(),
        });
        self
    }

    /// Add a computed field rendered from a template.
    pub fn computed(mut self, name: impl Into<String>, template: &str) -> Self {
        self.fields.push(ProjectionField::Computed {
            name: name.into(),
            template: Template::parse(template),
        });
        self
    }

    /// Embed another projection of the related entity.
    pub fn nested(
        mut self,
        name: impl Into<String>,
        relation: impl Into<String>,
        projection: impl Into<String>,
    ) -> Self {
        self.fields.push(ProjectionField::Nested {
            name: name.into(),
            relation: relation.into(),
            projection: projection.into(),
        });
        self
    }

    /// Whether any field is computed.
    pub fn is_open(&self) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f, ProjectionField::Computed { .. }))
    }

    /// Root columns to fetch when the projection only reads root scalars.
    pub fn narrow_columns(&self) -> Option<Vec<String>> {
        self.fields
            .iter()
            .map(|f| match f {
                ProjectionField::Property { source, .. } if !source.contains('.') => {
                    Some(source.clone())
                }
                _ => None,
            })
            .collect()
    }
}

/// A statically typed projection.
///
/// The definition drives materialization; `from_view` turns the materialized
/// view into the caller's type.
pub trait Projection: Sized {
    /// Registry name.
    const NAME: &'static str;

    /// Field layout.
    fn definition() -> ProjectionDef;

    /// Build the value from a materialized view.
    fn from_view(view: &View) -> Result<Self>;
}

/// Projection definitions by name.
#[derive(Debug, Default, Clone)]
pub struct ProjectionRegistry {
    defs: HashMap<String, ProjectionDef>,
}

impl ProjectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition.
    pub fn register(&mut self, def: ProjectionDef) {
        self.defs.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&ProjectionDef> {
        self.defs.get(name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Check that `name` and everything it nests is registered and that no
    /// projection nests itself, directly or transitively.
    pub fn check_acyclic(&self, name: &str) -> Result<()> {
        let mut path = Vec::new();
        self.visit(name, &mut path)
    }

    fn visit<'a>(&'a self, name: &'a str, path: &mut Vec<&'a str>) -> Result<()> {
        if let Some(start) = path.iter().position(|p| *p == name) {
            let mut cycle: Vec<&str> = path[start..].to_vec();
            cycle.push(name);
            return Err(Error::projection(format!(
                "projection cycle: {}",
                cycle.join(" -> ")
            )));
        }
        let def = self
            .get(name)
            .ok_or_else(|| Error::projection(format!("unknown projection '{}'", name)))?;

        path.push(name);
        for field in &def.fields {
            if let ProjectionField::Nested { projection, .. } = field {
                self.visit(projection, path)?;
            }
        }
        path.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_columns() {
        let closed = ProjectionDef::interface("UsernameOnly").property("username");
        assert_eq!(closed.narrow_columns(), Some(vec!["username".to_string()]));

        let nested = ProjectionDef::interface("Nested")
            .property("username")
            .nested("team", "team", "TeamInfo");
        assert_eq!(nested.narrow_columns(), None);

        let open = ProjectionDef::interface("Open").computed("username", "{username} {age}");
        assert!(open.is_open());
        assert_eq!(open.narrow_columns(), None);
    }

    #[test]
    fn test_acyclic_nesting() {
        let mut registry = ProjectionRegistry::new();
        registry.register(ProjectionDef::interface("TeamInfo").property("name"));
        registry.register(
            ProjectionDef::interface("MemberView")
                .property("username")
                .nested("team", "team", "TeamInfo"),
        );
        assert!(registry.check_acyclic("MemberView").is_ok());
    }

    #[test]
    fn test_transitive_cycle_detected() {
        let mut registry = ProjectionRegistry::new();
        registry.register(ProjectionDef::interface("A").nested("b", "team", "B"));
        registry.register(ProjectionDef::interface("B").nested("a", "members", "A"));
        let err = registry.check_acyclic("A").unwrap_err();
        assert!(matches!(err, Error::Projection(ref m) if m.contains("A -> B -> A")));
    }

    #[test]
    fn test_self_nesting_detected() {
        let mut registry = ProjectionRegistry::new();
        registry.register(ProjectionDef::interface("Self").nested("me", "team", "Self"));
        assert!(registry.check_acyclic("Self").is_err());
    }

    #[test]
    fn test_unknown_nested_projection() {
        let mut registry = ProjectionRegistry::new();
        registry.register(ProjectionDef::interface("A").nested("b", "team", "Missing"));
        assert!(matches!(
            registry.check_acyclic("A"),
            Err(Error::Projection(_))
        ));
    }
}
