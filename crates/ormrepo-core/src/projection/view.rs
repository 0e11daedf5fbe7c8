//! Materialized projection views.

use ormrepo_proto::{Row, Value};

use super::definition::{ProjectionDef, ProjectionField, ProjectionKind, ProjectionRegistry};
use crate::error::{Error, Result};

/// A value inside a view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewValue {
    Scalar(Value),
    /// A nested projection; `None` when the relation is null.
    Nested(Option<View>),
}

/// The materialized form of a projection: named values in definition order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View {
    values: Vec<(String, ViewValue)>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    pub fn push(&mut self, name: impl Into<String>, value: ViewValue) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ViewValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    /// Scalar value of a field.
    pub fn value(&self, name: &str) -> Result<&Value> {
        match self.get(name) {
            Some(ViewValue::Scalar(v)) => Ok(v),
            Some(ViewValue::Nested(_)) => Err(Error::projection(format!(
                "'{}' is a nested projection, not a value",
                name
            ))),
            None => Err(Error::projection(format!("view has no field '{}'", name))),
        }
    }

    /// Non-null string field.
    pub fn string(&self, name: &str) -> Result<String> {
        self.opt_string(name)?
            .ok_or_else(|| Error::projection(format!("'{}' is null", name)))
    }

    /// Nullable string field.
    pub fn opt_string(&self, name: &str) -> Result<Option<String>> {
        match self.value(name)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            other => Err(mismatch(name, "string", other)),
        }
    }

    /// Non-null 32-bit integer field.
    pub fn i32(&self, name: &str) -> Result<i32> {
        let value = self.value(name)?;
        value.as_i32().ok_or_else(|| mismatch(name, "int32", value))
    }

    /// Non-null 64-bit integer field.
    pub fn i64(&self, name: &str) -> Result<i64> {
        self.opt_i64(name)?
            .ok_or_else(|| Error::projection(format!("'{}' is null", name)))
    }

    /// Nullable 64-bit integer field.
    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>> {
        match self.value(name)? {
            Value::Null => Ok(None),
            value => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| mismatch(name, "int64", value)),
        }
    }

    /// Nested view; `None` when the relation is null.
    pub fn nested(&self, name: &str) -> Result<Option<&View>> {
        match self.get(name) {
            Some(ViewValue::Nested(view)) => Ok(view.as_ref()),
            Some(ViewValue::Scalar(_)) => Err(Error::projection(format!(
                "'{}' is a value, not a nested projection",
                name
            ))),
            None => Err(Error::projection(format!("view has no field '{}'", name))),
        }
    }
}

fn mismatch(name: &str, expected: &str, found: &Value) -> Error {
    Error::projection(format!(
        "'{}' expected {}, found {}",
        name,
        expected,
        found.type_name()
    ))
}

/// Turns fetched rows into views of a projection.
pub struct ProjectionMaterializer<'a> {
    registry: &'a ProjectionRegistry,
}

impl<'a> ProjectionMaterializer<'a> {
    pub fn new(registry: &'a ProjectionRegistry) -> Self {
        Self { registry }
    }

    /// Materialize the named projection over a row.
    pub fn materialize_named(&self, name: &str, row: &Row) -> Result<View> {
        let def = self
            .registry
            .get(name)
            .ok_or_else(|| Error::projection(format!("unknown projection '{}'", name)))?;
        self.materialize(def, row)
    }

    /// Materialize a projection over a row.
    ///
    /// A value object fails when a source field is absent from the row; a
    /// narrow view reads it as null. Nested projections recurse into loaded
    /// relations.
    pub fn materialize(&self, def: &ProjectionDef, row: &Row) -> Result<View> {
        let mut view = View::new();
        for field in &def.fields {
            match field {
                ProjectionField::Property { name, source } => {
                    let value = match (source_present(row, source), def.kind) {
                        (true, _) => row.lookup(source).cloned().unwrap_or(Value::Null),
                        (false, ProjectionKind::Interface) => Value::Null,
                        (false, ProjectionKind::Dto) => {
                            return Err(Error::projection(format!(
                                "source field '{}' required by '{}' is absent",
                                source, def.name
                            )))
                        }
                    };
                    view.push(name.clone(), ViewValue::Scalar(value));
                }
                ProjectionField::Computed { name, template } => {
                    view.push(
                        name.clone(),
                        ViewValue::Scalar(Value::String(template.render(row))),
                    );
                }
                ProjectionField::Nested {
                    name,
                    relation,
                    projection,
                } => {
                    let nested = match row.relation(relation) {
                        Some(Some(target)) => Some(self.materialize_named(projection, target)?),
                        Some(None) => None,
                        None if def.kind == ProjectionKind::Dto => {
                            return Err(Error::projection(format!(
                                "relation '{}' required by '{}' was not fetched",
                                relation, def.name
                            )))
                        }
                        None => None,
                    };
                    view.push(name.clone(), ViewValue::Nested(nested));
                }
            }
        }
        Ok(view)
    }
}

/// Whether the row carries the path: root fields must be present, and every
/// relation hop must have been loaded (a loaded null hop counts as present).
fn source_present(row: &Row, path: &str) -> bool {
    match path.split_once('.') {
        None => row.contains(path),
        Some((head, rest)) => match row.relation(head) {
            Some(Some(target)) => source_present(target, rest),
            Some(None) => true,
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProjectionRegistry {
        let mut registry = ProjectionRegistry::new();
        registry.register(ProjectionDef::interface("TeamInfo").property("name"));
        registry.register(
            ProjectionDef::interface("NestedClosedProjection")
                .property("username")
                .nested("team", "team", "TeamInfo"),
        );
        registry.register(
            ProjectionDef::dto("MemberDto")
                .property("id")
                .property("username")
                .property("age"),
        );
        registry.register(
            ProjectionDef::interface("MemberSummary")
                .property_from("teamName", "team.name")
                .computed("label", "{username}/{team.name}"),
        );
        registry
    }

    fn member_row(team: Option<&str>) -> Row {
        Row::new()
            .with("id", 1i64)
            .with("username", "m1")
            .with("age", 0)
            .with_relation("team", team.map(|n| Row::new().with("name", n)))
    }

    #[test]
    fn test_nested_projection() {
        let registry = registry();
        let materializer = ProjectionMaterializer::new(&registry);
        let view = materializer
            .materialize_named("NestedClosedProjection", &member_row(Some("teamA")))
            .unwrap();
        assert_eq!(view.string("username").unwrap(), "m1");
        let team = view.nested("team").unwrap().unwrap();
        assert_eq!(team.string("name").unwrap(), "teamA");

        let view = materializer
            .materialize_named("NestedClosedProjection", &member_row(None))
            .unwrap();
        assert!(view.nested("team").unwrap().is_none());
    }

    #[test]
    fn test_dto_requires_every_source_field() {
        let registry = registry();
        let materializer = ProjectionMaterializer::new(&registry);
        let row = Row::new().with("id", 1i64).with("username", "m1");
        let err = materializer.materialize_named("MemberDto", &row).unwrap_err();
        assert!(matches!(err, Error::Projection(ref m) if m.contains("age")));
    }

    #[test]
    fn test_interface_reads_absent_fields_as_null() {
        let registry = registry();
        let materializer = ProjectionMaterializer::new(&registry);
        let row = Row::new().with("username", "m1");
        let view = materializer.materialize_named("MemberSummary", &row).unwrap();
        assert_eq!(view.opt_string("teamName").unwrap(), None);
        assert_eq!(view.string("label").unwrap(), "m1/");
    }

    #[test]
    fn test_typed_accessors() {
        let registry = registry();
        let materializer = ProjectionMaterializer::new(&registry);
        let view = materializer
            .materialize_named("MemberDto", &member_row(None))
            .unwrap();
        assert_eq!(view.i64("id").unwrap(), 1);
        assert_eq!(view.i32("age").unwrap(), 0);
        assert!(view.i32("username").is_err());
        assert!(view.value("missing").is_err());
    }
}
