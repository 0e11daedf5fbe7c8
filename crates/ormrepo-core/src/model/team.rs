use ormrepo_proto::{Row, Value};

use crate::catalog::{EntityDef, FieldDef, IdGeneration, ScalarType};
use crate::entity::{required, Entity};
use crate::error::{Error, Result};

/// A team members can belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: Option<i64>,
    pub name: String,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn with_id(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }
}

impl Entity for Team {
    const NAME: &'static str = "Team";

    fn definition() -> EntityDef {
        EntityDef::new("Team", "team")
            .with_identity(
                FieldDef::new("id", ScalarType::Int64).with_column("team_id"),
                IdGeneration::Sequence,
            )
            .with_field(FieldDef::new("name", ScalarType::String))
    }

    fn id(&self) -> Value {
        self.id.into()
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("name", self.name.clone())
    }

    fn from_row(row: &Row) -> Result<Self> {
        let name = required(row, Self::NAME, "name")?;
        Ok(Self {
            id: row.get("id").and_then(Value::as_i64),
            name: name
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::projection(format!("Team.name is {}", name.type_name())))?,
        })
    }
}
