use ormrepo_proto::{Row, Value};

use crate::catalog::{EntityDef, FieldDef, IdGeneration, ScalarType};
use crate::entity::{required, Audit, Entity};
use crate::error::{Error, Result};

/// An entity whose identity is assigned by the caller.
///
/// Having an identity does not make it persisted, so newness is decided by
/// the creation stamp instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub audit: Audit,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audit: Audit::default(),
        }
    }
}

impl Entity for Item {
    const NAME: &'static str = "Item";

    fn definition() -> EntityDef {
        EntityDef::new("Item", "item")
            .with_identity(
                FieldDef::new("id", ScalarType::String).with_column("item_id"),
                IdGeneration::Assigned,
            )
            .audited()
    }

    fn id(&self) -> Value {
        Value::String(self.id.clone())
    }

    fn is_new(&self) -> bool {
        self.audit.created_date.is_none()
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new().with("id", self.id.clone());
        self.audit.write(&mut row);
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        let id = required(row, Self::NAME, "id")?;
        Ok(Self {
            id: id
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::projection(format!("Item.id is {}", id.type_name())))?,
            audit: Audit::from_row(row),
        })
    }
}
