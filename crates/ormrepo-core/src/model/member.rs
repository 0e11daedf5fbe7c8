use ormrepo_proto::{Row, Value};

use super::team::Team;
use crate::catalog::{EntityDef, FieldDef, IdGeneration, RelationDef, ScalarType};
use crate::entity::{required, Audit, Entity, Reference};
use crate::error::{Error, Result};

/// A member, optionally belonging to a team.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: Option<i64>,
    pub username: String,
    pub age: i32,
    pub team: Reference<Team>,
    pub audit: Audit,
}

impl Member {
    pub fn new(username: impl Into<String>, age: i32) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team: Reference::none(),
            audit: Audit::default(),
        }
    }

    pub fn with_team(mut self, team: &Team) -> Self {
        self.change_team(team);
        self
    }

    pub fn change_team(&mut self, team: &Team) {
        self.team = Reference::to(team);
    }
}

impl Entity for Member {
    const NAME: &'static str = "Member";

    fn definition() -> EntityDef {
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
            )
            .audited()
    }

    fn id(&self) -> Value {
        self.id.into()
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new()
            .with("id", self.id)
            .with("username", self.username.clone())
            .with("age", self.age);
        self.team.write(&mut row, "team", "team_id");
        self.audit.write(&mut row);
        row
    }

    fn from_row(row: &Row) -> Result<Self> {
        let username = required(row, Self::NAME, "username")?;
        let age = required(row, Self::NAME, "age")?;
        Ok(Self {
            id: row.get("id").and_then(Value::as_i64),
            username: username.as_str().map(str::to_string).ok_or_else(|| {
                Error::projection(format!("Member.username is {}", username.type_name()))
            })?,
            age: age
                .as_i32()
                .ok_or_else(|| Error::projection(format!("Member.age is {}", age.type_name())))?,
            team: Reference::from_row(row, "team", "team_id")?,
            audit: Audit::from_row(row),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_round_trip_keeps_team_reference() {
        let member = Member {
            id: Some(3),
            ..Member::new("memberA", 10).with_team(&Team::with_id(7, "teamA"))
        };
        let row = member.to_row();
        assert_eq!(row.get("team_id"), Some(&Value::Int64(7)));
        let back = Member::from_row(&row).unwrap();
        assert_eq!(back, member);
        assert_eq!(back.team.get().map(|t| t.name.as_str()), Some("teamA"));
    }

    #[test]
    fn test_missing_username_is_projection_error() {
        let row = Row::new().with("id", 1i64).with("age", 10);
        assert!(matches!(Member::from_row(&row), Err(Error::Projection(_))));
    }
}
