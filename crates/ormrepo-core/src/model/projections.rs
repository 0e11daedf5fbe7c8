//! Read shapes over members.

use serde::Serialize;

use super::member::Member;
use crate::error::Result;
use crate::projection::{Projection, ProjectionDef, View};

/// Value object built by `select new MemberDto(m.id, m.username, m.age)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDto {
    pub id: Option<i64>,
    pub username: String,
    pub age: i32,
}

impl From<&Member> for MemberDto {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            username: member.username.clone(),
            age: member.age,
        }
    }
}

impl Projection for MemberDto {
    const NAME: &'static str = "MemberDto";

    fn definition() -> ProjectionDef {
        ProjectionDef::dto(Self::NAME)
            .property("id")
            .property("username")
            .property("age")
    }

    fn from_view(view: &View) -> Result<Self> {
        Ok(Self {
            id: view.opt_i64("id")?,
            username: view.string("username")?,
            age: view.i32("age")?,
        })
    }
}

/// Open view: `username` is computed from the member and its team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameOnly {
    pub username: String,
}

impl Projection for UsernameOnly {
    const NAME: &'static str = "UsernameOnly";

    fn definition() -> ProjectionDef {
        ProjectionDef::interface(Self::NAME).computed("username", "{username} {age} {team.name}")
    }

    fn from_view(view: &View) -> Result<Self> {
        Ok(Self {
            username: view.string("username")?,
        })
    }
}

/// Closed value object reading only the username column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameOnlyDto {
    pub username: String,
}

impl Projection for UsernameOnlyDto {
    const NAME: &'static str = "UsernameOnlyDto";

    fn definition() -> ProjectionDef {
        ProjectionDef::dto(Self::NAME).property("username")
    }

    fn from_view(view: &View) -> Result<Self> {
        Ok(Self {
            username: view.string("username")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamInfo {
    pub name: String,
}

impl Projection for TeamInfo {
    const NAME: &'static str = "TeamInfo";

    fn definition() -> ProjectionDef {
        ProjectionDef::interface(Self::NAME).property("name")
    }

    fn from_view(view: &View) -> Result<Self> {
        Ok(Self {
            name: view.opt_string("name")?.unwrap_or_default(),
        })
    }
}

/// Member username with a nested view of its team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedClosedProjection {
    pub username: String,
    pub team: Option<TeamInfo>,
}

impl Projection for NestedClosedProjection {
    const NAME: &'static str = "NestedClosedProjection";

    fn definition() -> ProjectionDef {
        ProjectionDef::interface(Self::NAME)
            .property("username")
            .nested("team", "team", TeamInfo::NAME)
    }

    fn from_view(view: &View) -> Result<Self> {
        Ok(Self {
            username: view.string("username")?,
            team: view.nested("team")?.map(TeamInfo::from_view).transpose()?,
        })
    }
}

/// Row shape of the native member/team join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProjection {
    pub id: i64,
    pub username: String,
    pub team_name: Option<String>,
}

impl Projection for MemberProjection {
    const NAME: &'static str = "MemberProjection";

    fn definition() -> ProjectionDef {
        ProjectionDef::interface(Self::NAME)
            .property("id")
            .property("username")
            .property("teamName")
    }

    fn from_view(view: &View) -> Result<Self> {
        Ok(Self {
            id: view.i64("id")?,
            username: view.string("username")?,
            team_name: view.opt_string("teamName")?,
        })
    }
}
