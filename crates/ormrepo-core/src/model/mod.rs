//! Sample domain: members belonging to teams, and items with assigned ids.

mod item;
mod member;
mod member_repository;
mod projections;
mod team;

pub use item::Item;
pub use member::Member;
pub use member_repository::{catalog, member_queries, MemberRepository, MemberRepositoryCustom};
pub use projections::{
    MemberDto, MemberProjection, NestedClosedProjection, TeamInfo, UsernameOnly, UsernameOnlyDto,
};
pub use team::Team;
