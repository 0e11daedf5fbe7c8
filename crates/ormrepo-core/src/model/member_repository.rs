//! The member repository: declared query methods and a typed facade.

use super::item::Item;
use super::member::Member;
use super::projections::{
    MemberDto, MemberProjection, NestedClosedProjection, TeamInfo, UsernameOnly, UsernameOnlyDto,
};
use super::team::Team;
use crate::args;
use crate::catalog::Catalog;
use crate::entity::Entity;
use crate::error::Result;
use crate::paging::{Page, PageRequest, Slice};
use crate::projection::Projection;
use crate::query::{Args, QueryMethod, QueryTable};
use crate::repository::Repository;
use crate::session::Session;

/// Query methods of the member repository.
pub fn member_queries() -> QueryTable {
    QueryTable::for_entity::<Member>()
        .method(QueryMethod::derived("findByUsername"))
        .method(QueryMethod::named("findUser").params(["username"]))
        .method(
            QueryMethod::query(
                "findByUsernameAndAge",
                "select m from Member m where m.username = :username and m.age = :age",
            )
            .params(["username", "age"]),
        )
        .method(
            QueryMethod::query(
                "findByUsernames",
                "select m from Member m where m.username in :names",
            )
            .params(["names"]),
        )
        .method(
            QueryMethod::query("findUsernameList", "select m.username from Member m"),
        )
        .method(
            QueryMethod::query(
                "findMemberDto",
                "select new study.datajpa.dto.MemberDto(m.id, m.username, m.age) from Member m where username = :username",
            )
            .params(["username"]),
        )
        .method(QueryMethod::derived("findMemberByUsername").single())
        .method(QueryMethod::derived("findByAge").paged())
        .method(
            QueryMethod::query(
                "findByAge2",
                "select m from Member m left join m.team t where age = :age",
            )
            .params(["age"])
            .paged()
            .count_query("select count(m) from Member m where age = :age"),
        )
        .method(QueryMethod::derived("findSliceByAge").slice())
        .method(QueryMethod::derived("findTop3ByOrderByAgeDesc"))
        .method(QueryMethod::derived("countByAge"))
        .method(QueryMethod::derived("existsByUsername"))
        .method(QueryMethod::derived("deleteByUsername"))
        .method(
            QueryMethod::query("bulkUpdate", "update Member m set m.age = m.age + 1 where m.age >= :age")
                .params(["age"])
                .modifying(true),
        )
        .method(
            QueryMethod::query(
                "bulkUpdateKeepingContext",
                "update Member m set m.age = m.age + 1 where m.age >= :age",
            )
            .params(["age"])
            .modifying(false),
        )
        .method(QueryMethod::derived("findAll").fetch(["team"]).sorted())
        .method(QueryMethod::derived("findFetchByUsername").fetch(["team"]))
        .method(QueryMethod::derived("findReadOnlyByUsername").read_only())
        .method(QueryMethod::derived("findProjectionsByUsername").returning::<UsernameOnly>())
        .method(
            QueryMethod::derived("findUsernameDtoByUsername").returning::<UsernameOnlyDto>(),
        )
        .method(QueryMethod::derived("findUsernameByUsername").dynamic_projection())
        .method(
            QueryMethod::derived("findNestedProjectionsByUsername")
                .returning::<NestedClosedProjection>(),
        )
        .method(
            QueryMethod::native("findByNativeQuery", "select * from member where username = ?")
                .params(["username"])
                .single(),
        )
        .method(
            QueryMethod::native(
                "findByNativeProjection",
                "select m.member_id as id, m.username, t.name as teamName \
                 from member m left outer join team t on m.team_id = t.team_id \
                 where m.username = ?",
            )
            .params(["username"])
            .paged()
            .returning::<MemberProjection>(),
        )
}

/// Catalog of the sample domain.
pub fn catalog() -> Catalog {
    Catalog::new()
        .with_entity(Team::definition())
        .with_entity(Member::definition())
        .with_entity(Item::definition())
        .with_projection_type::<MemberDto>()
        .with_projection_type::<UsernameOnly>()
        .with_projection_type::<UsernameOnlyDto>()
        .with_projection_type::<TeamInfo>()
        .with_projection_type::<NestedClosedProjection>()
        .with_projection_type::<MemberProjection>()
        .with_queries(member_queries())
}

/// Hand-written member operations beyond the declared ones.
pub trait MemberRepositoryCustom {
    fn find_member_custom(&mut self) -> Result<Vec<Member>>;
}

/// Typed access to the member query methods.
pub struct MemberRepository<'s> {
    repository: Repository<'s, Member>,
}

impl<'s> MemberRepository<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        Self {
            repository: Repository::new(session),
        }
    }

    /// The generic CRUD operations.
    pub fn crud(&mut self) -> &mut Repository<'s, Member> {
        &mut self.repository
    }

    pub fn save(&mut self, member: &Member) -> Result<Member> {
        self.repository.save(member)
    }

    pub fn find_by_id(&mut self, id: i64) -> Result<Option<Member>> {
        self.repository.find_by_id(id)
    }

    /// Every member with its team loaded.
    pub fn find_all(&mut self) -> Result<Vec<Member>> {
        self.repository.find_all()
    }

    pub fn find_all_paged(&mut self, request: &PageRequest) -> Result<Page<Member>> {
        self.repository.find_all_paged(request)
    }

    pub fn find_by_username(&mut self, username: &str) -> Result<Vec<Member>> {
        self.repository.find_many("findByUsername", args![username])
    }

    pub fn find_user(&mut self, username: &str) -> Result<Vec<Member>> {
        self.repository.find_many("findUser", args![username])
    }

    pub fn find_by_username_and_age(&mut self, username: &str, age: i32) -> Result<Vec<Member>> {
        self.repository
            .find_many("findByUsernameAndAge", args![username, age])
    }

    pub fn find_by_usernames(&mut self, names: &[&str]) -> Result<Vec<Member>> {
        self.repository
            .find_many("findByUsernames", args![names.to_vec()])
    }

    pub fn find_username_list(&mut self) -> Result<Vec<String>> {
        Ok(self
            .repository
            .find_values("findUsernameList", Args::new())?
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    pub fn find_member_dto(&mut self, username: &str) -> Result<Vec<MemberDto>> {
        self.repository.project_many("findMemberDto", args![username])
    }

    /// Absent when nothing matches; more than one match is an error.
    pub fn find_member_by_username(&mut self, username: &str) -> Result<Option<Member>> {
        self.repository.find_one("findMemberByUsername", args![username])
    }

    pub fn find_by_age(&mut self, age: i32, request: &PageRequest) -> Result<Page<Member>> {
        self.repository.find_page("findByAge", args![age], request)
    }

    /// Paged with a separate count query.
    pub fn find_by_age2(&mut self, age: i32, request: &PageRequest) -> Result<Page<Member>> {
        self.repository.find_page("findByAge2", args![age], request)
    }

    pub fn find_slice_by_age(&mut self, age: i32, request: &PageRequest) -> Result<Slice<Member>> {
        self.repository.find_slice("findSliceByAge", args![age], request)
    }

    pub fn find_top3_by_age_desc(&mut self) -> Result<Vec<Member>> {
        self.repository.find_many("findTop3ByOrderByAgeDesc", Args::new())
    }

    pub fn count_by_age(&mut self, age: i32) -> Result<u64> {
        self.repository.count_by("countByAge", args![age])
    }

    pub fn exists_by_username(&mut self, username: &str) -> Result<bool> {
        self.repository.exists_by("existsByUsername", args![username])
    }

    pub fn delete_by_username(&mut self, username: &str) -> Result<u64> {
        self.repository.delete_by("deleteByUsername", args![username])
    }

    /// Increment the age of every member at least `age` old. Clears the
    /// session's tracked state.
    pub fn bulk_update(&mut self, age: i32) -> Result<u64> {
        self.repository.execute("bulkUpdate", args![age])
    }

    pub fn find_fetch_by_username(&mut self, username: &str) -> Result<Vec<Member>> {
        self.repository.find_many("findFetchByUsername", args![username])
    }

    pub fn find_read_only_by_username(&mut self, username: &str) -> Result<Vec<Member>> {
        self.repository
            .find_many("findReadOnlyByUsername", args![username])
    }

    pub fn find_projections_by_username(&mut self, username: &str) -> Result<Vec<UsernameOnly>> {
        self.repository
            .project_many("findProjectionsByUsername", args![username])
    }

    pub fn find_username_dto_by_username(&mut self, username: &str) -> Result<Vec<UsernameOnlyDto>> {
        self.repository
            .project_many("findUsernameDtoByUsername", args![username])
    }

    /// Projection type chosen per call.
    pub fn find_username_by_username<P: Projection>(&mut self, username: &str) -> Result<Vec<P>> {
        self.repository
            .project_many::<P>("findUsernameByUsername", args![username])
    }

    pub fn find_nested_projections_by_username(
        &mut self,
        username: &str,
    ) -> Result<Vec<NestedClosedProjection>> {
        self.repository
            .project_many("findNestedProjectionsByUsername", args![username])
    }

    pub fn find_by_native_query(&mut self, username: &str) -> Result<Option<Member>> {
        self.repository.find_one("findByNativeQuery", args![username])
    }

    pub fn find_by_native_projection(
        &mut self,
        username: &str,
        request: &PageRequest,
    ) -> Result<Page<MemberProjection>> {
        self.repository
            .project_page("findByNativeProjection", args![username], request)
    }
}

impl MemberRepositoryCustom for MemberRepository<'_> {
    fn find_member_custom(&mut self) -> Result<Vec<Member>> {
        let session = self.repository.session();
        let descriptor = session.create_query("select m from Member m", &[])?;
        session.list(&descriptor, &Args::new())
    }
}
