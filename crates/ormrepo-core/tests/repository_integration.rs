//! Integration tests for repositories over a sled store.
//!
//! Each test opens its own store in a temporary directory.

use std::sync::Arc;

use ormrepo_core::model::{
    self, Item, Member, MemberDto, MemberRepository, MemberRepositoryCustom,
    NestedClosedProjection, Team, TeamInfo, UsernameOnlyDto,
};
use ormrepo_core::{
    args, Error, Example, ExampleMatcher, PageRequest, RepositoryConfig, Session, SessionFactory,
    SharedAuditor, Sort, StorageConfig, StoreError, StringMatcher,
};

/// Test fixture owning the store directory.
struct TestContext {
    factory: SessionFactory,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(RepositoryConfig::default())
    }

    fn with_config(config: RepositoryConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let factory =
            SessionFactory::open(StorageConfig::new(dir.path()), config, model::catalog()).unwrap();
        Self { factory, _dir: dir }
    }

    fn session(&self) -> Session {
        self.factory.open_session()
    }
}

fn save_team(session: &mut Session, name: &str) -> Team {
    session.repository::<Team>().save(&Team::new(name)).unwrap()
}

fn save_members(session: &mut Session, members: &[(&str, i32)]) -> Vec<Member> {
    let mut repository = MemberRepository::new(session);
    members
        .iter()
        .map(|(username, age)| repository.save(&Member::new(*username, *age)).unwrap())
        .collect()
}

fn usernames(members: &[Member]) -> Vec<&str> {
    members.iter().map(|m| m.username.as_str()).collect()
}

// ============== CRUD ==============

#[test]
fn test_save_assigns_identity_and_finds_by_id() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let mut members = MemberRepository::new(&mut session);

    let saved = members.save(&Member::new("memberA", 10)).unwrap();
    let id = saved.id.unwrap();

    let found = members.find_by_id(id).unwrap().unwrap();
    assert_eq!(found.username, "memberA");
    assert_eq!(found.age, 10);
    assert!(members.find_by_id(id + 100).unwrap().is_none());
}

#[test]
fn test_find_by_id_after_clear_reads_store() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let id = save_members(&mut session, &[("memberA", 10)])[0].id.unwrap();

    session.clear();
    assert!(session.context().is_empty());

    let found = MemberRepository::new(&mut session)
        .find_by_id(id)
        .unwrap()
        .unwrap();
    assert_eq!(found.username, "memberA");
    assert_eq!(session.context().len(), 1);
}

#[test]
fn test_update_existing_entity() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let mut members = MemberRepository::new(&mut session);

    let mut member = members.save(&Member::new("memberA", 10)).unwrap();
    member.username = "memberB".to_string();
    members.save(&member).unwrap();

    assert_eq!(members.crud().count().unwrap(), 1);
    let found = members.find_by_id(member.id.unwrap()).unwrap().unwrap();
    assert_eq!(found.username, "memberB");
}

#[test]
fn test_crud_counts_and_deletes() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let saved = save_members(&mut session, &[("member1", 10), ("member2", 20)]);

    let mut repository = session.repository::<Member>();
    assert_eq!(repository.find_all().unwrap().len(), 2);
    assert_eq!(repository.count().unwrap(), 2);

    repository.delete(&saved[0]).unwrap();
    assert_eq!(repository.count().unwrap(), 1);
    assert!(!repository.exists_by_id(saved[0].id.unwrap()).unwrap());

    assert_eq!(repository.delete_all().unwrap(), 1);
    assert_eq!(repository.count().unwrap(), 0);
}

#[test]
fn test_get_by_id_missing_is_not_found() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let result = session.repository::<Member>().get_by_id(42i64);
    assert!(matches!(result, Err(Error::NotFound { .. })));
}

#[test]
fn test_find_all_sorted() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("b", 20), ("a", 10), ("c", 30)]);

    let found = session
        .repository::<Member>()
        .find_all_sorted(&Sort::by_desc("age"))
        .unwrap();
    assert_eq!(usernames(&found), vec!["c", "b", "a"]);
}

#[test]
fn test_find_all_paged() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)]);

    let request = PageRequest::of_sorted(1, 2, Sort::by("username")).unwrap();
    let page = MemberRepository::new(&mut session)
        .find_all_paged(&request)
        .unwrap();
    assert_eq!(usernames(page.content()), vec!["c", "d"]);
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_previous());
    assert!(page.has_next());
}

// ============== Derived and declared queries ==============

#[test]
fn test_find_by_username_and_age() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("AAA", 10), ("AAA", 20)]);

    let mut members = MemberRepository::new(&mut session);
    let found = members.find_by_username_and_age("AAA", 20).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].age, 20);
    assert_eq!(members.find_by_username("AAA").unwrap().len(), 2);
}

#[test]
fn test_named_query() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("AAA", 10), ("BBB", 20)]);

    let found = MemberRepository::new(&mut session).find_user("AAA").unwrap();
    assert_eq!(usernames(&found), vec!["AAA"]);
}

#[test]
fn test_find_username_list() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("AAA", 10), ("BBB", 20)]);

    let mut names = MemberRepository::new(&mut session)
        .find_username_list()
        .unwrap();
    names.sort();
    assert_eq!(names, vec!["AAA".to_string(), "BBB".to_string()]);
}

#[test]
fn test_find_member_dto() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let team = save_team(&mut session, "teamA");

    let mut members = MemberRepository::new(&mut session);
    let saved = members
        .save(&Member::new("AAA", 10).with_team(&team))
        .unwrap();

    let dtos = members.find_member_dto("AAA").unwrap();
    assert_eq!(
        dtos,
        vec![MemberDto {
            id: saved.id,
            username: "AAA".to_string(),
            age: 10,
        }]
    );
}

#[test]
fn test_find_by_usernames_collection_parameter() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("AAA", 10), ("BBB", 20), ("CCC", 30)]);

    let mut found = MemberRepository::new(&mut session)
        .find_by_usernames(&["AAA", "BBB"])
        .unwrap();
    found.sort_by(|a, b| a.username.cmp(&b.username));
    assert_eq!(usernames(&found), vec!["AAA", "BBB"]);
}

#[test]
fn test_return_types() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("AAA", 10), ("BBB", 20)]);

    let mut members = MemberRepository::new(&mut session);
    assert!(members.find_by_username("nobody").unwrap().is_empty());
    assert!(members.find_member_by_username("nobody").unwrap().is_none());
    assert_eq!(
        members
            .find_member_by_username("AAA")
            .unwrap()
            .map(|m| m.age),
        Some(10)
    );
}

#[test]
fn test_single_result_with_duplicates_is_cardinality_error() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("AAA", 10), ("AAA", 20)]);

    let result = MemberRepository::new(&mut session).find_member_by_username("AAA");
    assert!(matches!(result, Err(Error::Cardinality { found: 2, .. })));
}

#[test]
fn test_top3_by_age_desc() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("a", 10), ("b", 40), ("c", 20), ("d", 30)]);

    let found = MemberRepository::new(&mut session)
        .find_top3_by_age_desc()
        .unwrap();
    assert_eq!(found.iter().map(|m| m.age).collect::<Vec<_>>(), vec![40, 30, 20]);
}

#[test]
fn test_count_exists_and_delete_methods() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("AAA", 10), ("BBB", 10), ("CCC", 20)]);

    let mut members = MemberRepository::new(&mut session);
    assert_eq!(members.count_by_age(10).unwrap(), 2);
    assert!(members.exists_by_username("BBB").unwrap());

    assert_eq!(members.delete_by_username("BBB").unwrap(), 1);
    assert!(!members.exists_by_username("BBB").unwrap());
    assert_eq!(members.count_by_age(10).unwrap(), 1);
}

#[test]
fn test_undeclared_method_is_resolution_error() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let result = session
        .repository::<Member>()
        .find_many("findByNickname", args!["x"]);
    assert!(matches!(result, Err(Error::Resolution(_))));
}

#[test]
fn test_wrong_argument_count_is_binding_error() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let result = session
        .repository::<Member>()
        .find_many("findByUsernameAndAge", args!["AAA"]);
    assert!(matches!(result, Err(Error::Binding(_))));
}

#[test]
fn test_descriptor_resolved_once() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("AAA", 10)]);

    let mut members = MemberRepository::new(&mut session);
    members.find_by_username("AAA").unwrap();
    members.find_by_username("AAA").unwrap();

    let stats = ctx.factory.cache().stats();
    assert!(stats.hits() >= 1);
    assert!(!ctx.factory.cache().is_empty());
}

// ============== Paging ==============

#[test]
fn test_paging_with_count_query() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(
        &mut session,
        &[
            ("memberA", 10),
            ("memberB", 10),
            ("memberC", 10),
            ("memberD", 10),
            ("memberE", 10),
        ],
    );

    let request = PageRequest::of_sorted(0, 3, Sort::by_desc("username")).unwrap();
    let page = MemberRepository::new(&mut session)
        .find_by_age2(10, &request)
        .unwrap();

    assert_eq!(usernames(page.content()), vec!["memberE", "memberD", "memberC"]);
    assert_eq!(page.total_elements(), 5);
    assert_eq!(page.number(), 0);
    assert_eq!(page.total_pages(), 2);
    assert!(page.is_first());
    assert!(page.has_next());

    let dtos = page.map(|m| MemberDto::from(&m));
    assert_eq!(dtos.content()[0].username, "memberE");
}

#[test]
fn test_last_page() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(
        &mut session,
        &[("m1", 10), ("m2", 10), ("m3", 10), ("m4", 10), ("m5", 10)],
    );

    let request = PageRequest::of_sorted(1, 3, Sort::by("username")).unwrap();
    let page = MemberRepository::new(&mut session)
        .find_by_age(10, &request)
        .unwrap();
    assert_eq!(usernames(page.content()), vec!["m4", "m5"]);
    assert_eq!(page.total_elements(), 5);
    assert!(page.is_last());
    assert!(!page.has_next());
}

#[test]
fn test_slice_fetches_one_past_the_window() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(
        &mut session,
        &[("m1", 10), ("m2", 10), ("m3", 10), ("m4", 10)],
    );

    let mut members = MemberRepository::new(&mut session);
    let first = PageRequest::of_sorted(0, 3, Sort::by_desc("username")).unwrap();
    let slice = members.find_slice_by_age(10, &first).unwrap();
    assert_eq!(usernames(slice.content()), vec!["m4", "m3", "m2"]);
    assert!(slice.has_next());

    let slice = members.find_slice_by_age(10, &first.next()).unwrap();
    assert_eq!(usernames(slice.content()), vec!["m1"]);
    assert!(!slice.has_next());
    assert!(slice.is_last());
}

#[test]
fn test_page_size_over_maximum_is_invalid() {
    let ctx = TestContext::with_config(RepositoryConfig::default().with_max_page_size(5));
    let mut session = ctx.session();

    let request = PageRequest::of(0, 10).unwrap();
    let result = MemberRepository::new(&mut session).find_by_age(10, &request);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_sort_by_unknown_property_is_invalid() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("m1", 10)]);

    let request = PageRequest::of_sorted(0, 3, Sort::by("nickname")).unwrap();
    let result = MemberRepository::new(&mut session).find_by_age(10, &request);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_sort_from_request_parameters() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("a", 30), ("b", 10), ("c", 20)]);

    let sort = Sort::parse_params(["age,desc"]).unwrap();
    let page = session
        .repository::<Member>()
        .find_all_paged(&PageRequest::of_sorted(0, 10, sort).unwrap())
        .unwrap();
    assert_eq!(usernames(page.content()), vec!["a", "c", "b"]);
}

// ============== Bulk updates ==============

#[test]
fn test_bulk_update_counts_and_clears_context() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(
        &mut session,
        &[
            ("member1", 10),
            ("member2", 11),
            ("member3", 20),
            ("member4", 32),
            ("member5", 43),
        ],
    );

    let mut members = MemberRepository::new(&mut session);
    assert_eq!(members.bulk_update(20).unwrap(), 3);

    let member5 = members.find_member_by_username("member5").unwrap().unwrap();
    assert_eq!(member5.age, 44);
    let member2 = members.find_member_by_username("member2").unwrap().unwrap();
    assert_eq!(member2.age, 11);
}

#[test]
fn test_bulk_update_without_clear_keeps_stale_state() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("member5", 40)]);

    let affected = session
        .repository::<Member>()
        .execute("bulkUpdateKeepingContext", args![20])
        .unwrap();
    assert_eq!(affected, 1);

    let stale = MemberRepository::new(&mut session)
        .find_member_by_username("member5")
        .unwrap()
        .unwrap();
    assert_eq!(stale.age, 40);

    session.clear();
    let fresh = MemberRepository::new(&mut session)
        .find_member_by_username("member5")
        .unwrap()
        .unwrap();
    assert_eq!(fresh.age, 41);
}

#[test]
fn test_bulk_update_overflow_rolls_back() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("young", 30), ("old", i32::MAX)]);

    let result = MemberRepository::new(&mut session).bulk_update(20);
    assert!(matches!(
        result,
        Err(Error::Store(StoreError::Constraint(_)))
    ));

    session.clear();
    let members = session.repository::<Member>().find_all().unwrap();
    let mut ages: Vec<i32> = members.iter().map(|m| m.age).collect();
    ages.sort_unstable();
    assert_eq!(ages, vec![30, i32::MAX]);
}

#[test]
fn test_execute_on_select_method_is_rejected() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let result = session
        .repository::<Member>()
        .execute("findByUsername", args!["AAA"]);
    assert!(matches!(result, Err(Error::Binding(_))));
}

// ============== Fetch graphs and tracking ==============

#[test]
fn test_fetch_graph_loads_team() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let team_a = save_team(&mut session, "teamA");
    let team_b = save_team(&mut session, "teamB");
    {
        let mut members = MemberRepository::new(&mut session);
        members
            .save(&Member::new("member1", 10).with_team(&team_a))
            .unwrap();
        members
            .save(&Member::new("member2", 10).with_team(&team_b))
            .unwrap();
    }
    session.clear();

    let mut members = MemberRepository::new(&mut session);
    let all = members.find_all().unwrap();
    assert_eq!(all.len(), 2);
    for member in &all {
        assert!(member.team.is_loaded());
    }

    let fetched = members.find_fetch_by_username("member1").unwrap();
    assert_eq!(
        fetched[0].team.get().map(|t| t.name.as_str()),
        Some("teamA")
    );
}

#[test]
fn test_lazy_reference_resolves_through_session() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let team = save_team(&mut session, "teamA");
    MemberRepository::new(&mut session)
        .save(&Member::new("member1", 10).with_team(&team))
        .unwrap();
    session.clear();

    let member = MemberRepository::new(&mut session)
        .find_by_username("member1")
        .unwrap()
        .remove(0);
    assert!(!member.team.is_loaded());
    assert!(!member.team.is_null());

    let resolved = session.resolve(&member.team).unwrap().unwrap();
    assert_eq!(resolved.name, "teamA");
}

#[test]
fn test_change_team() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let team_a = save_team(&mut session, "teamA");
    let team_b = save_team(&mut session, "teamB");

    let mut members = MemberRepository::new(&mut session);
    let mut member = members
        .save(&Member::new("member1", 10).with_team(&team_a))
        .unwrap();
    member.change_team(&team_b);
    members.save(&member).unwrap();
    drop(members);
    session.clear();

    let found = MemberRepository::new(&mut session)
        .find_fetch_by_username("member1")
        .unwrap();
    assert_eq!(found[0].team.get().map(|t| t.name.as_str()), Some("teamB"));
}

#[test]
fn test_read_only_query_is_not_tracked() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("member1", 10)]);
    session.clear();

    let found = MemberRepository::new(&mut session)
        .find_read_only_by_username("member1")
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(session.context().is_empty());

    MemberRepository::new(&mut session)
        .find_by_username("member1")
        .unwrap();
    assert_eq!(session.context().len(), 1);
}

#[test]
fn test_custom_fragment() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_members(&mut session, &[("member1", 10), ("member2", 20)]);

    let found = MemberRepository::new(&mut session)
        .find_member_custom()
        .unwrap();
    assert_eq!(found.len(), 2);
}

// ============== Projections ==============

fn save_projection_fixture(session: &mut Session) {
    let team = save_team(session, "teamA");
    let mut members = MemberRepository::new(session);
    members
        .save(&Member::new("m1", 0).with_team(&team))
        .unwrap();
    members
        .save(&Member::new("m2", 0).with_team(&team))
        .unwrap();
    drop(members);
    session.clear();
}

#[test]
fn test_open_projection() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_projection_fixture(&mut session);

    let found = MemberRepository::new(&mut session)
        .find_projections_by_username("m1")
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "m1 0 teamA");
}

#[test]
fn test_closed_dto_projection() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_projection_fixture(&mut session);

    let found = MemberRepository::new(&mut session)
        .find_username_dto_by_username("m1")
        .unwrap();
    assert_eq!(
        found,
        vec![UsernameOnlyDto {
            username: "m1".to_string()
        }]
    );
    assert!(session.context().is_empty());
}

#[test]
fn test_dynamic_projection() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_projection_fixture(&mut session);

    let mut members = MemberRepository::new(&mut session);
    let dtos = members
        .find_username_by_username::<UsernameOnlyDto>("m1")
        .unwrap();
    assert_eq!(dtos[0].username, "m1");

    let nested = members
        .find_username_by_username::<NestedClosedProjection>("m2")
        .unwrap();
    assert_eq!(nested[0].username, "m2");
    assert_eq!(
        nested[0].team,
        Some(TeamInfo {
            name: "teamA".to_string()
        })
    );
}

#[test]
fn test_nested_projection() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_projection_fixture(&mut session);

    let found = MemberRepository::new(&mut session)
        .find_nested_projections_by_username("m1")
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].team.as_ref().map(|t| t.name.as_str()), Some("teamA"));
}

#[test]
fn test_projecting_method_cannot_return_entities() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let result = session
        .repository::<Member>()
        .find_many("findProjectionsByUsername", args!["m1"]);
    assert!(matches!(result, Err(Error::Binding(_))));
}

// ============== Native queries ==============

#[test]
fn test_native_query() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_projection_fixture(&mut session);

    let found = MemberRepository::new(&mut session)
        .find_by_native_query("m1")
        .unwrap()
        .unwrap();
    assert_eq!(found.username, "m1");
    assert_eq!(found.age, 0);
}

#[test]
fn test_native_projection_page() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_projection_fixture(&mut session);

    let request = PageRequest::of(0, 10).unwrap();
    let page = MemberRepository::new(&mut session)
        .find_by_native_projection("m1", &request)
        .unwrap();
    assert_eq!(page.total_elements(), 1);
    assert_eq!(page.content()[0].username, "m1");
    assert_eq!(page.content()[0].team_name.as_deref(), Some("teamA"));
}

// ============== Query by example ==============

#[test]
fn test_query_by_example() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_projection_fixture(&mut session);

    let probe = Member::new("m1", 0).with_team(&Team::new("teamA"));
    let matcher = ExampleMatcher::matching().with_ignore_paths(["age"]);
    let example = Example::of_with(probe, matcher);

    let mut repository = session.repository::<Member>();
    let found = repository.find_all_by_example(&example).unwrap();
    assert_eq!(usernames(&found), vec!["m1"]);
    assert_eq!(repository.count_by_example(&example).unwrap(), 1);
    assert!(repository.find_one_by_example(&example).unwrap().is_some());

    let other_team = Example::of_with(
        Member::new("m1", 0).with_team(&Team::new("teamB")),
        ExampleMatcher::matching().with_ignore_paths(["age"]),
    );
    assert!(!repository.exists_by_example(&other_team).unwrap());
}

#[test]
fn test_find_one_by_example_with_many_matches() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    save_projection_fixture(&mut session);

    let probe = Member::new("m", 0);
    let matcher =
        ExampleMatcher::matching().with_string_matcher(StringMatcher::Starting);
    let result = session
        .repository::<Member>()
        .find_one_by_example(&Example::of_with(probe, matcher));
    assert!(matches!(result, Err(Error::Cardinality { found: 2, .. })));
}

// ============== Auditing ==============

#[test]
fn test_auditing_stamps_creation_and_modification() {
    let ctx = TestContext::new();
    let auditor = Arc::new(SharedAuditor::new());
    auditor.set(Some("alice".to_string()));
    let factory = ctx.factory.clone().with_auditor(auditor.clone());
    let mut session = factory.open_session();

    let mut members = MemberRepository::new(&mut session);
    let mut member = members.save(&Member::new("member1", 10)).unwrap();
    assert!(member.audit.created_date.is_some());
    assert_eq!(member.audit.created_by.as_deref(), Some("alice"));
    assert_eq!(member.audit.last_modified_by.as_deref(), Some("alice"));

    auditor.set(Some("bob".to_string()));
    member.age = 11;
    let updated = members.save(&member).unwrap();
    assert_eq!(updated.audit.created_by.as_deref(), Some("alice"));
    assert_eq!(updated.audit.last_modified_by.as_deref(), Some("bob"));
    assert_eq!(updated.audit.created_date, member.audit.created_date);
    assert!(updated.audit.last_modified_date >= member.audit.last_modified_date);
}

#[test]
fn test_auditing_disabled() {
    let ctx = TestContext::with_config(RepositoryConfig::default().with_auditing(false));
    let mut session = ctx.session();
    let member = MemberRepository::new(&mut session)
        .save(&Member::new("member1", 10))
        .unwrap();
    assert!(member.audit.created_date.is_none());
}

#[test]
fn test_assigned_identity_uses_creation_stamp_for_newness() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    let mut items = session.repository::<Item>();

    let saved = items.save(&Item::new("A")).unwrap();
    assert!(saved.audit.created_date.is_some());

    items.save(&saved).unwrap();
    assert_eq!(items.count().unwrap(), 1);

    let duplicate = items.save(&Item::new("A"));
    assert!(matches!(
        duplicate,
        Err(Error::Store(StoreError::Constraint(_)))
    ));
}

// ============== Transactions ==============

#[test]
fn test_rollback_discards_writes() {
    let ctx = TestContext::new();
    let mut session = ctx.session();

    session.begin().unwrap();
    save_members(&mut session, &[("member1", 10)]);
    session.rollback().unwrap();

    assert!(session.context().is_empty());
    assert_eq!(session.repository::<Member>().count().unwrap(), 0);
}

#[test]
fn test_transaction_commits_on_success_and_rolls_back_on_error() {
    let ctx = TestContext::new();
    let mut session = ctx.session();

    session
        .transaction(|s| {
            save_members(s, &[("member1", 10)]);
            Ok(())
        })
        .unwrap();

    let result: ormrepo_core::Result<()> = session.transaction(|s| {
        save_members(s, &[("member2", 20)]);
        Err(Error::invalid_argument("abort"))
    });
    assert!(result.is_err());
    assert!(!session.in_transaction());

    let found = session.repository::<Member>().find_all().unwrap();
    assert_eq!(usernames(&found), vec!["member1"]);
}

#[test]
fn test_nested_begin_is_rejected() {
    let ctx = TestContext::new();
    let mut session = ctx.session();
    session.begin().unwrap();
    assert!(matches!(
        session.begin(),
        Err(Error::Store(StoreError::Transaction(_)))
    ));
    session.commit().unwrap();
}

#[test]
fn test_sessions_share_committed_state() {
    let ctx = TestContext::new();
    let mut first = ctx.session();
    save_members(&mut first, &[("member1", 10)]);

    let mut second = ctx.session();
    let found = MemberRepository::new(&mut second)
        .find_by_username("member1")
        .unwrap();
    assert_eq!(found.len(), 1);
}
