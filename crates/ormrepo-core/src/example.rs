//! Query by example.
//!
//! A probe entity is turned into a conjunction of equality (or string
//! matching) clauses over its populated attributes. A loaded relation on the
//! probe adds an inner join and clauses over the related row's populated
//! attributes.

use ormrepo_proto::{FilterExpr, Value};

use crate::catalog::EntityDef;
use crate::entity::Entity;
use crate::error::Result;
use crate::storage::{BoundClause, ClauseOp, JoinSpec, Store, StoreQuery};

/// How string attributes of the probe are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StringMatcher {
    #[default]
    Exact,
    Starting,
    Ending,
    Containing,
}

impl StringMatcher {
    fn op(self) -> ClauseOp {
        match self {
            StringMatcher::Exact => ClauseOp::Eq,
            StringMatcher::Starting => ClauseOp::StartingWith,
            StringMatcher::Ending => ClauseOp::EndingWith,
            StringMatcher::Containing => ClauseOp::Containing,
        }
    }
}

/// Which probe attributes take part and how strings match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExampleMatcher {
    ignored: Vec<String>,
    strings: StringMatcher,
}

impl ExampleMatcher {
    /// Match every populated attribute exactly.
    pub fn matching() -> Self {
        Self::default()
    }

    /// Leave these property paths (`age`, `team.name`) out of the match.
    pub fn with_ignore_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_string_matcher(mut self, matcher: StringMatcher) -> Self {
        self.strings = matcher;
        self
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignored.iter().any(|p| p == path)
    }
}

/// A probe entity with its matcher.
#[derive(Debug, Clone)]
pub struct Example<E> {
    probe: E,
    matcher: ExampleMatcher,
}

impl<E: Entity> Example<E> {
    pub fn of(probe: E) -> Self {
        Self::of_with(probe, ExampleMatcher::matching())
    }

    pub fn of_with(probe: E, matcher: ExampleMatcher) -> Self {
        Self { probe, matcher }
    }

    pub fn probe(&self) -> &E {
        &self.probe
    }

    pub fn matcher(&self) -> &ExampleMatcher {
        &self.matcher
    }

    /// Build the store query matching this example.
    pub(crate) fn to_query(&self, store: &dyn Store, def: &EntityDef) -> Result<StoreQuery> {
        let row = self.probe.to_row();
        let mut filters = Vec::new();
        let mut joins = Vec::new();

        let loaded: Vec<_> = def
            .relations
            .iter()
            .filter_map(|relation| match row.relation(&relation.name) {
                Some(Some(target)) => Some((relation, target)),
                _ => None,
            })
            .collect();

        for (name, value) in &row.fields {
            if value.is_null() || self.matcher.is_ignored(name) {
                continue;
            }
            if loaded.iter().any(|(r, _)| r.foreign_key == *name) {
                continue;
            }
            filters.push(self.clause(store, name.clone(), value)?);
        }

        for (relation, target) in loaded {
            for (name, value) in &target.fields {
                let path = format!("{}.{}", relation.name, name);
                if value.is_null() || self.matcher.is_ignored(&path) {
                    continue;
                }
                filters.push(self.clause(store, path, value)?);
            }
            joins.push(JoinSpec {
                relation: relation.name.clone(),
                required: true,
            });
        }

        let mut query = StoreQuery::new(def.name.clone());
        query.joins = joins;
        if !filters.is_empty() {
            query.filter = Some(FilterExpr::and(filters));
        }
        Ok(query)
    }

    fn clause(&self, store: &dyn Store, path: String, value: &Value) -> Result<FilterExpr> {
        let op = match value {
            Value::String(_) => self.matcher.strings.op(),
            _ => ClauseOp::Eq,
        };
        store.translate(&BoundClause::new(path, op, vec![value.clone()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::model::{self, Member, Team};
    use crate::storage::{SledStore, StorageConfig};
    use std::sync::Arc;

    fn store() -> (Arc<Catalog>, SledStore) {
        let catalog = Arc::new(model::catalog());
        let store = SledStore::open(StorageConfig::temporary(), Arc::clone(&catalog)).unwrap();
        (catalog, store)
    }

    #[test]
    fn test_null_attributes_are_skipped() {
        let (catalog, store) = store();
        let def = catalog.entity("Member").unwrap();
        let query = Example::of(Member::new("m1", 0))
            .to_query(&store, def)
            .unwrap();
        assert_eq!(
            query.filter,
            Some(FilterExpr::And(vec![
                FilterExpr::eq("username", "m1"),
                FilterExpr::eq("age", 0),
            ]))
        );
        assert!(query.joins.is_empty());
    }

    #[test]
    fn test_loaded_relation_joins_and_skips_foreign_key() {
        let (catalog, store) = store();
        let def = catalog.entity("Member").unwrap();
        let probe = Member::new("m1", 0).with_team(&Team::new("teamA"));
        let matcher = ExampleMatcher::matching().with_ignore_paths(["age"]);
        let query = Example::of_with(probe, matcher).to_query(&store, def).unwrap();
        assert_eq!(
            query.filter,
            Some(FilterExpr::And(vec![
                FilterExpr::eq("username", "m1"),
                FilterExpr::eq("team.name", "teamA"),
            ]))
        );
        assert_eq!(
            query.joins,
            vec![JoinSpec {
                relation: "team".into(),
                required: true
            }]
        );
    }

    #[test]
    fn test_string_matcher() {
        let (catalog, store) = store();
        let def = catalog.entity("Member").unwrap();
        let matcher = ExampleMatcher::matching()
            .with_ignore_paths(["age"])
            .with_string_matcher(StringMatcher::Starting);
        let query = Example::of_with(Member::new("mem", 0), matcher)
            .to_query(&store, def)
            .unwrap();
        assert_eq!(query.filter, Some(FilterExpr::like("username", "mem%")));
    }
}
