//! Native query evaluation.
//!
//! Native query text is parsed with the shared query grammar and resolved
//! against table and column names. A joined tuple holds one optional row per
//! source table; output rows are keyed by the selected column names (or
//! their aliases).

use std::cmp::Ordering;

use ormrepo_lang::{
    CompareOp, Condition, InList, JoinKind, Operand, ParameterKind, Path, SelectList,
    SelectStatement, Statement,
};
use ormrepo_proto::{OrderDirection, Row, Value};

use super::engine::SledStore;
use super::NativeQuery;
use crate::catalog::{Catalog, EntityDef};
use crate::error::{Error, Result};
use crate::query::filter::FilterEvaluator;

/// One table in the `from` / `join` list.
struct Source<'c> {
    alias: String,
    entity: &'c EntityDef,
}

type Tuple = Vec<Option<Row>>;

pub(crate) struct NativeExecutor<'a> {
    store: &'a SledStore,
    catalog: &'a Catalog,
}

impl<'a> NativeExecutor<'a> {
    pub fn new(store: &'a SledStore, catalog: &'a Catalog) -> Self {
        Self { store, catalog }
    }

    /// Run the query and return its output rows.
    pub fn execute(&self, query: &NativeQuery) -> Result<Vec<Row>> {
        let select = parse_select(&query.sql)?;
        let sources = self.sources(&select)?;
        let tuples = self.tuples(&select, &sources, query)?;

        if let SelectList::Count(_) = select.output {
            return Ok(vec![Row::new().with("count", tuples.len() as i64)]);
        }

        let mut keyed = Vec::with_capacity(tuples.len());
        for tuple in &tuples {
            let mut keys = Vec::with_capacity(select.order_by.len());
            for item in &select.order_by {
                keys.push(column_value(&item.path, &sources, tuple)?);
            }
            keyed.push((keys, project(&select.output, &sources, tuple)?));
        }

        keyed.sort_by(|(ka, ra), (kb, rb)| {
            for (idx, item) in select.order_by.iter().enumerate() {
                let ord = FilterEvaluator::sort_order(ka[idx].as_ref(), kb[idx].as_ref());
                let ord = if item.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            for spec in &query.sort {
                let ord = FilterEvaluator::sort_order(
                    output_value(ra, &spec.field),
                    output_value(rb, &spec.field),
                );
                let ord = match spec.direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let mut rows: Vec<Row> = keyed.into_iter().map(|(_, row)| row).collect();
        if select.distinct {
            let mut seen: Vec<Row> = Vec::new();
            rows.retain(|row| {
                let fresh = !seen.contains(row);
                if fresh {
                    seen.push(row.clone());
                }
                fresh
            });
        }
        if let Some(page) = query.pagination {
            rows = rows
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect();
        }
        Ok(rows)
    }

    /// Number of rows the query yields without pagination.
    pub fn count(&self, query: &NativeQuery) -> Result<u64> {
        let unpaged = NativeQuery {
            pagination: None,
            ..query.clone()
        };
        let rows = self.execute(&unpaged)?;
        let select = parse_select(&query.sql)?;
        if let SelectList::Count(_) = select.output {
            return Ok(rows
                .first()
                .and_then(|r| r.get("count"))
                .and_then(Value::as_i64)
                .unwrap_or_default() as u64);
        }
        Ok(rows.len() as u64)
    }

    fn sources(&self, select: &SelectStatement) -> Result<Vec<Source<'a>>> {
        let mut sources = vec![self.source(&select.from.name, select.from.alias.as_deref())?];
        for join in &select.joins {
            sources.push(self.source(join.target.last(), join.alias.as_deref())?);
        }
        Ok(sources)
    }

    fn source(&self, table: &str, alias: Option<&str>) -> Result<Source<'a>> {
        let entity = self
            .catalog
            .entity_by_table(table)
            .ok_or_else(|| Error::native(format!("unknown table '{}'", table)))?;
        Ok(Source {
            alias: alias.unwrap_or(table).to_string(),
            entity,
        })
    }

    /// Build the joined and filtered tuples.
    fn tuples(
        &self,
        select: &SelectStatement,
        sources: &[Source<'_>],
        query: &NativeQuery,
    ) -> Result<Vec<Tuple>> {
        let mut tuples: Vec<Tuple> = self
            .store
            .scan(sources[0].entity)?
            .into_iter()
            .map(|row| vec![Some(row)])
            .collect();

        for (idx, join) in select.joins.iter().enumerate() {
            let on = join.on.as_ref().ok_or_else(|| {
                Error::native(format!("join on '{}' requires an on condition", join.target.dotted()))
            })?;
            let candidates = self.store.scan(sources[idx + 1].entity)?;
            let visible = &sources[..idx + 2];
            let mut joined = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                let mut matched = false;
                for candidate in &candidates {
                    let mut extended = tuple.clone();
                    extended.push(Some(candidate.clone()));
                    if evaluate(on, visible, &extended, query)? {
                        joined.push(extended);
                        matched = true;
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    let mut extended = tuple;
                    extended.push(None);
                    joined.push(extended);
                }
            }
            tuples = joined;
        }

        if let Some(condition) = &select.condition {
            let mut kept = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                if evaluate(condition, sources, &tuple, query)? {
                    kept.push(tuple);
                }
            }
            tuples = kept;
        }
        Ok(tuples)
    }
}

fn parse_select(sql: &str) -> Result<SelectStatement> {
    match ormrepo_lang::parse(sql) {
        Ok(Statement::Select(select)) => Ok(select),
        Ok(Statement::Update(_)) => Err(Error::native("native updates are not supported")),
        Err(e) => Err(Error::native(e.format_with_source(sql))),
    }
}

/// Resolve `alias.column` or a bare `column` to a source index and field.
fn resolve_column<'s>(path: &Path, sources: &'s [Source<'_>]) -> Result<(usize, &'s str)> {
    let (qualifier, column) = match path.segments.as_slice() {
        [column] => (None, column.as_str()),
        [qualifier, column] => (Some(qualifier.as_str()), column.as_str()),
        _ => return Err(Error::native(format!("invalid column '{}'", path.dotted()))),
    };
    for (idx, source) in sources.iter().enumerate() {
        if qualifier.is_some_and(|q| !q.eq_ignore_ascii_case(&source.alias)) {
            continue;
        }
        let field = source
            .entity
            .field_by_column(column)
            .or_else(|| source.entity.field(column));
        if let Some(field) = field {
            return Ok((idx, field.name.as_str()));
        }
    }
    Err(Error::native(format!("unknown column '{}'", path.dotted())))
}

fn column_value(path: &Path, sources: &[Source<'_>], tuple: &Tuple) -> Result<Option<Value>> {
    let (idx, field) = resolve_column(path, sources)?;
    Ok(tuple
        .get(idx)
        .and_then(|row| row.as_ref())
        .and_then(|row| row.get(field))
        .cloned())
}

fn output_value<'r>(row: &'r Row, name: &str) -> Option<&'r Value> {
    row.fields
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn source_columns(source: &Source<'_>, row: Option<&Row>, out: &mut Row) {
    for field in &source.entity.fields {
        let value = row
            .and_then(|r| r.get(&field.name))
            .cloned()
            .unwrap_or(Value::Null);
        out.set(field.column.clone(), value);
    }
}

fn project(output: &SelectList, sources: &[Source<'_>], tuple: &Tuple) -> Result<Row> {
    let mut row = Row::new();
    match output {
        SelectList::Star => source_columns(&sources[0], tuple[0].as_ref(), &mut row),
        SelectList::Items(items) => {
            for item in items {
                if item.path.segments.len() == 1 {
                    if let Some(idx) = sources
                        .iter()
                        .position(|s| s.alias.eq_ignore_ascii_case(item.path.head()))
                    {
                        source_columns(&sources[idx], tuple[idx].as_ref(), &mut row);
                        continue;
                    }
                }
                let value = column_value(&item.path, sources, tuple)?.unwrap_or(Value::Null);
                let name = item
                    .alias
                    .clone()
                    .unwrap_or_else(|| item.path.last().to_string());
                row.set(name, value);
            }
        }
        SelectList::Constructor { class, .. } => {
            return Err(Error::native(format!(
                "constructor expressions are not supported in native queries ('{}')",
                class
            )))
        }
        SelectList::Count(_) => {}
    }
    Ok(row)
}

fn operand_value(
    operand: &Operand,
    sources: &[Source<'_>],
    tuple: &Tuple,
    query: &NativeQuery,
) -> Result<Value> {
    match operand {
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Path(path) => Ok(column_value(path, sources, tuple)?.unwrap_or(Value::Null)),
        Operand::Parameter(param) => match &param.kind {
            ParameterKind::Positional(n) => query
                .positional
                .get((*n as usize).saturating_sub(1))
                .cloned()
                .ok_or_else(|| Error::native(format!("no value bound for parameter ?{}", n))),
            ParameterKind::Named(name) => query
                .named
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::native(format!("no value bound for parameter :{}", name))),
        },
    }
}

fn evaluate(
    condition: &Condition,
    sources: &[Source<'_>],
    tuple: &Tuple,
    query: &NativeQuery,
) -> Result<bool> {
    let value = |operand: &Operand| operand_value(operand, sources, tuple, query);
    match condition {
        Condition::Compare { left, op, right } => {
            let (l, r) = (value(left)?, value(right)?);
            if l.is_null() || r.is_null() {
                return Ok(false);
            }
            Ok(match op {
                CompareOp::Eq => FilterEvaluator::values_equal(&l, &r),
                CompareOp::Ne => !FilterEvaluator::values_equal(&l, &r),
                CompareOp::Lt => FilterEvaluator::compare_values(&l, &r).is_some_and(Ordering::is_lt),
                CompareOp::Le => FilterEvaluator::compare_values(&l, &r).is_some_and(Ordering::is_le),
                CompareOp::Gt => FilterEvaluator::compare_values(&l, &r).is_some_and(Ordering::is_gt),
                CompareOp::Ge => FilterEvaluator::compare_values(&l, &r).is_some_and(Ordering::is_ge),
            })
        }
        Condition::In {
            path,
            negated,
            list,
        } => {
            let Some(actual) = column_value(path, sources, tuple)?.filter(|v| !v.is_null()) else {
                return Ok(false);
            };
            let candidates = match list {
                InList::Parameter(p) => value(&Operand::Parameter(p.clone()))?.elements(),
                InList::Items(items) => items.iter().map(value).collect::<Result<Vec<_>>>()?,
            };
            let found = candidates
                .iter()
                .any(|c| FilterEvaluator::values_equal(&actual, c));
            Ok(found != *negated)
        }
        Condition::Like {
            path,
            negated,
            pattern,
        } => {
            let actual = column_value(path, sources, tuple)?;
            match (actual, value(pattern)?) {
                (Some(Value::String(s)), Value::String(p)) => {
                    Ok(FilterEvaluator::like_match(&s, &p) != *negated)
                }
                _ => Ok(false),
            }
        }
        Condition::IsNull { path, negated } => {
            let is_null = column_value(path, sources, tuple)?.map_or(true, |v| v.is_null());
            Ok(is_null != *negated)
        }
        Condition::And(items) => {
            for item in items {
                if !evaluate(item, sources, tuple, query)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(items) => {
            for item in items {
                if evaluate(item, sources, tuple, query)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not(inner) => Ok(!evaluate(inner, sources, tuple, query)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, IdGeneration, RelationDef, ScalarType};
    use crate::storage::{StorageConfig, Store};
    use ormrepo_proto::{OrderSpec, Pagination};
    use std::sync::Arc;

    fn store() -> SledStore {
        let catalog = Catalog::new()
            .with_entity(
                EntityDef::new("Team", "team")
                    .with_identity(
                        FieldDef::new("id", ScalarType::Int64).with_column("team_id"),
                        IdGeneration::Sequence,
                    )
                    .with_field(FieldDef::new("name", ScalarType::String)),
            )
            .with_entity(
                EntityDef::new("Member", "member")
                    .with_identity(
                        FieldDef::new("id", ScalarType::Int64).with_column("member_id"),
                        IdGeneration::Sequence,
                    )
                    .with_field(FieldDef::new("username", ScalarType::String))
                    .with_field(FieldDef::new("age", ScalarType::Int32))
                    .with_relation(RelationDef::many_to_one("team", "Team", "team_id")),
            );
        let store = SledStore::open(StorageConfig::temporary(), Arc::new(catalog)).unwrap();
        let tx = store.begin().unwrap();
        let team = store.insert(tx, "Team", Row::new().with("name", "teamA")).unwrap();
        let team_id = team.get("id").cloned().unwrap();
        for (name, age, team) in [("m1", 0, Value::Null), ("m2", 0, team_id)] {
            store
                .insert(
                    tx,
                    "Member",
                    Row::new().with("username", name).with("age", age).with("team_id", team),
                )
                .unwrap();
        }
        store.commit(tx).unwrap();
        store
    }

    #[test]
    fn test_select_star_positional() {
        let store = store();
        let mut query = NativeQuery::new("select * from member where username = ?");
        query.positional.push(Value::from("m1"));
        let rows = store.execute_native(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("username"), Some(&Value::from("m1")));
        assert!(rows[0].contains("member_id"));
        assert!(rows[0].contains("team_id"));
    }

    #[test]
    fn test_left_join_with_aliases() {
        let store = store();
        let mut query = NativeQuery::new(
            "select m.member_id as id, m.username, t.name as teamName \
             from member m left outer join team t on m.team_id = t.team_id",
        );
        query.sort.push(OrderSpec::desc("username"));
        query.pagination = Some(Pagination::new(10, 0));
        let rows = store.execute_native(&query).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("username"), Some(&Value::from("m2")));
        assert_eq!(rows[0].get("teamName"), Some(&Value::from("teamA")));
        assert_eq!(rows[1].get("teamName"), Some(&Value::Null));
        assert_eq!(
            rows[0].field_names().collect::<Vec<_>>(),
            vec!["id", "username", "teamName"]
        );
    }

    #[test]
    fn test_inner_join_and_count() {
        let store = store();
        let query = NativeQuery::new(
            "select m.username from member m inner join team t on m.team_id = t.team_id",
        );
        assert_eq!(store.count_native(&query).unwrap(), 1);
        let count = NativeQuery::new("select count(*) from member");
        assert_eq!(store.count_native(&count).unwrap(), 2);
    }

    #[test]
    fn test_named_parameters_and_in() {
        let store = store();
        let mut query = NativeQuery::new("select username from member where username in :names");
        query
            .named
            .push(("names".into(), Value::from(vec!["m1", "zz"])));
        assert_eq!(store.execute_native(&query).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_query_is_store_error() {
        let store = store();
        let err = store
            .execute_native(&NativeQuery::new("select from where"))
            .unwrap_err();
        assert!(err.is_store_error());

        let err = store
            .execute_native(&NativeQuery::new("select * from nowhere"))
            .unwrap_err();
        assert!(err.is_store_error());

        let err = store
            .execute_native(&NativeQuery::new("select * from member where username = ?"))
            .unwrap_err();
        assert!(err.is_store_error());
    }
}
