//! sled-backed store.

use std::cmp::Ordering;
use std::sync::Arc;

use sled::{Db, IVec, Tree};
use tracing::{debug, info, warn};

use super::key::encode_identity;
use super::native::NativeExecutor;
use super::transaction::UndoLogs;
use super::{
    BoundClause, BulkStatement, ClauseOp, NativeQuery, StorageConfig, Store, StoreQuery,
    TransactionId, UpdateValue,
};
use crate::catalog::{Catalog, EntityDef, IdGeneration};
use crate::error::{Error, Result, StoreError};
use crate::query::filter::FilterEvaluator;
use ormrepo_lang::ArithOp;
use ormrepo_proto::{FilterExpr, OrderDirection, OrderSpec, Row, Value};

/// Prefix of the tree holding a table's rows.
const TABLE_PREFIX: &str = "table:";

/// The embedded store: one sled tree per mapped table.
pub struct SledStore {
    db: Db,
    catalog: Arc<Catalog>,
    undo: UndoLogs,
}

impl SledStore {
    /// Open or create a store for the given catalog.
    pub fn open(config: StorageConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let db = config.to_sled_config().open()?;
        for entity in catalog.entities() {
            db.open_tree(tree_name(&entity.table))?;
        }
        info!(
            path = %config.path.display(),
            temporary = config.temporary,
            tables = catalog.entities().len(),
            "opened store"
        );
        Ok(Self {
            db,
            catalog,
            undo: UndoLogs::default(),
        })
    }

    /// The catalog this store was opened with.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Check if the database was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of rows stored for an entity.
    pub fn row_count(&self, entity: &str) -> Result<usize> {
        let def = self.catalog.entity(entity)?;
        Ok(self.tree(def)?.len())
    }

    fn tree(&self, entity: &EntityDef) -> Result<Tree> {
        Ok(self.db.open_tree(tree_name(&entity.table))?)
    }

    /// Every row of a table in identity order, relations unloaded.
    pub(crate) fn scan(&self, entity: &EntityDef) -> Result<Vec<Row>> {
        let tree = self.tree(entity)?;
        let mut rows = Vec::with_capacity(tree.len());
        for item in tree.iter() {
            let (_, bytes) = item?;
            rows.push(Row::decode_fields(&bytes)?);
        }
        Ok(rows)
    }

    fn load_row(&self, entity: &EntityDef, id: &Value) -> Result<Option<Row>> {
        let key = encode_identity(id)?;
        match self.tree(entity)?.get(key)? {
            Some(bytes) => Ok(Some(Row::decode_fields(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Attach the many-to-one relations named by `paths` (dotted, any depth).
    fn load_relations(&self, entity: &EntityDef, row: &mut Row, paths: &[String]) -> Result<()> {
        for (head, tails) in group_paths(paths) {
            let relation = entity.relation(&head).ok_or_else(|| {
                Error::resolution(format!("no relation '{}' on '{}'", head, entity.name))
            })?;
            let target = self.catalog.entity(&relation.target)?;
            let loaded = match row.get(&relation.foreign_key) {
                Some(fk) if !fk.is_null() => match self.load_row(target, fk)? {
                    Some(mut target_row) => {
                        self.load_relations(target, &mut target_row, &tails)?;
                        Some(target_row)
                    }
                    None => None,
                },
                _ => None,
            };
            row.set_relation(relation.name.clone(), loaded);
        }
        Ok(())
    }

    /// Scan, join and filter. Rows carry every relation the query touches.
    fn matching_rows(&self, query: &StoreQuery) -> Result<(&EntityDef, Vec<Row>)> {
        let entity = self.catalog.entity(&query.entity)?;
        let relations = relation_paths(query);
        let mut rows = self.scan(entity)?;
        if !relations.is_empty() {
            for row in &mut rows {
                self.load_relations(entity, row, &relations)?;
            }
        }

        rows.retain(|row| {
            query
                .joins
                .iter()
                .filter(|j| j.required)
                .all(|j| relation_present(row, &j.relation))
        });
        if let Some(filter) = &query.filter {
            rows.retain(|row| FilterEvaluator::evaluate(filter, row));
        }
        Ok((entity, rows))
    }

    fn write(
        &self,
        tx: TransactionId,
        entity: &EntityDef,
        key: &[u8],
        value: Option<Vec<u8>>,
    ) -> Result<Option<IVec>> {
        self.undo.ensure_open(tx)?;
        let tree = self.tree(entity)?;
        let previous = match value {
            Some(bytes) => tree.insert(key, bytes)?,
            None => tree.remove(key)?,
        };
        self.undo.record(
            tx,
            &tree_name(&entity.table),
            key,
            previous.as_ref().map(|p| p.to_vec()),
        )?;
        Ok(previous)
    }

    /// Lay out a row in declared field order, rejecting unmapped fields.
    fn normalize(&self, entity: &EntityDef, row: &Row) -> Result<Row> {
        if let Some(unknown) = row.field_names().find(|n| entity.field(n).is_none()) {
            return Err(StoreError::Constraint(format!(
                "'{}' is not a field of '{}'",
                unknown, entity.name
            ))
            .into());
        }
        let mut out = Row::new();
        for field in &entity.fields {
            let value = row.get(&field.name).cloned().unwrap_or(Value::Null);
            if value.is_null() && !field.nullable && field.name != entity.identity {
                return Err(StoreError::Constraint(format!(
                    "'{}.{}' must not be null",
                    entity.name, field.name
                ))
                .into());
            }
            out.set(field.name.clone(), field.scalar.coerce(value));
        }
        Ok(out)
    }

    fn next_identity(&self) -> Result<i64> {
        let id = self.db.generate_id()?;
        i64::try_from(id + 1)
            .map_err(|_| StoreError::Constraint("identity sequence exhausted".to_string()).into())
    }
}

impl Store for SledStore {
    fn translate(&self, clause: &BoundClause) -> Result<FilterExpr> {
        translate_clause(clause)
    }

    fn query(&self, query: &StoreQuery) -> Result<Vec<Row>> {
        let (_, mut rows) = self.matching_rows(query)?;

        if !query.order.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &query.order));
        }
        for row in &mut rows {
            prune_relations(row, &query.fetch);
            if let Some(columns) = &query.columns {
                row.narrow(columns);
            }
        }
        if query.distinct {
            dedup(&mut rows);
        }
        if let Some(page) = query.pagination {
            rows = rows
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect();
        }

        debug!(entity = %query.entity, rows = rows.len(), "store query");
        Ok(rows)
    }

    fn count(&self, query: &StoreQuery) -> Result<u64> {
        let (_, mut rows) = self.matching_rows(&query.for_count())?;
        if query.distinct {
            for row in &mut rows {
                row.relations.clear();
            }
            dedup(&mut rows);
        }
        Ok(rows.len() as u64)
    }

    fn execute_bulk(&self, tx: TransactionId, statement: &BulkStatement) -> Result<u64> {
        let query = StoreQuery {
            filter: statement.filter.clone(),
            ..StoreQuery::new(statement.entity.clone())
        };
        let (entity, rows) = self.matching_rows(&query)?;

        let mut affected = 0u64;
        for row in rows {
            let mut updated = Row::new();
            updated.fields = row.fields.clone();
            for (field, value) in &statement.assignments {
                let def = entity.field(field).ok_or_else(|| {
                    StoreError::Constraint(format!(
                        "'{}' is not a field of '{}'",
                        field, entity.name
                    ))
                })?;
                let computed = evaluate_update(value, &row)?;
                if !def.scalar.accepts(&computed) {
                    return Err(StoreError::Constraint(format!(
                        "{}.{} is {}, update produced {} {}",
                        entity.name,
                        field,
                        def.scalar,
                        computed.type_name(),
                        computed
                    ))
                    .into());
                }
                updated.set(field.clone(), def.scalar.coerce(computed));
            }
            let id = updated.get(&entity.identity).cloned().unwrap_or(Value::Null);
            let key = encode_identity(&id)?;
            let bytes = self.normalize(entity, &updated)?.encode_fields()?;
            self.write(tx, entity, &key, Some(bytes))?;
            affected += 1;
        }

        debug!(entity = %statement.entity, affected, "bulk update");
        Ok(affected)
    }

    fn execute_native(&self, query: &NativeQuery) -> Result<Vec<Row>> {
        NativeExecutor::new(self, &self.catalog).execute(query)
    }

    fn count_native(&self, query: &NativeQuery) -> Result<u64> {
        NativeExecutor::new(self, &self.catalog).count(query)
    }

    fn insert(&self, tx: TransactionId, entity: &str, row: Row) -> Result<Row> {
        let def = self.catalog.entity(entity)?;
        let mut row = row;
        let id = row.get(&def.identity).cloned().unwrap_or(Value::Null);
        let id = match (id, def.id_generation) {
            (Value::Null, IdGeneration::Sequence) => Value::Int64(self.next_identity()?),
            (Value::Null, IdGeneration::Assigned) => {
                return Err(StoreError::Constraint(format!(
                    "'{}' requires an assigned identity",
                    def.name
                ))
                .into())
            }
            (id, _) => id,
        };
        row.set(def.identity.clone(), id.clone());

        let stored = self.normalize(def, &row)?;
        let key = encode_identity(&id)?;
        if self.tree(def)?.contains_key(&key)? {
            return Err(StoreError::Constraint(format!(
                "duplicate identity {} for '{}'",
                id, def.name
            ))
            .into());
        }
        self.write(tx, def, &key, Some(stored.encode_fields()?))?;
        Ok(stored)
    }

    fn update(&self, tx: TransactionId, entity: &str, row: &Row) -> Result<()> {
        let def = self.catalog.entity(entity)?;
        let id = match row.get(&def.identity) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                return Err(StoreError::Constraint(format!(
                    "cannot update '{}' without identity",
                    def.name
                ))
                .into())
            }
        };
        let stored = self.normalize(def, row)?;
        self.write(tx, def, &encode_identity(&id)?, Some(stored.encode_fields()?))?;
        Ok(())
    }

    fn delete(&self, tx: TransactionId, entity: &str, id: &Value) -> Result<bool> {
        let def = self.catalog.entity(entity)?;
        let previous = self.write(tx, def, &encode_identity(id)?, None)?;
        Ok(previous.is_some())
    }

    fn find_by_id(&self, entity: &str, id: &Value, fetch: &[String]) -> Result<Option<Row>> {
        let def = self.catalog.entity(entity)?;
        match self.load_row(def, id)? {
            Some(mut row) => {
                self.load_relations(def, &mut row, fetch)?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn begin(&self) -> Result<TransactionId> {
        let tx = self.undo.begin();
        debug!(%tx, "begin");
        Ok(tx)
    }

    fn commit(&self, tx: TransactionId) -> Result<()> {
        let writes = self.undo.commit(tx)?;
        debug!(%tx, writes, "commit");
        Ok(())
    }

    fn rollback(&self, tx: TransactionId) -> Result<()> {
        let undone = self.undo.rollback(&self.db, tx)?;
        warn!(%tx, undone, "rollback");
        Ok(())
    }
}

fn tree_name(table: &str) -> String {
    format!("{}{}", TABLE_PREFIX, table)
}

/// Translate a bound clause into a store filter.
pub(crate) fn translate_clause(clause: &BoundClause) -> Result<FilterExpr> {
    let field = clause.field.clone();
    let first = || {
        clause.values.first().cloned().ok_or_else(|| {
            Error::binding(format!("no value bound for '{}'", clause.field))
        })
    };
    let pattern = |wrap: fn(String) -> String| -> Result<String> {
        match first()? {
            Value::String(s) => Ok(wrap(s)),
            other => Err(Error::binding(format!(
                "'{}' expects a string pattern, got {}",
                clause.field,
                other.type_name()
            ))),
        }
    };

    let filter = match clause.op {
        ClauseOp::Eq => match first()? {
            Value::Null => FilterExpr::is_null(field),
            value => FilterExpr::eq(field, value),
        },
        ClauseOp::Ne => match first()? {
            Value::Null => FilterExpr::is_not_null(field),
            value => FilterExpr::ne(field, value),
        },
        ClauseOp::Lt => FilterExpr::lt(field, first()?),
        ClauseOp::Le => FilterExpr::le(field, first()?),
        ClauseOp::Gt => FilterExpr::gt(field, first()?),
        ClauseOp::Ge => FilterExpr::ge(field, first()?),
        ClauseOp::Between => match clause.values.as_slice() {
            [low, high] => FilterExpr::And(vec![
                FilterExpr::ge(field.clone(), low.clone()),
                FilterExpr::le(field, high.clone()),
            ]),
            _ => {
                return Err(Error::binding(format!(
                    "'{}' between expects two values",
                    clause.field
                )))
            }
        },
        ClauseOp::In => FilterExpr::in_values(field, clause.values.clone()),
        ClauseOp::NotIn => FilterExpr::not_in_values(field, clause.values.clone()),
        ClauseOp::Like => FilterExpr::like(field, pattern(|s| s)?),
        ClauseOp::NotLike => FilterExpr::not_like(field, pattern(|s| s)?),
        ClauseOp::StartingWith => FilterExpr::like(
            field,
            pattern(|s| format!("{}%", FilterEvaluator::escape_like(&s)))?,
        ),
        ClauseOp::EndingWith => FilterExpr::like(
            field,
            pattern(|s| format!("%{}", FilterEvaluator::escape_like(&s)))?,
        ),
        ClauseOp::Containing => FilterExpr::like(
            field,
            pattern(|s| format!("%{}%", FilterEvaluator::escape_like(&s)))?,
        ),
        ClauseOp::NotContaining => FilterExpr::not_like(
            field,
            pattern(|s| format!("%{}%", FilterEvaluator::escape_like(&s)))?,
        ),
        ClauseOp::IsNull => FilterExpr::is_null(field),
        ClauseOp::IsNotNull => FilterExpr::is_not_null(field),
        ClauseOp::True => FilterExpr::eq(field, true),
        ClauseOp::False => FilterExpr::eq(field, false),
    };
    Ok(filter)
}

/// Relation paths a query needs loaded: joins, fetches, and the relation
/// prefixes of filtered or ordered paths.
fn relation_paths(query: &StoreQuery) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    let mut push = |path: &str| {
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    };
    for join in &query.joins {
        push(&join.relation);
    }
    for fetch in &query.fetch {
        push(fetch);
    }
    let field_paths = query
        .filter
        .iter()
        .flat_map(|f| f.fields())
        .chain(query.order.iter().map(|o| o.field.as_str()));
    for field in field_paths {
        if let Some((prefix, _)) = field.rsplit_once('.') {
            push(prefix);
        }
    }
    paths
}

/// Group dotted relation paths by their first hop.
fn group_paths(paths: &[String]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for path in paths {
        let (head, tail) = match path.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (path.as_str(), None),
        };
        let idx = match groups.iter().position(|(h, _)| h == head) {
            Some(idx) => idx,
            None => {
                groups.push((head.to_string(), Vec::new()));
                groups.len() - 1
            }
        };
        if let Some(tail) = tail {
            groups[idx].1.push(tail.to_string());
        }
    }
    groups
}

fn relation_present(row: &Row, path: &str) -> bool {
    match path.split_once('.') {
        None => matches!(row.relation(path), Some(Some(_))),
        Some((head, rest)) => match row.relation(head) {
            Some(Some(target)) => relation_present(target, rest),
            _ => false,
        },
    }
}

/// Drop loaded relations that are not part of the fetch graph.
fn prune_relations(row: &mut Row, fetch: &[String]) {
    let groups = group_paths(fetch);
    row.relations
        .retain(|(name, _)| groups.iter().any(|(head, _)| head == name));
    for (name, target) in &mut row.relations {
        if let (Some(target), Some((_, tails))) =
            (target.as_mut(), groups.iter().find(|(head, _)| head == name))
        {
            prune_relations(target, tails);
        }
    }
}

fn compare_rows(a: &Row, b: &Row, order: &[OrderSpec]) -> Ordering {
    for spec in order {
        let ord = FilterEvaluator::sort_order(a.lookup(&spec.field), b.lookup(&spec.field));
        let ord = match spec.direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn dedup(rows: &mut Vec<Row>) {
    let mut seen: Vec<Row> = Vec::with_capacity(rows.len());
    rows.retain(|row| {
        if seen.contains(row) {
            false
        } else {
            seen.push(row.clone());
            true
        }
    });
}

fn evaluate_update(value: &UpdateValue, row: &Row) -> Result<Value> {
    match value {
        UpdateValue::Value(v) => Ok(v.clone()),
        UpdateValue::Field(field) => Ok(row.lookup(field).cloned().unwrap_or(Value::Null)),
        UpdateValue::Binary { left, op, right } => {
            let left = evaluate_update(left, row)?;
            let right = evaluate_update(right, row)?;
            arithmetic(&left, *op, &right)
        }
    }
}

/// Apply an arithmetic operator. Null operands yield null; `Int32` results
/// that overflow widen to `Int64`.
pub(crate) fn arithmetic(left: &Value, op: ArithOp, right: &Value) -> Result<Value> {
    let int_op = |a: i64, b: i64| match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
    };
    let overflow = || StoreError::Constraint("integer overflow in update".to_string());

    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int32(a), Value::Int32(b)) => {
            let result = int_op(*a as i64, *b as i64).ok_or_else(overflow)?;
            Ok(i32::try_from(result)
                .map(Value::Int32)
                .unwrap_or(Value::Int64(result)))
        }
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            let (a, b) = (left.as_i64().unwrap_or_default(), right.as_i64().unwrap_or_default());
            Ok(Value::Int64(int_op(a, b).ok_or_else(overflow)?))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float64(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
            })),
            _ => Err(StoreError::Constraint(format!(
                "cannot apply arithmetic to {} and {}",
                left.type_name(),
                right.type_name()
            ))
            .into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, RelationDef, ScalarType};
    use crate::storage::JoinSpec;
    use ormrepo_proto::Pagination;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new()
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
                ),
        )
    }

    fn seeded() -> (SledStore, TransactionId) {
        let store = SledStore::open(StorageConfig::temporary(), catalog()).unwrap();
        let tx = store.begin().unwrap();
        let team = store
            .insert(tx, "Team", Row::new().with("name", "teamA"))
            .unwrap();
        let team_id = team.get("id").cloned().unwrap();
        for (name, age, team) in [
            ("AAA", 10, Some(team_id.clone())),
            ("BBB", 20, None),
            ("CCC", 30, Some(team_id.clone())),
        ] {
            store
                .insert(
                    tx,
                    "Member",
                    Row::new()
                        .with("username", name)
                        .with("age", age)
                        .with("team_id", Value::from(team)),
                )
                .unwrap();
        }
        (store, tx)
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let (store, tx) = seeded();
        let row = store
            .insert(tx, "Member", Row::new().with("username", "DDD").with("age", 1))
            .unwrap();
        assert!(matches!(row.get("id"), Some(Value::Int64(id)) if *id > 0));
        assert_eq!(row.get("team_id"), Some(&Value::Null));
        assert_eq!(store.row_count("Member").unwrap(), 4);
    }

    #[test]
    fn test_query_filters_orders_and_pages() {
        let (store, _) = seeded();
        let query = StoreQuery::new("Member")
            .with_filter(FilterExpr::ge("age", 20))
            .with_order(vec![OrderSpec::desc("username")])
            .with_pagination(Pagination::new(1, 0));
        let rows = store.query(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("username"), Some(&Value::from("CCC")));
        assert_eq!(store.count(&query).unwrap(), 2);
    }

    #[test]
    fn test_relation_filter_does_not_leak_unfetched_relation() {
        let (store, _) = seeded();
        let query = StoreQuery::new("Member").with_filter(FilterExpr::eq("team.name", "teamA"));
        let rows = store.query(&query).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.relation("team").is_none()));

        let fetched = store.query(&query.with_fetch(vec!["team".into()])).unwrap();
        assert!(fetched
            .iter()
            .all(|r| r.lookup("team.name") == Some(&Value::from("teamA"))));
    }

    #[test]
    fn test_inner_join_drops_null_relations() {
        let (store, _) = seeded();
        let mut query = StoreQuery::new("Member");
        query.joins.push(JoinSpec {
            relation: "team".into(),
            required: true,
        });
        assert_eq!(store.count(&query).unwrap(), 2);
    }

    #[test]
    fn test_bulk_update_and_rollback() {
        let (store, tx) = seeded();
        store.commit(tx).unwrap();

        let tx = store.begin().unwrap();
        let statement = BulkStatement {
            entity: "Member".into(),
            assignments: vec![(
                "age".into(),
                UpdateValue::Binary {
                    left: Box::new(UpdateValue::Field("age".into())),
                    op: ArithOp::Add,
                    right: Box::new(UpdateValue::Value(Value::Int32(1))),
                },
            )],
            filter: Some(FilterExpr::ge("age", 20)),
        };
        assert_eq!(store.execute_bulk(tx, &statement).unwrap(), 2);
        let ages = |store: &SledStore| -> Vec<Value> {
            store
                .query(&StoreQuery::new("Member"))
                .unwrap()
                .into_iter()
                .filter_map(|r| r.get("age").cloned())
                .collect()
        };
        assert_eq!(
            ages(&store),
            vec![Value::Int32(10), Value::Int32(21), Value::Int32(31)]
        );

        store.rollback(tx).unwrap();
        assert_eq!(
            ages(&store),
            vec![Value::Int32(10), Value::Int32(20), Value::Int32(30)]
        );
    }

    #[test]
    fn test_bulk_update_rejects_value_outside_column_type() {
        let (store, tx) = seeded();
        store
            .insert(tx, "Member", Row::new().with("username", "old").with("age", i32::MAX))
            .unwrap();
        store.commit(tx).unwrap();

        let tx = store.begin().unwrap();
        let statement = BulkStatement {
            entity: "Member".into(),
            assignments: vec![(
                "age".into(),
                UpdateValue::Binary {
                    left: Box::new(UpdateValue::Field("age".into())),
                    op: ArithOp::Add,
                    right: Box::new(UpdateValue::Value(Value::Int32(1))),
                },
            )],
            filter: Some(FilterExpr::eq("username", "old")),
        };
        let err = store.execute_bulk(tx, &statement).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Constraint(_))));
        store.rollback(tx).unwrap();

        let rows = store
            .query(&StoreQuery::new("Member").with_filter(FilterExpr::eq("username", "old")))
            .unwrap();
        assert_eq!(rows[0].get("age"), Some(&Value::Int32(i32::MAX)));
    }

    #[test]
    fn test_duplicate_and_unknown_fields_rejected() {
        let (store, tx) = seeded();
        let existing = store.query(&StoreQuery::new("Member")).unwrap().remove(0);
        assert!(store.insert(tx, "Member", existing).is_err());
        assert!(store
            .insert(tx, "Member", Row::new().with("username", "x").with("age", 1).with("nick", "y"))
            .is_err());
    }

    #[test]
    fn test_find_by_id_with_fetch() {
        let (store, _) = seeded();
        let first = store.query(&StoreQuery::new("Member")).unwrap().remove(0);
        let id = first.get("id").cloned().unwrap();
        let found = store
            .find_by_id("Member", &id, &["team".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(found.lookup("team.name"), Some(&Value::from("teamA")));
        assert!(store.find_by_id("Member", &Value::Int64(999), &[]).unwrap().is_none());
    }

    #[test]
    fn test_translate_clause() {
        let like = translate_clause(&BoundClause::new(
            "username",
            ClauseOp::StartingWith,
            vec![Value::from("mem_")],
        ))
        .unwrap();
        assert_eq!(like, FilterExpr::like("username", "mem\\_%"));

        let null_eq =
            translate_clause(&BoundClause::new("username", ClauseOp::Eq, vec![Value::Null])).unwrap();
        assert_eq!(null_eq, FilterExpr::is_null("username"));

        assert!(translate_clause(&BoundClause::new("age", ClauseOp::Like, vec![Value::Int32(1)]))
            .is_err());
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            arithmetic(&Value::Int32(i32::MAX), ArithOp::Add, &Value::Int32(1)).unwrap(),
            Value::Int64(i32::MAX as i64 + 1)
        );
        assert_eq!(
            arithmetic(&Value::Null, ArithOp::Mul, &Value::Int32(2)).unwrap(),
            Value::Null
        );
        assert!(arithmetic(&Value::from("a"), ArithOp::Add, &Value::Int32(1)).is_err());
    }
}
