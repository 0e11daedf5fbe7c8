//! Query execution.
//!
//! The executor binds arguments, sends the bound request to the store and
//! shapes the rows: entity rows, selected columns, single results with the
//! strict cardinality check, pages and slices.

use ormrepo_proto::{OrderSpec, Pagination, Row, Value};
use tracing::debug;

use super::binding::{Args, Binder};
use super::descriptor::{Column, Output, Plan, QueryDescriptor, SelectPlan};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::paging::{Page, PageRequest, Slice, Sort};
use crate::storage::{NativeQuery, Store};

/// Runs resolved descriptors against a store.
pub struct QueryExecutor<'a> {
    store: &'a dyn Store,
    catalog: &'a Catalog,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(store: &'a dyn Store, catalog: &'a Catalog) -> Self {
        Self { store, catalog }
    }

    /// Every matching row, empty when nothing matches.
    pub fn rows(&self, descriptor: &QueryDescriptor, args: &Args, sort: &Sort) -> Result<Vec<Row>> {
        let values = self.bind(descriptor, args)?;
        let order = self.dynamic_order(descriptor, sort)?;
        let rows = self.fetch(descriptor, &values, &order, None)?;
        debug!(signature = %descriptor.signature, rows = rows.len(), "executed query");
        Ok(rows)
    }

    /// At most one row. More than one match is a cardinality error.
    pub fn single(&self, descriptor: &QueryDescriptor, args: &Args) -> Result<Option<Row>> {
        let values = self.bind(descriptor, args)?;
        let probe = Pagination::limit(2);
        let mut rows = self.fetch(descriptor, &values, &[], Some(probe))?;
        if rows.len() > 1 {
            let found = self.count_bound(descriptor, &values)? as usize;
            return Err(Error::Cardinality {
                operation: descriptor.signature.clone(),
                found: found.max(rows.len()),
            });
        }
        debug!(signature = %descriptor.signature, found = rows.len(), "executed single-result query");
        Ok(rows.pop())
    }

    /// One page of rows with the total count.
    ///
    /// The count query is skipped when the content alone shows the total:
    /// a short first page, or a short non-empty later page.
    pub fn page(
        &self,
        descriptor: &QueryDescriptor,
        args: &Args,
        request: &PageRequest,
    ) -> Result<Page<Row>> {
        let values = self.bind(descriptor, args)?;
        let order = self.dynamic_order(descriptor, request.sort())?;
        let window = Pagination::new(request.size(), request.offset());
        let content = self.fetch(descriptor, &values, &order, Some(window))?;

        let short = (content.len() as u64) < request.size() as u64;
        let total = if short && (request.offset() == 0 || !content.is_empty()) {
            request.offset() + content.len() as u64
        } else {
            self.count_bound(descriptor, &values)?
        };
        debug!(signature = %descriptor.signature, rows = content.len(), total, "executed page query");
        Ok(Page::new(content, request, total))
    }

    /// One slice of rows. Fetches one row past the slice to learn whether
    /// another follows; never counts.
    pub fn slice(
        &self,
        descriptor: &QueryDescriptor,
        args: &Args,
        request: &PageRequest,
    ) -> Result<Slice<Row>> {
        let values = self.bind(descriptor, args)?;
        let order = self.dynamic_order(descriptor, request.sort())?;
        let window = Pagination::new(request.size().saturating_add(1), request.offset());
        let mut content = self.fetch(descriptor, &values, &order, Some(window))?;
        let has_next = content.len() > request.size() as usize;
        content.truncate(request.size() as usize);
        debug!(signature = %descriptor.signature, rows = content.len(), has_next, "executed slice query");
        Ok(Slice::new(content, request, has_next))
    }

    /// Number of matching rows.
    pub fn count(&self, descriptor: &QueryDescriptor, args: &Args) -> Result<u64> {
        let values = self.bind(descriptor, args)?;
        self.count_bound(descriptor, &values)
    }

    /// Whether anything matches.
    pub fn exists(&self, descriptor: &QueryDescriptor, args: &Args) -> Result<bool> {
        let values = self.bind(descriptor, args)?;
        let rows = self.fetch(descriptor, &values, &[], Some(Pagination::limit(1)))?;
        Ok(!rows.is_empty())
    }

    fn bind(&self, descriptor: &QueryDescriptor, args: &Args) -> Result<Vec<Value>> {
        if matches!(descriptor.plan, Plan::Update(_)) {
            return Err(Error::binding(format!(
                "'{}' is a bulk update; execute it as a modifying query",
                descriptor.signature
            )));
        }
        Binder::new(self.store).check(descriptor, args)
    }

    /// Validate a caller-supplied ordering.
    fn dynamic_order(&self, descriptor: &QueryDescriptor, sort: &Sort) -> Result<Vec<OrderSpec>> {
        if sort.is_unsorted() {
            return Ok(Vec::new());
        }
        if !descriptor.accepts_sort {
            return Err(Error::invalid_argument(format!(
                "'{}' does not accept a sort",
                descriptor.signature
            )));
        }
        if !descriptor.is_native() {
            for order in sort.orders() {
                self.catalog
                    .resolve_path(&descriptor.entity, &order.field)
                    .map_err(|_| {
                        Error::invalid_argument(format!(
                            "cannot sort '{}' by unknown property '{}'",
                            descriptor.entity, order.field
                        ))
                    })?;
            }
        }
        Ok(sort.orders().to_vec())
    }

    fn fetch(
        &self,
        descriptor: &QueryDescriptor,
        values: &[Value],
        order: &[OrderSpec],
        window: Option<Pagination>,
    ) -> Result<Vec<Row>> {
        let binder = Binder::new(self.store);
        match &descriptor.plan {
            Plan::Select(plan) => self.fetch_select(descriptor, plan, values, order, window),
            Plan::Native(plan) => {
                let mut query = binder.native(descriptor, &plan.sql, values);
                query.sort = order.to_vec();
                query.pagination = window;
                let rows = self.store.execute_native(&query)?;
                Ok(match descriptor.projection {
                    Some(_) => rows,
                    None => rows
                        .into_iter()
                        .map(|row| self.native_entity_row(&descriptor.entity, row))
                        .collect(),
                })
            }
            Plan::Update(_) => Err(Error::binding(format!(
                "'{}' is a bulk update",
                descriptor.signature
            ))),
        }
    }

    fn fetch_select(
        &self,
        descriptor: &QueryDescriptor,
        plan: &SelectPlan,
        values: &[Value],
        order: &[OrderSpec],
        window: Option<Pagination>,
    ) -> Result<Vec<Row>> {
        let mut query = Binder::new(self.store).select(descriptor, plan, values)?;
        query.order.extend(order.iter().cloned());
        let window = limit_window(plan.limit, window);
        if window.is_some_and(|w| w.limit == 0) {
            return Ok(Vec::new());
        }

        match &plan.output {
            Output::Entity => {
                query.pagination = window;
                self.store.query(&query)
            }
            Output::Columns(columns) | Output::Constructor { columns, .. } => {
                for column in columns {
                    if let Some((relation, _)) = column.path.rsplit_once('.') {
                        let relation = relation.to_string();
                        if !query.fetch.contains(&relation) {
                            query.fetch.push(relation);
                        }
                    }
                }
                let distinct = query.distinct;
                query.distinct = false;
                query.columns = None;
                if !distinct {
                    query.pagination = window;
                }
                let mut rows: Vec<Row> = self
                    .store
                    .query(&query)?
                    .iter()
                    .map(|row| select_columns(row, columns))
                    .collect();
                if distinct {
                    let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
                    for row in rows {
                        if !unique.contains(&row) {
                            unique.push(row);
                        }
                    }
                    rows = match window {
                        Some(w) => unique
                            .into_iter()
                            .skip(w.offset as usize)
                            .take(w.limit as usize)
                            .collect(),
                        None => unique,
                    };
                }
                Ok(rows)
            }
            Output::Count => {
                let count = self.store.count(&query.for_count())?;
                Ok(vec![Row::new().with("count", count as i64)])
            }
        }
    }

    fn count_bound(&self, descriptor: &QueryDescriptor, values: &[Value]) -> Result<u64> {
        let binder = Binder::new(self.store);
        match &descriptor.plan {
            Plan::Select(plan) => {
                let query = binder.count(descriptor, &plan.count, values)?;
                let count = self.store.count(&query)?;
                Ok(match plan.limit {
                    Some(limit) => count.min(limit as u64),
                    None => count,
                })
            }
            Plan::Native(plan) => match &plan.count_sql {
                Some(sql) => {
                    let query = binder.native(descriptor, sql, values);
                    native_count(self.store, &query)
                }
                None => self
                    .store
                    .count_native(&binder.native(descriptor, &plan.sql, values)),
            },
            Plan::Update(_) => Err(Error::binding(format!(
                "'{}' is a bulk update",
                descriptor.signature
            ))),
        }
    }

    /// Rename native columns to the entity's field names.
    fn native_entity_row(&self, entity: &str, row: Row) -> Row {
        let Some(def) = self.catalog.find_entity(entity) else {
            return row;
        };
        let mut mapped = Row::new();
        for (column, value) in row.fields {
            match def.field_by_column(&column).or_else(|| def.field(&column)) {
                Some(field) => mapped.set(field.name.clone(), field.scalar.coerce(value)),
                None => mapped.set(column, value),
            }
        }
        mapped.relations = row.relations;
        mapped
    }
}

fn select_columns(row: &Row, columns: &[Column]) -> Row {
    let mut out = Row::new();
    for column in columns {
        let value = row.lookup(&column.path).cloned().unwrap_or(Value::Null);
        out.set(column.name.clone(), value);
    }
    out
}

/// Combine a `First<N>` limit with a requested window.
fn limit_window(limit: Option<u32>, window: Option<Pagination>) -> Option<Pagination> {
    match (limit, window) {
        (None, window) => window,
        (Some(limit), None) => Some(Pagination::limit(limit)),
        (Some(limit), Some(window)) => {
            let remaining = (limit as u64).saturating_sub(window.offset);
            Some(Pagination::new(
                window.limit.min(remaining.min(u32::MAX as u64) as u32),
                window.offset,
            ))
        }
    }
}

fn native_count(store: &dyn Store, query: &NativeQuery) -> Result<u64> {
    let rows = store.execute_native(query)?;
    let value = rows
        .first()
        .and_then(|row| row.fields.first())
        .map(|(_, value)| value.clone())
        .unwrap_or(Value::Int64(0));
    value
        .as_i64()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| Error::native(format!("count query returned {}", value.type_name())))
}
