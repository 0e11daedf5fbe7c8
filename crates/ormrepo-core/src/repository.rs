//! Typed repositories.
//!
//! A [`Repository`] borrows a session and offers the CRUD operations every
//! entity gets, plus execution of the query methods declared in the
//! entity's [`QueryTable`](crate::query::QueryTable).

use std::marker::PhantomData;
use std::sync::Arc;

use ormrepo_proto::{Row, Value};
use tracing::debug;

use crate::catalog::EntityDef;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::example::Example;
use crate::paging::{Page, PageRequest, Slice, Sort};
use crate::projection::Projection;
use crate::query::{Args, ProjectionSource, QueryDescriptor, QueryMethod, ResultShape};
use crate::session::Session;

/// CRUD and declared-query access to one entity type.
pub struct Repository<'s, E> {
    session: &'s mut Session,
    _entity: PhantomData<E>,
}

impl<'s, E: Entity> Repository<'s, E> {
    pub fn new(session: &'s mut Session) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    pub fn session(&mut self) -> &mut Session {
        &mut *self.session
    }

    fn definition(&self) -> Result<EntityDef> {
        Ok(self.session.catalog().entity(E::NAME)?.clone())
    }

    // ---- CRUD ----

    /// Insert a new entity or update an existing one; returns the stored
    /// state with any generated identity and audit stamps.
    pub fn save(&mut self, entity: &E) -> Result<E> {
        let def = self.definition()?;
        let stored = self.session.save_row(&def, entity.to_row(), entity.is_new())?;
        E::from_row(&stored)
    }

    pub fn save_all<'e, I>(&mut self, entities: I) -> Result<Vec<E>>
    where
        I: IntoIterator<Item = &'e E>,
        E: 'e,
    {
        entities.into_iter().map(|e| self.save(e)).collect()
    }

    /// Tracked state first, then the store.
    pub fn find_by_id(&mut self, id: impl Into<Value>) -> Result<Option<E>> {
        let def = self.definition()?;
        match self.session.find_row(&def, &id.into(), &[])? {
            Some(row) => Ok(Some(E::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Like [`find_by_id`](Self::find_by_id) but absence is an error.
    pub fn get_by_id(&mut self, id: impl Into<Value>) -> Result<E> {
        let id = id.into();
        self.find_by_id(id.clone())?.ok_or_else(|| Error::NotFound {
            entity: E::NAME.to_string(),
            id: id.to_string(),
        })
    }

    pub fn exists_by_id(&mut self, id: impl Into<Value>) -> Result<bool> {
        Ok(self.find_by_id(id)?.is_some())
    }

    pub fn find_all(&mut self) -> Result<Vec<E>> {
        self.find_all_sorted(&Sort::unsorted())
    }

    pub fn find_all_sorted(&mut self, sort: &Sort) -> Result<Vec<E>> {
        let descriptor = self.find_all_descriptor()?;
        let rows = self.session.executor().rows(&descriptor, &Args::new(), sort)?;
        self.entities(&descriptor, rows)
    }

    pub fn find_all_paged(&mut self, request: &PageRequest) -> Result<Page<E>> {
        self.session.check_page(request)?;
        let descriptor = self.find_all_descriptor()?;
        let page = self.session.executor().page(&descriptor, &Args::new(), request)?;
        let rows = self.session.track_rows(&descriptor, page.content().to_vec());
        let mut rows = rows.into_iter();
        page.try_map(|_| match rows.next() {
            Some(row) => E::from_row(&row),
            None => Err(Error::projection("page content changed while tracking")),
        })
    }

    pub fn count(&mut self) -> Result<u64> {
        let descriptor = self.session.builtin(E::NAME, QueryMethod::derived("count"))?;
        self.session.executor().count(&descriptor, &Args::new())
    }

    /// Delete an entity. Deleting an entity that was never saved does nothing.
    pub fn delete(&mut self, entity: &E) -> Result<()> {
        let id = entity.id();
        if id.is_null() {
            return Ok(());
        }
        self.delete_by_id(id)?;
        Ok(())
    }

    /// Returns whether a row existed.
    pub fn delete_by_id(&mut self, id: impl Into<Value>) -> Result<bool> {
        let def = self.definition()?;
        self.session.delete_row(&def, &id.into())
    }

    /// Delete every row, returning how many were removed.
    pub fn delete_all(&mut self) -> Result<u64> {
        let descriptor = self.find_all_descriptor()?;
        let rows = self
            .session
            .executor()
            .rows(&descriptor, &Args::new(), &Sort::unsorted())?;
        self.delete_rows(rows)
    }

    fn find_all_descriptor(&self) -> Result<Arc<QueryDescriptor>> {
        self.session
            .builtin(E::NAME, QueryMethod::derived("findAll").sorted())
    }

    // ---- query by example ----

    pub fn find_all_by_example(&mut self, example: &Example<E>) -> Result<Vec<E>> {
        let def = self.definition()?;
        let query = example.to_query(self.session.store(), &def)?;
        let rows = self.session.store().query(&query)?;
        rows.into_iter()
            .map(|row| E::from_row(&self.session.track(&def, row)))
            .collect()
    }

    /// At most one match; more is a cardinality error.
    pub fn find_one_by_example(&mut self, example: &Example<E>) -> Result<Option<E>> {
        let mut found = self.find_all_by_example(example)?;
        if found.len() > 1 {
            return Err(Error::Cardinality {
                operation: format!("{}.findOne(Example)", E::NAME),
                found: found.len(),
            });
        }
        Ok(found.pop())
    }

    pub fn count_by_example(&mut self, example: &Example<E>) -> Result<u64> {
        let def = self.definition()?;
        let query = example.to_query(self.session.store(), &def)?;
        self.session.store().count(&query)
    }

    pub fn exists_by_example(&mut self, example: &Example<E>) -> Result<bool> {
        Ok(self.count_by_example(example)? > 0)
    }

    // ---- declared query methods ----

    /// Every match of a list method.
    pub fn find_many(&mut self, method: &str, args: Args) -> Result<Vec<E>> {
        self.find_sorted(method, args, &Sort::unsorted())
    }

    /// Every match of a list method, with a caller-supplied ordering.
    pub fn find_sorted(&mut self, method: &str, args: Args, sort: &Sort) -> Result<Vec<E>> {
        let descriptor = self.entity_descriptor(method, &[ResultShape::Many])?;
        let rows = self.session.executor().rows(&descriptor, &args, sort)?;
        self.entities(&descriptor, rows)
    }

    /// The single match of a single-result method.
    pub fn find_one(&mut self, method: &str, args: Args) -> Result<Option<E>> {
        let descriptor = self.entity_descriptor(method, &[ResultShape::One])?;
        let row = self.session.executor().single(&descriptor, &args)?;
        Ok(self.entities(&descriptor, row.into_iter().collect())?.pop())
    }

    pub fn find_page(&mut self, method: &str, args: Args, request: &PageRequest) -> Result<Page<E>> {
        self.session.check_page(request)?;
        let descriptor = self.entity_descriptor(method, &[ResultShape::Page])?;
        let page = self.session.executor().page(&descriptor, &args, request)?;
        let rows = self.session.track_rows(&descriptor, page.content().to_vec());
        let mut rows = rows.into_iter();
        page.try_map(|_| match rows.next() {
            Some(row) => E::from_row(&row),
            None => Err(Error::projection("page content changed while tracking")),
        })
    }

    pub fn find_slice(
        &mut self,
        method: &str,
        args: Args,
        request: &PageRequest,
    ) -> Result<Slice<E>> {
        self.session.check_page(request)?;
        let descriptor = self.entity_descriptor(method, &[ResultShape::Slice])?;
        let slice = self.session.executor().slice(&descriptor, &args, request)?;
        let rows = self.session.track_rows(&descriptor, slice.content().to_vec());
        let mut rows = rows.into_iter();
        slice.try_map(|_| match rows.next() {
            Some(row) => E::from_row(&row),
            None => Err(Error::projection("slice content changed while tracking")),
        })
    }

    /// Values of a method selecting a single column (`select m.username ...`).
    pub fn find_values(&mut self, method: &str, args: Args) -> Result<Vec<Value>> {
        let descriptor = self.session.descriptor(E::NAME, method, None)?;
        expect_shape(&descriptor, &[ResultShape::Many])?;
        let rows = self
            .session
            .executor()
            .rows(&descriptor, &args, &Sort::unsorted())?;
        rows.into_iter()
            .map(|row| match row.fields.len() {
                1 => Ok(row.fields.into_iter().map(|(_, v)| v).next().unwrap_or(Value::Null)),
                n => Err(Error::binding(format!(
                    "'{}' selects {} columns, expected one",
                    descriptor.signature, n
                ))),
            })
            .collect()
    }

    /// Number of matches of a count method.
    pub fn count_by(&mut self, method: &str, args: Args) -> Result<u64> {
        let descriptor = self.session.descriptor(E::NAME, method, None)?;
        expect_shape(&descriptor, &[ResultShape::Count])?;
        self.session.executor().count(&descriptor, &args)
    }

    pub fn exists_by(&mut self, method: &str, args: Args) -> Result<bool> {
        let descriptor = self.session.descriptor(E::NAME, method, None)?;
        expect_shape(&descriptor, &[ResultShape::Exists])?;
        self.session.executor().exists(&descriptor, &args)
    }

    /// Delete every match of a delete method, returning how many went.
    pub fn delete_by(&mut self, method: &str, args: Args) -> Result<u64> {
        let descriptor = self.session.descriptor(E::NAME, method, None)?;
        expect_shape(&descriptor, &[ResultShape::Delete])?;
        let rows = self
            .session
            .executor()
            .rows(&descriptor, &args, &Sort::unsorted())?;
        self.delete_rows(rows)
    }

    /// Run a modifying method, returning the affected row count.
    pub fn execute(&mut self, method: &str, args: Args) -> Result<u64> {
        let descriptor = self.session.descriptor(E::NAME, method, None)?;
        if !matches!(descriptor.shape, ResultShape::Modifying { .. }) {
            return Err(shape_error(&descriptor, "an update count"));
        }
        self.session.execute_update(&descriptor, &args)
    }

    // ---- projections ----

    pub fn project_many<P: Projection>(&mut self, method: &str, args: Args) -> Result<Vec<P>> {
        let descriptor = self.projected_descriptor::<P>(method, &[ResultShape::Many])?;
        let rows = self
            .session
            .executor()
            .rows(&descriptor, &args, &Sort::unsorted())?;
        rows.iter().map(|row| self.project(&descriptor, row)).collect()
    }

    pub fn project_one<P: Projection>(&mut self, method: &str, args: Args) -> Result<Option<P>> {
        let descriptor = self.projected_descriptor::<P>(method, &[ResultShape::One])?;
        match self.session.executor().single(&descriptor, &args)? {
            Some(row) => Ok(Some(self.project(&descriptor, &row)?)),
            None => Ok(None),
        }
    }

    pub fn project_page<P: Projection>(
        &mut self,
        method: &str,
        args: Args,
        request: &PageRequest,
    ) -> Result<Page<P>> {
        self.session.check_page(request)?;
        let descriptor = self.projected_descriptor::<P>(method, &[ResultShape::Page])?;
        let page = self.session.executor().page(&descriptor, &args, request)?;
        page.try_map(|row| self.project(&descriptor, &row))
    }

    pub fn project_slice<P: Projection>(
        &mut self,
        method: &str,
        args: Args,
        request: &PageRequest,
    ) -> Result<Slice<P>> {
        self.session.check_page(request)?;
        let descriptor = self.projected_descriptor::<P>(method, &[ResultShape::Slice])?;
        let slice = self.session.executor().slice(&descriptor, &args, request)?;
        slice.try_map(|row| self.project(&descriptor, &row))
    }

    // ---- helpers ----

    fn entity_descriptor(&self, method: &str, shapes: &[ResultShape]) -> Result<Arc<QueryDescriptor>> {
        let descriptor = self.session.descriptor(E::NAME, method, None)?;
        expect_shape(&descriptor, shapes)?;
        if let Some(projection) = &descriptor.projection {
            return Err(Error::binding(format!(
                "'{}' returns '{}' projections, not '{}' entities",
                descriptor.signature, projection, E::NAME
            )));
        }
        Ok(descriptor)
    }

    /// Resolve a method for projection type `P`. Dynamically projected
    /// methods are resolved per projection type.
    fn projected_descriptor<P: Projection>(
        &self,
        method: &str,
        shapes: &[ResultShape],
    ) -> Result<Arc<QueryDescriptor>> {
        let dynamic = self
            .session
            .catalog()
            .queries(E::NAME)
            .and_then(|table| table.get(method))
            .is_some_and(|m| m.projection == ProjectionSource::Dynamic);
        let descriptor = self
            .session
            .descriptor(E::NAME, method, dynamic.then_some(P::NAME))?;
        expect_shape(&descriptor, shapes)?;
        match descriptor.projection.as_deref() {
            Some(name) if name == P::NAME => Ok(descriptor),
            Some(name) => Err(Error::binding(format!(
                "'{}' returns '{}', not '{}'",
                descriptor.signature, name, P::NAME
            ))),
            None => Err(Error::binding(format!(
                "'{}' returns entities, not '{}'",
                descriptor.signature,
                P::NAME
            ))),
        }
    }

    fn project<P: Projection>(&self, descriptor: &QueryDescriptor, row: &Row) -> Result<P> {
        let view = self.session.materialize(descriptor, row)?;
        P::from_view(&view)
    }

    fn entities(&mut self, descriptor: &QueryDescriptor, rows: Vec<Row>) -> Result<Vec<E>> {
        self.session
            .track_rows(descriptor, rows)
            .iter()
            .map(E::from_row)
            .collect()
    }

    fn delete_rows(&mut self, rows: Vec<Row>) -> Result<u64> {
        let def = self.definition()?;
        let ids: Vec<Value> = rows
            .iter()
            .filter_map(|row| row.get(&def.identity).cloned())
            .collect();
        let deleted = self.session.write(|store, tx, context| {
            let mut deleted = 0u64;
            for id in &ids {
                context.evict(&def.name, id);
                if store.delete(tx, &def.name, id)? {
                    deleted += 1;
                }
            }
            Ok(deleted)
        })?;
        debug!(entity = %def.name, deleted, "deleted matching entities");
        Ok(deleted)
    }
}

fn expect_shape(descriptor: &QueryDescriptor, shapes: &[ResultShape]) -> Result<()> {
    if shapes.contains(&descriptor.shape) {
        return Ok(());
    }
    let wanted = shapes.first().map(ResultShape::name).unwrap_or("a result");
    Err(shape_error(descriptor, wanted))
}

fn shape_error(descriptor: &QueryDescriptor, wanted: &str) -> Error {
    Error::binding(format!(
        "'{}' returns {}, not {}",
        descriptor.signature,
        descriptor.shape.name(),
        wanted
    ))
}
