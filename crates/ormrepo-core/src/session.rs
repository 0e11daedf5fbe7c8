//! Sessions: one unit of work and its persistence context.

use std::sync::Arc;

use ormrepo_proto::{Row, Value};
use tracing::{debug, warn};

use crate::bulk::BulkMutationExecutor;
use crate::catalog::{Catalog, EntityDef};
use crate::config::RepositoryConfig;
use crate::context::PersistenceContext;
use crate::entity::{stamp_audit, AuditorProvider, Entity, Reference};
use crate::error::{Error, Result, StoreError};
use crate::paging::{PageRequest, Sort};
use crate::projection::{ProjectionMaterializer, View};
use crate::query::{
    method_signature, query_signature, Args, DescriptorCache, DescriptorResolver, Output,
    QueryDescriptor, QueryExecutor, QueryMethod,
};
use crate::repository::Repository;
use crate::storage::{SledStore, StorageConfig, Store, TransactionId};

/// Shared, long-lived parts every session is opened from.
#[derive(Clone)]
pub struct SessionFactory {
    store: Arc<dyn Store>,
    catalog: Arc<Catalog>,
    cache: Arc<DescriptorCache>,
    config: RepositoryConfig,
    auditor: Option<Arc<dyn AuditorProvider>>,
}

impl SessionFactory {
    /// Build a factory over an existing store.
    pub fn new(store: Arc<dyn Store>, catalog: Arc<Catalog>, config: RepositoryConfig) -> Self {
        let cache = Arc::new(DescriptorCache::new(config.descriptor_cache_capacity));
        Self {
            store,
            catalog,
            cache,
            config,
            auditor: None,
        }
    }

    /// Open a sled store for the catalog and build a factory over it.
    pub fn open(
        storage: StorageConfig,
        config: RepositoryConfig,
        catalog: Catalog,
    ) -> Result<Self> {
        let catalog = Arc::new(catalog);
        let store = SledStore::open(storage, Arc::clone(&catalog))?;
        Ok(Self::new(Arc::new(store), catalog, config))
    }

    /// Supply `createdBy` / `lastModifiedBy` values.
    pub fn with_auditor(mut self, auditor: Arc<dyn AuditorProvider>) -> Self {
        self.auditor = Some(auditor);
        self
    }

    /// Open a session with an empty persistence context.
    pub fn open_session(&self) -> Session {
        Session {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            cache: Arc::clone(&self.cache),
            config: self.config.clone(),
            auditor: self.auditor.clone(),
            context: PersistenceContext::new(),
            tx: None,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<DescriptorCache> {
        &self.cache
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }
}

/// One caller's unit of work.
///
/// Writes outside an explicit transaction run in their own short
/// transaction. Sessions are not shared between threads.
pub struct Session {
    store: Arc<dyn Store>,
    catalog: Arc<Catalog>,
    cache: Arc<DescriptorCache>,
    config: RepositoryConfig,
    auditor: Option<Arc<dyn AuditorProvider>>,
    context: PersistenceContext,
    tx: Option<TransactionId>,
}

impl Session {
    /// A typed repository over this session.
    pub fn repository<E: Entity>(&mut self) -> Repository<'_, E> {
        Repository::new(self)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn context(&self) -> &PersistenceContext {
        &self.context
    }

    /// Forget every tracked row; later reads go back to the store.
    pub fn clear(&mut self) {
        self.context.clear();
    }

    /// Open an explicit transaction.
    pub fn begin(&mut self) -> Result<()> {
        if let Some(tx) = self.tx {
            return Err(StoreError::Transaction(format!("{} is already open", tx)).into());
        }
        self.tx = Some(self.store.begin()?);
        Ok(())
    }

    /// Commit the explicit transaction.
    pub fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Transaction("no open transaction".to_string()))?;
        self.store.commit(tx)
    }

    /// Roll back the explicit transaction. Tracked rows may reflect undone
    /// writes, so the persistence context is cleared too.
    pub fn rollback(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Transaction("no open transaction".to_string()))?;
        self.context.clear();
        self.store.rollback(tx)
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Run `f` in a transaction: commit on success, roll back on error.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    warn!(error = %rollback, "rollback after failure did not complete");
                }
                Err(e)
            }
        }
    }

    /// Run a write in the open transaction, or in its own one.
    pub(crate) fn write<T>(
        &mut self,
        f: impl FnOnce(&dyn Store, TransactionId, &mut PersistenceContext) -> Result<T>,
    ) -> Result<T> {
        let store = Arc::clone(&self.store);
        if let Some(tx) = self.tx {
            return f(store.as_ref(), tx, &mut self.context);
        }
        let tx = store.begin()?;
        match f(store.as_ref(), tx, &mut self.context) {
            Ok(value) => {
                store.commit(tx)?;
                Ok(value)
            }
            Err(e) => {
                self.context.clear();
                if let Err(rollback) = store.rollback(tx) {
                    warn!(%tx, error = %rollback, "rollback after failed write did not complete");
                }
                Err(e)
            }
        }
    }

    /// Descriptor of a declared method, resolved once per signature.
    pub fn descriptor(
        &self,
        entity: &str,
        method: &str,
        projection: Option<&str>,
    ) -> Result<Arc<QueryDescriptor>> {
        let signature = method_signature(entity, method, projection);
        self.cache.get_or_resolve(&signature, || {
            let declared = self
                .catalog
                .queries(entity)
                .and_then(|table| table.get(method))
                .ok_or_else(|| {
                    Error::resolution(format!(
                        "no query method '{}' declared for '{}'",
                        method, entity
                    ))
                })?;
            DescriptorResolver::new(&self.catalog).resolve(entity, declared, projection)
        })
    }

    /// Descriptor of a built-in repository operation. A method of the same
    /// name in the entity's query table overrides `default`.
    pub(crate) fn builtin(&self, entity: &str, default: QueryMethod) -> Result<Arc<QueryDescriptor>> {
        let signature = method_signature(entity, &default.name, None);
        self.cache.get_or_resolve(&signature, || {
            let method = self
                .catalog
                .queries(entity)
                .and_then(|table| table.get(&default.name))
                .unwrap_or(&default);
            DescriptorResolver::new(&self.catalog).resolve(entity, method, None)
        })
    }

    /// Descriptor of an ad-hoc explicit query.
    pub fn create_query(&self, text: &str, params: &[&str]) -> Result<Arc<QueryDescriptor>> {
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        self.cache.get_or_resolve(&query_signature(text), || {
            DescriptorResolver::new(&self.catalog).resolve_query(text, &params)
        })
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(self.store.as_ref(), &self.catalog)
    }

    /// Run an entity query and return the entities, tracked unless the
    /// query is read-only.
    pub fn list<E: Entity>(&mut self, descriptor: &QueryDescriptor, args: &Args) -> Result<Vec<E>> {
        let rows = self.executor().rows(descriptor, args, &Sort::unsorted())?;
        self.track_rows(descriptor, rows)
            .iter()
            .map(E::from_row)
            .collect()
    }

    /// Run a modifying descriptor.
    pub fn execute_update(&mut self, descriptor: &QueryDescriptor, args: &Args) -> Result<u64> {
        self.write(|store, tx, context| {
            BulkMutationExecutor::new(store).execute(tx, descriptor, args, context)
        })
    }

    /// Validate a page request against the configured maximum.
    pub fn check_page(&self, request: &PageRequest) -> Result<()> {
        if request.size() > self.config.max_page_size {
            return Err(Error::invalid_argument(format!(
                "page size {} exceeds the maximum of {}",
                request.size(),
                self.config.max_page_size
            )));
        }
        Ok(())
    }

    /// Default page request for callers that do not supply one.
    pub fn default_page(&self) -> Result<PageRequest> {
        PageRequest::of(0, self.config.default_page_size as i64)
    }

    /// Route fetched entity rows through the persistence context.
    pub(crate) fn track_rows(&mut self, descriptor: &QueryDescriptor, rows: Vec<Row>) -> Vec<Row> {
        let full_entities = descriptor.projection.is_none()
            && descriptor
                .select_plan()
                .map_or(true, |plan| plan.output == Output::Entity && plan.columns.is_none());
        if descriptor.read_only || !full_entities {
            return rows;
        }
        let Some(identity) = self
            .catalog
            .find_entity(&descriptor.entity)
            .map(|def| def.identity.clone())
        else {
            return rows;
        };
        rows.into_iter()
            .map(|row| self.context.register(&descriptor.entity, &identity, row))
            .collect()
    }

    pub(crate) fn track(&mut self, def: &EntityDef, row: Row) -> Row {
        self.context.register(&def.name, &def.identity, row)
    }

    /// Materialize the descriptor's projection over a fetched row.
    pub(crate) fn materialize(&self, descriptor: &QueryDescriptor, row: &Row) -> Result<View> {
        let name = descriptor.projection.as_deref().ok_or_else(|| {
            Error::binding(format!("'{}' is not a projecting query", descriptor.signature))
        })?;
        ProjectionMaterializer::new(self.catalog.projections()).materialize_named(name, row)
    }

    /// Fetch a row by identity, preferring tracked state.
    pub(crate) fn find_row(
        &mut self,
        def: &EntityDef,
        id: &Value,
        fetch: &[String],
    ) -> Result<Option<Row>> {
        if fetch.is_empty() {
            if let Some(row) = self.context.find(&def.name, id) {
                return Ok(Some(row.clone()));
            }
        }
        match self.store.find_by_id(&def.name, id, fetch)? {
            Some(row) => Ok(Some(self.track(def, row))),
            None => Ok(None),
        }
    }

    /// Insert or update a row, stamping audit fields when enabled.
    pub(crate) fn save_row(&mut self, def: &EntityDef, mut row: Row, is_new: bool) -> Result<Row> {
        if self.config.auditing && def.audited {
            let auditor = self.auditor.as_ref().and_then(|a| a.current_auditor());
            stamp_audit(&mut row, is_new, auditor);
        }
        let relations = std::mem::take(&mut row.relations);
        let mut stored = self.write(|store, tx, _| {
            if is_new {
                store.insert(tx, &def.name, row)
            } else {
                store.update(tx, &def.name, &row)?;
                Ok(row)
            }
        })?;
        stored.relations = relations;
        debug!(entity = %def.name, inserted = is_new, "saved entity");
        self.context.store(&def.name, &def.identity, stored.clone());
        Ok(stored)
    }

    /// Delete a row by identity. Returns whether it existed.
    pub(crate) fn delete_row(&mut self, def: &EntityDef, id: &Value) -> Result<bool> {
        let existed = self.write(|store, tx, context| {
            context.evict(&def.name, id);
            store.delete(tx, &def.name, id)
        })?;
        debug!(entity = %def.name, existed, "deleted entity");
        Ok(existed)
    }

    /// Load the target of a reference, from the reference itself when
    /// already loaded.
    pub fn resolve<T: Entity>(&mut self, reference: &Reference<T>) -> Result<Option<T>> {
        if let Some(target) = reference.get() {
            return Ok(Some(target.clone()));
        }
        if reference.id_value().is_null() {
            return Ok(None);
        }
        let def = self.catalog.entity(T::NAME)?.clone();
        match self.find_row(&def, reference.id_value(), &[])? {
            Some(row) => Ok(Some(T::from_row(&row)?)),
            None => Ok(None),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(%tx, "session dropped with an open transaction");
            if let Err(e) = self.store.rollback(tx) {
                warn!(error = %e, "rollback on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{self, Member};
    use crate::storage::{BoundClause, BulkStatement, NativeQuery, StoreQuery};
    use ormrepo_proto::FilterExpr;

    /// Sled store whose inserts and rollbacks always fail.
    struct BrokenStore(SledStore);

    impl Store for BrokenStore {
        fn translate(&self, clause: &BoundClause) -> Result<FilterExpr> {
            self.0.translate(clause)
        }

        fn query(&self, query: &StoreQuery) -> Result<Vec<Row>> {
            self.0.query(query)
        }

        fn count(&self, query: &StoreQuery) -> Result<u64> {
            self.0.count(query)
        }

        fn execute_bulk(&self, tx: TransactionId, statement: &BulkStatement) -> Result<u64> {
            self.0.execute_bulk(tx, statement)
        }

        fn execute_native(&self, query: &NativeQuery) -> Result<Vec<Row>> {
            self.0.execute_native(query)
        }

        fn count_native(&self, query: &NativeQuery) -> Result<u64> {
            self.0.count_native(query)
        }

        fn insert(&self, _tx: TransactionId, _entity: &str, _row: Row) -> Result<Row> {
            Err(StoreError::Constraint("insert refused".to_string()).into())
        }

        fn update(&self, tx: TransactionId, entity: &str, row: &Row) -> Result<()> {
            self.0.update(tx, entity, row)
        }

        fn delete(&self, tx: TransactionId, entity: &str, id: &Value) -> Result<bool> {
            self.0.delete(tx, entity, id)
        }

        fn find_by_id(&self, entity: &str, id: &Value, fetch: &[String]) -> Result<Option<Row>> {
            self.0.find_by_id(entity, id, fetch)
        }

        fn begin(&self) -> Result<TransactionId> {
            self.0.begin()
        }

        fn commit(&self, tx: TransactionId) -> Result<()> {
            self.0.commit(tx)
        }

        fn rollback(&self, _tx: TransactionId) -> Result<()> {
            Err(StoreError::Transaction("undo log unavailable".to_string()).into())
        }
    }

    #[test]
    fn test_failed_write_reports_write_error_when_rollback_fails() {
        let catalog = Arc::new(model::catalog());
        let store = SledStore::open(StorageConfig::temporary(), Arc::clone(&catalog)).unwrap();
        let factory = SessionFactory::new(
            Arc::new(BrokenStore(store)),
            catalog,
            RepositoryConfig::default(),
        );
        let mut session = factory.open_session();

        let err = session
            .repository::<Member>()
            .save(&Member::new("m1", 10))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Store(StoreError::Constraint(msg)) if msg == "insert refused"
        ));
        assert!(!session.in_transaction());
    }
}
