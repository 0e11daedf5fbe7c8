//! Bulk mutation execution.

use tracing::debug;

use crate::context::PersistenceContext;
use crate::error::{Error, Result};
use crate::query::{Args, Binder, Plan, QueryDescriptor, ResultShape};
use crate::storage::{Store, TransactionId};

/// Runs set-based update statements.
///
/// Affected rows are never loaded as entities. When the descriptor asks for
/// it, the persistence context is cleared afterwards so later reads go back
/// to the store.
pub struct BulkMutationExecutor<'a> {
    store: &'a dyn Store,
}

impl<'a> BulkMutationExecutor<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Execute the update and return the affected row count.
    pub fn execute(
        &self,
        tx: TransactionId,
        descriptor: &QueryDescriptor,
        args: &Args,
        context: &mut PersistenceContext,
    ) -> Result<u64> {
        let (Plan::Update(plan), ResultShape::Modifying { clear }) =
            (&descriptor.plan, descriptor.shape)
        else {
            return Err(Error::binding(format!(
                "'{}' is not a modifying query",
                descriptor.signature
            )));
        };
        let binder = Binder::new(self.store);
        let values = binder.check(descriptor, args)?;
        let statement = binder.bulk(descriptor, plan, &values)?;
        let affected = self.store.execute_bulk(tx, &statement)?;
        debug!(signature = %descriptor.signature, affected, %tx, "executed bulk update");
        if clear {
            context.clear();
        }
        Ok(affected)
    }
}
