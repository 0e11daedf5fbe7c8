//! Units of work.
//!
//! Writes are applied to sled immediately; each unit of work keeps the
//! previous bytes of every key it touched so `rollback` can restore them.

use crate::error::{Result, StoreError};
use dashmap::DashMap;
use sled::Db;
use std::sync::atomic::{AtomicU64, Ordering};

use super::TransactionId;

/// One recorded write.
#[derive(Debug, Clone)]
struct UndoEntry {
    tree: String,
    key: Vec<u8>,
    previous: Option<Vec<u8>>,
}

/// Open units of work and their undo logs.
#[derive(Debug, Default)]
pub(crate) struct UndoLogs {
    next_id: AtomicU64,
    open: DashMap<u64, Vec<UndoEntry>>,
}

impl UndoLogs {
    /// Open a new unit of work.
    pub fn begin(&self) -> TransactionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.open.insert(id, Vec::new());
        TransactionId(id)
    }

    /// Record the previous value of a key before it is overwritten.
    pub fn record(
        &self,
        tx: TransactionId,
        tree: &str,
        key: &[u8],
        previous: Option<Vec<u8>>,
    ) -> Result<()> {
        let mut log = self
            .open
            .get_mut(&tx.0)
            .ok_or_else(|| StoreError::Transaction(format!("{} is not open", tx)))?;
        log.push(UndoEntry {
            tree: tree.to_string(),
            key: key.to_vec(),
            previous,
        });
        Ok(())
    }

    /// Check that a unit of work is open.
    pub fn ensure_open(&self, tx: TransactionId) -> Result<()> {
        if self.open.contains_key(&tx.0) {
            Ok(())
        } else {
            Err(StoreError::Transaction(format!("{} is not open", tx)).into())
        }
    }

    /// Discard the log. Returns the number of writes it held.
    pub fn commit(&self, tx: TransactionId) -> Result<usize> {
        self.open
            .remove(&tx.0)
            .map(|(_, log)| log.len())
            .ok_or_else(|| StoreError::Transaction(format!("{} is not open", tx)).into())
    }

    /// Restore every recorded key in reverse order. Returns the number of
    /// writes undone.
    pub fn rollback(&self, db: &Db, tx: TransactionId) -> Result<usize> {
        let (_, log) = self
            .open
            .remove(&tx.0)
            .ok_or_else(|| StoreError::Transaction(format!("{} is not open", tx)))?;
        let undone = log.len();
        for entry in log.into_iter().rev() {
            let tree = db.open_tree(&entry.tree)?;
            match entry.previous {
                Some(bytes) => {
                    tree.insert(entry.key, bytes)?;
                }
                None => {
                    tree.remove(entry.key)?;
                }
            }
        }
        Ok(undone)
    }

    /// Number of open units of work.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_restores_previous_values() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tree = db.open_tree("table:member").unwrap();
        tree.insert(b"a", b"old".to_vec()).unwrap();

        let logs = UndoLogs::default();
        let tx = logs.begin();
        logs.record(tx, "table:member", b"a", Some(b"old".to_vec())).unwrap();
        tree.insert(b"a", b"new".to_vec()).unwrap();
        logs.record(tx, "table:member", b"b", None).unwrap();
        tree.insert(b"b", b"added".to_vec()).unwrap();

        assert_eq!(logs.rollback(&db, tx).unwrap(), 2);
        assert_eq!(tree.get(b"a").unwrap().as_deref(), Some(&b"old"[..]));
        assert!(tree.get(b"b").unwrap().is_none());
        assert_eq!(logs.open_count(), 0);
    }

    #[test]
    fn test_finished_transaction_rejected() {
        let logs = UndoLogs::default();
        let tx = logs.begin();
        assert_eq!(logs.commit(tx).unwrap(), 0);
        assert!(logs.commit(tx).is_err());
        assert!(logs.record(tx, "t", b"k", None).is_err());
    }
}
