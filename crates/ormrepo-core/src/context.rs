//! Persistence context: the rows a session has already loaded or saved.

use std::collections::HashMap;

use ormrepo_proto::{Row, Value};
use tracing::debug;

use crate::storage::encode_identity;

/// Identity cache of one session.
///
/// Once a row is tracked, later reads of the same identity return the
/// tracked state instead of what the store returned, until the context is
/// cleared. Nothing is written back automatically.
#[derive(Debug, Default)]
pub struct PersistenceContext {
    rows: HashMap<(String, Vec<u8>), Row>,
}

impl PersistenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a fetched row and return the state callers should see.
    ///
    /// Relations loaded by the fetch but missing from the tracked state are
    /// merged in. Rows without a usable identity are returned unchanged.
    pub fn register(&mut self, entity: &str, identity: &str, row: Row) -> Row {
        let Some(key) = key_of(entity, identity, &row) else {
            return row;
        };
        match self.rows.get_mut(&key) {
            Some(tracked) => {
                for (name, relation) in row.relations {
                    if tracked.relation(&name).is_none() {
                        tracked.set_relation(name, relation);
                    }
                }
                tracked.clone()
            }
            None => {
                self.rows.insert(key, row.clone());
                row
            }
        }
    }

    /// Replace the tracked state after a save.
    pub fn store(&mut self, entity: &str, identity: &str, row: Row) {
        if let Some(key) = key_of(entity, identity, &row) {
            self.rows.insert(key, row);
        }
    }

    /// Tracked state of an identity.
    pub fn find(&self, entity: &str, id: &Value) -> Option<&Row> {
        let key = encode_identity(id).ok()?;
        self.rows.get(&(entity.to_string(), key))
    }

    /// Stop tracking an identity.
    pub fn evict(&mut self, entity: &str, id: &Value) {
        if let Ok(key) = encode_identity(id) {
            self.rows.remove(&(entity.to_string(), key));
        }
    }

    /// Stop tracking everything.
    pub fn clear(&mut self) {
        if !self.rows.is_empty() {
            debug!(tracked = self.rows.len(), "clearing persistence context");
        }
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn key_of(entity: &str, identity: &str, row: &Row) -> Option<(String, Vec<u8>)> {
    let id = row.get(identity)?;
    if id.is_null() {
        return None;
    }
    let key = encode_identity(id).ok()?;
    Some((entity.to_string(), key))
}
