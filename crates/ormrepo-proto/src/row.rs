//! Row type exchanged between the store and the repository layer.

use crate::error::Error;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A fetched row: scalar fields in column order plus any eagerly loaded
/// many-to-one relations.
///
/// A relation entry of `None` means the relation was loaded and is null; a
/// relation that was never loaded has no entry at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Scalar fields as `(name, value)` pairs.
    pub fields: Vec<(String, Value)>,
    /// Loaded relations as `(relation name, target row)` pairs.
    pub relations: Vec<(String, Option<Row>)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Row::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder form of [`Row::set_relation`].
    pub fn with_relation(mut self, name: impl Into<String>, row: Option<Row>) -> Self {
        self.set_relation(name, row);
        self
    }

    /// Set a scalar field, replacing an existing value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Attach a loaded relation, replacing an earlier one of the same name.
    pub fn set_relation(&mut self, name: impl Into<String>, row: Option<Row>) {
        let name = name.into();
        match self.relations.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = row,
            None => self.relations.push((name, row)),
        }
    }

    /// Get a scalar field of this row.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Check whether a scalar field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get a loaded relation.
    ///
    /// Returns `None` when the relation was not loaded, `Some(None)` when it
    /// was loaded and is null.
    pub fn relation(&self, name: &str) -> Option<Option<&Row>> {
        self.relations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r.as_ref())
    }

    /// Remove a loaded relation, returning it.
    pub fn take_relation(&mut self, name: &str) -> Option<Option<Row>> {
        let pos = self.relations.iter().position(|(n, _)| n == name)?;
        Some(self.relations.remove(pos).1)
    }

    /// Resolve a dotted path such as `team.name`.
    ///
    /// Returns `None` if any hop is missing, unloaded or null.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            None => self.get(path),
            Some((head, rest)) => self.relation(head)??.lookup(rest),
        }
    }

    /// Keep only the named scalar fields, in the given order.
    pub fn narrow(&mut self, names: &[String]) {
        let mut kept = Vec::with_capacity(names.len());
        for name in names {
            if let Some(pos) = self.fields.iter().position(|(n, _)| n == name) {
                kept.push(self.fields.swap_remove(pos));
            }
        }
        self.fields = kept;
    }

    /// Names of the scalar fields in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Number of scalar fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the row has no scalar fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Archived form of one scalar field. Relations are never stored inline.
#[derive(Debug, Clone, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct StoredField {
    name: String,
    value: Value,
}

impl Row {
    /// Encode the scalar fields with rkyv. Loaded relations are dropped.
    pub fn encode_fields(&self) -> Result<Vec<u8>, Error> {
        let stored: Vec<StoredField> = self
            .fields
            .iter()
            .map(|(name, value)| StoredField {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        rkyv::to_bytes::<rkyv::rancor::Error>(&stored)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a row previously written by [`Row::encode_fields`].
    pub fn decode_fields(bytes: &[u8]) -> Result<Self, Error> {
        let stored = rkyv::from_bytes::<Vec<StoredField>, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(Row {
            fields: stored.into_iter().map(|f| (f.name, f.value)).collect(),
            relations: Vec::new(),
        })
    }
}
