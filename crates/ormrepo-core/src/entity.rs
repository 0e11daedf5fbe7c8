//! Typed entities, relation references and auditing.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use ormrepo_proto::{Row, Value};
use parking_lot::RwLock;

use crate::catalog::{EntityDef, CREATED_BY, CREATED_DATE, LAST_MODIFIED_BY, LAST_MODIFIED_DATE};
use crate::error::{Error, Result};

/// A record type mapped by the catalog.
pub trait Entity: Sized + Clone {
    /// Catalog name.
    const NAME: &'static str;

    /// Mapping metadata.
    fn definition() -> EntityDef;

    /// Identity value; `Value::Null` until assigned.
    fn id(&self) -> Value;

    /// Whether the next save inserts. Defaults to "has no identity".
    fn is_new(&self) -> bool {
        self.id().is_null()
    }

    /// Field values, plus the rows of any loaded relations.
    fn to_row(&self) -> Row;

    /// Build the entity from a stored row.
    fn from_row(row: &Row) -> Result<Self>;
}

/// A many-to-one reference: the target's identity, and the target itself
/// once loaded.
///
/// References compare by identity only.
#[derive(Clone)]
pub struct Reference<T> {
    id: Value,
    value: Option<Box<T>>,
}

impl<T> Reference<T> {
    /// A null reference.
    pub fn none() -> Self {
        Self {
            id: Value::Null,
            value: None,
        }
    }

    /// A reference known only by identity; loaded on first access.
    pub fn id(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            value: None,
        }
    }

    pub fn id_value(&self) -> &Value {
        &self.id
    }

    pub fn is_null(&self) -> bool {
        self.id.is_null() && self.value.is_none()
    }

    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    /// The loaded target.
    pub fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }
}

impl<T: Entity> Reference<T> {
    /// A loaded reference to `target`.
    pub fn to(target: &T) -> Self {
        Self {
            id: target.id(),
            value: Some(Box::new(target.clone())),
        }
    }

    /// Read the relation `name` of `row`: the loaded target when fetched,
    /// otherwise the foreign key.
    pub fn from_row(row: &Row, name: &str, foreign_key: &str) -> Result<Self> {
        match row.relation(name) {
            Some(Some(target)) => Ok(Self::to(&T::from_row(target)?)),
            Some(None) => Ok(Self::none()),
            None => Ok(Self::id(row.get(foreign_key).cloned().unwrap_or(Value::Null))),
        }
    }

    /// Write the foreign key, and the target row when loaded, into `row`.
    pub fn write(&self, row: &mut Row, name: &str, foreign_key: &str) {
        row.set(foreign_key, self.id.clone());
        if let Some(target) = &self.value {
            row.set_relation(name, Some(target.to_row()));
        }
    }
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: fmt::Debug> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => f.debug_tuple("Reference").field(value).finish(),
            None => f.debug_tuple("Reference").field(&self.id).finish(),
        }
    }
}

/// Creation and modification stamps of an audited entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audit {
    /// Microseconds since the Unix epoch.
    pub created_date: Option<i64>,
    pub last_modified_date: Option<i64>,
    pub created_by: Option<String>,
    pub last_modified_by: Option<String>,
}

impl Audit {
    pub fn from_row(row: &Row) -> Self {
        let timestamp = |name: &str| row.get(name).and_then(|v| v.as_timestamp().or(v.as_i64()));
        let text = |name: &str| row.get(name).and_then(|v| v.as_str().map(str::to_string));
        Self {
            created_date: timestamp(CREATED_DATE),
            last_modified_date: timestamp(LAST_MODIFIED_DATE),
            created_by: text(CREATED_BY),
            last_modified_by: text(LAST_MODIFIED_BY),
        }
    }

    pub fn write(&self, row: &mut Row) {
        row.set(CREATED_DATE, self.created_date.map(Value::Timestamp).unwrap_or(Value::Null));
        row.set(
            LAST_MODIFIED_DATE,
            self.last_modified_date.map(Value::Timestamp).unwrap_or(Value::Null),
        );
        row.set(CREATED_BY, self.created_by.clone());
        row.set(LAST_MODIFIED_BY, self.last_modified_by.clone());
    }
}

/// Supplies the current auditor for `createdBy` / `lastModifiedBy`.
pub trait AuditorProvider: Send + Sync {
    fn current_auditor(&self) -> Option<String>;
}

/// An auditor provider returning a fixed name.
#[derive(Debug, Clone)]
pub struct FixedAuditor(pub String);

impl AuditorProvider for FixedAuditor {
    fn current_auditor(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// An auditor provider whose name can be changed at runtime, e.g. per
/// request.
#[derive(Debug, Default)]
pub struct SharedAuditor {
    current: RwLock<Option<String>>,
}

impl SharedAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, auditor: Option<String>) {
        *self.current.write() = auditor;
    }
}

impl AuditorProvider for SharedAuditor {
    fn current_auditor(&self) -> Option<String> {
        self.current.read().clone()
    }
}

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Stamp audit fields on a row about to be saved.
pub(crate) fn stamp_audit(row: &mut Row, inserting: bool, auditor: Option<String>) {
    let now = Value::Timestamp(current_timestamp());
    let auditor = auditor.map(Value::String).unwrap_or(Value::Null);
    if inserting || row.get(CREATED_DATE).map_or(true, Value::is_null) {
        row.set(CREATED_DATE, now.clone());
        row.set(CREATED_BY, auditor.clone());
    }
    row.set(LAST_MODIFIED_DATE, now);
    row.set(LAST_MODIFIED_BY, auditor);
}

/// Read a required field of a row.
pub fn required<'r>(row: &'r Row, entity: &str, field: &str) -> Result<&'r Value> {
    match row.get(field) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(Error::projection(format!(
            "'{}' row has no value for '{}'",
            entity, field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Member, Team};

    #[test]
    fn test_reference_equality_is_by_identity() {
        let team = Team::with_id(7, "teamA");
        assert_eq!(Reference::to(&team), Reference::<Team>::id(7i64));
        assert_ne!(Reference::to(&team), Reference::<Team>::none());
    }

    #[test]
    fn test_reference_from_row() {
        let row = Row::new().with("team_id", 7i64);
        let reference = Reference::<Team>::from_row(&row, "team", "team_id").unwrap();
        assert!(!reference.is_loaded());
        assert_eq!(reference.id_value(), &Value::Int64(7));

        let row = row.with_relation("team", Some(Team::with_id(7, "teamA").to_row()));
        let reference = Reference::<Team>::from_row(&row, "team", "team_id").unwrap();
        assert_eq!(reference.get().map(|t| t.name.as_str()), Some("teamA"));
    }

    #[test]
    fn test_shared_auditor_follows_updates() {
        let auditor = SharedAuditor::new();
        assert_eq!(auditor.current_auditor(), None);
        auditor.set(Some("alice".into()));
        assert_eq!(auditor.current_auditor().as_deref(), Some("alice"));
    }

    #[test]
    fn test_stamp_audit_keeps_creation_on_update() {
        let mut row = Member::new("memberA", 10).to_row();
        stamp_audit(&mut row, true, Some("alice".into()));
        let created = Audit::from_row(&row);
        assert_eq!(created.created_by.as_deref(), Some("alice"));
        assert!(created.created_date.is_some());

        stamp_audit(&mut row, false, Some("bob".into()));
        let updated = Audit::from_row(&row);
        assert_eq!(updated.created_by.as_deref(), Some("alice"));
        assert_eq!(updated.created_date, created.created_date);
        assert_eq!(updated.last_modified_by.as_deref(), Some("bob"));
    }
}
