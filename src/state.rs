//! Observable-state integration contract.
//!
//! The request client can push confirmed results into an external state
//! store. That collaborator is injected at construction; when the host has
//! none, [`NoopStateSink`] stands in so call sites never branch on absence.

use crate::cache::EntityKind;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// External observable-state store fed by confirmed API results.
///
/// Mutations arrive only after the corresponding network call succeeded;
/// there is no optimistic-then-rollback path.
pub trait StateSink: Send + Sync {
  /// Replace the whole collection for `kind`.
  fn replace(&self, kind: EntityKind, records: Vec<Value>);

  /// Insert or update a single record, matched by its `id` field.
  fn merge(&self, kind: EntityKind, record: Value);

  /// Remove the record with the given `id`, if present.
  fn remove(&self, kind: EntityKind, id: &str);
}

/// Sink used when no external state store is attached.
pub struct NoopStateSink;

impl StateSink for NoopStateSink {
  fn replace(&self, _kind: EntityKind, _records: Vec<Value>) {}

  fn merge(&self, _kind: EntityKind, _record: Value) {}

  fn remove(&self, _kind: EntityKind, _id: &str) {}
}

/// Simple in-process state store, keyed by collection.
#[derive(Default)]
pub struct InMemoryState {
  collections: RwLock<HashMap<EntityKind, Vec<Value>>>,
}

impl InMemoryState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Current records for `kind` (empty when never populated).
  pub fn get(&self, kind: EntityKind) -> Vec<Value> {
    self
      .collections
      .read()
      .map(|c| c.get(&kind).cloned().unwrap_or_default())
      .unwrap_or_default()
  }
}

fn record_id(record: &Value) -> Option<String> {
  match &record["id"] {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

impl StateSink for InMemoryState {
  fn replace(&self, kind: EntityKind, records: Vec<Value>) {
    if let Ok(mut collections) = self.collections.write() {
      collections.insert(kind, records);
    }
  }

  fn merge(&self, kind: EntityKind, record: Value) {
    let Ok(mut collections) = self.collections.write() else {
      return;
    };
    let records = collections.entry(kind).or_default();

    let id = record_id(&record);
    let existing = id
      .as_deref()
      .and_then(|id| records.iter_mut().find(|r| record_id(r).as_deref() == Some(id)));

    match existing {
      Some(slot) => *slot = record,
      None => records.push(record),
    }
  }

  fn remove(&self, kind: EntityKind, id: &str) {
    if let Ok(mut collections) = self.collections.write() {
      if let Some(records) = collections.get_mut(&kind) {
        records.retain(|r| record_id(r).as_deref() != Some(id));
      }
    }
  }
}
