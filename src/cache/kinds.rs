//! Entity collections tracked by the read cache.

use crate::store::StoreKey;
use serde::{Deserialize, Serialize};

/// A tracked entity collection. The record shape is opaque to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Clients,
  Leads,
  Projects,
  Invoices,
  TimeEntries,
}

impl EntityKind {
  pub const ALL: [EntityKind; 5] = [
    EntityKind::Clients,
    EntityKind::Leads,
    EntityKind::Projects,
    EntityKind::Invoices,
    EntityKind::TimeEntries,
  ];

  /// REST collection endpoint, relative to `{base}/api`.
  pub fn endpoint(&self) -> &'static str {
    match self {
      EntityKind::Clients => "/clients",
      EntityKind::Leads => "/leads",
      EntityKind::Projects => "/projects",
      EntityKind::Invoices => "/invoices",
      EntityKind::TimeEntries => "/time-entries",
    }
  }

  /// Key under which the backend nests the collection in response envelopes.
  pub fn envelope_key(&self) -> &'static str {
    match self {
      EntityKind::Clients => "clients",
      EntityKind::Leads => "leads",
      EntityKind::Projects => "projects",
      EntityKind::Invoices => "invoices",
      EntityKind::TimeEntries => "timeEntries",
    }
  }

  /// Key under which the backend nests a single record in write responses.
  pub fn singular_key(&self) -> &'static str {
    match self {
      EntityKind::Clients => "client",
      EntityKind::Leads => "lead",
      EntityKind::Projects => "project",
      EntityKind::Invoices => "invoice",
      EntityKind::TimeEntries => "timeEntry",
    }
  }

  /// Persistent snapshot slot. Leads are database-only and have none.
  pub fn store_key(&self) -> Option<StoreKey> {
    match self {
      EntityKind::Clients => Some(StoreKey::Clients),
      EntityKind::Leads => None,
      EntityKind::Projects => Some(StoreKey::Projects),
      EntityKind::Invoices => Some(StoreKey::Invoices),
      EntityKind::TimeEntries => Some(StoreKey::TimeEntries),
    }
  }
}

impl std::fmt::Display for EntityKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.envelope_key())
  }
}
