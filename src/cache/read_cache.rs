//! Short-lived in-memory read cache.
//!
//! One entry per [`EntityKind`], each stamped at population time. An entry
//! is served only while younger than the freshness window; staleness is
//! binary and per-collection, never per-field. The window is deliberately
//! short so multi-user edits are not stale for long while re-render bursts
//! still collapse into a single round trip.

use super::kinds::EntityKind;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry {
  data: Vec<Value>,
  fetched_at: Instant,
}

/// Freshness report for one kind, mirrored into diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct KindStatus {
  pub cached: bool,
  pub fresh: bool,
  pub age: Option<Duration>,
}

pub struct ReadCache {
  entries: Mutex<HashMap<EntityKind, CacheEntry>>,
  freshness: Duration,
}

impl ReadCache {
  pub fn new(freshness: Duration) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      freshness,
    }
  }

  /// Cached records for `kind` if the entry is fresh, else `None`.
  /// No I/O, no blocking beyond the map lock.
  pub fn get(&self, kind: EntityKind) -> Option<Vec<Value>> {
    let entries = self.entries.lock().ok()?;
    let entry = entries.get(&kind)?;
    if entry.fetched_at.elapsed() < self.freshness {
      debug!(%kind, "serving from read cache");
      Some(entry.data.clone())
    } else {
      None
    }
  }

  /// Replace the cached records for `kind`, stamping them now.
  pub fn set(&self, kind: EntityKind, data: Vec<Value>) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.insert(
        kind,
        CacheEntry {
          data,
          fetched_at: Instant::now(),
        },
      );
    }
  }

  /// Wipe one kind, or everything when `kind` is `None`. Entries are
  /// invalidated wholesale, never partially.
  pub fn clear(&self, kind: Option<EntityKind>) {
    if let Ok(mut entries) = self.entries.lock() {
      match kind {
        Some(kind) => {
          entries.remove(&kind);
        }
        None => entries.clear(),
      }
    }
  }

  /// Whether the entry for `kind` is currently fresh.
  pub fn is_fresh(&self, kind: EntityKind) -> bool {
    self
      .entries
      .lock()
      .ok()
      .and_then(|entries| {
        entries
          .get(&kind)
          .map(|e| e.fetched_at.elapsed() < self.freshness)
      })
      .unwrap_or(false)
  }

  /// Per-kind freshness report.
  pub fn status(&self) -> HashMap<EntityKind, KindStatus> {
    let entries = match self.entries.lock() {
      Ok(entries) => entries,
      Err(_) => return HashMap::new(),
    };

    EntityKind::ALL
      .iter()
      .map(|&kind| {
        let status = match entries.get(&kind) {
          Some(entry) => {
            let age = entry.fetched_at.elapsed();
            KindStatus {
              cached: true,
              fresh: age < self.freshness,
              age: Some(age),
            }
          }
          None => KindStatus {
            cached: false,
            fresh: false,
            age: None,
          },
        };
        (kind, status)
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn records() -> Vec<Value> {
    vec![json!({"id": "1", "name": "Acme"})]
  }

  #[test]
  fn fresh_entry_is_served() {
    let cache = ReadCache::new(Duration::from_secs(5));
    cache.set(EntityKind::Clients, records());

    assert_eq!(cache.get(EntityKind::Clients), Some(records()));
    assert!(cache.is_fresh(EntityKind::Clients));
  }

  #[test]
  fn expired_entry_returns_none() {
    let cache = ReadCache::new(Duration::from_millis(30));
    cache.set(EntityKind::Leads, records());

    std::thread::sleep(Duration::from_millis(60));

    assert_eq!(cache.get(EntityKind::Leads), None);
    assert!(!cache.is_fresh(EntityKind::Leads));
  }

  #[test]
  fn zero_window_is_always_stale() {
    let cache = ReadCache::new(Duration::ZERO);
    cache.set(EntityKind::Projects, records());
    assert_eq!(cache.get(EntityKind::Projects), None);
  }

  #[test]
  fn unknown_kind_is_a_miss() {
    let cache = ReadCache::new(Duration::from_secs(5));
    assert_eq!(cache.get(EntityKind::Invoices), None);
  }

  #[test]
  fn set_refreshes_the_stamp() {
    let cache = ReadCache::new(Duration::from_millis(80));
    cache.set(EntityKind::Clients, records());
    std::thread::sleep(Duration::from_millis(50));

    // A new set restarts the window.
    cache.set(EntityKind::Clients, records());
    std::thread::sleep(Duration::from_millis(50));

    assert!(cache.get(EntityKind::Clients).is_some());
  }

  #[test]
  fn clear_one_kind_leaves_the_rest() {
    let cache = ReadCache::new(Duration::from_secs(5));
    cache.set(EntityKind::Clients, records());
    cache.set(EntityKind::Projects, records());

    cache.clear(Some(EntityKind::Clients));

    assert_eq!(cache.get(EntityKind::Clients), None);
    assert!(cache.get(EntityKind::Projects).is_some());
  }

  #[test]
  fn clear_all_wipes_everything() {
    let cache = ReadCache::new(Duration::from_secs(5));
    for kind in EntityKind::ALL {
      cache.set(kind, records());
    }

    cache.clear(None);

    for kind in EntityKind::ALL {
      assert_eq!(cache.get(kind), None);
    }
  }

  #[test]
  fn status_reports_cached_and_fresh() {
    let cache = ReadCache::new(Duration::from_secs(5));
    cache.set(EntityKind::Clients, records());

    let status = cache.status();
    assert!(status[&EntityKind::Clients].cached);
    assert!(status[&EntityKind::Clients].fresh);
    assert!(status[&EntityKind::Clients].age.is_some());
    assert!(!status[&EntityKind::Leads].cached);
  }
}
