//! Cache-first composite reads with best-effort background sync.
//!
//! Orchestrates the read cache, the persistent store, and the request
//! client. Callers always get best-available data synchronously; network
//! refresh happens in the background and never blocks a read.

use crate::api::{unwrap_collection, ApiClient, RequestOptions};
use crate::store::Store;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::kinds::EntityKind;
use super::read_cache::ReadCache;

/// One composite read: every tracked collection plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
  pub clients: Vec<Value>,
  pub leads: Vec<Value>,
  pub projects: Vec<Value>,
  pub invoices: Vec<Value>,
  pub time_entries: Vec<Value>,
  /// True when every collection was served from a fresh cache entry.
  pub from_cache: bool,
}

impl Snapshot {
  pub fn get(&self, kind: EntityKind) -> &[Value] {
    match kind {
      EntityKind::Clients => &self.clients,
      EntityKind::Leads => &self.leads,
      EntityKind::Projects => &self.projects,
      EntityKind::Invoices => &self.invoices,
      EntityKind::TimeEntries => &self.time_entries,
    }
  }
}

#[derive(Clone)]
pub struct CacheService {
  cache: Arc<ReadCache>,
  store: Arc<Store>,
  api: Arc<ApiClient>,
}

impl CacheService {
  pub fn new(cache: Arc<ReadCache>, store: Arc<Store>, api: Arc<ApiClient>) -> Self {
    Self { cache, store, api }
  }

  pub fn cache(&self) -> &ReadCache {
    &self.cache
  }

  /// Composite read, cache first.
  ///
  /// If every tracked kind is fresh the snapshot comes straight from the
  /// cache with no I/O. Otherwise each kind falls back to the persistent
  /// store (leads are database-only and fall back to empty), the cache is
  /// seeded with the fallback data, and a background sync is kicked off
  /// for whatever is still worth refreshing. The sync only runs when a
  /// token is stored, since an unauthenticated sync can only fail.
  pub async fn load_with_cache_first(&self) -> Snapshot {
    let cached: Vec<Option<Vec<Value>>> = EntityKind::ALL
      .iter()
      .map(|&kind| self.cache.get(kind))
      .collect();

    if cached.iter().all(|c| c.is_some()) {
      debug!("all collections served from cache");
      let mut it = cached.into_iter().map(|c| c.unwrap_or_default());
      return Snapshot {
        clients: it.next().unwrap_or_default(),
        leads: it.next().unwrap_or_default(),
        projects: it.next().unwrap_or_default(),
        invoices: it.next().unwrap_or_default(),
        time_entries: it.next().unwrap_or_default(),
        from_cache: true,
      };
    }

    // Fall back to the persistent snapshots and seed the cache with them.
    let mut fallback: Vec<Vec<Value>> = Vec::with_capacity(EntityKind::ALL.len());
    for kind in EntityKind::ALL {
      let data: Vec<Value> = kind
        .store_key()
        .and_then(|key| self.store.get(key))
        .unwrap_or_default();
      self.cache.set(kind, data.clone());
      fallback.push(data);
    }

    if self.store.token().is_some() {
      let service = self.clone();
      tokio::spawn(async move {
        service.sync_with_api().await;
      });
    }

    let mut it = fallback.into_iter();
    Snapshot {
      clients: it.next().unwrap_or_default(),
      leads: it.next().unwrap_or_default(),
      projects: it.next().unwrap_or_default(),
      invoices: it.next().unwrap_or_default(),
      time_entries: it.next().unwrap_or_default(),
      from_cache: false,
    }
  }

  /// Refresh every stale collection from the backend.
  ///
  /// Each kind syncs independently; one failure never blocks or corrupts
  /// the others. A kind's entry ends up reflecting the most recently
  /// *completed* fetch, with no sequencing between overlapping syncs.
  pub async fn sync_with_api(&self) {
    let stale: Vec<EntityKind> = EntityKind::ALL
      .iter()
      .copied()
      .filter(|&kind| !self.cache.is_fresh(kind))
      .collect();

    if stale.is_empty() {
      return;
    }

    let tasks = stale.into_iter().map(|kind| async move {
      match self.api.request(kind.endpoint(), RequestOptions::get()).await {
        Ok(outcome) => {
          let Some(body) = outcome.into_value() else {
            return;
          };
          let records = unwrap_collection(kind, &body);
          if records.is_empty() {
            return;
          }
          self.cache.set(kind, records.clone());
          if let Some(key) = kind.store_key() {
            self.store.set(key, &records);
          }
          debug!(%kind, count = records.len(), "collection synced");
        }
        Err(e) => {
          warn!(%kind, error = %e, "background sync failed");
        }
      }
    });

    futures::future::join_all(tasks).await;
    debug!("background sync completed");
  }

  /// Bypass freshness and refetch one collection, writing through both
  /// caches. Degrades to the cached value when the fetch fails.
  pub async fn force_refresh(&self, kind: EntityKind) -> Vec<Value> {
    match self.api.request(kind.endpoint(), RequestOptions::get()).await {
      Ok(outcome) => match outcome.into_value() {
        Some(body) => {
          let records = unwrap_collection(kind, &body);
          self.cache.set(kind, records.clone());
          if let Some(key) = kind.store_key() {
            self.store.set(key, &records);
          }
          records
        }
        None => self.cache.get(kind).unwrap_or_default(),
      },
      Err(e) => {
        warn!(%kind, error = %e, "force refresh failed, serving cached data");
        self.cache.get(kind).unwrap_or_default()
      }
    }
  }
}
