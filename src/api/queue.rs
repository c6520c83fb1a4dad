//! Offline request queue.
//!
//! While connectivity is down every submitted request lands here instead of
//! the network. The queue is drained once connectivity returns: highest
//! priority first, then submission order.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a unique request token, readable in logs and `X-Request-ID`.
pub fn generate_request_id() -> String {
  format!(
    "req_{}_{}",
    Utc::now().timestamp_millis(),
    REQUEST_SEQ.fetch_add(1, Ordering::SeqCst)
  )
}

/// Drain priority. Higher variants are replayed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
  Low,
  #[default]
  Normal,
  High,
}

/// A request held for later replay, or in flight right now.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
  pub id: String,
  pub endpoint: String,
  pub method: Method,
  pub payload: Option<Value>,
  pub priority: Priority,
  pub retry: bool,
  pub queued_at: DateTime<Utc>,
  /// Monotonic submission order; breaks ties between equal timestamps.
  pub seq: u64,
  pub retry_count: u32,
}

impl QueuedRequest {
  pub fn new(
    endpoint: &str,
    method: Method,
    payload: Option<Value>,
    priority: Priority,
    retry: bool,
  ) -> Self {
    Self {
      id: generate_request_id(),
      endpoint: endpoint.to_string(),
      method,
      payload,
      priority,
      retry,
      queued_at: Utc::now(),
      seq: REQUEST_SEQ.fetch_add(1, Ordering::SeqCst),
      retry_count: 0,
    }
  }
}

#[derive(Default)]
pub struct OfflineQueue {
  inner: Mutex<Vec<QueuedRequest>>,
}

impl OfflineQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, request: QueuedRequest) {
    if let Ok(mut queue) = self.inner.lock() {
      queue.push(request);
    }
  }

  pub fn len(&self) -> usize {
    self.inner.lock().map(|q| q.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, request_id: &str) -> bool {
    self
      .inner
      .lock()
      .map(|q| q.iter().any(|r| r.id == request_id))
      .unwrap_or(false)
  }

  /// Take every pending request, sorted by priority then submission order.
  pub fn drain_sorted(&self) -> Vec<QueuedRequest> {
    let Ok(mut queue) = self.inner.lock() else {
      return Vec::new();
    };
    let mut pending: Vec<QueuedRequest> = queue.drain(..).collect();
    pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    pending
  }

  pub fn clear(&self) {
    if let Ok(mut queue) = self.inner.lock() {
      queue.clear();
    }
  }
}
