//! Subscriber notification with dedup, debounce, and bounded deferral.
//!
//! Notifications attempted while a navigation lock is held are not
//! dropped: they park in a single pending slot and are retried on the
//! next attempt, up to a fixed number of deferrals, after which the
//! notification is forced through. A genuine route change is therefore
//! never permanently swallowed, and the force-through bound makes
//! termination a guarantee instead of a tuning accident.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::Route;

pub type RouteCallback = std::sync::Arc<dyn Fn(&Route) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub(super) struct Notifier {
  subscribers: Mutex<HashMap<SubscriptionId, RouteCallback>>,
  next_id: AtomicU64,
  /// Last delivered route and when, for the debounce window.
  last_delivered: Mutex<Option<(Route, Instant)>>,
  /// Route waiting out a navigation lock, with its deferral count.
  deferred: Mutex<Option<(Route, u32)>>,
  events: broadcast::Sender<Route>,
  debounce: Duration,
  max_deferrals: u32,
}

impl Notifier {
  pub fn new(debounce: Duration, max_deferrals: u32) -> Self {
    let (events, _) = broadcast::channel(16);
    Self {
      subscribers: Mutex::new(HashMap::new()),
      next_id: AtomicU64::new(0),
      last_delivered: Mutex::new(None),
      deferred: Mutex::new(None),
      events,
      debounce,
      max_deferrals,
    }
  }

  pub fn subscribe(&self, callback: RouteCallback) -> SubscriptionId {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
    if let Ok(mut subscribers) = self.subscribers.lock() {
      subscribers.insert(id, callback);
    }
    id
  }

  pub fn unsubscribe(&self, id: SubscriptionId) {
    if let Ok(mut subscribers) = self.subscribers.lock() {
      subscribers.remove(&id);
    }
  }

  pub fn watch(&self) -> broadcast::Receiver<Route> {
    self.events.subscribe()
  }

  /// Attempt to notify. While `locked` the route is deferred unless its
  /// deferral budget is spent, in which case it is forced through.
  pub fn notify(&self, route: Route, locked: bool) {
    if locked {
      let force = {
        let Ok(mut deferred) = self.deferred.lock() else {
          return;
        };
        let count = match deferred.take() {
          Some((_, count)) => count + 1,
          None => 1,
        };
        if count > self.max_deferrals {
          true
        } else {
          debug!(deferrals = count, "navigation locked, deferring notification");
          *deferred = Some((route.clone(), count));
          false
        }
      };

      if force {
        warn!("deferral budget spent, forcing route notification through");
        self.deliver(route);
      }
      return;
    }

    self.deliver(route);
  }

  /// Deliver whatever was deferred while the lock was held.
  pub fn flush(&self) {
    let pending = self
      .deferred
      .lock()
      .ok()
      .and_then(|mut deferred| deferred.take());
    if let Some((route, _)) = pending {
      self.deliver(route);
    }
  }

  fn deliver(&self, route: Route) {
    // Identical consecutive routes inside the debounce window are not
    // re-delivered; this collapses render feedback into one notification.
    {
      let Ok(mut last) = self.last_delivered.lock() else {
        return;
      };
      if let Some((prev, at)) = last.as_ref() {
        if *prev == route && at.elapsed() < self.debounce {
          debug!("suppressing duplicate route notification");
          return;
        }
      }
      *last = Some((route.clone(), Instant::now()));
    }

    // Callbacks run without any internal lock held, so a subscriber may
    // navigate re-entrantly.
    let callbacks: Vec<RouteCallback> = self
      .subscribers
      .lock()
      .map(|subscribers| subscribers.values().cloned().collect())
      .unwrap_or_default();

    for callback in callbacks {
      callback(&route);
    }

    // Platform-level change event; nobody listening is fine.
    let _ = self.events.send(route);
  }
}
