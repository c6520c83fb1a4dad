//! Client-side route state.
//!
//! Synchronizes a navigable address (path/query/hash) with an in-memory
//! route model, deduplicates redundant navigations, and notifies
//! subscribers. The address bar is the single source of truth: the route
//! is always derivable from it. History APIs are globally mutable and
//! re-entrant, so accepted navigations take a short-lived lock and
//! navigation storms (navigate -> render -> navigate feedback) are
//! counted and cut off at a small ceiling.

mod notifier;

pub use notifier::{RouteCallback, SubscriptionId};

use crate::config::RouteConfig;
use notifier::Notifier;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::form_urlencoded;

/// Legacy page alias kept for old bookmarks.
const LEGACY_ALIASES: [(&str, &str); 1] = [("crm", "clients")];

const DEFAULT_PAGE: &str = "dashboard";

/// Decomposed form of the current address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
  /// First path segment, normalized (legacy aliases rewritten).
  pub page: String,
  /// Remaining path parts, in order.
  pub segments: Vec<String>,
  /// Query parameters, merged from path and hash-route sources.
  pub search: BTreeMap<String, String>,
  /// Raw fragment, without the leading `#`.
  pub hash: String,
}

/// Navigable address storage. `MemoryHistory` stands in for a browser
/// address bar; an embedding host can provide its own.
pub trait History: Send + Sync {
  fn current(&self) -> String;
  fn push(&self, address: &str);
  fn replace(&self, address: &str);
}

/// In-memory address bar with a mutation counter.
pub struct MemoryHistory {
  address: Mutex<String>,
  mutations: AtomicUsize,
}

impl MemoryHistory {
  pub fn new(initial: &str) -> Self {
    Self {
      address: Mutex::new(initial.to_string()),
      mutations: AtomicUsize::new(0),
    }
  }

  /// History mutations (push + replace) since construction.
  pub fn mutation_count(&self) -> usize {
    self.mutations.load(Ordering::SeqCst)
  }

  /// Overwrite the address without counting a mutation, the way a
  /// back/forward event changes the bar from outside.
  pub fn set_external(&self, address: &str) {
    if let Ok(mut current) = self.address.lock() {
      *current = address.to_string();
    }
  }
}

impl History for MemoryHistory {
  fn current(&self) -> String {
    self.address.lock().map(|a| a.clone()).unwrap_or_default()
  }

  fn push(&self, address: &str) {
    if let Ok(mut current) = self.address.lock() {
      *current = address.to_string();
      self.mutations.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn replace(&self, address: &str) {
    // Replacing still mutates the bar, it just drops the back entry.
    if let Ok(mut current) = self.address.lock() {
      *current = address.to_string();
      self.mutations.fetch_add(1, Ordering::SeqCst);
    }
  }
}

/// Parameters for [`RouteState::navigate`]. Search and hash are preserved
/// from the current address unless explicitly supplied or preservation is
/// switched off.
#[derive(Debug, Clone)]
pub struct NavigateOptions {
  pub page: Option<String>,
  pub segments: Vec<String>,
  pub search: Option<BTreeMap<String, String>>,
  pub hash: Option<String>,
  pub replace: bool,
  pub preserve_search: bool,
  pub preserve_hash: bool,
}

impl Default for NavigateOptions {
  fn default() -> Self {
    Self {
      page: None,
      segments: Vec::new(),
      search: None,
      hash: None,
      replace: false,
      preserve_search: true,
      preserve_hash: true,
    }
  }
}

impl NavigateOptions {
  pub fn page(page: impl Into<String>) -> Self {
    Self {
      page: Some(page.into()),
      ..Self::default()
    }
  }

  pub fn with_segments<I, S>(mut self, segments: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.segments = segments.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_search(mut self, search: BTreeMap<String, String>) -> Self {
    self.search = Some(search);
    self
  }

  pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
    self.hash = Some(hash.into());
    self
  }

  pub fn replacing(mut self) -> Self {
    self.replace = true;
    self
  }
}

/// What a `navigate` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateResult {
  /// History was mutated and subscribers notified.
  Navigated,
  /// The target was equivalent to the current address; no history
  /// mutation, subscribers notified only if the derived route changed.
  Unchanged,
  /// Identical target while the navigation lock was held.
  IgnoredDuplicate,
  /// Distinct-target ceiling exceeded while locked.
  Dropped,
}

struct NavLock {
  engaged_at: Option<Instant>,
  target: String,
  distinct_attempts: u32,
}

pub struct RouteState {
  history: Arc<dyn History>,
  notifier: Notifier,
  lock: Mutex<NavLock>,
  lock_release: Duration,
  max_locked_attempts: u32,
}

impl RouteState {
  pub fn new(history: Arc<dyn History>, tuning: &RouteConfig) -> Self {
    Self {
      history,
      notifier: Notifier::new(
        Duration::from_millis(tuning.debounce_ms),
        tuning.max_notify_deferrals,
      ),
      lock: Mutex::new(NavLock {
        engaged_at: None,
        target: String::new(),
        distinct_attempts: 0,
      }),
      lock_release: Duration::from_millis(tuning.lock_release_ms),
      max_locked_attempts: tuning.max_locked_attempts,
    }
  }

  /// Derive the route from the current address. A hash-encoded route
  /// (`#/page/segs?query`) takes precedence over the plain path; query
  /// parameters are merged from both sources, hash winning on conflict.
  pub fn get_route(&self) -> Route {
    parse_address(&self.history.current())
  }

  /// Navigate to a composed target address.
  pub fn navigate(&self, options: NavigateOptions) -> NavigateResult {
    self.release_expired_lock();

    let current_address = self.history.current();
    let current_route = parse_address(&current_address);
    let target = compose_address(&current_address, &current_route, &options);
    let target_route = parse_address(&target);

    let locked = {
      let Ok(mut lock) = self.lock.lock() else {
        return NavigateResult::Dropped;
      };
      match lock.engaged_at {
        Some(_) if lock.target == target => {
          debug!(%target, "navigation locked, ignoring duplicate target");
          return NavigateResult::IgnoredDuplicate;
        }
        Some(_) => {
          lock.distinct_attempts += 1;
          if lock.distinct_attempts > self.max_locked_attempts {
            warn!(
              %target,
              attempts = lock.distinct_attempts,
              "navigation storm detected, dropping navigation"
            );
            return NavigateResult::Dropped;
          }
          true
        }
        None => false,
      }
    };

    if routes_equivalent(&target_route, &current_route) {
      // Equivalent address: no history mutation, but a derived-route
      // difference (e.g. alias rewrite) must still reach subscribers.
      self.notifier.notify(target_route, locked);
      return NavigateResult::Unchanged;
    }

    if options.replace {
      self.history.replace(&target);
    } else {
      self.history.push(&target);
    }

    {
      if let Ok(mut lock) = self.lock.lock() {
        lock.engaged_at = Some(Instant::now());
        lock.target = target;
      }
    }

    // The accepted transition's own notification is never deferred.
    self.notifier.notify(target_route, false);
    NavigateResult::Navigated
  }

  /// Keep the current page, change the remaining path parts.
  pub fn set_subpath_for_current_page<I, S>(&self, segments: I) -> NavigateResult
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let page = self.get_route().page;
    self.navigate(NavigateOptions::page(page).with_segments(segments))
  }

  /// Jump to a page with the given path parts.
  pub fn set_page_subpath<I, S>(&self, page: &str, segments: I) -> NavigateResult
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.navigate(NavigateOptions::page(page).with_segments(segments))
  }

  /// Entry point for back/forward events: the address changed from
  /// outside, re-derive and notify.
  pub fn handle_history_change(&self) {
    self.release_expired_lock();
    let locked = self
      .lock
      .lock()
      .map(|lock| lock.engaged_at.is_some())
      .unwrap_or(false);
    self.notifier.notify(self.get_route(), locked);
  }

  /// Register a listener for accepted navigations and history changes.
  pub fn subscribe(&self, callback: RouteCallback) -> SubscriptionId {
    self.notifier.subscribe(callback)
  }

  pub fn unsubscribe(&self, id: SubscriptionId) {
    self.notifier.unsubscribe(id)
  }

  /// Platform-level change events, for listeners outside the subscriber
  /// list.
  pub fn watch(&self) -> broadcast::Receiver<Route> {
    self.notifier.watch()
  }

  fn release_expired_lock(&self) {
    let released = {
      let Ok(mut lock) = self.lock.lock() else {
        return;
      };
      match lock.engaged_at {
        Some(at) if at.elapsed() >= self.lock_release => {
          lock.engaged_at = None;
          lock.distinct_attempts = 0;
          lock.target.clear();
          true
        }
        _ => false,
      }
    };

    if released {
      self.notifier.flush();
    }
  }
}

/// Compose a canonical path from page and segments: slashes collapsed, no
/// empty segments, no trailing slash except root.
pub fn build_path(page: &str, segments: &[String]) -> String {
  let page = if page.trim().is_empty() {
    DEFAULT_PAGE
  } else {
    page
  };

  let mut parts: Vec<String> = Vec::new();
  for raw in std::iter::once(page.to_string()).chain(segments.iter().cloned()) {
    for part in raw.split('/') {
      let part = part.trim();
      if !part.is_empty() {
        parts.push(part.to_string());
      }
    }
  }

  if parts.is_empty() {
    "/".to_string()
  } else {
    format!("/{}", parts.join("/"))
  }
}

fn apply_alias(page: &str) -> String {
  for (alias, canonical) in LEGACY_ALIASES {
    if page == alias {
      return canonical.to_string();
    }
  }
  page.to_string()
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
  form_urlencoded::parse(query.as_bytes())
    .map(|(k, v)| (k.into_owned(), v.into_owned()))
    .collect()
}

fn split_path_query(address: &str) -> (&str, &str) {
  match address.split_once('?') {
    Some((path, query)) => (path, query),
    None => (address, ""),
  }
}

fn path_segments(path: &str) -> Vec<String> {
  path
    .split('/')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

/// Parse an address of the form `/page/segs?query#fragment`. A fragment
/// starting with `/` encodes its own route and takes precedence over the
/// plain path.
pub fn parse_address(address: &str) -> Route {
  let (without_hash, fragment) = match address.split_once('#') {
    Some((addr, fragment)) => (addr, fragment),
    None => (address, ""),
  };

  let (path, query) = split_path_query(without_hash);
  let mut search = parse_query(query);

  let segments = if let Some(hash_route) = fragment.strip_prefix('/') {
    let (hash_path, hash_query) = split_path_query(hash_route);
    // Hash parameters win on conflict.
    search.extend(parse_query(hash_query));
    path_segments(hash_path)
  } else {
    path_segments(path)
  };

  let page = segments
    .first()
    .map(|s| apply_alias(s))
    .unwrap_or_else(|| DEFAULT_PAGE.to_string());

  Route {
    page,
    segments: segments.into_iter().skip(1).collect(),
    search,
    hash: fragment.to_string(),
  }
}

fn serialize_query(search: &BTreeMap<String, String>) -> String {
  if search.is_empty() {
    return String::new();
  }
  let mut serializer = form_urlencoded::Serializer::new(String::new());
  for (key, value) in search {
    serializer.append_pair(key, value);
  }
  serializer.finish()
}

fn compose_address(current_address: &str, current: &Route, options: &NavigateOptions) -> String {
  let page = options
    .page
    .clone()
    .filter(|p| !p.trim().is_empty())
    .unwrap_or_else(|| current.page.clone());

  let path = build_path(&page, &options.segments);

  let query = match &options.search {
    Some(search) => serialize_query(search),
    None if options.preserve_search => {
      let (without_hash, _) = match current_address.split_once('#') {
        Some((addr, fragment)) => (addr, fragment),
        None => (current_address, ""),
      };
      split_path_query(without_hash).1.to_string()
    }
    None => String::new(),
  };

  let hash = match &options.hash {
    Some(hash) => hash.trim_start_matches('#').to_string(),
    None if options.preserve_hash => match current_address.split_once('#') {
      // A fragment starting with '/' encodes its own route and would
      // override the composed path on the next parse. Legacy hash routes
      // are never carried onto a new target.
      Some((_, fragment)) if !fragment.starts_with('/') => fragment.to_string(),
      _ => String::new(),
    },
    None => String::new(),
  };

  let mut address = path;
  if !query.is_empty() {
    address.push('?');
    address.push_str(&query);
  }
  if !hash.is_empty() {
    address.push('#');
    address.push_str(&hash);
  }
  address
}

/// Address equivalence, modulo trailing slashes and query order: both
/// sides are compared in parsed form.
fn routes_equivalent(a: &Route, b: &Route) -> bool {
  a == b
}
