//! Session wiring.
//!
//! A [`Session`] owns the whole data-sync stack for one authenticated
//! user: persistent store, request client, read cache, and route state.
//! Everything is constructed here and handed out as shared handles, so
//! the components carry no global state and a test can stand up as many
//! independent sessions as it likes.

use crate::api::ApiClient;
use crate::cache::{CacheService, ReadCache};
use crate::config::Config;
use crate::route::{History, MemoryHistory, RouteState};
use crate::state::StateSink;
use crate::store::Store;
use color_eyre::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct SessionBuilder {
  config: Config,
  store: Option<Arc<Store>>,
  history: Option<Arc<dyn History>>,
  state_sink: Option<Arc<dyn StateSink>>,
  probe: bool,
}

impl SessionBuilder {
  pub fn new(config: Config) -> Self {
    Self {
      config,
      store: None,
      history: None,
      state_sink: None,
      probe: true,
    }
  }

  /// Use an already-open store instead of the default on-disk one.
  pub fn store(mut self, store: Arc<Store>) -> Self {
    self.store = Some(store);
    self
  }

  /// Open the store at the given path.
  pub fn store_path(mut self, path: &Path) -> Result<Self> {
    self.store = Some(Arc::new(Store::open_at(path)?));
    Ok(self)
  }

  /// Use the host's address bar instead of the in-memory default.
  pub fn history(mut self, history: Arc<dyn History>) -> Self {
    self.history = Some(history);
    self
  }

  /// Forward server responses into the host's in-memory state.
  pub fn state_sink(mut self, sink: Arc<dyn StateSink>) -> Self {
    self.state_sink = Some(sink);
    self
  }

  /// Skip the background liveness probe. Tests use this to keep the
  /// runtime quiet.
  pub fn without_probe(mut self) -> Self {
    self.probe = false;
    self
  }

  pub fn build(self) -> Result<Session> {
    let store = match self.store {
      Some(store) => store,
      None => Arc::new(Store::open()?),
    };

    let mut api = ApiClient::new(&self.config, Arc::clone(&store))?;
    if let Some(sink) = self.state_sink {
      api = api.with_state_sink(sink);
    }
    let api = Arc::new(api);

    let cache = Arc::new(ReadCache::new(self.config.freshness_window()));
    let cache_service = CacheService::new(Arc::clone(&cache), Arc::clone(&store), Arc::clone(&api));

    let history = self
      .history
      .unwrap_or_else(|| Arc::new(MemoryHistory::new("/")) as Arc<dyn History>);
    let route = Arc::new(RouteState::new(Arc::clone(&history), &self.config.route));

    let probe = if self.probe {
      Some(api.spawn_liveness_probe())
    } else {
      None
    };

    debug!("session created");
    Ok(Session {
      store,
      api,
      cache,
      cache_service,
      route,
      probe,
    })
  }
}

pub struct Session {
  store: Arc<Store>,
  api: Arc<ApiClient>,
  cache: Arc<ReadCache>,
  cache_service: CacheService,
  route: Arc<RouteState>,
  probe: Option<JoinHandle<()>>,
}

impl Session {
  /// Full default wiring: on-disk store, in-memory history, liveness
  /// probe running.
  pub fn create(config: Config) -> Result<Self> {
    SessionBuilder::new(config).build()
  }

  pub fn builder(config: Config) -> SessionBuilder {
    SessionBuilder::new(config)
  }

  pub fn store(&self) -> &Arc<Store> {
    &self.store
  }

  pub fn api(&self) -> &Arc<ApiClient> {
    &self.api
  }

  pub fn cache(&self) -> &Arc<ReadCache> {
    &self.cache
  }

  pub fn cache_service(&self) -> &CacheService {
    &self.cache_service
  }

  pub fn route(&self) -> &Arc<RouteState> {
    &self.route
  }

  /// Stop the background probe and drop queued work. The store stays
  /// intact so the next session resumes from the persisted snapshots.
  pub fn dispose(mut self) {
    if let Some(probe) = self.probe.take() {
      probe.abort();
    }
    self.api.clear_queue();
    debug!("session disposed");
  }
}

impl Drop for Session {
  fn drop(&mut self) {
    if let Some(probe) = self.probe.take() {
      probe.abort();
    }
  }
}
