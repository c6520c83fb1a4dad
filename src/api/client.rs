//! Resilient request client.
//!
//! Wraps outbound HTTP with bearer-token injection, per-request timeout
//! (a real abort, not a race), exponential-backoff retry, and
//! connectivity-aware queuing. While offline every request is accepted
//! into the queue and the caller gets a [`ApiOutcome::Queued`] receipt;
//! the queue is replayed in priority batches once connectivity returns.

use crate::config::{Config, RetryConfig};
use crate::error::ApiError;
use crate::state::{NoopStateSink, StateSink};
use crate::store::Store;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::queue::{OfflineQueue, Priority, QueuedRequest};

const BODY_EXCERPT_LEN: usize = 100;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Two-value connectivity flag, updated by [`ApiClient::check_connection`]
/// and the explicit transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

/// Exponential backoff schedule for retryable failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
  pub multiplier: u32,
}

impl RetryPolicy {
  pub fn from_config(config: &RetryConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      base_delay: Duration::from_millis(config.base_delay_ms),
      max_delay: Duration::from_millis(config.max_delay_ms),
      multiplier: config.backoff_multiplier,
    }
  }

  /// Delay before retry number `attempt` (1-based): `base * multiplier^(attempt-1)`,
  /// capped at `max_delay`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = (self.multiplier as u64).saturating_pow(exponent);
    let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(delay_ms).min(self.max_delay)
  }
}

/// Per-request options. `timeout = None` uses the configured default.
#[derive(Debug, Clone)]
pub struct RequestOptions {
  pub method: Method,
  pub data: Option<Value>,
  pub retry: bool,
  pub timeout: Option<Duration>,
  pub priority: Priority,
}

impl Default for RequestOptions {
  fn default() -> Self {
    Self {
      method: Method::GET,
      data: None,
      retry: true,
      timeout: None,
      priority: Priority::Normal,
    }
  }
}

impl RequestOptions {
  pub fn get() -> Self {
    Self::default()
  }

  pub fn post(data: Value) -> Self {
    Self {
      method: Method::POST,
      data: Some(data),
      ..Self::default()
    }
  }

  pub fn patch(data: Value) -> Self {
    Self {
      method: Method::PATCH,
      data: Some(data),
      ..Self::default()
    }
  }

  pub fn put(data: Value) -> Self {
    Self {
      method: Method::PUT,
      data: Some(data),
      ..Self::default()
    }
  }

  pub fn delete() -> Self {
    Self {
      method: Method::DELETE,
      ..Self::default()
    }
  }

  pub fn with_priority(mut self, priority: Priority) -> Self {
    self.priority = priority;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn without_retry(mut self) -> Self {
    self.retry = false;
    self
  }
}

/// Result of an accepted request.
///
/// `Queued` means "accepted, not yet confirmed": the request sits in the
/// offline queue and will be replayed when connectivity returns.
#[derive(Debug, Clone)]
pub enum ApiOutcome {
  Completed(Value),
  Queued { request_id: String },
}

impl ApiOutcome {
  pub fn is_queued(&self) -> bool {
    matches!(self, ApiOutcome::Queued { .. })
  }

  pub fn into_value(self) -> Option<Value> {
    match self {
      ApiOutcome::Completed(value) => Some(value),
      ApiOutcome::Queued { .. } => None,
    }
  }
}

/// Diagnostic snapshot of the client.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
  pub status: Connectivity,
  pub queued_requests: usize,
  pub is_draining: bool,
}

pub struct ApiClient {
  http: reqwest::Client,
  base_url: String,
  health_endpoint: String,
  default_timeout: Duration,
  probe_interval: Duration,
  drain_batch_size: usize,
  retry: RetryPolicy,
  store: Arc<Store>,
  state: Arc<dyn StateSink>,
  pub(crate) queue: OfflineQueue,
  connectivity: Mutex<Connectivity>,
  draining: AtomicBool,
}

impl ApiClient {
  pub fn new(config: &Config, store: Arc<Store>) -> Result<Self, ApiError> {
    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| ApiError::Client(e.to_string()))?;

    Ok(Self {
      http,
      base_url: config.api.base_url.trim_end_matches('/').to_string(),
      health_endpoint: config.api.health_endpoint.clone(),
      default_timeout: config.request_timeout(),
      probe_interval: config.probe_interval(),
      drain_batch_size: config.api.drain_batch_size.max(1),
      retry: RetryPolicy::from_config(&config.retry),
      store,
      state: Arc::new(NoopStateSink),
      queue: OfflineQueue::new(),
      connectivity: Mutex::new(Connectivity::Online),
      draining: AtomicBool::new(false),
    })
  }

  /// Attach an external observable-state store. Confirmed results are
  /// pushed into it by the entity operations.
  pub fn with_state_sink(mut self, sink: Arc<dyn StateSink>) -> Self {
    self.state = sink;
    self
  }

  pub(crate) fn state_sink(&self) -> &dyn StateSink {
    self.state.as_ref()
  }

  pub fn connectivity(&self) -> Connectivity {
    self
      .connectivity
      .lock()
      .map(|c| *c)
      .unwrap_or(Connectivity::Online)
  }

  pub fn connection_status(&self) -> ConnectionStatus {
    ConnectionStatus {
      status: self.connectivity(),
      queued_requests: self.queue.len(),
      is_draining: self.draining.load(Ordering::SeqCst),
    }
  }

  /// Issue a request, or queue it when offline.
  pub async fn request(
    &self,
    endpoint: &str,
    options: RequestOptions,
  ) -> Result<ApiOutcome, ApiError> {
    let timeout = options.timeout.unwrap_or(self.default_timeout);
    let mut config = QueuedRequest::new(
      endpoint,
      options.method,
      options.data,
      options.priority,
      options.retry,
    );

    if self.connectivity() == Connectivity::Offline {
      let request_id = config.id.clone();
      debug!(%endpoint, method = %config.method, "offline, queuing request");
      self.queue.push(config);
      return Ok(ApiOutcome::Queued { request_id });
    }

    self
      .execute_with_retry(&mut config, timeout)
      .await
      .map(ApiOutcome::Completed)
  }

  pub async fn get(&self, endpoint: &str) -> Result<ApiOutcome, ApiError> {
    self.request(endpoint, RequestOptions::get()).await
  }

  pub async fn post(&self, endpoint: &str, data: Value) -> Result<ApiOutcome, ApiError> {
    self.request(endpoint, RequestOptions::post(data)).await
  }

  pub async fn patch(&self, endpoint: &str, data: Value) -> Result<ApiOutcome, ApiError> {
    self.request(endpoint, RequestOptions::patch(data)).await
  }

  pub async fn put(&self, endpoint: &str, data: Value) -> Result<ApiOutcome, ApiError> {
    self.request(endpoint, RequestOptions::put(data)).await
  }

  pub async fn delete(&self, endpoint: &str) -> Result<ApiOutcome, ApiError> {
    self.request(endpoint, RequestOptions::delete()).await
  }

  async fn execute_with_retry(
    &self,
    request: &mut QueuedRequest,
    timeout: Duration,
  ) -> Result<Value, ApiError> {
    loop {
      match self.execute_once(request, timeout).await {
        Ok(value) => {
          debug!(endpoint = %request.endpoint, method = %request.method, "request completed");
          return Ok(value);
        }
        Err(err) => {
          let can_retry =
            request.retry && err.is_retryable() && request.retry_count < self.retry.max_retries;
          if !can_retry {
            return Err(err);
          }

          request.retry_count += 1;
          let delay = self.retry.delay_for(request.retry_count);
          warn!(
            endpoint = %request.endpoint,
            attempt = request.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying request"
          );
          tokio::time::sleep(delay).await;
        }
      }
    }
  }

  async fn execute_once(
    &self,
    request: &QueuedRequest,
    timeout: Duration,
  ) -> Result<Value, ApiError> {
    // Missing token is a local failure; no network call is made.
    let token = self.store.token().ok_or(ApiError::MissingToken)?;

    let url = format!("{}/api{}", self.base_url, request.endpoint);
    let timeout_ms = timeout.as_millis() as u64;

    let mut builder = self
      .http
      .request(request.method.clone(), &url)
      .timeout(timeout)
      .bearer_auth(&token)
      .header("X-Request-ID", &request.id);

    if let Some(payload) = &request.payload {
      if request.method != Method::GET {
        builder = builder.json(payload);
      }
    }

    let map_transport = |e: reqwest::Error| {
      if e.is_timeout() {
        ApiError::Timeout(timeout_ms)
      } else {
        ApiError::Network(e.to_string())
      }
    };

    let response = builder.send().await.map_err(map_transport)?;
    let status = response.status();

    if status.as_u16() == 401 {
      // No silent retry on auth failure: drop credentials and surface it.
      self.store.clear_credentials();
      return Err(ApiError::AuthExpired);
    }

    if !status.is_success() {
      return Err(ApiError::Status {
        status: status.as_u16(),
        message: status
          .canonical_reason()
          .unwrap_or("request failed")
          .to_string(),
      });
    }

    let content_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or("")
      .to_string();

    let body = response.text().await.map_err(map_transport)?;

    if body.trim().is_empty() {
      return Ok(Value::Null);
    }

    if !content_type.contains("application/json") {
      return Err(ApiError::MalformedResponse {
        excerpt: excerpt(&body),
      });
    }

    serde_json::from_str(&body).map_err(|_| ApiError::MalformedResponse {
      excerpt: excerpt(&body),
    })
  }

  /// Probe the liveness endpoint and update the connectivity flag.
  /// An offline-to-online transition drains the queue.
  pub async fn check_connection(&self) -> Connectivity {
    let url = format!("{}/api{}", self.base_url, self.health_endpoint);
    let healthy = self
      .http
      .head(&url)
      .timeout(PROBE_TIMEOUT)
      .send()
      .await
      .map(|r| r.status().is_success())
      .unwrap_or(false);

    if healthy {
      self.set_online().await;
    } else {
      self.set_offline();
    }
    self.connectivity()
  }

  pub fn set_offline(&self) {
    if let Ok(mut state) = self.connectivity.lock() {
      if *state != Connectivity::Offline {
        info!("connection lost, queuing requests");
        *state = Connectivity::Offline;
      }
    }
  }

  /// Mark the client online and replay anything that queued up meanwhile.
  pub async fn set_online(&self) {
    let was_offline = {
      match self.connectivity.lock() {
        Ok(mut state) => {
          let was_offline = *state == Connectivity::Offline;
          *state = Connectivity::Online;
          was_offline
        }
        Err(_) => false,
      }
    };

    if was_offline {
      info!("connection restored, draining queued requests");
      self.drain_queue().await;
    }
  }

  /// Replay queued requests in priority batches. Per-request failures are
  /// reported individually and never abort the batch.
  pub async fn drain_queue(&self) {
    if self.draining.swap(true, Ordering::SeqCst) {
      return;
    }

    let mut pending = self.queue.drain_sorted();
    if pending.is_empty() {
      self.draining.store(false, Ordering::SeqCst);
      return;
    }

    info!(count = pending.len(), "processing queued requests");

    for batch in pending.chunks_mut(self.drain_batch_size) {
      let results = futures::future::join_all(batch.iter_mut().map(|request| {
        let timeout = self.default_timeout;
        async move {
          let id = request.id.clone();
          let endpoint = request.endpoint.clone();
          (id, endpoint, self.execute_with_retry(request, timeout).await)
        }
      }))
      .await;

      for (id, endpoint, result) in results {
        if let Err(e) = result {
          warn!(request_id = %id, %endpoint, error = %e, "queued request failed during drain");
        }
      }
    }

    self.draining.store(false, Ordering::SeqCst);
  }

  /// Drop every queued request.
  pub fn clear_queue(&self) {
    self.queue.clear();
  }

  /// Periodic liveness probe. The returned handle is aborted on session
  /// dispose.
  pub fn spawn_liveness_probe(self: &Arc<Self>) -> JoinHandle<()> {
    let client = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(client.probe_interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // First tick fires immediately; skip it so startup is not a probe.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        client.check_connection().await;
      }
    })
  }
}

fn excerpt(body: &str) -> String {
  body.chars().take(BODY_EXCERPT_LEN).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn test_config(base_url: &str) -> Config {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();

    let mut config = Config::for_base_url(base_url);
    // Keep retries fast in tests.
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    config
  }

  fn store_with_token() -> Arc<Store> {
    let store = Arc::new(Store::in_memory().unwrap());
    store.set_token("test-token");
    store
  }

  #[test]
  fn backoff_delays_grow_then_plateau() {
    let policy = RetryPolicy::from_config(&crate::config::RetryConfig::default());

    let d1 = policy.delay_for(1);
    let d2 = policy.delay_for(2);
    let d3 = policy.delay_for(3);
    let d4 = policy.delay_for(4);
    let d5 = policy.delay_for(5);

    assert_eq!(d1, Duration::from_millis(1_000));
    assert_eq!(d2, Duration::from_millis(2_000));
    assert_eq!(d3, Duration::from_millis(4_000));
    assert_eq!(d4, Duration::from_millis(8_000));
    // Capped at the configured maximum.
    assert_eq!(d5, Duration::from_millis(10_000));
    assert!(d1 < d2 && d2 < d3 && d3 < d4 && d4 <= d5);
  }

  #[tokio::test]
  async fn completes_a_json_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/api/clients")
      .match_header("authorization", "Bearer test-token")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"data":{"clients":[{"id":"c1"}]}}"#)
      .create_async()
      .await;

    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();
    let outcome = client.get("/clients").await.unwrap();

    let body = outcome.into_value().unwrap();
    assert_eq!(body["data"]["clients"][0]["id"], "c1");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn missing_token_fails_without_network() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/api/clients")
      .expect(0)
      .create_async()
      .await;

    let store = Arc::new(Store::in_memory().unwrap());
    let client = ApiClient::new(&test_config(&server.url()), store).unwrap();

    let err = client.get("/clients").await.unwrap_err();
    assert!(matches!(err, ApiError::MissingToken));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn auth_expiry_clears_credentials_and_never_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/api/invoices")
      .with_status(401)
      .expect(1)
      .create_async()
      .await;

    let store = store_with_token();
    store.set(crate::store::StoreKey::User, &json!({"email": "x@y.z"}));
    let client = ApiClient::new(&test_config(&server.url()), Arc::clone(&store)).unwrap();

    let err = client.get("/invoices").await.unwrap_err();
    assert!(matches!(err, ApiError::AuthExpired));
    assert!(store.token().is_none());
    let user: Option<Value> = store.get(crate::store::StoreKey::User);
    assert!(user.is_none());
    // Exactly one hit: a 401 is terminal.
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn non_json_body_is_malformed_with_excerpt() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/api/projects")
      .with_status(200)
      .with_header("content-type", "text/html")
      .with_body("<html><body>maintenance page</body></html>")
      .create_async()
      .await;

    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();

    // Disable retry so the single malformed response surfaces directly.
    let err = client
      .request("/projects", RequestOptions::get().without_retry())
      .await
      .unwrap_err();
    match err {
      ApiError::MalformedResponse { excerpt } => {
        assert!(excerpt.starts_with("<html>"));
        assert!(excerpt.len() <= 100);
      }
      other => panic!("expected MalformedResponse, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn slow_response_aborts_with_a_timeout() {
    use std::io::Write;

    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/api/reports")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_chunked_body(|writer| {
        std::thread::sleep(Duration::from_millis(400));
        writer.write_all(b"{}")
      })
      .create_async()
      .await;

    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();
    let err = client
      .request(
        "/reports",
        RequestOptions::get()
          .with_timeout(Duration::from_millis(50))
          .without_retry(),
      )
      .await
      .unwrap_err();

    // The request is aborted, not raced: the error carries the budget and
    // stays retryable for callers that keep retry enabled.
    assert!(matches!(err, ApiError::Timeout(50)));
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn retries_up_to_the_ceiling_then_fails() {
    let mut server = mockito::Server::new_async().await;
    // max_retries 3 means at most 4 attempts total.
    let mock = server
      .mock("GET", "/api/leads")
      .with_status(500)
      .expect(4)
      .create_async()
      .await;

    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();
    let err = client.get("/leads").await.unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn recovers_when_a_retry_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
      .mock("GET", "/api/clients")
      .with_status(503)
      .create_async()
      .await;

    let mut config = test_config(&server.url());
    // Leave room to swap the mock before the first retry fires.
    config.retry.base_delay_ms = 200;
    config.retry.max_delay_ms = 400;
    let client = ApiClient::new(&config, store_with_token()).unwrap();

    let request = client.get("/clients");
    let swap = async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      failing.remove_async().await;
      server
        .mock("GET", "/api/clients")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"clients":[]}"#)
        .create_async()
        .await
    };

    let (outcome, succeeding) = tokio::join!(request, swap);
    assert!(!outcome.unwrap().is_queued());
    succeeding.assert_async().await;
  }

  #[tokio::test]
  async fn offline_requests_queue_without_touching_the_network() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/api/clients")
      .expect(0)
      .create_async()
      .await;

    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();
    client.set_offline();

    let outcome = client
      .post("/clients", json!({"name": "Acme"}))
      .await
      .unwrap();

    let ApiOutcome::Queued { request_id } = outcome else {
      panic!("expected queued outcome");
    };
    assert!(client.queue.contains(&request_id));
    assert_eq!(client.connection_status().queued_requests, 1);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn going_online_drains_the_queue_exactly_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/api/clients")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"data":{"client":{"id":"c9","name":"Acme"}}}"#)
      .expect(1)
      .create_async()
      .await;

    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();
    client.set_offline();

    let outcome = client
      .post("/clients", json!({"name": "Acme"}))
      .await
      .unwrap();
    assert!(outcome.is_queued());
    assert_eq!(client.connection_status().queued_requests, 1);

    client.set_online().await;

    assert_eq!(client.connection_status().queued_requests, 0);
    assert_eq!(client.connectivity(), Connectivity::Online);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn drain_failures_do_not_abort_the_batch() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
      .mock("POST", "/api/leads")
      .with_status(500)
      .expect(4)
      .create_async()
      .await;
    let succeeding = server
      .mock("POST", "/api/clients")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body("{}")
      .expect(1)
      .create_async()
      .await;

    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();
    client.set_offline();
    client.post("/leads", json!({"name": "bad"})).await.unwrap();
    client
      .post("/clients", json!({"name": "good"}))
      .await
      .unwrap();

    client.set_online().await;

    assert_eq!(client.connection_status().queued_requests, 0);
    failing.assert_async().await;
    succeeding.assert_async().await;
  }

  #[tokio::test]
  async fn check_connection_flips_the_flag() {
    let mut server = mockito::Server::new_async().await;
    let healthy = server
      .mock("HEAD", "/api/health")
      .with_status(200)
      .create_async()
      .await;

    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();
    client.set_offline();

    assert_eq!(client.check_connection().await, Connectivity::Online);
    healthy.assert_async().await;
  }

  #[tokio::test]
  async fn failed_probe_goes_offline() {
    let server = mockito::Server::new_async().await;
    // No HEAD mock registered: mockito answers 501, which is not healthy.
    let client = ApiClient::new(&test_config(&server.url()), store_with_token()).unwrap();

    assert_eq!(client.check_connection().await, Connectivity::Offline);
  }
}
