//! Entity-level convenience operations.
//!
//! Thin CRUD layer over [`ApiClient::request`] for the tracked entity
//! collections. On confirmed success the corresponding record is pushed
//! into the attached state sink; on failure (and for queued-offline
//! acceptances) the sink is left untouched. Mutation happens only after
//! the backend said yes.

use crate::cache::EntityKind;
use crate::error::ApiError;
use serde_json::Value;
use tracing::debug;

use super::client::{ApiClient, ApiOutcome, RequestOptions};
use super::queue::Priority;

/// Pull the collection out of a response body. The backend is inconsistent
/// about envelopes, so every known shape is checked:
/// `{data:{<kind>:[...]}}`, `{data:[...]}`, `{<kind>:[...]}`, bare array.
pub fn unwrap_collection(kind: EntityKind, body: &Value) -> Vec<Value> {
  let candidates = [
    &body["data"][kind.envelope_key()],
    &body["data"],
    &body[kind.envelope_key()],
    body,
  ];

  for candidate in candidates {
    if let Value::Array(records) = candidate {
      return records.clone();
    }
  }
  Vec::new()
}

/// The id the backend assigned to a freshly written record, from either
/// `{data:{<singular>:{id}}}` or `{<singular>:{id}}`.
fn assigned_id(kind: EntityKind, body: &Value) -> Option<Value> {
  let nested = &body["data"][kind.singular_key()]["id"];
  if !nested.is_null() {
    return Some(nested.clone());
  }
  let flat = &body[kind.singular_key()]["id"];
  if !flat.is_null() {
    return Some(flat.clone());
  }
  None
}

impl ApiClient {
  /// Fetch the full collection for `kind` and replace it in the state sink.
  /// While offline this returns an empty list (the read was accepted but
  /// not confirmed), leaving state untouched.
  pub async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, ApiError> {
    let outcome = self.request(kind.endpoint(), RequestOptions::get()).await?;

    let Some(body) = outcome.into_value() else {
      return Ok(Vec::new());
    };

    let records = unwrap_collection(kind, &body);
    self.state_sink().replace(kind, records.clone());
    Ok(records)
  }

  /// Create a record. Writes go out at high priority.
  pub async fn create(&self, kind: EntityKind, payload: Value) -> Result<ApiOutcome, ApiError> {
    let outcome = self
      .request(
        kind.endpoint(),
        RequestOptions::post(payload.clone()).with_priority(Priority::High),
      )
      .await?;

    if let ApiOutcome::Completed(body) = &outcome {
      let mut record = payload;
      if record.is_object() {
        if let Some(id) = assigned_id(kind, body) {
          record["id"] = id;
        }
        debug!(%kind, "created record confirmed, merging into state");
        self.state_sink().merge(kind, record);
      }
    }
    Ok(outcome)
  }

  /// Update a record in place.
  pub async fn update(
    &self,
    kind: EntityKind,
    id: &str,
    payload: Value,
  ) -> Result<ApiOutcome, ApiError> {
    let endpoint = format!("{}/{}", kind.endpoint(), id);
    let outcome = self
      .request(
        &endpoint,
        RequestOptions::patch(payload.clone()).with_priority(Priority::High),
      )
      .await?;

    if matches!(outcome, ApiOutcome::Completed(_)) {
      let mut record = payload;
      if record.is_object() {
        record["id"] = Value::String(id.to_string());
        self.state_sink().merge(kind, record);
      }
    }
    Ok(outcome)
  }

  /// Delete a record.
  pub async fn delete_entity(&self, kind: EntityKind, id: &str) -> Result<ApiOutcome, ApiError> {
    let endpoint = format!("{}/{}", kind.endpoint(), id);
    let outcome = self
      .request(
        &endpoint,
        RequestOptions::delete().with_priority(Priority::High),
      )
      .await?;

    if matches!(outcome, ApiOutcome::Completed(_)) {
      self.state_sink().remove(kind, id);
    }
    Ok(outcome)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::state::{InMemoryState, StateSink};
  use crate::store::Store;
  use serde_json::json;
  use std::sync::Arc;

  fn harness(base_url: &str) -> (ApiClient, Arc<InMemoryState>) {
    let mut config = Config::for_base_url(base_url);
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 10;

    let store = Arc::new(Store::in_memory().unwrap());
    store.set_token("test-token");

    let state = Arc::new(InMemoryState::new());
    let client = ApiClient::new(&config, store)
      .unwrap()
      .with_state_sink(state.clone() as Arc<dyn StateSink>);
    (client, state)
  }

  #[test]
  fn unwraps_every_known_envelope_shape() {
    let kind = EntityKind::Clients;
    let records = json!([{"id": "c1"}]);

    let nested = json!({"data": {"clients": records.clone()}});
    let data_array = json!({"data": records.clone()});
    let flat = json!({"clients": records.clone()});
    let bare = records.clone();

    for body in [nested, data_array, flat, bare] {
      assert_eq!(unwrap_collection(kind, &body).len(), 1, "body: {body}");
    }

    assert!(unwrap_collection(kind, &json!({"data": {}})).is_empty());
    assert!(unwrap_collection(kind, &json!("nope")).is_empty());
  }

  #[tokio::test]
  async fn list_replaces_state_with_fetched_records() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/api/projects")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"data":[{"id":"p1"},{"id":"p2"}]}"#)
      .create_async()
      .await;

    let (client, state) = harness(&server.url());
    let records = client.list(EntityKind::Projects).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(state.get(EntityKind::Projects).len(), 2);
  }

  #[tokio::test]
  async fn create_merges_only_after_confirmation() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/clients")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"data":{"client":{"id":"c42"}}}"#)
      .create_async()
      .await;

    let (client, state) = harness(&server.url());
    let outcome = client
      .create(EntityKind::Clients, json!({"name": "Acme"}))
      .await
      .unwrap();

    assert!(!outcome.is_queued());
    let records = state.get(EntityKind::Clients);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], "c42");
    assert_eq!(records[0]["name"], "Acme");
  }

  #[tokio::test]
  async fn failed_create_leaves_state_untouched() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/api/clients")
      .with_status(422)
      .create_async()
      .await;

    let (client, state) = harness(&server.url());
    let result = client
      .create(EntityKind::Clients, json!({"name": ""}))
      .await;

    assert!(result.is_err());
    assert!(state.get(EntityKind::Clients).is_empty());
  }

  #[tokio::test]
  async fn queued_create_defers_the_state_mutation() {
    let server = mockito::Server::new_async().await;
    let (client, state) = harness(&server.url());
    client.set_offline();

    let outcome = client
      .create(EntityKind::Leads, json!({"name": "Prospect"}))
      .await
      .unwrap();

    assert!(outcome.is_queued());
    assert!(state.get(EntityKind::Leads).is_empty());
  }

  #[tokio::test]
  async fn update_merges_the_patched_record() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("PATCH", "/api/invoices/i1")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body("{}")
      .create_async()
      .await;

    let (client, state) = harness(&server.url());
    state.replace(
      EntityKind::Invoices,
      vec![json!({"id": "i1", "total": 100})],
    );

    client
      .update(EntityKind::Invoices, "i1", json!({"total": 250}))
      .await
      .unwrap();

    let records = state.get(EntityKind::Invoices);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["total"], 250);
  }

  #[tokio::test]
  async fn delete_removes_the_record_after_confirmation() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("DELETE", "/api/clients/c1")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body("{}")
      .create_async()
      .await;

    let (client, state) = harness(&server.url());
    state.replace(EntityKind::Clients, vec![json!({"id": "c1"})]);

    client.delete_entity(EntityKind::Clients, "c1").await.unwrap();
    assert!(state.get(EntityKind::Clients).is_empty());
  }
}
