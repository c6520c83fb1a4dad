//! Resilient request client: HTTP primitives, offline queue, entity CRUD.

mod client;
mod entities;
mod queue;

pub use client::{ApiClient, ApiOutcome, ConnectionStatus, Connectivity, RequestOptions, RetryPolicy};
pub use entities::unwrap_collection;
pub use queue::{generate_request_id, OfflineQueue, Priority, QueuedRequest};
