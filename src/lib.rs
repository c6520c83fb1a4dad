//! Client-side data synchronization for a business-management backend.
//!
//! Three cooperating layers:
//! - a short-lived read cache that absorbs burst reads of the core
//!   business collections ([`cache`]),
//! - a resilient request client with bearer auth, retry with backoff,
//!   and an offline priority queue ([`api`]),
//! - route state that keeps a navigable address and an in-memory route
//!   model in sync ([`route`]).
//!
//! [`session::Session`] wires the layers together for one user.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod route;
pub mod session;
pub mod state;
pub mod store;

pub use api::{ApiClient, ApiOutcome, RequestOptions};
pub use cache::{CacheService, EntityKind, ReadCache, Snapshot};
pub use config::Config;
pub use error::ApiError;
pub use route::{History, MemoryHistory, NavigateOptions, NavigateResult, Route, RouteState};
pub use session::Session;
pub use state::StateSink;
pub use store::{Store, StoreKey};
