//! Short-lived read cache and cache-first orchestration.

mod kinds;
mod read_cache;
mod service;

pub use kinds::EntityKind;
pub use read_cache::{KindStatus, ReadCache};
pub use service::{CacheService, Snapshot};
