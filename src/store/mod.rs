//! Persistent key-value store backed by SQLite.
//!
//! Holds the auth token, the user profile, and denormalized entity
//! snapshots keyed by the fixed [`StoreKey`] constants. Reads degrade to
//! `None` on any failure (missing row, SQL error, unparseable JSON) and
//! writes are best-effort: nothing in this module throws past its own
//! boundary, because cached snapshots are optional.

mod keys;

pub use keys::StoreKey;

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Schema for the snapshot table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Process-wide persistent store. Concurrent writers race with
/// last-write-wins; there is no transaction surface.
pub struct Store {
  conn: Mutex<Connection>,
}

impl Store {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// In-memory store, used by tests and as an ephemeral fallback.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("bizsync").join("store.db"))
  }

  /// Read and deserialize a value. Absence and corruption both yield `None`.
  pub fn get<T: DeserializeOwned>(&self, key: StoreKey) -> Option<T> {
    let raw = self.get_raw(key)?;
    match serde_json::from_slice(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key = %key, error = %e, "discarding unparseable stored value");
        None
      }
    }
  }

  /// Serialize and write a value. Failures are logged and swallowed.
  pub fn set<T: Serialize>(&self, key: StoreKey, value: &T) {
    let data = match serde_json::to_vec(value) {
      Ok(data) => data,
      Err(e) => {
        warn!(key = %key, error = %e, "failed to serialize value, skipping store write");
        return;
      }
    };
    self.set_raw(key, &data);
  }

  /// Delete a key. A missing key is not an error.
  pub fn remove(&self, key: StoreKey) {
    let Ok(conn) = self.conn.lock() else {
      warn!(key = %key, "store lock poisoned, skipping remove");
      return;
    };
    if let Err(e) = conn.execute("DELETE FROM kv_store WHERE key = ?", params![key.as_str()]) {
      warn!(key = %key, error = %e, "store remove failed");
    }
  }

  /// The stored bearer token, if any.
  pub fn token(&self) -> Option<String> {
    self.get(StoreKey::Token)
  }

  /// Store a bearer token. Empty tokens are ignored.
  pub fn set_token(&self, token: &str) {
    if token.is_empty() {
      return;
    }
    self.set(StoreKey::Token, &token);
  }

  /// Drop token and user together. Called on authentication expiry.
  pub fn clear_credentials(&self) {
    self.remove(StoreKey::Token);
    self.remove(StoreKey::User);
  }

  fn get_raw(&self, key: StoreKey) -> Option<Vec<u8>> {
    let conn = match self.conn.lock() {
      Ok(conn) => conn,
      Err(_) => {
        warn!(key = %key, "store lock poisoned, treating as no data");
        return None;
      }
    };

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key.as_str()],
        |row| row.get(0),
      )
      .ok()
  }

  fn set_raw(&self, key: StoreKey, data: &[u8]) {
    let Ok(conn) = self.conn.lock() else {
      warn!(key = %key, "store lock poisoned, skipping write");
      return;
    };

    if let Err(e) = conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
      params![key.as_str(), data],
    ) {
      warn!(key = %key, error = %e, "store write failed");
    }
  }

  #[cfg(test)]
  fn set_corrupt(&self, key: StoreKey, garbage: &[u8]) {
    self.set_raw(key, garbage);
  }
}
