//! Core traits and types for the response cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{RequestKey, Response};

/// A stored response snapshot together with when it was written.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A backend holds any number of named purposes (e.g. `app-static-v3`), each
/// mapping request identities to response snapshots. Everything except `put`
/// is idempotent; `put` overwrites whatever was stored for the same identity.
pub trait CacheStorage: Send + Sync {
  /// Create the purpose if it does not exist yet.
  fn open_purpose(&self, purpose: &str) -> Result<()>;

  /// Look up a snapshot within one purpose.
  fn get(&self, purpose: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store a snapshot, creating the purpose if needed.
  fn put(&self, purpose: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Remove one entry. Returns whether anything was removed.
  fn delete(&self, purpose: &str, key: &RequestKey) -> Result<bool>;

  /// All purposes, in creation order.
  fn list_purposes(&self) -> Result<Vec<String>>;

  /// Remove a purpose and all of its entries. Returns whether it existed.
  fn delete_purpose(&self, purpose: &str) -> Result<bool>;

  /// Number of entries held by a purpose.
  fn entry_count(&self, purpose: &str) -> Result<usize>;

  /// Look up a snapshot across every purpose, oldest purpose first.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    for purpose in self.list_purposes()? {
      if let Some(hit) = self.get(&purpose, key)? {
        return Ok(Some(hit));
      }
    }
    Ok(None)
  }
}
