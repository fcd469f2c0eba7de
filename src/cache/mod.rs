//! Response cache for offline support.
//!
//! This module provides named, generation-tagged stores mapping request
//! identities to response snapshots:
//! - `CacheStorage` is the backend contract, implemented over SQLite
//! - `CacheStore` opens per-purpose `CacheHandle`s and matches across purposes
//! - Bulk population tolerates individual failures

mod layer;
#[cfg(test)]
mod memory;
mod storage;
mod traits;

pub use layer::{CacheStore, PopulateReport};
#[cfg(test)]
pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::CacheStorage;
