//! Cache store facade: purpose handles, cross-purpose matching and bulk population.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::traits::CacheStorage;
use crate::fetch::{FetchMode, Fetcher};
use crate::http::{Request, RequestKey, Response};

/// Shared entry point to the cache storage backend.
pub struct CacheStore<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

impl<S: CacheStorage> CacheStore<S> {
  pub fn new(storage: Arc<S>) -> Self {
    Self { storage }
  }

  /// Open (creating if needed) the store for one purpose.
  pub fn open(&self, purpose: &str) -> Result<CacheHandle<S>> {
    self.storage.open_purpose(purpose)?;
    Ok(CacheHandle {
      storage: Arc::clone(&self.storage),
      purpose: purpose.to_string(),
    })
  }

  /// Find a snapshot in any purpose. Storage errors count as a miss.
  pub fn match_request(&self, key: &RequestKey) -> Option<Response> {
    match self.storage.match_any(key) {
      Ok(Some(cached)) => {
        debug!("Matched {} (cached {})", key, cached.cached_at.to_rfc3339());
        Some(cached.response)
      }
      Ok(None) => None,
      Err(e) => {
        warn!("Cache lookup failed for {}: {}", key, e);
        None
      }
    }
  }

  pub fn list_purposes(&self) -> Result<Vec<String>> {
    self.storage.list_purposes()
  }

  pub fn delete_purpose(&self, purpose: &str) -> Result<bool> {
    self.storage.delete_purpose(purpose)
  }

  pub fn entry_count(&self, purpose: &str) -> Result<usize> {
    self.storage.entry_count(purpose)
  }
}

/// Outcome of populating a purpose from a list of URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
  pub cached: Vec<Url>,
  pub skipped: Vec<Url>,
}

/// Handle to a single named purpose.
pub struct CacheHandle<S: CacheStorage> {
  storage: Arc<S>,
  purpose: String,
}

impl<S: CacheStorage> CacheHandle<S> {
  pub fn name(&self) -> &str {
    &self.purpose
  }

  pub fn get(&self, key: &RequestKey) -> Result<Option<Response>> {
    Ok(self.storage.get(&self.purpose, key)?.map(|c| c.response))
  }

  pub fn put(&self, key: &RequestKey, response: &Response) -> Result<()> {
    self.storage.put(&self.purpose, key, response)
  }

  pub fn delete(&self, key: &RequestKey) -> Result<bool> {
    self.storage.delete(&self.purpose, key)
  }

  /// Fetch and store one URL. Fails on transport errors and non-2xx statuses.
  pub async fn add(&self, fetcher: &dyn Fetcher, url: &Url) -> Result<()> {
    let request = Request::get(url.clone());
    let response = fetcher.fetch(&request, FetchMode::Default).await?;
    if !response.is_success() {
      return Err(eyre!("Unexpected status {} for {}", response.status, url));
    }
    self.put(&RequestKey::get(url.clone()), &response)
  }

  /// Fetch and store every URL concurrently. A failing URL is logged and
  /// skipped; the others are still stored.
  pub async fn add_all(&self, fetcher: &dyn Fetcher, urls: &[Url]) -> PopulateReport {
    let results = join_all(urls.iter().map(|url| async move {
      let result = self.add(fetcher, url).await;
      (url, result)
    }))
    .await;

    let mut report = PopulateReport::default();
    for (url, result) in results {
      match result {
        Ok(()) => {
          debug!("Cached {} into {}", url, self.purpose);
          report.cached.push(url.clone());
        }
        Err(e) => {
          warn!("Skipping asset (cache add failed): {}: {}", url, e);
          report.skipped.push(url.clone());
        }
      }
    }
    report
  }
}
