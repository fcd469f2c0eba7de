//! In-process storage used by unit tests: cache purposes and the offline
//! queue held in plain collections.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheStorage, CachedResponse};
use crate::http::{Request, RequestKey, Response};
use crate::sync::{QueueEntry, QueueStorage};

#[derive(Default)]
pub struct MemoryStorage {
  caches: Mutex<MemoryCaches>,
  queue: Mutex<MemoryQueue>,
}

#[derive(Default)]
struct MemoryCaches {
  order: Vec<String>,
  entries: HashMap<String, HashMap<RequestKey, CachedResponse>>,
}

impl MemoryCaches {
  fn ensure(&mut self, purpose: &str) -> &mut HashMap<RequestKey, CachedResponse> {
    if !self.entries.contains_key(purpose) {
      self.order.push(purpose.to_string());
    }
    self.entries.entry(purpose.to_string()).or_default()
  }
}

#[derive(Default)]
struct MemoryQueue {
  next_id: i64,
  entries: VecDeque<QueueEntry>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn caches(&self) -> Result<MutexGuard<'_, MemoryCaches>> {
    self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn queue(&self) -> Result<MutexGuard<'_, MemoryQueue>> {
    self
      .queue
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryStorage {
  fn open_purpose(&self, purpose: &str) -> Result<()> {
    self.caches()?.ensure(purpose);
    Ok(())
  }

  fn get(&self, purpose: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    Ok(
      self
        .caches()?
        .entries
        .get(purpose)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn put(&self, purpose: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.caches()?.ensure(purpose).insert(
      key.clone(),
      CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn delete(&self, purpose: &str, key: &RequestKey) -> Result<bool> {
    Ok(
      self
        .caches()?
        .entries
        .get_mut(purpose)
        .is_some_and(|entries| entries.remove(key).is_some()),
    )
  }

  fn list_purposes(&self) -> Result<Vec<String>> {
    Ok(self.caches()?.order.clone())
  }

  fn delete_purpose(&self, purpose: &str) -> Result<bool> {
    let mut caches = self.caches()?;
    caches.order.retain(|name| name != purpose);
    Ok(caches.entries.remove(purpose).is_some())
  }

  fn entry_count(&self, purpose: &str) -> Result<usize> {
    Ok(self.caches()?.entries.get(purpose).map_or(0, HashMap::len))
  }
}

impl QueueStorage for MemoryStorage {
  fn enqueue(&self, request: &Request, enqueued_at: DateTime<Utc>) -> Result<i64> {
    let mut queue = self.queue()?;
    queue.next_id += 1;
    let id = queue.next_id;
    queue.entries.push_back(QueueEntry {
      id,
      method: request.method.clone(),
      url: request.url.clone(),
      headers: request.headers.clone(),
      body: request.body.clone(),
      enqueued_at,
    });
    Ok(id)
  }

  fn head(&self) -> Result<Option<QueueEntry>> {
    Ok(self.queue()?.entries.front().cloned())
  }

  fn remove(&self, id: i64) -> Result<bool> {
    let mut queue = self.queue()?;
    let before = queue.entries.len();
    queue.entries.retain(|entry| entry.id != id);
    Ok(queue.entries.len() < before)
  }

  fn pending(&self) -> Result<Vec<QueueEntry>> {
    Ok(self.queue()?.entries.iter().cloned().collect())
  }
}
