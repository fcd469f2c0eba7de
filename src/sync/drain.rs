//! Replays queued writes when connectivity returns.

use chrono::Utc;
use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::queue::QueueStorage;
use crate::fetch::{FetchMode, Fetcher};
use crate::http::{Method, Request, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  Draining,
}

/// Result of a reconnection signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
  /// Every queued write was delivered
  Drained { replayed: usize },
  /// A replay failed; that entry and everything after it stay queued
  Halted { replayed: usize, failed_id: i64 },
  /// Another drain was already in progress
  AlreadyDraining,
  /// The signal carried a tag this worker does not handle
  Ignored,
}

/// Result of submitting a write.
#[derive(Debug)]
pub enum Submitted {
  Sent(Response),
  /// Network unreachable; the write was queued under this id
  Queued(i64),
}

/// Single-drainer replay of the offline queue.
pub struct Synchronizer<Q: QueueStorage> {
  queue: Arc<Q>,
  fetcher: Arc<dyn Fetcher>,
  tags: Vec<String>,
  draining: Mutex<()>,
}

impl<Q: QueueStorage> Synchronizer<Q> {
  pub fn new(queue: Arc<Q>, fetcher: Arc<dyn Fetcher>, tags: Vec<String>) -> Self {
    Self {
      queue,
      fetcher,
      tags,
      draining: Mutex::new(()),
    }
  }

  pub fn state(&self) -> SyncState {
    match self.draining.try_lock() {
      Ok(_) => SyncState::Idle,
      Err(_) => SyncState::Draining,
    }
  }

  pub fn handles_tag(&self, tag: &str) -> bool {
    self.tags.iter().any(|t| t == tag)
  }

  pub fn queue(&self) -> &Q {
    &self.queue
  }

  /// Send a write, queueing it if the network is unreachable.
  pub async fn submit(&self, request: &Request) -> Result<Submitted> {
    match self.fetcher.fetch(request, FetchMode::NoStore).await {
      Ok(response) => Ok(Submitted::Sent(response)),
      Err(e) if request.method != Method::Get => {
        let id = self.queue.enqueue(request, Utc::now())?;
        info!(
          "Queued {} {} for background sync (#{}): {}",
          request.method, request.url, id, e
        );
        Ok(Submitted::Queued(id))
      }
      Err(e) => Err(e),
    }
  }

  /// Handle a reconnection signal.
  pub async fn on_sync(&self, tag: &str) -> Result<DrainOutcome> {
    if !self.handles_tag(tag) {
      debug!("Ignoring sync tag {}", tag);
      return Ok(DrainOutcome::Ignored);
    }
    self.drain().await
  }

  /// Replay queued writes oldest first, stopping at the first failure.
  pub async fn drain(&self) -> Result<DrainOutcome> {
    let Ok(_guard) = self.draining.try_lock() else {
      debug!("Drain already in progress");
      return Ok(DrainOutcome::AlreadyDraining);
    };

    let mut replayed = 0;
    while let Some(entry) = self.queue.head()? {
      let request = entry.to_request();
      let delivered = match self.fetcher.fetch(&request, FetchMode::NoStore).await {
        Ok(response) if response.status >= 500 => {
          warn!(
            "Replay of #{} {} {} got {}",
            entry.id, entry.method, entry.url, response.status
          );
          false
        }
        Ok(_) => true,
        Err(e) => {
          warn!("Replay of #{} {} {} failed: {}", entry.id, entry.method, entry.url, e);
          false
        }
      };

      if !delivered {
        info!("Drain halted after {} replayed writes", replayed);
        return Ok(DrainOutcome::Halted {
          replayed,
          failed_id: entry.id,
        });
      }

      self.queue.remove(entry.id)?;
      replayed += 1;
      debug!("Replayed #{} {} {}", entry.id, entry.method, entry.url);
    }

    if replayed > 0 {
      info!("Offline data synced: {} writes replayed", replayed);
    }
    Ok(DrainOutcome::Drained { replayed })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::testing::MockFetcher;
  use async_trait::async_trait;
  use url::Url;

  fn url(path: &str) -> Url {
    Url::parse("https://api.shop.example").unwrap().join(path).unwrap()
  }

  fn post(path: &str) -> Request {
    Request::new(Method::Post, url(path)).with_body(b"{}".to_vec())
  }

  fn synchronizer(fetcher: Arc<MockFetcher>) -> Synchronizer<MemoryStorage> {
    Synchronizer::new(
      Arc::new(MemoryStorage::new()),
      fetcher,
      vec!["sync-queues".to_string(), "background-sync".to_string()],
    )
  }

  fn pending_paths(sync: &Synchronizer<MemoryStorage>) -> Vec<String> {
    sync
      .queue()
      .pending()
      .unwrap()
      .into_iter()
      .map(|e| e.url.path().to_string())
      .collect()
  }

  #[tokio::test]
  async fn test_failed_replay_keeps_order_and_resumes() {
    let fetcher = Arc::new(
      MockFetcher::new()
        .respond(url("/a").as_str(), Response::new(201, ""))
        .fail(url("/b").as_str())
        .respond(url("/c").as_str(), Response::new(201, "")),
    );
    let sync = synchronizer(fetcher.clone());
    let now = Utc::now();
    for path in ["/a", "/b", "/c"] {
      sync.queue().enqueue(&post(path), now).unwrap();
    }

    let first = sync.on_sync("sync-queues").await.unwrap();
    assert!(matches!(first, DrainOutcome::Halted { replayed: 1, .. }));
    assert_eq!(pending_paths(&sync), vec!["/b", "/c"]);
    // C was never attempted in the halted cycle
    assert_eq!(
      fetcher.calls(),
      vec![(Method::Post, url("/a").to_string()), (Method::Post, url("/b").to_string())]
    );

    fetcher.set_response(url("/b").as_str(), Response::new(200, ""));
    let second = sync.on_sync("background-sync").await.unwrap();
    assert_eq!(second, DrainOutcome::Drained { replayed: 2 });
    assert!(pending_paths(&sync).is_empty());
    assert_eq!(sync.state(), SyncState::Idle);
  }

  /// Accepts every write, and queues one more write while the first replay
  /// is still in flight.
  struct EnqueueDuringReplay {
    queue: Arc<MemoryStorage>,
    late: std::sync::Mutex<Option<Request>>,
    replayed: std::sync::Mutex<Vec<String>>,
  }

  #[async_trait]
  impl Fetcher for EnqueueDuringReplay {
    async fn fetch(&self, request: &Request, _mode: FetchMode) -> Result<Response> {
      self.replayed.lock().unwrap().push(request.url.path().to_string());
      let late = self.late.lock().unwrap().take();
      if let Some(late) = late {
        self.queue.enqueue(&late, Utc::now())?;
        tokio::task::yield_now().await;
      }
      Ok(Response::new(201, ""))
    }
  }

  #[tokio::test]
  async fn test_write_queued_mid_drain_lands_at_tail() {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = Arc::new(EnqueueDuringReplay {
      queue: Arc::clone(&storage),
      late: std::sync::Mutex::new(Some(post("/d"))),
      replayed: std::sync::Mutex::new(Vec::new()),
    });
    let sync = Synchronizer::new(
      Arc::clone(&storage),
      fetcher.clone(),
      vec!["sync-queues".to_string()],
    );
    let now = Utc::now();
    for path in ["/a", "/b", "/c"] {
      sync.queue().enqueue(&post(path), now).unwrap();
    }

    let outcome = sync.on_sync("sync-queues").await.unwrap();

    assert_eq!(outcome, DrainOutcome::Drained { replayed: 4 });
    assert_eq!(*fetcher.replayed.lock().unwrap(), vec!["/a", "/b", "/c", "/d"]);
    assert!(pending_paths(&sync).is_empty());
  }

  #[tokio::test]
  async fn test_server_error_halts_drain() {
    let fetcher = Arc::new(MockFetcher::new().respond(url("/a").as_str(), Response::new(503, "")));
    let sync = synchronizer(fetcher);
    sync.queue().enqueue(&post("/a"), Utc::now()).unwrap();

    let outcome = sync.drain().await.unwrap();

    assert!(matches!(outcome, DrainOutcome::Halted { replayed: 0, .. }));
    assert_eq!(pending_paths(&sync), vec!["/a"]);
  }

  #[tokio::test]
  async fn test_client_error_counts_as_delivered() {
    let fetcher = Arc::new(MockFetcher::new().respond(url("/a").as_str(), Response::new(422, "")));
    let sync = synchronizer(fetcher);
    sync.queue().enqueue(&post("/a"), Utc::now()).unwrap();

    assert_eq!(sync.drain().await.unwrap(), DrainOutcome::Drained { replayed: 1 });
  }

  #[tokio::test]
  async fn test_unknown_tag_is_ignored() {
    let fetcher = Arc::new(MockFetcher::new());
    let sync = synchronizer(fetcher.clone());
    sync.queue().enqueue(&post("/a"), Utc::now()).unwrap();

    assert_eq!(sync.on_sync("periodic-refresh").await.unwrap(), DrainOutcome::Ignored);
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(pending_paths(&sync), vec!["/a"]);
  }

  #[tokio::test]
  async fn test_second_signal_while_draining_is_rejected() {
    let fetcher = Arc::new(MockFetcher::new());
    let sync = synchronizer(fetcher);

    let guard = sync.draining.try_lock().unwrap();
    assert_eq!(sync.state(), SyncState::Draining);
    assert_eq!(sync.drain().await.unwrap(), DrainOutcome::AlreadyDraining);
    drop(guard);

    assert_eq!(sync.drain().await.unwrap(), DrainOutcome::Drained { replayed: 0 });
  }

  #[tokio::test]
  async fn test_submit_queues_only_on_transport_failure() {
    let fetcher = Arc::new(
      MockFetcher::new()
        .respond(url("/online").as_str(), Response::new(201, "ok"))
        .fail(url("/offline").as_str()),
    );
    let sync = synchronizer(fetcher);

    assert!(matches!(sync.submit(&post("/online")).await.unwrap(), Submitted::Sent(_)));
    assert!(matches!(sync.submit(&post("/offline")).await.unwrap(), Submitted::Queued(_)));
    assert!(sync.submit(&Request::get(url("/offline"))).await.is_err());

    assert_eq!(pending_paths(&sync), vec!["/offline"]);
  }
}
