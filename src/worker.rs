//! The interception worker: one component exposing install, activate, fetch,
//! sync, push and notification-click as explicit entry points for a host.

use async_trait::async_trait;
use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, CacheStore, PopulateReport};
use crate::config::Config;
use crate::fetch::Fetcher;
use crate::http::Request;
use crate::lifecycle::{manifest_urls, ActivateReport, CacheNames, Lifecycle};
use crate::notify::{Notification, NotificationAction, NotificationRelay};
use crate::router::{FetchOutcome, Router, RouterConfig};
use crate::sync::{DrainOutcome, QueueStorage, Submitted, Synchronizer};

/// Capabilities provided by the environment hosting the worker.
#[async_trait]
pub trait Host: Send + Sync {
  /// Take control without waiting for existing clients to close.
  async fn skip_waiting(&self) -> Result<()>;

  /// Start governing every open client immediately.
  async fn claim_clients(&self) -> Result<()>;

  async fn show_notification(&self, notification: &Notification) -> Result<()>;

  async fn open_window(&self, url: &str) -> Result<()>;

  /// Tell every open client that the queue for `tag` was drained.
  async fn notify_clients(&self, tag: &str) -> Result<()>;
}

pub struct Worker<S: CacheStorage + QueueStorage> {
  store: CacheStore<S>,
  lifecycle: Lifecycle<S>,
  router: Router<S>,
  sync: Synchronizer<S>,
  relay: NotificationRelay,
  fetcher: Arc<dyn Fetcher>,
  host: Arc<dyn Host>,
}

impl<S: CacheStorage + QueueStorage> Worker<S> {
  pub fn new(
    config: &Config,
    storage: Arc<S>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn Host>,
  ) -> Result<Self> {
    let store = CacheStore::new(Arc::clone(&storage));
    let names = CacheNames::from_config(config);
    let router_config = RouterConfig::from_config(config, names.dynamic_name.clone())?;

    let scope = router_config.base.resolve(&router_config.origin, "")?;
    let icon = router_config
      .base
      .resolve(&router_config.origin, &config.notification.icon)?;
    let relay = NotificationRelay::new(
      config.notification.clone(),
      icon.to_string(),
      scope.to_string(),
    );

    Ok(Self {
      lifecycle: Lifecycle::new(store.clone(), names, manifest_urls(config)?),
      router: Router::new(store.clone(), Arc::clone(&fetcher), router_config),
      sync: Synchronizer::new(storage, Arc::clone(&fetcher), config.sync_tags.clone()),
      store,
      relay,
      fetcher,
      host,
    })
  }

  pub fn store(&self) -> &CacheStore<S> {
    &self.store
  }

  pub fn names(&self) -> &CacheNames {
    self.lifecycle.names()
  }

  pub fn synchronizer(&self) -> &Synchronizer<S> {
    &self.sync
  }

  /// Install transition: populate the static store, then ask to take over.
  pub async fn install(&self) -> Result<PopulateReport> {
    info!("Installing worker");
    let report = self.lifecycle.install(self.fetcher.as_ref()).await?;

    if let Err(e) = self.host.skip_waiting().await {
      warn!("skip_waiting failed: {}", e);
    }
    Ok(report)
  }

  /// Activate transition: purge stale generations, then claim open clients.
  pub async fn activate(&self) -> Result<ActivateReport> {
    info!("Activating worker");
    let report = self.lifecycle.activate()?;

    if let Err(e) = self.host.claim_clients().await {
      warn!("claim_clients failed: {}", e);
    }
    info!("Worker activated");
    Ok(report)
  }

  /// Intercept one request. Never fails.
  pub async fn fetch(&self, request: &Request) -> FetchOutcome {
    self.router.handle(request).await
  }

  /// Send an application write, queueing it when offline.
  pub async fn submit(&self, request: &Request) -> Result<Submitted> {
    self.sync.submit(request).await
  }

  /// Reconnection signal. Clients hear about every drain that ran.
  pub async fn sync(&self, tag: &str) -> Result<DrainOutcome> {
    info!("Background sync triggered: {}", tag);
    let outcome = self.sync.on_sync(tag).await?;

    if matches!(outcome, DrainOutcome::Drained { .. } | DrainOutcome::Halted { .. }) {
      if let Err(e) = self.host.notify_clients(tag).await {
        warn!("Failed to notify clients of {}: {}", tag, e);
      }
    }
    Ok(outcome)
  }

  /// Push received. Display failures are dropped.
  pub async fn push(&self, payload: Option<&[u8]>) -> Notification {
    debug!("Push notification received");
    let notification = self.relay.build(payload);
    if let Err(e) = self.host.show_notification(&notification).await {
      warn!("Dropping notification, display failed: {}", e);
    }
    notification
  }

  /// Notification action dispatched by the user.
  pub async fn notification_click(&self, action: &str) {
    debug!("Notification clicked: {:?}", action);
    if NotificationAction::from_id(action) != Some(NotificationAction::Open) {
      return;
    }
    if let Err(e) = self.host.open_window(self.relay.scope_url()).await {
      warn!("Failed to open window: {}", e);
    }
  }
}
