//! Policy router: decides, per intercepted request, whether to bypass the
//! cache, serve the app shell, or go cache-first, and guarantees that every
//! intercepted request resolves to a response.
//!
//! Classification is a pure function of the request. The chosen policy is
//! dispatched to a strategy, and any strategy that cannot answer falls
//! through to the final fallback, which ends in a synthesized `503 Offline`.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheStorage, CacheStore};
use crate::config::Config;
use crate::fetch::{FetchMode, Fetcher};
use crate::http::{Method, Request, RequestKey, Response, ResponseType};

/// Deployment base path, always stored with leading and trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePath(String);

impl BasePath {
  pub fn new(raw: &str) -> Self {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
      BasePath("/".to_string())
    } else {
      BasePath(format!("/{}/", trimmed))
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Path relative to the base. `/repo/a.js` and `/a.js` both give `a.js`;
  /// the bare root `/repo` gives the empty string.
  pub fn strip<'a>(&self, path: &'a str) -> &'a str {
    if let Some(rest) = path.strip_prefix(self.as_str()) {
      rest
    } else if path == self.as_str().trim_end_matches('/') {
      ""
    } else {
      path.trim_start_matches('/')
    }
  }

  /// Absolute URL of `relative` under this base on `origin`.
  pub fn resolve(&self, origin: &Url, relative: &str) -> Result<Url> {
    let path = format!("{}{}", self.as_str(), relative.trim_start_matches('/'));
    origin
      .join(&path)
      .map_err(|e| eyre!("Failed to resolve {} against {}: {}", path, origin, e))
  }
}

/// Everything the router needs to know about the deployment.
#[derive(Debug, Clone)]
pub struct RouterConfig {
  pub origin: Url,
  pub base: BasePath,
  pub shell: String,
  pub bypass_hosts: Vec<String>,
  /// Purpose that receives runtime cache-first writes
  pub dynamic_cache: String,
}

impl RouterConfig {
  pub fn from_config(config: &Config, dynamic_cache: String) -> Result<Self> {
    Ok(Self {
      origin: config.origin_url()?,
      base: config.base(),
      shell: config.shell.clone(),
      bypass_hosts: config.bypass_hosts.clone(),
      dynamic_cache,
    })
  }

  fn is_bypass_host(&self, url: &Url) -> bool {
    let Some(host) = url.host_str() else {
      return false;
    };
    self.bypass_hosts.iter().any(|suffix| {
      let suffix = suffix.trim_start_matches('.');
      host == suffix || host.ends_with(&format!(".{}", suffix))
    })
  }

  fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  /// Shell lookups tried, in order, when a navigation cannot reach the network:
  /// the shell under the base, the base itself, then the shell at the origin root.
  fn shell_candidates(&self) -> Vec<Url> {
    [
      self.base.resolve(&self.origin, &self.shell),
      self.base.resolve(&self.origin, ""),
      self
        .origin
        .join(&self.shell)
        .map_err(|e| eyre!("Failed to resolve shell: {}", e)),
    ]
    .into_iter()
    .filter_map(Result::ok)
    .collect()
  }
}

/// Routing class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
  /// Not intercepted: non-GET requests go straight to the network
  Passthrough,
  /// Live data origin: fetched with caching disabled, never touches the store
  Bypass,
  /// Document load: network first, cached shell when offline
  NavigationShell,
  /// Everything else: store first, network on miss
  CacheFirst,
}

/// Classify a request. First match wins.
pub fn classify(request: &Request, config: &RouterConfig) -> Policy {
  if request.method != Method::Get {
    Policy::Passthrough
  } else if config.is_bypass_host(&request.url) {
    Policy::Bypass
  } else if request.is_navigation() {
    Policy::NavigationShell
  } else {
    Policy::CacheFirst
  }
}

/// Result of handing a request to the router.
#[derive(Debug)]
pub enum FetchOutcome {
  /// The request is not intercepted; the host should send it as-is
  Passthrough,
  Respond(Response),
}

/// What a strategy produced.
enum Resolution {
  Respond(Response),
  /// Strategy could not answer; continue with the final fallback
  Fallback,
}

/// Whether a fresh network response may be written to the dynamic store.
fn is_cacheable(response: &Response) -> bool {
  response.status == 200
    || match response.response_type {
      ResponseType::Opaque => true,
      ResponseType::Basic | ResponseType::Cors => response.is_success(),
      ResponseType::Default => false,
    }
}

pub struct Router<S: CacheStorage> {
  store: CacheStore<S>,
  fetcher: Arc<dyn Fetcher>,
  config: RouterConfig,
}

impl<S: CacheStorage> Router<S> {
  pub fn new(store: CacheStore<S>, fetcher: Arc<dyn Fetcher>, config: RouterConfig) -> Self {
    Self {
      store,
      fetcher,
      config,
    }
  }

  /// Route one request. Never fails: intercepted requests always get a response.
  pub async fn handle(&self, request: &Request) -> FetchOutcome {
    let policy = classify(request, &self.config);
    debug!("{} {} -> {:?}", request.method, request.url, policy);

    let resolution = match policy {
      Policy::Passthrough => return FetchOutcome::Passthrough,
      Policy::Bypass => Resolution::Respond(self.bypass(request).await),
      Policy::NavigationShell => self.navigation_shell(request).await,
      Policy::CacheFirst => self.cache_first(request).await,
    };

    match resolution {
      Resolution::Respond(response) => FetchOutcome::Respond(response),
      Resolution::Fallback => FetchOutcome::Respond(self.final_fallback(request)),
    }
  }

  async fn bypass(&self, request: &Request) -> Response {
    match self.fetcher.fetch(request, FetchMode::NoStore).await {
      Ok(response) => response,
      Err(e) => {
        warn!("Live request failed, not cached: {}: {}", request.url, e);
        Response::offline()
      }
    }
  }

  async fn navigation_shell(&self, request: &Request) -> Resolution {
    match self.fetcher.fetch(request, FetchMode::Default).await {
      Ok(response) => return Resolution::Respond(response),
      Err(e) => debug!("Navigation to {} failed, trying shell: {}", request.url, e),
    }

    for candidate in self.config.shell_candidates() {
      if let Some(shell) = self.store.match_request(&RequestKey::get(candidate)) {
        return Resolution::Respond(shell);
      }
    }
    Resolution::Fallback
  }

  async fn cache_first(&self, request: &Request) -> Resolution {
    let Some(key) = RequestKey::for_request(request) else {
      return Resolution::Fallback;
    };

    if let Some(cached) = self.store.match_request(&key) {
      debug!("Cache hit for {}", key);
      return Resolution::Respond(cached);
    }

    match self.fetcher.fetch(request, FetchMode::Default).await {
      Ok(response) => {
        if !is_cacheable(&response) {
          return Resolution::Respond(response);
        }
        let (response, snapshot) = response.split();
        self.store_dynamic(&key, &snapshot);
        Resolution::Respond(response)
      }
      Err(e) => {
        warn!("Network request failed for {}: {}", request.url, e);
        Resolution::Fallback
      }
    }
  }

  fn store_dynamic(&self, key: &RequestKey, snapshot: &Response) {
    let result = self
      .store
      .open(&self.config.dynamic_cache)
      .and_then(|cache| cache.put(key, snapshot));
    if let Err(e) = result {
      warn!("Failed to cache {}: {}", key, e);
    }
  }

  /// Last resort: shell for navigations, base-normalized path for same-origin
  /// resources, then `503 Offline`.
  fn final_fallback(&self, request: &Request) -> Response {
    if request.is_navigation() {
      if let Some(shell) = self.lookup(self.config.base.resolve(&self.config.origin, &self.config.shell)) {
        return shell;
      }
    }

    if self.config.is_same_origin(&request.url) {
      let relative = self.config.base.strip(request.url.path());
      if let Some(hit) = self.lookup(self.config.base.resolve(&self.config.origin, relative)) {
        return hit;
      }
    }

    Response::offline()
  }

  fn lookup(&self, url: Result<Url>) -> Option<Response> {
    url
      .ok()
      .and_then(|url| self.store.match_request(&RequestKey::get(url)))
  }
}
