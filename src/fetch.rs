//! Network-fetch capability.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::http::{Headers, Request, Response, ResponseType};

/// Whether the fetch may be satisfied by intermediate HTTP caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
  #[default]
  Default,
  /// Always hit the origin; used for live data that must never be stale
  NoStore,
}

/// Performs a request against the network.
///
/// `Err` means a transport-level failure (unreachable, DNS, reset). Any
/// response that arrives, including 4xx/5xx, is `Ok`.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request, mode: FetchMode) -> Result<Response>;
}

/// `reqwest`-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  /// `origin` decides whether a response is reported as `basic` or `cors`.
  pub fn new(origin: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("shellcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request, mode: FetchMode) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if mode == FetchMode::NoStore {
      builder = builder
        .header("cache-control", "no-store")
        .header("pragma", "no-cache");
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let resp = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = resp.status();
    let headers: Headers = resp
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let response_type = if resp.url().origin() == self.origin.origin() {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    };
    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    let mut response = Response::new(status.as_u16(), body.to_vec()).with_type(response_type);
    response.status_text = status.canonical_reason().unwrap_or_default().to_string();
    response.headers = headers;
    Ok(response)
  }
}
