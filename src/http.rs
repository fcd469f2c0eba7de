//! HTTP-shaped request and response values seen at the interception boundary.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Request method. Only `Get` requests are ever intercepted or cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  Options,
  Other(String),
}

impl Method {
  pub fn parse(s: &str) -> Self {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Method::Get,
      "HEAD" => Method::Head,
      "POST" => Method::Post,
      "PUT" => Method::Put,
      "PATCH" => Method::Patch,
      "DELETE" => Method::Delete,
      "OPTIONS" => Method::Options,
      other => Method::Other(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Options => "OPTIONS",
      Method::Other(m) => m,
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How the hosting environment issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level document load
  Navigate,
  /// Subresource or API call
  #[default]
  Cors,
}

/// Response classification as exposed to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Cross-origin response with readable body and status
  Cors,
  /// Cross-origin response whose body and status are hidden
  Opaque,
  /// Synthesized locally, never came from the network
  #[default]
  Default,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
      ResponseType::Default => "default",
    }
  }

  pub fn parse(s: &str) -> Self {
    match s {
      "basic" => ResponseType::Basic,
      "cors" => ResponseType::Cors,
      "opaque" => ResponseType::Opaque,
      _ => ResponseType::Default,
    }
  }
}

/// Ordered header list with case-insensitive lookup.
pub type Headers = Vec<(String, String)>;

fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
  headers
    .iter()
    .find(|(k, _)| k.eq_ignore_ascii_case(name))
    .map(|(_, v)| v.as_str())
}

/// An outbound request as issued by the client application.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub headers: Headers,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      mode: RequestMode::default(),
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::Get, url)
  }

  /// A top-level document load for `url`.
  pub fn navigate(url: Url) -> Self {
    Self::get(url)
      .with_mode(RequestMode::Navigate)
      .with_header("accept", "text/html,application/xhtml+xml")
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = Some(body);
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  /// True for document loads: navigate mode, or an `Accept` header asking for HTML.
  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
      || self
        .header("accept")
        .is_some_and(|accept| accept.contains("text/html"))
  }
}

/// Cache identity of a request. Only constructible for GET requests, so
/// nothing else can ever produce a cache entry. The fragment never reaches
/// the server and is not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  url: Url,
}

impl RequestKey {
  pub fn for_request(request: &Request) -> Option<Self> {
    (request.method == Method::Get).then(|| Self::get(request.url.clone()))
  }

  /// Key for a GET of `url`.
  pub fn get(mut url: Url) -> Self {
    url.set_fragment(None);
    Self { url }
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Stable, fixed-length storage key (SHA-256 of `GET <url>`).
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"GET ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "GET {}", self.url)
  }
}

/// A fully buffered response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub response_type: ResponseType,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: body.into(),
      response_type: ResponseType::Basic,
    }
  }

  /// The terminal response produced when nothing else can answer.
  pub fn offline() -> Self {
    Self {
      status: 503,
      status_text: "Offline".to_string(),
      headers: Vec::new(),
      body: Vec::new(),
      response_type: ResponseType::Default,
    }
  }

  pub fn with_type(mut self, response_type: ResponseType) -> Self {
    self.response_type = response_type;
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Split into two independent snapshots: one for the caller, one for the store.
  pub fn split(self) -> (Response, Response) {
    let copy = self.clone();
    (self, copy)
  }
}

#[cfg(test)]
impl Response {
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}
