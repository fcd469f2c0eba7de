//! Test doubles for the fetch and host capabilities.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::fetch::{FetchMode, Fetcher};
use crate::http::{Method, Request, Response};
use crate::notify::Notification;
use crate::worker::Host;

#[derive(Clone)]
enum Scripted {
  Respond(Response),
  Fail,
}

/// Fetcher answering from a per-URL script. Unknown URLs fail like an
/// unreachable network.
#[derive(Default)]
pub struct MockFetcher {
  routes: Mutex<HashMap<String, Scripted>>,
  calls: Mutex<Vec<(Method, String, FetchMode)>>,
}

impl MockFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(self, url: &str, response: Response) -> Self {
    self.set_response(url, response);
    self
  }

  pub fn fail(self, url: &str) -> Self {
    self.set_failure(url);
    self
  }

  pub fn set_response(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Scripted::Respond(response));
  }

  pub fn set_failure(&self, url: &str) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Scripted::Fail);
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn calls(&self) -> Vec<(Method, String)> {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .map(|(method, url, _)| (method.clone(), url.clone()))
      .collect()
  }

  pub fn modes(&self) -> Vec<FetchMode> {
    self.calls.lock().unwrap().iter().map(|(_, _, mode)| *mode).collect()
  }
}

#[async_trait]
impl Fetcher for MockFetcher {
  async fn fetch(&self, request: &Request, mode: FetchMode) -> Result<Response> {
    self
      .calls
      .lock()
      .unwrap()
      .push((request.method.clone(), request.url.to_string(), mode));

    let scripted = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
    match scripted {
      Some(Scripted::Respond(response)) => Ok(response),
      Some(Scripted::Fail) | None => Err(eyre!("network unreachable: {}", request.url)),
    }
  }
}

/// Host that records every signal it receives.
#[derive(Default)]
pub struct RecordingHost {
  pub events: Mutex<Vec<String>>,
  pub notifications: Mutex<Vec<Notification>>,
  pub fail_display: bool,
}

impl RecordingHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failing_display() -> Self {
    Self {
      fail_display: true,
      ..Self::default()
    }
  }

  pub fn events(&self) -> Vec<String> {
    self.events.lock().unwrap().clone()
  }

  fn record(&self, event: String) {
    self.events.lock().unwrap().push(event);
  }
}

#[async_trait]
impl Host for RecordingHost {
  async fn skip_waiting(&self) -> Result<()> {
    self.record("skip_waiting".to_string());
    Ok(())
  }

  async fn claim_clients(&self) -> Result<()> {
    self.record("claim_clients".to_string());
    Ok(())
  }

  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    if self.fail_display {
      return Err(eyre!("notification permission denied"));
    }
    self.notifications.lock().unwrap().push(notification.clone());
    self.record(format!("show:{}", notification.title));
    Ok(())
  }

  async fn open_window(&self, url: &str) -> Result<()> {
    self.record(format!("open:{}", url));
    Ok(())
  }

  async fn notify_clients(&self, tag: &str) -> Result<()> {
    self.record(format!("message:{}", tag));
    Ok(())
  }
}
