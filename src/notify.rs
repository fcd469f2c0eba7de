//! Push notification relay.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
  /// Open the application at its base scope
  Open,
  Dismiss,
}

impl NotificationAction {
  pub fn id(&self) -> &'static str {
    match self {
      NotificationAction::Open => "explore",
      NotificationAction::Dismiss => "close",
    }
  }

  /// Map a dispatched action id. Unknown ids (including a click on the
  /// notification body) yield `None`.
  pub fn from_id(id: &str) -> Option<Self> {
    match id {
      "explore" | "open" => Some(NotificationAction::Open),
      "close" | "dismiss" => Some(NotificationAction::Dismiss),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionButton {
  pub action: String,
  pub title: String,
  pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
  pub date_of_arrival: i64,
  pub primary_key: u32,
}

/// Everything the host needs to display a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<ActionButton>,
}

/// Builds notification descriptors from push payloads.
#[derive(Debug, Clone)]
pub struct NotificationRelay {
  config: NotificationConfig,
  icon_url: String,
  scope_url: String,
}

impl NotificationRelay {
  /// `icon_url` and `scope_url` are already resolved against the deployment base.
  pub fn new(config: NotificationConfig, icon_url: String, scope_url: String) -> Self {
    Self {
      config,
      icon_url,
      scope_url,
    }
  }

  pub fn scope_url(&self) -> &str {
    &self.scope_url
  }

  /// Build the descriptor for an inbound payload, which may be absent or empty.
  pub fn build(&self, payload: Option<&[u8]>) -> Notification {
    let body = match payload {
      Some(bytes) if !bytes.is_empty() => String::from_utf8_lossy(bytes).into_owned(),
      _ => self.config.default_body.clone(),
    };

    let button = |action: NotificationAction, title: &str| ActionButton {
      action: action.id().to_string(),
      title: title.to_string(),
      icon: self.icon_url.clone(),
    };

    Notification {
      title: self.config.title.clone(),
      body,
      icon: self.icon_url.clone(),
      badge: self.icon_url.clone(),
      vibrate: vec![100, 50, 100],
      data: NotificationData {
        date_of_arrival: Utc::now().timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![
        button(NotificationAction::Open, "Open App"),
        button(NotificationAction::Dismiss, "Close"),
      ],
    }
  }

  /// Serialize a descriptor for hosts that hand it to another process.
  pub fn to_json(notification: &Notification) -> Result<String> {
    serde_json::to_string_pretty(notification)
      .map_err(|e| eyre!("Failed to serialize notification: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn relay() -> NotificationRelay {
    NotificationRelay::new(
      NotificationConfig {
        title: "Shop".to_string(),
        ..NotificationConfig::default()
      },
      "https://shop.example/repo/icon.png".to_string(),
      "https://shop.example/repo/".to_string(),
    )
  }

  #[test]
  fn test_payload_becomes_body() {
    let notification = relay().build(Some(b"Stock low: coffee"));
    assert_eq!(notification.title, "Shop");
    assert_eq!(notification.body, "Stock low: coffee");
    assert_eq!(notification.icon, "https://shop.example/repo/icon.png");
    assert_eq!(notification.vibrate, vec![100, 50, 100]);
    assert_eq!(notification.data.primary_key, 1);
  }

  #[test]
  fn test_missing_or_empty_payload_uses_default_body() {
    assert_eq!(relay().build(None).body, "New update available");
    assert_eq!(relay().build(Some(b"")).body, "New update available");
  }

  #[test]
  fn test_actions_include_open_and_dismiss() {
    let ids: Vec<String> = relay()
      .build(None)
      .actions
      .into_iter()
      .map(|a| a.action)
      .collect();
    assert_eq!(ids, vec!["explore", "close"]);
    assert_eq!(NotificationAction::from_id("explore"), Some(NotificationAction::Open));
    assert_eq!(NotificationAction::from_id("close"), Some(NotificationAction::Dismiss));
    assert_eq!(NotificationAction::from_id(""), None);
  }

  #[test]
  fn test_json_descriptor() {
    let json = NotificationRelay::to_json(&relay().build(Some(b"hi"))).unwrap();
    assert!(json.contains("\"body\": \"hi\""));
    assert!(json.contains("\"date_of_arrival\""));
  }
}
