//! Host implementation for running the worker from the command line.

use async_trait::async_trait;
use color_eyre::Result;
use tracing::info;

use crate::notify::{Notification, NotificationRelay};
use crate::worker::Host;

/// Prints notifications and window requests to stdout; lifecycle signals
/// are only logged since a one-shot process has no clients to take over.
pub struct ConsoleHost;

#[async_trait]
impl Host for ConsoleHost {
  async fn skip_waiting(&self) -> Result<()> {
    info!("New generation will take control without waiting");
    Ok(())
  }

  async fn claim_clients(&self) -> Result<()> {
    info!("Claimed open clients");
    Ok(())
  }

  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    println!("{}", NotificationRelay::to_json(notification)?);
    Ok(())
  }

  async fn open_window(&self, url: &str) -> Result<()> {
    println!("open {}", url);
    Ok(())
  }

  async fn notify_clients(&self, tag: &str) -> Result<()> {
    println!("{}", serde_json::json!({ "type": tag }));
    Ok(())
  }
}
