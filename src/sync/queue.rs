//! Durable FIFO of deferred writes.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension, Row};
use url::Url;

use crate::cache::SqliteStorage;
use crate::http::{Headers, Method, Request};

/// A write captured while the network was unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
  pub id: i64,
  pub method: Method,
  pub url: Url,
  pub headers: Headers,
  pub body: Option<Vec<u8>>,
  pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
  /// Rebuild the original request for replay.
  pub fn to_request(&self) -> Request {
    Request {
      headers: self.headers.clone(),
      body: self.body.clone(),
      ..Request::new(self.method.clone(), self.url.clone())
    }
  }
}

/// Storage for the offline queue. Entries come back strictly in insertion
/// order and are only removed by id, so a concurrent enqueue can never
/// disturb the removal of the current head.
pub trait QueueStorage: Send + Sync {
  fn enqueue(&self, request: &Request, enqueued_at: DateTime<Utc>) -> Result<i64>;

  /// Oldest pending entry.
  fn head(&self) -> Result<Option<QueueEntry>>;

  fn remove(&self, id: i64) -> Result<bool>;

  /// All pending entries, oldest first.
  fn pending(&self) -> Result<Vec<QueueEntry>>;
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, String, Option<Vec<u8>>, String)> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

fn decode_entry(
  (id, method, url, headers, body, enqueued_at): (i64, String, String, String, Option<Vec<u8>>, String),
) -> Result<QueueEntry> {
  Ok(QueueEntry {
    id,
    method: Method::parse(&method),
    url: Url::parse(&url).map_err(|e| eyre!("Invalid queued url '{}': {}", url, e))?,
    headers: serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize queued headers: {}", e))?,
    body,
    enqueued_at: DateTime::parse_from_rfc3339(&enqueued_at)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(|e| eyre!("Failed to parse datetime '{}': {}", enqueued_at, e))?,
  })
}

const SELECT_ENTRY: &str = "SELECT id, method, url, headers, body, enqueued_at FROM offline_queue";

impl QueueStorage for SqliteStorage {
  fn enqueue(&self, request: &Request, enqueued_at: DateTime<Utc>) -> Result<i64> {
    let conn = self.lock()?;
    let headers = serde_json::to_string(&request.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT INTO offline_queue (method, url, headers, body, enqueued_at) VALUES (?, ?, ?, ?, ?)",
        params![
          request.method.as_str(),
          request.url.as_str(),
          headers,
          request.body,
          enqueued_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to enqueue {} {}: {}", request.method, request.url, e))?;

    Ok(conn.last_insert_rowid())
  }

  fn head(&self) -> Result<Option<QueueEntry>> {
    let conn = self.lock()?;
    let row = conn
      .query_row(&format!("{} ORDER BY id LIMIT 1", SELECT_ENTRY), [], entry_from_row)
      .optional()
      .map_err(|e| eyre!("Failed to read queue head: {}", e))?;
    row.map(decode_entry).transpose()
  }

  fn remove(&self, id: i64) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute("DELETE FROM offline_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove queue entry {}: {}", id, e))?;
    Ok(removed > 0)
  }

  fn pending(&self) -> Result<Vec<QueueEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(&format!("{} ORDER BY id", SELECT_ENTRY))
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], entry_from_row)
      .map_err(|e| eyre!("Failed to list queue: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read queue entry: {}", e))?;

    rows.into_iter().map(decode_entry).collect()
  }
}
