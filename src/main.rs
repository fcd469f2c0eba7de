mod cache;
mod config;
mod fetch;
mod host;
mod http;
mod lifecycle;
mod notify;
mod router;
mod sync;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::cache::SqliteStorage;
use crate::fetch::{FetchMode, Fetcher, HttpFetcher};
use crate::http::{Method, Request, RequestKey, Response};
use crate::router::FetchOutcome;
use crate::sync::{DrainOutcome, QueueStorage, Submitted};
use crate::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline app-shell cache and background-sync worker")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./shellcache.yaml or $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate the static cache for the configured generation
  Install,
  /// Delete caches from other generations
  Activate,
  /// Route a request through the cache policies and print the response
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
    /// Treat as a top-level document load (always GET)
    #[arg(long)]
    navigate: bool,
    /// Accept header to send
    #[arg(long)]
    accept: Option<String>,
  },
  /// Send a write, queueing it for background sync when offline
  Send {
    method: String,
    url: String,
    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Deliver a reconnection signal and drain the offline queue
  Sync {
    /// Sync tag (default: first configured tag)
    tag: Option<String>,
  },
  /// Deliver a push payload
  Push { payload: Option<String> },
  /// Dispatch a notification action (explore, close)
  Click { action: String },
  /// List cache purposes
  Caches,
  /// Show or delete one entry of the current generation's caches
  Cached {
    /// Absolute URL or path relative to the origin
    url: String,
    /// Use the dynamic cache instead of the static one
    #[arg(long)]
    dynamic: bool,
    #[arg(long)]
    delete: bool,
  },
  /// List queued writes
  Queue,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let db_path = config.database_path()?;
  let _log_guard = init_logging(db_path.parent().unwrap_or(Path::new(".")))?;

  let origin = config.origin_url()?;
  let storage = Arc::new(SqliteStorage::open(&db_path)?);
  let fetcher = Arc::new(HttpFetcher::new(origin.clone())?);
  let worker = Worker::new(&config, storage, fetcher.clone(), Arc::new(host::ConsoleHost))?;

  match args.command {
    Command::Install => {
      let report = worker.install().await?;
      for url in &report.cached {
        println!("cached  {}", url);
      }
      for url in &report.skipped {
        println!("skipped {}", url);
      }
    }
    Command::Activate => {
      let report = worker.activate().await?;
      for name in &report.deleted {
        println!("deleted {}", name);
      }
      for name in &report.kept {
        println!("kept    {}", name);
      }
    }
    Command::Fetch {
      url,
      method,
      navigate,
      accept,
    } => {
      let url = resolve_url(&origin, &url)?;
      let mut request = if navigate {
        Request::navigate(url)
      } else {
        Request::new(Method::parse(&method), url)
      };
      if let Some(accept) = accept {
        request = request.with_header("accept", &accept);
      }

      let response = match worker.fetch(&request).await {
        FetchOutcome::Respond(response) => response,
        FetchOutcome::Passthrough => fetcher.fetch(&request, FetchMode::Default).await?,
      };
      print_response(&response)?;
    }
    Command::Send { method, url, data } => {
      let mut request = Request::new(Method::parse(&method), resolve_url(&origin, &url)?);
      if let Some(data) = data {
        request = request
          .with_header("content-type", "application/json")
          .with_body(data.into_bytes());
      }

      match worker.submit(&request).await? {
        Submitted::Sent(response) => print_response(&response)?,
        Submitted::Queued(id) => println!("queued #{}", id),
      }
    }
    Command::Sync { tag } => {
      let tag = tag
        .or_else(|| config.sync_tags.first().cloned())
        .ok_or_else(|| eyre!("No sync tag given and none configured"))?;

      match worker.sync(&tag).await? {
        DrainOutcome::Drained { replayed } => println!("drained: {} replayed", replayed),
        DrainOutcome::Halted {
          replayed,
          failed_id,
        } => println!("halted at #{}: {} replayed", failed_id, replayed),
        DrainOutcome::AlreadyDraining => println!("already draining"),
        DrainOutcome::Ignored => println!("ignored tag {}", tag),
      }
    }
    Command::Push { payload } => {
      worker.push(payload.as_deref().map(str::as_bytes)).await;
    }
    Command::Click { action } => {
      worker.notification_click(&action).await;
    }
    Command::Caches => {
      let store = worker.store();
      for name in store.list_purposes()? {
        let marker = if worker.names().is_current(&name) {
          ""
        } else {
          " (stale)"
        };
        println!("{}\t{}{}", name, store.entry_count(&name)?, marker);
      }
    }
    Command::Cached {
      url,
      dynamic,
      delete,
    } => {
      let names = worker.names();
      let name = if dynamic {
        &names.dynamic_name
      } else {
        &names.static_name
      };
      let cache = worker.store().open(name)?;
      let key = RequestKey::get(resolve_url(&origin, &url)?);

      if delete {
        let status = if cache.delete(&key)? { "deleted" } else { "absent" };
        println!("{} {} in {}", status, key, cache.name());
      } else {
        match cache.get(&key)? {
          Some(response) => print_response(&response)?,
          None => println!("{} not cached in {}", key, cache.name()),
        }
      }
    }
    Command::Queue => {
      let sync = worker.synchronizer();
      println!("state: {:?}", sync.state());
      for entry in sync.queue().pending()? {
        println!(
          "#{}\t{}\t{} {}",
          entry.id,
          entry.enqueued_at.to_rfc3339(),
          entry.method,
          entry.url
        );
      }
    }
  }

  Ok(())
}

/// Log to a file so stdout stays reserved for command output.
fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::never(log_dir, "shellcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("SHELLCACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn resolve_url(origin: &Url, target: &str) -> Result<Url> {
  origin
    .join(target)
    .map_err(|e| eyre!("Invalid url '{}': {}", target, e))
}

fn print_response(response: &Response) -> Result<()> {
  println!("{} {}", response.status, response.status_text);
  if let Some(content_type) = response.header("content-type") {
    println!("content-type: {}", content_type);
  }
  let mut stdout = std::io::stdout();
  stdout.write_all(&response.body)?;
  if !response.body.is_empty() {
    println!();
  }
  Ok(())
}
