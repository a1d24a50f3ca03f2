use crate::cache::{CacheResult, CacheSource, SqliteStore, Store, Strategy};
use crate::classify::Classifier;
use crate::commands::Command;
use crate::config::Config;
use crate::db::Database;
use crate::event::{Event, EventHandler};
use crate::fetch::HttpFetcher;
use crate::request::Request;
use crate::worker::Worker;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use url::Url;

type HostWorker = Worker<SqliteStore, HttpFetcher>;

/// One line of output per handled event in `run` mode
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Outcome {
  Install {
    cached: usize,
  },
  Activate {
    deleted: Vec<String>,
  },
  Fetch {
    method: String,
    url: String,
    strategy: Strategy,
    status: u16,
    source: CacheSource,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_at: Option<DateTime<Utc>>,
  },
  Message {
    command: Option<Command>,
  },
  Error {
    during: &'static str,
    target: Option<String>,
    message: String,
  },
}

impl Outcome {
  fn failed(during: &'static str, target: Option<String>, err: impl std::fmt::Display) -> Self {
    Outcome::Error {
      during,
      target,
      message: err.to_string(),
    }
  }
}

/// Host for the cache worker: owns the store and the transport and turns
/// CLI invocations or stdin events into worker calls.
pub struct App {
  worker: Arc<HostWorker>,
  origin: Option<Url>,
}

impl App {
  pub fn new(config: &Config, db_path: &Path) -> Result<Self> {
    let store = SqliteStore::new(Database::open(db_path)?);
    let fetcher = HttpFetcher::new(&config.network)?;
    let classifier = Classifier::new(&config.rules)?;

    tracing::debug!("using cache database at {}", db_path.display());

    let worker = Worker::new(
      Arc::new(store),
      Arc::new(fetcher),
      classifier,
      &config.cache,
      config.manifest.clone(),
      config.origin.clone(),
    );

    Ok(Self {
      worker: Arc::new(worker),
      origin: config.origin.clone(),
    })
  }

  pub async fn install(&self) -> Result<()> {
    let cached = self.worker.install().await?;
    println!("cached {} static assets", cached);
    Ok(())
  }

  pub async fn activate(&self) -> Result<()> {
    let deleted = self.worker.activate().await?;
    if deleted.is_empty() {
      println!("no old caches to delete");
    }
    for name in deleted {
      println!("deleted {}", name);
    }
    Ok(())
  }

  /// Resolve one request and write the body to stdout.
  pub async fn fetch(&self, method: &str, url: &str, include: bool) -> Result<()> {
    let request = Request::parse(method, url, self.origin.as_ref())?;
    let result = self.worker.handle_fetch(&request).await;

    // Let background refreshes land before the runtime shuts down
    self.worker.settle().await;
    let CacheResult {
      response,
      source,
      cached_at,
    } = result?;

    let mut out = std::io::stdout().lock();
    if include {
      match cached_at {
        Some(at) => writeln!(out, "HTTP {} ({:?}, cached {})", response.status, source, at)?,
        None => writeln!(out, "HTTP {} ({:?})", response.status, source)?,
      }
      for (name, value) in &response.headers {
        writeln!(out, "{}: {}", name, value)?;
      }
      writeln!(out)?;
    }
    out.write_all(&response.body)?;
    out.flush()?;
    Ok(())
  }

  pub async fn message(&self, payload: &str) -> Result<()> {
    let data: serde_json::Value = serde_json::from_str(payload)?;
    match self.worker.handle_message(&data).await? {
      Some(command) => println!("handled {:?}", command),
      None => println!("ignored"),
    }
    Ok(())
  }

  pub async fn partitions(&self) -> Result<()> {
    let store = self.worker.store();
    for name in store.partition_names().await? {
      let keys = store.keys(&name).await?;
      println!("{} ({} entries)", name, keys.len());
      for key in keys {
        println!("  {}", key);
      }
    }
    Ok(())
  }

  /// Handle events from stdin until it closes.
  ///
  /// Install, activate and messages are handled one at a time; later events
  /// wait for them. Fetches run concurrently.
  pub async fn run(&self) -> Result<()> {
    let mut events = EventHandler::stdin();
    let mut in_flight = JoinSet::new();

    tracing::info!("waiting for events on stdin");

    while let Some(event) = events.next().await {
      match event {
        Event::Install => {
          let outcome = match self.worker.install().await {
            Ok(cached) => Outcome::Install { cached },
            Err(e) => Outcome::failed("install", None, e),
          };
          emit(&outcome)?;
        }
        Event::Activate => {
          let outcome = match self.worker.activate().await {
            Ok(deleted) => Outcome::Activate { deleted },
            Err(e) => Outcome::failed("activate", None, e),
          };
          emit(&outcome)?;
        }
        Event::Message { data } => {
          let outcome = match self.worker.handle_message(&data).await {
            Ok(command) => Outcome::Message { command },
            Err(e) => Outcome::failed("message", None, e),
          };
          emit(&outcome)?;
        }
        Event::Fetch { url, method } => {
          let worker = Arc::clone(&self.worker);
          let origin = self.origin.clone();
          in_flight.spawn(async move {
            let outcome = resolve(&worker, origin.as_ref(), &method, &url).await;
            if let Err(e) = emit(&outcome) {
              tracing::error!("failed to write outcome: {}", e);
            }
          });
        }
      }
    }

    while in_flight.join_next().await.is_some() {}
    self.worker.settle().await;
    tracing::info!("input closed, shutting down");

    Ok(())
  }
}

async fn resolve(worker: &HostWorker, origin: Option<&Url>, method: &str, url: &str) -> Outcome {
  let request = match Request::parse(method, url, origin) {
    Ok(request) => request,
    Err(e) => return Outcome::failed("fetch", Some(url.to_string()), e),
  };

  let strategy = worker.strategy_for(&request);
  match worker.handle_fetch(&request).await {
    Ok(result) => Outcome::Fetch {
      method: request.method().to_string(),
      url: request.url().to_string(),
      strategy,
      status: result.response.status,
      source: result.source,
      bytes: result.response.body.len(),
      cached_at: result.cached_at,
    },
    Err(e) => Outcome::failed("fetch", Some(request.url().to_string()), e),
  }
}

fn emit(outcome: &Outcome) -> Result<()> {
  let line = serde_json::to_string(outcome)?;
  let mut out = std::io::stdout().lock();
  writeln!(out, "{}", line)?;
  out.flush()?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_outcome_lines() {
    let fetch = Outcome::Fetch {
      method: "GET".to_string(),
      url: "https://example.com/api/games".to_string(),
      strategy: Strategy::NetworkFirst,
      status: 503,
      source: CacheSource::Synthetic,
      bytes: 7,
      cached_at: None,
    };
    assert_eq!(
      serde_json::to_value(&fetch).unwrap(),
      json!({
        "event": "fetch",
        "method": "GET",
        "url": "https://example.com/api/games",
        "strategy": "network-first",
        "status": 503,
        "source": "synthetic",
        "bytes": 7,
      })
    );

    let message = Outcome::Message {
      command: Some(Command::ClearCache),
    };
    assert_eq!(
      serde_json::to_value(&message).unwrap(),
      json!({"event": "message", "command": "clearCache"})
    );

    let failed = Outcome::failed("install", None, "network unavailable: timeout");
    assert_eq!(
      serde_json::to_value(&failed).unwrap(),
      json!({
        "event": "error",
        "during": "install",
        "target": null,
        "message": "network unavailable: timeout",
      })
    );
  }
}
