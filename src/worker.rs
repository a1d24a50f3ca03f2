//! Lifecycle controller and request interception entry point.

use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::cache::{CacheResult, Engine, Store, Strategy};
use crate::classify::Classifier;
use crate::commands::Command;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::request::{Request, Response};

/// Everything a host needs to drive one cache version: install, activate,
/// message handling and per-request resolution.
pub struct Worker<S: Store, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  engine: Engine<S, F>,
  classifier: Classifier,
  static_name: String,
  dynamic_name: String,
  /// Install-time entries, resolved against `origin` only when installing
  manifest: Vec<String>,
  origin: Option<Url>,
}

impl<S: Store, F: Fetcher> Worker<S, F> {
  pub fn new(
    store: Arc<S>,
    fetcher: Arc<F>,
    classifier: Classifier,
    partitions: &CacheConfig,
    manifest: Vec<String>,
    origin: Option<Url>,
  ) -> Self {
    let engine = Engine::new(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      &partitions.dynamic_name,
    );

    Self {
      store,
      fetcher,
      engine,
      classifier,
      static_name: partitions.static_name.clone(),
      dynamic_name: partitions.dynamic_name.clone(),
      manifest,
      origin,
    }
  }

  /// Populate the static partition from the manifest.
  ///
  /// All manifest entries are fetched concurrently; if any of them fails or
  /// is not a 2xx, nothing is written and the install fails. Relative
  /// entries need an origin.
  pub async fn install(&self) -> Result<usize> {
    let manifest = self
      .manifest
      .iter()
      .map(|entry| Request::parse("GET", entry, self.origin.as_ref()))
      .collect::<Result<Vec<_>>>()?;

    tracing::info!(
      "installing: caching {} static assets in {}",
      manifest.len(),
      self.static_name
    );
    self.store.open(&self.static_name).await?;

    let fetches = manifest.iter().map(|request| async move {
      let response = self.fetcher.fetch(request).await?;
      if !response.ok() {
        return Err(Error::BadResponse {
          url: request.url().to_string(),
          status: response.status,
        });
      }
      Ok::<(Request, Response), Error>((request.clone(), response))
    });
    let entries = try_join_all(fetches).await?;

    self.store.put_all(&self.static_name, &entries).await?;
    Ok(entries.len())
  }

  /// Delete every partition other than the static and dynamic ones.
  ///
  /// Both kept partitions are created if missing, so afterwards exactly
  /// those two exist. Returns the names that were removed.
  pub async fn activate(&self) -> Result<Vec<String>> {
    tracing::info!("activating");
    self.store.open(&self.static_name).await?;
    self.store.open(&self.dynamic_name).await?;

    let stale: Vec<String> = self
      .store
      .partition_names()
      .await?
      .into_iter()
      .filter(|name| *name != self.static_name && *name != self.dynamic_name)
      .collect();

    try_join_all(stale.iter().map(|name| async move {
      tracing::info!("deleting old cache: {}", name);
      self.store.delete_partition(name).await
    }))
    .await?;

    Ok(stale)
  }

  /// Handle a message from the command channel. Unknown payloads are ignored.
  pub async fn handle_message(&self, message: &Value) -> Result<Option<Command>> {
    let Some(command) = Command::from_message(message) else {
      tracing::debug!("ignoring message: {}", message);
      return Ok(None);
    };

    match command {
      Command::SkipWaiting => {
        tracing::info!("skip waiting requested");
      }
      Command::ClearCache => {
        self.store.delete_partition(&self.dynamic_name).await?;
        tracing::info!("cache cleared: {}", self.dynamic_name);
      }
    }
    Ok(Some(command))
  }

  /// Strategy the request would be resolved with.
  pub fn strategy_for(&self, request: &Request) -> Strategy {
    self.classifier.classify(request.url()).strategy()
  }

  /// Intercept a request: classify it and resolve it with its strategy.
  pub async fn handle_fetch(&self, request: &Request) -> Result<CacheResult> {
    let strategy = self.strategy_for(request);
    tracing::debug!("{} {} via {:?}", request.method(), request.url(), strategy);
    self.engine.resolve(strategy, request).await
  }

  /// Wait for background refreshes to finish.
  pub async fn settle(&self) {
    self.engine.settle().await;
  }

  pub fn store(&self) -> &S {
    &self.store
  }
}
