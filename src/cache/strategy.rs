//! Caching strategies that orchestrate partition lookups with network fetching.

use std::sync::Arc;

use super::background::Background;
use super::traits::{CacheResult, CachedEntry, Store};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::request::{Request, Response};

/// Body of the fallback served when a static asset is neither cached nor
/// reachable.
pub const IMAGE_NOT_AVAILABLE: &str = "Image not available";
/// Body of the fallback served when a data request fails with nothing cached.
pub const OFFLINE: &str = "Offline";

/// How a request is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
  /// Serve from cache, refresh in the background; network only on a miss
  CacheFirst,
  /// Serve from network, cache as fallback
  NetworkFirst,
  /// Serve from cache if present while a fetch refreshes it
  StaleWhileRevalidate,
}

/// Strategy engine shared by every in-flight request.
///
/// Holds no per-request state; clones share the store, the fetcher and the
/// background task set.
pub struct Engine<S: Store, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  /// Partition fresh network responses are written to
  dynamic: Arc<str>,
  background: Background,
}

impl<S: Store, F: Fetcher> Engine<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>, dynamic: &str) -> Self {
    Self {
      store,
      fetcher,
      dynamic: Arc::from(dynamic),
      background: Background::default(),
    }
  }

  /// Resolve a request with the given strategy.
  ///
  /// Requests that can't be cached (anything but GET) go straight to the
  /// network whatever the strategy.
  pub async fn resolve(&self, strategy: Strategy, request: &Request) -> Result<CacheResult> {
    if !request.is_cacheable() {
      let response = self.fetcher.fetch(request).await?;
      return Ok(CacheResult::from_network(response));
    }

    match strategy {
      Strategy::CacheFirst => Ok(self.cache_first(request).await),
      Strategy::NetworkFirst => Ok(self.network_first(request).await),
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
    }
  }

  /// Wait for background refreshes and deferred writes started so far.
  pub async fn settle(&self) {
    self.background.settle().await;
  }

  /// 1. Check cache - on a hit return it and refresh in the background
  /// 2. On a miss fetch from network and cache the result
  /// 3. On network failure return a 404 fallback
  async fn cache_first(&self, request: &Request) -> CacheResult {
    if let Some(cached) = self.lookup(request).await {
      self.refresh_in_background(request);
      return CacheResult::from_cache(cached);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.persist(request, &response).await;
        CacheResult::from_network(response)
      }
      Err(e) => {
        tracing::debug!("cache-first miss and fetch failed for {}: {}", request.url(), e);
        CacheResult::synthetic(Response::synthetic(404, IMAGE_NOT_AVAILABLE))
      }
    }
  }

  /// 1. Fetch from network and cache the result
  /// 2. On network failure return the cached entry (offline mode)
  /// 3. With nothing cached return a 503 fallback
  async fn network_first(&self, request: &Request) -> CacheResult {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.persist(request, &response).await;
        CacheResult::from_network(response)
      }
      Err(e) => {
        tracing::debug!("network-first fetch failed for {}: {}", request.url(), e);
        match self.lookup(request).await {
          Some(cached) => CacheResult::offline(cached),
          None => CacheResult::synthetic(Response::synthetic(503, OFFLINE)),
        }
      }
    }
  }

  /// 1. Check cache - on a hit return it and revalidate in the background
  /// 2. On a miss wait for the network and write the result without blocking
  /// 3. With neither, surface `NetworkUnavailable`
  async fn stale_while_revalidate(&self, request: &Request) -> Result<CacheResult> {
    if let Some(cached) = self.lookup(request).await {
      self.refresh_in_background(request);
      return Ok(CacheResult::from_cache(cached));
    }

    let response = self.fetcher.fetch(request).await?;
    if response.ok() {
      let store = Arc::clone(&self.store);
      let dynamic = Arc::clone(&self.dynamic);
      let request = request.clone();
      let copy = response.clone();
      self.background.spawn(async move {
        write(store.as_ref(), &dynamic, &request, &copy).await;
      });
    }
    Ok(CacheResult::from_network(response))
  }

  /// Any-partition lookup; an unavailable store counts as a miss.
  async fn lookup(&self, request: &Request) -> Option<CachedEntry> {
    match self.store.match_any(request).await {
      Ok(Some(entry)) => {
        tracing::debug!("cache hit for {} in {}", request.url(), entry.partition);
        Some(entry)
      }
      Ok(None) => None,
      Err(e) => {
        tracing::warn!("cache lookup failed for {}: {}", request.url(), e);
        None
      }
    }
  }

  async fn persist(&self, request: &Request, response: &Response) {
    if response.ok() {
      write(self.store.as_ref(), &self.dynamic, request, response).await;
    }
  }

  /// Fetch again and overwrite the dynamic entry. Failures are dropped.
  fn refresh_in_background(&self, request: &Request) {
    let store = Arc::clone(&self.store);
    let fetcher = Arc::clone(&self.fetcher);
    let dynamic = Arc::clone(&self.dynamic);
    let request = request.clone();

    self.background.spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(response) if response.ok() => {
          write(store.as_ref(), &dynamic, &request, &response).await;
        }
        Ok(response) => {
          tracing::debug!("refresh of {} returned {}, keeping cached copy", request.url(), response.status);
        }
        Err(e) => {
          tracing::debug!("refresh of {} failed: {}", request.url(), e);
        }
      }
    });
  }
}

async fn write<S: Store>(store: &S, partition: &str, request: &Request, response: &Response) {
  if let Err(e) = store.put(partition, request, response).await {
    tracing::warn!("failed to cache {} in {}: {}", request.url(), partition, e);
  }
}

impl<S: Store, F: Fetcher> Clone for Engine<S, F> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      fetcher: Arc::clone(&self.fetcher),
      dynamic: Arc::clone(&self.dynamic),
      background: self.background.clone(),
    }
  }
}
