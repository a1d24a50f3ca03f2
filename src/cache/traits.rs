//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::request::{Request, Response};

/// A response read back from a partition.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: Response,
  /// Partition the entry was found in
  pub partition: String,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Named, persistent request → response partitions.
///
/// Every operation may fail with `Error::StoreUnavailable`; callers treat
/// that as recoverable. Per-key `put`/`get` must be atomic and safe to call
/// from many in-flight resolutions at once.
#[async_trait]
pub trait Store: Send + Sync + 'static {
  /// Create the partition if it does not exist.
  async fn open(&self, partition: &str) -> Result<()>;

  /// Look the request up in a single partition.
  async fn get(&self, partition: &str, request: &Request) -> Result<Option<CachedEntry>>;

  /// Look the request up in every partition, oldest partition first.
  async fn match_any(&self, request: &Request) -> Result<Option<CachedEntry>>;

  /// Store a response, replacing any entry for the same request. Creates the
  /// partition when absent.
  async fn put(&self, partition: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store several responses. Either all of them are written or none.
  async fn put_all(&self, partition: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Remove a partition with all its entries. Returns false if it did not exist.
  async fn delete_partition(&self, partition: &str) -> Result<bool>;

  /// Partition names in creation order.
  async fn partition_names(&self) -> Result<Vec<String>>;

  /// URLs stored in a partition; empty when the partition does not exist.
  async fn keys(&self, partition: &str) -> Result<Vec<String>>;
}

/// Result of resolving a request, including where the response came from.
#[derive(Debug, Clone)]
pub struct CacheResult {
  pub response: Response,
  pub source: CacheSource,
  /// When the response was cached (if served from a partition)
  pub cached_at: Option<DateTime<Utc>>,
}

impl CacheResult {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Served from a partition while a refresh runs in the background.
  pub fn from_cache(entry: CachedEntry) -> Self {
    Self {
      response: entry.response,
      source: CacheSource::Cache,
      cached_at: Some(entry.cached_at),
    }
  }

  /// Served from a partition because the network failed.
  pub fn offline(entry: CachedEntry) -> Self {
    Self {
      response: entry.response,
      source: CacheSource::Offline,
      cached_at: Some(entry.cached_at),
    }
  }

  pub fn synthetic(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Synthetic,
      cached_at: None,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from a partition, possibly being revalidated
  Cache,
  /// Network unavailable, serving cached data
  Offline,
  /// Neither network nor cache; a locally built fallback
  Synthetic,
}
