//! Test doubles shared across modules.

use async_trait::async_trait;

use crate::cache::{CachedEntry, Store};
use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// A store whose medium is gone: every call fails.
pub struct UnavailableStore;

fn unavailable<T>() -> Result<T> {
  Err(Error::StoreUnavailable("disk detached".to_string()))
}

#[async_trait]
impl Store for UnavailableStore {
  async fn open(&self, _partition: &str) -> Result<()> {
    unavailable()
  }

  async fn get(&self, _partition: &str, _request: &Request) -> Result<Option<CachedEntry>> {
    unavailable()
  }

  async fn match_any(&self, _request: &Request) -> Result<Option<CachedEntry>> {
    unavailable()
  }

  async fn put(&self, _partition: &str, _request: &Request, _response: &Response) -> Result<()> {
    unavailable()
  }

  async fn put_all(&self, _partition: &str, _entries: &[(Request, Response)]) -> Result<()> {
    unavailable()
  }

  async fn delete_partition(&self, _partition: &str) -> Result<bool> {
    unavailable()
  }

  async fn partition_names(&self) -> Result<Vec<String>> {
    unavailable()
  }

  async fn keys(&self, _partition: &str) -> Result<Vec<String>> {
    unavailable()
  }
}
