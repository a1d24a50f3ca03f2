//! Error types shared by the store, the fetcher and the strategies.

/// Errors raised while resolving requests or driving the cache lifecycle.
///
/// A lookup miss is not an error; stores return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The network fetch failed or timed out.
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// The backing store could not be read or written.
  #[error("store unavailable: {0}")]
  StoreUnavailable(String),

  /// A response required to be successful was not (install manifest).
  #[error("bad response for {url}: status {status}")]
  BadResponse { url: String, status: u16 },

  /// The request could not be built (bad URL, unknown method).
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// Configuration could not be applied.
  #[error("invalid configuration: {0}")]
  Config(String),
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    Error::StoreUnavailable(err.to_string())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_display() {
    let err = Error::BadResponse {
      url: "https://example.com/".to_string(),
      status: 500,
    };
    assert_eq!(
      err.to_string(),
      "bad response for https://example.com/: status 500"
    );
  }

  #[test]
  fn test_sqlite_error_maps_to_store_unavailable() {
    let err: Error = rusqlite::Error::InvalidQuery.into();
    assert!(matches!(err, Error::StoreUnavailable(_)));
  }
}
