//! Request and response values exchanged between the host, the strategies,
//! the store and the network.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Error, Result};

/// An intercepted request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  method: String,
  url: Url,
}

impl Request {
  /// Build a request from an absolute URL. The fragment is dropped, it never
  /// reaches the network and must not split cache entries.
  pub fn new(method: &str, mut url: Url) -> Self {
    url.set_fragment(None);
    Self {
      method: method.to_ascii_uppercase(),
      url,
    }
  }

  /// Parse `input` as a URL, resolving it against `base` when relative.
  pub fn parse(method: &str, input: &str, base: Option<&Url>) -> Result<Self> {
    let url = match Url::parse(input) {
      Ok(url) => url,
      Err(url::ParseError::RelativeUrlWithoutBase) => base
        .ok_or_else(|| Error::InvalidRequest(format!("relative URL without an origin: {input}")))?
        .join(input)
        .map_err(|e| Error::InvalidRequest(format!("{input}: {e}")))?,
      Err(e) => return Err(Error::InvalidRequest(format!("{input}: {e}"))),
    };
    Ok(Self::new(method, url))
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Only GET responses are ever stored.
  pub fn is_cacheable(&self) -> bool {
    self.method == "GET"
  }

  /// Stable, fixed-length store key for this request.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response as served to the caller or kept in a partition.
///
/// The body is reference counted so a response can be returned and stored
/// at the same time without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// A plain-text response produced locally instead of by the network.
  pub fn synthetic(status: u16, text: &'static str) -> Self {
    Self::new(status, text).with_header("content-type", "text/plain; charset=utf-8")
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// True for 2xx statuses.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fragment_does_not_change_key() {
    let a = Request::parse("GET", "https://example.com/page#top", None).unwrap();
    let b = Request::parse("get", "https://example.com/page", None).unwrap();
    assert_eq!(a.cache_key(), b.cache_key());
    assert_eq!(a.url().as_str(), "https://example.com/page");
  }

  #[test]
  fn test_method_splits_keys() {
    let url = Url::parse("https://example.com/api/x").unwrap();
    let get = Request::new("GET", url.clone());
    let post = Request::new("POST", url);
    assert_ne!(get.cache_key(), post.cache_key());
    assert!(get.is_cacheable());
    assert!(!post.is_cacheable());
  }

  #[test]
  fn test_relative_url_needs_base() {
    assert!(Request::parse("GET", "/index.html", None).is_err());

    let base = Url::parse("https://example.com/app/").unwrap();
    let req = Request::parse("GET", "/index.html", Some(&base)).unwrap();
    assert_eq!(req.url().as_str(), "https://example.com/index.html");
  }

  #[test]
  fn test_response_ok_range() {
    assert!(Response::new(200, "").ok());
    assert!(Response::new(204, "").ok());
    assert!(!Response::new(304, "").ok());
    assert!(!Response::new(404, "").ok());
  }

  #[test]
  fn test_synthetic_response() {
    let resp = Response::synthetic(503, "Offline");
    assert_eq!(resp.body, "Offline");
    assert_eq!(
      resp.headers,
      vec![(
        "content-type".to_string(),
        "text/plain; charset=utf-8".to_string()
      )]
    );
  }
}
