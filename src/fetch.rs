//! Network transport used by the strategies and by install.

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::Instant;

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// Performs network fetches.
///
/// Any HTTP status is a successful fetch; only transport failures (DNS,
/// connect, timeout, reading the body) are errors, reported as
/// `Error::NetworkUnavailable`.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// `reqwest`-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
  http: Client,
}

impl HttpFetcher {
  pub fn new(config: &NetworkConfig) -> Result<Self> {
    let http = Client::builder()
      .user_agent(&config.user_agent)
      .timeout(config.timeout())
      .gzip(true)
      .deflate(true)
      .build()
      .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

    Ok(Self { http })
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let start = Instant::now();
    let method = Method::from_bytes(request.method().as_bytes())
      .map_err(|e| Error::InvalidRequest(format!("{}: {}", request.method(), e)))?;

    let response = self
      .http
      .request(method, request.url().clone())
      .send()
      .await
      .map_err(|e| Error::NetworkUnavailable(format!("{}: {}", request.url(), e)))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| Error::NetworkUnavailable(format!("failed to read {}: {}", request.url(), e)))?;

    tracing::debug!(
      "fetched {} {} -> {} in {}ms ({} bytes)",
      request.method(),
      request.url(),
      status,
      start.elapsed().as_millis(),
      body.len()
    );

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
