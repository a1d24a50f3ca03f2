//! Request classification: decides which caching strategy handles a URL.

use regex::Regex;
use url::Url;

use crate::cache::Strategy;
use crate::config::RulesConfig;
use crate::error::{Error, Result};

/// Kind of resource a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
  /// Images, icons and fonts, matched by path suffix
  StaticAsset,
  /// Data requests, matched by URL pattern
  ApiRequest,
  /// Pages and everything else
  Default,
}

impl Category {
  pub fn strategy(self) -> Strategy {
    match self {
      Category::StaticAsset => Strategy::CacheFirst,
      Category::ApiRequest => Strategy::NetworkFirst,
      Category::Default => Strategy::StaleWhileRevalidate,
    }
  }
}

/// Immutable rule set built once from configuration.
#[derive(Debug, Clone)]
pub struct Classifier {
  extensions: Vec<String>,
  api_patterns: Vec<Regex>,
}

impl Classifier {
  pub fn new(rules: &RulesConfig) -> Result<Self> {
    let api_patterns = rules
      .api_patterns
      .iter()
      .map(|p| Regex::new(p).map_err(|e| Error::Config(format!("bad api pattern {p:?}: {e}"))))
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      extensions: rules.static_extensions.clone(),
      api_patterns,
    })
  }

  /// Suffixes are checked against the path first, patterns against the
  /// whole URL second.
  pub fn classify(&self, url: &Url) -> Category {
    let path = url.path();
    if self.extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
      return Category::StaticAsset;
    }

    if self.api_patterns.iter().any(|p| p.is_match(url.as_str())) {
      return Category::ApiRequest;
    }

    Category::Default
  }
}
