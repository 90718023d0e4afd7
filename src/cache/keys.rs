//! Normalized request identity used as the cache lookup key.

use sha2::{Digest, Sha256};
use url::Url;

/// Identity of an interceptable request: method + URL.
///
/// Two requests that differ only in URL fragment, host case, or default
/// port are the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_uppercase(),
      url: url.to_string(),
    }
  }

  /// Shorthand for the common GET case.
  pub fn get(url: &str) -> Self {
    Self::new("GET", url)
  }

  /// Normalized form: uppercase method, parsed URL with the fragment
  /// stripped. An unparseable URL falls back to the raw trimmed string.
  pub fn normalized(&self) -> String {
    let url = match Url::parse(&self.url) {
      Ok(mut parsed) => {
        parsed.set_fragment(None);
        parsed.to_string()
      }
      Err(_) => self.url.trim().to_string(),
    };

    format!("{} {}", self.method, url)
  }

  /// Stable fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.normalized().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Host component, when the URL parses.
  pub fn host(&self) -> Option<String> {
    Url::parse(&self.url)
      .ok()
      .and_then(|u| u.host_str().map(String::from))
  }
}
