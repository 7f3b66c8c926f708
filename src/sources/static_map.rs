//! [`Fetcher`] serving fixed bodies from memory
//!
//! Every fetch is recorded so tests can assert exactly which files a
//! cycle downloaded.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::Fetcher;
use crate::errors::{SourceError, SourceResult};

#[derive(Default)]
pub struct StaticFetcher {
    resources: HashMap<String, Bytes>,
    reachable: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

fn without_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`
    pub fn with_resource(mut self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.resources.insert(url.into(), body.into());
        self
    }

    /// Make probes of `url` succeed, with or without a trailing slash
    pub fn with_reachable(mut self, url: &str) -> Self {
        self.reachable.insert(without_trailing_slash(url).to_string());
        self
    }

    /// URLs fetched so far, in request order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .map(|fetched| fetched.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> SourceResult<Bytes> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(url.to_string());
        }

        self.resources.get(url).cloned().ok_or(SourceError::Http {
            status: 404,
            url: url.to_string(),
        })
    }

    async fn probe(&self, url: &str, _timeout: Duration) -> bool {
        self.reachable.contains(without_trailing_slash(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_and_records() {
        let fetcher = StaticFetcher::new()
            .with_resource("http://a/x.gz", vec![1u8, 2])
            .with_reachable("http://a/");

        assert_eq!(fetcher.fetch("http://a/x.gz").await.unwrap(), Bytes::from(vec![1u8, 2]));
        assert!(matches!(
            fetcher.fetch("http://a/y.gz").await,
            Err(SourceError::Http { status: 404, .. })
        ));
        assert!(fetcher.probe("http://a", Duration::from_secs(1)).await);
        assert!(!fetcher.probe("http://b/", Duration::from_secs(1)).await);
        assert_eq!(fetcher.fetched(), vec!["http://a/x.gz", "http://a/y.gz"]);
    }
}
