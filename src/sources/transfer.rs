use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, trace};

use super::Fetcher;
use crate::errors::{SourceError, SourceResult};

/// Identifies one submitted download
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferHandle {
    pub id: u64,
    pub url: String,
}

/// Completion of a submitted download, successful or not
#[derive(Debug)]
pub struct TransferEvent {
    pub handle: TransferHandle,
    pub result: SourceResult<Bytes>,
}

/// Background downloads with completion events
///
/// `submit` returns immediately; the body (or the failure) arrives later
/// on the events channel the caller passed in, from whichever task
/// finished the download. Each stage of a cycle owns its own channel, so
/// completions of different stages never mix.
#[derive(Clone)]
pub struct TransferService {
    fetcher: Arc<dyn Fetcher>,
    permits: Arc<Semaphore>,
    next_id: Arc<AtomicU64>,
}

impl TransferService {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn submit(&self, url: &str, events: &mpsc::UnboundedSender<TransferEvent>) -> TransferHandle {
        let handle = TransferHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            url: url.to_string(),
        };
        trace!("Submitted transfer {} for {}", handle.id, handle.url);

        let service = self.clone();
        let events = events.clone();
        let event_handle = handle.clone();

        tokio::spawn(async move {
            let result = service.fetch(&event_handle.url).await;
            if events
                .send(TransferEvent {
                    handle: event_handle,
                    result,
                })
                .is_err()
            {
                debug!("Transfer finished after its stage was dropped");
            }
        });

        handle
    }

    /// Download `url` and wait for the body
    pub async fn fetch(&self, url: &str) -> SourceResult<Bytes> {
        url::Url::parse(url).map_err(|e| SourceError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SourceError::network(url, "transfer service closed"))?;

        self.fetcher.fetch(url).await
    }

    pub async fn probe(&self, url: &str, timeout: Duration) -> bool {
        self.fetcher.probe(url, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticFetcher;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_every_submission_completes_once() {
        let fetcher = StaticFetcher::new()
            .with_resource("http://m/a.gz", vec![1u8])
            .with_resource("http://m/b.gz", vec![2u8]);
        let service = TransferService::new(Arc::new(fetcher), 1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handles: HashSet<TransferHandle> = ["http://m/a.gz", "http://m/b.gz", "http://m/c.gz"]
            .iter()
            .map(|url| service.submit(url, &tx))
            .collect();
        drop(tx);

        let mut completed = HashSet::new();
        let mut failures = 0;
        while let Some(event) = rx.recv().await {
            if event.result.is_err() {
                failures += 1;
            }
            assert!(completed.insert(event.handle));
        }

        assert_eq!(completed, handles);
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_invalid_url_is_reported() {
        let service = TransferService::new(Arc::new(StaticFetcher::new()), 2);
        let result = service.fetch("not a url").await;
        assert!(matches!(result, Err(SourceError::InvalidUrl { .. })));
    }
}
