//! Remote access for the sync pipeline
//!
//! [`Fetcher`] is the raw byte transport (HTTP in production, a static map
//! in tests). [`TransferService`] sits on top of it and turns each
//! submitted URL into a background download whose completion is reported
//! as a [`TransferEvent`] on the caller's channel.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::SourceResult;

pub mod http;
#[cfg(test)]
pub mod static_map;
pub mod transfer;

pub use http::HttpFetcher;
#[cfg(test)]
pub use static_map::StaticFetcher;
pub use transfer::{TransferEvent, TransferHandle, TransferService};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download the body of `url` as served, without inflating it
    async fn fetch(&self, url: &str) -> SourceResult<Bytes>;

    /// Whether `url` answers with HTTP 200 within `timeout`
    ///
    /// Failures and timeouts both mean "unreachable"; probing never errors.
    async fn probe(&self, url: &str, timeout: Duration) -> bool;
}
