//! Mirror bookkeeping for groups
//!
//! A group stores its mirrors as one string, entries separated by `;`.
//! An entry may carry a `#weight` suffix; literal `;` inside a downloaded
//! mirror list line is escaped to `#` before storing so it cannot split
//! an entry.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::codec::cursor::text_from_bytes;
use crate::errors::{AppResult, SourceError};
use crate::models::{Group, Mirror};
use crate::repositories::ScheduleStore;
use crate::sources::TransferService;
use crate::utils::DecompressionService;

/// Splits a stored mirror string into candidates, keeping list order
pub fn parse_mirrors(raw: &str) -> Vec<Mirror> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('#') {
            Some((url, weight)) => Mirror {
                url: url.trim().to_string(),
                weight: weight.trim().parse().ok(),
            },
            None => Mirror {
                url: entry.to_string(),
                weight: None,
            },
        })
        .filter(|mirror| !mirror.url.is_empty())
        .collect()
}

/// Base URL with exactly the trailing `/` file names are appended to
pub fn base_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Turns a downloaded mirror list into the stored mirror string
pub fn encode_mirror_list(body: &str) -> String {
    body.lines()
        .map(|line| line.trim_end_matches('\r').replace(';', "#"))
        .collect::<Vec<_>>()
        .join(";")
}

pub fn channel_list_url(mirror: &str, group_key: &str) -> String {
    format!("{}{}_channellist.gz", mirror, group_key)
}

pub fn summary_url(mirror: &str, group_key: &str) -> String {
    format!("{}{}_summary.gz", mirror, group_key)
}

pub fn mirror_list_url(mirror: &str, group_key: &str) -> String {
    format!("{}{}_mirrorlist.gz", mirror, group_key)
}

/// Picks reachable mirrors and stores refreshed mirror lists
pub struct MirrorRegistry {
    transfer: TransferService,
    probe_timeout: Duration,
}

impl MirrorRegistry {
    pub fn new(transfer: TransferService, probe_timeout: Duration) -> Self {
        Self {
            transfer,
            probe_timeout,
        }
    }

    /// First mirror of the group answering the probe, as a base URL
    ///
    /// Mirrors are probed strictly in list order, one at a time.
    pub async fn select(&self, group: &Group) -> Result<String, SourceError> {
        for mirror in parse_mirrors(&group.mirrors) {
            if self.transfer.probe(&mirror.url, self.probe_timeout).await {
                debug!("Using mirror {} for group {}", mirror.url, group.group_key);
                return Ok(base_url(&mirror.url));
            }
            debug!("Mirror {} of group {} is unreachable", mirror.url, group.group_key);
        }

        warn!(
            "No reachable mirror for group {}, skipping it this cycle",
            group.group_key
        );
        Err(SourceError::NoReachableMirror {
            group_key: group.group_key.clone(),
        })
    }

    /// Replaces the group's mirror string with a downloaded list
    ///
    /// Returns `false` when the list is empty and the stored mirrors were kept.
    pub async fn apply_mirror_list(
        &self,
        store: &dyn ScheduleStore,
        group: &Group,
        body: Bytes,
    ) -> AppResult<bool> {
        let text = text_from_bytes(&DecompressionService::decompress(body)?);
        let mirrors = encode_mirror_list(&text);

        if parse_mirrors(&mirrors).is_empty() {
            warn!(
                "Mirror list of group {} is empty, keeping stored mirrors",
                group.group_key
            );
            return Ok(false);
        }

        store.update_group_mirrors(group.id, &mirrors).await?;
        info!(
            "Updated mirrors of group {}: {}",
            group.group_key, mirrors
        );
        Ok(true)
    }
}
