#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;

use tvdata_sync::config::SyncConfig;
use tvdata_sync::errors::{SourceError, SourceResult};
use tvdata_sync::ingestor::SyncOrchestrator;
use tvdata_sync::models::{ChannelUpsert, GroupUpsert};
use tvdata_sync::repositories::ScheduleStore;
use tvdata_sync::sources::{Fetcher, TransferService};

pub const GROUPS_URL: &str = "http://groups.test/groups.txt";
// 2023-12-15
pub const TODAY: i64 = 19_706;

pub fn gzip(data: &[u8]) -> Bytes {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    Bytes::from(encoder.finish().unwrap())
}

/// Summary bytes with five levels whose first frame day is `first_day`
///
/// Frames are `(country, channel id, version rows)`.
pub fn summary(first_day: i64, frames: &[(&str, &str, Vec<[u8; 5]>)]) -> Vec<u8> {
    let mut out = vec![1];
    out.extend_from_slice(&(first_day as u32).to_be_bytes()[1..]);
    out.push(5);
    out.extend_from_slice(&(frames.len() as u16).to_be_bytes());
    for (country, channel_id, rows) in frames {
        out.push(country.len() as u8);
        out.extend_from_slice(country.as_bytes());
        out.push(channel_id.len() as u8);
        out.extend_from_slice(channel_id.as_bytes());
        out.push(rows.len() as u8);
        for row in rows {
            out.extend_from_slice(row);
        }
    }
    out
}

/// Day file bytes; frames are `(slot, [(tag, payload)])`
pub fn day_file(data_version: u8, frames: &[(u8, Vec<(u8, Vec<u8>)>)]) -> Vec<u8> {
    let mut out = vec![1, data_version, frames.len() as u8];
    for (slot, fields) in frames {
        out.push(*slot);
        out.push(fields.len() as u8);
        for (tag, payload) in fields {
            out.push(*tag);
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
            out.extend_from_slice(payload);
        }
    }
    out
}

pub fn minutes(minutes: u16) -> Vec<u8> {
    minutes.to_be_bytes().to_vec()
}

/// Two programs: 06:00 without an end, 08:00 to 09:00
pub fn morning_news(data_version: u8) -> Vec<u8> {
    day_file(
        data_version,
        &[
            (2, vec![(0x01, minutes(6 * 60)), (0x03, b"Morning".to_vec())]),
            (
                3,
                vec![
                    (0x01, minutes(8 * 60)),
                    (0x02, minutes(9 * 60)),
                    (0x03, b"News".to_vec()),
                ],
            ),
        ],
    )
}

/// Serves fixed bodies and records every fetched URL
#[derive(Default)]
pub struct FixtureFetcher {
    resources: HashMap<String, Bytes>,
    reachable: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.resources.insert(url.into(), body.into());
        self
    }

    pub fn with_reachable(mut self, url: &str) -> Self {
        self.reachable.insert(url.trim_end_matches('/').to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> SourceResult<Bytes> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.resources.get(url).cloned().ok_or(SourceError::Http {
            status: 404,
            url: url.to_string(),
        })
    }

    async fn probe(&self, url: &str, _timeout: Duration) -> bool {
        self.reachable.contains(url.trim_end_matches('/'))
    }
}

pub fn config() -> SyncConfig {
    SyncConfig {
        groups_url: Some(GROUPS_URL.to_string()),
        days_to_load: Some(1),
        worker_threads: Some(2),
        ..Default::default()
    }
}

pub fn orchestrator(store: Arc<dyn ScheduleStore>, fetcher: Arc<FixtureFetcher>) -> SyncOrchestrator {
    SyncOrchestrator::new(store, TransferService::new(fetcher, 4), config()).with_today(TODAY)
}

pub fn group(group_key: &str, mirrors: &str) -> GroupUpsert {
    GroupUpsert {
        data_service_id: "epgfree".to_string(),
        group_key: group_key.to_string(),
        name: group_key.to_uppercase(),
        provider_name: "TV-Browser".to_string(),
        description: String::new(),
        mirrors: mirrors.to_string(),
    }
}

pub fn channel(group_id: i64, external_channel_id: &str) -> ChannelUpsert {
    ChannelUpsert {
        group_id,
        external_channel_id: external_channel_id.to_string(),
        base_country: "de".to_string(),
        time_zone: "UTC".to_string(),
        name: external_channel_id.to_uppercase(),
        full_name: external_channel_id.to_uppercase(),
        copyright: String::new(),
        website: String::new(),
        logo_url: String::new(),
        category: 1,
        all_countries: "de".to_string(),
        joined_channel_id: None,
    }
}

/// Stores a group with selected channels, returning the group id
pub async fn seed_group(
    store: &dyn ScheduleStore,
    group_key: &str,
    mirrors: &str,
    channel_ids: &[&str],
) -> i64 {
    let stored = store.upsert_group(&group(group_key, mirrors)).await.unwrap();
    for id in channel_ids {
        store.upsert_channel(&channel(stored.id, id)).await.unwrap();
        store.set_channel_selected(id, true).await.unwrap();
    }
    stored.id
}

/// URL of the base day file of `channel_id` for today
pub fn day_file_url(mirror: &str, channel_id: &str) -> String {
    format!("{}2023-12-15_de_{}_base_full.prog.gz", mirror, channel_id)
}
