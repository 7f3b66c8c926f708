//! Download planning
//!
//! Compares the level versions a group summary advertises against the
//! versions stored locally and emits one [`ChannelUpdateTask`] per day file
//! that is newer remotely. Versions only grow, so an equal or lower remote
//! version never triggers a download.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::models::{Channel, ChannelUpdateTask, Level, Summary, VersionRecord};
use crate::utils::time::{epoch_day_to_millis, format_epoch_day};

/// Inclusive range of epoch days a cycle keeps up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub first_day: i64,
    pub last_day: i64,
}

impl SyncWindow {
    /// Two days back through `days_to_load` days ahead of `today`
    pub fn around(today: i64, days_to_load: i64) -> Self {
        Self {
            first_day: today - 2,
            last_day: today + days_to_load,
        }
    }

    pub fn contains(&self, day: i64) -> bool {
        day >= self.first_day && day <= self.last_day
    }
}

/// `<mirror>YYYY-MM-DD_<country>_<channel>_<level>_full.prog.gz`
pub fn day_file_url(mirror: &str, day: i64, country: &str, channel_id: &str, level: Level) -> String {
    format!(
        "{}{}_{}_{}_{}_full.prog.gz",
        mirror,
        format_epoch_day(day),
        country,
        channel_id,
        level.name()
    )
}

pub struct VersionDiffEngine;

impl VersionDiffEngine {
    /// Day files of `channel` to download from `mirror`
    ///
    /// `local` holds the stored version rows of the channel; days without
    /// a row count as version 0.
    pub fn plan(
        summary: &Summary,
        channel: &Channel,
        mirror: &str,
        window: SyncWindow,
        local: &[VersionRecord],
    ) -> Vec<ChannelUpdateTask> {
        let Some(frame) = summary.frame(&channel.external_channel_id) else {
            trace!(
                "Summary has no frame for channel {}",
                channel.external_channel_id
            );
            return Vec::new();
        };

        let stored: HashMap<i64, &VersionRecord> =
            local.iter().map(|v| (v.days_since_1970, v)).collect();

        let mut tasks = Vec::new();
        for day_index in 0..frame.day_count as usize {
            let day = summary.epoch_day(day_index);
            if !window.contains(day) {
                continue;
            }

            for level in Level::ALL.into_iter().filter(|l| l.is_downloaded()) {
                let Some(remote) = frame.version(day_index, level) else {
                    continue;
                };
                let local_version = stored.get(&day).map(|v| v.version(level)).unwrap_or(0);

                if i64::from(remote) > local_version {
                    tasks.push(ChannelUpdateTask {
                        url: day_file_url(
                            mirror,
                            day,
                            &frame.country,
                            &frame.external_channel_id,
                            level,
                        ),
                        channel_id: channel.id,
                        time_zone: channel.time_zone.clone(),
                        day_epoch_millis: epoch_day_to_millis(day),
                    });
                }
            }
        }

        debug!(
            "Planned {} downloads for channel {}",
            tasks.len(),
            channel.external_channel_id
        );
        tasks
    }
}
