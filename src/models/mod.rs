use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub mod program;
pub mod summary;

pub use program::*;
pub use summary::*;

/// Data service every group synced by this crate belongs to
pub const DEFAULT_DATA_SERVICE_ID: &str = "epgfree";

/// Number of independently versioned data tiers published per day
pub const LEVEL_COUNT: usize = 5;

/// A provider namespace holding channels and mirrors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: i64,
    pub data_service_id: String,
    pub group_key: String,
    pub name: String,
    pub provider_name: String,
    pub description: String,
    /// Raw `;` separated mirror list, see [`crate::ingestor::mirrors`]
    pub mirrors: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUpsert {
    pub data_service_id: String,
    pub group_key: String,
    pub name: String,
    pub provider_name: String,
    pub description: String,
    pub mirrors: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: i64,
    pub group_id: i64,
    pub external_channel_id: String,
    pub base_country: String,
    pub time_zone: String,
    pub name: String,
    pub full_name: String,
    pub copyright: String,
    pub website: String,
    pub logo_url: String,
    pub category: i64,
    pub all_countries: String,
    pub joined_channel_id: Option<String>,
    pub selected: bool,
}

/// Channel fields as published in a group's channel list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUpsert {
    pub group_id: i64,
    pub external_channel_id: String,
    pub base_country: String,
    pub time_zone: String,
    pub name: String,
    pub full_name: String,
    pub copyright: String,
    pub website: String,
    pub logo_url: String,
    pub category: i64,
    pub all_countries: String,
    pub joined_channel_id: Option<String>,
}

/// An alternate base URL serving the files of one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    pub url: String,
    /// Weight published next to the URL, unused for selection
    pub weight: Option<u32>,
}

/// Versioned data tier of a day file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::IntoStaticStr,
)]
pub enum Level {
    #[strum(serialize = "base")]
    Base,
    #[strum(serialize = "more00-16")]
    MoreEarly,
    #[strum(serialize = "more16-00")]
    MoreLate,
    #[strum(serialize = "picture00-16")]
    PictureEarly,
    #[strum(serialize = "picture16-00")]
    PictureLate,
}

impl Level {
    pub const ALL: [Level; LEVEL_COUNT] = [
        Level::Base,
        Level::MoreEarly,
        Level::MoreLate,
        Level::PictureEarly,
        Level::PictureLate,
    ];

    /// Position of this tier inside a summary version row
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used in day file URLs
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Only base files are ever scheduled for download
    pub fn is_downloaded(self) -> bool {
        matches!(self, Level::Base)
    }
}

/// Per channel and day revision bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VersionRecord {
    pub channel_id: i64,
    pub days_since_1970: i64,
    pub base_version: i64,
    pub more0016_version: i64,
    pub more1600_version: i64,
    pub picture0016_version: i64,
    pub picture1600_version: i64,
}

impl VersionRecord {
    pub fn version(&self, level: Level) -> i64 {
        match level {
            Level::Base => self.base_version,
            Level::MoreEarly => self.more0016_version,
            Level::MoreLate => self.more1600_version,
            Level::PictureEarly => self.picture0016_version,
            Level::PictureLate => self.picture1600_version,
        }
    }
}

/// A queued day file download, owned by one worker once handed off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUpdateTask {
    pub url: String,
    pub channel_id: i64,
    pub time_zone: String,
    /// UTC midnight of the described day
    pub day_epoch_millis: i64,
}

impl ChannelUpdateTask {
    pub fn days_since_1970(&self) -> i64 {
        self.day_epoch_millis.div_euclid(crate::utils::time::MILLIS_PER_DAY)
    }

    /// Whether the file name denotes the given tier (`..._<level>_full.prog.gz`)
    pub fn is_level(&self, level: Level) -> bool {
        let file_name = self
            .url
            .rsplit('/')
            .next()
            .unwrap_or(self.url.as_str())
            .to_ascii_lowercase();
        file_name.ends_with(&format!("_{}_full.prog.gz", level.name()))
    }
}

/// Aggregate outcome of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub groups_synced: usize,
    pub groups_skipped: usize,
    pub channels_upserted: usize,
    /// Selected channels left out of a data cycle after a store failure
    pub channels_skipped: usize,
    pub files_scheduled: usize,
    pub files_applied: usize,
    pub files_failed: usize,
    pub mirror_lists_updated: usize,
    pub programs_inserted: usize,
    pub programs_updated: usize,
    pub programs_dropped: usize,
    pub programs_deleted: usize,
    pub end_times_backfilled: usize,
    pub backfill_failed: bool,
}

impl SyncReport {
    pub fn merge(&mut self, other: &SyncReport) {
        self.groups_synced += other.groups_synced;
        self.groups_skipped += other.groups_skipped;
        self.channels_upserted += other.channels_upserted;
        self.channels_skipped += other.channels_skipped;
        self.files_scheduled += other.files_scheduled;
        self.files_applied += other.files_applied;
        self.files_failed += other.files_failed;
        self.mirror_lists_updated += other.mirror_lists_updated;
        self.programs_inserted += other.programs_inserted;
        self.programs_updated += other.programs_updated;
        self.programs_dropped += other.programs_dropped;
        self.programs_deleted += other.programs_deleted;
        self.end_times_backfilled += other.end_times_backfilled;
        self.backfill_failed |= other.backfill_failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str) -> ChannelUpdateTask {
        ChannelUpdateTask {
            url: url.to_string(),
            channel_id: 1,
            time_zone: "Europe/Berlin".to_string(),
            day_epoch_millis: 19_700 * crate::utils::time::MILLIS_PER_DAY,
        }
    }

    #[test]
    fn test_level_names_follow_url_convention() {
        let names: Vec<&str> = Level::ALL.iter().map(|l| l.name()).collect();
        assert_eq!(
            names,
            vec!["base", "more00-16", "more16-00", "picture00-16", "picture16-00"]
        );
        assert!(Level::Base.is_downloaded());
        assert!(!Level::PictureLate.is_downloaded());
    }

    #[test]
    fn test_task_level_detection_uses_file_name() {
        let base = task("http://base.example.org/2023-12-15_DE_ard_base_full.prog.gz");
        assert!(base.is_level(Level::Base));
        assert!(!base.is_level(Level::MoreEarly));

        let more = task("http://base.example.org/2023-12-15_DE_ard_more00-16_full.prog.gz");
        assert!(!more.is_level(Level::Base));
        assert!(more.is_level(Level::MoreEarly));
        assert_eq!(more.days_since_1970(), 19_700);
    }

    #[test]
    fn test_version_record_levels() {
        let record = VersionRecord {
            channel_id: 3,
            days_since_1970: 10,
            base_version: 4,
            picture1600_version: 9,
            ..Default::default()
        };
        assert_eq!(record.version(Level::Base), 4);
        assert_eq!(record.version(Level::PictureLate), 9);
        assert_eq!(record.version(Level::MoreLate), 0);
    }
}
