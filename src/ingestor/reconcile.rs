//! Applying decoded day files to the store
//!
//! Per file: update programs that already exist, insert new ones whose
//! start falls inside the configured day window, delete slots the file
//! proves cancelled, then record the file's version. After every file of a
//! cycle has been applied, [`ReconciliationEngine::backfill_end_times`]
//! fills in end times the files left open.

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{debug, info};

use crate::codec::DecodedDayFile;
use crate::config::SyncConfig;
use crate::errors::RepositoryResult;
use crate::models::{ChannelUpdateTask, Level, ProgramTiming, UNKNOWN_END_TIME};
use crate::repositories::ScheduleStore;
use crate::utils::time::{local_hour_minute, parse_time_zone};

/// Hours of the local day whose programs are stored
///
/// A program starting exactly at `end_hour:00` is still inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for DayWindow {
    fn default() -> Self {
        Self {
            start_hour: 0,
            end_hour: 24,
        }
    }
}

impl DayWindow {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            start_hour: config.day_start_hour(),
            end_hour: config.day_end_hour(),
        }
    }

    pub fn contains(&self, start_time_millis: i64, tz: Tz) -> bool {
        match local_hour_minute(start_time_millis, tz) {
            Some((hour, minute)) => {
                hour >= self.start_hour
                    && (hour < self.end_hour || (hour == self.end_hour && minute == 0))
            }
            None => false,
        }
    }
}

/// What applying one day file changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub dropped: usize,
    pub deleted: u64,
    pub version_written: bool,
}

/// End times to set, as `(program id, end time)`
///
/// `timings` must be ordered by (channel, start). A program without an end
/// time ends where its successor on the same channel starts; the last
/// program of a channel stays open.
pub fn backfill_plan(timings: &[ProgramTiming]) -> Vec<(i64, i64)> {
    timings
        .windows(2)
        .filter_map(|pair| {
            let (current, next) = (&pair[0], &pair[1]);
            (current.end_time_millis == UNKNOWN_END_TIME && current.channel_id == next.channel_id)
                .then_some((current.id, next.start_time_millis))
        })
        .collect()
}

pub struct ReconciliationEngine {
    store: Arc<dyn ScheduleStore>,
    day_window: DayWindow,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn ScheduleStore>, day_window: DayWindow) -> Self {
        Self { store, day_window }
    }

    pub async fn apply(
        &self,
        task: &ChannelUpdateTask,
        file: &DecodedDayFile,
    ) -> RepositoryResult<ApplyOutcome> {
        let tz = parse_time_zone(&task.time_zone).unwrap_or(Tz::UTC);
        let mut outcome = ApplyOutcome::default();

        for record in &file.records {
            if self.store.update_program(record).await? {
                outcome.updated += 1;
            } else if self.day_window.contains(record.start_time_millis, tz) {
                self.store.insert_program(record).await?;
                outcome.inserted += 1;
            } else {
                outcome.dropped += 1;
            }
        }

        let slots = file.slots_to_delete();
        outcome.deleted = self
            .store
            .delete_program_slots(task.channel_id, task.day_epoch_millis, &slots)
            .await?;

        if task.is_level(Level::Base) {
            self.store
                .upsert_base_version(
                    task.channel_id,
                    task.days_since_1970(),
                    i64::from(file.data_version),
                )
                .await?;
            outcome.version_written = true;
        }

        debug!(
            "Applied {}: {} inserted, {} updated, {} dropped, {} deleted",
            task.url, outcome.inserted, outcome.updated, outcome.dropped, outcome.deleted
        );
        Ok(outcome)
    }

    /// Resolves open end times across the whole store, returns how many were set
    pub async fn backfill_end_times(&self) -> RepositoryResult<usize> {
        let timings = self.store.program_timings().await?;
        let plan = backfill_plan(&timings);

        for &(id, end_time_millis) in &plan {
            self.store.set_program_end_time(id, end_time_millis).await?;
        }

        info!("Backfilled {} end times", plan.len());
        Ok(plan.len())
    }
}
