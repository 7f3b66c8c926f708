//! End to end sync cycles
//!
//! A channels cycle refreshes groups and their channel lists. A data cycle
//! walks the selected channels group by group: pick a mirror, read the
//! group summary, plan the day files that changed, download them, decode
//! and reconcile each on the worker pool, and finally backfill end times.
//!
//! Each cycle has two barriers. The first waits until every submitted
//! download completed; the second until every decode job it spawned has
//! finished. Backfill only ever runs after the second.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::barrier::PendingSet;
use super::catalog::{decode_channel_list, CatalogSyncer};
use super::mirrors::{channel_list_url, mirror_list_url, summary_url, MirrorRegistry};
use super::reconcile::{ApplyOutcome, DayWindow, ReconciliationEngine};
use super::state_manager::{CycleKind, SyncEventReceiver, SyncStateManager};
use super::version_diff::{SyncWindow, VersionDiffEngine};
use crate::codec::{DecodedDayFile, ProgramRecordCodec, SummaryCodec};
use crate::config::SyncConfig;
use crate::errors::{AppError, AppResult, DecodeResult};
use crate::models::{Channel, ChannelUpdateTask, Group, Summary, SyncReport};
use crate::repositories::ScheduleStore;
use crate::sources::TransferService;
use crate::utils::time::today_epoch_day;
use crate::utils::DecompressionService;

enum DataJob {
    DayFile(ChannelUpdateTask),
    MirrorList(Group),
}

enum JobResult {
    Applied {
        url: String,
        result: AppResult<ApplyOutcome>,
    },
    MirrorList {
        group_key: String,
        result: AppResult<bool>,
    },
}

async fn run_blocking<T, F>(job: F) -> AppResult<T>
where
    F: FnOnce() -> DecodeResult<T> + Send + 'static,
    T: Send + 'static,
{
    let decoded = tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| AppError::internal(format!("Decode worker failed: {}", e)))?;
    Ok(decoded?)
}

async fn decode_day_file(task: ChannelUpdateTask, body: Bytes) -> AppResult<(ChannelUpdateTask, DecodedDayFile)> {
    run_blocking(move || {
        let data = DecompressionService::decompress(body)?;
        let file = ProgramRecordCodec::decode(&data, &task)?;
        Ok((task, file))
    })
    .await
}

pub struct SyncOrchestrator {
    store: Arc<dyn ScheduleStore>,
    transfer: TransferService,
    config: SyncConfig,
    state: SyncStateManager,
    today: Option<i64>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn ScheduleStore>, transfer: TransferService, config: SyncConfig) -> Self {
        Self {
            store,
            transfer,
            config,
            state: SyncStateManager::new(),
            today: None,
        }
    }

    /// Pins the epoch day the sync window is computed from
    pub fn with_today(mut self, day: i64) -> Self {
        self.today = Some(day);
        self
    }

    pub fn state_manager(&self) -> &SyncStateManager {
        &self.state
    }

    pub fn subscribe(&self) -> SyncEventReceiver {
        self.state.subscribe()
    }

    fn mirror_registry(&self) -> MirrorRegistry {
        MirrorRegistry::new(self.transfer.clone(), self.config.probe_timeout())
    }

    fn worker_pool(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.config.worker_threads()))
    }

    async fn begin(&self, kind: CycleKind) -> AppResult<()> {
        if self.state.start_cycle(kind).await {
            Ok(())
        } else {
            Err(AppError::internal("A sync cycle is already running"))
        }
    }

    async fn finish(&self, result: AppResult<SyncReport>) -> AppResult<SyncReport> {
        match &result {
            Ok(report) => self.state.complete_cycle(report.clone()).await,
            Err(e) => {
                error!("Sync cycle failed: {}", e);
                self.state.abort_cycle().await;
            }
        }
        result
    }

    /// Refreshes groups and the channel lists of every reachable group
    pub async fn sync_channels(&self) -> AppResult<SyncReport> {
        self.begin(CycleKind::Channels).await?;
        let result = self.run_channels_cycle().await;
        self.finish(result).await
    }

    /// Downloads and applies changed program data of the selected channels
    pub async fn sync_data(&self) -> AppResult<SyncReport> {
        self.begin(CycleKind::Data).await?;
        let result = self.run_data_cycle().await;
        self.finish(result).await
    }

    /// A channels cycle followed by a data cycle
    pub async fn full_sync(&self) -> AppResult<SyncReport> {
        let mut report = self.sync_channels().await?;
        report.merge(&self.sync_data().await?);
        Ok(report)
    }

    async fn run_channels_cycle(&self) -> AppResult<SyncReport> {
        let mut report = SyncReport::default();
        let syncer = Arc::new(CatalogSyncer::new(
            self.store.clone(),
            self.config.data_service_id(),
        ));
        let registry = self.mirror_registry();

        info!("Loading groups from {}", self.config.groups_url());
        let body = self.transfer.fetch(self.config.groups_url()).await?;
        let groups = syncer.sync_groups(body).await?;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut pending = PendingSet::new();
        let mut submitted: HashMap<u64, Group> = HashMap::new();

        for group in groups {
            match registry.select(&group).await {
                Ok(mirror) => {
                    let handle = self
                        .transfer
                        .submit(&channel_list_url(&mirror, &group.group_key), &events_tx);
                    submitted.insert(handle.id, group);
                    pending.insert(handle);
                }
                Err(_) => report.groups_skipped += 1,
            }
        }
        drop(events_tx);

        let workers = self.worker_pool();
        let mut jobs: JoinSet<(String, AppResult<usize>)> = JoinSet::new();

        pending
            .drain(&mut events_rx, |handle, result| {
                let Some(group) = submitted.remove(&handle.id) else {
                    return;
                };
                let body = match result {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Channel list of group {} failed: {}", group.group_key, e);
                        report.groups_skipped += 1;
                        return;
                    }
                };

                let workers = workers.clone();
                let syncer = syncer.clone();
                jobs.spawn(async move {
                    let _permit = workers.acquire_owned().await;
                    let group_id = group.id;
                    let result = match run_blocking(move || decode_channel_list(group_id, body)).await {
                        Ok(channels) => syncer.sync_channels(&group, &channels).await,
                        Err(e) => Err(e),
                    };
                    (group.group_key, result)
                });
            })
            .await;

        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok((_, Ok(count))) => {
                    report.groups_synced += 1;
                    report.channels_upserted += count;
                }
                Ok((group_key, Err(e))) => {
                    warn!("Channel list of group {} not applied: {}", group_key, e);
                    report.groups_skipped += 1;
                }
                Err(e) => {
                    error!("Channel worker panicked: {}", e);
                    report.groups_skipped += 1;
                }
            }
        }

        info!(
            "Channel sync finished: {} groups, {} channels, {} groups skipped",
            report.groups_synced, report.channels_upserted, report.groups_skipped
        );
        Ok(report)
    }

    /// Reads and decodes a group summary, `None` if it is unavailable
    async fn load_summary(&self, mirror: &str, group: &Group) -> Option<Summary> {
        let url = summary_url(mirror, &group.group_key);
        let body = match self.transfer.fetch(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Summary of group {} unavailable: {}", group.group_key, e);
                return None;
            }
        };

        match run_blocking(move || SummaryCodec::decode(&DecompressionService::decompress(body)?)).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Summary of group {} is malformed: {}", group.group_key, e);
                None
            }
        }
    }

    async fn run_data_cycle(&self) -> AppResult<SyncReport> {
        let mut report = SyncReport::default();
        let registry = Arc::new(self.mirror_registry());
        let engine = Arc::new(ReconciliationEngine::new(
            self.store.clone(),
            DayWindow::from_config(&self.config),
        ));

        let window = SyncWindow::around(
            self.today.unwrap_or_else(today_epoch_day),
            self.config.days_to_load(),
        );
        debug!(
            "Sync window covers epoch days {} to {}",
            window.first_day, window.last_day
        );

        let groups: HashMap<i64, Group> = self
            .store
            .list_groups(self.config.data_service_id())
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();

        let mut by_group: BTreeMap<i64, Vec<Channel>> = BTreeMap::new();
        for channel in self.store.selected_channels().await? {
            by_group.entry(channel.group_id).or_default().push(channel);
        }

        let mut jobs_to_submit = Vec::new();
        for (group_id, channels) in by_group {
            let Some(group) = groups.get(&group_id) else {
                debug!("Skipping {} channels of unknown group {}", channels.len(), group_id);
                continue;
            };

            let Ok(mirror) = registry.select(group).await else {
                report.groups_skipped += 1;
                continue;
            };

            let Some(summary) = self.load_summary(&mirror, group).await else {
                report.groups_skipped += 1;
                continue;
            };

            for channel in &channels {
                let local = match self
                    .store
                    .versions_in_range(channel.id, window.first_day, window.last_day)
                    .await
                {
                    Ok(local) => local,
                    Err(e) => {
                        warn!(
                            "Skipping channel {} of group {}: {}",
                            channel.external_channel_id, group.group_key, e
                        );
                        report.channels_skipped += 1;
                        continue;
                    }
                };
                for task in VersionDiffEngine::plan(&summary, channel, &mirror, window, &local) {
                    jobs_to_submit.push((task.url.clone(), DataJob::DayFile(task)));
                }
            }

            jobs_to_submit.push((
                mirror_list_url(&mirror, &group.group_key),
                DataJob::MirrorList(group.clone()),
            ));
            report.groups_synced += 1;
        }

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut pending = PendingSet::new();
        let mut submitted: HashMap<u64, DataJob> = HashMap::new();

        for (url, job) in jobs_to_submit {
            if matches!(job, DataJob::DayFile(_)) {
                report.files_scheduled += 1;
            }
            let handle = self.transfer.submit(&url, &events_tx);
            submitted.insert(handle.id, job);
            pending.insert(handle);
        }
        drop(events_tx);
        info!("Scheduled {} day files", report.files_scheduled);

        let workers = self.worker_pool();
        let mut jobs: JoinSet<JobResult> = JoinSet::new();

        pending
            .drain(&mut events_rx, |handle, result| {
                let Some(job) = submitted.remove(&handle.id) else {
                    return;
                };
                let body = match result {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Download of {} failed: {}", handle.url, e);
                        if matches!(job, DataJob::DayFile(_)) {
                            report.files_failed += 1;
                        }
                        return;
                    }
                };

                let workers = workers.clone();
                let store = self.store.clone();
                let engine = engine.clone();
                let registry = registry.clone();
                jobs.spawn(async move {
                    let _permit = workers.acquire_owned().await;
                    match job {
                        DataJob::DayFile(task) => {
                            let url = task.url.clone();
                            let result = match decode_day_file(task, body).await {
                                Ok((task, file)) => engine.apply(&task, &file).await.map_err(AppError::from),
                                Err(e) => Err(e),
                            };
                            JobResult::Applied { url, result }
                        }
                        DataJob::MirrorList(group) => JobResult::MirrorList {
                            result: registry.apply_mirror_list(store.as_ref(), &group, body).await,
                            group_key: group.group_key,
                        },
                    }
                });
            })
            .await;

        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(JobResult::Applied {
                    result: Ok(outcome),
                    ..
                }) => {
                    report.files_applied += 1;
                    report.programs_inserted += outcome.inserted;
                    report.programs_updated += outcome.updated;
                    report.programs_dropped += outcome.dropped;
                    report.programs_deleted += outcome.deleted as usize;
                }
                Ok(JobResult::Applied {
                    url,
                    result: Err(e),
                }) => {
                    warn!("Skipping {}: {}", url, e);
                    report.files_failed += 1;
                }
                Ok(JobResult::MirrorList {
                    result: Ok(updated),
                    ..
                }) => {
                    if updated {
                        report.mirror_lists_updated += 1;
                    }
                }
                Ok(JobResult::MirrorList {
                    group_key,
                    result: Err(e),
                }) => warn!("Mirror list of group {} not applied: {}", group_key, e),
                Err(e) => {
                    error!("Decode worker panicked: {}", e);
                    report.files_failed += 1;
                }
            }
        }

        match engine.backfill_end_times().await {
            Ok(count) => report.end_times_backfilled = count,
            Err(e) => {
                error!("End time backfill failed: {}", e);
                report.backfill_failed = true;
            }
        }

        info!(
            "Data sync finished: {} of {} files applied, {} failed, {} inserted, {} updated, {} deleted",
            report.files_applied,
            report.files_scheduled,
            report.files_failed,
            report.programs_inserted,
            report.programs_updated,
            report.programs_deleted
        );
        Ok(report)
    }
}
