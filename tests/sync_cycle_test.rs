mod common;

use std::sync::Arc;

use tempfile::TempDir;
use tokio_test::assert_ok;

use common::{
    day_file, gzip, minutes, morning_news, orchestrator, seed_group, summary, FixtureFetcher,
    GROUPS_URL, TODAY,
};
use tvdata_sync::config::DatabaseConfig;
use tvdata_sync::database::Database;
use tvdata_sync::ingestor::{CycleKind, SyncEvent};
use tvdata_sync::models::{ProgramField, UNKNOWN_END_TIME};
use tvdata_sync::repositories::{MemoryStore, ScheduleStore};
use tvdata_sync::utils::time::MILLIS_PER_DAY;

const MIRROR: &str = "http://mirror.test/";
const DAY_FILE: &str = "http://mirror.test/2023-12-15_de_ard_base_full.prog.gz";

fn fetcher() -> Arc<FixtureFetcher> {
    Arc::new(
        FixtureFetcher::new()
            .with_resource(
                GROUPS_URL,
                "main;Main group;TV-Browser;Free listings;http://down.test/;http://mirror.test/\n",
            )
            .with_reachable(MIRROR)
            .with_resource(
                "http://mirror.test/main_channellist.gz",
                gzip(b"de;UTC;ard;ARD;(c) ARD;http://ard.de;http://ard.de/logo.png;1;\"Das Erste\"\nde;UTC;zdf;ZDF;c;w;l;1\n"),
            )
            .with_resource(
                "http://mirror.test/main_summary.gz",
                gzip(&summary(TODAY, &[("de", "ard", vec![[3, 1, 1, 0, 0]])])),
            )
            .with_resource(
                "http://mirror.test/main_mirrorlist.gz",
                gzip(b"http://mirror.test/\nhttp://backup.test/;10\n"),
            )
            .with_resource(DAY_FILE, gzip(&morning_news(3))),
    )
}

#[tokio::test]
async fn test_channels_cycle_uses_first_reachable_mirror() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = fetcher();
    let orchestrator = orchestrator(store.clone(), fetcher.clone());

    let report = assert_ok!(orchestrator.sync_channels().await);
    assert_eq!(report.groups_synced, 1);
    assert_eq!(report.groups_skipped, 0);
    assert_eq!(report.channels_upserted, 2);

    let channels = store.list_channels().await.unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].external_channel_id, "ard");
    assert_eq!(channels[0].full_name, "Das Erste");
    assert!(channels.iter().all(|c| !c.selected));

    assert!(fetcher
        .fetched()
        .contains(&"http://mirror.test/main_channellist.gz".to_string()));
}

#[tokio::test]
async fn test_data_cycle_downloads_only_changed_files() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = fetcher();
    let orchestrator = orchestrator(store.clone(), fetcher.clone());
    let mut events = orchestrator.subscribe();

    orchestrator.sync_channels().await.unwrap();
    assert_eq!(store.set_channel_selected("ard", true).await.unwrap(), 1);

    let report = assert_ok!(orchestrator.sync_data().await);
    assert_eq!(report.groups_synced, 1);
    assert_eq!(report.files_scheduled, 1);
    assert_eq!(report.files_applied, 1);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.programs_inserted, 2);
    assert_eq!(report.end_times_backfilled, 1);
    assert_eq!(report.mirror_lists_updated, 1);

    let ard = store.selected_channels().await.unwrap().remove(0);
    let programs = store.channel_programs(ard.id).await.unwrap();
    assert_eq!(programs.len(), 2);

    let day_start = TODAY * MILLIS_PER_DAY;
    assert_eq!(programs[0].text(ProgramField::Title), Some("Morning"));
    assert_eq!(programs[0].start_time_millis, day_start + 6 * 3_600_000);
    assert_eq!(programs[0].end_time_millis, programs[1].start_time_millis);
    assert_eq!(programs[1].end_time_millis, day_start + 9 * 3_600_000);
    assert_ne!(programs[1].end_time_millis, UNKNOWN_END_TIME);

    let versions = store.versions_in_range(ard.id, TODAY, TODAY).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].base_version, 3);
    assert_eq!(versions[0].more0016_version, 0);

    let groups = store.list_groups("epgfree").await.unwrap();
    assert_eq!(groups[0].mirrors, "http://mirror.test/;http://backup.test/#10");

    // nothing changed remotely, so the second cycle fetches no day file
    let again = assert_ok!(orchestrator.sync_data().await);
    assert_eq!(again.files_scheduled, 0);
    assert_eq!(again.programs_inserted, 0);
    assert_eq!(store.program_count().unwrap(), 2);
    assert_eq!(
        fetcher.fetched().iter().filter(|url| url.as_str() == DAY_FILE).count(),
        1
    );

    let mut data_updates = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::DataUpdated { report: emitted } => {
                if data_updates == 0 {
                    assert_eq!(emitted, report);
                }
                data_updates += 1;
            }
            SyncEvent::Started { kind } => {
                assert!(matches!(kind, CycleKind::Channels | CycleKind::Data))
            }
            SyncEvent::ChannelsUpdated { .. } => {}
        }
    }
    assert_eq!(data_updates, 2);
}

#[tokio::test]
async fn test_unreachable_group_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(FixtureFetcher::new().with_resource(
        GROUPS_URL,
        "main;Main group;TV-Browser;Free listings;http://down.test/\n",
    ));
    let orchestrator = orchestrator(store.clone(), fetcher);

    let report = orchestrator.sync_channels().await.unwrap();
    assert_eq!(report.groups_synced, 0);
    assert_eq!(report.groups_skipped, 1);
    assert_eq!(store.list_groups("epgfree").await.unwrap().len(), 1);
    assert!(store.list_channels().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_groups_catalog_fails_cycle() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(store, Arc::new(FixtureFetcher::new()));

    assert!(orchestrator.sync_channels().await.is_err());
    // a failed cycle does not block the next one
    let state = orchestrator.state_manager().current().await.unwrap();
    assert!(state.completed_at.is_some());
}

#[tokio::test]
async fn test_full_sync_against_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("tvdata.db");
    let database = Database::new(&DatabaseConfig {
        url: format!("sqlite:{}", db_path.display()),
        max_connections: Some(4),
    })
    .await
    .unwrap();
    database.migrate().await.unwrap();
    let store: Arc<dyn ScheduleStore> = Arc::new(database);

    let orchestrator = orchestrator(store.clone(), fetcher());
    orchestrator.sync_channels().await.unwrap();
    store.set_channel_selected("ard", true).await.unwrap();

    let report = assert_ok!(orchestrator.sync_data().await);
    assert_eq!(report.files_applied, 1);
    assert_eq!(report.programs_inserted, 2);

    let ard = store.selected_channels().await.unwrap().remove(0);
    let programs = store.channel_programs(ard.id).await.unwrap();
    assert_eq!(programs.len(), 2);
    assert_eq!(programs[1].text(ProgramField::Title), Some("News"));
    assert_eq!(programs[0].end_time_millis, programs[1].start_time_millis);
}

#[tokio::test]
async fn test_failed_units_are_counted_while_healthy_ones_apply() {
    let store = Arc::new(MemoryStore::new());
    seed_group(store.as_ref(), "main", MIRROR, &["ard", "zdf", "br"]).await;
    seed_group(store.as_ref(), "broken", "http://broken.test/", &["b1"]).await;
    seed_group(store.as_ref(), "down", "http://down.test/", &["d1"]).await;

    let truncated = day_file(
        2,
        &[(2, vec![(0x01, minutes(60)), (0x03, b"Cut off".to_vec())])],
    );
    let fetcher = Arc::new(
        FixtureFetcher::new()
            .with_reachable(MIRROR)
            .with_reachable("http://broken.test/")
            .with_resource(
                "http://mirror.test/main_summary.gz",
                gzip(&summary(
                    TODAY,
                    &[
                        ("de", "ard", vec![[3, 0, 0, 0, 0]]),
                        ("de", "br", vec![[1, 0, 0, 0, 0]]),
                        ("de", "zdf", vec![[2, 0, 0, 0, 0]]),
                    ],
                )),
            )
            .with_resource(DAY_FILE, gzip(&morning_news(3)))
            .with_resource(
                "http://mirror.test/2023-12-15_de_zdf_base_full.prog.gz",
                gzip(&truncated[..truncated.len() - 3]),
            )
            // a summary cut off inside its header
            .with_resource("http://broken.test/broken_summary.gz", gzip(&[1, 0])),
    );
    let orchestrator = orchestrator(store.clone(), fetcher.clone());
    let mut events = orchestrator.subscribe();

    let report = assert_ok!(orchestrator.sync_data().await);
    assert_eq!(report.groups_synced, 1);
    assert_eq!(report.groups_skipped, 2);
    assert_eq!(report.files_scheduled, 3);
    assert_eq!(report.files_applied, 1);
    // zdf is malformed, br is not served
    assert_eq!(report.files_failed, 2);
    assert_eq!(report.programs_inserted, 2);
    assert_eq!(report.mirror_lists_updated, 0);

    let channels = store.selected_channels().await.unwrap();
    let id_of = |external: &str| {
        channels
            .iter()
            .find(|c| c.external_channel_id == external)
            .unwrap()
            .id
    };
    assert_eq!(store.channel_programs(id_of("ard")).await.unwrap().len(), 2);
    assert!(store.channel_programs(id_of("zdf")).await.unwrap().is_empty());
    // failed files leave no version behind, so the next cycle retries them
    assert!(store
        .versions_in_range(id_of("zdf"), TODAY, TODAY)
        .await
        .unwrap()
        .is_empty());
    assert!(!fetcher
        .fetched()
        .iter()
        .any(|url| url.starts_with("http://down.test/")));

    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::Started {
            kind: CycleKind::Data
        }
    );
    assert_eq!(events.recv().await.unwrap(), SyncEvent::DataUpdated { report });
}
