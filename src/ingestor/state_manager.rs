use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::models::SyncReport;

pub type SyncEventSender = broadcast::Sender<SyncEvent>;
pub type SyncEventReceiver = broadcast::Receiver<SyncEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Channels,
    Data,
}

/// Notifications for layers that react to new listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started { kind: CycleKind },
    /// Channel catalogs were refreshed
    ChannelsUpdated { report: SyncReport },
    /// Program data changed; emitted once per data cycle after backfill
    DataUpdated { report: SyncReport },
}

#[derive(Debug, Clone)]
pub struct CycleState {
    pub kind: CycleKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub report: Option<SyncReport>,
}

/// Tracks the running cycle and fans its events out to subscribers
#[derive(Clone)]
pub struct SyncStateManager {
    current: Arc<RwLock<Option<CycleState>>>,
    events_tx: SyncEventSender,
}

impl Default for SyncStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStateManager {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            current: Arc::new(RwLock::new(None)),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> SyncEventReceiver {
        self.events_tx.subscribe()
    }

    /// Marks a cycle as running. Returns `false` if one already is.
    pub async fn start_cycle(&self, kind: CycleKind) -> bool {
        {
            let mut current = self.current.write().await;
            if current.as_ref().is_some_and(|c| c.completed_at.is_none()) {
                return false;
            }
            *current = Some(CycleState {
                kind,
                started_at: Utc::now(),
                completed_at: None,
                report: None,
            });
        }

        let _ = self.events_tx.send(SyncEvent::Started { kind });
        true
    }

    pub async fn complete_cycle(&self, report: SyncReport) {
        let kind = {
            let mut current = self.current.write().await;
            match current.as_mut() {
                Some(state) => {
                    state.completed_at = Some(Utc::now());
                    state.report = Some(report.clone());
                    state.kind
                }
                None => return,
            }
        };

        let event = match kind {
            CycleKind::Channels => SyncEvent::ChannelsUpdated { report },
            CycleKind::Data => SyncEvent::DataUpdated { report },
        };
        // no subscribers is fine
        let _ = self.events_tx.send(event);
    }

    /// Ends a cycle that failed before producing a report; no event is sent
    pub async fn abort_cycle(&self) {
        if let Some(state) = self.current.write().await.as_mut() {
            state.completed_at = Some(Utc::now());
        }
    }

    pub async fn current(&self) -> Option<CycleState> {
        self.current.read().await.clone()
    }
}
