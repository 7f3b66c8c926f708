//! Join barrier over submitted transfers
//!
//! A stage registers every handle it submitted, then drains its event
//! channel. Each completion removes one handle; the stage continues once
//! nothing is pending. If every sender is gone before that, the remaining
//! handles can never complete and the barrier opens anyway.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::SourceResult;
use crate::sources::{TransferEvent, TransferHandle};

#[derive(Debug, Default)]
pub struct PendingSet {
    pending: HashMap<u64, TransferHandle>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: TransferHandle) {
        self.pending.insert(handle.id, handle);
    }

    /// Removes a completed handle, `None` if it was not pending
    pub fn complete(&mut self, id: u64) -> Option<TransferHandle> {
        self.pending.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Feeds completions to `on_complete` until nothing is pending
    ///
    /// Returns the number of completions delivered.
    pub async fn drain<F>(
        mut self,
        events: &mut mpsc::UnboundedReceiver<TransferEvent>,
        mut on_complete: F,
    ) -> usize
    where
        F: FnMut(TransferHandle, SourceResult<Bytes>),
    {
        let mut delivered = 0;

        while !self.is_empty() {
            let Some(event) = events.recv().await else {
                warn!(
                    "Event channel closed with {} transfers outstanding",
                    self.len()
                );
                break;
            };

            match self.complete(event.handle.id) {
                Some(handle) => {
                    delivered += 1;
                    on_complete(handle, event.result);
                }
                None => debug!("Ignoring completion of unknown transfer {}", event.handle.id),
            }
        }

        delivered
    }
}
