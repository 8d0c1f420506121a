//! Debounced snapshot persistence.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::Mutex;

use crate::store::{PersistedState, SnapshotStore, StoreError};

#[derive(Default)]
struct SaverSlot {
    pending: Option<PersistedState>,
    timer_armed: bool,
}

/// Write-coalescing wrapper around a [`SnapshotStore`].
///
/// One pending-snapshot slot plus at most one armed timer: a burst of
/// `schedule` calls within the debounce window results in exactly one
/// durable write containing the last scheduled snapshot. Coalescing never
/// drops the final write.
#[derive(Clone)]
pub struct DebouncedSaver {
    store: Arc<dyn SnapshotStore>,
    slot: Arc<Mutex<SaverSlot>>,
    debounce: Duration,
}

impl DebouncedSaver {
    pub fn new(store: Arc<dyn SnapshotStore>, debounce: Duration) -> Self {
        Self {
            store,
            slot: Arc::new(Mutex::new(SaverSlot::default())),
            debounce,
        }
    }

    /// Queue `state` for persistence, replacing any not-yet-written snapshot.
    pub async fn schedule(&self, state: PersistedState) {
        let mut slot = self.slot.lock().await;
        slot.pending = Some(state);
        if slot.timer_armed {
            return;
        }
        slot.timer_armed = true;
        drop(slot);

        let saver = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(saver.debounce).await;
            let taken = {
                let mut slot = saver.slot.lock().await;
                slot.timer_armed = false;
                slot.pending.take()
            };
            if let Some(state) = taken {
                if let Err(err) = saver.store.save(&state).await {
                    warn!("debounced snapshot save failed: {err}");
                }
            }
        });
    }

    /// Persist `state` immediately, bypassing the debounce window. Any queued
    /// snapshot is superseded.
    pub async fn save_now(&self, state: &PersistedState) -> Result<(), StoreError> {
        self.slot.lock().await.pending = None;
        self.store.save(state).await
    }
}
