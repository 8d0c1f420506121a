//! Durable snapshot persistence contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Identity;
use crate::ledger::CompletionLedger;
use crate::profile::ProfileSnapshot;
use crate::remote::LeaderboardPage;
use crate::sync::PendingScore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage engine itself failed (I/O, SQL, locking).
    #[error("storage backend: {0}")]
    Backend(String),

    /// A snapshot row exists but cannot be decoded.
    #[error("persisted snapshot is corrupt: {0}")]
    Corrupt(String),
}

/// Cached leaderboard page plus the moment it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLeaderboard {
    pub page: LeaderboardPage,
    pub fetched_at: DateTime<Utc>,
}

/// Everything that survives a restart.
///
/// Every field is defaulted so a snapshot written by an older schema loads
/// with the missing pieces empty instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    pub identity: Option<Identity>,
    pub email: Option<String>,
    pub ledger: CompletionLedger,
    pub pending_scores: Vec<PendingScore>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub cached_profile: Option<ProfileSnapshot>,
    pub cached_leaderboard: Option<CachedLeaderboard>,
}

/// Durable store for the full client snapshot.
///
/// `load` returns `Ok(None)` when nothing has ever been saved; decode
/// failures surface as [`StoreError::Corrupt`] so boot can fall back to
/// empty state without masking engine failures.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError>;
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
}

/// In-memory [`SnapshotStore`] for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<PersistedState>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an already-persisted snapshot.
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            slot: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of completed saves, for asserting write coalescing.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The last saved snapshot, if any.
    pub fn current(&self) -> Option<PersistedState> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Option<PersistedState>>, StoreError> {
        self.slot
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.guard()?.clone())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self.guard()? = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
