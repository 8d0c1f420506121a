//! Connectivity-aware sync engine, bootstrap reconciliation, and snapshot
//! write debouncing.

mod bootstrap;
mod engine;
mod saver;

pub use bootstrap::{BootReport, SessionPhase, SessionResolution};
pub use engine::{
    FlushOutcome, FlushReport, LeaderboardView, RemoteServices, SubmitOutcome, SyncEngine,
};
pub use saver::DebouncedSaver;

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::lenient_date;
use crate::remote::ScoreSubmission;

/// Window within which rapid snapshot writes are coalesced.
pub const SAVE_DEBOUNCE_MS: u64 = 300;

/// How long a cached leaderboard page is served without refetching.
pub const LEADERBOARD_FRESHNESS_SECS: u64 = 60;

/// Cooldown after a failed leaderboard refresh before the next attempt.
pub const LEADERBOARD_COOLDOWN_SECS: u64 = 30;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub save_debounce: Duration,
    pub leaderboard_freshness: Duration,
    pub leaderboard_cooldown: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(SAVE_DEBOUNCE_MS),
            leaderboard_freshness: Duration::from_secs(LEADERBOARD_FRESHNESS_SECS),
            leaderboard_cooldown: Duration::from_secs(LEADERBOARD_COOLDOWN_SECS),
        }
    }
}

/// A completed game ready for submission. The engine stamps the streak at
/// submission time; call `mark_day_solved` before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreDraft {
    pub date: NaiveDate,
    pub puzzle_id: String,
    pub score: i64,
    pub time_taken_ms: Option<i64>,
}

/// A score the backend has not yet confirmed. Owned by the durable snapshot;
/// flush passes only ever replace the queue wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingScore {
    #[serde(with = "lenient_date")]
    pub date: NaiveDate,
    pub puzzle_id: String,
    pub score: i64,
    #[serde(default)]
    pub time_taken_ms: Option<i64>,
    #[serde(default)]
    pub streak_at_submission: u32,
}

impl PendingScore {
    /// Wire payload for this record.
    pub fn submission(&self) -> ScoreSubmission {
        ScoreSubmission {
            date: self.date,
            puzzle_id: self.puzzle_id.clone(),
            score: self.score,
            time_taken_ms: self.time_taken_ms,
            streak: self.streak_at_submission,
        }
    }
}
