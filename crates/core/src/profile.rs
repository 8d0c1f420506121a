//! Server profile snapshots and synthesized guest profiles.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::lenient_date;
use crate::ledger::{compute_streak, CompletionLedger};
use crate::sync::PendingScore;

/// Puzzle id used for ledger days that have no queued score record.
pub const SYNTHETIC_PUZZLE_ID: &str = "daily";

/// One day's score as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyScore {
    #[serde(with = "lenient_date")]
    pub date: NaiveDate,
    pub puzzle_id: String,
    pub score: i64,
    #[serde(default)]
    pub time_taken_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub puzzles_solved: u32,
    #[serde(default)]
    pub avg_solve_time_ms: Option<i64>,
}

/// Read-mostly copy of the remote profile. Replaced wholesale on every
/// successful fetch; retained stale as a fallback when a fetch fails.
///
/// Not authoritative for the displayed streak: display always recomputes
/// from the (merged) local ledger so unsynced offline progress shows up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub streak_count: u32,
    #[serde(default)]
    pub last_played: Option<String>,
    pub total_points: i64,
    #[serde(default)]
    pub stats: Option<ProfileStats>,
    #[serde(default)]
    pub daily_scores: Vec<DailyScore>,
}

impl ProfileSnapshot {
    /// Ledger view of the days this profile proves solved.
    pub fn known_days(&self) -> CompletionLedger {
        let mut days = CompletionLedger::new();
        for score in &self.daily_scores {
            days.mark_solved(score.date, false);
        }
        days
    }
}

/// Where a display profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// Fresh from the backend.
    Server,
    /// The last successful fetch; the backend could not be reached since.
    StaleCache,
    /// Built locally from the ledger and pending queue.
    Synthesized,
}

/// Profile handed to the presentation layer. `streak` and `pending_count`
/// reflect local state even when the snapshot itself is server-sourced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayProfile {
    pub profile: ProfileSnapshot,
    pub streak: u32,
    pub pending_count: usize,
    pub source: ProfileSource,
}

/// Build a profile for an actor the backend knows nothing about.
///
/// Queued submissions carry their real scores; ledger days without a queued
/// record count as solved with score 0, so a player who has only ever been
/// offline never sees an empty profile.
pub fn synthesize_profile(
    id: &str,
    ledger: &CompletionLedger,
    pending: &[PendingScore],
    today: NaiveDate,
) -> ProfileSnapshot {
    let mut daily_scores: Vec<DailyScore> = pending
        .iter()
        .map(|p| DailyScore {
            date: p.date,
            puzzle_id: p.puzzle_id.clone(),
            score: p.score,
            time_taken_ms: p.time_taken_ms,
        })
        .collect();

    let queued_dates: HashSet<NaiveDate> = pending.iter().map(|p| p.date).collect();
    for date in ledger.solved_dates() {
        if !queued_dates.contains(&date) {
            daily_scores.push(DailyScore {
                date,
                puzzle_id: SYNTHETIC_PUZZLE_ID.to_string(),
                score: 0,
                time_taken_ms: Some(0),
            });
        }
    }
    daily_scores.sort_by_key(|s| s.date);

    let total_points = daily_scores.iter().map(|s| s.score).sum();
    let times: Vec<i64> = daily_scores
        .iter()
        .filter_map(|s| s.time_taken_ms)
        .filter(|t| *t > 0)
        .collect();
    let avg_solve_time_ms = if times.is_empty() {
        None
    } else {
        Some((times.iter().sum::<i64>() as f64 / times.len() as f64).round() as i64)
    };
    let last_played = daily_scores.last().map(|s| s.date.to_string());

    ProfileSnapshot {
        id: id.to_string(),
        email: None,
        streak_count: compute_streak(ledger, today),
        last_played,
        total_points,
        stats: Some(ProfileStats {
            puzzles_solved: daily_scores.len() as u32,
            avg_solve_time_ms,
        }),
        daily_scores,
    }
}
