//! Completion ledger and streak derivation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

use crate::dates::parse_date_key;

/// Per-date completion record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub solved: bool,
    #[serde(default)]
    pub used_hint: bool,
}

/// Mapping from calendar day to completion record.
///
/// Keys are typed dates. Loosely formatted keys from older persisted
/// snapshots or the backend (`"2025-2-3"`) are normalized while loading;
/// unparseable keys are skipped rather than failing the load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CompletionLedger {
    days: BTreeMap<NaiveDate, DayRecord>,
}

impl<'de> Deserialize<'de> for CompletionLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, DayRecord>::deserialize(deserializer)?;
        let mut days = BTreeMap::new();
        for (key, record) in raw {
            match parse_date_key(&key) {
                Some(date) => {
                    // Two raw keys can normalize to the same date; solved wins.
                    let entry = days.entry(date).or_insert(record);
                    entry.solved |= record.solved;
                    entry.used_hint |= record.used_hint;
                }
                None => warn!("skipping malformed ledger key '{key}'"),
            }
        }
        Ok(Self { days })
    }
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a day solved. Never reverts an already-solved day and keeps a
    /// previously recorded hint flag.
    pub fn mark_solved(&mut self, date: NaiveDate, used_hint: bool) {
        let entry = self.days.entry(date).or_default();
        entry.solved = true;
        entry.used_hint |= used_hint;
    }

    /// Record hint use for a day, preserving its solved state.
    pub fn mark_hint_used(&mut self, date: NaiveDate) {
        self.days.entry(date).or_default().used_hint = true;
    }

    pub fn get(&self, date: NaiveDate) -> Option<DayRecord> {
        self.days.get(&date).copied()
    }

    pub fn is_solved(&self, date: NaiveDate) -> bool {
        self.days.get(&date).map(|r| r.solved).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &DayRecord)> {
        self.days.iter()
    }

    /// Days recorded as solved, in calendar order.
    pub fn solved_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days
            .iter()
            .filter(|(_, record)| record.solved)
            .map(|(date, _)| *date)
    }
}

/// Consecutive solved days ending at `today`, or at yesterday when today is
/// still unsolved, so an unbroken run stays visible until the day is actually
/// missed. Pure and total; an empty ledger yields 0.
pub fn compute_streak(ledger: &CompletionLedger, today: NaiveDate) -> u32 {
    let mut cursor = if ledger.is_solved(today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };

    let mut streak = 0;
    while ledger.is_solved(cursor) {
        streak += 1;
        match cursor.pred_opt() {
            Some(previous) => cursor = previous,
            None => break,
        }
    }
    streak
}

/// Union-merge server-known days into a local ledger.
///
/// Server entries win identical-date metadata, but a locally solved day
/// absent from the server response is never erased. Idempotent: merging the
/// same server days twice equals merging them once.
pub fn merge_server_days(
    local: &CompletionLedger,
    server_days: &CompletionLedger,
) -> CompletionLedger {
    let mut merged = server_days.clone();
    for (date, record) in local.iter() {
        match merged.days.get_mut(date) {
            Some(existing) => existing.solved |= record.solved,
            None => {
                merged.days.insert(*date, *record);
            }
        }
    }
    merged
}
