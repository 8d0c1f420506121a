//! Connectivity-aware sync engine.
//!
//! All engine state lives behind one async mutex held for the duration of
//! each public operation, so a durable save always captures a consistent
//! snapshot and a user action arriving mid-flush is serialized behind it.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::Mutex;

use crate::dates::today_local;
use crate::errors::{Error, Result};
use crate::identity::Identity;
use crate::ledger::{compute_streak, merge_server_days, CompletionLedger};
use crate::profile::{synthesize_profile, DisplayProfile, ProfileSnapshot, ProfileSource};
use crate::remote::{
    Connectivity, IdentityService, LeaderboardPage, LeaderboardQuery, LeaderboardService,
    ProfileService, ScoreService,
};
use crate::store::{CachedLeaderboard, PersistedState, SnapshotStore};
use crate::sync::bootstrap::SessionPhase;
use crate::sync::saver::DebouncedSaver;
use crate::sync::{PendingScore, ScoreDraft, SyncConfig};

/// Remote collaborators the engine talks to.
#[derive(Clone)]
pub struct RemoteServices {
    pub identity: Arc<dyn IdentityService>,
    pub scores: Arc<dyn ScoreService>,
    pub profiles: Arc<dyn ProfileService>,
    pub leaderboard: Arc<dyn LeaderboardService>,
}

/// Result of a submit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The backend confirmed the score.
    Delivered,
    /// The score is queued for a later flush.
    Enqueued,
}

/// What happened to a flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Idle,
    /// Network unreachable; queue untouched.
    Offline,
    /// No server-confirmed identity could be resolved; queue untouched.
    NoIdentity,
    /// Every record left the queue (delivered or dropped).
    Complete,
    /// Some records delivered, some still queued for the next pass.
    Partial,
}

/// Per-record accounting for one flush pass, so the caller can distinguish
/// "still syncing" from "some data was unrecoverable".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub outcome: FlushOutcome,
    pub delivered: usize,
    pub retained: usize,
    /// Records the backend permanently rejected; gone from the queue.
    pub dropped: Vec<PendingScore>,
}

impl FlushReport {
    pub(super) fn skipped(outcome: FlushOutcome) -> Self {
        Self::untouched(outcome, 0)
    }

    /// A pass that left the queue exactly as it was.
    pub(super) fn untouched(outcome: FlushOutcome, retained: usize) -> Self {
        Self {
            outcome,
            delivered: 0,
            retained,
            dropped: Vec::new(),
        }
    }
}

/// Leaderboard result with freshness provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardView {
    pub page: LeaderboardPage,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

pub(super) struct EngineState {
    pub(super) identity: Option<Identity>,
    pub(super) email: Option<String>,
    pub(super) ledger: CompletionLedger,
    pub(super) pending: Vec<PendingScore>,
    pub(super) last_sync_at: Option<DateTime<Utc>>,
    pub(super) cached_profile: Option<ProfileSnapshot>,
    pub(super) cached_leaderboard: Option<CachedLeaderboard>,
    pub(super) profile_fetch_error: Option<String>,
    pub(super) leaderboard_cooldown_until: Option<DateTime<Utc>>,
    pub(super) phase: SessionPhase,
}

impl EngineState {
    pub(super) fn fresh(phase: SessionPhase) -> Self {
        Self {
            identity: None,
            email: None,
            ledger: CompletionLedger::new(),
            pending: Vec::new(),
            last_sync_at: None,
            cached_profile: None,
            cached_leaderboard: None,
            profile_fetch_error: None,
            leaderboard_cooldown_until: None,
            phase,
        }
    }

    /// Snapshot of everything that survives a restart.
    pub(super) fn persisted(&self) -> PersistedState {
        PersistedState {
            identity: self.identity.clone(),
            email: self.email.clone(),
            ledger: self.ledger.clone(),
            pending_scores: self.pending.clone(),
            last_sync_at: self.last_sync_at,
            cached_profile: self.cached_profile.clone(),
            cached_leaderboard: self.cached_leaderboard.clone(),
        }
    }

    pub(super) fn hydrate(&mut self, persisted: PersistedState) {
        self.identity = persisted.identity;
        self.email = persisted.email;
        self.ledger = persisted.ledger;
        self.pending = persisted.pending_scores;
        self.last_sync_at = persisted.last_sync_at;
        self.cached_profile = persisted.cached_profile;
        self.cached_leaderboard = persisted.cached_leaderboard;
    }
}

/// Orchestrates submit-or-enqueue, pending-queue flushes, profile fetches
/// with cached fallback, and leaderboard caching with failure cooldown.
pub struct SyncEngine {
    pub(super) remote: RemoteServices,
    pub(super) connectivity: Arc<dyn Connectivity>,
    pub(super) store: Arc<dyn SnapshotStore>,
    pub(super) saver: DebouncedSaver,
    pub(super) config: SyncConfig,
    pub(super) state: Mutex<EngineState>,
}

impl SyncEngine {
    pub fn new(
        remote: RemoteServices,
        connectivity: Arc<dyn Connectivity>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self::with_config(remote, connectivity, store, SyncConfig::default())
    }

    pub fn with_config(
        remote: RemoteServices,
        connectivity: Arc<dyn Connectivity>,
        store: Arc<dyn SnapshotStore>,
        config: SyncConfig,
    ) -> Self {
        let saver = DebouncedSaver::new(Arc::clone(&store), config.save_debounce);
        Self {
            remote,
            connectivity,
            store,
            saver,
            config,
            state: Mutex::new(EngineState::fresh(SessionPhase::Booting)),
        }
    }

    /// Current streak, derived from the ledger; never stored as ground truth.
    pub async fn get_streak(&self) -> u32 {
        let state = self.state.lock().await;
        compute_streak(&state.ledger, today_local())
    }

    pub async fn get_pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.state.lock().await.identity.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Record a solved day and return the updated streak.
    pub async fn mark_day_solved(&self, date: NaiveDate, used_hint: bool) -> u32 {
        let mut state = self.state.lock().await;
        state.ledger.mark_solved(date, used_hint);
        let streak = compute_streak(&state.ledger, today_local());
        self.saver.schedule(state.persisted()).await;
        streak
    }

    pub async fn mark_hint_used(&self, date: NaiveDate) {
        let mut state = self.state.lock().await;
        state.ledger.mark_hint_used(date);
        self.saver.schedule(state.persisted()).await;
    }

    /// Request a server-confirmed identity when none is set and the network
    /// is reachable; no-op otherwise. Failure is logged, never fatal.
    pub async fn ensure_identity(&self) {
        let mut state = self.state.lock().await;
        if state.identity.is_some() || !self.connectivity.is_online() {
            return;
        }
        if self.resolve_server_identity(&mut state).await.is_some() {
            self.saver.schedule(state.persisted()).await;
        }
    }

    /// Resolve a server-confirmed identity, minting a guest (or promoting a
    /// local placeholder in place) when the backend is reachable. The ledger
    /// and pending queue are never touched by the promotion.
    pub(super) async fn resolve_server_identity(&self, state: &mut EngineState) -> Option<String> {
        if let Some(Identity::ServerConfirmed(id)) = &state.identity {
            return Some(id.clone());
        }
        if !self.connectivity.is_online() {
            return None;
        }
        match self.remote.identity.create_guest().await {
            Ok(guest) => {
                if let Some(Identity::Local(prior)) = &state.identity {
                    debug!("promoting local identity {prior} to server identity {}", guest.id);
                } else {
                    info!("created guest identity {}", guest.id);
                }
                state.identity = Some(Identity::ServerConfirmed(guest.id.clone()));
                Some(guest.id)
            }
            Err(err) => {
                warn!("guest identity creation failed: {err}");
                None
            }
        }
    }

    /// Deliver a score immediately when reachable, otherwise queue it.
    ///
    /// A permanent validation rejection is surfaced as [`Error::Rejected`]
    /// rather than queued or silently dropped; everything else (offline,
    /// transient failure, missing identity) queues the record for a later
    /// flush.
    pub async fn submit_or_enqueue(&self, draft: ScoreDraft) -> Result<SubmitOutcome> {
        let mut state = self.state.lock().await;
        let record = PendingScore {
            date: draft.date,
            puzzle_id: draft.puzzle_id,
            score: draft.score,
            time_taken_ms: draft.time_taken_ms,
            streak_at_submission: compute_streak(&state.ledger, today_local()),
        };

        if !self.connectivity.is_online() {
            self.enqueue(&mut state, record).await;
            return Ok(SubmitOutcome::Enqueued);
        }
        if self.resolve_server_identity(&mut state).await.is_none() {
            self.enqueue(&mut state, record).await;
            return Ok(SubmitOutcome::Enqueued);
        }

        match self.remote.scores.submit_score(&record.submission()).await {
            Ok(receipt) => {
                debug!(
                    "score for {} delivered (accepted={})",
                    record.date, receipt.accepted
                );
                state.last_sync_at = Some(Utc::now());
                self.refresh_profile(&mut state).await;
                self.saver.schedule(state.persisted()).await;
                Ok(SubmitOutcome::Delivered)
            }
            Err(err) if err.is_permanent_rejection() => Err(Error::Rejected(err)),
            Err(err) => {
                warn!("score submission failed, queueing for retry: {err}");
                self.enqueue(&mut state, record).await;
                Ok(SubmitOutcome::Enqueued)
            }
        }
    }

    async fn enqueue(&self, state: &mut EngineState, record: PendingScore) {
        if state.identity.is_none() {
            state.identity = Some(Identity::mint_local());
        }
        state.pending.push(record);
        self.saver.schedule(state.persisted()).await;
    }

    /// Attempt delivery of every queued record, in FIFO order.
    pub async fn flush_pending(&self) -> FlushReport {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    pub(super) async fn flush_locked(&self, state: &mut EngineState) -> FlushReport {
        if state.pending.is_empty() {
            return FlushReport::skipped(FlushOutcome::Idle);
        }
        if !self.connectivity.is_online() {
            return FlushReport::untouched(FlushOutcome::Offline, state.pending.len());
        }
        if self.resolve_server_identity(state).await.is_none() {
            return FlushReport::untouched(FlushOutcome::NoIdentity, state.pending.len());
        }

        let queue = state.pending.clone();
        let mut delivered = 0usize;
        let mut retained = Vec::new();
        let mut dropped = Vec::new();
        for record in queue {
            match self.remote.scores.submit_score(&record.submission()).await {
                Ok(_) => delivered += 1,
                Err(err) if err.is_permanent_rejection() => {
                    warn!(
                        "dropping permanently rejected score for {}: {err}",
                        record.date
                    );
                    dropped.push(record);
                }
                Err(err) => {
                    debug!("score for {} still pending: {err}", record.date);
                    retained.push(record);
                }
            }
        }

        // One atomic queue replacement for the whole pass: a record is either
        // delivered, dropped, or retained, never two of those.
        let retained_count = retained.len();
        state.pending = retained;
        let outcome = if retained_count == 0 {
            state.last_sync_at = Some(Utc::now());
            FlushOutcome::Complete
        } else {
            FlushOutcome::Partial
        };
        if delivered > 0 {
            self.refresh_profile(state).await;
        }
        self.saver.schedule(state.persisted()).await;

        info!(
            "flush finished: {delivered} delivered, {retained_count} retained, {} dropped",
            dropped.len()
        );
        FlushReport {
            outcome,
            delivered,
            retained: retained_count,
            dropped,
        }
    }

    /// Replace the cached profile from the backend and fold its known days
    /// into the ledger. Best effort: failures leave the stale cache in place.
    pub(super) async fn refresh_profile(&self, state: &mut EngineState) {
        let Some(Identity::ServerConfirmed(user_id)) = state.identity.clone() else {
            return;
        };
        if !self.connectivity.is_online() {
            return;
        }
        match self.remote.profiles.get_profile(&user_id).await {
            Ok(profile) => {
                state.ledger = merge_server_days(&state.ledger, &profile.known_days());
                state.email = profile.email.clone();
                state.cached_profile = Some(profile);
                state.profile_fetch_error = None;
            }
            Err(err) => {
                warn!("profile refresh failed, keeping cached snapshot: {err}");
                state.profile_fetch_error = Some(err.to_string());
            }
        }
    }

    /// Profile for rendering. Never fails: a local-only actor gets a
    /// synthesized profile, a reachable backend refreshes the cache, and a
    /// failed refresh falls back to the last good snapshot.
    pub async fn get_display_profile(&self) -> DisplayProfile {
        let mut state = self.state.lock().await;
        let today = today_local();

        if let Some(Identity::ServerConfirmed(user_id)) = state.identity.clone() {
            let mut source = ProfileSource::Server;
            if self.connectivity.is_online() {
                self.refresh_profile(&mut state).await;
                if state.profile_fetch_error.is_some() {
                    source = ProfileSource::StaleCache;
                } else {
                    self.saver.schedule(state.persisted()).await;
                }
            } else {
                source = ProfileSource::StaleCache;
            }

            if let Some(profile) = state.cached_profile.clone() {
                return DisplayProfile {
                    streak: compute_streak(&state.ledger, today),
                    pending_count: state.pending.len(),
                    profile,
                    source,
                };
            }
            let profile = synthesize_profile(&user_id, &state.ledger, &state.pending, today);
            return DisplayProfile {
                streak: profile.streak_count,
                pending_count: state.pending.len(),
                profile,
                source: ProfileSource::Synthesized,
            };
        }

        let id = state
            .identity
            .as_ref()
            .map(|identity| identity.id().to_string())
            .unwrap_or_default();
        let profile = synthesize_profile(&id, &state.ledger, &state.pending, today);
        DisplayProfile {
            streak: profile.streak_count,
            pending_count: state.pending.len(),
            profile,
            source: ProfileSource::Synthesized,
        }
    }

    /// Serve the leaderboard from cache when fresh; otherwise refresh. A
    /// failed refresh starts a cooldown during which the stale cache (if any)
    /// is served without touching the network.
    pub async fn get_leaderboard(&self, query: &LeaderboardQuery) -> Result<LeaderboardView> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(cached) = &state.cached_leaderboard {
            let age_ms = now.signed_duration_since(cached.fetched_at).num_milliseconds();
            if age_ms >= 0 && age_ms < self.config.leaderboard_freshness.as_millis() as i64 {
                return Ok(LeaderboardView {
                    page: cached.page.clone(),
                    fetched_at: cached.fetched_at,
                    stale: false,
                });
            }
        }

        let cooling_down = state
            .leaderboard_cooldown_until
            .map(|until| now < until)
            .unwrap_or(false);
        if cooling_down || !self.connectivity.is_online() {
            return Self::stale_leaderboard(&state);
        }

        match self.remote.leaderboard.get_leaderboard(query).await {
            Ok(page) => {
                state.leaderboard_cooldown_until = None;
                state.cached_leaderboard = Some(CachedLeaderboard {
                    page: page.clone(),
                    fetched_at: now,
                });
                self.saver.schedule(state.persisted()).await;
                Ok(LeaderboardView {
                    page,
                    fetched_at: now,
                    stale: false,
                })
            }
            Err(err) => {
                let base_ms = self.config.leaderboard_cooldown.as_millis() as i64;
                let jitter_ms = rand::thread_rng().gen_range(0..=(base_ms / 5).max(1));
                state.leaderboard_cooldown_until =
                    Some(now + chrono::Duration::milliseconds(base_ms + jitter_ms));
                warn!("leaderboard refresh failed, cooling down: {err}");
                Self::stale_leaderboard(&state)
            }
        }
    }

    fn stale_leaderboard(state: &EngineState) -> Result<LeaderboardView> {
        match &state.cached_leaderboard {
            Some(cached) => Ok(LeaderboardView {
                page: cached.page.clone(),
                fetched_at: cached.fetched_at,
                stale: true,
            }),
            None => Err(Error::LeaderboardUnavailable(
                "no cached leaderboard".to_string(),
            )),
        }
    }

    /// Hook for the host's became-reachable event: flush queued scores.
    /// Does not re-run bootstrap.
    pub async fn handle_connectivity_restored(&self) -> FlushReport {
        self.flush_pending().await
    }

    /// Clear identity and all locally accumulated state. The wipe is written
    /// durably right away rather than through the debounce window.
    pub async fn sign_out(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = EngineState::fresh(SessionPhase::Ready);
        self.saver.save_now(&state.persisted()).await?;
        Ok(())
    }
}
