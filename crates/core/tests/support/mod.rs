//! Scripted in-memory collaborators for driving the sync engine.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use dayloop_core::profile::{DailyScore, ProfileSnapshot, ProfileStats};
use dayloop_core::remote::{
    Connectivity, GuestIdentity, IdentityService, LeaderboardEntry, LeaderboardPage,
    LeaderboardQuery, LeaderboardService, ProfileService, RemoteError, RemoteResult, ScoreReceipt,
    ScoreService, ScoreSubmission, SessionUser, SharedConnectivity,
};
use dayloop_core::store::{MemoryStore, PersistedState, SnapshotStore, StoreError};
use dayloop_core::sync::{RemoteServices, ScoreDraft, SyncConfig, SyncEngine};

pub const GUEST_ID: &str = "guest-srv-1";

/// Backend fake with one configurable slot per endpoint and a FIFO script
/// for score submissions (falling back to a default outcome).
pub struct FakeBackend {
    pub session: Mutex<RemoteResult<Option<SessionUser>>>,
    pub guest: Mutex<RemoteResult<GuestIdentity>>,
    pub profile: Mutex<RemoteResult<ProfileSnapshot>>,
    pub leaderboard: Mutex<RemoteResult<LeaderboardPage>>,
    pub score_script: Mutex<VecDeque<RemoteResult<ScoreReceipt>>>,
    pub score_default: Mutex<RemoteResult<ScoreReceipt>>,
    pub submitted: Mutex<Vec<ScoreSubmission>>,
    pub guest_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub leaderboard_calls: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            session: Mutex::new(Ok(None)),
            guest: Mutex::new(Ok(GuestIdentity {
                id: GUEST_ID.to_string(),
            })),
            profile: Mutex::new(Ok(empty_profile(GUEST_ID))),
            leaderboard: Mutex::new(Ok(page_of(&[("u-1", 30)]))),
            score_script: Mutex::new(VecDeque::new()),
            score_default: Mutex::new(Ok(ScoreReceipt {
                accepted: true,
                streak: 0,
            })),
            submitted: Mutex::new(Vec::new()),
            guest_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            leaderboard_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeBackend {
    pub fn set_session(&self, session: RemoteResult<Option<SessionUser>>) {
        *self.session.lock().unwrap() = session;
    }

    pub fn set_guest(&self, guest: RemoteResult<GuestIdentity>) {
        *self.guest.lock().unwrap() = guest;
    }

    pub fn set_profile(&self, profile: RemoteResult<ProfileSnapshot>) {
        *self.profile.lock().unwrap() = profile;
    }

    pub fn set_leaderboard(&self, leaderboard: RemoteResult<LeaderboardPage>) {
        *self.leaderboard.lock().unwrap() = leaderboard;
    }

    pub fn push_score_outcome(&self, outcome: RemoteResult<ScoreReceipt>) {
        self.score_script.lock().unwrap().push_back(outcome);
    }

    pub fn submissions(&self) -> Vec<ScoreSubmission> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn guest_calls(&self) -> usize {
        self.guest_calls.load(Ordering::SeqCst)
    }

    pub fn leaderboard_calls(&self) -> usize {
        self.leaderboard_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityService for FakeBackend {
    async fn create_guest(&self) -> RemoteResult<GuestIdentity> {
        self.guest_calls.fetch_add(1, Ordering::SeqCst);
        self.guest.lock().unwrap().clone()
    }

    async fn get_session(&self) -> RemoteResult<Option<SessionUser>> {
        self.session.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoreService for FakeBackend {
    async fn submit_score(&self, submission: &ScoreSubmission) -> RemoteResult<ScoreReceipt> {
        self.submitted.lock().unwrap().push(submission.clone());
        let scripted = self.score_script.lock().unwrap().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => self.score_default.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl ProfileService for FakeBackend {
    async fn get_profile(&self, user_id: &str) -> RemoteResult<ProfileSnapshot> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.profile.lock().unwrap().clone();
        result.map(|mut profile| {
            profile.id = user_id.to_string();
            profile
        })
    }
}

#[async_trait]
impl LeaderboardService for FakeBackend {
    async fn get_leaderboard(&self, _query: &LeaderboardQuery) -> RemoteResult<LeaderboardPage> {
        self.leaderboard_calls.fetch_add(1, Ordering::SeqCst);
        self.leaderboard.lock().unwrap().clone()
    }
}

/// Store whose persisted row is present but undecodable.
pub struct CorruptStore;

#[async_trait]
impl SnapshotStore for CorruptStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Err(StoreError::Corrupt("expected value at line 1".to_string()))
    }

    async fn save(&self, _state: &PersistedState) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub connectivity: Arc<SharedConnectivity>,
    pub store: Arc<MemoryStore>,
    pub engine: SyncEngine,
}

pub fn remote_services(backend: &Arc<FakeBackend>) -> RemoteServices {
    RemoteServices {
        identity: backend.clone(),
        scores: backend.clone(),
        profiles: backend.clone(),
        leaderboard: backend.clone(),
    }
}

/// Short debounce so tests can observe durable writes without pausing time.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        save_debounce: Duration::from_millis(1),
        ..SyncConfig::default()
    }
}

pub fn harness(online: bool) -> Harness {
    harness_with(online, Arc::new(MemoryStore::new()), test_config())
}

pub fn harness_with(online: bool, store: Arc<MemoryStore>, config: SyncConfig) -> Harness {
    let backend = Arc::new(FakeBackend::default());
    let connectivity = Arc::new(SharedConnectivity::new(online));
    let connectivity_dyn: Arc<dyn Connectivity> = connectivity.clone();
    let store_dyn: Arc<dyn SnapshotStore> = store.clone();
    let engine = SyncEngine::with_config(remote_services(&backend), connectivity_dyn, store_dyn, config);
    Harness {
        backend,
        connectivity,
        store,
        engine,
    }
}

pub fn draft(date: NaiveDate, score: i64) -> ScoreDraft {
    ScoreDraft {
        date,
        puzzle_id: "binary".to_string(),
        score,
        time_taken_ms: Some(30_000),
    }
}

pub fn empty_profile(id: &str) -> ProfileSnapshot {
    ProfileSnapshot {
        id: id.to_string(),
        email: None,
        streak_count: 0,
        last_played: None,
        total_points: 0,
        stats: Some(ProfileStats {
            puzzles_solved: 0,
            avg_solve_time_ms: None,
        }),
        daily_scores: Vec::new(),
    }
}

pub fn profile_with_days(id: &str, days: &[(NaiveDate, i64)]) -> ProfileSnapshot {
    let daily_scores: Vec<DailyScore> = days
        .iter()
        .map(|(date, score)| DailyScore {
            date: *date,
            puzzle_id: "binary".to_string(),
            score: *score,
            time_taken_ms: Some(30_000),
        })
        .collect();
    ProfileSnapshot {
        id: id.to_string(),
        email: None,
        streak_count: daily_scores.len() as u32,
        last_played: daily_scores.last().map(|s| s.date.to_string()),
        total_points: daily_scores.iter().map(|s| s.score).sum(),
        stats: Some(ProfileStats {
            puzzles_solved: daily_scores.len() as u32,
            avg_solve_time_ms: Some(30_000),
        }),
        daily_scores,
    }
}

pub fn page_of(entries: &[(&str, i64)]) -> LeaderboardPage {
    LeaderboardPage {
        top: entries
            .iter()
            .enumerate()
            .map(|(idx, (id, points))| LeaderboardEntry {
                rank: idx as u32 + 1,
                id: id.to_string(),
                email: None,
                streak_count: 1,
                total_points: *points,
            })
            .collect(),
        current_user: None,
    }
}

pub fn transport_error() -> RemoteError {
    RemoteError::transport("connection reset by peer")
}

pub fn validation_error() -> RemoteError {
    RemoteError::api(400, "Missing required fields: date, puzzleId, score")
}
