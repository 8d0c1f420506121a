//! Contracts for the remote game services consumed by the sync engine.
//!
//! Exact wire formats are the backend's concern; these traits capture only
//! what the engine depends on, including the distinction between
//! "unauthenticated" and "unreachable" on session checks.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dates::lenient_date;
use crate::profile::ProfileSnapshot;

/// Retry policy classification for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> RetryClass {
    match status {
        401 | 403 => RetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => RetryClass::Retryable,
        500..=599 => RetryClass::Retryable,
        _ => RetryClass::Permanent,
    }
}

/// Failures surfaced by remote service implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network unreachable, connect failure, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success response from the backend.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Missing or unusable credentials.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Request was malformed before it ever left the client.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify this failure for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Transport(_) => RetryClass::Retryable,
            Self::Auth(_) => RetryClass::ReauthRequired,
            Self::Invalid(_) => RetryClass::Permanent,
        }
    }

    /// True when retrying this failure can never succeed. Records failing
    /// this way are dropped from the pending queue, not retried forever.
    pub fn is_permanent_rejection(&self) -> bool {
        self.retry_class() == RetryClass::Permanent
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestIdentity {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Score payload sent to the backend. The actor is inferred from auth, not
/// carried in the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    #[serde(with = "lenient_date")]
    pub date: NaiveDate,
    pub puzzle_id: String,
    pub score: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken_ms: Option<i64>,
    pub streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReceipt {
    pub accepted: bool,
    pub streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardSort {
    TotalPoints,
    Streak,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardQuery {
    pub sort_by: LeaderboardSort,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Default for LeaderboardQuery {
    fn default() -> Self {
        Self {
            sort_by: LeaderboardSort::TotalPoints,
            limit: 50,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub streak_count: u32,
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub top: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub current_user: Option<LeaderboardEntry>,
}

/// Identity issuance and session resolution.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Mint a server-confirmed guest identity.
    async fn create_guest(&self) -> RemoteResult<GuestIdentity>;

    /// Current authenticated session, or `None` when unauthenticated.
    /// An unreachable backend fails with [`RemoteError::Transport`] instead.
    async fn get_session(&self) -> RemoteResult<Option<SessionUser>>;
}

#[async_trait]
pub trait ScoreService: Send + Sync {
    /// Deliver one day's score. Permanent validation failures must map to a
    /// [`RetryClass::Permanent`] error so the caller can drop the record.
    async fn submit_score(&self, submission: &ScoreSubmission) -> RemoteResult<ScoreReceipt>;
}

#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> RemoteResult<ProfileSnapshot>;
}

#[async_trait]
pub trait LeaderboardService: Send + Sync {
    async fn get_leaderboard(&self, query: &LeaderboardQuery) -> RemoteResult<LeaderboardPage>;
}

/// Reachability signal. Hosts flip this from their platform's online/offline
/// events and call `SyncEngine::handle_connectivity_restored` on the
/// transition back online.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Shared-flag implementation of [`Connectivity`].
#[derive(Debug, Default)]
pub struct SharedConnectivity(AtomicBool);

impl SharedConnectivity {
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::Relaxed);
    }
}

impl Connectivity for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
