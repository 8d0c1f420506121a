//! Crate-level error types.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("remote service: {0}")]
    Remote(#[from] RemoteError),

    /// The backend rejected a score as invalid. The record was not queued
    /// and will not be retried.
    #[error("score rejected by server: {0}")]
    Rejected(#[source] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("leaderboard unavailable: {0}")]
    LeaderboardUnavailable(String),
}
