//! One-shot startup reconciliation.
//!
//! Loads the durable snapshot, resolves a server session if one exists,
//! union-merges server and local progress, and flushes anything queued from
//! before the restart. Every step tolerates failure of the previous one;
//! boot never depends on network success.

use log::{info, warn};

use crate::identity::Identity;
use crate::store::StoreError;
use crate::sync::engine::{FlushReport, SyncEngine};

/// Session lifecycle for one app run. `Ready` is terminal: reconnection
/// events re-enter flush/merge logic but never revisit `Booting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Booting,
    ServerSession,
    LocalOnly,
    Ready,
}

/// How the startup session was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResolution {
    /// Authenticated server-side identity.
    Server { user_id: String },
    /// No server session; proceeding with the locally persisted identity.
    LocalGuest { user_id: String },
    /// Nothing persisted and no server session.
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub resolution: SessionResolution,
    pub restored_from_disk: bool,
    pub flush: FlushReport,
}

impl SyncEngine {
    /// Run the startup sequence once per app session.
    pub async fn bootstrap(&self) -> BootReport {
        let mut state = self.state.lock().await;
        state.phase = SessionPhase::Booting;

        // Durable snapshot first; a corrupt or failing store boots empty
        // rather than crashing startup.
        let restored_from_disk = match self.store.load().await {
            Ok(Some(persisted)) => {
                state.hydrate(persisted);
                true
            }
            Ok(None) => false,
            Err(err @ StoreError::Corrupt(_)) => {
                warn!("persisted snapshot unreadable, booting empty: {err}");
                false
            }
            Err(err) => {
                warn!("snapshot load failed, booting empty: {err}");
                false
            }
        };

        // Server session; an unreachable backend is simply "no session".
        let session = match self.remote.identity.get_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!("session check failed, proceeding offline: {err}");
                None
            }
        };

        let resolution = match session {
            Some(user) => {
                state.identity = Some(Identity::ServerConfirmed(user.id.clone()));
                state.email = user.email;
                state.phase = SessionPhase::ServerSession;
                // Union-merge: server days fold into the local ledger, so
                // offline completions the server has not seen survive.
                self.refresh_profile(&mut state).await;
                SessionResolution::Server { user_id: user.id }
            }
            None => {
                state.phase = SessionPhase::LocalOnly;
                match state.identity.clone() {
                    Some(identity) => {
                        // A restored server-confirmed guest still has a
                        // profile on the backend worth merging.
                        if identity.is_server_confirmed() {
                            self.refresh_profile(&mut state).await;
                        }
                        SessionResolution::LocalGuest {
                            user_id: identity.id().to_string(),
                        }
                    }
                    None => SessionResolution::Fresh,
                }
            }
        };

        // Scores queued before the restart.
        let flush = self.flush_locked(&mut state).await;

        state.phase = SessionPhase::Ready;
        self.saver.schedule(state.persisted()).await;
        info!(
            "bootstrap complete: {resolution:?}, {} day(s) on ledger, {} pending",
            state.ledger.len(),
            state.pending.len()
        );
        BootReport {
            resolution,
            restored_from_disk,
            flush,
        }
    }
}
