//! Actor identity for the client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The current actor. At most one identity is active at a time.
///
/// `Local` ids are client-minted placeholders used before the backend has
/// confirmed anything. Promotion replaces the variant in place; ledger and
/// pending-queue data are never touched by an identity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Local(String),
    ServerConfirmed(String),
}

impl Identity {
    /// Mint a fresh local placeholder id.
    pub fn mint_local() -> Self {
        Identity::Local(Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        match self {
            Identity::Local(id) | Identity::ServerConfirmed(id) => id,
        }
    }

    pub fn is_server_confirmed(&self) -> bool {
        matches!(self, Identity::ServerConfirmed(_))
    }
}
