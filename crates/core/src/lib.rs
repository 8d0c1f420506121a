//! Offline-first client core for the dayloop daily-puzzle game.
//!
//! The sync engine keeps a durable ledger of solved days, queues score
//! submissions while the backend is unreachable, and reconciles local and
//! server-side progress on every app start. Remote services and the durable
//! store are consumed through the narrow traits in [`remote`] and [`store`],
//! so hosts (and tests) can swap implementations freely.

pub mod dates;
pub mod errors;
pub mod identity;
pub mod ledger;
pub mod profile;
pub mod remote;
pub mod store;
pub mod sync;
