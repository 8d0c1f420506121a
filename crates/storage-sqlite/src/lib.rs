//! SQLite-backed durable store for the client snapshot.

mod store;

pub use store::SqliteSnapshotStore;
