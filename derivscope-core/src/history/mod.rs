//! Durable per-protocol history and the fragment merge rules.

pub mod merge;
pub mod store;

pub use merge::{merge_history_fragment, reconcile_snapshot};
pub use store::{write_atomic, HistoryStore, StoreError};
