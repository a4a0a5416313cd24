//! Latest-snapshot persistence.
//!
//! After each run the merged snapshots are written to
//! `perps_latest.json` / `options_latest.json`. On the next run they are
//! the lowest-precedence merge tier, so history and last known metrics
//! survive upstream outages. Loading degrades to empty exactly like the
//! history store.

use std::collections::BTreeMap;
use std::path::Path;

use derivscope_core::history::{write_atomic, StoreError};
use derivscope_core::snapshot::ProtocolSnapshot;

pub const PERPS_FILE: &str = "perps_latest.json";
pub const OPTIONS_FILE: &str = "options_latest.json";

/// Load the previous run's snapshots; missing or corrupt files yield an
/// empty map.
pub fn load(path: &Path) -> BTreeMap<String, ProtocolSnapshot> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                eprintln!("latest snapshots unreadable at {}: {e}", path.display());
            }
            return BTreeMap::new();
        }
    };
    match serde_json::from_str(&text) {
        Ok(snapshots) => snapshots,
        Err(e) => {
            eprintln!(
                "latest snapshots corrupt at {}, ignoring: {e}",
                path.display()
            );
            BTreeMap::new()
        }
    }
}

/// Persist this run's merged snapshots atomically.
pub fn save(path: &Path, snapshots: &BTreeMap<String, ProtocolSnapshot>) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(snapshots)?;
    write_atomic(path, &json)
}
