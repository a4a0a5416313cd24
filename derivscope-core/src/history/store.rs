//! On-disk history store.
//!
//! One JSON document holding everything this process has ever learned:
//! a per-protocol daily metric series built up one run at a time, and the
//! last known history fragments per protocol and field. Loading never
//! fails; a missing or corrupt file degrades to an empty store so a
//! collection run can always proceed and rebuild state going forward.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::HistoryField;

/// date → value series.
pub type DateSeries = BTreeMap<NaiveDate, f64>;

/// field → (date → value) fragments for one protocol.
pub type FragmentSet = BTreeMap<HistoryField, DateSeries>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write history store to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize history store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Accumulated history across all collection runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryStore {
    /// slug → (date → value), appended to by each run.
    #[serde(default, rename = "dailySnapshots")]
    pub daily_snapshots: BTreeMap<String, DateSeries>,

    /// slug → (field → (date → value)), the merged fragments from the most
    /// recent reconciliation of each protocol.
    #[serde(default, rename = "perEntityHistoryFragments")]
    pub fragments: BTreeMap<String, FragmentSet>,
}

impl HistoryStore {
    /// Load the store from `path`. Any failure (missing file, unreadable
    /// file, undecodable JSON) yields an empty store with a note on stderr.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    eprintln!("history store unreadable at {}: {e}", path.display());
                }
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(store) => store,
            Err(e) => {
                eprintln!(
                    "history store corrupt at {}, starting empty: {e}",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Persist atomically: write a sibling temp file, then rename over the
    /// destination. A crash mid-save leaves the previous file intact.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, &json)
    }

    /// Record one day's value for a protocol. Zero and negative values are
    /// dropped: a failed fetch reports 0 and must not overwrite or pad the
    /// series.
    pub fn record_daily_snapshot(&mut self, slug: &str, date: NaiveDate, value: f64) {
        if value > 0.0 {
            self.daily_snapshots
                .entry(slug.to_string())
                .or_default()
                .insert(date, value);
        }
    }

    pub fn fragments_for(&self, slug: &str) -> Option<&FragmentSet> {
        self.fragments.get(slug)
    }
}

/// Write `contents` to `path` via temp-file-and-rename in the same
/// directory, so the rename stays on one filesystem.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let err = |source| StoreError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(err)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).map_err(err)?;
    fs::rename(&tmp, path).map_err(err)
}
