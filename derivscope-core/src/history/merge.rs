//! Three-tier history reconciliation.
//!
//! For each protocol and field there are up to three series in play on any
//! given run: what the API returned just now (fresh), what the store has
//! from earlier runs, and what the previous run's persisted snapshot
//! carried. Merging is last-write-wins with precedence
//! fresh > store > previous, per date.

use crate::history::store::{DateSeries, HistoryStore};
use crate::snapshot::{HistoryField, ProtocolSnapshot};

/// Merge one field's series across the three tiers. Where two tiers carry
/// the same date, the higher-precedence tier's value stands, even if it is
/// smaller.
pub fn merge_history_fragment(
    fresh: Option<&DateSeries>,
    store: Option<&DateSeries>,
    previous: Option<&DateSeries>,
) -> DateSeries {
    let mut merged = previous.cloned().unwrap_or_default();
    if let Some(store) = store {
        merged.extend(store.iter().map(|(d, v)| (*d, *v)));
    }
    if let Some(fresh) = fresh {
        merged.extend(fresh.iter().map(|(d, v)| (*d, *v)));
    }
    merged
}

/// Reconcile one protocol's snapshot for this run.
///
/// An absent tier behaves exactly like an empty snapshot, so a protocol
/// whose fetch failed this run still flows through with whatever history
/// survives from the store and the previous run. The merged fragments are
/// written back into the store so they accumulate across runs.
pub fn reconcile_snapshot(
    store: &mut HistoryStore,
    slug: &str,
    fresh: Option<&ProtocolSnapshot>,
    previous: Option<&ProtocolSnapshot>,
) -> ProtocolSnapshot {
    let display_name = fresh
        .map(|s| s.display_name.clone())
        .or_else(|| previous.map(|s| s.display_name.clone()))
        .unwrap_or_else(|| slug.to_string());

    let mut merged = ProtocolSnapshot::new(slug, display_name);
    merged.source = fresh
        .and_then(|s| s.source.clone())
        .or_else(|| previous.and_then(|s| s.source.clone()));

    // A fetch that failed or returned nothing reports metrics as absent or
    // zero; a stale non-zero value from the previous run beats that.
    if let Some(previous) = previous {
        merged.metrics = previous.metrics.clone();
    }
    if let Some(fresh) = fresh {
        for (name, value) in &fresh.metrics {
            if *value != 0.0 || !merged.metrics.contains_key(name) {
                merged.metrics.insert(name.clone(), *value);
            }
        }
    }

    let mut fields: Vec<HistoryField> = Vec::new();
    let mut note = |field: HistoryField| {
        if !fields.contains(&field) {
            fields.push(field);
        }
    };
    if let Some(fresh) = fresh {
        fresh.history.keys().copied().for_each(&mut note);
    }
    if let Some(set) = store.fragments_for(slug) {
        set.keys().copied().for_each(&mut note);
    }
    if let Some(previous) = previous {
        previous.history.keys().copied().for_each(&mut note);
    }

    for field in fields {
        let combined = merge_history_fragment(
            fresh.and_then(|s| s.history.get(&field)),
            store.fragments_for(slug).and_then(|set| set.get(&field)),
            previous.and_then(|s| s.history.get(&field)),
        );
        if combined.is_empty() {
            continue;
        }
        store
            .fragments
            .entry(slug.to_string())
            .or_default()
            .insert(field, combined.clone());
        merged.history.insert(field, combined);
    }

    merged
}
