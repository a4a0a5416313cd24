//! Top-N timeseries aggregation.
//!
//! Collapses many per-protocol date series into a chart-ready set: a single
//! ascending date axis (the union of every protocol's dates), one series
//! per top-ranked protocol, and an "Others" series summing the rest.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::history::store::DateSeries;

/// Series name used for the combined remainder.
///
/// The label shares the output namespace with display names: a top-ranked
/// entity literally named "Others" would merge with the remainder bucket.
/// Callers choosing display names must avoid this label.
pub const OTHERS_LABEL: &str = "Others";

/// How protocols are ranked when picking the top N.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    /// Sum over the series. Right for flow metrics like volume or fees.
    Total,
    /// Maximum over the series. Right for stock metrics like TVL or open
    /// interest, where summing across days double-counts.
    Peak,
}

/// One protocol's input to aggregation.
#[derive(Debug, Clone)]
pub struct EntitySeries {
    pub display_name: String,
    pub history: DateSeries,
}

impl EntitySeries {
    pub fn new(display_name: impl Into<String>, history: DateSeries) -> Self {
        Self {
            display_name: display_name.into(),
            history,
        }
    }

    fn score(&self, rank_by: RankBy) -> f64 {
        match rank_by {
            RankBy::Total => self.history.values().sum(),
            RankBy::Peak => self.history.values().copied().fold(0.0, f64::max),
        }
    }
}

/// Chart-ready aggregation output. Every series has exactly one value per
/// date, with 0.0 filling the dates a protocol has no data for.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedTimeseries {
    pub dates: Vec<NaiveDate>,
    pub series: BTreeMap<String, Vec<f64>>,
}

/// Aggregate `entities` (keyed by slug) into top-N series plus "Others".
///
/// Empty fragments are discarded up front. Ranking ties break by slug,
/// ascending, so output is stable run to run. "Others" appears only when at
/// least one surviving protocol was actually excluded.
pub fn aggregate(
    entities: &BTreeMap<String, EntitySeries>,
    top_n: usize,
    rank_by: RankBy,
) -> AggregatedTimeseries {
    // Entities with nothing to chart neither occupy a rank slot nor count
    // as excluded, so they can never force an all-zero "Others".
    let entities: BTreeMap<&String, &EntitySeries> = entities
        .iter()
        .filter(|(_, e)| !e.history.is_empty())
        .collect();

    let dates: Vec<NaiveDate> = entities
        .values()
        .flat_map(|e| e.history.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // (slug, score), best first. BTreeMap iteration already gives ascending
    // slugs, and the sort is stable, so equal scores keep slug order.
    let mut ranked: Vec<(&String, f64)> = entities
        .iter()
        .map(|(slug, e)| (*slug, e.score(rank_by)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut series: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut others = vec![0.0; dates.len()];
    let mut any_excluded = false;

    for (rank, (slug, _)) in ranked.iter().enumerate() {
        let entity = &entities[*slug];
        let values: Vec<f64> = dates
            .iter()
            .map(|d| entity.history.get(d).copied().unwrap_or(0.0))
            .collect();

        if rank < top_n {
            // Two slugs sharing a display name combine into one series.
            match series.entry(entity.display_name.clone()) {
                std::collections::btree_map::Entry::Vacant(v) => {
                    v.insert(values);
                }
                std::collections::btree_map::Entry::Occupied(mut o) => {
                    for (acc, v) in o.get_mut().iter_mut().zip(&values) {
                        *acc += v;
                    }
                }
            }
        } else {
            any_excluded = true;
            for (acc, v) in others.iter_mut().zip(&values) {
                *acc += v;
            }
        }
    }

    if any_excluded {
        series.insert(OTHERS_LABEL.to_string(), others);
    }

    AggregatedTimeseries { dates, series }
}
