//! Market-share percentages.

use std::collections::BTreeMap;

use serde::Serialize;

/// One protocol's share of the total, as a percentage rounded to two
/// decimal places.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareEntry {
    pub name: String,
    pub pct: f64,
}

/// Compute market share from current values, keyed by display name.
///
/// Zero and negative values are excluded before totalling, so a protocol
/// whose fetch failed neither appears nor skews the denominator. Output is
/// ordered largest share first, ties by name.
pub fn market_share(values: &BTreeMap<String, f64>) -> Vec<ShareEntry> {
    let positive: Vec<(&String, f64)> = values
        .iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|(n, v)| (n, *v))
        .collect();

    let total: f64 = positive.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut shares: Vec<ShareEntry> = positive
        .into_iter()
        .map(|(name, value)| ShareEntry {
            name: name.clone(),
            pct: round2(value / total * 100.0),
        })
        .collect();

    shares.sort_by(|a, b| b.pct.total_cmp(&a.pct).then_with(|| a.name.cmp(&b.name)));
    shares
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
