//! Normalized per-protocol snapshot.
//!
//! Every data source, whatever its wire shape, parses into a
//! `ProtocolSnapshot`: current metric values plus any date-keyed history
//! fragments the source happened to include. The merge and aggregation
//! layers only ever see this shape.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Canonical metric names, shared between sources and the dashboard.
pub mod metric {
    pub const VOLUME_24H: &str = "volume24h";
    pub const FEES_24H: &str = "fees24h";
    pub const REVENUE_24H: &str = "revenue24h";
    pub const OPEN_INTEREST: &str = "openInterest";
    pub const CURRENT_TVL: &str = "currentTvl";
}

/// A historical series a snapshot can carry.
///
/// `Ord` so fragments serialize in a stable order inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryField {
    Volume,
    Fees,
    Revenue,
    Tvl,
}

impl HistoryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryField::Volume => "volume",
            HistoryField::Fees => "fees",
            HistoryField::Revenue => "revenue",
            HistoryField::Tvl => "tvl",
        }
    }
}

/// One protocol's state as observed in a single collection run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSnapshot {
    pub slug: String,
    pub display_name: String,

    /// Current scalar metrics, keyed by the names in [`metric`].
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    /// Date-keyed history fragments this source provided, if any.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub history: BTreeMap<HistoryField, BTreeMap<NaiveDate, f64>>,

    /// Which upstream produced this snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ProtocolSnapshot {
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn set_metric(&mut self, name: &str, value: f64) {
        self.metrics.insert(name.to_string(), value);
    }

    /// Record one point of a history fragment.
    pub fn record_history(&mut self, field: HistoryField, date: NaiveDate, value: f64) {
        self.history.entry(field).or_default().insert(date, value);
    }
}

/// Truncate a unix timestamp to its UTC calendar day.
///
/// Out-of-range timestamps (as sometimes appear in buggy upstream rows)
/// yield `None` rather than a bogus date.
pub fn date_from_unix(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc().date())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_timestamps_truncate_to_utc_days() {
        // 2024-03-15T23:59:59Z and 2024-03-16T00:00:01Z are different days.
        assert_eq!(
            date_from_unix(1710547199),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            date_from_unix(1710547201),
            NaiveDate::from_ymd_opt(2024, 3, 16)
        );
        assert_eq!(date_from_unix(i64::MAX), None);
    }

    #[test]
    fn snapshot_serializes_with_camel_case_keys() {
        let mut snap = ProtocolSnapshot::new("hyperliquid", "Hyperliquid");
        snap.set_metric(metric::VOLUME_24H, 1.5e9);
        snap.source = Some("hyperliquid-api".to_string());

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["displayName"], "Hyperliquid");
        assert_eq!(json["metrics"]["volume24h"], 1.5e9);
        assert_eq!(json["source"], "hyperliquid-api");
        // Empty history is omitted entirely.
        assert!(json.get("history").is_none());
    }

    #[test]
    fn history_fragments_round_trip_with_date_keys() {
        let mut snap = ProtocolSnapshot::new("deribit", "Deribit");
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        snap.record_history(HistoryField::Fees, day, 1234.5);

        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains(r#""fees":{"2024-01-02":1234.5}"#));

        let back: ProtocolSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.history[&HistoryField::Fees][&day], 1234.5);
    }
}
