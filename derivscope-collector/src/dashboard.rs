//! Dashboard document assembly.
//!
//! Pure data: the merged snapshots for a segment collapse into summed
//! headline metrics, chart-ready aggregated timeseries, the market-share
//! vector, and one summary card per protocol. Serialized as pretty JSON
//! for the frontend.

use std::collections::BTreeMap;
use std::path::Path;

use derivscope_core::history::{write_atomic, StoreError};
use derivscope_core::snapshot::{metric, HistoryField, ProtocolSnapshot};
use derivscope_core::timeseries::{
    aggregate, market_share, AggregatedTimeseries, EntitySeries, RankBy, ShareEntry,
};
use serde::Serialize;

/// Summed current totals for a segment.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetrics {
    pub volume24h: f64,
    pub fees24h: f64,
    pub revenue24h: f64,
    pub tvl: f64,
}

/// Per-protocol summary card.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolCard {
    pub display_name: String,
    pub volume24h: f64,
    pub fees24h: f64,
    pub revenue24h: f64,
    pub open_interest: f64,
    pub current_tvl: f64,
}

/// Everything the dashboard needs for one market segment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentReport {
    pub metrics: SegmentMetrics,
    pub volume_timeseries: AggregatedTimeseries,
    pub fees_timeseries: AggregatedTimeseries,
    pub revenue_timeseries: AggregatedTimeseries,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvl_timeseries: Option<AggregatedTimeseries>,
    pub market_share: Vec<ShareEntry>,
    pub protocols: BTreeMap<String, ProtocolCard>,
}

/// The full output document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub last_updated: String,
    pub perps: SegmentReport,
    pub options: SegmentReport,
}

impl DashboardData {
    /// Write the document atomically as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, &json)
    }
}

/// Entities for one history field, skipping protocols with nothing to
/// chart so an all-empty protocol never occupies a top-N slot.
fn field_entities(
    snapshots: &BTreeMap<String, ProtocolSnapshot>,
    field: HistoryField,
) -> BTreeMap<String, EntitySeries> {
    snapshots
        .iter()
        .filter_map(|(slug, snap)| {
            let history = snap.history.get(&field)?;
            if history.is_empty() {
                return None;
            }
            Some((
                slug.clone(),
                EntitySeries::new(snap.display_name.clone(), history.clone()),
            ))
        })
        .collect()
}

fn sum_metric(snapshots: &BTreeMap<String, ProtocolSnapshot>, name: &str) -> f64 {
    snapshots.values().filter_map(|s| s.metric(name)).sum()
}

/// Build one segment's report from its merged snapshots.
pub fn build_segment(
    snapshots: &BTreeMap<String, ProtocolSnapshot>,
    top_n: usize,
    include_tvl: bool,
) -> SegmentReport {
    let volume_ts = aggregate(&field_entities(snapshots, HistoryField::Volume), top_n, RankBy::Total);
    let fees_ts = aggregate(&field_entities(snapshots, HistoryField::Fees), top_n, RankBy::Total);
    let revenue_ts = aggregate(
        &field_entities(snapshots, HistoryField::Revenue),
        top_n,
        RankBy::Total,
    );
    // TVL is a stock metric; ranking by sum would double-count across days.
    let tvl_ts = include_tvl.then(|| {
        aggregate(&field_entities(snapshots, HistoryField::Tvl), top_n, RankBy::Peak)
    });

    let share_input: BTreeMap<String, f64> = snapshots
        .values()
        .map(|s| {
            (
                s.display_name.clone(),
                s.metric(metric::VOLUME_24H).unwrap_or(0.0),
            )
        })
        .collect();

    let protocols = snapshots
        .iter()
        .map(|(slug, snap)| {
            (
                slug.clone(),
                ProtocolCard {
                    display_name: snap.display_name.clone(),
                    volume24h: snap.metric(metric::VOLUME_24H).unwrap_or(0.0),
                    fees24h: snap.metric(metric::FEES_24H).unwrap_or(0.0),
                    revenue24h: snap.metric(metric::REVENUE_24H).unwrap_or(0.0),
                    open_interest: snap.metric(metric::OPEN_INTEREST).unwrap_or(0.0),
                    current_tvl: snap.metric(metric::CURRENT_TVL).unwrap_or(0.0),
                },
            )
        })
        .collect();

    SegmentReport {
        metrics: SegmentMetrics {
            volume24h: sum_metric(snapshots, metric::VOLUME_24H),
            fees24h: sum_metric(snapshots, metric::FEES_24H),
            revenue24h: sum_metric(snapshots, metric::REVENUE_24H),
            tvl: sum_metric(snapshots, metric::CURRENT_TVL),
        },
        volume_timeseries: volume_ts,
        fees_timeseries: fees_ts,
        revenue_timeseries: revenue_ts,
        tvl_timeseries: tvl_ts,
        market_share: market_share(&share_input),
        protocols,
    }
}
