//! DefiLlama summaries: volume, fees/revenue, and TVL histories.
//!
//! Free endpoints, no key. Chart arrays are `[unix_seconds, value]` pairs;
//! dates are derived by UTC truncation. Perps volume is fetched through a
//! fallback chain (`/summary/derivatives/{slug}` first, then
//! `/summary/dexs/{slug}`) because protocol coverage differs between the
//! two but the response shape is the same.

use std::collections::BTreeMap;

use derivscope_core::history::store::DateSeries;
use derivscope_core::net::FetchError;
use derivscope_core::snapshot::date_from_unix;
use serde::Deserialize;

use super::SourceContext;

pub const BASE_URL: &str = "https://api.llama.fi";

/// Shared shape of `/summary/{dexs,derivatives,options,fees}/{slug}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    #[serde(default)]
    pub total_data_chart: Vec<(i64, f64)>,
    #[serde(default)]
    pub total_data_chart_breakdown: Vec<(i64, serde_json::Value)>,
    #[serde(default)]
    pub total24h: Option<f64>,
    #[serde(default)]
    pub daily_fees: Option<f64>,
    #[serde(default)]
    pub daily_revenue: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolResponse {
    #[serde(default)]
    tvl: Vec<TvlPoint>,
    #[serde(default)]
    current_chain_tvls: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvlPoint {
    date: i64,
    #[serde(default, rename = "totalLiquidityUSD")]
    total_liquidity_usd: f64,
}

/// A volume summary normalized to a date-keyed series.
#[derive(Debug, Default)]
pub struct VolumeSummary {
    pub total24h: f64,
    pub history: DateSeries,
}

/// Daily fees and revenue series plus the 24h headline numbers.
#[derive(Debug, Default)]
pub struct FeesSummary {
    pub fees24h: f64,
    pub revenue24h: f64,
    pub fees: DateSeries,
    pub revenue: DateSeries,
}

#[derive(Debug, Default)]
pub struct TvlSummary {
    pub current: f64,
    pub history: DateSeries,
}

/// Convert a DefiLlama chart array into a date series. Rows with
/// unrepresentable timestamps are dropped.
pub fn chart_to_series(chart: &[(i64, f64)]) -> DateSeries {
    chart
        .iter()
        .filter_map(|(ts, value)| date_from_unix(*ts).map(|date| (date, *value)))
        .collect()
}

/// Split a fees breakdown chart into daily fees and daily revenue.
///
/// Breakdown rows carry chain-level maps whose leaves are either plain
/// numbers (fees only) or `{dailyFees, dailyRevenue}` objects; both forms
/// appear in the wild, sometimes in the same response.
fn split_breakdown(
    breakdown: &[(i64, serde_json::Value)],
    flat: &DateSeries,
) -> (DateSeries, DateSeries) {
    let mut fees = DateSeries::new();
    let mut revenue = DateSeries::new();

    for (ts, row) in breakdown {
        let Some(date) = date_from_unix(*ts) else {
            continue;
        };
        let mut fee_sum = 0.0;
        let mut rev_sum = 0.0;
        if let Some(chains) = row.as_object() {
            for chain in chains.values() {
                match chain {
                    serde_json::Value::Object(fields) => {
                        fee_sum += fields
                            .get("dailyFees")
                            .and_then(serde_json::Value::as_f64)
                            .unwrap_or(0.0);
                        rev_sum += fields
                            .get("dailyRevenue")
                            .and_then(serde_json::Value::as_f64)
                            .unwrap_or(0.0);
                    }
                    other => fee_sum += other.as_f64().unwrap_or(0.0),
                }
            }
        }
        let fee_value = if fee_sum > 0.0 {
            fee_sum
        } else {
            flat.get(&date).copied().unwrap_or(0.0)
        };
        fees.insert(date, fee_value);
        revenue.insert(date, rev_sum);
    }

    (fees, revenue)
}

/// Perps volume via the derivatives/dexs fallback chain.
pub fn fetch_perps_volume(ctx: &SourceContext, slug: &str) -> Result<VolumeSummary, FetchError> {
    let endpoints = [
        ctx.endpoint(format!("{BASE_URL}/summary/derivatives/{slug}")),
        ctx.endpoint(format!("{BASE_URL}/summary/dexs/{slug}")),
    ];
    let resp: SummaryResponse = ctx.client.get_with_fallback(&endpoints, &ctx.policy)?;
    Ok(volume_from_summary(resp))
}

/// Options notional volume history.
pub fn fetch_options_volume(ctx: &SourceContext, slug: &str) -> Result<VolumeSummary, FetchError> {
    let endpoint = ctx.endpoint(format!("{BASE_URL}/summary/options/{slug}"));
    let resp: SummaryResponse = ctx.client.get(&endpoint, &ctx.policy)?;
    Ok(volume_from_summary(resp))
}

fn volume_from_summary(resp: SummaryResponse) -> VolumeSummary {
    VolumeSummary {
        total24h: resp.total24h.unwrap_or(0.0),
        history: chart_to_series(&resp.total_data_chart),
    }
}

/// Fees and revenue history.
///
/// When the chain breakdown yields no revenue at all, both series fall
/// back to the flat fees chart; a fees-only series still beats nothing.
pub fn fetch_fees(ctx: &SourceContext, slug: &str) -> Result<FeesSummary, FetchError> {
    let endpoint = ctx.endpoint(format!("{BASE_URL}/summary/fees/{slug}"));
    let resp: SummaryResponse = ctx.client.get(&endpoint, &ctx.policy)?;
    Ok(fees_from_summary(resp))
}

fn fees_from_summary(resp: SummaryResponse) -> FeesSummary {
    let flat = chart_to_series(&resp.total_data_chart);
    let (fees, revenue) = split_breakdown(&resp.total_data_chart_breakdown, &flat);

    let fees = if fees.is_empty() { flat.clone() } else { fees };
    let revenue = if revenue.values().any(|v| *v > 0.0) {
        revenue
    } else {
        flat
    };

    FeesSummary {
        fees24h: resp.daily_fees.or(resp.total24h).unwrap_or(0.0),
        revenue24h: resp.daily_revenue.unwrap_or(0.0),
        fees,
        revenue,
    }
}

/// Current TVL plus its full history.
pub fn fetch_tvl(ctx: &SourceContext, slug: &str) -> Result<TvlSummary, FetchError> {
    let endpoint = ctx.endpoint(format!("{BASE_URL}/protocol/{slug}"));
    let resp: ProtocolResponse = ctx.client.get(&endpoint, &ctx.policy)?;

    let history: DateSeries = resp
        .tvl
        .iter()
        .filter_map(|p| date_from_unix(p.date).map(|d| (d, p.total_liquidity_usd)))
        .collect();

    // "total" when present, otherwise the sum of the numeric chain entries.
    let current = match resp
        .current_chain_tvls
        .get("total")
        .and_then(serde_json::Value::as_f64)
    {
        Some(total) => total,
        None => resp
            .current_chain_tvls
            .values()
            .filter_map(serde_json::Value::as_f64)
            .sum(),
    };

    Ok(TvlSummary { current, history })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const JAN1: i64 = 1704067200; // 2024-01-01T00:00:00Z
    const JAN2: i64 = 1704153600;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn chart_rows_become_date_keyed_values() {
        let series = chart_to_series(&[(JAN1, 10.0), (JAN2, 20.0), (i64::MAX, 99.0)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series[&day(1)], 10.0);
        assert_eq!(series[&day(2)], 20.0);
    }

    #[test]
    fn breakdown_with_objects_splits_fees_and_revenue() {
        let resp: SummaryResponse = serde_json::from_value(serde_json::json!({
            "totalDataChart": [[JAN1, 100.0]],
            "totalDataChartBreakdown": [
                [JAN1, {"arbitrum": {"dailyFees": 60.0, "dailyRevenue": 18.0},
                        "avalanche": {"dailyFees": 40.0, "dailyRevenue": 12.0}}]
            ],
            "total24h": 100.0,
            "dailyRevenue": 30.0
        }))
        .unwrap();

        let fees = fees_from_summary(resp);
        assert_eq!(fees.fees[&day(1)], 100.0);
        assert_eq!(fees.revenue[&day(1)], 30.0);
        assert_eq!(fees.fees24h, 100.0);
        assert_eq!(fees.revenue24h, 30.0);
    }

    #[test]
    fn breakdown_with_plain_numbers_falls_back_for_revenue() {
        let resp: SummaryResponse = serde_json::from_value(serde_json::json!({
            "totalDataChart": [[JAN1, 50.0], [JAN2, 70.0]],
            "totalDataChartBreakdown": [
                [JAN1, {"ethereum": 50.0}],
                [JAN2, {"ethereum": 70.0}]
            ]
        }))
        .unwrap();

        let fees = fees_from_summary(resp);
        assert_eq!(fees.fees[&day(1)], 50.0);
        // No revenue anywhere in the breakdown, so the flat chart stands in.
        assert_eq!(fees.revenue[&day(2)], 70.0);
    }

    #[test]
    fn empty_breakdown_uses_the_flat_chart_for_both() {
        let resp: SummaryResponse = serde_json::from_value(serde_json::json!({
            "totalDataChart": [[JAN1, 5.0]]
        }))
        .unwrap();
        let fees = fees_from_summary(resp);
        assert_eq!(fees.fees[&day(1)], 5.0);
        assert_eq!(fees.revenue[&day(1)], 5.0);
    }

    #[test]
    fn tvl_prefers_the_total_entry_over_chain_sums() {
        let resp: ProtocolResponse = serde_json::from_value(serde_json::json!({
            "tvl": [{"date": JAN1, "totalLiquidityUSD": 1.0e9}],
            "currentChainTvls": {"total": 2.0e9, "arbitrum": 1.5e9, "staking": 0.5e9}
        }))
        .unwrap();
        assert_eq!(resp.current_chain_tvls["total"], 2.0e9);

        let history: DateSeries = resp
            .tvl
            .iter()
            .filter_map(|p| date_from_unix(p.date).map(|d| (d, p.total_liquidity_usd)))
            .collect();
        assert_eq!(history[&day(1)], 1.0e9);
    }
}
