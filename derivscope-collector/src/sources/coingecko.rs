//! CoinGecko free-tier derivatives exchanges.
//!
//! Fill-in source for perps protocols without a direct API integration.
//! Exchange listings are paginated at 100 per page (at most 3 pages);
//! volume and open interest are BTC-denominated and converted with the
//! spot price from `/simple/price`. Exchange ids map to internal slugs
//! with a fuzzy name fallback for ids CoinGecko changes over time.

use std::collections::BTreeMap;

use derivscope_core::net::FetchError;
use derivscope_core::snapshot::{metric, ProtocolSnapshot};
use serde::Deserialize;

use super::{lenient_f64, SourceContext};

pub const BASE_URL: &str = "https://api.coingecko.com/api/v3";

const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 3;

/// Spot estimate when `/simple/price` is unavailable. A stale conversion
/// beats dropping every CoinGecko-sourced protocol for the run.
const FALLBACK_BTC_PRICE: f64 = 60_000.0;

/// CoinGecko exchange id → internal slug.
const EXCHANGE_ID_MAP: [(&str, &str); 21] = [
    ("gmx", "gmx-v2"),
    ("gmx_v2", "gmx-v2"),
    ("jupiter_perpetual", "jupiter-perpetual"),
    ("jupiter", "jupiter-perpetual"),
    ("drift_protocol", "drift-protocol"),
    ("drift", "drift-protocol"),
    ("vertex_protocol", "vertex-protocol"),
    ("vertex", "vertex-protocol"),
    ("kwenta", "kwenta"),
    ("gains_network", "gains-network"),
    ("gains-network", "gains-network"),
    ("synthetix", "synthetix"),
    ("aevo", "aevo"),
    ("bluefin", "bluefin"),
    ("apex_protocol", "apex-protocol"),
    ("apex-protocol", "apex-protocol"),
    ("rabbitx", "rabbitx"),
    ("lighter", "lighter-v2"),
    ("hyperliquid", "hyperliquid"),
    ("dydx_perpetual", "dydx"),
    ("dydx", "dydx"),
];

/// Estimated taker fee rate per protocol.
const FEE_RATES: [(&str, f64); 12] = [
    ("gmx-v2", 0.0007),
    ("jupiter-perpetual", 0.0006),
    ("drift-protocol", 0.0005),
    ("vertex-protocol", 0.0002),
    ("kwenta", 0.0006),
    ("gains-network", 0.0008),
    ("synthetix", 0.0006),
    ("aevo", 0.0005),
    ("bluefin", 0.0004),
    ("apex-protocol", 0.0005),
    ("rabbitx", 0.0004),
    ("lighter-v2", 0.0004),
];
const DEFAULT_FEE_RATE: f64 = 0.0005;
const REVENUE_SHARE: f64 = 0.3;

#[derive(Debug, Deserialize)]
struct Exchange {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    open_interest_btc: Option<f64>,
    /// Arrives as a string, sometimes with thousands separators.
    #[serde(default)]
    trade_volume_24h_btc: Option<String>,
}

fn map_to_slug(exchange: &Exchange) -> Option<&'static str> {
    let id = exchange.id.to_lowercase();
    if let Some((_, slug)) = EXCHANGE_ID_MAP.iter().find(|(key, _)| *key == id) {
        return Some(slug);
    }
    // Fuzzy fallback: a known key appearing inside the display name.
    let name = exchange.name.to_lowercase();
    EXCHANGE_ID_MAP
        .iter()
        .find(|(key, _)| name.contains(key))
        .map(|(_, slug)| *slug)
}

fn fee_rate(slug: &str) -> f64 {
    FEE_RATES
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, rate)| *rate)
        .unwrap_or(DEFAULT_FEE_RATE)
}

fn snapshot_from(exchange: &Exchange, slug: &str, display_name: &str, btc_price: f64) -> ProtocolSnapshot {
    let volume_usd = exchange
        .trade_volume_24h_btc
        .as_deref()
        .map(lenient_f64)
        .unwrap_or(0.0)
        * btc_price;
    let oi_usd = exchange.open_interest_btc.unwrap_or(0.0) * btc_price;
    let fees_24h = volume_usd * fee_rate(slug);

    let mut snap = ProtocolSnapshot::new(slug, display_name).with_source("coingecko");
    snap.set_metric(metric::VOLUME_24H, volume_usd);
    snap.set_metric(metric::OPEN_INTEREST, oi_usd);
    snap.set_metric(metric::FEES_24H, fees_24h);
    snap.set_metric(metric::REVENUE_24H, fees_24h * REVENUE_SHARE);
    snap
}

fn fetch_btc_price(ctx: &SourceContext) -> f64 {
    #[derive(Deserialize)]
    struct Prices {
        #[serde(default)]
        bitcoin: BTreeMap<String, f64>,
    }

    let endpoint = ctx
        .endpoint(format!("{BASE_URL}/simple/price"))
        .query("ids", "bitcoin")
        .query("vs_currencies", "usd");
    match ctx.client.get::<Prices>(&endpoint, &ctx.policy) {
        Ok(prices) => prices
            .bitcoin
            .get("usd")
            .copied()
            .unwrap_or(FALLBACK_BTC_PRICE),
        Err(e) => {
            eprintln!("  BTC price fetch failed, using fallback: {e}");
            FALLBACK_BTC_PRICE
        }
    }
}

/// Fetch every mappable derivatives exchange as a snapshot, keyed by slug.
///
/// `display_names` supplies the chart labels for known slugs; unmapped
/// exchanges are dropped. When two CoinGecko listings map to the same slug
/// the one with more volume wins.
pub fn fetch(
    ctx: &SourceContext,
    display_names: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, ProtocolSnapshot>, FetchError> {
    let mut exchanges: Vec<Exchange> = Vec::new();
    for page in 1..=MAX_PAGES {
        let endpoint = ctx
            .endpoint(format!("{BASE_URL}/derivatives/exchanges"))
            .query("per_page", PAGE_SIZE)
            .query("page", page);
        let batch: Vec<Exchange> = ctx.client.get(&endpoint, &ctx.policy)?;
        let last_page = batch.len() < PAGE_SIZE;
        exchanges.extend(batch);
        if last_page {
            break;
        }
    }

    if exchanges.is_empty() {
        return Ok(BTreeMap::new());
    }

    let btc_price = fetch_btc_price(ctx);

    let mut results: BTreeMap<String, ProtocolSnapshot> = BTreeMap::new();
    for exchange in &exchanges {
        let Some(slug) = map_to_slug(exchange) else {
            continue;
        };
        let display_name = display_names
            .get(slug)
            .cloned()
            .unwrap_or_else(|| exchange.name.clone());
        let snap = snapshot_from(exchange, slug, &display_name, btc_price);

        match results.get(slug) {
            Some(existing)
                if existing.metric(metric::VOLUME_24H) >= snap.metric(metric::VOLUME_24H) => {}
            _ => {
                results.insert(slug.to_string(), snap);
            }
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(id: &str, name: &str, vol_btc: &str, oi_btc: f64) -> Exchange {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "open_interest_btc": oi_btc,
            "trade_volume_24h_btc": vol_btc,
        }))
        .unwrap()
    }

    #[test]
    fn exact_id_mapping_wins() {
        let ex = exchange("gmx_v2", "GMX (V2)", "100", 10.0);
        assert_eq!(map_to_slug(&ex), Some("gmx-v2"));
    }

    #[test]
    fn fuzzy_name_fallback_maps_unknown_ids() {
        let ex = exchange("drift_v3_mainnet", "Drift Protocol", "1", 0.0);
        assert_eq!(map_to_slug(&ex), Some("drift-protocol"));

        let ex = exchange("some_cex", "Binance Futures", "1", 0.0);
        assert_eq!(map_to_slug(&ex), None);
    }

    #[test]
    fn btc_denominated_values_convert_and_estimate_fees() {
        let ex = exchange("vertex", "Vertex", "1,000", 50.0);
        let snap = snapshot_from(&ex, "vertex-protocol", "Vertex", 60_000.0);

        assert_eq!(snap.metric(metric::VOLUME_24H), Some(60_000_000.0));
        assert_eq!(snap.metric(metric::OPEN_INTEREST), Some(3_000_000.0));
        // Vertex fee rate is 0.02%.
        assert_eq!(snap.metric(metric::FEES_24H), Some(12_000.0));
        assert_eq!(snap.metric(metric::REVENUE_24H), Some(3_600.0));
        assert_eq!(snap.source.as_deref(), Some("coingecko"));
    }

    #[test]
    fn unknown_slug_uses_the_default_fee_rate() {
        assert_eq!(fee_rate("hyperliquid"), DEFAULT_FEE_RATE);
        assert_eq!(fee_rate("gains-network"), 0.0008);
    }
}
