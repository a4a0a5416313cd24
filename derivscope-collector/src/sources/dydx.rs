//! dYdX v4 perpetuals via the indexer.
//!
//! `GET https://indexer.dydx.trade/v4/perpetualMarkets`. Only markets with
//! status ACTIVE count; numbers arrive as strings; open interest is in
//! base-asset units and is converted with the oracle price.

use std::collections::BTreeMap;

use derivscope_core::net::FetchError;
use derivscope_core::snapshot::{metric, ProtocolSnapshot};
use serde::Deserialize;

use super::{lenient_f64, SourceContext};

pub const MARKETS_URL: &str = "https://indexer.dydx.trade/v4/perpetualMarkets";

/// 0.05% taker fee.
const FEE_RATE: f64 = 0.0005;
const REVENUE_SHARE: f64 = 0.4;

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    #[serde(default)]
    markets: BTreeMap<String, Market>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Market {
    #[serde(default)]
    status: String,
    #[serde(default, rename = "volume24H")]
    volume_24h: String,
    #[serde(default)]
    oracle_price: String,
    #[serde(default)]
    open_interest: String,
}

pub fn fetch(ctx: &SourceContext) -> Result<ProtocolSnapshot, FetchError> {
    let resp: MarketsResponse = ctx.client.get(&ctx.endpoint(MARKETS_URL), &ctx.policy)?;
    Ok(snapshot_from(&resp))
}

fn snapshot_from(resp: &MarketsResponse) -> ProtocolSnapshot {
    let mut volume_24h = 0.0;
    let mut open_interest = 0.0;

    for market in resp.markets.values() {
        if market.status != "ACTIVE" {
            continue;
        }
        let oracle = lenient_f64(&market.oracle_price);
        volume_24h += lenient_f64(&market.volume_24h);
        open_interest += lenient_f64(&market.open_interest) * oracle;
    }

    let fees_24h = volume_24h * FEE_RATE;

    let mut snap = ProtocolSnapshot::new("dydx", "dYdX").with_source("dydx-indexer");
    snap.set_metric(metric::VOLUME_24H, volume_24h);
    snap.set_metric(metric::OPEN_INTEREST, open_interest);
    snap.set_metric(metric::FEES_24H, fees_24h);
    snap.set_metric(metric::REVENUE_24H, fees_24h * REVENUE_SHARE);
    snap
}
