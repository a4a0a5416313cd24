//! Hyperliquid perpetuals via the public info endpoint.
//!
//! `POST https://api.hyperliquid.xyz/info` with `{"type": "metaAndAssetCtxs"}`
//! returns a two-element array: the asset universe and one context per
//! asset. Numbers arrive as strings. Open interest is in coins and is
//! converted to USD with the oracle price; fees and revenue are estimated
//! from volume.

use derivscope_core::net::FetchError;
use derivscope_core::snapshot::{metric, ProtocolSnapshot};
use serde::Deserialize;

use super::{lenient_f64, SourceContext};

pub const INFO_URL: &str = "https://api.hyperliquid.xyz/info";

/// Taker fee used for the estimate: 0.035% of volume.
const FEE_RATE: f64 = 0.00035;
/// Share of fees retained as protocol revenue.
const REVENUE_SHARE: f64 = 0.5;

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default)]
    universe: Vec<AssetMeta>,
}

#[derive(Debug, Deserialize)]
struct AssetMeta {
    #[allow(dead_code)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetCtx {
    #[serde(default)]
    day_ntl_vlm: String,
    #[serde(default)]
    open_interest: String,
    #[serde(default)]
    oracle_px: String,
}

/// Fetch and aggregate the full perps universe into one snapshot.
pub fn fetch(ctx: &SourceContext) -> Result<ProtocolSnapshot, FetchError> {
    let body = serde_json::json!({"type": "metaAndAssetCtxs"});
    let (meta, contexts): (Meta, Vec<AssetCtx>) =
        ctx.client.post(&ctx.endpoint(INFO_URL), &body, &ctx.policy)?;
    Ok(snapshot_from(&meta, &contexts))
}

fn snapshot_from(meta: &Meta, contexts: &[AssetCtx]) -> ProtocolSnapshot {
    let mut volume_24h = 0.0;
    let mut open_interest = 0.0;

    // Contexts pair up positionally with the universe; a length mismatch
    // just truncates to the shorter side.
    for (_, asset) in meta.universe.iter().zip(contexts) {
        volume_24h += lenient_f64(&asset.day_ntl_vlm);
        open_interest += lenient_f64(&asset.open_interest) * lenient_f64(&asset.oracle_px);
    }

    let fees_24h = volume_24h * FEE_RATE;

    let mut snap = ProtocolSnapshot::new("hyperliquid", "Hyperliquid").with_source("hyperliquid-api");
    snap.set_metric(metric::VOLUME_24H, volume_24h);
    snap.set_metric(metric::OPEN_INTEREST, open_interest);
    snap.set_metric(metric::FEES_24H, fees_24h);
    snap.set_metric(metric::REVENUE_24H, fees_24h * REVENUE_SHARE);
    snap
}
