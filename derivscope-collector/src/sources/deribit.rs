//! Deribit options via the public v2 API.
//!
//! Per currency (BTC, ETH): fetch the index price, then the book summaries
//! for every option instrument. Volume and open interest arrive in base
//! currency and are converted to USD with the index price. A currency
//! whose index price cannot be fetched is skipped, not fatal.

use derivscope_core::net::FetchError;
use derivscope_core::snapshot::{metric, ProtocolSnapshot};
use serde::Deserialize;

use super::SourceContext;

pub const BASE_URL: &str = "https://www.deribit.com/api/v2/public";

/// 0.03% of underlying.
const FEE_RATE: f64 = 0.0003;
/// Centralized venue; most fees are revenue.
const REVENUE_SHARE: f64 = 0.7;

const CURRENCIES: [&str; 2] = ["BTC", "ETH"];

#[derive(Debug, Deserialize)]
struct SummariesResponse {
    #[serde(default)]
    result: Vec<BookSummary>,
}

#[derive(Debug, Deserialize)]
struct BookSummary {
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    open_interest: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IndexPriceResponse {
    #[serde(default)]
    result: IndexPrice,
}

#[derive(Debug, Default, Deserialize)]
struct IndexPrice {
    #[serde(default)]
    index_price: f64,
}

struct CurrencyTotals {
    volume_usd: f64,
    open_interest_usd: f64,
}

fn aggregate(summaries: &[BookSummary], index_price: f64) -> CurrencyTotals {
    let mut volume_usd = 0.0;
    let mut open_interest_usd = 0.0;
    for inst in summaries {
        volume_usd += inst.volume.unwrap_or(0.0) * index_price;
        open_interest_usd += inst.open_interest.unwrap_or(0.0) * index_price;
    }
    CurrencyTotals {
        volume_usd,
        open_interest_usd,
    }
}

fn fetch_index_price(ctx: &SourceContext, currency: &str) -> Result<f64, FetchError> {
    let endpoint = ctx
        .endpoint(format!("{BASE_URL}/get_index_price"))
        .query("index_name", format!("{}_usd", currency.to_lowercase()));
    let resp: IndexPriceResponse = ctx.client.get(&endpoint, &ctx.policy)?;
    Ok(resp.result.index_price)
}

fn fetch_book_summaries(
    ctx: &SourceContext,
    currency: &str,
) -> Result<Vec<BookSummary>, FetchError> {
    let endpoint = ctx
        .endpoint(format!("{BASE_URL}/get_book_summary_by_currency"))
        .query("currency", currency)
        .query("kind", "option");
    let resp: SummariesResponse = ctx.client.get(&endpoint, &ctx.policy)?;
    Ok(resp.result)
}

/// Aggregate BTC and ETH options books into one snapshot.
pub fn fetch(ctx: &SourceContext) -> Result<ProtocolSnapshot, FetchError> {
    let mut volume_24h = 0.0;
    let mut open_interest = 0.0;

    for currency in CURRENCIES {
        let index_price = match fetch_index_price(ctx, currency) {
            Ok(price) if price > 0.0 => price,
            Ok(_) | Err(_) => {
                eprintln!("  skipping Deribit {currency}: no index price");
                continue;
            }
        };
        let summaries = match fetch_book_summaries(ctx, currency) {
            Ok(summaries) => summaries,
            Err(e) => {
                eprintln!("  skipping Deribit {currency} books: {e}");
                continue;
            }
        };
        let totals = aggregate(&summaries, index_price);
        volume_24h += totals.volume_usd;
        open_interest += totals.open_interest_usd;
    }

    let fees_24h = volume_24h * FEE_RATE;

    let mut snap = ProtocolSnapshot::new("deribit", "Deribit").with_source("deribit-api");
    snap.set_metric(metric::VOLUME_24H, volume_24h);
    snap.set_metric(metric::OPEN_INTEREST, open_interest);
    snap.set_metric(metric::FEES_24H, fees_24h);
    snap.set_metric(metric::REVENUE_24H, fees_24h * REVENUE_SHARE);
    Ok(snap)
}
