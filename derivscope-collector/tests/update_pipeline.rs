//! End-to-end pipeline tests over a canned transport.
//!
//! A routing transport answers each request by URL/query substring, so a
//! whole update run exercises the real fetch, merge, persistence, and
//! dashboard layers without the network.

use chrono::Utc;
use derivscope_collector::config::CollectorConfig;
use derivscope_collector::run::{run_update, DataPaths};
use derivscope_core::net::{Endpoint, FetchClient, RawResponse, Transport, TransportError};
use serde_json::json;

const JAN1: i64 = 1704067200; // 2024-01-01T00:00:00Z

// ── Routing transport ──────────────────────────────────────────────────

/// Answers with the first route whose needle appears in the request's
/// URL plus query string. Anything unmatched gets a 404.
struct RoutingTransport {
    routes: Vec<(String, serde_json::Value)>,
}

impl RoutingTransport {
    fn new(routes: Vec<(&str, serde_json::Value)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(needle, body)| (needle.to_string(), body))
                .collect(),
        }
    }

    fn respond(&self, endpoint: &Endpoint) -> Result<RawResponse, TransportError> {
        let mut key = endpoint.url().to_string();
        for (k, v) in endpoint.params() {
            key.push_str(&format!("&{k}={v}"));
        }
        for (needle, body) in &self.routes {
            if key.contains(needle.as_str()) {
                return Ok(RawResponse {
                    status: 200,
                    retry_after: None,
                    body: body.to_string(),
                });
            }
        }
        Ok(RawResponse {
            status: 404,
            retry_after: None,
            body: String::new(),
        })
    }
}

impl Transport for RoutingTransport {
    fn get(&self, endpoint: &Endpoint) -> Result<RawResponse, TransportError> {
        self.respond(endpoint)
    }

    fn post(
        &self,
        endpoint: &Endpoint,
        _body: &serde_json::Value,
    ) -> Result<RawResponse, TransportError> {
        self.respond(endpoint)
    }
}

// ── Fixtures ───────────────────────────────────────────────────────────

fn test_config(data_dir: &std::path::Path) -> CollectorConfig {
    let mut config = CollectorConfig::from_toml(
        r#"
        [http]
        max_attempts = 1
        base_delay_secs = 0.0
        request_interval_secs = 0.0

        [[perps]]
        slug = "hyperliquid"
        name = "Hyperliquid"

        [[options]]
        slug = "deribit"
        name = "Deribit"
        "#,
    )
    .unwrap();
    config.data_dir = data_dir.to_path_buf();
    config
}

fn full_routes() -> Vec<(&'static str, serde_json::Value)> {
    vec![
        // Hyperliquid universe: 1M volume, 10 BTC open interest at 60k.
        (
            "api.hyperliquid.xyz/info",
            json!([
                {"universe": [{"name": "BTC"}]},
                [{"dayNtlVlm": "1000000.0", "openInterest": "10.0", "oraclePx": "60000.0"}]
            ]),
        ),
        (
            "summary/derivatives/hyperliquid",
            json!({"totalDataChart": [[JAN1, 900000.0]], "total24h": 950000.0}),
        ),
        (
            "summary/fees/hyperliquid",
            json!({"totalDataChart": [[JAN1, 320.0]]}),
        ),
        (
            "protocol/hyperliquid",
            json!({
                "tvl": [{"date": JAN1, "totalLiquidityUSD": 2.0e9}],
                "currentChainTvls": {"total": 2.5e9}
            }),
        ),
        (
            "index_name=btc_usd",
            json!({"result": {"index_price": 60000.0}}),
        ),
        (
            "index_name=eth_usd",
            json!({"result": {"index_price": 3000.0}}),
        ),
        (
            "currency=BTC",
            json!({"result": [{"volume": 1.0, "open_interest": 2.0}]}),
        ),
        (
            "currency=ETH",
            json!({"result": [{"volume": 10.0, "open_interest": 20.0}]}),
        ),
        (
            "summary/options/deribit",
            json!({"totalDataChart": [[JAN1, 80000.0]], "total24h": 80000.0}),
        ),
        (
            "summary/fees/deribit",
            json!({"totalDataChart": [[JAN1, 30.0]]}),
        ),
    ]
}

fn client_for(config: &CollectorConfig, routes: Vec<(&str, serde_json::Value)>) -> FetchClient {
    FetchClient::new(Box::new(RoutingTransport::new(routes)), config.throttle())
}

// ── Tests ──────────────────────────────────────────────────────────────

#[test]
fn full_run_produces_dashboard_and_persists_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = client_for(&config, full_routes());

    let dashboard = run_update(&config, &client).unwrap();
    let today = Utc::now().date_naive();

    // Perps: Hyperliquid's direct API wins the headline metrics.
    assert_eq!(dashboard.perps.metrics.volume24h, 1_000_000.0);
    assert_eq!(dashboard.perps.metrics.fees24h, 350.0);
    assert_eq!(dashboard.perps.metrics.revenue24h, 175.0);
    assert_eq!(dashboard.perps.metrics.tvl, 2.5e9);
    assert_eq!(
        dashboard.perps.protocols["hyperliquid"].open_interest,
        600_000.0
    );

    // The volume chart carries the DefiLlama history plus today's own
    // observation overlaid on top.
    let volume = &dashboard.perps.volume_timeseries;
    let jan1 = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let jan1_pos = volume.dates.iter().position(|d| *d == jan1).unwrap();
    let today_pos = volume.dates.iter().position(|d| *d == today).unwrap();
    assert_eq!(volume.series["Hyperliquid"][jan1_pos], 900_000.0);
    assert_eq!(volume.series["Hyperliquid"][today_pos], 1_000_000.0);
    assert!(!volume.series.contains_key("Others"));

    // Options: BTC and ETH books converted at their index prices.
    assert_eq!(dashboard.options.metrics.volume24h, 90_000.0);
    assert_eq!(dashboard.options.protocols["deribit"].open_interest, 180_000.0);
    assert!(dashboard.options.tvl_timeseries.is_none());
    assert_eq!(dashboard.options.market_share[0].name, "Deribit");
    assert_eq!(dashboard.options.market_share[0].pct, 100.0);

    // Everything was persisted.
    let paths = DataPaths::new(&config.data_dir);
    assert!(paths.perps_history().exists());
    assert!(paths.options_history().exists());
    assert!(paths.perps_latest().exists());
    assert!(paths.options_latest().exists());
}

#[test]
fn total_upstream_outage_falls_back_to_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let first = run_update(&config, &client_for(&config, full_routes())).unwrap();
    assert_eq!(first.perps.metrics.volume24h, 1_000_000.0);

    // Second run: every endpoint 404s.
    let second = run_update(&config, &client_for(&config, Vec::new())).unwrap();

    // Headline metrics survive through the previous-snapshot tier.
    assert_eq!(second.perps.metrics.volume24h, 1_000_000.0);
    assert_eq!(second.perps.metrics.tvl, 2.5e9);
    assert_eq!(second.options.metrics.volume24h, 90_000.0);

    // History survives through the store tier.
    let volume = &second.perps.volume_timeseries;
    let jan1 = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let jan1_pos = volume.dates.iter().position(|d| *d == jan1).unwrap();
    assert_eq!(volume.series["Hyperliquid"][jan1_pos], 900_000.0);
}

#[test]
fn partial_outage_keeps_the_healthy_sources() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    // Hyperliquid's own API is down; DefiLlama still answers.
    let routes: Vec<(&str, serde_json::Value)> = full_routes()
        .into_iter()
        .filter(|(needle, _)| *needle != "api.hyperliquid.xyz/info")
        .collect();
    let dashboard = run_update(&config, &client_for(&config, routes)).unwrap();

    // The DefiLlama 24h number stands in for the missing direct metric.
    assert_eq!(dashboard.perps.metrics.volume24h, 950_000.0);
    // No open interest from anywhere this run.
    assert_eq!(dashboard.perps.protocols["hyperliquid"].open_interest, 0.0);
    // Options were unaffected.
    assert_eq!(dashboard.options.metrics.volume24h, 90_000.0);
}

#[test]
fn rebuild_without_network_matches_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    run_update(&config, &client_for(&config, full_routes())).unwrap();
    let rebuilt = derivscope_collector::run::rebuild_dashboard(&config).unwrap();

    assert_eq!(rebuilt.perps.metrics.volume24h, 1_000_000.0);
    assert_eq!(rebuilt.options.metrics.volume24h, 90_000.0);
    let jan1 = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    assert!(rebuilt.perps.volume_timeseries.dates.contains(&jan1));
}
