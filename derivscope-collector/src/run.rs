//! The daily update pipeline.
//!
//! One run, per segment (perps, options): load persisted state, fetch
//! fresh data from every source, reconcile each tracked protocol through
//! the merge engine, record today's volume, persist, and build the
//! dashboard report. Sources fail independently; only local persistence
//! problems abort the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use derivscope_core::history::{reconcile_snapshot, HistoryStore};
use derivscope_core::net::FetchClient;
use derivscope_core::snapshot::{metric, HistoryField, ProtocolSnapshot};

use crate::config::{CollectorConfig, ProtocolEntry};
use crate::dashboard::{build_segment, DashboardData, SegmentReport};
use crate::latest;
use crate::sources::{coingecko, defillama, deribit, dydx, hyperliquid, SourceContext};

/// File layout under the data directory. Each segment keeps its own
/// history store because slugs can repeat across segments (Aevo runs
/// both perps and options).
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn perps_history(&self) -> PathBuf {
        self.root.join("perps_history.json")
    }

    pub fn options_history(&self) -> PathBuf {
        self.root.join("options_history.json")
    }

    pub fn perps_latest(&self) -> PathBuf {
        self.root.join(latest::PERPS_FILE)
    }

    pub fn options_latest(&self) -> PathBuf {
        self.root.join(latest::OPTIONS_FILE)
    }
}

enum Segment {
    Perps,
    Options,
}

/// Run the full update: fetch, reconcile, persist, assemble.
pub fn run_update(config: &CollectorConfig, client: &FetchClient) -> anyhow::Result<DashboardData> {
    let ctx = SourceContext::new(client, config.retry_policy(), config.request_timeout());
    let today = Utc::now().date_naive();

    eprintln!("=== Fetching perps data ===");
    let fresh_perps = fetch_perps(&ctx, &config.perps);
    eprintln!("=== Fetching options data ===");
    let fresh_options = fetch_options(&ctx, &config.options);

    let perps = update_segment(config, Segment::Perps, fresh_perps, today)?;
    let options = update_segment(config, Segment::Options, fresh_options, today)?;

    Ok(DashboardData {
        last_updated: Utc::now().to_rfc3339(),
        perps,
        options,
    })
}

/// Rebuild the dashboard document from persisted state only. No network;
/// fresh tiers are absent, so every protocol reconciles from the store
/// and the previous snapshots.
pub fn rebuild_dashboard(config: &CollectorConfig) -> anyhow::Result<DashboardData> {
    let paths = DataPaths::new(&config.data_dir);

    let mut perps_store = HistoryStore::load(&paths.perps_history());
    let perps_merged = reconcile_segment(
        &mut perps_store,
        &config.perps,
        &BTreeMap::new(),
        &latest::load(&paths.perps_latest()),
        None,
    );

    let mut options_store = HistoryStore::load(&paths.options_history());
    let options_merged = reconcile_segment(
        &mut options_store,
        &config.options,
        &BTreeMap::new(),
        &latest::load(&paths.options_latest()),
        None,
    );

    Ok(DashboardData {
        last_updated: Utc::now().to_rfc3339(),
        perps: build_segment(&perps_merged, config.top_n, true),
        options: build_segment(&options_merged, config.top_n, false),
    })
}

fn update_segment(
    config: &CollectorConfig,
    segment: Segment,
    fresh: BTreeMap<String, ProtocolSnapshot>,
    today: NaiveDate,
) -> anyhow::Result<SegmentReport> {
    let paths = DataPaths::new(&config.data_dir);
    let (tracked, history_path, latest_path, include_tvl) = match segment {
        Segment::Perps => (&config.perps, paths.perps_history(), paths.perps_latest(), true),
        Segment::Options => (
            &config.options,
            paths.options_history(),
            paths.options_latest(),
            false,
        ),
    };

    let mut store = HistoryStore::load(&history_path);
    let previous = latest::load(&latest_path);

    let merged = reconcile_segment(&mut store, tracked, &fresh, &previous, Some(today));

    latest::save(&latest_path, &merged)
        .with_context(|| format!("persisting {}", latest_path.display()))?;
    store
        .save(&history_path)
        .with_context(|| format!("persisting {}", history_path.display()))?;

    Ok(build_segment(&merged, config.top_n, include_tvl))
}

/// Reconcile every tracked protocol for one segment.
///
/// With `record` set, today's merged volume flows into the store's daily
/// series, and the accumulated daily series is overlaid onto the volume
/// fragment so the chart always reflects this process's own observations
/// for the days it was running.
fn reconcile_segment(
    store: &mut HistoryStore,
    tracked: &[ProtocolEntry],
    fresh: &BTreeMap<String, ProtocolSnapshot>,
    previous: &BTreeMap<String, ProtocolSnapshot>,
    record: Option<NaiveDate>,
) -> BTreeMap<String, ProtocolSnapshot> {
    let mut merged = BTreeMap::new();
    for entry in tracked {
        let mut snap = reconcile_snapshot(
            store,
            &entry.slug,
            fresh.get(&entry.slug),
            previous.get(&entry.slug),
        );
        // The configured display name is canonical.
        snap.display_name = entry.name.clone();

        if let Some(today) = record {
            store.record_daily_snapshot(
                &entry.slug,
                today,
                snap.metric(metric::VOLUME_24H).unwrap_or(0.0),
            );
        }
        if let Some(daily) = store.daily_snapshots.get(&entry.slug) {
            if !daily.is_empty() {
                snap.history
                    .entry(HistoryField::Volume)
                    .or_default()
                    .extend(daily.iter().map(|(d, v)| (*d, *v)));
            }
        }

        merged.insert(entry.slug.clone(), snap);
    }
    merged
}

/// Fetch fresh perps snapshots: direct APIs first, CoinGecko fill-in for
/// the rest, DefiLlama for histories and TVL.
fn fetch_perps(
    ctx: &SourceContext,
    tracked: &[ProtocolEntry],
) -> BTreeMap<String, ProtocolSnapshot> {
    let mut fresh: BTreeMap<String, ProtocolSnapshot> = BTreeMap::new();
    let is_tracked = |slug: &str| tracked.iter().any(|e| e.slug == slug);

    if is_tracked("hyperliquid") {
        match hyperliquid::fetch(ctx) {
            Ok(snap) => {
                fresh.insert(snap.slug.clone(), snap);
            }
            Err(e) => eprintln!("  Hyperliquid unavailable: {e}"),
        }
    }
    if is_tracked("dydx") {
        match dydx::fetch(ctx) {
            Ok(snap) => {
                fresh.insert(snap.slug.clone(), snap);
            }
            Err(e) => eprintln!("  dYdX unavailable: {e}"),
        }
    }

    let display_names: BTreeMap<String, String> = tracked
        .iter()
        .map(|e| (e.slug.clone(), e.name.clone()))
        .collect();
    match coingecko::fetch(ctx, &display_names) {
        Ok(exchanges) => {
            for (slug, snap) in exchanges {
                // Direct API data wins; CoinGecko only fills gaps.
                if is_tracked(&slug) && !fresh.contains_key(&slug) {
                    fresh.insert(slug, snap);
                }
            }
        }
        Err(e) => eprintln!("  CoinGecko unavailable: {e}"),
    }

    for entry in tracked {
        let snap = fresh
            .entry(entry.slug.clone())
            .or_insert_with(|| ProtocolSnapshot::new(&entry.slug, &entry.name));

        match defillama::fetch_perps_volume(ctx, &entry.slug) {
            Ok(vol) => {
                for (date, value) in &vol.history {
                    snap.record_history(HistoryField::Volume, *date, *value);
                }
                if snap.metric(metric::VOLUME_24H).unwrap_or(0.0) == 0.0 && vol.total24h > 0.0 {
                    snap.set_metric(metric::VOLUME_24H, vol.total24h);
                }
            }
            Err(e) => eprintln!("  {} volume history unavailable: {e}", entry.slug),
        }

        match defillama::fetch_fees(ctx, &entry.slug) {
            Ok(fees) => {
                for (date, value) in &fees.fees {
                    snap.record_history(HistoryField::Fees, *date, *value);
                }
                for (date, value) in &fees.revenue {
                    snap.record_history(HistoryField::Revenue, *date, *value);
                }
                if snap.metric(metric::FEES_24H).unwrap_or(0.0) == 0.0 && fees.fees24h > 0.0 {
                    snap.set_metric(metric::FEES_24H, fees.fees24h);
                }
                if snap.metric(metric::REVENUE_24H).unwrap_or(0.0) == 0.0 && fees.revenue24h > 0.0
                {
                    snap.set_metric(metric::REVENUE_24H, fees.revenue24h);
                }
            }
            Err(e) => eprintln!("  {} fees history unavailable: {e}", entry.slug),
        }

        match defillama::fetch_tvl(ctx, &entry.slug) {
            Ok(tvl) => {
                for (date, value) in &tvl.history {
                    snap.record_history(HistoryField::Tvl, *date, *value);
                }
                snap.set_metric(metric::CURRENT_TVL, tvl.current);
            }
            Err(e) => eprintln!("  {} TVL unavailable: {e}", entry.slug),
        }
    }

    fresh
}

/// Fetch fresh options snapshots: Deribit direct, DefiLlama histories for
/// every tracked protocol.
fn fetch_options(
    ctx: &SourceContext,
    tracked: &[ProtocolEntry],
) -> BTreeMap<String, ProtocolSnapshot> {
    let mut fresh: BTreeMap<String, ProtocolSnapshot> = BTreeMap::new();

    if tracked.iter().any(|e| e.slug == "deribit") {
        match deribit::fetch(ctx) {
            Ok(snap) => {
                fresh.insert(snap.slug.clone(), snap);
            }
            Err(e) => eprintln!("  Deribit unavailable: {e}"),
        }
    }

    for entry in tracked {
        let snap = fresh
            .entry(entry.slug.clone())
            .or_insert_with(|| ProtocolSnapshot::new(&entry.slug, &entry.name));

        match defillama::fetch_options_volume(ctx, &entry.slug) {
            Ok(vol) => {
                for (date, value) in &vol.history {
                    snap.record_history(HistoryField::Volume, *date, *value);
                }
                if snap.metric(metric::VOLUME_24H).unwrap_or(0.0) == 0.0 && vol.total24h > 0.0 {
                    snap.set_metric(metric::VOLUME_24H, vol.total24h);
                }
            }
            Err(e) => eprintln!("  {} options volume unavailable: {e}", entry.slug),
        }

        match defillama::fetch_fees(ctx, &entry.slug) {
            Ok(fees) => {
                for (date, value) in &fees.fees {
                    snap.record_history(HistoryField::Fees, *date, *value);
                }
                for (date, value) in &fees.revenue {
                    snap.record_history(HistoryField::Revenue, *date, *value);
                }
                if snap.metric(metric::FEES_24H).unwrap_or(0.0) == 0.0 && fees.fees24h > 0.0 {
                    snap.set_metric(metric::FEES_24H, fees.fees24h);
                }
                if snap.metric(metric::REVENUE_24H).unwrap_or(0.0) == 0.0 && fees.revenue24h > 0.0
                {
                    snap.set_metric(metric::REVENUE_24H, fees.revenue24h);
                }
            }
            Err(e) => eprintln!("  {} fees history unavailable: {e}", entry.slug),
        }
    }

    fresh
}
