//! Derivscope CLI — collection and dashboard commands.
//!
//! Commands:
//! - `update` — fetch fresh data from every source, reconcile, and write the dashboard
//! - `aggregate` — rebuild the dashboard from persisted state, no network
//! - `status` — report what the history stores currently hold

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use derivscope_collector::config::CollectorConfig;
use derivscope_collector::run::{rebuild_dashboard, run_update, DataPaths};
use derivscope_core::history::HistoryStore;
use derivscope_core::net::FetchClient;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "derivscope",
    about = "Derivscope — derivatives market data collector"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch fresh data, reconcile with history, and write the dashboard.
    Update {
        /// Path to a TOML config file. Defaults apply without one.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Override the configured dashboard output path.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rebuild the dashboard from persisted state without touching the network.
    Aggregate {
        /// Path to a TOML config file. Defaults apply without one.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Override the configured dashboard output path.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Report what the history stores currently hold.
    Status {
        /// Path to a TOML config file. Defaults apply without one.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Update {
            config,
            data_dir,
            out,
        } => run_update_cmd(config, data_dir, out),
        Commands::Aggregate {
            config,
            data_dir,
            out,
        } => run_aggregate_cmd(config, data_dir, out),
        Commands::Status { config, data_dir } => run_status_cmd(config, data_dir),
    }
}

fn load_config(
    path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<CollectorConfig> {
    let mut config = match path {
        Some(path) => CollectorConfig::from_file(&path)?,
        None => CollectorConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if let Some(out) = out {
        config.output_path = out;
    }
    Ok(config)
}

fn run_update_cmd(
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, data_dir, out)?;
    let client = FetchClient::http(config.throttle());

    let dashboard = run_update(&config, &client)?;
    dashboard.save(&config.output_path)?;

    print_summary(&dashboard);
    println!("Dashboard written to: {}", config.output_path.display());
    Ok(())
}

fn run_aggregate_cmd(
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, data_dir, out)?;

    let dashboard = rebuild_dashboard(&config)?;
    dashboard.save(&config.output_path)?;

    print_summary(&dashboard);
    println!("Dashboard written to: {}", config.output_path.display());
    Ok(())
}

fn run_status_cmd(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, data_dir, None)?;
    let paths = DataPaths::new(&config.data_dir);

    println!("Data directory: {}", config.data_dir.display());
    print_store_status("Perps", &paths.perps_history());
    print_store_status("Options", &paths.options_history());
    Ok(())
}

fn print_store_status(label: &str, path: &Path) {
    println!();
    println!("=== {label} history ({}) ===", path.display());
    if !path.exists() {
        println!("(no store yet)");
        return;
    }

    let store = HistoryStore::load(path);
    if store.daily_snapshots.is_empty() && store.fragments.is_empty() {
        println!("(empty)");
        return;
    }

    println!(
        "{:<20} {:<25} {:>6} {:>10}",
        "Protocol", "Daily Range", "Days", "Fragments"
    );
    println!("{}", "-".repeat(64));

    let mut slugs: Vec<&String> = store
        .daily_snapshots
        .keys()
        .chain(store.fragments.keys())
        .collect();
    slugs.sort();
    slugs.dedup();

    for slug in slugs {
        let (range, days) = match store.daily_snapshots.get(slug) {
            Some(series) if !series.is_empty() => {
                (daily_range(series), series.len())
            }
            _ => ("-".to_string(), 0),
        };
        let fragment_points: usize = store
            .fragments_for(slug)
            .map(|set| set.values().map(|s| s.len()).sum())
            .unwrap_or(0);
        println!("{slug:<20} {range:<25} {days:>6} {fragment_points:>10}");
    }
}

fn daily_range(series: &std::collections::BTreeMap<NaiveDate, f64>) -> String {
    match (series.keys().next(), series.keys().next_back()) {
        (Some(first), Some(last)) => format!("{first} to {last}"),
        _ => "-".to_string(),
    }
}

fn print_summary(dashboard: &derivscope_collector::dashboard::DashboardData) {
    println!();
    println!("=== Dashboard ===");
    println!("Updated:        {}", dashboard.last_updated);
    println!();
    println!("--- Perps ---");
    println!(
        "24h Volume:     ${:.0}",
        dashboard.perps.metrics.volume24h
    );
    println!("24h Fees:       ${:.0}", dashboard.perps.metrics.fees24h);
    println!(
        "24h Revenue:    ${:.0}",
        dashboard.perps.metrics.revenue24h
    );
    println!("TVL:            ${:.0}", dashboard.perps.metrics.tvl);
    println!("Protocols:      {}", dashboard.perps.protocols.len());
    println!();
    println!("--- Options ---");
    println!(
        "24h Volume:     ${:.0}",
        dashboard.options.metrics.volume24h
    );
    println!("24h Fees:       ${:.0}", dashboard.options.metrics.fees24h);
    println!(
        "24h Revenue:    ${:.0}",
        dashboard.options.metrics.revenue24h
    );
    println!("Protocols:      {}", dashboard.options.protocols.len());
    println!();
}
