//! Collector run configuration.
//!
//! Loaded from a TOML file; every field has a default, so an empty file
//! (or no file at all) yields the standard tracked-protocol universe and
//! the conservative free-tier HTTP settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use derivscope_core::net::{RetryPolicy, Throttle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One tracked protocol: its internal slug and the display name charts use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEntry {
    pub slug: String,
    pub name: String,
}

impl ProtocolEntry {
    fn new(slug: &str, name: &str) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
        }
    }
}

/// HTTP behavior shared by every source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Attempt budget per request.
    pub max_attempts: u32,
    /// First backoff delay; doubles per attempt.
    pub base_delay_secs: f64,
    /// Minimum spacing between any two outbound requests.
    pub request_interval_secs: f64,
    /// Per-request timeout.
    pub request_timeout_secs: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_secs: 2.0,
            request_interval_secs: 0.5,
            request_timeout_secs: 30.0,
        }
    }
}

/// Full collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Where history stores and latest-snapshot files live.
    pub data_dir: PathBuf,
    /// Where the assembled dashboard document is written.
    pub output_path: PathBuf,
    /// How many named series before the rest pools into "Others".
    pub top_n: usize,
    pub http: HttpConfig,
    pub perps: Vec<ProtocolEntry>,
    pub options: Vec<ProtocolEntry>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_path: PathBuf::from("dashboard/dashboard.json"),
            top_n: 6,
            http: HttpConfig::default(),
            perps: default_perps(),
            options: default_options(),
        }
    }
}

fn default_perps() -> Vec<ProtocolEntry> {
    vec![
        ProtocolEntry::new("hyperliquid", "Hyperliquid"),
        ProtocolEntry::new("lighter-v2", "Lighter"),
        ProtocolEntry::new("dydx", "dYdX"),
        ProtocolEntry::new("gmx-v2", "GMX"),
        ProtocolEntry::new("vertex-protocol", "Vertex"),
        ProtocolEntry::new("jupiter-perpetual", "Jupiter Perps"),
        ProtocolEntry::new("drift-protocol", "Drift"),
        ProtocolEntry::new("kwenta", "Kwenta"),
        ProtocolEntry::new("apex-protocol", "ApeX"),
        ProtocolEntry::new("gains-network", "Gains Network"),
        ProtocolEntry::new("synthetix", "Synthetix"),
        ProtocolEntry::new("aevo", "Aevo"),
        ProtocolEntry::new("bluefin", "Bluefin"),
        ProtocolEntry::new("rabbitx", "RabbitX"),
    ]
}

fn default_options() -> Vec<ProtocolEntry> {
    vec![
        ProtocolEntry::new("deribit", "Deribit"),
        ProtocolEntry::new("lyra", "Lyra"),
        ProtocolEntry::new("hegic", "Hegic"),
        ProtocolEntry::new("premia", "Premia"),
        ProtocolEntry::new("aevo", "Aevo"),
        ProtocolEntry::new("thetanuts-finance", "Thetanuts"),
        ProtocolEntry::new("opyn", "Opyn"),
        ProtocolEntry::new("derive", "Derive"),
        ProtocolEntry::new("moby", "Moby"),
        ProtocolEntry::new("ithaca-protocol", "Ithaca"),
        ProtocolEntry::new("stryke", "Stryke"),
        ProtocolEntry::new("typus-finance", "Typus"),
        ProtocolEntry::new("zeta-markets", "Zeta Markets"),
    ]
}

impl CollectorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.http.max_attempts,
            base_delay: Duration::from_secs_f64(self.http.base_delay_secs),
        }
    }

    pub fn throttle(&self) -> Arc<Throttle> {
        Arc::new(Throttle::new(Duration::from_secs_f64(
            self.http.request_interval_secs,
        )))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.http.request_timeout_secs)
    }
}
