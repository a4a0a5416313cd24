//! Per-source fetch and normalization.
//!
//! Each source module knows one upstream API: its endpoints, its response
//! shapes, and how to normalize them into `ProtocolSnapshot` values. All
//! network access goes through the shared `FetchClient`; a source failure
//! is reported by the caller and the run continues without that source.

pub mod coingecko;
pub mod defillama;
pub mod deribit;
pub mod dydx;
pub mod hyperliquid;

use std::time::Duration;

use derivscope_core::net::{Endpoint, FetchClient, RetryPolicy};

/// Shared per-run fetch context handed to every source.
pub struct SourceContext<'a> {
    pub client: &'a FetchClient,
    pub policy: RetryPolicy,
    pub timeout: Duration,
}

impl<'a> SourceContext<'a> {
    pub fn new(client: &'a FetchClient, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            policy,
            timeout,
        }
    }

    /// Endpoint builder carrying the configured request timeout.
    pub fn endpoint(&self, url: impl Into<String>) -> Endpoint {
        Endpoint::new(url).timeout(self.timeout)
    }
}

/// Lenient numeric parse for APIs that quote their numbers (Hyperliquid,
/// dYdX) or format them with thousands separators (CoinGecko).
pub(crate) fn lenient_f64(raw: &str) -> f64 {
    raw.replace(',', "").parse().unwrap_or(0.0)
}
