//! Derivscope Collector — data sources and the daily update pipeline.
//!
//! Pulls current derivatives-market data from free public APIs
//! (Hyperliquid, dYdX, Deribit, CoinGecko, DefiLlama), reconciles it with
//! accumulated history through `derivscope-core`, and assembles the
//! dashboard document.

pub mod config;
pub mod dashboard;
pub mod latest;
pub mod run;
pub mod sources;
