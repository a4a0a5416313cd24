//! Derivscope Core — resilient fetch and historical-merge engine.
//!
//! This crate contains the heart of the market-data collector:
//! - Process-wide request throttle with a single critical section
//! - Retrying, backoff-aware, fallback-capable HTTP fetch client
//! - Protocol snapshot model (per-entity metrics + date-keyed histories)
//! - Durable history store with three-tier fragment merging
//! - Top-N-plus-Others timeseries aggregation and market-share math
//!
//! Per-source response parsing lives in `derivscope-collector`; this crate
//! only knows about normalized snapshots and date→value fragments.

pub mod history;
pub mod net;
pub mod snapshot;
pub mod timeseries;
