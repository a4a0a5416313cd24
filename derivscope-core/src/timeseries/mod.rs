//! Cross-protocol timeseries aggregation and market-share math.

pub mod aggregate;
pub mod share;

pub use aggregate::{aggregate, AggregatedTimeseries, EntitySeries, RankBy, OTHERS_LABEL};
pub use share::{market_share, ShareEntry};
