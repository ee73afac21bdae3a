//! Event ingestion and privacy-preserving aggregation

pub mod aggregator;
pub mod attribution;
pub mod noise;

pub use aggregator::{MetricsAggregator, TimeBucket, MAX_COHORTS_PER_QUERY, MAX_RANGE_DAYS};
pub use attribution::AttributionLedger;
