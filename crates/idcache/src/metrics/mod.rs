//! Metrics for the identity cache.

pub mod cache;
pub mod setup;

pub use cache::{CacheMetrics, MetricsSubscriber, register_cache_metrics};
pub use setup::init_metrics;
