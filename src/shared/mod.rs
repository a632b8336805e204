/// Shared utilities used across all layers
///
/// This module contains:
/// - Sample statistics (StatAccumulator)
/// - Clock helpers (timestamp)
/// - Process-wide Prometheus metrics

pub mod metrics;
pub mod stats;
pub mod timestamp;

pub use stats::{StatAccumulator, StatsError};
pub use timestamp::{unix_millis, WINDOW};
