//! Reduction of raw benchmark samples to summary statistics

mod error;
mod stats;

pub use error::{ReduceError, ReduceResult};
pub use stats::{
    percentiles, reduce, reduce_samples, reduce_with, BenchSummary, MetricStats,
    PercentileValue, Quartiles, CHART_PERCENTILES,
};
