mod aggregator;
mod types;

pub use aggregator::{aggregate, aggregate_all};
pub use types::{ComparisonEntry, ComparisonMatrix, ComparisonSnapshot};
