mod orchestrator;
mod types;

pub use orchestrator::BenchmarkSweep;
pub use types::{SweepProgress, SweepReport};
