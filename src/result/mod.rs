//! Result model shared by the runner, the aggregator and the repository

mod error;
mod types;

pub use error::{ErrorKind, ExecutionError, ExecutionResult, TIMEOUT_RETURNCODE};
pub use types::{MixedReport, RunResult, TestMetadata};
