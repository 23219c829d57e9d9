use crate::result::ExecutionError;
use crate::testspec::types::{MetricField, TestKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Benchmark output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Benchmark reported an error: {0}")]
    Reported(String),

    #[error("Malformed benchmark output: {0}")]
    Malformed(String),

    #[error("{kind} produced no samples for {field}")]
    MissingSamples { kind: TestKind, field: MetricField },
}

/// Unparseable output is usually a transient benchmark hiccup, so it stays retryable
impl From<ParseError> for ExecutionError {
    fn from(err: ParseError) -> Self {
        ExecutionError::tool("benchmark output could not be parsed")
            .with_description(err.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
