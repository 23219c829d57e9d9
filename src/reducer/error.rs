use crate::result::ExecutionError;
use crate::testspec::MetricField;
use thiserror::Error;

/// Reducer preconditions violated by the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReduceError {
    #[error("Cannot summarize an empty sample set")]
    EmptySamples,

    #[error("Sample {index} is not a finite number")]
    NonFiniteSample { index: usize },

    #[error("Percentile {0} is outside [0, 100]")]
    PercentileOutOfRange(f64),

    #[error("Run produced no metric fields")]
    NoFields,

    #[error("Field {field}: {source}")]
    Field {
        field: MetricField,
        source: Box<ReduceError>,
    },
}

impl From<ReduceError> for ExecutionError {
    fn from(err: ReduceError) -> Self {
        ExecutionError::invalid_input(err.to_string())
    }
}

pub type ReduceResult<T> = Result<T, ReduceError>;
