use crate::result::ExecutionError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunnerError {
    #[error("Invalid retry transition: {0}")]
    InvalidTransition(String),

    #[error("Run cancelled before {0}")]
    Cancelled(&'static str),

    #[error("{0} did not finish within {1}s")]
    ControlTimeout(&'static str, u64),
}

impl From<RunnerError> for ExecutionError {
    #[track_caller]
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::ControlTimeout(..) => ExecutionError::tool(err.to_string()),
            RunnerError::Cancelled(_) => ExecutionError::cancelled(err.to_string()),
            RunnerError::InvalidTransition(_) => ExecutionError::fatal_tool(err.to_string()),
        }
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;
