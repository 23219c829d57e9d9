use crate::result::ExecutionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl From<ConfigError> for ExecutionError {
    #[track_caller]
    fn from(err: ConfigError) -> Self {
        ExecutionError::fatal_tool(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
