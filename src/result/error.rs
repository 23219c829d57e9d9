use serde::{Deserialize, Serialize};
use std::panic::Location;
use std::time::Duration;
use thiserror::Error;

/// Return code reported for commands killed by the runner's timeout
pub const TIMEOUT_RETURNCODE: i32 = 124;

/// Why a test execution failed
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionError {
    /// An external process exited non-zero or timed out
    #[error("Command {command_list:?} failed with return code {returncode}")]
    CommandError {
        returncode: i32,
        cwd: String,
        command_list: Vec<String>,
        stdout: String,
        stderr: String,
    },

    /// The harness or a control plane it drives failed
    #[error("{message} (at {location})")]
    ToolError {
        message: String,
        location: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        /// Fatal tool errors abort the cell without consuming retry budget
        #[serde(default)]
        fatal: bool,
        /// The run was stopped by its operator rather than by a failure
        #[serde(default, skip_serializing_if = "is_false")]
        cancelled: bool,
    },

    /// A caller broke a precondition; never retried
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
}

/// Discriminant of [`ExecutionError`] for programmatic inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Command,
    Tool,
    InvalidInput,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn caller_location(location: &Location<'_>) -> String {
    format!("{}:{}", location.file(), location.line())
}

impl ExecutionError {
    pub fn command(
        returncode: i32,
        cwd: impl Into<String>,
        command_list: Vec<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        ExecutionError::CommandError {
            returncode,
            cwd: cwd.into(),
            command_list,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Command killed after exceeding its time budget
    pub fn timeout(cwd: impl Into<String>, command_list: Vec<String>, after: Duration) -> Self {
        ExecutionError::CommandError {
            returncode: TIMEOUT_RETURNCODE,
            cwd: cwd.into(),
            command_list,
            stdout: String::new(),
            stderr: format!("timed out after {:.1}s", after.as_secs_f64()),
        }
    }

    /// Recoverable tool error located at the caller
    #[track_caller]
    pub fn tool(message: impl Into<String>) -> Self {
        ExecutionError::ToolError {
            message: message.into(),
            location: caller_location(Location::caller()),
            description: None,
            fatal: false,
            cancelled: false,
        }
    }

    /// Tool error that must abort the current cell immediately
    #[track_caller]
    pub fn fatal_tool(message: impl Into<String>) -> Self {
        ExecutionError::ToolError {
            message: message.into(),
            location: caller_location(Location::caller()),
            description: None,
            fatal: true,
            cancelled: false,
        }
    }

    /// Run abandoned because its sweep was cancelled; never retried
    #[track_caller]
    pub fn cancelled(message: impl Into<String>) -> Self {
        ExecutionError::ToolError {
            message: message.into(),
            location: caller_location(Location::caller()),
            description: None,
            fatal: true,
            cancelled: true,
        }
    }

    #[track_caller]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ExecutionError::InvalidInput {
            message: message.into(),
            location: Some(caller_location(Location::caller())),
        }
    }

    /// Attach an extended description to a tool error; other variants are unchanged
    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        if let ExecutionError::ToolError { description, .. } = &mut self {
            *description = Some(text.into());
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::CommandError { .. } => ErrorKind::Command,
            ExecutionError::ToolError { .. } => ErrorKind::Tool,
            ExecutionError::InvalidInput { .. } => ErrorKind::InvalidInput,
        }
    }

    /// Whether the runner may spend retry budget on this error
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutionError::CommandError { .. } => true,
            ExecutionError::ToolError { fatal, .. } => !fatal,
            ExecutionError::InvalidInput { .. } => false,
        }
    }

    /// A benchmark process exiting non-zero (or timing out)
    pub fn is_nonzero_exit(&self) -> bool {
        matches!(self, ExecutionError::CommandError { returncode, .. } if *returncode != 0)
    }

    /// Whether the run was cut short by cancellation instead of failing
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::ToolError { cancelled: true, .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ExecutionError::CommandError { returncode, .. } if *returncode == TIMEOUT_RETURNCODE
        )
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_records_caller_location() {
        let err = ExecutionError::tool("vpn control plane rejected request");
        match &err {
            ExecutionError::ToolError { location, fatal, .. } => {
                assert!(location.contains("error.rs"));
                assert!(!fatal);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retry_classification() {
        let cmd = ExecutionError::command(1, "/root", vec!["iperf3".into()], "", "refused");
        assert!(cmd.is_retryable());
        assert!(cmd.is_nonzero_exit());

        assert!(!ExecutionError::fatal_tool("missing config").is_retryable());
        assert!(!ExecutionError::invalid_input("empty sample set").is_retryable());
    }

    #[test]
    fn test_timeout_is_command_error() {
        let err = ExecutionError::timeout("/root", vec!["ping".into()], Duration::from_secs(30));
        assert_eq!(err.kind(), ErrorKind::Command);
        assert!(err.is_timeout());
        assert!(err.is_nonzero_exit());
    }

    #[test]
    fn test_description_only_applies_to_tool_errors() {
        let tool = ExecutionError::tool("x").with_description("details");
        assert!(matches!(tool, ExecutionError::ToolError { description: Some(_), .. }));

        let input = ExecutionError::invalid_input("y").with_description("ignored");
        assert!(matches!(input, ExecutionError::InvalidInput { .. }));
    }

    #[test]
    fn test_cancelled_is_distinct_from_failures() {
        let err = ExecutionError::cancelled("Run cancelled before test");
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());
        assert!(!ExecutionError::fatal_tool("ssh key rejected").is_cancelled());

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["cancelled"], true);
        let back: ExecutionError = serde_json::from_value(json).unwrap();
        assert!(back.is_cancelled());

        let plain = serde_json::to_value(ExecutionError::tool("x")).unwrap();
        assert!(plain.get("cancelled").is_none());
    }

    #[test]
    fn test_tagged_json_shape() {
        let err = ExecutionError::command(2, "/tmp", vec!["curl".into()], "out", "err");
        let json: serde_json::Value = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "CommandError");
        assert_eq!(json["returncode"], 2);

        let back: ExecutionError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }
}
