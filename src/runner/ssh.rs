//! Remote execution over the system `ssh` client

use crate::result::{ExecutionError, ExecutionResult};
use crate::runner::control::CommandExecutor;
use crate::runner::types::{CommandOutput, Machine};
use crate::testspec::shell_quote;
use futures::future::BoxFuture;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SshExecutor {
    program: String,
    options: Vec<String>,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SshExecutor {
    pub fn new() -> Self {
        Self {
            program: "ssh".to_string(),
            options: vec![
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=accept-new".to_string(),
                "-o".to_string(),
                "ConnectTimeout=10".to_string(),
            ],
        }
    }

    /// Use a different client binary, e.g. a wrapper script
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push("-o".to_string());
        self.options.push(option.into());
        self
    }

    /// Full local command line that runs `argv` on `machine`
    pub fn command_line(&self, machine: &Machine, argv: &[String]) -> Vec<String> {
        let mut line = vec![self.program.clone()];
        line.extend(self.options.iter().cloned());
        if let Some(port) = machine.ssh_port {
            line.push("-p".to_string());
            line.push(port.to_string());
        }
        line.push(machine.ssh_destination());
        line.push("--".to_string());
        line.push(
            argv.iter()
                .map(|word| shell_quote(word))
                .collect::<Vec<_>>()
                .join(" "),
        );
        line
    }

    async fn run(
        &self,
        machine: &Machine,
        argv: &[String],
        timeout: Duration,
    ) -> ExecutionResult<CommandOutput> {
        let line = self.command_line(machine, argv);
        let cwd = format!("{}:~", machine.ssh_destination());
        debug!(machine = %machine.name, command = ?argv, "running remote command");

        let mut command = Command::new(&line[0]);
        command
            .args(&line[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the ssh client
        let output = match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => return Err(ExecutionError::timeout(cwd, line, timeout)),
            Ok(Err(e)) => {
                return Err(ExecutionError::tool(format!("failed to spawn {}: {e}", line[0])))
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            // Killed by a signal: report like a shell would
            let returncode = output.status.code().unwrap_or(-1);
            Err(ExecutionError::command(returncode, cwd, line, stdout, stderr))
        }
    }
}

impl CommandExecutor for SshExecutor {
    fn execute<'a>(
        &'a self,
        machine: &'a Machine,
        argv: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, ExecutionResult<CommandOutput>> {
        Box::pin(self.run(machine, argv, timeout))
    }
}
