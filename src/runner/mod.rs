//! Single-benchmark execution on a remote machine
//!
//! The runner applies an impairment profile, runs one benchmark command
//! through the VPN under test, and retries or restarts the VPN within the
//! configured budgets. Machine access goes through the traits in [`control`]
//! so tests can drive the runner against a scripted fleet.

mod adapters;
pub mod control;
mod error;
mod runner;
mod ssh;
mod state_machine;
mod types;

pub use adapters::{netem_args, SystemdVpn, TcNetem};
pub use control::{CommandExecutor, ImpairmentControl, VpnControl};
pub use error::{RunnerError, RunnerResult};
pub use runner::{MachineLocks, TestRunner, SERVICE_LOG_LINES};
pub use ssh::SshExecutor;
pub use state_machine::{RetryEvent, RetryState, RetryStateMachine, SUSPECT_FAILURE_STREAK};
pub use types::{CancellationFlag, CommandOutput, Machine, RunBudget};
