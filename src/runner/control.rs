//! Capabilities the runner drives on a target machine
//!
//! Each trait is object safe and returns boxed futures so a runner can hold
//! `Arc<dyn ...>` handles and be moved into spawned per-machine tasks.

use crate::profile::EndpointImpairment;
use crate::result::ExecutionResult;
use crate::runner::types::{CommandOutput, Machine};
use futures::future::BoxFuture;
use std::time::Duration;

/// Runs a command line on a machine
pub trait CommandExecutor: Send + Sync {
    /// Non-zero exits come back as `CommandError`; exceeding `timeout` is a
    /// `CommandError` with [`crate::result::TIMEOUT_RETURNCODE`].
    fn execute<'a>(
        &'a self,
        machine: &'a Machine,
        argv: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, ExecutionResult<CommandOutput>>;
}

/// Applies and clears simulated network impairment on a machine
pub trait ImpairmentControl: Send + Sync {
    fn apply<'a>(
        &'a self,
        machine: &'a Machine,
        share: &'a EndpointImpairment,
    ) -> BoxFuture<'a, ExecutionResult<()>>;

    /// Return the machine to the unimpaired baseline
    fn reset<'a>(&'a self, machine: &'a Machine) -> BoxFuture<'a, ExecutionResult<()>>;
}

/// Controls the VPN daemon under test
pub trait VpnControl: Send + Sync {
    fn is_healthy<'a>(&'a self, machine: &'a Machine, vpn: &'a str) -> BoxFuture<'a, bool>;

    fn restart<'a>(&'a self, machine: &'a Machine, vpn: &'a str)
        -> BoxFuture<'a, ExecutionResult<()>>;

    /// Tail of the daemon's service log, if it can be fetched
    fn recent_logs<'a>(
        &'a self,
        machine: &'a Machine,
        vpn: &'a str,
        lines: usize,
    ) -> BoxFuture<'a, Option<String>>;
}
