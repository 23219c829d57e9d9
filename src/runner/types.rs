use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_interface() -> String {
    "eth0".to_string()
}

/// A reachable benchmark machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    /// SSH address of the machine
    pub host: String,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,
    /// Mesh address of the partner machine the benchmarks target
    #[serde(default)]
    pub peer_address: String,
    /// Partner address on each VPN's mesh, by VPN name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_addresses: BTreeMap<String, String>,
    /// Interface the impairment is applied to
    #[serde(default = "default_interface")]
    pub interface: String,
}

impl Machine {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        peer_address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            ssh_user: default_ssh_user(),
            ssh_port: None,
            peer_address: peer_address.into(),
            peer_addresses: BTreeMap::new(),
            interface: default_interface(),
        }
    }

    pub fn with_peer(mut self, vpn: impl Into<String>, address: impl Into<String>) -> Self {
        self.peer_addresses.insert(vpn.into(), address.into());
        self
    }

    /// Partner address on `vpn`'s mesh, if one is known
    pub fn peer_for(&self, vpn: &str) -> Option<&str> {
        self.peer_addresses
            .get(vpn)
            .map(String::as_str)
            .or_else(|| Some(self.peer_address.as_str()).filter(|a| !a.is_empty()))
    }

    /// This machine with `peer_address` pointing at the partner on `vpn`'s mesh
    pub fn for_vpn(&self, vpn: &str) -> Machine {
        let mut machine = self.clone();
        if let Some(address) = self.peer_addresses.get(vpn) {
            machine.peer_address = address.clone();
        }
        machine
    }

    pub fn ssh_destination(&self) -> String {
        format!("{}@{}", self.ssh_user, self.host)
    }
}

/// Attempt, restart and time budgets for one runner call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunBudget {
    /// Attempts per round; a VPN restart starts a new round
    pub max_test_attempts: u32,
    pub max_vpn_restarts: u32,
    /// Bound on the benchmark command itself
    pub timeout: Duration,
    /// Bound on waiting for a restarted VPN to report healthy
    pub restart_probe_timeout: Duration,
    /// Bound on impairment changes, status probes and log collection
    pub control_timeout: Duration,
}

impl Default for RunBudget {
    fn default() -> Self {
        Self {
            max_test_attempts: 3,
            max_vpn_restarts: 1,
            timeout: Duration::from_secs(120),
            restart_probe_timeout: Duration::from_secs(60),
            control_timeout: Duration::from_secs(30),
        }
    }
}

/// Output of a command that exited successfully
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: text.into(),
            stderr: String::new(),
        }
    }
}

/// Cooperative cancellation shared between a sweep and its runners
///
/// Checked between phases; in-flight commands run to their own timeout.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
