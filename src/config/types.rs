use crate::config::error::{ConfigError, ConfigResult};
use crate::profile::{all_presets, ImpairmentProfile};
use crate::runner::{Machine, RunBudget};
use crate::testspec::TestSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

fn default_database_url() -> String {
    "sqlite://vpn-bench.db".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Attempt and time limits, in the units they are configured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_test_attempts: u32,
    pub max_vpn_restarts: u32,
    pub timeout_secs: u64,
    pub restart_probe_timeout_secs: u64,
    pub control_timeout_secs: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_test_attempts: 3,
            max_vpn_restarts: 1,
            timeout_secs: 120,
            restart_probe_timeout_secs: 60,
            control_timeout_secs: 30,
        }
    }
}

impl BudgetConfig {
    pub fn run_budget(&self) -> RunBudget {
        RunBudget {
            max_test_attempts: self.max_test_attempts,
            max_vpn_restarts: self.max_vpn_restarts,
            timeout: Duration::from_secs(self.timeout_secs),
            restart_probe_timeout: Duration::from_secs(self.restart_probe_timeout_secs),
            control_timeout: Duration::from_secs(self.control_timeout_secs),
        }
    }
}

/// A machine paired with one VPN it must benchmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub machine: Machine,
    pub vpn: String,
}

/// Benchmark sweep configuration, read from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default = "all_presets")]
    pub profiles: Vec<ImpairmentProfile>,
    #[serde(default = "TestSpec::standard_suite")]
    pub tests: Vec<TestSpec>,
    #[serde(default)]
    pub budgets: BudgetConfig,
    pub machines: Vec<Machine>,
    /// VPNs benchmarked on every machine without an explicit assignment
    pub vpns: Vec<String>,
    /// Machine name to the VPNs it benchmarks
    #[serde(default)]
    pub assignments: BTreeMap<String, Vec<String>>,
    /// VPN name to systemd unit, when it differs from `<vpn>.service`
    #[serde(default)]
    pub vpn_units: HashMap<String, String>,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Where a running sweep exposes its Prometheus metrics, if anywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_addr: Option<SocketAddr>,
}

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "VPN_BENCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "vpn-bench.json";

/// Config path: an explicit argument, then `VPN_BENCH_CONFIG`, then the default
pub fn config_path(arg: Option<String>) -> String {
    arg.or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

impl BenchConfig {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let config: BenchConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field rules; all problems are reported at once
    pub fn validate(&self) -> ConfigResult<()> {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for profile in &self.profiles {
            if !seen.insert(profile.name.as_str()) {
                problems.push(format!("duplicate profile name '{}'", profile.name));
            }
            problems.extend(profile.problems());
        }
        if self.profiles.is_empty() {
            problems.push("no profiles configured".to_string());
        }

        if self.tests.is_empty() {
            problems.push("no tests configured".to_string());
        }

        if self.budgets.max_test_attempts < 1 {
            problems.push("budgets.max_test_attempts must be at least 1".to_string());
        }
        if self.budgets.timeout_secs < 1 {
            problems.push("budgets.timeout_secs must be at least 1".to_string());
        }
        if self.budgets.restart_probe_timeout_secs < 1 || self.budgets.control_timeout_secs < 1 {
            problems.push("budgets timeouts must be at least 1 second".to_string());
        }

        let mut machines = HashSet::new();
        for machine in &self.machines {
            if !machines.insert(machine.name.as_str()) {
                problems.push(format!("duplicate machine name '{}'", machine.name));
            }
        }
        if self.machines.is_empty() {
            problems.push("no machines configured".to_string());
        }

        for machine in &self.machines {
            let vpns = self.vpns_of(machine);
            for vpn in vpns {
                // A shared address only identifies the partner when one VPN runs here
                let resolved = machine.peer_addresses.contains_key(vpn)
                    || (vpns.len() == 1 && machine.peer_for(vpn).is_some());
                if !resolved {
                    problems.push(format!(
                        "machine '{}' has no peer address for VPN '{vpn}'",
                        machine.name
                    ));
                }
            }
            for vpn in machine.peer_addresses.keys() {
                if !self.vpns.contains(vpn) {
                    problems.push(format!(
                        "machine '{}' has a peer address for unknown VPN '{vpn}'",
                        machine.name
                    ));
                }
            }
        }

        if self.vpns.iter().any(|v| v.trim().is_empty()) {
            problems.push("VPN names must not be empty".to_string());
        }
        for (machine, vpns) in &self.assignments {
            if !machines.contains(machine.as_str()) {
                problems.push(format!("assignment for unknown machine '{machine}'"));
            }
            for vpn in vpns {
                if !self.vpns.contains(vpn) {
                    problems.push(format!("machine '{machine}' assigned unknown VPN '{vpn}'"));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }

    fn vpns_of(&self, machine: &Machine) -> &[String] {
        self.assignments.get(&machine.name).unwrap_or(&self.vpns)
    }

    /// Every (machine, VPN) pair to benchmark, in machine order
    ///
    /// Each assignment's machine targets the partner address on that VPN's mesh.
    pub fn assignments(&self) -> Vec<Assignment> {
        self.machines
            .iter()
            .flat_map(|machine| {
                self.vpns_of(machine).iter().map(move |vpn| Assignment {
                    machine: machine.for_vpn(vpn),
                    vpn: vpn.clone(),
                })
            })
            .collect()
    }
}
