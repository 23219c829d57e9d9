//! Scripted fleet standing in for remote machines

#![allow(dead_code)]

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vpn_bench::config::Assignment;
use vpn_bench::profile::EndpointImpairment;
use vpn_bench::result::{ExecutionError, ExecutionResult};
use vpn_bench::runner::{
    CommandExecutor, CommandOutput, ImpairmentControl, Machine, TestRunner, VpnControl,
};

/// Throughput seen while any impairment is active, as a fraction of the clean value
pub const IMPAIRED_THROUGHPUT_FACTOR: f64 = 0.5;

#[derive(Default)]
struct FleetState {
    /// VPN name to the peer address that routes through it
    peers: BTreeMap<String, String>,
    throughput_mbit: Vec<f64>,
    rtt_ms: Vec<f64>,
    broken: Mutex<HashSet<(String, String)>>,
    flaky: Mutex<HashMap<(String, String), usize>>,
    active: Mutex<HashMap<String, EndpointImpairment>>,
    in_flight: Mutex<HashSet<String>>,
    overlapped: AtomicBool,
    commands: AtomicUsize,
    applied: AtomicUsize,
    resets: AtomicUsize,
    restarts: Mutex<Vec<(String, String)>>,
}

/// Cheap to clone; every clone shares the same fleet
#[derive(Clone)]
pub struct SimulatedFleet {
    state: Arc<FleetState>,
}

impl SimulatedFleet {
    /// `peers` maps each VPN to the peer address reached through it
    pub fn new(peers: &[(&str, &str)], throughput_mbit: &[f64]) -> Self {
        Self {
            state: Arc::new(FleetState {
                peers: peers
                    .iter()
                    .map(|(vpn, peer)| (vpn.to_string(), peer.to_string()))
                    .collect(),
                throughput_mbit: throughput_mbit.to_vec(),
                rtt_ms: vec![1.0, 2.0, 3.0],
                ..Default::default()
            }),
        }
    }

    /// Runner wired to this fleet for commands, impairment and VPN control
    pub fn runner(&self) -> TestRunner {
        TestRunner::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }

    pub fn assignment(&self, machine: &str, vpn: &str) -> Assignment {
        let peer = self
            .state
            .peers
            .get(vpn)
            .cloned()
            .unwrap_or_else(|| panic!("no peer registered for {vpn}"));
        Assignment {
            machine: Machine::new(machine, format!("{machine}.test"), peer),
            vpn: vpn.to_string(),
        }
    }

    /// Every command through `vpn` on `machine` fails and the daemon never recovers
    pub fn break_vpn(&self, machine: &str, vpn: &str) {
        self.state
            .broken
            .lock()
            .insert((machine.to_string(), vpn.to_string()));
    }

    /// The next `failures` commands through `vpn` on `machine` fail
    pub fn make_flaky(&self, machine: &str, vpn: &str, failures: usize) {
        self.state
            .flaky
            .lock()
            .insert((machine.to_string(), vpn.to_string()), failures);
    }

    pub fn commands(&self) -> usize {
        self.state.commands.load(Ordering::SeqCst)
    }

    pub fn applied(&self) -> usize {
        self.state.applied.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.state.resets.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> Vec<(String, String)> {
        self.state.restarts.lock().clone()
    }

    /// Machines that still carry an impairment
    pub fn impaired_machines(&self) -> Vec<String> {
        let mut machines: Vec<_> = self.state.active.lock().keys().cloned().collect();
        machines.sort();
        machines
    }

    /// Whether two commands ever ran on the same machine at once
    pub fn overlapped(&self) -> bool {
        self.state.overlapped.load(Ordering::SeqCst)
    }

    fn vpn_of(&self, machine: &Machine) -> String {
        self.state
            .peers
            .iter()
            .find(|(_, peer)| **peer == machine.peer_address)
            .map(|(vpn, _)| vpn.clone())
            .unwrap_or_default()
    }

    fn is_broken(&self, machine: &str, vpn: &str) -> bool {
        self.state
            .broken
            .lock()
            .contains(&(machine.to_string(), vpn.to_string()))
    }

    fn respond(&self, machine: &Machine, argv: &[String]) -> ExecutionResult<CommandOutput> {
        self.state.commands.fetch_add(1, Ordering::SeqCst);
        let vpn = self.vpn_of(machine);

        let flaky = {
            let mut flaky = self.state.flaky.lock();
            match flaky.get_mut(&(machine.name.clone(), vpn.clone())) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if flaky || self.is_broken(&machine.name, &vpn) {
            return Err(ExecutionError::command(
                1,
                "~",
                argv.to_vec(),
                "",
                "iperf3: error - unable to connect to server",
            ));
        }

        let impaired = self
            .state
            .active
            .lock()
            .get(&machine.name)
            .is_some_and(|share| !share.is_noop());
        let factor = if impaired { IMPAIRED_THROUGHPUT_FACTOR } else { 1.0 };

        match argv.first().map(String::as_str) {
            Some("iperf3") => Ok(CommandOutput::stdout(self.iperf_tcp(factor))),
            Some("ping") => Ok(CommandOutput::stdout(self.ping(&machine.peer_address, factor))),
            _ => Err(ExecutionError::fatal_tool(format!(
                "simulated fleet cannot run {argv:?}"
            ))),
        }
    }

    fn iperf_tcp(&self, factor: f64) -> String {
        let samples: Vec<f64> = self
            .state
            .throughput_mbit
            .iter()
            .map(|mbit| mbit * factor * 1_000_000.0)
            .collect();
        let mean = samples.iter().sum::<f64>() / samples.len().max(1) as f64;
        let intervals: Vec<_> = samples
            .iter()
            .map(|bps| json!({"sum": {"bits_per_second": bps, "retransmits": 0, "omitted": false}}))
            .collect();
        json!({
            "intervals": intervals,
            "end": {
                "sum_sent": {"bits_per_second": mean, "retransmits": 0},
                "sum_received": {"bits_per_second": mean}
            }
        })
        .to_string()
    }

    fn ping(&self, peer: &str, factor: f64) -> String {
        self.state
            .rtt_ms
            .iter()
            .enumerate()
            .map(|(seq, rtt)| {
                format!(
                    "64 bytes from {peer}: icmp_seq={} ttl=64 time={:.3} ms\n",
                    seq + 1,
                    rtt / factor
                )
            })
            .collect()
    }
}

impl CommandExecutor for SimulatedFleet {
    fn execute<'a>(
        &'a self,
        machine: &'a Machine,
        argv: &'a [String],
        _timeout: Duration,
    ) -> BoxFuture<'a, ExecutionResult<CommandOutput>> {
        Box::pin(async move {
            if !self.state.in_flight.lock().insert(machine.name.clone()) {
                self.state.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
            let result = self.respond(machine, argv);
            self.state.in_flight.lock().remove(&machine.name);
            result
        })
    }
}

impl ImpairmentControl for SimulatedFleet {
    fn apply<'a>(
        &'a self,
        machine: &'a Machine,
        share: &'a EndpointImpairment,
    ) -> BoxFuture<'a, ExecutionResult<()>> {
        Box::pin(async move {
            self.state.applied.fetch_add(1, Ordering::SeqCst);
            self.state
                .active
                .lock()
                .insert(machine.name.clone(), *share);
            Ok(())
        })
    }

    fn reset<'a>(&'a self, machine: &'a Machine) -> BoxFuture<'a, ExecutionResult<()>> {
        Box::pin(async move {
            self.state.resets.fetch_add(1, Ordering::SeqCst);
            self.state.active.lock().remove(&machine.name);
            Ok(())
        })
    }
}

impl VpnControl for SimulatedFleet {
    fn is_healthy<'a>(&'a self, machine: &'a Machine, vpn: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move { !self.is_broken(&machine.name, vpn) })
    }

    fn restart<'a>(
        &'a self,
        machine: &'a Machine,
        vpn: &'a str,
    ) -> BoxFuture<'a, ExecutionResult<()>> {
        Box::pin(async move {
            self.state
                .restarts
                .lock()
                .push((machine.name.clone(), vpn.to_string()));
            Ok(())
        })
    }

    fn recent_logs<'a>(
        &'a self,
        machine: &'a Machine,
        vpn: &'a str,
        lines: usize,
    ) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            Some(format!(
                "-- last {lines} lines of {vpn}.service on {} --\nconnection to peer lost",
                machine.name
            ))
        })
    }
}
