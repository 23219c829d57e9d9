//! Impairment and VPN control built on a [`CommandExecutor`]

use crate::profile::EndpointImpairment;
use crate::result::ExecutionResult;
use crate::runner::control::{CommandExecutor, ImpairmentControl, VpnControl};
use crate::runner::types::Machine;
use crate::testspec::shell_quote;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Device incoming traffic is redirected through so it can be shaped too
const INGRESS_DEVICE: &str = "ifb0";

fn sh(script: String) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script]
}

/// netem arguments for one direction of traffic
pub fn netem_args(share: &EndpointImpairment) -> Vec<String> {
    let mut args = Vec::new();
    if share.delay_ms > 0.0 || share.jitter_ms > 0.0 {
        args.push("delay".to_string());
        args.push(format!("{}ms", share.delay_ms));
        if share.jitter_ms > 0.0 {
            args.push(format!("{}ms", share.jitter_ms));
        }
    }
    if share.loss_percent > 0.0 {
        args.push("loss".to_string());
        args.push(format!("{}%", share.loss_percent));
    }
    if share.reorder_percent > 0.0 {
        args.push("reorder".to_string());
        args.push(format!("{}%", share.reorder_percent));
    }
    if let Some(rate) = share.rate_mbit {
        args.push("rate".to_string());
        args.push(format!("{rate}mbit"));
    }
    args
}

/// Linux `tc netem` impairment
///
/// The endpoint share is applied to both directions of the machine's
/// interface: egress directly, ingress through an ifb device.
#[derive(Clone)]
pub struct TcNetem {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl TcNetem {
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn apply_command(machine: &Machine, share: &EndpointImpairment) -> Vec<String> {
        let netem = netem_args(share).join(" ");
        let dev = shell_quote(&machine.interface);
        sh(format!(
            "set -e; modprobe ifb numifbs=1; \
             ip link show {INGRESS_DEVICE} >/dev/null 2>&1 || ip link add {INGRESS_DEVICE} type ifb; \
             ip link set {INGRESS_DEVICE} up; \
             tc qdisc replace dev {dev} root netem {netem}; \
             tc qdisc replace dev {dev} handle ffff: ingress; \
             tc filter replace dev {dev} parent ffff: matchall action mirred egress redirect dev {INGRESS_DEVICE}; \
             tc qdisc replace dev {INGRESS_DEVICE} root netem {netem}"
        ))
    }

    pub fn reset_command(machine: &Machine) -> Vec<String> {
        let dev = shell_quote(&machine.interface);
        sh(format!(
            "tc qdisc del dev {dev} root 2>/dev/null; \
             tc qdisc del dev {dev} ingress 2>/dev/null; \
             tc qdisc del dev {INGRESS_DEVICE} root 2>/dev/null; true"
        ))
    }
}

impl ImpairmentControl for TcNetem {
    fn apply<'a>(
        &'a self,
        machine: &'a Machine,
        share: &'a EndpointImpairment,
    ) -> BoxFuture<'a, ExecutionResult<()>> {
        Box::pin(async move {
            if share.is_noop() {
                return self.reset(machine).await;
            }
            let argv = Self::apply_command(machine, share);
            self.executor.execute(machine, &argv, self.timeout).await?;
            Ok(())
        })
    }

    fn reset<'a>(&'a self, machine: &'a Machine) -> BoxFuture<'a, ExecutionResult<()>> {
        Box::pin(async move {
            let argv = Self::reset_command(machine);
            self.executor.execute(machine, &argv, self.timeout).await?;
            Ok(())
        })
    }
}

/// VPN daemons managed as systemd units
#[derive(Clone)]
pub struct SystemdVpn {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
    units: HashMap<String, String>,
}

impl SystemdVpn {
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self {
            executor,
            timeout,
            units: HashMap::new(),
        }
    }

    /// Override the unit name of a VPN; defaults to `<vpn>.service`
    pub fn with_units(mut self, units: HashMap<String, String>) -> Self {
        self.units = units;
        self
    }

    pub fn unit(&self, vpn: &str) -> String {
        self.units
            .get(vpn)
            .cloned()
            .unwrap_or_else(|| format!("{vpn}.service"))
    }

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }
}

impl VpnControl for SystemdVpn {
    fn is_healthy<'a>(&'a self, machine: &'a Machine, vpn: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let unit = self.unit(vpn);
            let argv = Self::argv(&["systemctl", "is-active", "--quiet", &unit]);
            self.executor.execute(machine, &argv, self.timeout).await.is_ok()
        })
    }

    fn restart<'a>(
        &'a self,
        machine: &'a Machine,
        vpn: &'a str,
    ) -> BoxFuture<'a, ExecutionResult<()>> {
        Box::pin(async move {
            let unit = self.unit(vpn);
            let argv = Self::argv(&["systemctl", "restart", &unit]);
            self.executor.execute(machine, &argv, self.timeout).await?;
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
            let unit = self.unit(vpn);
            let count = lines.to_string();
            let argv = Self::argv(&["journalctl", "-u", &unit, "-n", &count, "--no-pager"]);
            self.executor
                .execute(machine, &argv, self.timeout)
                .await
                .ok()
                .map(|output| output.stdout)
                .filter(|logs| !logs.trim().is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ImpairmentProfile;
    use crate::result::ExecutionError;
    use crate::runner::types::CommandOutput;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<String>>>,
        fail_with: Option<i32>,
    }

    impl CommandExecutor for Recorder {
        fn execute<'a>(
            &'a self,
            _machine: &'a Machine,
            argv: &'a [String],
            _timeout: Duration,
        ) -> BoxFuture<'a, ExecutionResult<CommandOutput>> {
            self.calls.lock().push(argv.to_vec());
            let result = match self.fail_with {
                Some(code) => Err(ExecutionError::command(code, "~", argv.to_vec(), "", "")),
                None => Ok(CommandOutput::stdout("log line\n")),
            };
            Box::pin(async move { result })
        }
    }

    fn machine() -> Machine {
        Machine::new("m1", "192.0.2.1", "10.0.0.2")
    }

    #[test]
    fn test_netem_args_for_endpoint_share() {
        let share = ImpairmentProfile::named("lossy")
            .with_latency(40.0)
            .with_jitter(8.0)
            .with_loss(2.0)
            .with_bandwidth(100.0)
            .per_endpoint();
        assert_eq!(
            netem_args(&share),
            vec!["delay", "20ms", "4ms", "loss", "1%", "rate", "100mbit"]
        );
    }

    #[tokio::test]
    async fn test_noop_share_resets() {
        let recorder = Arc::new(Recorder::default());
        let netem = TcNetem::new(recorder.clone(), Duration::from_secs(5));

        let share = ImpairmentProfile::baseline().per_endpoint();
        netem.apply(&machine(), &share).await.unwrap();

        let calls = recorder.calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][2].contains("tc qdisc del dev eth0 root"));
    }

    #[tokio::test]
    async fn test_apply_shapes_both_directions() {
        let recorder = Arc::new(Recorder::default());
        let netem = TcNetem::new(recorder.clone(), Duration::from_secs(5));

        let share = ImpairmentProfile::named("slow").with_latency(10.0).per_endpoint();
        netem.apply(&machine(), &share).await.unwrap();

        let script = &recorder.calls.lock()[0][2];
        assert!(script.contains("tc qdisc replace dev eth0 root netem delay 5ms"));
        assert!(script.contains("tc qdisc replace dev ifb0 root netem delay 5ms"));
    }

    #[test]
    fn test_interface_is_quoted_in_scripts() {
        let mut machine = machine();
        machine.interface = "eth0; reboot".to_string();
        let share = ImpairmentProfile::named("slow").with_latency(10.0).per_endpoint();

        let apply = &TcNetem::apply_command(&machine, &share)[2];
        assert!(apply.contains("tc qdisc replace dev 'eth0; reboot' root netem"));
        assert!(!apply.contains("dev eth0; reboot"));

        let reset = &TcNetem::reset_command(&machine)[2];
        assert!(reset.contains("tc qdisc del dev 'eth0; reboot' ingress"));
    }

    #[tokio::test]
    async fn test_systemd_commands() {
        let recorder = Arc::new(Recorder::default());
        let mut units = HashMap::new();
        units.insert("alpha".to_string(), "alpha-mesh.service".to_string());
        let vpn = SystemdVpn::new(recorder.clone(), Duration::from_secs(5)).with_units(units);

        assert!(vpn.is_healthy(&machine(), "alpha").await);
        vpn.restart(&machine(), "beta").await.unwrap();
        let logs = vpn.recent_logs(&machine(), "alpha", 50).await;
        assert_eq!(logs.as_deref(), Some("log line\n"));

        let calls = recorder.calls.lock();
        assert_eq!(
            calls[0],
            SystemdVpn::argv(&["systemctl", "is-active", "--quiet", "alpha-mesh.service"])
        );
        assert_eq!(
            calls[1],
            SystemdVpn::argv(&["systemctl", "restart", "beta.service"])
        );
        assert_eq!(
            calls[2][..3],
            SystemdVpn::argv(&["journalctl", "-u", "alpha-mesh.service"])[..]
        );
    }

    #[tokio::test]
    async fn test_inactive_unit_is_unhealthy() {
        let recorder = Arc::new(Recorder {
            fail_with: Some(3),
            ..Default::default()
        });
        let vpn = SystemdVpn::new(recorder, Duration::from_secs(5));
        assert!(!vpn.is_healthy(&machine(), "alpha").await);
        assert!(vpn.restart(&machine(), "alpha").await.is_err());
        assert!(vpn.recent_logs(&machine(), "alpha", 10).await.is_none());
    }
}
