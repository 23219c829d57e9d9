use crate::metrics;
use crate::profile::ImpairmentProfile;
use crate::result::{ExecutionError, ExecutionResult, RunResult, TestMetadata};
use crate::runner::control::{CommandExecutor, ImpairmentControl, VpnControl};
use crate::runner::error::RunnerError;
use crate::runner::state_machine::{RetryEvent, RetryState, RetryStateMachine};
use crate::runner::types::{CancellationFlag, Machine, RunBudget};
use crate::testspec::{parse_output, RawSamples, TestSpec};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

/// Service log lines collected when a run ends in failure
pub const SERVICE_LOG_LINES: usize = 200;

/// One mutex per machine name
///
/// Impairment and VPN state are per machine, so runs on the same machine are
/// serialized while different machines proceed in parallel.
#[derive(Clone, Default)]
pub struct MachineLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl MachineLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, machine: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(machine.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

/// Executes single benchmarks on a machine with retry and VPN recovery
#[derive(Clone)]
pub struct TestRunner {
    executor: Arc<dyn CommandExecutor>,
    impairment: Arc<dyn ImpairmentControl>,
    vpn: Arc<dyn VpnControl>,
    locks: MachineLocks,
    cancel: CancellationFlag,
}

impl TestRunner {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        impairment: Arc<dyn ImpairmentControl>,
        vpn: Arc<dyn VpnControl>,
    ) -> Self {
        Self {
            executor,
            impairment,
            vpn,
            locks: MachineLocks::new(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_locks(mut self, locks: MachineLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Run `spec` on `machine` through `vpn` under `profile`.
    ///
    /// Never panics on remote failure: every outcome, including cancellation,
    /// comes back as a [`RunResult`] with its metadata filled in. The machine's
    /// impairment is reset before returning, whatever the outcome.
    pub async fn run(
        &self,
        spec: &TestSpec,
        vpn: &str,
        machine: &Machine,
        profile: &ImpairmentProfile,
        budget: &RunBudget,
    ) -> RunResult<RawSamples> {
        let _guard = self.locks.acquire(&machine.name).await;
        let started = Instant::now();
        let mut sm = RetryStateMachine::new(budget.max_test_attempts, budget.max_vpn_restarts);

        let outcome = if let Some(problem) = profile.problems().into_iter().next() {
            Err(ExecutionError::invalid_input(problem))
        } else {
            self.drive(spec, vpn, machine, profile, budget, &mut sm).await
        };

        if let Err(e) = self
            .bounded("impairment reset", budget.control_timeout, self.impairment.reset(machine))
            .await
        {
            error!(machine = %machine.name, error = %e, "failed to reset impairment");
            metrics::record_impairment_reset_failed(&machine.name);
        }

        let mut meta = TestMetadata {
            duration_seconds: 0.0,
            test_attempts: sm.test_attempts(),
            vpn_restart_attempts: sm.vpn_restart_attempts(),
            service_logs: None,
        };

        let result = match outcome {
            Ok(samples) => {
                meta.duration_seconds = started.elapsed().as_secs_f64();
                RunResult::ok(samples, meta)
            }
            Err(e) if e.is_cancelled() => {
                info!(
                    machine = %machine.name,
                    vpn,
                    kind = %spec.kind,
                    attempts = meta.test_attempts,
                    "benchmark cancelled"
                );
                meta.duration_seconds = started.elapsed().as_secs_f64();
                RunResult::err(e, meta)
            }
            Err(e) => {
                warn!(
                    machine = %machine.name,
                    vpn,
                    kind = %spec.kind,
                    profile = %profile.name,
                    attempts = meta.test_attempts,
                    restarts = meta.vpn_restart_attempts,
                    error = %e,
                    "benchmark failed"
                );
                meta.service_logs = self.collect_logs(machine, vpn, budget).await;
                meta.duration_seconds = started.elapsed().as_secs_f64();
                RunResult::err(e, meta)
            }
        };

        metrics::record_run_finished(
            vpn,
            spec.kind.as_str(),
            &profile.name,
            result.is_ok(),
            started.elapsed(),
        );
        result
    }

    async fn drive(
        &self,
        spec: &TestSpec,
        vpn: &str,
        machine: &Machine,
        profile: &ImpairmentProfile,
        budget: &RunBudget,
        sm: &mut RetryStateMachine,
    ) -> ExecutionResult<RawSamples> {
        let share = profile.per_endpoint();
        let argv = spec.command(&machine.peer_address);
        let mut impaired = false;
        let mut last_error = None;

        loop {
            if self.cancel.is_cancelled() && !sm.current_state().is_terminal() {
                sm.transition(RetryEvent::Cancelled)?;
                let stage = if sm.test_attempts() == 0 { "test" } else { "retry" };
                let cancelled = ExecutionError::from(RunnerError::Cancelled(stage));
                return Err(match last_error {
                    Some(e) => cancelled.with_description(format!("last attempt: {e}")),
                    None => cancelled,
                });
            }

            match sm.current_state() {
                RetryState::Attempting { round_attempt } => {
                    debug!(
                        machine = %machine.name,
                        vpn,
                        kind = %spec.kind,
                        round_attempt,
                        "attempt"
                    );
                    let attempt = async {
                        if !impaired {
                            self.bounded(
                                "impairment setup",
                                budget.control_timeout,
                                self.impairment.apply(machine, &share),
                            )
                            .await?;
                            impaired = true;
                        }
                        let output = self.executor.execute(machine, &argv, budget.timeout).await?;
                        Ok::<_, ExecutionError>(parse_output(spec.kind, &output.stdout)?)
                    };

                    match attempt.await {
                        Ok(samples) => {
                            metrics::record_attempt(vpn, spec.kind.as_str(), true);
                            sm.transition(RetryEvent::AttemptSucceeded)?;
                            return Ok(samples);
                        }
                        Err(e) => {
                            metrics::record_attempt(vpn, spec.kind.as_str(), false);
                            warn!(
                                machine = %machine.name,
                                vpn,
                                kind = %spec.kind,
                                attempt = sm.test_attempts() + 1,
                                error = %e,
                                "attempt failed"
                            );
                            let vpn_unhealthy = e.is_retryable()
                                && sm.needs_health_probe()
                                && !self.probe(machine, vpn, budget.control_timeout).await;
                            sm.transition(RetryEvent::AttemptFailed {
                                retryable: e.is_retryable(),
                                nonzero_exit: e.is_nonzero_exit(),
                                vpn_unhealthy,
                            })?;
                            last_error = Some(e);
                        }
                    }
                }

                RetryState::RestartingVpn => {
                    info!(machine = %machine.name, vpn, "restarting VPN");
                    metrics::record_vpn_restart(vpn);
                    if let Err(e) = self
                        .bounded(
                            "VPN restart",
                            budget.control_timeout,
                            self.vpn.restart(machine, vpn),
                        )
                        .await
                    {
                        warn!(machine = %machine.name, vpn, error = %e, "VPN restart failed");
                    } else if !self.wait_until_healthy(machine, vpn, budget).await {
                        warn!(machine = %machine.name, vpn, "VPN not healthy after restart");
                    }
                    sm.transition(RetryEvent::VpnRestarted)?;
                }

                RetryState::Succeeded | RetryState::Exhausted => {
                    return Err(last_error.unwrap_or_else(|| {
                        RunnerError::InvalidTransition("run ended without an outcome".into()).into()
                    }));
                }
            }
        }
    }

    async fn bounded<T>(
        &self,
        what: &'static str,
        limit: Duration,
        fut: impl Future<Output = ExecutionResult<T>>,
    ) -> ExecutionResult<T> {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(RunnerError::ControlTimeout(what, limit.as_secs()).into()),
        }
    }

    async fn probe(&self, machine: &Machine, vpn: &str, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.vpn.is_healthy(machine, vpn))
            .await
            .unwrap_or(false)
    }

    /// Poll health with exponential backoff until the probe window closes
    async fn wait_until_healthy(&self, machine: &Machine, vpn: &str, budget: &RunBudget) -> bool {
        let window = budget.restart_probe_timeout;
        let first = (window / 10).min(Duration::from_millis(500));
        let mut backoff = ExponentialBackoff {
            current_interval: first,
            initial_interval: first,
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(window),
            ..Default::default()
        };

        loop {
            if self.probe(machine, vpn, budget.control_timeout.min(window)).await {
                return true;
            }
            match backoff.next_backoff() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return false,
            }
        }
    }

    async fn collect_logs(
        &self,
        machine: &Machine,
        vpn: &str,
        budget: &RunBudget,
    ) -> Option<String> {
        tokio::time::timeout(
            budget.control_timeout,
            self.vpn.recent_logs(machine, vpn, SERVICE_LOG_LINES),
        )
        .await
        .ok()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::TIMEOUT_RETURNCODE;
    use crate::runner::types::CommandOutput;
    use crate::testspec::{MetricField, TestKind};
    use futures::future::BoxFuture;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PING_OK: &str = "64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=1.0 ms\n\
                           64 bytes from 10.0.0.2: icmp_seq=2 ttl=64 time=3.0 ms\n";

    #[derive(Default)]
    struct ScriptedExecutor {
        script: SyncMutex<VecDeque<ExecutionResult<CommandOutput>>>,
        calls: AtomicUsize,
        cancel_after: Option<(usize, CancellationFlag)>,
    }

    impl ScriptedExecutor {
        fn new(script: Vec<ExecutionResult<CommandOutput>>) -> Self {
            Self {
                script: SyncMutex::new(script.into()),
                ..Default::default()
            }
        }
    }

    impl CommandExecutor for ScriptedExecutor {
        fn execute<'a>(
            &'a self,
            _machine: &'a Machine,
            argv: &'a [String],
            _timeout: Duration,
        ) -> BoxFuture<'a, ExecutionResult<CommandOutput>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, flag)) = &self.cancel_after {
                if call >= *after {
                    flag.cancel();
                }
            }
            let next = self.script.lock().pop_front().unwrap_or_else(|| {
                Err(ExecutionError::command(1, "~", argv.to_vec(), "", "no route"))
            });
            Box::pin(async move { next })
        }
    }

    #[derive(Default)]
    struct CountingImpairment {
        applied: AtomicUsize,
        resets: AtomicUsize,
    }

    impl ImpairmentControl for CountingImpairment {
        fn apply<'a>(
            &'a self,
            _machine: &'a Machine,
            _share: &'a crate::profile::EndpointImpairment,
        ) -> BoxFuture<'a, ExecutionResult<()>> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn reset<'a>(&'a self, _machine: &'a Machine) -> BoxFuture<'a, ExecutionResult<()>> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    struct FakeVpn {
        healthy: bool,
        restarts: AtomicUsize,
    }

    impl FakeVpn {
        fn new(healthy: bool) -> Self {
            Self {
                healthy,
                restarts: AtomicUsize::new(0),
            }
        }
    }

    impl VpnControl for FakeVpn {
        fn is_healthy<'a>(&'a self, _machine: &'a Machine, _vpn: &'a str) -> BoxFuture<'a, bool> {
            let healthy = self.healthy;
            Box::pin(async move { healthy })
        }

        fn restart<'a>(
            &'a self,
            _machine: &'a Machine,
            _vpn: &'a str,
        ) -> BoxFuture<'a, ExecutionResult<()>> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn recent_logs<'a>(
            &'a self,
            _machine: &'a Machine,
            vpn: &'a str,
            _lines: usize,
        ) -> BoxFuture<'a, Option<String>> {
            let logs = format!("{vpn}: handshake timed out");
            Box::pin(async move { Some(logs) })
        }
    }

    fn budget(attempts: u32, restarts: u32) -> RunBudget {
        RunBudget {
            max_test_attempts: attempts,
            max_vpn_restarts: restarts,
            timeout: Duration::from_secs(5),
            restart_probe_timeout: Duration::from_millis(20),
            control_timeout: Duration::from_millis(200),
        }
    }

    fn nonzero() -> ExecutionResult<CommandOutput> {
        Err(ExecutionError::command(1, "~", vec!["ping".into()], "", "unreachable"))
    }

    fn machine() -> Machine {
        Machine::new("m1", "192.0.2.1", "10.0.0.2")
    }

    struct Harness {
        runner: TestRunner,
        executor: Arc<ScriptedExecutor>,
        impairment: Arc<CountingImpairment>,
        vpn: Arc<FakeVpn>,
    }

    fn harness(executor: ScriptedExecutor, vpn_healthy: bool) -> Harness {
        let executor = Arc::new(executor);
        let impairment = Arc::new(CountingImpairment::default());
        let vpn = Arc::new(FakeVpn::new(vpn_healthy));
        let runner = TestRunner::new(executor.clone(), impairment.clone(), vpn.clone());
        Harness {
            runner,
            executor,
            impairment,
            vpn,
        }
    }

    #[tokio::test]
    async fn test_success_after_two_failures() {
        let h = harness(
            ScriptedExecutor::new(vec![nonzero(), nonzero(), Ok(CommandOutput::stdout(PING_OK))]),
            true,
        );
        let result = h
            .runner
            .run(
                &TestSpec::new(TestKind::Ping),
                "alpha",
                &machine(),
                &ImpairmentProfile::baseline(),
                &budget(3, 1),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(result.meta().test_attempts, 3);
        assert_eq!(result.meta().vpn_restart_attempts, 0);
        assert_eq!(result.value().unwrap()[&MetricField::Rtt], vec![1.0, 3.0]);
        assert!(result.meta().service_logs.is_none());
        assert_eq!(h.impairment.applied.load(Ordering::SeqCst), 1);
        assert_eq!(h.impairment.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_both_budgets() {
        let h = harness(ScriptedExecutor::default(), false);
        let result = h
            .runner
            .run(
                &TestSpec::new(TestKind::Ping),
                "beta",
                &machine(),
                &ImpairmentProfile::named("lossy").with_loss(10.0),
                &budget(2, 2),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(result.meta().vpn_restart_attempts, 2);
        assert_eq!(result.meta().test_attempts, 6);
        assert_eq!(h.vpn.restarts.load(Ordering::SeqCst), 2);
        assert_eq!(h.impairment.resets.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.meta().service_logs.as_deref(),
            Some("beta: handshake timed out")
        );
        assert!(result.error().unwrap().is_nonzero_exit());
    }

    #[tokio::test]
    async fn test_fatal_tool_error_consumes_one_attempt() {
        let h = harness(
            ScriptedExecutor::new(vec![Err(ExecutionError::fatal_tool("ssh key rejected"))]),
            false,
        );
        let result = h
            .runner
            .run(
                &TestSpec::new(TestKind::Ping),
                "alpha",
                &machine(),
                &ImpairmentProfile::baseline(),
                &budget(5, 5),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(result.meta().test_attempts, 1);
        assert_eq!(result.meta().vpn_restart_attempts, 0);
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.impairment.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_as_command_error() {
        let timeout = Err(ExecutionError::timeout(
            "~",
            vec!["iperf3".into()],
            Duration::from_secs(1),
        ));
        let h = harness(
            ScriptedExecutor::new(vec![timeout, Ok(CommandOutput::stdout(PING_OK))]),
            true,
        );
        let result = h
            .runner
            .run(
                &TestSpec::new(TestKind::Ping),
                "alpha",
                &machine(),
                &ImpairmentProfile::baseline(),
                &budget(2, 0),
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(result.meta().test_attempts, 2);
    }

    #[tokio::test]
    async fn test_unparseable_output_is_a_tool_error() {
        let h = harness(
            ScriptedExecutor::new(vec![Ok(CommandOutput::stdout("100% packet loss"))]),
            true,
        );
        let result = h
            .runner
            .run(
                &TestSpec::new(TestKind::Ping),
                "alpha",
                &machine(),
                &ImpairmentProfile::baseline(),
                &budget(1, 0),
            )
            .await;

        let error = result.error().unwrap();
        assert!(matches!(error, ExecutionError::ToolError { fatal: false, .. }));
    }

    #[tokio::test]
    async fn test_invalid_profile_is_rejected_without_attempts() {
        let h = harness(ScriptedExecutor::default(), true);
        let result = h
            .runner
            .run(
                &TestSpec::new(TestKind::Ping),
                "alpha",
                &machine(),
                &ImpairmentProfile::named("broken").with_loss(-1.0),
                &budget(3, 1),
            )
            .await;

        assert!(matches!(
            result.error(),
            Some(ExecutionError::InvalidInput { .. })
        ));
        assert_eq!(result.meta().test_attempts, 0);
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.impairment.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_between_attempts() {
        let flag = CancellationFlag::new();
        let executor = ScriptedExecutor {
            cancel_after: Some((1, flag.clone())),
            ..Default::default()
        };
        let h = harness(executor, true);
        let runner = h.runner.clone().with_cancellation(flag);
        let result = runner
            .run(
                &TestSpec::new(TestKind::Ping),
                "alpha",
                &machine(),
                &ImpairmentProfile::baseline(),
                &budget(10, 3),
            )
            .await;

        assert!(result.is_cancelled());
        assert_eq!(result.meta().test_attempts, 1);
        assert!(result.meta().service_logs.is_none());
        assert_eq!(h.impairment.resets.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.error(),
            Some(ExecutionError::ToolError { description: Some(d), .. }) if d.contains("no route")
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let h = harness(ScriptedExecutor::default(), true);
        h.runner.cancellation().cancel();
        let result = h
            .runner
            .run(
                &TestSpec::new(TestKind::Ping),
                "alpha",
                &machine(),
                &ImpairmentProfile::baseline(),
                &budget(3, 1),
            )
            .await;

        assert!(matches!(
            result.error(),
            Some(ExecutionError::ToolError { fatal: true, .. })
        ));
        assert!(result.is_cancelled());
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.impairment.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_machine_runs_are_serialized() {
        let locks = MachineLocks::new();
        let guard = locks.acquire("m1").await;

        let other = locks.clone();
        let blocked = tokio::spawn(async move {
            let _g = other.acquire("m1").await;
        });
        let free = locks.acquire("m2").await;
        drop(free);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());
        drop(guard);
        blocked.await.unwrap();
    }

    #[test]
    fn test_timeout_returncode_constant() {
        let err = ExecutionError::timeout("~", vec![], Duration::from_secs(3));
        assert!(matches!(
            err,
            ExecutionError::CommandError { returncode: TIMEOUT_RETURNCODE, .. }
        ));
    }
}
