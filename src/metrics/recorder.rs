//! Metrics recorder for benchmark runs
//!
//! Counters and histograms for attempts, VPN restarts and finished runs.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub(crate) const RUN_DURATION_SECONDS: &str = "vpn_bench_run_duration_seconds";

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!(
        "vpn_bench_attempts_total",
        "Benchmark command attempts, labelled by outcome"
    );
    describe_counter!("vpn_bench_vpn_restarts_total", "VPN daemon restarts");
    describe_counter!(
        "vpn_bench_runs_total",
        "Finished runner calls, labelled by outcome"
    );
    describe_counter!(
        "vpn_bench_impairment_reset_failures_total",
        "Impairment resets that did not complete"
    );

    describe_gauge!(
        "vpn_bench_snapshot_cells",
        "Comparison cells in the last served snapshot, by status"
    );

    describe_histogram!(
        RUN_DURATION_SECONDS,
        "Wall time of a runner call including retries"
    );
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "err"
    }
}

pub fn record_attempt(vpn: &str, kind: &str, ok: bool) {
    counter!(
        "vpn_bench_attempts_total",
        "vpn" => vpn.to_string(),
        "kind" => kind.to_string(),
        "outcome" => outcome(ok)
    )
    .increment(1);
}

pub fn record_vpn_restart(vpn: &str) {
    counter!("vpn_bench_vpn_restarts_total", "vpn" => vpn.to_string()).increment(1);
}

/// Record a runner call reaching its terminal outcome
pub fn record_run_finished(vpn: &str, kind: &str, profile: &str, ok: bool, duration: Duration) {
    counter!(
        "vpn_bench_runs_total",
        "vpn" => vpn.to_string(),
        "kind" => kind.to_string(),
        "profile" => profile.to_string(),
        "outcome" => outcome(ok)
    )
    .increment(1);
    histogram!(RUN_DURATION_SECONDS, "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_impairment_reset_failed(machine: &str) {
    counter!(
        "vpn_bench_impairment_reset_failures_total",
        "machine" => machine.to_string()
    )
    .increment(1);
}

/// Cell counts of a snapshot: success, crashed, not run
pub fn set_snapshot_cells(success: usize, crashed: usize, not_run: usize) {
    gauge!("vpn_bench_snapshot_cells", "status" => "success").set(success as f64);
    gauge!("vpn_bench_snapshot_cells", "status" => "crashed").set(crashed as f64);
    gauge!("vpn_bench_snapshot_cells", "status" => "not-run").set(not_run as f64);
}
