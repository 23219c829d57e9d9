//! Metrics and observability module
//!
//! Provides Prometheus-compatible metrics for monitoring benchmark sweeps.
//!
//! Key metrics exposed:
//! - Attempts per VPN and test kind, by outcome
//! - VPN restarts
//! - Run durations
//! - Impairment reset failures

pub mod exporter;
pub mod recorder;

pub use exporter::{install_recorder, metrics_route, render_metrics, MetricsError};
pub use recorder::{
    init_metrics, record_attempt, record_impairment_reset_failed, record_run_finished,
    record_vpn_restart, set_snapshot_cells,
};
