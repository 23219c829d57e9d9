//! Benchmark execution and result aggregation for mesh VPNs
//!
//! A sweep runs every configured benchmark for every (machine, VPN) pair
//! under each impairment profile, reduces the raw samples to summary
//! statistics and persists one report per run. The aggregator folds the
//! stored reports into comparison matrices that the API serves as heatmaps,
//! per-VPN series and scatter plots.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod metrics;
pub mod profile;
pub mod query;
pub mod reducer;
pub mod repository;
pub mod result;
pub mod runner;
pub mod sweep;
pub mod testspec;
