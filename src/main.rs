use anyhow::Context;
use std::sync::Arc;
use vpn_bench::aggregate::ComparisonEntry;
use vpn_bench::config::{config_path, BenchConfig};
use vpn_bench::repository::ResultRepository;
use vpn_bench::runner::{CommandExecutor, SshExecutor, SystemdVpn, TcNetem, TestRunner};
use vpn_bench::sweep::BenchmarkSweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )?;

    let path = config_path(std::env::args().nth(1));
    let config = BenchConfig::load(&path).with_context(|| format!("loading config {path}"))?;
    if let Some(addr) = config.metrics_addr {
        vpn_bench::metrics::install_recorder(Some(addr))?;
    }

    let control_timeout = config.budgets.run_budget().control_timeout;
    let executor: Arc<dyn CommandExecutor> = Arc::new(SshExecutor::new());
    let impairment = Arc::new(TcNetem::new(executor.clone(), control_timeout));
    let vpn = Arc::new(
        SystemdVpn::new(executor.clone(), control_timeout).with_units(config.vpn_units.clone()),
    );
    let runner = TestRunner::new(executor, impairment, vpn);

    let repository = ResultRepository::open(&config.database_url)
        .await
        .with_context(|| format!("opening result database {}", config.database_url))?;
    let sweep = BenchmarkSweep::from_config(&config, runner).with_repository(repository.clone());

    let cancel = sweep.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; no new runs will start");
            cancel.cancel();
        }
    });

    let report = sweep.run(config.assignments()).await;
    for failure in report.failures() {
        if let Some(error) = failure.result.error() {
            tracing::warn!(
                machine = %failure.machine_name,
                vpn = %failure.vpn_name,
                profile = %failure.profile_name,
                kind = %failure.test_kind,
                "run failed: {error}"
            );
        }
    }

    let snapshot = repository
        .snapshot(&config.vpns, &config.profile_names())
        .await?;
    for (kind, matrix) in &snapshot.matrices {
        let entries: Vec<&ComparisonEntry> =
            matrix.entries.values().flat_map(|row| row.values()).collect();
        tracing::info!(
            kind = %kind,
            success = entries.iter().filter(|e| e.is_success()).count(),
            crashed = entries.iter().filter(|e| e.is_crashed()).count(),
            not_run = entries.iter().filter(|e| e.is_not_run()).count(),
            "comparison matrix"
        );
    }

    if report.cancelled {
        anyhow::bail!(
            "sweep {} cancelled with {} runs skipped",
            report.run_id,
            report.progress.skipped
        );
    }
    Ok(())
}
