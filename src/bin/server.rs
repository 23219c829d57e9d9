use anyhow::Context;
use vpn_bench::api::create_api_server;
use vpn_bench::config::{config_path, BenchConfig};
use vpn_bench::repository::ResultRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )?;

    let path = config_path(std::env::args().nth(1));
    let config = BenchConfig::load(&path).with_context(|| format!("loading config {path}"))?;

    vpn_bench::metrics::install_recorder(None)?;
    let repository = ResultRepository::open(&config.database_url)
        .await
        .with_context(|| format!("opening result database {}", config.database_url))?;

    let app = create_api_server(repository, config.vpns.clone(), config.profile_names());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "serving benchmark results");

    axum::serve(listener, app).await?;
    Ok(())
}
