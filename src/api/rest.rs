use crate::aggregate::{ComparisonEntry, ComparisonSnapshot};
use crate::api::error::{ApiError, ApiResult};
use crate::api::types::*;
use crate::query::{self, Heatmap, Scatter, Series};
use crate::reducer::BenchSummary;
use crate::repository::ResultRepository;
use crate::result::MixedReport;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

/// Everything the read-only endpoints need
pub struct ApiState {
    pub repository: ResultRepository,
    pub known_vpns: Vec<String>,
    pub profiles: Vec<String>,
}

pub struct RestApi {
    state: Arc<ApiState>,
}

impl RestApi {
    pub fn new(
        repository: ResultRepository,
        known_vpns: Vec<String>,
        profiles: Vec<String>,
    ) -> Self {
        Self {
            state: Arc::new(ApiState {
                repository,
                known_vpns,
                profiles,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/api/v1/status", get(get_status))
            .route("/api/v1/results", get(list_results))
            .route("/api/v1/snapshot", get(get_snapshot))
            // Projections
            .route("/api/v1/heatmap", get(get_heatmap))
            .route("/api/v1/series/:vpn", get(get_series))
            .route("/api/v1/scatter", get(get_scatter))
            .with_state(self.state.clone())
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// Snapshots are rebuilt from the repository on every request
async fn current_snapshot(state: &ApiState) -> ApiResult<ComparisonSnapshot> {
    let snapshot = state
        .repository
        .snapshot(&state.known_vpns, &state.profiles)
        .await?;

    let (mut success, mut crashed, mut not_run) = (0, 0, 0);
    for entry in snapshot
        .matrices
        .values()
        .flat_map(|matrix| matrix.entries.values())
        .flat_map(|row| row.values())
    {
        match entry {
            ComparisonEntry::Success { .. } => success += 1,
            ComparisonEntry::Crashed { .. } => crashed += 1,
            ComparisonEntry::NotRun => not_run += 1,
        }
    }
    crate::metrics::set_snapshot_cells(success, crashed, not_run);

    Ok(snapshot)
}

async fn get_status(State(state): State<Arc<ApiState>>) -> ApiResult<Json<StatusResponse>> {
    let (stored_ok, stored_failed) = state.repository.counts().await?;

    Ok(Json(StatusResponse {
        stored_ok,
        stored_failed,
        known_vpns: state.known_vpns.clone(),
        profiles: state.profiles.clone(),
    }))
}

async fn list_results(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ResultsParams>,
) -> ApiResult<Json<Vec<MixedReport<BenchSummary>>>> {
    let reports = match params.kind.as_deref() {
        Some(kind) => state.repository.load_kind(parse_kind(kind)?).await?,
        None => state.repository.load_all().await?,
    };
    Ok(Json(reports))
}

async fn get_snapshot(State(state): State<Arc<ApiState>>) -> ApiResult<Json<ComparisonSnapshot>> {
    Ok(Json(current_snapshot(&state).await?))
}

async fn get_heatmap(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HeatmapParams>,
) -> ApiResult<Json<Heatmap>> {
    let selector = params.selector()?;
    let mut order = params.vpn_order();
    if order.is_empty() {
        order = state.known_vpns.clone();
    }

    let snapshot = current_snapshot(&state).await?;
    Ok(Json(query::heatmap(&snapshot, &selector, &order)))
}

async fn get_series(
    State(state): State<Arc<ApiState>>,
    Path(vpn): Path<String>,
    Query(params): Query<SelectorParams>,
) -> ApiResult<Json<Series>> {
    let selector = params.selector()?;
    let snapshot = current_snapshot(&state).await?;

    if !state.known_vpns.contains(&vpn) && !snapshot.vpns().contains(&vpn) {
        return Err(ApiError::NotFound(format!("unknown VPN: {vpn}")));
    }

    Ok(Json(query::series(&snapshot, &vpn, &selector)))
}

async fn get_scatter(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ScatterParams>,
) -> ApiResult<Json<Scatter>> {
    let axes = params.axes()?;
    let snapshot = current_snapshot(&state).await?;
    Ok(Json(query::scatter(&snapshot, axes)))
}
