mod error;
mod rest;
mod types;

pub use error::{ApiError, ApiResult};
pub use rest::{ApiState, RestApi};
pub use types::*;

use crate::repository::ResultRepository;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the read-only results server, `/metrics` included
pub fn create_api_server(
    repository: ResultRepository,
    known_vpns: Vec<String>,
    profiles: Vec<String>,
) -> Router {
    let rest_api = RestApi::new(repository, known_vpns, profiles);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(rest_api.router())
        .route("/metrics", crate::metrics::metrics_route())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
