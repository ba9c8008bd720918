use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub const ROOT_MESSAGE: &str = "BDX API for Grafana";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Grafana's JSON datasource probes `/` when the datasource is saved.
#[utoipa::path(
    get,
    path = "/",
    tag = "grafana",
    responses((status = 200, description = "Service banner", body = RootResponse))
)]
pub(crate) async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: ROOT_MESSAGE.to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "OK", body = HealthResponse))
)]
pub(crate) async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(healthz_handler))
}
