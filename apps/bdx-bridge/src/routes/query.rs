use axum::extract::{RawQuery, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use url::form_urlencoded;

use crate::error::{ApiError, ApiResult};
use crate::services::query::{parse_component_ids, parse_properties, TrendQuery};
use crate::services::reshape::{to_grafana_series, GrafanaResponse};
use crate::state::AppState;
use crate::time::resolve_window;

#[derive(Debug, Default)]
struct QueryParams {
    component_path_ids: Option<String>,
    properties: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
}

impl QueryParams {
    /// Last occurrence of a key wins; unknown keys are ignored.
    fn parse(raw: Option<&str>) -> Self {
        let mut params = Self::default();
        let Some(raw) = raw else {
            return params;
        };
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "component_path_ids" => params.component_path_ids = Some(value.into_owned()),
                "properties" => params.properties = Some(value.into_owned()),
                "start_time" => params.start_time = Some(value.into_owned()),
                "end_time" => params.end_time = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

#[utoipa::path(
    get,
    path = "/query",
    tag = "grafana",
    params(
        ("component_path_ids" = String, Query, description = "Comma-separated BDX component path ids"),
        ("properties" = Option<String>, Query, description = "Comma-separated property names (default: value)"),
        ("start_time" = Option<String>, Query, description = "Window start (ISO-8601, default: now - 24h)"),
        ("end_time" = Option<String>, Query, description = "Window end (ISO-8601, default: now)")
    ),
    responses(
        (status = 200, description = "Grafana series, or a no-data message", body = Vec<crate::services::reshape::ReshapedSeries>),
        (status = 400, description = "Invalid query", body = crate::error::ErrorBody),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Upstream failure", body = crate::error::ErrorBody)
    )
)]
pub(crate) async fn query_grafana(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<GrafanaResponse>> {
    let params = QueryParams::parse(raw.as_deref());
    tracing::debug!(?params, "grafana query");

    let component_ids =
        parse_component_ids(params.component_path_ids.as_deref().unwrap_or_default())?;
    let properties = parse_properties(params.properties.as_deref());
    let window = resolve_window(
        params.start_time.as_deref(),
        params.end_time.as_deref(),
        Utc::now(),
    )?;
    let query = TrendQuery::build(&component_ids, &properties, window);

    let table = state.source.retrieve(&query).await.map_err(|err| {
        tracing::error!(error = %err, series = query.properties.len(), "trend retrieval failed");
        ApiError::internal()
    })?;
    let reshaped = to_grafana_series(&table).map_err(|err| {
        tracing::error!(
            error = %err,
            shape = %table.shape(),
            columns = ?table.labels(),
            "failed to reshape trend table"
        );
        ApiError::internal()
    })?;

    Ok(Json(reshaped.into()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/query", get(query_grafana))
}
