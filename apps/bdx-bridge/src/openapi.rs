use utoipa::OpenApi;

use crate::error::ErrorBody;
use crate::routes::root::{HealthResponse, RootResponse};
use crate::services::reshape::{NoDataBody, ReshapedSeries};

#[derive(OpenApi)]
#[openapi(
    info(title = "BDX API for Grafana"),
    paths(
        crate::routes::root::root_handler,
        crate::routes::root::healthz_handler,
        crate::routes::query::query_grafana
    ),
    components(schemas(
        ErrorBody,
        HealthResponse,
        NoDataBody,
        ReshapedSeries,
        RootResponse
    )),
    tags((name = "grafana", description = "Grafana JSON datasource endpoints"))
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or(serde_json::Value::Null)
}
