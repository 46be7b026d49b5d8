use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value as JsonValue;
use utoipa::OpenApi;

use crate::routes::{downsamplers, health, points};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "tsdb-core", description = "Time-series store API"),
    paths(
        health::healthz_handler,
        points::write_points,
        points::query,
        points::list_metrics,
        downsamplers::list_downsamplers,
        downsamplers::create_downsampler,
        downsamplers::delete_downsampler,
        downsamplers::run_downsampler,
    ),
    components(schemas(
        health::HealthResponse,
        points::WritePoint,
        points::WriteRequest,
        points::WriteResponse,
        points::QueryResponse,
        points::MetricsListResponse,
        downsamplers::DownsamplersResponse,
        downsamplers::DownsampleRunResponse,
        crate::aggregation::Point,
        crate::aggregation::AggregatorSpec,
        crate::services::query::PointsQuery,
        crate::services::downsampler::Downsampler,
        crate::services::downsampler::NewDownsampler,
    )),
    tags(
        (name = "health"),
        (name = "points", description = "Writes and windowed queries"),
        (name = "downsamplers", description = "Continuous downsampling")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> JsonValue {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or(JsonValue::Null)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(|| async { Json(openapi_json()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi_json();
        for path in [
            "/healthz",
            "/api/write",
            "/api/query",
            "/api/metrics",
            "/api/downsamplers",
            "/api/downsamplers/{id}",
            "/api/downsamplers/{id}/run",
        ] {
            assert!(doc["paths"][path].is_object(), "missing {path}");
        }
    }
}
