use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::aggregation::{validate_tags, Point, Tags};
use crate::error::map_query_error;
use crate::services::query::{query_points, PointsQuery, QueryError};
use crate::state::AppState;
use crate::store;
use crate::time::now_nanos;

const MAX_WRITE_POINTS: usize = 100_000;

#[derive(Debug, Clone, serde::Deserialize, utoipa::ToSchema)]
pub(crate) struct WritePoint {
    value: f64,
    /// Nanoseconds since the epoch; defaults to the time of the request.
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Clone, serde::Deserialize, utoipa::ToSchema)]
pub(crate) struct WriteRequest {
    metric: String,
    #[serde(default)]
    tags: Tags,
    points: Vec<WritePoint>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct WriteResponse {
    written: usize,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct QueryResponse {
    metric: String,
    points: Vec<Point>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct MetricsListResponse {
    metrics: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/api/write",
    tag = "points",
    request_body = WriteRequest,
    responses(
        (status = 200, description = "Points written", body = WriteResponse),
        (status = 400, description = "Invalid request")
    )
)]
pub(crate) async fn write_points(
    State(state): State<AppState>,
    Json(request): Json<WriteRequest>,
) -> Result<Json<WriteResponse>, (StatusCode, String)> {
    let metric = request.metric.trim().to_string();
    if metric.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "metric is required".to_string()));
    }
    if request.points.len() > MAX_WRITE_POINTS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("at most {MAX_WRITE_POINTS} points per write"),
        ));
    }
    validate_tags(&request.tags).map_err(|err| map_query_error(err.into()))?;

    let now = now_nanos();
    let mut points: Vec<Point> = request
        .points
        .iter()
        .map(|p| Point::new(p.timestamp.unwrap_or(now), p.value))
        .collect();
    points.sort_by_key(|p| p.timestamp);

    let tags = request.tags;
    let written = state
        .store
        .submit(state.config.query_priority, move |conn| {
            let tx = conn.transaction()?;
            let written = store::insert_points(&tx, &metric, &tags, &points)?;
            tx.commit()?;
            Ok::<_, QueryError>(written)
        })
        .await
        .map_err(map_query_error)?;

    Ok(Json(WriteResponse { written }))
}

#[utoipa::path(
    post,
    path = "/api/query",
    tag = "points",
    request_body = PointsQuery,
    responses(
        (status = 200, description = "Windowed and aggregated points", body = QueryResponse),
        (status = 400, description = "Invalid query")
    )
)]
pub(crate) async fn query(
    State(state): State<AppState>,
    Json(query): Json<PointsQuery>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let points = query_points(&state.store, state.config.query_priority, &query, now_nanos())
        .await
        .map_err(map_query_error)?;
    Ok(Json(QueryResponse {
        metric: query.metric.trim().to_string(),
        points,
    }))
}

#[utoipa::path(
    get,
    path = "/api/metrics",
    tag = "points",
    responses((status = 200, description = "Metric names", body = MetricsListResponse))
)]
pub(crate) async fn list_metrics(
    State(state): State<AppState>,
) -> Result<Json<MetricsListResponse>, (StatusCode, String)> {
    let metrics = state
        .store
        .submit(state.config.query_priority, |conn| {
            store::list_metrics(conn).map_err(QueryError::from)
        })
        .await
        .map_err(map_query_error)?;
    Ok(Json(MetricsListResponse { metrics }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/write", post(write_points))
        .route("/query", post(query))
        .route("/metrics", get(list_metrics))
}

