use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::error::map_downsample_error;
use crate::services::downsampler::{DownsampleOutcome, Downsampler, NewDownsampler};
use crate::state::AppState;

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DownsamplersResponse {
    downsamplers: Vec<Downsampler>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DownsampleRunResponse {
    id: i64,
    /// `noSourceData` or `written`.
    status: String,
    upserted: bool,
    inserted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_mark: Option<i64>,
}

impl DownsampleRunResponse {
    fn from_outcome(id: i64, outcome: DownsampleOutcome) -> Self {
        match outcome {
            DownsampleOutcome::NoSourceData => Self {
                id,
                status: "noSourceData".to_string(),
                upserted: false,
                inserted: 0,
                progress_mark: None,
            },
            DownsampleOutcome::Written {
                upserted,
                inserted,
                progress_mark,
            } => Self {
                id,
                status: "written".to_string(),
                upserted,
                inserted,
                progress_mark: Some(progress_mark),
            },
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/downsamplers",
    tag = "downsamplers",
    responses((status = 200, description = "Downsamplers", body = DownsamplersResponse))
)]
pub(crate) async fn list_downsamplers(
    State(state): State<AppState>,
) -> Result<Json<DownsamplersResponse>, (StatusCode, String)> {
    let downsamplers = state
        .downsamplers
        .list()
        .await
        .map_err(map_downsample_error)?;
    Ok(Json(DownsamplersResponse { downsamplers }))
}

#[utoipa::path(
    post,
    path = "/api/downsamplers",
    tag = "downsamplers",
    request_body = NewDownsampler,
    responses(
        (status = 201, description = "Downsampler created", body = Downsampler),
        (status = 400, description = "Invalid downsampler")
    )
)]
pub(crate) async fn create_downsampler(
    State(state): State<AppState>,
    Json(request): Json<NewDownsampler>,
) -> Result<(StatusCode, Json<Downsampler>), (StatusCode, String)> {
    let created = state
        .downsamplers
        .create(request)
        .await
        .map_err(map_downsample_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    delete,
    path = "/api/downsamplers/{id}",
    tag = "downsamplers",
    params(("id" = i64, Path, description = "Downsampler id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub(crate) async fn delete_downsampler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .downsamplers
        .delete(id)
        .await
        .map_err(map_downsample_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/downsamplers/{id}/run",
    tag = "downsamplers",
    params(("id" = i64, Path, description = "Downsampler id")),
    responses(
        (status = 200, description = "Run committed", body = DownsampleRunResponse),
        (status = 404, description = "Not found")
    )
)]
pub(crate) async fn run_downsampler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DownsampleRunResponse>, (StatusCode, String)> {
    let outcome = state
        .downsamplers
        .run_now(id)
        .await
        .map_err(map_downsample_error)?;
    Ok(Json(DownsampleRunResponse::from_outcome(id, outcome)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/downsamplers",
            get(list_downsamplers).post(create_downsampler),
        )
        .route("/downsamplers/{id}", delete(delete_downsampler))
        .route("/downsamplers/{id}/run", post(run_downsampler))
}
