use axum::http::StatusCode;
use std::fmt::Display;

use crate::services::dispatcher::DispatchError;
use crate::services::downsampler::DownsampleError;
use crate::services::query::QueryError;

pub fn internal_error(err: impl Display) -> (StatusCode, String) {
    tracing::error!(error = %err, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

pub fn map_store_error(err: rusqlite::Error) -> (StatusCode, String) {
    let status = match &err {
        rusqlite::Error::QueryReturnedNoRows => StatusCode::NOT_FOUND,
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            rusqlite::ErrorCode::ConstraintViolation => StatusCode::BAD_REQUEST,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    tracing::error!(error = %err, status = %status, "store error");

    let message = match status {
        StatusCode::NOT_FOUND => "Resource not found",
        StatusCode::BAD_REQUEST => "Invalid request",
        StatusCode::SERVICE_UNAVAILABLE => "Store is busy",
        _ => "Store error",
    };

    (status, message.to_string())
}

pub fn map_dispatch_error(err: DispatchError) -> (StatusCode, String) {
    match err {
        DispatchError::Closed => {
            tracing::warn!("request arrived after store shutdown");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Store is shutting down".to_string(),
            )
        }
        other => internal_error(other),
    }
}

pub fn map_query_error(err: QueryError) -> (StatusCode, String) {
    match err {
        QueryError::Invalid(message) => (StatusCode::BAD_REQUEST, message),
        QueryError::Aggregation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
        QueryError::Store(err) => map_store_error(err),
        QueryError::Dispatch(err) => map_dispatch_error(err),
    }
}

pub fn map_downsample_error(err: DownsampleError) -> (StatusCode, String) {
    match err {
        DownsampleError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            format!("Downsampler {id} not found"),
        ),
        DownsampleError::Invalid(message) => (StatusCode::BAD_REQUEST, message),
        DownsampleError::Aggregation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
        DownsampleError::Store(err) => map_store_error(err),
        DownsampleError::Dispatch(err) => map_dispatch_error(err),
        DownsampleError::Corrupt(err) => internal_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregationError;

    #[test]
    fn validation_errors_are_client_errors() {
        let (status, message) = map_query_error(QueryError::Aggregation(
            AggregationError::WindowRequired { aggregator: "mean" },
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("mean"));

        let (status, _) = map_downsample_error(DownsampleError::Invalid("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn closed_dispatcher_is_unavailable() {
        let (status, _) = map_query_error(QueryError::Dispatch(DispatchError::Closed));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn missing_rows_map_to_not_found() {
        let (status, message) = map_store_error(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "Resource not found");
    }
}
