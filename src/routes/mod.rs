pub mod downsamplers;
pub mod health;
pub mod points;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .merge(points::router())
                .merge(downsamplers::router())
                .merge(crate::openapi::router()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value as JsonValue};
    use tower::ServiceExt;

    const MINUTE: i64 = 60_000_000_000;

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<JsonValue>,
    ) -> (StatusCode, JsonValue) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
        (status, value)
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let app = router(crate::test_support::test_state());
        let (status, body) = call(&app, "GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn write_then_query_with_window_and_fill() {
        let app = router(crate::test_support::test_state());
        let (status, body) = call(
            &app,
            "POST",
            "/api/write",
            Some(json!({
                "metric": "temp",
                "tags": { "room": "lab" },
                "points": [
                    { "value": 1.0, "timestamp": 0 },
                    { "value": 3.0, "timestamp": 10 },
                    { "value": 9.0, "timestamp": 2 * MINUTE },
                ],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["written"], 3);

        let (status, body) = call(
            &app,
            "POST",
            "/api/query",
            Some(json!({
                "metric": "temp",
                "start": 0,
                "end": 2 * MINUTE,
                "tags": { "room": "lab" },
                "window": { "every": "1m", "fillGaps": true, "fillValue": -1 },
                "aggregators": [{ "name": "max" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let points = body["points"].as_array().expect("points");
        let values: Vec<f64> = points.iter().map(|p| p["value"].as_f64().unwrap()).collect();
        assert_eq!(values, vec![3.0, -1.0, 9.0]);
        assert_eq!(points[1]["filled"], true);
        assert!(points.iter().all(|p| p["window"] == 0));

        let (status, body) = call(&app, "GET", "/api/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metrics"], json!(["temp"]));
    }

    #[tokio::test]
    async fn query_validation_errors_are_bad_requests() {
        let app = router(crate::test_support::test_state());
        let (status, _) = call(
            &app,
            "POST",
            "/api/query",
            Some(json!({ "metric": "temp", "start": 0, "aggregators": [{ "name": "mean" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "POST", "/api/query", Some(json!({ "metric": "temp" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn downsampler_lifecycle() {
        let app = router(crate::test_support::test_state());
        call(
            &app,
            "POST",
            "/api/write",
            Some(json!({
                "metric": "cpu",
                "points": [
                    { "value": 2.0, "timestamp": MINUTE },
                    { "value": 4.0, "timestamp": MINUTE + 5 },
                ],
            })),
        )
        .await;

        let (status, created) = call(
            &app,
            "POST",
            "/api/downsamplers",
            Some(json!({
                "sourceMetric": "cpu",
                "outMetric": "cpu_1m",
                "window": { "every": "1m" },
                "aggregators": [{ "name": "sum" }],
                "runEvery": "1m",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().expect("id");
        assert!(created["lastProgressMark"].is_null());

        let (status, run) = call(&app, "POST", &format!("/api/downsamplers/{id}/run"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["status"], "written");
        assert_eq!(run["inserted"], 1);
        assert_eq!(run["progressMark"], MINUTE);

        let (_, list) = call(&app, "GET", "/api/downsamplers", None).await;
        assert_eq!(list["downsamplers"][0]["lastProgressMark"], MINUTE);

        let (status, _) = call(&app, "DELETE", &format!("/api/downsamplers/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "POST", &format!("/api/downsamplers/{id}/run"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_downsampler_is_rejected() {
        let app = router(crate::test_support::test_state());
        let (status, _) = call(
            &app,
            "POST",
            "/api/downsamplers",
            Some(json!({
                "sourceMetric": "cpu",
                "outMetric": "cpu_1m",
                "window": { "every": "1m" },
                "aggregators": [{ "name": "stddev", "options": { "mode": "both" } }],
                "runEvery": "1m",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unbounded_gap_fill_is_a_bad_request() {
        let app = router(crate::test_support::test_state());
        let (status, _) = call(
            &app,
            "POST",
            "/api/query",
            Some(json!({
                "metric": "temp",
                "start": 0,
                "window": { "every": "1s", "fillGaps": true, "fillValue": 0 },
                "aggregators": [{ "name": "mean" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn quoted_tag_keys_are_bad_requests_everywhere() {
        let app = router(crate::test_support::test_state());
        let tags = json!({ "ro\"om": "lab" });

        let (status, _) = call(
            &app,
            "POST",
            "/api/write",
            Some(json!({ "metric": "temp", "tags": tags, "points": [{ "value": 1.0 }] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/api/query",
            Some(json!({ "metric": "temp", "start": 0, "end": 10, "tags": tags })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/api/downsamplers",
            Some(json!({
                "sourceMetric": "temp",
                "outMetric": "temp_1m",
                "tags": tags,
                "window": { "every": "1m" },
                "aggregators": [{ "name": "mean" }],
                "runEvery": "1m",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, list) = call(&app, "GET", "/api/downsamplers", None).await;
        assert_eq!(list["downsamplers"], json!([]));
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = router(crate::test_support::test_state());
        let (status, body) = call(&app, "GET", "/api/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/query"].is_object());
    }
}
