use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use docreviews_storage::Database;

use crate::problem::ApiError;
use crate::{doctors, reviews, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database) -> Self {
        Self { metrics, storage }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route(
            "/doctors",
            get(doctors::list).post(doctors::create),
        )
        .route(
            "/doctors/:id",
            get(doctors::fetch)
                .patch(doctors::update)
                .delete(doctors::delete),
        )
        .route(
            "/doctors/:doctor_id/reviews/:review_id",
            get(reviews::fetch_for_doctor),
        )
        .route(
            "/reviews",
            get(reviews::list).post(reviews::create),
        )
        .route(
            "/reviews/:id",
            get(reviews::fetch)
                .patch(reviews::update)
                .delete(reviews::delete),
        )
        .route_layer(middleware::from_fn(telemetry::track_requests))
        .fallback(not_found)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Try /doctors or /reviews" }))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
}

async fn not_found() -> Response {
    ApiError::not_found().into_response()
}
