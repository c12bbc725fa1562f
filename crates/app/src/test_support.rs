use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use docreviews_core::{NewDoctor, NewReview};
use docreviews_storage::Database;

use crate::router::AppState;
use crate::telemetry;

/// Fresh in-memory database with no rows.
pub async fn setup_state() -> AppState {
    let metrics = telemetry::init_metrics().expect("metrics init");
    let database = Database::connect("sqlite::memory:")
        .await
        .expect("connect");
    database.run_migrations().await.expect("migrations");
    AppState::new(metrics, database)
}

/// Two doctors: "Doctor Strange" (id 1) with two reviews, "Doctor Who" (id 2) with none.
pub async fn seeded_state() -> AppState {
    let state = setup_state().await;
    let doctors = state.storage().doctors();
    doctors
        .create(&NewDoctor::new("Doctor Strange").unwrap().with_id(1))
        .await
        .expect("doctor 1");
    doctors
        .create(&NewDoctor::new("Doctor Who").unwrap().with_id(2))
        .await
        .expect("doctor 2");

    let reviews = state.storage().reviews();
    reviews
        .create(&NewReview::new("A nice but strange doctor", 1).unwrap())
        .await
        .expect("review 1");
    reviews
        .create(&NewReview::new("Cured me of everything, A++", 1).unwrap())
        .await
        .expect("review 2");
    state
}

pub async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map(|value| value.to_string()).unwrap_or_default();
    send_raw(app, method, uri, &body).await
}

/// Sends `body` verbatim with a JSON content type and decodes the reply; an
/// empty reply decodes as `Value::Null`.
pub async fn send_raw(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    send_with_content_type(app, method, uri, "application/json", body).await
}

pub async fn send_with_content_type(
    app: Router,
    method: &str,
    uri: &str,
    content_type: &str,
    body: &str,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.expect("handler should respond");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should read")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}
