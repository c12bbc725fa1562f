use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use docreviews_core::{Doctor, DoctorUpdate, NewDoctor};
use docreviews_storage::StoreError;

use crate::payload::{
    ensure_only, integer_field, parse_non_empty_object, parse_object, string_field, EntityPath,
};
use crate::problem::ApiError;
use crate::router::AppState;
use crate::telemetry;

#[derive(Debug, Serialize)]
pub struct DoctorList {
    doctors: Vec<Doctor>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<DoctorList>, ApiError> {
    let doctors = state.storage().doctors().list().await?;
    Ok(Json(DoctorList { doctors }))
}

/// Missing doctors answer `201 {}` rather than 404.
pub async fn fetch(
    State(state): State<AppState>,
    EntityPath(id): EntityPath<i64>,
) -> Result<Response, ApiError> {
    match state.storage().doctors().fetch(id).await? {
        Some(doctor) => Ok((StatusCode::CREATED, Json(doctor)).into_response()),
        None => Ok((StatusCode::CREATED, Json(json!({}))).into_response()),
    }
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let object = parse_non_empty_object(&headers, &body)?;
    let name = string_field(&object, "name")?
        .ok_or_else(|| ApiError::bad_request("'name' is required"))?;

    let mut new_doctor = NewDoctor::new(name)?;
    // An id of 0 asks for a generated one.
    if let Some(id) = integer_field(&object, "id")?.filter(|id| *id != 0) {
        new_doctor = new_doctor.with_id(id);
    }

    let doctor = state.storage().doctors().create(&new_doctor).await?;
    telemetry::record_write("doctor", "create");
    info!(stage = "api", doctor_id = doctor.id, "doctor created");

    Ok((StatusCode::CREATED, Json(doctor)).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    EntityPath(id): EntityPath<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let doctors = state.storage().doctors();
    if doctors.fetch(id).await?.is_none() {
        return Err(StoreError::DoctorNotFound(id).into());
    }

    let object = parse_object(&headers, &body)?;
    ensure_only(&object, "name", "Only doctor name can be modified")?;
    let update = DoctorUpdate {
        name: string_field(&object, "name")?,
    };

    let doctor = doctors.update(id, update).await?;
    telemetry::record_write("doctor", "update");
    info!(stage = "api", doctor_id = id, "doctor updated");

    Ok((StatusCode::CREATED, Json(doctor)).into_response())
}

/// Deleting an absent doctor is a no-op that still answers 204.
pub async fn delete(
    State(state): State<AppState>,
    EntityPath(id): EntityPath<i64>,
) -> Result<StatusCode, ApiError> {
    let outcome = state.storage().doctors().delete(id).await?;
    if outcome.deleted {
        telemetry::record_write("doctor", "delete");
        info!(
            stage = "api",
            doctor_id = id,
            reviews_deleted = outcome.reviews_deleted,
            "doctor deleted"
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::router::app_router;
    use crate::test_support::{seeded_state, send, send_raw, send_with_content_type};

    #[tokio::test]
    async fn add_doctor_returns_generated_id() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(
            app.clone(),
            "POST",
            "/doctors",
            Some(json!({"name": "Doctor Doolittle"})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Doctor Doolittle");
        assert_eq!(body["id"], 3);
        assert_eq!(body["reviews"], json!([]));

        let (status, fetched) = send(app, "GET", "/doctors/3", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(fetched, body);
    }

    #[tokio::test]
    async fn add_doctor_accepts_explicit_id() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(
            app.clone(),
            "POST",
            "/doctors",
            Some(json!({"name": "Doctor Octopus", "id": 40})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 40);

        let (status, body) = send(
            app,
            "POST",
            "/doctors",
            Some(json!({"name": "Doctor Faustus", "id": 40})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Doctor already exists with id: 40");
    }

    #[tokio::test]
    async fn add_doctor_with_zero_id_gets_generated_id() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(
            app,
            "POST",
            "/doctors",
            Some(json!({"name": "Zero", "id": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 3);
        assert_eq!(body["name"], "Zero");
    }

    #[tokio::test]
    async fn post_bad_doctor_requires_name() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(
            app,
            "POST",
            "/doctors",
            Some(json!({"doctor_name": "Doctor Doolittle"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "'name' is required");
    }

    #[tokio::test]
    async fn post_doctor_rejects_empty_name() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(app.clone(), "POST", "/doctors", Some(json!({"name": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Name must not be null");

        let (status, body) = send(app, "POST", "/doctors", Some(json!({"name": null}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Name must not be null");
    }

    #[tokio::test]
    async fn post_doctor_rejects_missing_or_malformed_body() {
        let app = app_router(seeded_state().await);
        for raw in ["", "{}", "not json", "[]"] {
            let (status, body) = send_raw(app.clone(), "POST", "/doctors", raw).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {raw:?}");
            assert_eq!(body["message"], "request body must be a JSON object");
        }
    }

    #[tokio::test]
    async fn doctor_writes_require_json_content_type() {
        let app = app_router(seeded_state().await);
        let (status, body) = send_with_content_type(
            app.clone(),
            "POST",
            "/doctors",
            "text/plain",
            r#"{"name": "Doctor Zhivago"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "request body must be a JSON object");

        let (status, body) = send_with_content_type(
            app.clone(),
            "PATCH",
            "/doctors/2",
            "text/plain",
            r#"{"name": "Doctor Zhivago"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "request body must be a JSON object");

        let (_, body) = send(app, "GET", "/doctors", None).await;
        let doctors = body["doctors"].as_array().expect("doctors array");
        assert_eq!(doctors.len(), 2);
        assert_eq!(doctors[1]["name"], "Doctor Who");
    }

    #[tokio::test]
    async fn get_doctor_includes_reviews() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(app, "GET", "/doctors/1", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Doctor Strange");
        assert_eq!(body["id"], 1);
        assert_eq!(body["reviews"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            body["reviews"][0],
            json!({"id": 1, "description": "A nice but strange doctor"})
        );
    }

    #[tokio::test]
    async fn get_missing_doctor_is_empty_object() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(app, "GET", "/doctors/404", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn non_integer_id_is_not_found() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(app, "GET", "/doctors/strange", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Not Found");
    }

    #[tokio::test]
    async fn get_all_doctors() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(app, "GET", "/doctors", None).await;
        assert_eq!(status, StatusCode::OK);
        let doctors = body["doctors"].as_array().expect("doctors array");
        assert_eq!(doctors.len(), 2);
        assert!(doctors.iter().all(|doctor| doctor.get("reviews").is_some()));
    }

    #[tokio::test]
    async fn patch_doctor_updates_name() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(
            app,
            "PATCH",
            "/doctors/1",
            Some(json!({"name": "Doctor Strangelove"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Doctor Strangelove");
        assert_eq!(body["reviews"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn patch_doctor_rejects_other_fields() {
        let app = app_router(seeded_state().await);
        for payload in [json!({"id": 9}), json!({"name": "Doctor Who?", "id": 9})] {
            let (status, body) = send(app.clone(), "PATCH", "/doctors/2", Some(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["message"], "Only doctor name can be modified");
        }

        let (_, body) = send(app, "GET", "/doctors/2", None).await;
        assert_eq!(body["name"], "Doctor Who");
    }

    #[tokio::test]
    async fn patch_doctor_validates_name_and_id() {
        let app = app_router(seeded_state().await);
        let (status, body) =
            send(app.clone(), "PATCH", "/doctors/1", Some(json!({"name": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Name must not be null");

        let (status, body) = send(
            app.clone(),
            "PATCH",
            "/doctors/99",
            Some(json!({"name": "Doctor Nobody"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No doctor found with id: 99");

        let (status, body) = send(app, "PATCH", "/doctors/1", Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Doctor Strange");
    }

    #[tokio::test]
    async fn delete_doctor_cascades_reviews() {
        let app = app_router(seeded_state().await);
        let (status, body) = send(app.clone(), "DELETE", "/doctors/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (_, body) = send(app.clone(), "GET", "/doctors/1", None).await;
        assert_eq!(body, json!({}));
        let (_, body) = send(app.clone(), "GET", "/reviews", None).await;
        assert_eq!(body["reviews"], json!([]));

        let (status, _) = send(app, "DELETE", "/doctors/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
