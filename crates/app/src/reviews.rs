use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use docreviews_core::{NewReview, Review, ReviewUpdate};
use docreviews_storage::StoreError;

use crate::payload::{
    ensure_only, integer_field, missing_fields, parse_non_empty_object, parse_object,
    string_field, EntityPath,
};
use crate::problem::ApiError;
use crate::router::AppState;
use crate::telemetry;

const REQUIRED_ON_CREATE: [&str; 2] = ["description", "doctor_id"];

#[derive(Debug, Serialize)]
pub struct ReviewList {
    reviews: Vec<Review>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<ReviewList>, ApiError> {
    let reviews = state.storage().reviews().list().await?;
    Ok(Json(ReviewList { reviews }))
}

/// Missing reviews answer `201 {}` rather than 404.
pub async fn fetch(
    State(state): State<AppState>,
    EntityPath(id): EntityPath<i64>,
) -> Result<Response, ApiError> {
    Ok(found_or_empty(state.storage().reviews().fetch(id).await?))
}

/// Looks up a review through its doctor; a review owned by a different doctor
/// is rejected.
pub async fn fetch_for_doctor(
    State(state): State<AppState>,
    EntityPath((doctor_id, review_id)): EntityPath<(i64, i64)>,
) -> Result<Response, ApiError> {
    let review = state
        .storage()
        .reviews()
        .fetch_for_doctor(doctor_id, review_id)
        .await
        .inspect_err(|err| {
            if matches!(err, StoreError::Mismatch { .. }) {
                warn!(stage = "api", doctor_id, review_id, "review requested under another doctor");
            }
        })?;
    Ok(found_or_empty(review))
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let object = parse_non_empty_object(&headers, &body)?;
    let missing = missing_fields(&object, &REQUIRED_ON_CREATE);
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Required: {}",
            missing.join(", ")
        )));
    }

    let description = string_field(&object, "description")?.unwrap_or_default();
    let doctor_id = integer_field(&object, "doctor_id")?
        .ok_or_else(|| ApiError::bad_request("'doctor_id' must be an integer"))?;

    let review = state
        .storage()
        .reviews()
        .create(&NewReview::new(description, doctor_id)?)
        .await?;
    telemetry::record_write("review", "create");
    info!(stage = "api", review_id = review.id, doctor_id, "review created");

    Ok((StatusCode::CREATED, Json(review)).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    EntityPath(id): EntityPath<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let reviews = state.storage().reviews();
    if reviews.fetch(id).await?.is_none() {
        return Err(StoreError::ReviewNotFound(id).into());
    }

    let object = parse_object(&headers, &body)?;
    ensure_only(
        &object,
        "description",
        "Only review description can be modified",
    )?;
    let update = ReviewUpdate {
        description: string_field(&object, "description")?,
    };

    let review = reviews.update(id, update).await?;
    telemetry::record_write("review", "update");
    info!(stage = "api", review_id = id, "review updated");

    Ok((StatusCode::CREATED, Json(review)).into_response())
}

/// Deleting an absent review is a no-op that still answers 204.
pub async fn delete(
    State(state): State<AppState>,
    EntityPath(id): EntityPath<i64>,
) -> Result<StatusCode, ApiError> {
    if state.storage().reviews().delete(id).await? {
        telemetry::record_write("review", "delete");
        info!(stage = "api", review_id = id, "review deleted");
    }
    Ok(StatusCode::NO_CONTENT)
}

fn found_or_empty(review: Option<Review>) -> Response {
    match review {
        Some(review) => (StatusCode::CREATED, Json(review)).into_response(),
        None => (StatusCode::CREATED, Json(json!({}))).into_response(),
    }
}
