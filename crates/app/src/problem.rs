use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use docreviews_core::ValidationError;
use docreviews_storage::StoreError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// Client-facing failure rendered as `{"message": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[cfg(test)]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(source) => {
                error!(stage = "storage", error = %source, "entity store query failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
            StoreError::DuplicateDoctor(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            StoreError::Validation(_)
            | StoreError::UnknownDoctor(_)
            | StoreError::Mismatch { .. }
            | StoreError::DoctorNotFound(_)
            | StoreError::ReviewNotFound(_) => Self::bad_request(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = Json(ErrorBody {
            message: self.message,
        })
        .into_response();
        *response.status_mut() = self.status;
        response
    }
}
