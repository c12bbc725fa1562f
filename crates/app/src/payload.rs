//! Request shape checks shared by the doctor and review handlers.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::{header, request::Parts, HeaderMap},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::problem::ApiError;

pub type JsonObject = Map<String, Value>;

const BODY_REQUIRED: &str = "request body must be a JSON object";

/// Typed path parameters. Segments that fail to parse are reported as 404,
/// matching the behaviour of integer-typed routes.
pub struct EntityPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for EntityPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::not_found())?;
        Ok(Self(value))
    }
}

/// Accepts `application/json` and `+json` media types, ignoring parameters.
fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Parses a request body that must be a JSON object sent with a JSON content type.
pub fn parse_object(headers: &HeaderMap, body: &[u8]) -> Result<JsonObject, ApiError> {
    if !is_json_content_type(headers) {
        return Err(ApiError::bad_request(BODY_REQUIRED));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ApiError::bad_request(BODY_REQUIRED)),
    }
}

/// Like [`parse_object`] but also rejects `{}`; creation requests need content.
pub fn parse_non_empty_object(headers: &HeaderMap, body: &[u8]) -> Result<JsonObject, ApiError> {
    let object = parse_object(headers, body)?;
    if object.is_empty() {
        return Err(ApiError::bad_request(BODY_REQUIRED));
    }
    Ok(object)
}

/// Rejects the body if it carries any field other than `allowed`.
pub fn ensure_only(object: &JsonObject, allowed: &str, message: &str) -> Result<(), ApiError> {
    if object.keys().any(|key| key != allowed) {
        return Err(ApiError::bad_request(message));
    }
    Ok(())
}

/// Returns the required fields absent from the body, in the order given.
pub fn missing_fields<'a>(object: &JsonObject, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect()
}

/// Reads an optional string field. `null` reads as the empty string so the
/// domain validators report it as a missing value.
pub fn string_field(object: &JsonObject, field: &str) -> Result<Option<String>, ApiError> {
    match object.get(field) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(String::new())),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ApiError::bad_request(format!("'{field}' must be a string"))),
    }
}

/// Reads an optional integer field. `null` is treated as absent.
pub fn integer_field(object: &JsonObject, field: &str) -> Result<Option<i64>, ApiError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("'{field}' must be an integer"))),
    }
}
