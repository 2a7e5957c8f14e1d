use crate::errors::ApiError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;
use validator::Validate;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// `303 See Other` to a page under the public directory.
pub fn see_other(location: &str) -> Redirect {
    Redirect::to(location)
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format!("Validation failed: {}", e)))
}

/// Unwraps a JSON body, turning any rejection (bad syntax, wrong shape,
/// missing field, wrong content type) into a 400.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected JSON body");
            Err(ApiError::BadRequest {
                message: rejection.body_text(),
            })
        }
    }
}
