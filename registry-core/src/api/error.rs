//! HTTP-facing error mapping (spec §6.2/§7): the only place in this crate
//! that turns an engine-internal [`crate::error::Error`] kind into a
//! status code and a Confluent-style numeric `error_code`, mirroring the
//! way the teacher's `api/routes.rs` converts `crate::Error` into a
//! `StatusCode` at the handler boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: i32,
    pub message: String,
}

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

fn not_found_code(message: &str) -> i32 {
    if message.contains("schema not found") || message.contains("no matching schema") {
        40403
    } else if message.contains("version not found") {
        40402
    } else {
        40401
    }
}

fn invalid_code(message: &str) -> i32 {
    if message.contains("compatibility") {
        42203
    } else if message.contains("mode") {
        42204
    } else if message.contains("context name") {
        42210
    } else if message.contains("schema type") || message.contains("version") {
        42202
    } else {
        42201
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self.0 {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, not_found_code(&msg), msg),
            Error::Invalid(msg) => (StatusCode::UNPROCESSABLE_ENTITY, invalid_code(&msg), msg),
            Error::Incompatible { messages } => {
                (StatusCode::CONFLICT, 409, messages.join("; "))
            }
            Error::Conflict(msg) => (StatusCode::CONFLICT, 409, msg),
            Error::AlreadyExists(msg) => (StatusCode::CONFLICT, 409, msg),
            Error::PreconditionFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, 422, msg),
            Error::StorageFailure(msg) => {
                tracing::error!(target: "registry::storage", "{msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    50002,
                    "internal storage error".to_string(),
                )
            }
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 401, msg),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, 403, msg),
        };

        (status, Json(ErrorBody { error_code, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_not_found_maps_to_40401() {
        assert_eq!(not_found_code("subject not found: orders-value"), 40401);
    }

    #[test]
    fn version_not_found_maps_to_40402() {
        assert_eq!(not_found_code("version not found: orders-value/3"), 40402);
    }

    #[test]
    fn schema_not_found_maps_to_40403() {
        assert_eq!(not_found_code("schema not found"), 40403);
        assert_eq!(not_found_code("no matching schema for subject 's'"), 40403);
    }

    #[test]
    fn bad_compatibility_level_maps_to_42203() {
        assert_eq!(invalid_code("unknown compatibility level: BOGUS"), 42203);
    }

    #[test]
    fn bad_context_name_maps_to_42210() {
        assert_eq!(invalid_code("invalid context name: has space"), 42210);
    }
}
