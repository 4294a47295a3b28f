use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use cloudwatcher_core::{DomainError, FailureKind, OperationFailure};

/// Map a failed storage operation onto an HTTP response.
pub fn failure_to_response(failure: &OperationFailure) -> axum::response::Response {
    match failure.kind() {
        FailureKind::Validation => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", failure.message())
        }
        FailureKind::Permanent if failure.is_not_found() => {
            json_error(StatusCode::NOT_FOUND, "not_found", failure.message())
        }
        FailureKind::Permanent => {
            json_error(StatusCode::BAD_GATEWAY, "storage_error", failure.message())
        }
        FailureKind::Transient => {
            json_error(StatusCode::BAD_GATEWAY, "storage_unavailable", failure.message())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        other => json_error(StatusCode::BAD_REQUEST, "validation_error", other.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
