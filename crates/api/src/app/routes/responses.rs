use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::Value as JsonValue;
use tracing::warn;

use cloudwatcher_core::DeviceResponse;

use crate::app::dto::{ListQuery, parse_payload};
use crate::app::errors::failure_to_response;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:device_id", get(list_responses)).route(
        "/:device_id/:request_id",
        post(upload_response).get(get_response).delete(delete_response),
    )
}

/// POST /api/v2/responses/:device_id/:request_id
///
/// Stores the response, then tells the device it is ready. If the upload fails
/// the device gets an `error` notification instead.
pub async fn upload_response(
    Extension(services): Extension<Arc<AppServices>>,
    Path((device_id, request_id)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    let response: DeviceResponse = match parse_payload(&body, "Response") {
        Ok(response) => response,
        Err(rejection) => return rejection,
    };
    match services
        .transfer
        .upload_response(&device_id, &request_id, &response)
        .await
    {
        Ok(receipt) => {
            services
                .router
                .notify_response_ready(&device_id, &request_id, body)
                .await;
            (StatusCode::CREATED, Json(receipt)).into_response()
        }
        Err(failure) => {
            if !failure.is_validation() {
                warn!(device_id = %device_id, request_id = %request_id, error = %failure, "response upload failed");
                services
                    .router
                    .notify_error(&device_id, &request_id, "RESPONSE_UPLOAD_FAILED", failure.message())
                    .await;
            }
            failure_to_response(&failure)
        }
    }
}

/// GET /api/v2/responses/:device_id/:request_id
pub async fn get_response(
    Extension(services): Extension<Arc<AppServices>>,
    Path((device_id, request_id)): Path<(String, String)>,
) -> axum::response::Response {
    match services.transfer.download_response(&device_id, &request_id).await {
        Ok(response) => Json(response).into_response(),
        Err(failure) => failure_to_response(&failure),
    }
}

/// DELETE /api/v2/responses/:device_id/:request_id
pub async fn delete_response(
    Extension(services): Extension<Arc<AppServices>>,
    Path((device_id, request_id)): Path<(String, String)>,
) -> axum::response::Response {
    match services.transfer.delete_response(&device_id, &request_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_to_response(&failure),
    }
}

/// GET /api/v2/responses/:device_id?pattern=*.json
pub async fn list_responses(
    Extension(services): Extension<Arc<AppServices>>,
    Path(device_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    match services
        .transfer
        .list_responses(&device_id, query.pattern.as_deref())
        .await
    {
        Ok(files) => Json(files).into_response(),
        Err(failure) => failure_to_response(&failure),
    }
}
