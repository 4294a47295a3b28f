use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::Value as JsonValue;

use cloudwatcher_core::{DeviceId, DeviceRequest, RequestId};

use crate::app::dto::{DeliveryReport, ListQuery, StatusUpdateRequest, parse_payload};
use crate::app::errors::{domain_error_to_response, failure_to_response, json_error};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/:device_id", get(list_requests))
        .route(
            "/:device_id/:request_id",
            post(upload_request).get(get_request).delete(delete_request),
        )
        .route("/:device_id/:request_id/status", post(update_status))
}

/// POST /api/v2/requests/:device_id/:request_id
pub async fn upload_request(
    Extension(services): Extension<Arc<AppServices>>,
    Path((device_id, request_id)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    let request: DeviceRequest = match parse_payload(&body, "Request") {
        Ok(request) => request,
        Err(response) => return response,
    };
    match services
        .transfer
        .upload_request(&device_id, &request_id, &request)
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(failure) => failure_to_response(&failure),
    }
}

/// GET /api/v2/requests/:device_id/:request_id
pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Path((device_id, request_id)): Path<(String, String)>,
) -> axum::response::Response {
    match services.transfer.download_request(&device_id, &request_id).await {
        Ok(request) => Json(request).into_response(),
        Err(failure) => failure_to_response(&failure),
    }
}

/// DELETE /api/v2/requests/:device_id/:request_id
pub async fn delete_request(
    Extension(services): Extension<Arc<AppServices>>,
    Path((device_id, request_id)): Path<(String, String)>,
) -> axum::response::Response {
    match services.transfer.delete_request(&device_id, &request_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(failure) => failure_to_response(&failure),
    }
}

/// GET /api/v2/requests/:device_id?pattern=*.json
pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Path(device_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    match services
        .transfer
        .list_requests(&device_id, query.pattern.as_deref())
        .await
    {
        Ok(files) => Json(files).into_response(),
        Err(failure) => failure_to_response(&failure),
    }
}

/// POST /api/v2/requests/:device_id/:request_id/status
///
/// Pushes a `request_update` to the device. Succeeds whether or not any
/// connection received it.
pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path((device_id, request_id)): Path<(String, String)>,
    Json(body): Json<StatusUpdateRequest>,
) -> axum::response::Response {
    if let Err(e) = DeviceId::parse(device_id.as_str()).and_then(|_| RequestId::parse(request_id.as_str())) {
        return domain_error_to_response(e);
    }
    if body.status.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "status cannot be empty");
    }

    let delivered = services
        .router
        .notify_request_status_change(&device_id, &request_id, &body.status, body.details)
        .await;
    Json(DeliveryReport { delivered }).into_response()
}
