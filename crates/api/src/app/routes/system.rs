use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::app::dto::{DeliveryReport, SocketHealth};
use crate::app::errors::json_error;
use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /health/storage
pub async fn storage_health(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let health = services.transfer.storage_health().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

/// GET /ws/health
pub async fn socket_health(Extension(services): Extension<Arc<AppServices>>) -> Json<SocketHealth> {
    let device_ids: Vec<String> = services
        .registry
        .connected_device_ids()
        .into_iter()
        .map(String::from)
        .collect();

    Json(SocketHealth {
        status: "healthy",
        connected_devices: device_ids.len(),
        total_connections: services.registry.total_connection_count(),
        device_ids,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub message_type: String,
    #[serde(default)]
    pub data: Option<JsonValue>,
}

/// POST /api/v2/broadcast
pub async fn broadcast(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<BroadcastRequest>,
) -> axum::response::Response {
    if body.message_type.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "message_type cannot be empty",
        );
    }

    let delivered = services
        .router
        .broadcast_to_all(&body.message_type, body.data)
        .await;
    Json(DeliveryReport { delivered }).into_response()
}
