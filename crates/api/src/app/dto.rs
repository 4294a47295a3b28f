use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::app::errors::json_error;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    #[serde(default)]
    pub details: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub pattern: Option<String>,
}

/// Read a device payload body. `null` and bodies that do not fit the payload
/// shape are rejected with 400 before anything is stored.
pub fn parse_payload<T>(body: &JsonValue, noun: &str) -> Result<T, axum::response::Response>
where
    T: DeserializeOwned,
{
    if body.is_null() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("{noun} object cannot be null"),
        ));
    }
    T::deserialize(body).map_err(|e| {
        json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("invalid {} payload: {e}", noun.to_lowercase()),
        )
    })
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct SocketHealth {
    pub status: &'static str,
    pub connected_devices: usize,
    pub total_connections: usize,
    pub device_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
