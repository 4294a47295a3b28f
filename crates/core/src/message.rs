//! Payloads exchanged with devices through object storage.
//!
//! Field names are `snake_case` on the wire and `None` fields are omitted, matching what
//! devices already produce and consume. Top-level fields this server does not know about
//! are kept in `extra` and written back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Payload schema version written by this server.
pub const PAYLOAD_VERSION: &str = "1.0";

fn default_version() -> Option<String> {
    Some(PAYLOAD_VERSION.to_string())
}

/// A request submitted by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default = "default_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl DeviceRequest {
    pub fn new(
        device_id: impl Into<String>,
        request_id: impl Into<String>,
        request_type: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Some(request_id.into()),
            device_id: Some(device_id.into()),
            request_type: Some(request_type.into()),
            payload: None,
            timestamp: None,
            version: default_version(),
            extra: Map::new(),
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }

}

/// A response produced for a device request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_build_signature: Option<String>,
    #[serde(default = "default_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl DeviceResponse {
    pub fn new(
        device_id: impl Into<String>,
        request_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Some(request_id.into()),
            device_id: Some(device_id.into()),
            status: Some(status.into()),
            data: None,
            error: None,
            timestamp: None,
            server_build_signature: None,
            version: default_version(),
            extra: Map::new(),
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, error: ErrorDetail) -> Self {
        self.error = Some(error);
        self
    }
}

/// Error details attached to a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}
