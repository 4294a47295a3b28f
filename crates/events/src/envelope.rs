use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use cloudwatcher_core::{DeviceId, RequestId};

/// Kind of notification, serialized as the `type` field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestUpdate,
    ResponseReady,
    Error,
    Heartbeat,
    Generic,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::RequestUpdate => "request_update",
            NotificationKind::ResponseReady => "response_ready",
            NotificationKind::Error => "error",
            NotificationKind::Heartbeat => "heartbeat",
            NotificationKind::Generic => "generic",
        }
    }
}

impl core::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope for a single push notification.
///
/// Built fresh for every notification and never persisted. The device id is used for
/// routing only and is not part of the wire format:
///
/// ```text
/// { "type": "request_update", "requestId": "req-001", "status": "completed",
///   "data": { ... }, "timestamp": "2025-12-24T10:00:00.123456Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    #[serde(rename = "type")]
    kind: NotificationKind,

    #[serde(skip)]
    device_id: Option<DeviceId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_id: Option<RequestId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,

    /// Caller-defined event name, only set on generic messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<JsonValue>,

    timestamp: DateTime<Utc>,
}

impl NotificationEnvelope {
    fn base(kind: NotificationKind, device_id: Option<DeviceId>) -> Self {
        Self {
            kind,
            device_id,
            request_id: None,
            status: None,
            message_type: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// A request's status changed.
    pub fn request_update(
        device_id: DeviceId,
        request_id: RequestId,
        status: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            request_id: Some(request_id),
            status: Some(status.into()),
            data: details,
            ..Self::base(NotificationKind::RequestUpdate, Some(device_id))
        }
    }

    /// A response is ready for retrieval.
    pub fn response_ready(device_id: DeviceId, request_id: RequestId, data: JsonValue) -> Self {
        Self {
            request_id: Some(request_id),
            data: Some(data),
            ..Self::base(NotificationKind::ResponseReady, Some(device_id))
        }
    }

    /// Processing of a request failed.
    pub fn error(
        device_id: DeviceId,
        request_id: RequestId,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Some(request_id),
            data: Some(serde_json::json!({
                "errorCode": error_code.into(),
                "errorMessage": error_message.into(),
            })),
            ..Self::base(NotificationKind::Error, Some(device_id))
        }
    }

    /// Keepalive frame; not addressed to a specific device.
    pub fn heartbeat() -> Self {
        Self::base(NotificationKind::Heartbeat, None)
    }

    /// Free-form message. `device_id` is `None` for broadcasts.
    pub fn generic(
        device_id: Option<DeviceId>,
        message_type: impl Into<String>,
        data: Option<JsonValue>,
    ) -> Self {
        Self {
            message_type: Some(message_type.into()),
            data,
            ..Self::base(NotificationKind::Generic, device_id)
        }
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialize to the JSON text frame sent over the transport.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
