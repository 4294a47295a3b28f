//! Domain events → notification envelopes → connected devices.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use cloudwatcher_core::{DeviceId, RequestId};
use cloudwatcher_events::NotificationEnvelope;

use crate::registry::{ConnectionRegistry, ConnectionStatistics};

/// One method per notification kind.
///
/// Every method is best-effort and returns the number of connections that received the
/// message. Invalid identifiers and encoding problems are logged and yield `0`; nothing
/// here ever fails the caller's own operation.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn notify_request_status_change(
        &self,
        device_id: &str,
        request_id: &str,
        status: &str,
        details: Option<JsonValue>,
    ) -> usize {
        let Some((device, request)) = parse_ids("request_update", device_id, request_id) else {
            return 0;
        };
        let envelope = NotificationEnvelope::request_update(device, request, status, details);
        let sent = self.deliver(&envelope).await;
        info!(device_id, request_id, status, sent, "request status notification");
        sent
    }

    pub async fn notify_response_ready(
        &self,
        device_id: &str,
        request_id: &str,
        response: JsonValue,
    ) -> usize {
        let Some((device, request)) = parse_ids("response_ready", device_id, request_id) else {
            return 0;
        };
        let envelope = NotificationEnvelope::response_ready(device, request, response);
        let sent = self.deliver(&envelope).await;
        info!(device_id, request_id, sent, "response ready notification");
        sent
    }

    pub async fn notify_error(
        &self,
        device_id: &str,
        request_id: &str,
        error_code: &str,
        error_message: &str,
    ) -> usize {
        let Some((device, request)) = parse_ids("error", device_id, request_id) else {
            return 0;
        };
        let envelope = NotificationEnvelope::error(device, request, error_code, error_message);
        let sent = self.deliver(&envelope).await;
        warn!(device_id, request_id, error_code, error_message, sent, "error notification");
        sent
    }

    pub async fn send_generic(
        &self,
        device_id: &str,
        message_type: &str,
        data: Option<JsonValue>,
    ) -> usize {
        let device = match DeviceId::parse(device_id) {
            Ok(device) => device,
            Err(e) => {
                warn!(device_id, message_type, error = %e, "dropping generic message");
                return 0;
            }
        };
        let envelope = NotificationEnvelope::generic(Some(device), message_type, data);
        let sent = self.deliver(&envelope).await;
        debug!(device_id, message_type, sent, "generic message");
        sent
    }

    /// Send a generic message to every connected device; returns the total delivered.
    pub async fn broadcast_to_all(&self, message_type: &str, data: Option<JsonValue>) -> usize {
        let envelope = NotificationEnvelope::generic(None, message_type, data);
        let Some(text) = encode(&envelope) else {
            return 0;
        };

        let counts = self.registry.broadcast_to_all(&text).await;
        let devices = counts.len();
        let sent: usize = counts.values().sum();
        info!(message_type, devices, sent, "broadcast to all devices");
        sent
    }

    pub fn statistics(&self) -> ConnectionStatistics {
        self.registry.statistics()
    }

    async fn deliver(&self, envelope: &NotificationEnvelope) -> usize {
        let Some(device_id) = envelope.device_id() else {
            return 0;
        };
        match encode(envelope) {
            Some(text) => self.registry.broadcast_to_device(device_id, &text).await,
            None => 0,
        }
    }
}

fn parse_ids(kind: &str, device_id: &str, request_id: &str) -> Option<(DeviceId, RequestId)> {
    let parsed = DeviceId::parse(device_id).and_then(|d| RequestId::parse(request_id).map(|r| (d, r)));
    match parsed {
        Ok(ids) => Some(ids),
        Err(e) => {
            warn!(kind, device_id, request_id, error = %e, "dropping notification");
            None
        }
    }
}

fn encode(envelope: &NotificationEnvelope) -> Option<String> {
    envelope
        .to_json()
        .map_err(|e| error!(kind = %envelope.kind(), error = %e, "failed to encode notification"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    use crate::test_support::connect;

    fn router_with(devices: &[&str]) -> (MessageRouter, Vec<Arc<crate::test_support::MemoryTransport>>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let transports = devices
            .iter()
            .map(|d| {
                let (t, h) = connect(d);
                registry.add(h);
                t
            })
            .collect();
        (MessageRouter::new(registry), transports)
    }

    fn last_json(transport: &crate::test_support::MemoryTransport) -> Value {
        let sent = transport.sent();
        serde_json::from_str(sent.last().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn status_change_reaches_only_the_target_device() {
        let (router, transports) = router_with(&["truck-001", "truck-002"]);

        let sent = router
            .notify_request_status_change("truck-001", "req-001", "processing", Some(json!({"step": 2})))
            .await;

        assert_eq!(sent, 1);
        assert!(transports[1].sent().is_empty());
        let msg = last_json(&transports[0]);
        assert_eq!(msg["type"], "request_update");
        assert_eq!(msg["requestId"], "req-001");
        assert_eq!(msg["status"], "processing");
        assert_eq!(msg["data"]["step"], 2);
        assert!(msg.get("deviceId").is_none());
    }

    #[tokio::test]
    async fn error_notification_carries_code_and_message() {
        let (router, transports) = router_with(&["truck-001"]);

        router
            .notify_error("truck-001", "req-001", "STORAGE_UNAVAILABLE", "try later")
            .await;

        let msg = last_json(&transports[0]);
        assert_eq!(msg["type"], "error");
        assert_eq!(msg["data"]["errorCode"], "STORAGE_UNAVAILABLE");
        assert_eq!(msg["data"]["errorMessage"], "try later");
    }

    #[tokio::test]
    async fn response_ready_and_generic_messages() {
        let (router, transports) = router_with(&["truck-001"]);

        assert_eq!(
            router.notify_response_ready("truck-001", "req-001", json!({"ok": true})).await,
            1
        );
        assert_eq!(last_json(&transports[0])["type"], "response_ready");

        assert_eq!(router.send_generic("truck-001", "config_changed", None).await, 1);
        let msg = last_json(&transports[0]);
        assert_eq!(msg["type"], "generic");
        assert_eq!(msg["messageType"], "config_changed");
    }

    #[tokio::test]
    async fn invalid_ids_and_unknown_devices_deliver_nothing() {
        let (router, transports) = router_with(&["truck-001"]);

        assert_eq!(router.notify_response_ready("", "req-001", json!({})).await, 0);
        assert_eq!(router.notify_request_status_change("truck-001", " ", "x", None).await, 0);
        assert_eq!(router.send_generic("truck-404", "ping", None).await, 0);
        assert!(transports[0].sent().is_empty());
    }

    #[tokio::test]
    async fn broadcast_to_all_sums_deliveries() {
        let (router, _transports) = router_with(&["truck-001", "truck-002", "truck-002"]);

        assert_eq!(router.broadcast_to_all("maintenance", Some(json!({"at": "02:00"}))).await, 3);

        let stats = router.statistics();
        assert_eq!(stats.total_connections, 3);
        assert_eq!(stats.connected_devices, 2);
    }
}
