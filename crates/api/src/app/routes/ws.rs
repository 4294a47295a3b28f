//! Device WebSocket endpoint.

use std::sync::Arc;

use axum::{
    extract::{
        Extension, Path,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use cloudwatcher_core::DeviceId;
use cloudwatcher_realtime::ConnectionHandle;

use crate::app::errors::domain_error_to_response;
use crate::app::services::AppServices;
use crate::transport::{OUTBOUND_QUEUE, WRITER_DRAIN, WsTransport, run_writer, shutdown_writer};

/// GET /ws/devices/:device_id
///
/// Registers the socket with the connection registry for the lifetime of the
/// connection. Inbound frames count as activity.
pub async fn device_socket(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let device_id = match DeviceId::parse(device_id) {
        Ok(id) => id,
        Err(e) => return domain_error_to_response(e),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, device_id, services))
        .into_response()
}

async fn handle_socket(socket: WebSocket, device_id: DeviceId, services: Arc<AppServices>) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);

    let transport = Arc::new(WsTransport::new(tx));
    let handle = Arc::new(ConnectionHandle::new(device_id.clone(), transport.clone()));
    let connection_id = handle.id();
    services.registry.add(Arc::clone(&handle));

    let writer_transport = Arc::clone(&transport);
    let writer = tokio::spawn(async move {
        run_writer(sink, rx).await;
        writer_transport.mark_closed();
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => {
                handle.record_activity();
                debug!(device_id = %device_id, len = text.len(), "inbound text frame");
            }
            Ok(_) => handle.record_activity(),
            Err(e) => {
                debug!(device_id = %device_id, error = %e, "websocket read failed");
                break;
            }
        }
    }

    services.registry.remove(&device_id, connection_id);
    shutdown_writer(&transport, writer, WRITER_DRAIN).await;
    info!(device_id = %device_id, connection_id = %connection_id, "device socket closed");
}
