//! WebSocket adapter for [`cloudwatcher_realtime::Transport`].
//!
//! The socket is split: a writer task owns the sink and drains an outbound queue,
//! while the upgrade task reads inbound frames. The transport only touches the queue.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use cloudwatcher_realtime::{Transport, TransportError};

/// Outbound queue depth per socket.
pub const OUTBOUND_QUEUE: usize = 64;

/// How long a closing socket's writer gets to flush before it is aborted.
pub const WRITER_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum Outbound {
    Text(String),
    Close,
}

#[derive(Debug)]
pub struct WsTransport {
    tx: mpsc::Sender<Outbound>,
    open: AtomicBool,
}

impl WsTransport {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            tx,
            open: AtomicBool::new(true),
        }
    }

    /// Record that the socket is gone (peer closed, or a write failed).
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Outbound::Text(text))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            // A full queue means the writer is stuck anyway; dropping the frame is fine.
            let _ = self.tx.try_send(Outbound::Close);
        }
    }
}

/// Forward queued frames to the socket until closed or the sink fails.
pub async fn run_writer<S>(mut sink: S, mut rx: mpsc::Receiver<Outbound>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(out) = rx.recv().await {
        match out {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(error = %e, "websocket write failed");
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    rx.close();
}

/// Queue a close frame, then give the writer `drain` to send it before aborting.
pub async fn shutdown_writer(transport: &WsTransport, mut writer: JoinHandle<()>, drain: Duration) {
    transport.close().await;
    if tokio::time::timeout(drain, &mut writer).await.is_err() {
        debug!("websocket writer did not drain in time");
        writer.abort();
    }
}
