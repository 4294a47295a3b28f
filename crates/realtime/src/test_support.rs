//! In-memory transport for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cloudwatcher_core::DeviceId;

use crate::connection::{ConnectionHandle, Transport, TransportError};

#[derive(Debug, Default)]
pub struct MemoryTransport {
    closed: AtomicBool,
    failing: AtomicBool,
    hanging: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate the peer going away without a close handshake.
    pub fn drop_connection(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn hang_sends(&self) {
        self.hanging.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("broken pipe".into()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn device(id: &str) -> DeviceId {
    DeviceId::parse(id).unwrap()
}

pub fn connect(device_id: &str) -> (Arc<MemoryTransport>, Arc<ConnectionHandle>) {
    let transport = MemoryTransport::new();
    let handle = Arc::new(ConnectionHandle::new(device(device_id), transport.clone()));
    (transport, handle)
}
