//! One device's transport session plus its activity bookkeeping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use cloudwatcher_core::DeviceId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection is closed")]
    Closed,

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Failed(String),
}

/// A bidirectional text channel to one device.
///
/// The transport owns its connection state; handles only query it and issue commands.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    fn is_open(&self) -> bool;

    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Close the channel. Closing twice is harmless.
    async fn close(&self);
}

/// Unique id of one connection (UUIDv7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy)]
struct Activity {
    at: Instant,
    wall: DateTime<Utc>,
}

impl Activity {
    fn now() -> Self {
        Self {
            at: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Live reference to a device transport.
///
/// `last_activity` moves forward on every successful application send and on every
/// inbound frame the transport reports via [`ConnectionHandle::record_activity`].
/// Heartbeat frames deliberately leave it alone, otherwise no connection could ever
/// become idle.
pub struct ConnectionHandle {
    id: ConnectionId,
    device_id: DeviceId,
    created_at: DateTime<Utc>,
    activity: Mutex<Activity>,
    transport: Arc<dyn Transport>,
}

impl ConnectionHandle {
    pub fn new(device_id: DeviceId, transport: Arc<dyn Transport>) -> Self {
        let activity = Activity::now();
        Self {
            id: ConnectionId::new(),
            device_id,
            created_at: activity.wall,
            activity: Mutex::new(activity),
            transport,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.activity().wall
    }

    /// Monotonic instant of the last activity.
    pub fn last_activity(&self) -> Instant {
        self.activity().at
    }

    /// Send an application message; refreshes activity on success.
    pub async fn send(&self, text: String) -> Result<(), TransportError> {
        self.send_raw(text).await?;
        self.record_activity();
        Ok(())
    }

    /// Send a keepalive frame without touching activity.
    pub async fn send_heartbeat(&self, text: String) -> Result<(), TransportError> {
        self.send_raw(text).await
    }

    pub fn record_activity(&self) {
        self.set_activity(Activity::now());
    }

    /// Backdate or forward-date the activity stamp.
    pub fn record_activity_at(&self, at: Instant) {
        let now = Instant::now();
        let wall = if at <= now {
            Utc::now() - chrono::Duration::from_std(now - at).unwrap_or_else(|_| chrono::Duration::zero())
        } else {
            Utc::now() + chrono::Duration::from_std(at - now).unwrap_or_else(|_| chrono::Duration::zero())
        };
        self.set_activity(Activity { at, wall });
    }

    /// True when strictly more than `timeout` has elapsed since the last activity.
    pub fn is_idle_for(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity()) > timeout
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }

    async fn send_raw(&self, text: String) -> Result<(), TransportError> {
        if !self.transport.is_open() {
            return Err(TransportError::Closed);
        }
        self.transport.send_text(text).await
    }

    fn activity(&self) -> Activity {
        *self.activity.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_activity(&self, activity: Activity) {
        *self.activity.lock().unwrap_or_else(|p| p.into_inner()) = activity;
    }
}

impl core::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("created_at", &self.created_at)
            .field("connected", &self.is_connected())
            .finish()
    }
}
