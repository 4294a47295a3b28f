//! `cloudwatcher-realtime`: live device connections and push notifications.
//!
//! ## Components
//!
//! - `ConnectionRegistry`: which connections exist for which device
//! - `HeartbeatScheduler`: periodic keepalive frames plus idle cleanup
//! - `MessageRouter`: one operation per notification kind, best-effort delivery
//!
//! Connections are reached through the [`Transport`] trait; the WebSocket adapter
//! lives with the HTTP surface.

pub mod connection;
pub mod heartbeat;
pub mod registry;
pub mod router;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{ConnectionHandle, ConnectionId, Transport, TransportError};
pub use heartbeat::{HeartbeatConfig, HeartbeatHandle, HeartbeatScheduler, TickReport};
pub use registry::{ConnectionRegistry, ConnectionStatistics, DEFAULT_SEND_TIMEOUT};
pub use router::MessageRouter;
