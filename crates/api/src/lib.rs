//! HTTP and WebSocket surface: device sockets, transfer endpoints, health.

pub mod app;
pub mod transport;
