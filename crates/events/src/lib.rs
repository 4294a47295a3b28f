//! Notification envelopes pushed to devices over their live connections.

pub mod envelope;

pub use envelope::{NotificationEnvelope, NotificationKind};
