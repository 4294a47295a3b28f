//! `cloudwatcher-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no IO, no async): device/request
//! identifiers, the operation outcome model used by every storage call, and the
//! request/response payloads exchanged with devices.

pub mod error;
pub mod id;
pub mod message;
pub mod outcome;

pub use error::{DomainError, DomainResult};
pub use id::{DeviceId, RequestId};
pub use message::{DeviceRequest, DeviceResponse, ErrorDetail, PAYLOAD_VERSION};
pub use outcome::{FailureKind, OperationFailure, OperationOutcome};
