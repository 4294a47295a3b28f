//! Bounded, jittered retry for remote operations.
//!
//! ## Components
//!
//! - `RetryPolicy`: immutable retry configuration (attempt bound, delays, jitter)
//! - `ResilientExecutor`: runs one idempotent operation under a policy
//!
//! Delays grow multiplicatively per attempt up to `max_delay`, and every wait is drawn
//! uniformly from `[delay * (1 - jitter), delay * (1 + jitter)]` so that many devices
//! failing against the same backend do not retry in lockstep.

pub mod executor;
pub mod policy;

pub use executor::ResilientExecutor;
pub use policy::{RetryPolicy, RetryPolicyError};
