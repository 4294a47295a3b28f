//! Outcome model for remote (storage) operations.
//!
//! Every storage call resolves to an [`OperationOutcome`]: either a success value or an
//! [`OperationFailure`] describing what went wrong. Success and failure are mutually
//! exclusive by construction, and callers only ever branch on this one failure channel.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Result of a remote operation.
pub type OperationOutcome<T = ()> = Result<T, OperationFailure>;

/// Shared, cloneable underlying cause.
pub type FailureCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Classification of a failure.
///
/// - `Validation`: rejected before any remote call was made; never retried.
/// - `Transient`: network errors, throttling, expired auth; worth retrying.
/// - `Permanent`: the backend answered definitively (e.g. object not found).
///
/// A missing object is `Permanent` and additionally carries a not-found marker, see
/// [`OperationFailure::not_found`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Transient,
    Permanent,
}

/// Failed operation: a human-readable message plus an optional underlying cause.
#[derive(Clone)]
pub struct OperationFailure {
    message: String,
    kind: FailureKind,
    not_found: bool,
    cause: Option<FailureCause>,
}

impl OperationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            not_found: false,
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }

    /// The addressed object does not exist. Always `Permanent`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            not_found: true,
            ..Self::permanent(message)
        }
    }

    /// Wrap this failure under a new message, keeping its kind and not-found marker.
    pub fn wrap(self, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: self.kind,
            not_found: self.not_found,
            cause: Some(Arc::new(self)),
        }
    }

    /// Attach the underlying cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn cause(&self) -> Option<&FailureCause> {
        self.cause.as_ref()
    }

    pub fn is_validation(&self) -> bool {
        self.kind == FailureKind::Validation
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }

    pub fn is_not_found(&self) -> bool {
        self.not_found
    }
}

impl fmt::Debug for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationFailure")
            .field("message", &self.message)
            .field("kind", &self.kind)
            .field("not_found", &self.not_found)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for OperationFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<DomainError> for OperationFailure {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound => Self::not_found("not found"),
            other => Self::validation(other.to_string()),
        }
    }
}
