//! Request/response transfer through object storage.
//!
//! [`TransferCoordinator`] is the single place that knows how device payloads map onto
//! object paths; see [`ObjectKey`].

pub mod coordinator;
pub mod path;

pub use coordinator::{HealthStatus, StorageHealth, TransferCoordinator, UploadReceipt};
pub use path::{DEFAULT_LIST_PATTERN, ObjectCategory, ObjectKey, ROOT_FOLDER};
