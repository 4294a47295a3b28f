//! Infrastructure layer: storage backends, resilient execution, configuration.

pub mod config;
pub mod retry;
pub mod storage;
pub mod transfer;

pub use config::{AppConfig, ConfigError, RealtimeSettings, RetrySettings, StorageConfig, StorageProvider};
pub use retry::{ResilientExecutor, RetryPolicy, RetryPolicyError};
pub use storage::{
    FileMetadata, InMemoryGateway, LocalFileGateway, StorageGateway, StorageStats, StoredObject,
    build_gateway,
};
pub use transfer::{
    HealthStatus, ObjectCategory, ObjectKey, StorageHealth, TransferCoordinator, UploadReceipt,
};
