//! Transfer coordinator: validated, retried storage operations for device payloads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cloudwatcher_core::{
    DeviceId, DeviceRequest, DeviceResponse, OperationFailure, OperationOutcome, RequestId,
};

use crate::retry::ResilientExecutor;
use crate::storage::{FileMetadata, StorageGateway, StorageStats};

use super::path::{DEFAULT_LIST_PATTERN, ObjectCategory, ObjectKey};

/// Returned by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub device_id: DeviceId,
    pub request_id: RequestId,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Point-in-time view of the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageHealth {
    pub status: HealthStatus,
    pub provider: String,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StorageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StorageHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Moves device requests and responses in and out of object storage.
///
/// Identifiers and payloads are validated before any remote call. Every gateway call
/// runs through the shared [`ResilientExecutor`], except folder creation, which is a
/// single best-effort call ahead of an upload.
#[derive(Clone)]
pub struct TransferCoordinator {
    gateway: Arc<dyn StorageGateway>,
    executor: ResilientExecutor,
}

impl TransferCoordinator {
    pub fn new(gateway: Arc<dyn StorageGateway>, executor: ResilientExecutor) -> Self {
        Self { gateway, executor }
    }

    pub fn gateway(&self) -> &Arc<dyn StorageGateway> {
        &self.gateway
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// Store a request. Downloading the same key yields an equal [`DeviceRequest`].
    pub async fn upload_request(
        &self,
        device_id: &str,
        request_id: &str,
        request: &DeviceRequest,
    ) -> OperationOutcome<UploadReceipt> {
        self.upload(ObjectCategory::Requests, device_id, request_id, request).await
    }

    pub async fn upload_response(
        &self,
        device_id: &str,
        request_id: &str,
        response: &DeviceResponse,
    ) -> OperationOutcome<UploadReceipt> {
        self.upload(ObjectCategory::Responses, device_id, request_id, response).await
    }

    pub async fn download_request(
        &self,
        device_id: &str,
        request_id: &str,
    ) -> OperationOutcome<DeviceRequest> {
        self.download(ObjectCategory::Requests, device_id, request_id).await
    }

    pub async fn download_response(
        &self,
        device_id: &str,
        request_id: &str,
    ) -> OperationOutcome<DeviceResponse> {
        self.download(ObjectCategory::Responses, device_id, request_id).await
    }

    pub async fn delete_request(&self, device_id: &str, request_id: &str) -> OperationOutcome {
        self.delete(ObjectCategory::Requests, device_id, request_id).await
    }

    pub async fn delete_response(&self, device_id: &str, request_id: &str) -> OperationOutcome {
        self.delete(ObjectCategory::Responses, device_id, request_id).await
    }

    /// List stored requests for a device. `pattern` defaults to `*.json`.
    pub async fn list_requests(
        &self,
        device_id: &str,
        pattern: Option<&str>,
    ) -> OperationOutcome<Vec<FileMetadata>> {
        self.list(ObjectCategory::Requests, device_id, pattern).await
    }

    /// List stored responses for a device. `pattern` defaults to `*.json`.
    pub async fn list_responses(
        &self,
        device_id: &str,
        pattern: Option<&str>,
    ) -> OperationOutcome<Vec<FileMetadata>> {
        self.list(ObjectCategory::Responses, device_id, pattern).await
    }

    /// Refresh credentials and read usage statistics. Not retried.
    pub async fn storage_health(&self) -> StorageHealth {
        let provider = self.gateway.provider_name().to_string();

        if !self.gateway.refresh_authentication().await {
            warn!(provider = %provider, "storage gateway is not authenticated");
            return StorageHealth {
                status: HealthStatus::Unhealthy,
                provider,
                authenticated: false,
                stats: None,
                message: Some("storage provider is not authenticated".to_string()),
            };
        }

        match self.gateway.storage_stats().await {
            Ok(stats) => StorageHealth {
                status: HealthStatus::Healthy,
                provider,
                authenticated: true,
                stats: Some(stats),
                message: None,
            },
            Err(failure) => {
                warn!(provider = %provider, error = %failure, "storage health check failed");
                StorageHealth {
                    status: HealthStatus::Unhealthy,
                    provider,
                    authenticated: true,
                    stats: None,
                    message: Some(failure.message().to_string()),
                }
            }
        }
    }

    async fn upload<P>(
        &self,
        category: ObjectCategory,
        device_id: &str,
        request_id: &str,
        payload: &P,
    ) -> OperationOutcome<UploadReceipt>
    where
        P: Serialize + Sync,
    {
        let key = ObjectKey::parse(category, device_id, request_id)?;
        let content = encode_payload(category, payload)?;

        self.ensure_folder(&key).await;

        let folder = key.folder_path();
        let file_name = key.file_name();
        let operation = format!("upload {key}");
        let stored = self
            .executor
            .execute(&operation, || {
                self.gateway.upload_file(&folder, &file_name, content.clone())
            })
            .await?;

        info!(
            device_id = %key.device_id(),
            request_id = %key.request_id(),
            path = %stored.path,
            size = stored.size,
            "uploaded {}",
            category.singular()
        );

        Ok(UploadReceipt {
            device_id: key.device_id().clone(),
            request_id: key.request_id().clone(),
            path: key.full_path(),
            uploaded_at: Utc::now(),
        })
    }

    async fn download<P>(
        &self,
        category: ObjectCategory,
        device_id: &str,
        request_id: &str,
    ) -> OperationOutcome<P>
    where
        P: DeserializeOwned,
    {
        let key = ObjectKey::parse(category, device_id, request_id)?;
        let folder = key.folder_path();
        let file_name = key.file_name();
        let operation = format!("download {key}");

        let bytes = self
            .executor
            .execute(&operation, || self.gateway.download_file(&folder, &file_name))
            .await?;

        serde_json::from_slice(&bytes).map_err(|e| {
            OperationFailure::permanent(format!("failed to parse {key}: {e}")).with_cause(e)
        })
    }

    async fn delete(
        &self,
        category: ObjectCategory,
        device_id: &str,
        request_id: &str,
    ) -> OperationOutcome {
        let key = ObjectKey::parse(category, device_id, request_id)?;
        let folder = key.folder_path();
        let file_name = key.file_name();
        let operation = format!("delete {key}");

        self.executor
            .execute(&operation, || self.gateway.delete_file(&folder, &file_name))
            .await?;

        info!(device_id = %key.device_id(), request_id = %key.request_id(), "deleted {}", category.singular());
        Ok(())
    }

    async fn list(
        &self,
        category: ObjectCategory,
        device_id: &str,
        pattern: Option<&str>,
    ) -> OperationOutcome<Vec<FileMetadata>> {
        let device_id = DeviceId::parse(device_id)?;
        let folder = category.device_folder(&device_id);
        let pattern = pattern
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_LIST_PATTERN);
        let operation = format!("list {folder}");

        self.executor
            .execute(&operation, || self.gateway.list_files(&folder, pattern))
            .await
    }

    async fn ensure_folder(&self, key: &ObjectKey) {
        let parent = key.category().folder_path();
        if let Err(failure) = self
            .gateway
            .create_folder(&parent, key.device_id().as_str())
            .await
        {
            // The upload itself reports anything that really matters.
            debug!(folder = %key.folder_path(), error = %failure, "create folder failed");
        }
    }
}

fn encode_payload<P>(category: ObjectCategory, payload: &P) -> OperationOutcome<Vec<u8>>
where
    P: Serialize,
{
    serde_json::to_vec_pretty(payload).map_err(|e| {
        OperationFailure::validation(format!("{} cannot be serialized: {e}", category.singular()))
            .with_cause(e)
    })
}
