use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cloudwatcher_core::OperationOutcome;

/// Metadata for one listed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub content_type: String,
    pub is_folder: bool,
    pub parent_id: Option<String>,
}

/// Result of a successful upload, create-folder, or move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Backend-specific location of the object.
    pub path: String,
    pub size: u64,
}

/// Backend usage statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub provider: String,
    pub used_bytes: u64,
    pub file_count: u64,
    pub total_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
}

/// Join a folder path and a name with exactly one `/` between them.
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if folder.is_empty() {
        format!("/{name}")
    } else {
        format!("{folder}/{name}")
    }
}

/// Uniform interface over an external object store.
///
/// Folder paths are `/`-separated and absolute within the store (e.g.
/// `/Cloud/Requests/truck-001`). Every fallible call resolves to an
/// [`OperationOutcome`]; implementations never panic on backend errors and classify
/// failures as `Transient` (worth retrying) or `Permanent` (e.g. object not found).
///
/// Calls may be repeated by the resilient executor, so implementations must be
/// idempotent per call: an upload overwrites, a create-folder of an existing folder
/// succeeds.
#[async_trait::async_trait]
pub trait StorageGateway: Send + Sync {
    /// Short provider name for logs and health output (e.g. `"local"`).
    fn provider_name(&self) -> &str;

    /// Whether the gateway currently holds valid credentials.
    async fn is_authenticated(&self) -> bool;

    async fn upload_file(
        &self,
        folder_path: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> OperationOutcome<StoredObject>;

    async fn download_file(&self, folder_path: &str, file_name: &str) -> OperationOutcome<Vec<u8>>;

    async fn delete_file(&self, folder_path: &str, file_name: &str) -> OperationOutcome;

    /// List files directly inside `folder_path` whose names match a glob `pattern`.
    ///
    /// A folder that does not exist lists as empty.
    async fn list_files(&self, folder_path: &str, pattern: &str)
    -> OperationOutcome<Vec<FileMetadata>>;

    async fn create_folder(&self, parent_path: &str, folder_name: &str)
    -> OperationOutcome<StoredObject>;

    async fn move_file(
        &self,
        source_folder: &str,
        source_name: &str,
        destination_folder: &str,
        destination_name: &str,
    ) -> OperationOutcome<StoredObject>;

    async fn file_exists(&self, folder_path: &str, file_name: &str) -> bool;

    /// Verify credentials and refresh them if needed.
    async fn refresh_authentication(&self) -> bool;

    async fn storage_stats(&self) -> OperationOutcome<StorageStats>;
}

#[async_trait::async_trait]
impl<G> StorageGateway for Arc<G>
where
    G: StorageGateway + ?Sized,
{
    fn provider_name(&self) -> &str {
        (**self).provider_name()
    }

    async fn is_authenticated(&self) -> bool {
        (**self).is_authenticated().await
    }

    async fn upload_file(
        &self,
        folder_path: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> OperationOutcome<StoredObject> {
        (**self).upload_file(folder_path, file_name, content).await
    }

    async fn download_file(&self, folder_path: &str, file_name: &str) -> OperationOutcome<Vec<u8>> {
        (**self).download_file(folder_path, file_name).await
    }

    async fn delete_file(&self, folder_path: &str, file_name: &str) -> OperationOutcome {
        (**self).delete_file(folder_path, file_name).await
    }

    async fn list_files(
        &self,
        folder_path: &str,
        pattern: &str,
    ) -> OperationOutcome<Vec<FileMetadata>> {
        (**self).list_files(folder_path, pattern).await
    }

    async fn create_folder(
        &self,
        parent_path: &str,
        folder_name: &str,
    ) -> OperationOutcome<StoredObject> {
        (**self).create_folder(parent_path, folder_name).await
    }

    async fn move_file(
        &self,
        source_folder: &str,
        source_name: &str,
        destination_folder: &str,
        destination_name: &str,
    ) -> OperationOutcome<StoredObject> {
        (**self)
            .move_file(source_folder, source_name, destination_folder, destination_name)
            .await
    }

    async fn file_exists(&self, folder_path: &str, file_name: &str) -> bool {
        (**self).file_exists(folder_path, file_name).await
    }

    async fn refresh_authentication(&self) -> bool {
        (**self).refresh_authentication().await
    }

    async fn storage_stats(&self) -> OperationOutcome<StorageStats> {
        (**self).storage_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_normalizes_slashes() {
        assert_eq!(join_path("/Cloud/Requests/", "truck-001"), "/Cloud/Requests/truck-001");
        assert_eq!(join_path("/Cloud", "/req.json"), "/Cloud/req.json");
        assert_eq!(join_path("", "req.json"), "/req.json");
    }
}
