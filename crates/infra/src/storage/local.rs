//! Local filesystem gateway.

use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use globset::Glob;
use tracing::debug;

use cloudwatcher_core::{OperationFailure, OperationOutcome};

use super::gateway::{FileMetadata, StorageGateway, StorageStats, StoredObject, join_path};

const TEMP_SUFFIX: &str = ".tmp";

/// Stores objects as plain files under a root directory.
///
/// `/Cloud/Requests/truck-001/req-001.json` maps to
/// `<root>/Cloud/Requests/truck-001/req-001.json`. Each upload is written to its own
/// uniquely named temporary sibling and renamed into place, so readers never observe a
/// partial file and concurrent uploads of one key end with exactly one complete body.
#[derive(Debug, Clone)]
pub struct LocalFileGateway {
    root: PathBuf,
}

impl LocalFileGateway {
    /// Create a gateway rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, folder_path: &str, name: Option<&str>) -> OperationOutcome<PathBuf> {
        let logical = match name {
            Some(name) => join_path(folder_path, name),
            None => folder_path.to_string(),
        };
        let relative = Path::new(logical.trim_start_matches('/'));

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(OperationFailure::validation(format!(
                "path escapes storage root: {logical}"
            )));
        }

        Ok(self.root.join(relative))
    }
}

fn io_failure(action: &str, logical: &str, err: io::Error) -> OperationFailure {
    let message = format!("failed to {action} {logical}: {err}");
    let failure = match err.kind() {
        io::ErrorKind::NotFound => {
            OperationFailure::not_found(format!("file not found: {logical}"))
        }
        io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput => {
            OperationFailure::permanent(message)
        }
        _ => OperationFailure::transient(message),
    };
    failure.with_cause(err)
}

/// Write `content` to a fresh temp file in `dir`, then atomically rename it to `target`.
fn commit_atomically(dir: &Path, target: &Path, content: &[u8]) -> io::Result<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_data()?;
    // The temp file is removed on drop if the rename fails.
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[async_trait::async_trait]
impl StorageGateway for LocalFileGateway {
    fn provider_name(&self) -> &str {
        "local"
    }

    async fn is_authenticated(&self) -> bool {
        true
    }

    async fn upload_file(
        &self,
        folder_path: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> OperationOutcome<StoredObject> {
        let logical = join_path(folder_path, file_name);
        let full = self.resolve(folder_path, Some(file_name))?;
        let size = content.len() as u64;

        let dir = full
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_failure("create folder for", &logical, e))?;

        tokio::task::spawn_blocking(move || commit_atomically(&dir, &full, &content))
            .await
            .map_err(|e| OperationFailure::transient(format!("failed to write {logical}: {e}")))?
            .map_err(|e| io_failure("write", &logical, e))?;

        debug!(path = %logical, size, "stored file");
        Ok(StoredObject { path: logical, size })
    }

    async fn download_file(&self, folder_path: &str, file_name: &str) -> OperationOutcome<Vec<u8>> {
        let logical = join_path(folder_path, file_name);
        let full = self.resolve(folder_path, Some(file_name))?;

        tokio::fs::read(&full)
            .await
            .map_err(|e| io_failure("read", &logical, e))
    }

    async fn delete_file(&self, folder_path: &str, file_name: &str) -> OperationOutcome {
        let logical = join_path(folder_path, file_name);
        let full = self.resolve(folder_path, Some(file_name))?;

        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| io_failure("delete", &logical, e))
    }

    async fn list_files(
        &self,
        folder_path: &str,
        pattern: &str,
    ) -> OperationOutcome<Vec<FileMetadata>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| {
                OperationFailure::validation(format!("invalid file pattern {pattern:?}")).with_cause(e)
            })?
            .compile_matcher();
        let dir = self.resolve(folder_path, None)?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_failure("list", folder_path, e)),
        };

        let mut files = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(io_failure("list", folder_path, e)),
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TEMP_SUFFIX) || !matcher.is_match(&name) {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => return Err(io_failure("stat", &join_path(folder_path, &name), e)),
            };

            files.push(FileMetadata {
                id: join_path(folder_path, &name),
                content_type: content_type_for(&name).to_string(),
                size: meta.len(),
                modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
                is_folder: false,
                parent_id: Some(folder_path.to_string()),
                name,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn create_folder(
        &self,
        parent_path: &str,
        folder_name: &str,
    ) -> OperationOutcome<StoredObject> {
        let logical = join_path(parent_path, folder_name);
        let full = self.resolve(parent_path, Some(folder_name))?;

        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| io_failure("create folder", &logical, e))?;
        Ok(StoredObject { path: logical, size: 0 })
    }

    async fn move_file(
        &self,
        source_folder: &str,
        source_name: &str,
        destination_folder: &str,
        destination_name: &str,
    ) -> OperationOutcome<StoredObject> {
        let source_logical = join_path(source_folder, source_name);
        let destination_logical = join_path(destination_folder, destination_name);
        let source = self.resolve(source_folder, Some(source_name))?;
        let destination = self.resolve(destination_folder, Some(destination_name))?;

        let meta = tokio::fs::metadata(&source)
            .await
            .map_err(|e| io_failure("move", &source_logical, e))?;

        if let Some(dir) = destination.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_failure("create folder for", &destination_logical, e))?;
        }
        tokio::fs::rename(&source, &destination)
            .await
            .map_err(|e| io_failure("move", &source_logical, e))?;

        Ok(StoredObject {
            path: destination_logical,
            size: meta.len(),
        })
    }

    async fn file_exists(&self, folder_path: &str, file_name: &str) -> bool {
        let Ok(full) = self.resolve(folder_path, Some(file_name)) else {
            return false;
        };
        tokio::fs::metadata(&full)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn refresh_authentication(&self) -> bool {
        true
    }

    async fn storage_stats(&self) -> OperationOutcome<StorageStats> {
        let mut used_bytes = 0u64;
        let mut file_count = 0u64;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| io_failure("scan", &dir.display().to_string(), e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_failure("scan", &dir.display().to_string(), e))?
            {
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    // Removed between listing and stat.
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(io_failure("scan", &entry.path().display().to_string(), e)),
                };
                if meta.is_dir() {
                    pending.push(entry.path());
                } else if meta.is_file() {
                    used_bytes += meta.len();
                    file_count += 1;
                }
            }
        }

        Ok(StorageStats {
            provider: self.provider_name().to_string(),
            used_bytes,
            file_count,
            total_bytes: None,
            available_bytes: None,
        })
    }
}
