//! Process-local gateway used by tests and ephemeral dev servers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use globset::Glob;

use cloudwatcher_core::{OperationFailure, OperationOutcome};

use super::gateway::{FileMetadata, StorageGateway, StorageStats, StoredObject, join_path};

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, StoredFile>,
    folders: BTreeSet<String>,
}

/// Keeps every object in a map keyed by its full path.
///
/// `fail_next` makes the next N fallible calls return a transient failure, which lets
/// callers exercise their retry paths without a real network.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
    pending_failures: AtomicU32,
    calls: AtomicU64,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` fallible calls with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of fallible calls received so far (including injected failures).
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // The map holds plain data, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, action: &str) -> OperationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(OperationFailure::transient(format!(
                "{action} failed: simulated outage"
            )));
        }
        Ok(())
    }
}

fn normalize_folder(folder_path: &str) -> String {
    let trimmed = folder_path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn full_path(folder_path: &str, name: &str) -> String {
    join_path(&normalize_folder(folder_path), name)
}

fn not_found(path: &str) -> OperationFailure {
    OperationFailure::not_found(format!("file not found: {path}"))
}

#[async_trait::async_trait]
impl StorageGateway for InMemoryGateway {
    fn provider_name(&self) -> &str {
        "memory"
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
        self.begin("upload")?;
        let path = full_path(folder_path, file_name);
        let size = content.len() as u64;

        let mut state = self.lock();
        state.folders.insert(normalize_folder(folder_path));
        state.files.insert(
            path.clone(),
            StoredFile {
                content,
                modified_at: Utc::now(),
            },
        );
        Ok(StoredObject { path, size })
    }

    async fn download_file(&self, folder_path: &str, file_name: &str) -> OperationOutcome<Vec<u8>> {
        self.begin("download")?;
        let path = full_path(folder_path, file_name);
        self.lock()
            .files
            .get(&path)
            .map(|f| f.content.clone())
            .ok_or_else(|| not_found(&path))
    }

    async fn delete_file(&self, folder_path: &str, file_name: &str) -> OperationOutcome {
        self.begin("delete")?;
        let path = full_path(folder_path, file_name);
        self.lock()
            .files
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| not_found(&path))
    }

    async fn list_files(
        &self,
        folder_path: &str,
        pattern: &str,
    ) -> OperationOutcome<Vec<FileMetadata>> {
        self.begin("list")?;
        let matcher = Glob::new(pattern)
            .map_err(|e| {
                OperationFailure::validation(format!("invalid file pattern {pattern:?}")).with_cause(e)
            })?
            .compile_matcher();
        let folder = normalize_folder(folder_path);
        let prefix = join_path(&folder, "");

        let state = self.lock();
        let files = state
            .files
            .iter()
            .filter_map(|(path, file)| {
                let name = path.strip_prefix(&prefix)?;
                if name.contains('/') || !matcher.is_match(name) {
                    return None;
                }
                Some(FileMetadata {
                    id: path.clone(),
                    name: name.to_string(),
                    size: file.content.len() as u64,
                    modified_at: Some(file.modified_at),
                    content_type: if name.ends_with(".json") {
                        "application/json".to_string()
                    } else {
                        "application/octet-stream".to_string()
                    },
                    is_folder: false,
                    parent_id: Some(folder.clone()),
                })
            })
            .collect();
        Ok(files)
    }

    async fn create_folder(
        &self,
        parent_path: &str,
        folder_name: &str,
    ) -> OperationOutcome<StoredObject> {
        self.begin("create folder")?;
        let path = full_path(parent_path, folder_name);
        self.lock().folders.insert(path.clone());
        Ok(StoredObject { path, size: 0 })
    }

    async fn move_file(
        &self,
        source_folder: &str,
        source_name: &str,
        destination_folder: &str,
        destination_name: &str,
    ) -> OperationOutcome<StoredObject> {
        self.begin("move")?;
        let source = full_path(source_folder, source_name);
        let destination = full_path(destination_folder, destination_name);

        let mut state = self.lock();
        let file = state.files.remove(&source).ok_or_else(|| not_found(&source))?;
        let size = file.content.len() as u64;
        state.folders.insert(normalize_folder(destination_folder));
        state.files.insert(destination.clone(), file);
        Ok(StoredObject {
            path: destination,
            size,
        })
    }

    async fn file_exists(&self, folder_path: &str, file_name: &str) -> bool {
        self.lock()
            .files
            .contains_key(&full_path(folder_path, file_name))
    }

    async fn refresh_authentication(&self) -> bool {
        true
    }

    async fn storage_stats(&self) -> OperationOutcome<StorageStats> {
        self.begin("stats")?;
        let state = self.lock();
        Ok(StorageStats {
            provider: self.provider_name().to_string(),
            used_bytes: state.files.values().map(|f| f.content.len() as u64).sum(),
            file_count: state.files.len() as u64,
            total_bytes: None,
            available_bytes: None,
        })
    }
}
