use core::fmt;

use serde::{Deserialize, Serialize};

use cloudwatcher_core::{DeviceId, DomainResult, RequestId};

/// Top-level folder for every transfer object.
pub const ROOT_FOLDER: &str = "/Cloud";

/// Pattern used when listing without an explicit one.
pub const DEFAULT_LIST_PATTERN: &str = "*.json";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCategory {
    Requests,
    Responses,
}

impl ObjectCategory {
    /// Folder name under [`ROOT_FOLDER`].
    pub fn folder_name(self) -> &'static str {
        match self {
            Self::Requests => "Requests",
            Self::Responses => "Responses",
        }
    }

    /// `/Cloud/Requests` or `/Cloud/Responses`.
    pub fn folder_path(self) -> String {
        format!("{ROOT_FOLDER}/{}", self.folder_name())
    }

    /// `/Cloud/{Category}/{device}`.
    pub fn device_folder(self, device_id: &DeviceId) -> String {
        format!("{}/{device_id}", self.folder_path())
    }

    pub fn singular(self) -> &'static str {
        match self {
            Self::Requests => "request",
            Self::Responses => "response",
        }
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

/// Address of one stored request or response:
/// `/Cloud/{Category}/{device_id}/{request_id}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    category: ObjectCategory,
    device_id: DeviceId,
    request_id: RequestId,
}

impl ObjectKey {
    pub fn new(category: ObjectCategory, device_id: DeviceId, request_id: RequestId) -> Self {
        Self {
            category,
            device_id,
            request_id,
        }
    }

    /// Validate raw identifiers and build the key. The device is checked first.
    pub fn parse(category: ObjectCategory, device_id: &str, request_id: &str) -> DomainResult<Self> {
        let device_id = DeviceId::parse(device_id)?;
        let request_id = RequestId::parse(request_id)?;
        Ok(Self::new(category, device_id, request_id))
    }

    pub fn category(&self) -> ObjectCategory {
        self.category
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn folder_path(&self) -> String {
        self.category.device_folder(&self.device_id)
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.request_id)
    }

    pub fn full_path(&self) -> String {
        format!("{}/{}", self.folder_path(), self.file_name())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_cloud_paths() {
        let key = ObjectKey::parse(ObjectCategory::Requests, "truck-001", "req-001").unwrap();
        assert_eq!(key.folder_path(), "/Cloud/Requests/truck-001");
        assert_eq!(key.file_name(), "req-001.json");
        assert_eq!(key.full_path(), "/Cloud/Requests/truck-001/req-001.json");

        let key = ObjectKey::parse(ObjectCategory::Responses, "truck-001", "req-001").unwrap();
        assert_eq!(key.to_string(), "/Cloud/Responses/truck-001/req-001.json");
    }

    #[test]
    fn rejects_blank_ids_device_first() {
        let err = ObjectKey::parse(ObjectCategory::Requests, " ", "").unwrap_err();
        assert!(err.to_string().contains("Device ID cannot be empty"));

        let err = ObjectKey::parse(ObjectCategory::Requests, "truck-001", "").unwrap_err();
        assert!(err.to_string().contains("Request ID cannot be empty"));
    }
}
