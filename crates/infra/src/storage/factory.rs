use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigError, StorageConfig, StorageProvider};

use super::gateway::StorageGateway;
use super::in_memory::InMemoryGateway;
use super::local::LocalFileGateway;

/// Build the gateway selected by `config`.
pub fn build_gateway(config: &StorageConfig) -> Result<Arc<dyn StorageGateway>, ConfigError> {
    let gateway: Arc<dyn StorageGateway> = match config.provider {
        StorageProvider::Local => {
            let gateway = LocalFileGateway::new(&config.local_root).map_err(|source| {
                ConfigError::StorageRoot {
                    path: config.local_root.clone(),
                    source,
                }
            })?;
            Arc::new(gateway)
        }
        StorageProvider::Memory => Arc::new(InMemoryGateway::new()),
    };

    info!(provider = gateway.provider_name(), "storage gateway ready");
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_configured_provider() {
        let dir = tempfile::tempdir().unwrap();
        let local = build_gateway(&StorageConfig {
            provider: StorageProvider::Local,
            local_root: dir.path().join("Cloud"),
        })
        .unwrap();
        assert_eq!(local.provider_name(), "local");
        assert!(dir.path().join("Cloud").is_dir());

        let memory = build_gateway(&StorageConfig {
            provider: StorageProvider::Memory,
            local_root: dir.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(memory.provider_name(), "memory");
    }
}
