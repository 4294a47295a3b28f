use std::sync::Arc;

use anyhow::Context;

use cloudwatcher_infra::{AppConfig, TransferCoordinator, build_gateway};
use cloudwatcher_realtime::{
    ConnectionRegistry, HeartbeatConfig, HeartbeatHandle, HeartbeatScheduler, MessageRouter,
};

/// Shared state behind every handler.
pub struct AppServices {
    pub registry: Arc<ConnectionRegistry>,
    pub router: MessageRouter,
    pub transfer: TransferCoordinator,
    pub heartbeat: HeartbeatConfig,
}

impl AppServices {
    /// Start the heartbeat worker for this registry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_heartbeat(&self) -> HeartbeatHandle {
        HeartbeatScheduler::new(Arc::clone(&self.registry), self.heartbeat).spawn()
    }
}

pub fn build_services(config: &AppConfig) -> anyhow::Result<Arc<AppServices>> {
    let gateway = build_gateway(&config.storage).context("failed to initialise storage")?;
    let executor = config
        .retry
        .to_executor()
        .context("invalid retry settings")?;

    let registry = Arc::new(ConnectionRegistry::with_send_timeout(
        config.realtime.send_timeout(),
    ));

    Ok(Arc::new(AppServices {
        router: MessageRouter::new(Arc::clone(&registry)),
        registry,
        transfer: TransferCoordinator::new(gateway, executor),
        heartbeat: HeartbeatConfig {
            interval: config.realtime.heartbeat_interval(),
            idle_timeout: config.realtime.idle_timeout(),
        },
    }))
}
