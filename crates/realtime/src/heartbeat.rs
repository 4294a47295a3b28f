//! Periodic keepalive and idle cleanup.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cloudwatcher_events::NotificationEnvelope;

use crate::registry::ConnectionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub heartbeats_sent: usize,
    pub heartbeats_failed: usize,
    pub evicted: usize,
}

/// Sends heartbeats to every connection and evicts idle or disconnected ones.
///
/// Stateless between ticks; everything lives in the [`ConnectionRegistry`].
#[derive(Debug, Clone)]
pub struct HeartbeatScheduler {
    registry: Arc<ConnectionRegistry>,
    config: HeartbeatConfig,
}

impl HeartbeatScheduler {
    pub fn new(registry: Arc<ConnectionRegistry>, config: HeartbeatConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    /// Run one heartbeat pass followed by one cleanup pass.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let handles: Vec<_> = self
            .registry
            .all_connections()
            .into_iter()
            .filter(|h| h.is_connected())
            .collect();

        if !handles.is_empty() {
            match NotificationEnvelope::heartbeat().to_json() {
                Ok(frame) => {
                    let results = join_all(
                        handles
                            .iter()
                            .map(|h| self.registry.send_heartbeat(h, frame.clone())),
                    )
                    .await;
                    report.heartbeats_sent = results.iter().filter(|ok| **ok).count();
                    report.heartbeats_failed = results.len() - report.heartbeats_sent;
                }
                Err(e) => error!(error = %e, "failed to encode heartbeat"),
            }
        }

        let now = Instant::now();
        for handle in self.registry.all_connections() {
            let disconnected = !handle.is_connected();
            if disconnected || handle.is_idle_for(self.config.idle_timeout, now) {
                if self.registry.remove(handle.device_id(), handle.id()) {
                    info!(
                        device_id = %handle.device_id(),
                        connection_id = %handle.id(),
                        disconnected,
                        "evicted connection"
                    );
                    report.evicted += 1;
                }
            }
        }

        debug!(
            sent = report.heartbeats_sent,
            failed = report.heartbeats_failed,
            evicted = report.evicted,
            "heartbeat tick"
        );
        report
    }

    /// Run `tick` every `interval` on a background task until shut down.
    pub fn spawn(self) -> HeartbeatHandle {
        let token = CancellationToken::new();
        let registry = Arc::clone(&self.registry);
        let cancel = token.clone();

        let join = tokio::spawn(async move {
            let period = self.config.interval;
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_secs = period.as_secs(),
                idle_timeout_secs = self.config.idle_timeout.as_secs(),
                "heartbeat started"
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.tick().await;
                    }
                }
            }
            debug!("heartbeat stopped");
        });

        HeartbeatHandle {
            token,
            join: Some(join),
            registry,
        }
    }
}

/// Handle to the background heartbeat task.
#[derive(Debug)]
pub struct HeartbeatHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
    registry: Arc<ConnectionRegistry>,
}

impl HeartbeatHandle {
    /// Stop the task, wait for it, then close every remaining connection.
    pub async fn shutdown(mut self) -> usize {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(error = %e, "heartbeat task ended abnormally");
            }
        }
        self.registry.close_all().await
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Transport;
    use crate::test_support::{connect, device};

    fn scheduler(registry: &Arc<ConnectionRegistry>) -> HeartbeatScheduler {
        HeartbeatScheduler::new(registry.clone(), HeartbeatConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn tick_sends_heartbeats_without_refreshing_activity() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (transport, handle) = connect("truck-001");
        registry.add(handle.clone());
        let before = handle.last_activity();

        tokio::time::advance(Duration::from_secs(30)).await;
        let report = scheduler(&registry).tick().await;

        assert_eq!(report.heartbeats_sent, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!(handle.last_activity(), before);
        assert!(transport.sent()[0].contains("\"type\":\"heartbeat\""));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connections_are_evicted() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_idle_t, idle) = connect("truck-001");
        let (_busy_t, busy) = connect("truck-001");
        registry.add(idle.clone());
        registry.add(busy.clone());

        tokio::time::advance(Duration::from_secs(301)).await;
        busy.record_activity();

        let report = scheduler(&registry).tick().await;

        assert_eq!(report.evicted, 1);
        let remaining = registry.connections_for(&device("truck-001"));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), busy.id());
    }

    #[tokio::test]
    async fn closed_handle_is_skipped_then_evicted() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (closed_t, closed) = connect("truck-001");
        let (_live_t, live) = connect("truck-001");
        registry.add(closed.clone());
        registry.add(live.clone());

        closed_t.drop_connection();
        let sent = registry.broadcast_to_device(&device("truck-001"), "status").await;
        assert_eq!(sent, 1);

        let report = scheduler(&registry).tick().await;
        assert_eq!(report.heartbeats_sent, 1);
        assert_eq!(report.evicted, 1);

        let remaining = registry.connections_for(&device("truck-001"));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), live.id());
        assert!(registry.all_connections().iter().all(|h| h.id() != closed.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_worker_ticks_and_shuts_down() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (transport, handle) = connect("truck-001");
        registry.add(handle);

        let worker = HeartbeatScheduler::new(
            registry.clone(),
            HeartbeatConfig {
                interval: Duration::from_secs(30),
                idle_timeout: Duration::from_secs(3600),
            },
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(transport.sent().len(), 2);

        let closed = worker.shutdown().await;
        assert_eq!(closed, 1);
        assert!(!transport.is_open());
        assert_eq!(registry.total_connection_count(), 0);
    }
}
