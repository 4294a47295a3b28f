//! Device → connections map.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use cloudwatcher_core::DeviceId;

use crate::connection::{ConnectionHandle, ConnectionId, TransportError};

/// Upper bound on a single send before it counts as failed.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of registry counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatistics {
    pub total_connections: usize,
    pub connected_devices: usize,
    pub snapshot_time: DateTime<Utc>,
}

type DeviceConnections = HashMap<DeviceId, Vec<Arc<ConnectionHandle>>>;

/// Single source of truth for which connections exist for which device.
///
/// One mutex guards every structural mutation and every count. It is never held
/// across an await: reads copy a snapshot out, and sends and closes happen on the
/// snapshot. A device key exists only while it has at least one handle.
#[derive(Debug)]
pub struct ConnectionRegistry {
    devices: Mutex<DeviceConnections>,
    send_timeout: Duration,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            send_timeout,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        let device_id = handle.device_id().clone();
        let connection_id = handle.id();

        let device_total = {
            let mut devices = self.lock();
            let set = devices.entry(device_id.clone()).or_default();
            set.push(handle);
            set.len()
        };

        info!(device_id = %device_id, connection_id = %connection_id, device_total, "connection added");
    }

    /// Remove one connection and close its transport in the background.
    ///
    /// Returns `false` (and closes nothing) when the connection is not registered.
    pub fn remove(&self, device_id: &DeviceId, connection_id: ConnectionId) -> bool {
        let removed = {
            let mut devices = self.lock();
            let Some(set) = devices.get_mut(device_id) else {
                return false;
            };
            let Some(pos) = set.iter().position(|h| h.id() == connection_id) else {
                return false;
            };
            let handle = set.swap_remove(pos);
            if set.is_empty() {
                devices.remove(device_id);
            }
            handle
        };

        info!(device_id = %device_id, connection_id = %connection_id, "connection removed");

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { removed.close().await });
            }
            Err(_) => {
                warn!(
                    device_id = %device_id,
                    connection_id = %connection_id,
                    "no async runtime; transport left for its owner to close"
                );
            }
        }
        true
    }

    /// Connected handles for `device_id`, copied out of the map.
    pub fn connections_for(&self, device_id: &DeviceId) -> Vec<Arc<ConnectionHandle>> {
        self.lock()
            .get(device_id)
            .map(|set| set.iter().filter(|h| h.is_connected()).cloned().collect())
            .unwrap_or_default()
    }

    /// Every registered handle, connected or not.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.lock().values().flatten().cloned().collect()
    }

    pub fn connected_device_ids(&self) -> BTreeSet<DeviceId> {
        self.lock().keys().cloned().collect()
    }

    pub fn total_connection_count(&self) -> usize {
        self.lock()
            .values()
            .flatten()
            .filter(|h| h.is_connected())
            .count()
    }

    pub fn connection_count_for(&self, device_id: &DeviceId) -> usize {
        self.lock()
            .get(device_id)
            .map(|set| set.iter().filter(|h| h.is_connected()).count())
            .unwrap_or(0)
    }

    /// Send `message` to every connected handle of one device.
    ///
    /// Sends run concurrently; a failure on one handle never stops the others.
    /// Returns the number of successful sends.
    pub async fn broadcast_to_device(&self, device_id: &DeviceId, message: &str) -> usize {
        let handles = self.connections_for(device_id);
        if handles.is_empty() {
            debug!(device_id = %device_id, "no connections to broadcast to");
            return 0;
        }

        let attempted = handles.len();
        let results = join_all(
            handles
                .iter()
                .map(|handle| self.send_bounded(handle, message.to_string(), false)),
        )
        .await;
        let sent = results.into_iter().filter(|ok| *ok).count();

        debug!(device_id = %device_id, sent, attempted, "broadcast to device");
        sent
    }

    /// Broadcast to every known device. Devices with zero successful sends are omitted.
    pub async fn broadcast_to_all(&self, message: &str) -> HashMap<DeviceId, usize> {
        let devices = self.connected_device_ids();
        let counts = join_all(devices.into_iter().map(|device_id| async move {
            let sent = self.broadcast_to_device(&device_id, message).await;
            (device_id, sent)
        }))
        .await;

        counts.into_iter().filter(|(_, sent)| *sent > 0).collect()
    }

    /// Send a keepalive frame (does not refresh activity). Returns whether it succeeded.
    pub async fn send_heartbeat(&self, handle: &ConnectionHandle, frame: String) -> bool {
        self.send_bounded(handle, frame, true).await
    }

    /// Drop every connection and close their transports.
    pub async fn close_all(&self) -> usize {
        let handles: Vec<_> = {
            let mut devices = self.lock();
            devices.drain().flat_map(|(_, set)| set).collect()
        };
        let count = handles.len();

        join_all(handles.iter().map(|h| h.close())).await;

        if count > 0 {
            info!(closed = count, "closed all connections");
        }
        count
    }

    pub fn statistics(&self) -> ConnectionStatistics {
        let devices = self.lock();
        ConnectionStatistics {
            total_connections: devices
                .values()
                .flatten()
                .filter(|h| h.is_connected())
                .count(),
            connected_devices: devices.len(),
            snapshot_time: Utc::now(),
        }
    }

    async fn send_bounded(&self, handle: &ConnectionHandle, text: String, heartbeat: bool) -> bool {
        let send = async {
            if heartbeat {
                handle.send_heartbeat(text).await
            } else {
                handle.send(text).await
            }
        };
        let result = match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    device_id = %handle.device_id(),
                    connection_id = %handle.id(),
                    error = %err,
                    "send failed"
                );
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceConnections> {
        // The map is only mutated in short non-panicking sections.
        self.devices.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Transport;
    use crate::test_support::{connect, device};

    use proptest::prelude::*;

    #[tokio::test]
    async fn add_then_remove_drops_the_device_key() {
        let registry = ConnectionRegistry::new();
        let (transport, handle) = connect("truck-001");

        registry.add(handle.clone());
        assert!(registry.connected_device_ids().contains(&device("truck-001")));

        assert!(registry.remove(handle.device_id(), handle.id()));
        assert!(registry.connected_device_ids().is_empty());
        assert_eq!(registry.total_connection_count(), 0);

        // Removing again is a no-op.
        assert!(!registry.remove(handle.device_id(), handle.id()));

        for _ in 0..10 {
            if !transport.is_open() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn broadcast_counts_only_successful_sends() {
        let registry = ConnectionRegistry::new();
        let mut transports = Vec::new();
        for _ in 0..4 {
            let (transport, handle) = connect("truck-001");
            registry.add(handle);
            transports.push(transport);
        }
        transports[0].fail_sends();
        transports[1].fail_sends();

        let sent = registry.broadcast_to_device(&device("truck-001"), "hi").await;
        assert_eq!(sent, 2);
        assert_eq!(transports[2].sent(), vec!["hi".to_string()]);
        assert_eq!(registry.broadcast_to_device(&device("nobody"), "hi").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_sends_time_out_without_blocking_others() {
        let registry = ConnectionRegistry::with_send_timeout(Duration::from_secs(2));
        let (stuck, a) = connect("truck-001");
        let (_ok, b) = connect("truck-001");
        stuck.hang_sends();
        registry.add(a);
        registry.add(b);

        let started = tokio::time::Instant::now();
        let sent = registry.broadcast_to_device(&device("truck-001"), "hi").await;

        assert_eq!(sent, 1);
        assert!(started.elapsed() <= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn broadcast_to_all_omits_devices_without_deliveries() {
        let registry = ConnectionRegistry::new();
        let (_a, h1) = connect("truck-001");
        let (_b, h2) = connect("truck-002");
        let (broken, h3) = connect("truck-003");
        broken.fail_sends();
        for h in [h1, h2, h3] {
            registry.add(h);
        }

        let counts = registry.broadcast_to_all("all").await;
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&device("truck-001")], 1);
        assert!(!counts.contains_key(&device("truck-003")));
    }

    #[tokio::test]
    async fn snapshots_exclude_disconnected_handles() {
        let registry = ConnectionRegistry::new();
        let (gone, h1) = connect("truck-001");
        let (_live, h2) = connect("truck-001");
        registry.add(h1);
        registry.add(h2);
        gone.drop_connection();

        assert_eq!(registry.connections_for(&device("truck-001")).len(), 1);
        assert_eq!(registry.all_connections().len(), 2);
        assert_eq!(registry.connection_count_for(&device("truck-001")), 1);
        let stats = registry.statistics();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.connected_devices, 1);
    }

    #[tokio::test]
    async fn close_all_empties_the_registry() {
        let registry = ConnectionRegistry::new();
        let (t1, h1) = connect("truck-001");
        let (t2, h2) = connect("truck-002");
        registry.add(h1);
        registry.add(h2);

        assert_eq!(registry.close_all().await, 2);
        assert!(registry.connected_device_ids().is_empty());
        assert!(!t1.is_open() && !t2.is_open());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Remove(u8, usize),
        Disconnect(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4).prop_map(Op::Add),
            (0u8..4, 0usize..8).prop_map(|(d, i)| Op::Remove(d, i)),
            (0usize..16).prop_map(Op::Disconnect),
        ]
    }

    proptest! {
        #[test]
        fn total_count_matches_per_device_snapshots(ops in prop::collection::vec(op(), 0..40)) {
            let registry = ConnectionRegistry::new();
            let mut transports = Vec::new();

            for op in ops {
                match op {
                    Op::Add(d) => {
                        let (t, h) = connect(&format!("dev-{d}"));
                        registry.add(h);
                        transports.push(t);
                    }
                    Op::Remove(d, i) => {
                        let id = device(&format!("dev-{d}"));
                        let handles = registry.all_connections();
                        let mine: Vec<_> = handles.iter().filter(|h| h.device_id() == &id).collect();
                        if let Some(h) = mine.get(i) {
                            registry.remove(&id, h.id());
                        }
                    }
                    Op::Disconnect(i) => {
                        if let Some(t) = transports.get(i) {
                            t.drop_connection();
                        }
                    }
                }

                let ids = registry.connected_device_ids();
                let sum: usize = ids.iter().map(|d| registry.connections_for(d).len()).sum();
                prop_assert_eq!(registry.total_connection_count(), sum);
                for d in &ids {
                    prop_assert!(registry.all_connections().iter().any(|h| h.device_id() == d));
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_add_remove_and_broadcast_keep_the_map_consistent() {
        const TASKS: usize = 32;
        const ROUNDS: usize = 50;
        let registry = Arc::new(ConnectionRegistry::new());
        let devices = ["truck-001", "truck-002", "truck-003"];

        let tasks: Vec<_> = (0..TASKS)
            .map(|task| {
                let registry = Arc::clone(&registry);
                let device_id = devices[task % devices.len()];
                tokio::spawn(async move {
                    for round in 0..ROUNDS {
                        let (_transport, handle) = connect(device_id);
                        registry.add(handle.clone());
                        registry.broadcast_to_device(handle.device_id(), "ping").await;
                        if round % 10 == 0 {
                            registry.broadcast_to_all("tick").await;
                        }
                        // Every fourth connection stays registered.
                        if (task + round) % 4 != 0 {
                            assert!(registry.remove(handle.device_id(), handle.id()));
                        }
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let ids = registry.connected_device_ids();
        for id in &ids {
            assert!(!registry.connections_for(id).is_empty(), "empty entry kept for {id}");
        }
        let per_device: usize = ids.iter().map(|id| registry.connections_for(id).len()).sum();
        assert_eq!(registry.total_connection_count(), per_device);

        let kept = (0..TASKS)
            .flat_map(|task| (0..ROUNDS).filter(move |round| (task + round) % 4 == 0))
            .count();
        assert_eq!(per_device, kept);
        assert_eq!(registry.statistics().connected_devices, ids.len());
    }
}
