//! Connection state synchronizer.
//!
//! Compares the transport's authoritative per-connection state against a
//! cached checkpoint, and flags connections that have gone silent for
//! longer than the configured threshold. Divergence is reported to
//! registered handlers; reconciliation itself is the caller's job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use relay_core::config::SyncConfig;
use relay_core::traits::lookup::{ConnectionLookup, TransportInfo};
use relay_core::types::id::ConnectionId;

use super::checkpoint::{StateCheckpoint, SyncEvent, SyncEventHandler, SyncStats, SyncStatus};

/// Detects drift between transport state and cached checkpoints.
pub struct StateSynchronizer {
    config: SyncConfig,
    lookup: Arc<dyn ConnectionLookup>,
    checkpoints: DashMap<ConnectionId, StateCheckpoint>,
    handlers: Mutex<Vec<Arc<dyn SyncEventHandler>>>,
    monitoring_active: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StateSynchronizer {
    pub fn new(config: SyncConfig, lookup: Arc<dyn ConnectionLookup>) -> Self {
        Self {
            config,
            lookup,
            checkpoints: DashMap::new(),
            handlers: Mutex::new(Vec::new()),
            monitoring_active: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Register a handler for desync events.
    pub fn add_event_handler(&self, handler: Arc<dyn SyncEventHandler>) {
        self.lock_handlers().push(handler);
    }

    /// Create a checkpoint for a connection.
    pub fn register_connection(&self, connection_id: &ConnectionId, transport_state: &str) {
        self.checkpoints
            .insert(connection_id.clone(), StateCheckpoint::new(transport_state));
        debug!(conn_id = %connection_id, state = transport_state, "checkpoint registered");
    }

    /// Destroy a connection's checkpoint. Safe to call on unknown ids.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        if self.checkpoints.remove(connection_id).is_some() {
            debug!(conn_id = %connection_id, "checkpoint removed");
        }
    }

    /// Bump a connection's last-activity timestamp; called on real
    /// traffic. No-op for untracked connections.
    pub fn update_connection_activity(&self, connection_id: &ConnectionId) {
        if let Some(mut checkpoint) = self.checkpoints.get_mut(connection_id) {
            checkpoint.last_activity = Utc::now();
        }
    }

    /// Check one connection against the observed transport state.
    ///
    /// Unknown connections are registered and reported synced. A state
    /// mismatch updates the cache before firing handlers, so one
    /// divergence produces exactly one "state_desync" event.
    pub async fn check_connection_sync(
        &self,
        connection_id: &ConnectionId,
        observed: &TransportInfo,
    ) -> bool {
        let (event, snapshot) = {
            let mut entry = match self.checkpoints.get_mut(connection_id) {
                Some(entry) => entry,
                None => {
                    self.register_connection(connection_id, &observed.state);
                    return true;
                }
            };

            if entry.cached_transport_state != observed.state {
                entry.cached_transport_state = observed.state.clone();
                entry.sync_status = SyncStatus::Desynced;
                (Some(SyncEvent::StateDesync), entry.clone())
            } else {
                let idle_seconds = (Utc::now() - entry.last_activity).num_seconds();
                if idle_seconds > self.config.desync_threshold_seconds as i64 {
                    let was_desynced = entry.sync_status == SyncStatus::Desynced;
                    entry.sync_status = SyncStatus::Desynced;
                    if was_desynced {
                        (None, entry.clone())
                    } else {
                        (Some(SyncEvent::ActivityTimeout), entry.clone())
                    }
                } else {
                    entry.sync_status = SyncStatus::Synced;
                    return true;
                }
            }
        };

        if let Some(event) = event {
            warn!(
                conn_id = %connection_id,
                event = event.as_str(),
                state = %snapshot.cached_transport_state,
                "connection desynced"
            );
            self.fire_event(connection_id, event, &snapshot).await;
        }
        false
    }

    /// Start the background reconciliation loop.
    pub async fn start(self: &Arc<Self>) {
        if self.monitoring_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.lock_shutdown() = Some(shutdown_tx);
        let synchronizer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            synchronizer.run_sync_loop(shutdown_rx).await;
        });
        *self.task.lock().await = Some(handle);
        info!(
            interval_seconds = self.config.check_interval_seconds,
            "state synchronizer started"
        );
    }

    /// Stop the loop and wait for it to finish.
    pub async fn stop(&self) {
        if !self.monitoring_active.swap(false, Ordering::SeqCst) {
            return;
        }
        let shutdown = self.lock_shutdown().take();
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
        info!("state synchronizer stopped");
    }

    /// Aggregate report over all tracked connections.
    pub fn get_sync_stats(&self) -> SyncStats {
        let total = self.checkpoints.len();
        let synced = self
            .checkpoints
            .iter()
            .filter(|entry| entry.sync_status == SyncStatus::Synced)
            .count();
        let sync_rate = if total == 0 {
            1.0
        } else {
            synced as f64 / total as f64
        };
        SyncStats {
            total_monitored_connections: total,
            synced_connections: synced,
            desynced_connections: total - synced,
            sync_rate,
            monitoring_active: self.monitoring_active.load(Ordering::SeqCst),
        }
    }

    async fn run_sync_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.check_interval_seconds);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = time::sleep(interval) => {
                    self.reconcile_all().await;
                }
            }
        }
    }

    /// One reconciliation pass over every tracked connection.
    async fn reconcile_all(&self) {
        let ids: Vec<ConnectionId> = self
            .checkpoints
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for connection_id in ids {
            match self.lookup.lookup(&connection_id).await {
                Some(info) => {
                    self.check_connection_sync(&connection_id, &info).await;
                }
                None => {
                    // The outer system has forgotten this connection.
                    info!(conn_id = %connection_id, "connection gone, dropping checkpoint");
                    self.unregister_connection(&connection_id);
                }
            }
        }
    }

    async fn fire_event(
        &self,
        connection_id: &ConnectionId,
        event: SyncEvent,
        checkpoint: &StateCheckpoint,
    ) {
        let handlers: Vec<_> = self.lock_handlers().clone();
        for handler in handlers {
            if let Err(error) = handler.on_desync(connection_id, event, checkpoint).await {
                warn!(
                    conn_id = %connection_id,
                    event = event.as_str(),
                    %error,
                    "sync event handler failed"
                );
            }
        }
    }

    fn lock_handlers(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn SyncEventHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_shutdown(&self) -> std::sync::MutexGuard<'_, Option<watch::Sender<bool>>> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use relay_core::{RelayError, RelayResult};

    use super::*;

    struct StaticLookup {
        info: Option<TransportInfo>,
    }

    #[async_trait]
    impl ConnectionLookup for StaticLookup {
        async fn lookup(&self, _connection_id: &ConnectionId) -> Option<TransportInfo> {
            self.info.clone()
        }
    }

    struct RecordingHandler {
        events: Mutex<Vec<(String, SyncEvent)>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SyncEventHandler for RecordingHandler {
        async fn on_desync(
            &self,
            connection_id: &ConnectionId,
            event: SyncEvent,
            _checkpoint: &StateCheckpoint,
        ) -> RelayResult<()> {
            self.events
                .lock()
                .unwrap()
                .push((connection_id.to_string(), event));
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl SyncEventHandler for FailingHandler {
        async fn on_desync(
            &self,
            _connection_id: &ConnectionId,
            _event: SyncEvent,
            _checkpoint: &StateCheckpoint,
        ) -> RelayResult<()> {
            Err(RelayError::internal("handler broke"))
        }
    }

    fn synchronizer(lookup: Option<TransportInfo>) -> Arc<StateSynchronizer> {
        Arc::new(StateSynchronizer::new(
            SyncConfig::default(),
            Arc::new(StaticLookup { info: lookup }),
        ))
    }

    #[tokio::test]
    async fn test_first_check_registers_and_syncs() {
        let sync = synchronizer(None);
        let id = ConnectionId::from("c1");

        assert!(sync.check_connection_sync(&id, &TransportInfo::new("open")).await);

        let stats = sync.get_sync_stats();
        assert_eq!(stats.total_monitored_connections, 1);
        assert_eq!(stats.synced_connections, 1);
    }

    #[tokio::test]
    async fn test_state_mismatch_fires_exactly_once() {
        let sync = synchronizer(None);
        let handler = RecordingHandler::new();
        sync.add_event_handler(handler.clone());
        let id = ConnectionId::from("c1");

        assert!(sync.check_connection_sync(&id, &TransportInfo::new("open")).await);
        assert!(!sync.check_connection_sync(&id, &TransportInfo::new("closing")).await);
        // Cache was updated; the same observed state is no longer a
        // divergence.
        assert!(sync.check_connection_sync(&id, &TransportInfo::new("closing")).await);

        let events = handler.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], ("c1".to_string(), SyncEvent::StateDesync));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_timeout_flags_silent_connection() {
        let sync = synchronizer(None);
        let handler = RecordingHandler::new();
        sync.add_event_handler(handler.clone());
        let id = ConnectionId::from("c1");
        sync.register_connection(&id, "open");

        // Checkpoint timestamps use wall-clock time, so rewrite
        // last_activity directly instead of sleeping.
        sync.checkpoints.get_mut(&id).unwrap().last_activity =
            Utc::now() - chrono::Duration::seconds(31);

        assert!(!sync.check_connection_sync(&id, &TransportInfo::new("open")).await);
        assert_eq!(
            handler.events.lock().unwrap().as_slice(),
            &[("c1".to_string(), SyncEvent::ActivityTimeout)]
        );

        // Fresh activity restores the synced verdict.
        sync.update_connection_activity(&id);
        assert!(sync.check_connection_sync(&id, &TransportInfo::new("open")).await);
        assert_eq!(sync.get_sync_stats().synced_connections, 1);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let sync = synchronizer(None);
        let recording = RecordingHandler::new();
        sync.add_event_handler(Arc::new(FailingHandler));
        sync.add_event_handler(recording.clone());
        let id = ConnectionId::from("c1");

        sync.check_connection_sync(&id, &TransportInfo::new("open")).await;
        sync.check_connection_sync(&id, &TransportInfo::new("closed")).await;

        assert_eq!(recording.events.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_drops_forgotten_connections() {
        let sync = synchronizer(None);
        sync.register_connection(&ConnectionId::from("c1"), "open");
        sync.register_connection(&ConnectionId::from("c2"), "open");

        sync.start().await;
        time::sleep(Duration::from_secs(11)).await;
        sync.stop().await;

        let stats = sync.get_sync_stats();
        assert_eq!(stats.total_monitored_connections, 0);
        assert!(!stats.monitoring_active);
    }

    #[tokio::test]
    async fn test_empty_stats_report_full_sync_rate() {
        let sync = synchronizer(None);
        let stats = sync.get_sync_stats();
        assert_eq!(stats.total_monitored_connections, 0);
        assert_eq!(stats.sync_rate, 1.0);
        assert!(!stats.monitoring_active);
    }
}
