//! Registry of reconnection managers across all connections.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use relay_core::config::ReconnectConfig;
use relay_core::traits::connector::Connector;
use relay_core::types::id::ConnectionId;

use super::manager::ReconnectionManager;
use super::types::{ReconnectState, ReconnectionStatus};

/// Aggregate status across all managed connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalReconnectionStatus {
    pub total_connections: usize,
    pub reconnecting_connections: usize,
    pub failed_connections: usize,
    pub connections: Vec<ReconnectionStatus>,
}

/// Lazily creates one [`ReconnectionManager`] per connection id, all
/// sharing the same configuration and connect capability.
pub struct GlobalReconnectionManager {
    config: ReconnectConfig,
    connector: Arc<dyn Connector>,
    managers: DashMap<ConnectionId, Arc<ReconnectionManager>>,
}

impl GlobalReconnectionManager {
    pub fn new(config: ReconnectConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            managers: DashMap::new(),
        }
    }

    /// Get the manager for a connection, creating it on first access.
    pub fn get_or_create(&self, connection_id: &ConnectionId) -> Arc<ReconnectionManager> {
        self.managers
            .entry(connection_id.clone())
            .or_insert_with(|| {
                debug!(conn_id = %connection_id, "creating reconnection manager");
                Arc::new(ReconnectionManager::new(
                    connection_id.clone(),
                    self.config.clone(),
                    Arc::clone(&self.connector),
                ))
            })
            .clone()
    }

    /// Route a disconnect event to the connection's manager.
    pub async fn handle_disconnect(
        &self,
        connection_id: &ConnectionId,
        reason: &str,
        detail: Option<&str>,
    ) {
        let manager = self.get_or_create(connection_id);
        manager.handle_disconnect(reason, detail).await;
    }

    /// Stop and forget a connection's manager.
    pub async fn remove(&self, connection_id: &ConnectionId) {
        let removed = self.managers.remove(connection_id);
        if let Some((_, manager)) = removed {
            manager.stop_reconnection().await;
            info!(conn_id = %connection_id, "reconnection manager removed");
        }
    }

    /// Status of one connection, if managed.
    pub fn get_status(&self, connection_id: &ConnectionId) -> Option<ReconnectionStatus> {
        self.managers
            .get(connection_id)
            .map(|manager| manager.get_status())
    }

    /// Aggregate status across all managed connections.
    pub fn get_global_status(&self) -> GlobalReconnectionStatus {
        let managers: Vec<Arc<ReconnectionManager>> = self
            .managers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut reconnecting = 0;
        let mut failed = 0;
        let mut connections = Vec::with_capacity(managers.len());
        for manager in &managers {
            match manager.state() {
                ReconnectState::Reconnecting | ReconnectState::Connecting => reconnecting += 1,
                ReconnectState::Failed => failed += 1,
                _ => {}
            }
            connections.push(manager.get_status());
        }

        GlobalReconnectionStatus {
            total_connections: managers.len(),
            reconnecting_connections: reconnecting,
            failed_connections: failed,
            connections,
        }
    }

    /// Stop every managed reconnection loop.
    pub async fn stop_all(&self) {
        let managers: Vec<Arc<ReconnectionManager>> = self
            .managers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for manager in managers {
            manager.stop_reconnection().await;
        }
        info!(count = self.managers.len(), "all reconnection loops stopped");
    }
}
