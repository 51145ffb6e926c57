//! Integration tests for reconnection behavior across connections.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use relay_core::config::ReconnectConfig;
use relay_core::traits::connector::Connector;
use relay_core::types::id::ConnectionId;
use relay_core::{RelayError, RelayResult};
use relay_reliability::reconnect::{GlobalReconnectionManager, ReconnectState};

/// Fails the first `failures` connect calls per test run, then succeeds.
struct ScriptedConnector {
    failures: u32,
    calls: AtomicU32,
}

impl ScriptedConnector {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        })
    }

    fn recovering_after(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _connection_id: &ConnectionId) -> RelayResult<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            Err(RelayError::transport("dial failed"))
        } else {
            Ok(())
        }
    }
}

fn config() -> ReconnectConfig {
    ReconnectConfig {
        max_attempts: 3,
        initial_delay_ms: 100,
        max_delay_ms: 1000,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
        ..ReconnectConfig::default()
    }
}

async fn wait_for_terminal(
    registry: &GlobalReconnectionManager,
    id: &ConnectionId,
    wanted: ReconnectState,
) {
    for _ in 0..1000 {
        if registry.get_or_create(id).state() == wanted {
            return;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
    panic!("connection never reached state {}", wanted.as_str());
}

#[tokio::test(start_paused = true)]
async fn test_connections_reconnect_independently() {
    let registry = GlobalReconnectionManager::new(config(), ScriptedConnector::failing());
    let doomed = ConnectionId::from("c-doomed");
    let banned = ConnectionId::from("c-banned");

    registry.handle_disconnect(&doomed, "network_error", None).await;
    registry
        .handle_disconnect(&banned, "auth_failed", Some("token revoked"))
        .await;

    wait_for_terminal(&registry, &doomed, ReconnectState::Failed).await;

    let doomed_status = registry.get_status(&doomed).expect("status");
    assert_eq!(doomed_status.recent_attempts.len(), 3);
    assert!(!doomed_status.permanent_failure);

    let banned_status = registry.get_status(&banned).expect("status");
    assert!(banned_status.permanent_failure);
    assert!(banned_status.recent_attempts.is_empty());

    let global = registry.get_global_status();
    assert_eq!(global.total_connections, 2);
    assert_eq!(global.failed_connections, 2);
    assert_eq!(global.reconnecting_connections, 0);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_resets_attempt_budget() {
    let registry =
        GlobalReconnectionManager::new(config(), ScriptedConnector::recovering_after(2));
    let id = ConnectionId::from("c1");

    registry.handle_disconnect(&id, "network_error", None).await;
    wait_for_terminal(&registry, &id, ReconnectState::Connected).await;

    let manager = registry.get_or_create(&id);
    let metrics = manager.get_metrics();
    assert_eq!(metrics.failed_attempts, 2);
    assert_eq!(metrics.successful_reconnects, 1);
    assert_eq!(metrics.disconnect_reason_counts.get("network_error"), Some(&1));

    // A later disconnect starts a fresh attempt budget.
    registry.handle_disconnect(&id, "network_error", None).await;
    wait_for_terminal(&registry, &id, ReconnectState::Connected).await;
    assert_eq!(manager.get_metrics().successful_reconnects, 2);

    registry.remove(&id).await;
    assert!(registry.get_status(&id).is_none());
}
