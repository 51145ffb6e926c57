//! Per-connection reconnection state machine.
//!
//! One manager owns the reconnection lifecycle of a single connection:
//! it reacts to disconnect events, runs at most one backoff loop at a
//! time, and reports status and running metrics. Different connections
//! reconnect fully independently.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use relay_core::config::ReconnectConfig;
use relay_core::traits::connector::Connector;
use relay_core::types::id::ConnectionId;

use super::backoff;
use super::types::{
    ReconnectObserver, ReconnectState, ReconnectionAttempt, ReconnectionMetrics,
    ReconnectionStatus,
};

/// Mutable state guarded by one lock; never held across an await.
struct Inner {
    state: ReconnectState,
    current_attempt: u32,
    permanent_failure: bool,
    /// Pre-jitter delay for the next attempt, in milliseconds. Stays
    /// elevated after a reconnect until the connection has been stable
    /// for reset_delay_after_success_ms.
    baseline_delay_ms: f64,
    history: Vec<ReconnectionAttempt>,
    metrics: ReconnectionMetrics,
    disconnected_at: Option<Instant>,
    last_disconnect_time: Option<DateTime<Utc>>,
    last_successful_connect_time: Option<DateTime<Utc>>,
}

/// Reconnection manager for a single connection.
pub struct ReconnectionManager {
    connection_id: ConnectionId,
    config: ReconnectConfig,
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    observers: Mutex<Vec<Arc<dyn ReconnectObserver>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    reset_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectionManager {
    pub fn new(
        connection_id: ConnectionId,
        config: ReconnectConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let baseline_delay_ms = config.initial_delay_ms as f64;
        Self {
            connection_id,
            config,
            connector,
            inner: Mutex::new(Inner {
                state: ReconnectState::Connected,
                current_attempt: 0,
                permanent_failure: false,
                baseline_delay_ms,
                history: Vec::new(),
                metrics: ReconnectionMetrics::default(),
                disconnected_at: None,
                last_disconnect_time: None,
                last_successful_connect_time: None,
            }),
            observers: Mutex::new(Vec::new()),
            shutdown: Mutex::new(None),
            task: tokio::sync::Mutex::new(None),
            reset_task: tokio::sync::Mutex::new(None),
        }
    }

    /// Register an observer for state transitions.
    pub fn add_observer(&self, observer: Arc<dyn ReconnectObserver>) {
        self.lock_inner_observers().push(observer);
    }

    /// React to a disconnect event.
    ///
    /// Permanent reasons go straight to FAILED with zero attempts.
    /// Otherwise the backoff loop is (re)started, cancelling any prior
    /// loop first so at most one runs per connection.
    pub async fn handle_disconnect(self: &Arc<Self>, reason: &str, detail: Option<&str>) {
        self.cancel_loop().await;

        let now = Utc::now();
        {
            let mut inner = self.lock_inner();
            inner.metrics.total_disconnects += 1;
            *inner
                .metrics
                .disconnect_reason_counts
                .entry(reason.to_string())
                .or_insert(0) += 1;
            inner.metrics.last_disconnect_time = Some(now);
            inner.last_disconnect_time = Some(now);
            inner.disconnected_at = Some(Instant::now());
            inner.current_attempt = 0;
        }

        info!(
            conn_id = %self.connection_id,
            reason,
            detail = detail.unwrap_or(""),
            "connection disconnected"
        );

        if self.config.is_permanent_failure(reason) {
            {
                let mut inner = self.lock_inner();
                inner.state = ReconnectState::Failed;
                inner.permanent_failure = true;
            }
            warn!(
                conn_id = %self.connection_id,
                reason,
                "permanent failure reason, reconnection abandoned"
            );
            self.notify(ReconnectState::Failed, 0).await;
            return;
        }

        if !self.config.enabled {
            self.lock_inner().state = ReconnectState::Disabled;
            self.notify(ReconnectState::Disabled, 0).await;
            return;
        }

        self.lock_inner().state = ReconnectState::Reconnecting;
        self.notify(ReconnectState::Reconnecting, 0).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.lock_shutdown() = Some(shutdown_tx);
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.run_reconnect_loop(shutdown_rx).await;
        });
        *self.task.lock().await = Some(handle);
    }

    /// Cooperatively stop the reconnection loop and wait for it.
    ///
    /// The state is left as-is; no attempt in progress is interrupted
    /// mid-connect, only the backoff sleeps are cancellable.
    pub async fn stop_reconnection(&self) {
        debug!(conn_id = %self.connection_id, "stopping reconnection");
        self.cancel_loop().await;
    }

    /// Current state.
    pub fn state(&self) -> ReconnectState {
        self.lock_inner().state
    }

    pub fn is_reconnecting(&self) -> bool {
        matches!(
            self.state(),
            ReconnectState::Reconnecting | ReconnectState::Connecting
        )
    }

    /// Status report with the most recent 10 attempts.
    pub fn get_status(&self) -> ReconnectionStatus {
        let inner = self.lock_inner();
        let recent_start = inner.history.len().saturating_sub(10);
        ReconnectionStatus {
            connection_id: self.connection_id.to_string(),
            state: inner.state.as_str().to_string(),
            current_attempt: inner.current_attempt,
            max_attempts: self.config.max_attempts,
            permanent_failure: inner.permanent_failure,
            reconnection_enabled: self.config.enabled,
            last_disconnect_time: inner.last_disconnect_time,
            last_successful_connect_time: inner.last_successful_connect_time,
            next_attempt_delay_ms: inner.baseline_delay_ms as u64,
            recent_attempts: inner.history[recent_start..].to_vec(),
        }
    }

    /// Running per-connection aggregates.
    pub fn get_metrics(&self) -> ReconnectionMetrics {
        self.lock_inner().metrics.clone()
    }

    async fn run_reconnect_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            let (attempt, delay) = {
                let mut inner = self.lock_inner();
                if inner.current_attempt >= self.config.max_attempts {
                    break;
                }
                inner.current_attempt += 1;
                let base = inner.baseline_delay_ms;
                inner.baseline_delay_ms = backoff::advance_baseline(base, &self.config);
                (
                    inner.current_attempt,
                    backoff::apply_jitter(base, self.config.jitter_factor),
                )
            };

            debug!(
                conn_id = %self.connection_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "waiting before reconnection attempt"
            );
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = time::sleep(delay) => {}
            }
            if *shutdown_rx.borrow() {
                return;
            }

            self.lock_inner().state = ReconnectState::Connecting;
            self.notify(ReconnectState::Connecting, attempt).await;

            let attempt_time = Utc::now();
            let started = Instant::now();
            let result = self.connector.connect(&self.connection_id).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    {
                        let mut inner = self.lock_inner();
                        inner.history.push(ReconnectionAttempt {
                            attempt_number: attempt,
                            timestamp: attempt_time,
                            delay_ms: delay.as_millis() as u64,
                            success: true,
                            error: None,
                            duration_ms,
                        });
                        inner.metrics.total_attempts += 1;
                        inner.metrics.successful_reconnects += 1;
                        inner.metrics.last_success_time = Some(Utc::now());
                        if let Some(disconnected_at) = inner.disconnected_at.take() {
                            let downtime_ms = disconnected_at.elapsed().as_millis() as u64;
                            let n = inner.metrics.successful_reconnects as f64;
                            inner.metrics.avg_reconnect_time_ms +=
                                (downtime_ms as f64 - inner.metrics.avg_reconnect_time_ms) / n;
                            inner.metrics.longest_downtime_ms =
                                inner.metrics.longest_downtime_ms.max(downtime_ms);
                        }
                        inner.state = ReconnectState::Connected;
                        inner.current_attempt = 0;
                        inner.last_successful_connect_time = Some(Utc::now());
                    }
                    info!(
                        conn_id = %self.connection_id,
                        attempt,
                        duration_ms,
                        "reconnected"
                    );
                    self.notify(ReconnectState::Connected, attempt).await;
                    self.schedule_baseline_reset().await;
                    return;
                }
                Err(error) => {
                    {
                        let mut inner = self.lock_inner();
                        inner.history.push(ReconnectionAttempt {
                            attempt_number: attempt,
                            timestamp: attempt_time,
                            delay_ms: delay.as_millis() as u64,
                            success: false,
                            error: Some(error.to_string()),
                            duration_ms,
                        });
                        inner.metrics.total_attempts += 1;
                        inner.metrics.failed_attempts += 1;
                        inner.state = ReconnectState::Reconnecting;
                    }
                    warn!(
                        conn_id = %self.connection_id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        %error,
                        "reconnection attempt failed"
                    );
                    self.notify(ReconnectState::Reconnecting, attempt).await;
                }
            }
        }

        self.lock_inner().state = ReconnectState::Failed;
        warn!(
            conn_id = %self.connection_id,
            max_attempts = self.config.max_attempts,
            "reconnection attempts exhausted"
        );
        self.notify(ReconnectState::Failed, self.config.max_attempts)
            .await;
    }

    /// A connection that stays up long enough forgives prior failures:
    /// the backoff baseline returns to initial_delay_ms.
    async fn schedule_baseline_reset(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            time::sleep(time::Duration::from_millis(
                manager.config.reset_delay_after_success_ms,
            ))
            .await;
            let mut inner = manager.lock_inner();
            if inner.state == ReconnectState::Connected {
                inner.baseline_delay_ms = manager.config.initial_delay_ms as f64;
                debug!(conn_id = %manager.connection_id, "backoff baseline reset");
            }
        });
        if let Some(previous) = self.reset_task.lock().await.replace(handle) {
            previous.abort();
        }
    }

    async fn cancel_loop(&self) {
        let shutdown = self.lock_shutdown().take();
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.reset_task.lock().await.take() {
            handle.abort();
        }
    }

    async fn notify(&self, state: ReconnectState, attempt: u32) {
        let observers: Vec<_> = self.lock_inner_observers().clone();
        for observer in observers {
            if let Err(error) = observer
                .on_state_change(&self.connection_id, state, attempt)
                .await
            {
                warn!(
                    conn_id = %self.connection_id,
                    state = state.as_str(),
                    %error,
                    "reconnect observer failed"
                );
            }
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_inner_observers(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ReconnectObserver>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_shutdown(&self) -> std::sync::MutexGuard<'_, Option<watch::Sender<bool>>> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
