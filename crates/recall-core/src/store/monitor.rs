//! Connection pool monitoring and metrics collection.
//!
//! A background task snapshots pool statistics on a fixed interval into a
//! bounded history and raises alerts on exhaustion, latency, and failure
//! deltas. The task observes the pool through a closure over a weak handle,
//! so a monitor never keeps a closed pool alive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::store::pool::PoolStats;

/// Bounded history length for metrics and alerts.
const HISTORY_LIMIT: usize = 1000;

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Alert raised by the pool monitor.
#[derive(Debug, Clone, Serialize)]
pub struct PoolAlert {
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metric_name: Option<String>,
    pub metric_value: Option<f64>,
}

/// Snapshot of pool metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetrics {
    pub timestamp: DateTime<Utc>,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub total_connections: usize,
    pub acquire_latency_p95_ms: f64,
    pub acquire_latency_avg_ms: f64,
    pub total_acquires: u64,
    pub total_releases: u64,
    pub total_timeouts: u64,
    pub total_health_failures: u64,
}

/// Monitor thresholds and cadence.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub collection_interval: Duration,
    /// Utilization fraction that triggers an exhaustion alert
    pub exhaustion_threshold: f64,
    /// P95 acquire latency that triggers a latency alert
    pub latency_threshold_ms: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(30),
            exhaustion_threshold: 0.9,
            latency_threshold_ms: 100.0,
        }
    }
}

/// Monitor bookkeeping counters and recent state.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub running: bool,
    pub total_collections: u64,
    pub total_alerts: u64,
    pub metrics_history_size: usize,
    pub alerts_history_size: usize,
    pub last_collection: Option<DateTime<Utc>>,
}

struct MonitorShared {
    config: MonitorConfig,
    running: AtomicBool,
    metrics: Mutex<VecDeque<PoolMetrics>>,
    alerts: Mutex<VecDeque<PoolAlert>>,
    total_collections: AtomicU64,
    total_alerts: AtomicU64,
    last_collection: Mutex<Option<DateTime<Utc>>>,
    alert_tx: Mutex<Option<UnboundedSender<PoolAlert>>>,
}

impl MonitorShared {
    /// Snapshot pool stats into the history and evaluate alert thresholds.
    fn collect(&self, stats: &PoolStats) {
        let metrics = PoolMetrics {
            timestamp: Utc::now(),
            active_connections: stats.active_connections,
            idle_connections: stats.idle_connections,
            total_connections: stats.pool_size,
            acquire_latency_p95_ms: stats.p95_acquire_time_ms,
            acquire_latency_avg_ms: stats.avg_acquire_time_ms,
            total_acquires: stats.total_acquires,
            total_releases: stats.total_releases,
            total_timeouts: stats.total_timeouts,
            total_health_failures: stats.total_health_failures,
        };

        let previous = {
            let mut history = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
            let previous = history.back().cloned();
            history.push_back(metrics.clone());
            while history.len() > HISTORY_LIMIT {
                history.pop_front();
            }
            previous
        };
        self.total_collections.fetch_add(1, Ordering::SeqCst);
        *self.last_collection.lock().unwrap_or_else(|e| e.into_inner()) = Some(metrics.timestamp);

        self.check_alerts(&metrics, previous.as_ref());

        tracing::debug!(
            active = metrics.active_connections,
            idle = metrics.idle_connections,
            p95_ms = metrics.acquire_latency_p95_ms,
            "metrics collected"
        );
    }

    fn check_alerts(&self, metrics: &PoolMetrics, previous: Option<&PoolMetrics>) {
        if metrics.total_connections > 0 {
            let utilization = metrics.active_connections as f64 / metrics.total_connections as f64;
            if utilization >= self.config.exhaustion_threshold {
                let severity = if utilization < 0.95 {
                    AlertSeverity::Warning
                } else {
                    AlertSeverity::Critical
                };
                self.raise(
                    severity,
                    format!(
                        "Pool exhaustion: {:.1}% utilization ({}/{} active)",
                        utilization * 100.0,
                        metrics.active_connections,
                        metrics.total_connections
                    ),
                    "pool_utilization",
                    utilization,
                );
            }
        }

        if metrics.acquire_latency_p95_ms > self.config.latency_threshold_ms {
            self.raise(
                AlertSeverity::Warning,
                format!(
                    "High acquire latency: P95={:.2}ms (threshold={}ms)",
                    metrics.acquire_latency_p95_ms, self.config.latency_threshold_ms
                ),
                "acquire_latency_p95_ms",
                metrics.acquire_latency_p95_ms,
            );
        }

        if let Some(previous) = previous {
            let new_timeouts = metrics.total_timeouts.saturating_sub(previous.total_timeouts);
            if new_timeouts > 0 {
                self.raise(
                    AlertSeverity::Warning,
                    format!("Connection timeouts detected: {new_timeouts} new timeout(s)"),
                    "timeouts",
                    new_timeouts as f64,
                );
            }

            let new_failures = metrics
                .total_health_failures
                .saturating_sub(previous.total_health_failures);
            if new_failures > 0 {
                self.raise(
                    AlertSeverity::Warning,
                    format!("Health check failures detected: {new_failures} new failure(s)"),
                    "health_failures",
                    new_failures as f64,
                );
            }
        }
    }

    fn raise(&self, severity: AlertSeverity, message: String, metric_name: &str, metric_value: f64) {
        let alert = PoolAlert {
            severity,
            message,
            timestamp: Utc::now(),
            metric_name: Some(metric_name.to_string()),
            metric_value: Some(metric_value),
        };

        {
            let mut alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
            alerts.push_back(alert.clone());
            while alerts.len() > HISTORY_LIMIT {
                alerts.pop_front();
            }
        }
        self.total_alerts.fetch_add(1, Ordering::SeqCst);

        match severity {
            AlertSeverity::Critical => tracing::error!(alert = %alert.message, "pool alert"),
            _ => tracing::warn!(alert = %alert.message, "pool alert"),
        }

        let sender = self.alert_tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = sender.as_ref() {
            if tx.send(alert).is_err() {
                tracing::debug!("alert receiver dropped");
            }
        }
    }
}

/// Background monitor over one connection pool.
pub struct PoolMonitor {
    shared: Arc<MonitorShared>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PoolMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let interval = config.collection_interval;
        tracing::info!(
            interval_s = interval.as_secs(),
            exhaustion = config.exhaustion_threshold,
            latency_ms = config.latency_threshold_ms,
            "pool monitor initialized"
        );
        Self {
            shared: Arc::new(MonitorShared {
                config,
                running: AtomicBool::new(false),
                metrics: Mutex::new(VecDeque::new()),
                alerts: Mutex::new(VecDeque::new()),
                total_collections: AtomicU64::new(0),
                total_alerts: AtomicU64::new(0),
                last_collection: Mutex::new(None),
                alert_tx: Mutex::new(None),
            }),
            interval,
            handle: Mutex::new(None),
        }
    }

    /// Deliver every raised alert to this channel as well as the log.
    pub fn set_alert_sender(&self, sender: UnboundedSender<PoolAlert>) {
        *self
            .shared
            .alert_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(sender);
    }

    /// Start collecting. `observe` returns the pool's current stats, or
    /// `None` once the pool is gone, which ends the loop.
    pub(crate) fn start<O>(&self, observe: O)
    where
        O: Fn() -> Option<PoolStats> + Send + Sync + 'static,
    {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("monitor already running");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            tracing::debug!("monitor loop starting");
            while shared.running.load(Ordering::SeqCst) {
                match observe() {
                    Some(stats) => shared.collect(&stats),
                    None => break,
                }
                tokio::time::sleep(interval).await;
            }
            tracing::debug!("monitor loop stopped");
        });
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        tracing::info!("pool monitor started");
    }

    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            tracing::debug!("monitor not running");
            return;
        }
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        tracing::info!("pool monitor stopped");
    }

    /// One collection pass outside the background loop.
    pub fn collect_now(&self, stats: &PoolStats) {
        self.shared.collect(stats);
    }

    pub fn current_metrics(&self) -> Option<PoolMetrics> {
        self.shared
            .metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .back()
            .cloned()
    }

    /// Recent metrics, newest first.
    pub fn metrics_history(&self, limit: usize) -> Vec<PoolMetrics> {
        let history = self.shared.metrics.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Recent alerts, newest first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<PoolAlert> {
        let alerts = self.shared.alerts.lock().unwrap_or_else(|e| e.into_inner());
        alerts.iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            running: self.shared.running.load(Ordering::SeqCst),
            total_collections: self.shared.total_collections.load(Ordering::SeqCst),
            total_alerts: self.shared.total_alerts.load(Ordering::SeqCst),
            metrics_history_size: self
                .shared
                .metrics
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            alerts_history_size: self
                .shared
                .alerts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len(),
            last_collection: *self
                .shared
                .last_collection
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        }
    }
}
