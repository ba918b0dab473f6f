//! Tiered health checking for pooled vector store connections.
//!
//! Three levels trade thoroughness for latency:
//! - FAST (<=50ms): one lightweight readiness call
//! - MEDIUM (<=100ms): collection listing with response validation
//! - DEEP (<=200ms): collection listing plus one trivial count query
//!
//! Timeouts, connection errors, and unexpected responses all report
//! unhealthy; the pool decides whether to replace the connection.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::store::client::{PointFilter, VectorClient};

/// Health check thoroughness levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckLevel {
    Fast,
    Medium,
    Deep,
}

impl HealthCheckLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCheckLevel::Fast => "fast",
            HealthCheckLevel::Medium => "medium",
            HealthCheckLevel::Deep => "deep",
        }
    }

    fn index(&self) -> usize {
        match self {
            HealthCheckLevel::Fast => 0,
            HealthCheckLevel::Medium => 1,
            HealthCheckLevel::Deep => 2,
        }
    }
}

/// Outcome of one health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub level: HealthCheckLevel,
    pub duration_ms: f64,
    pub error: Option<String>,
}

/// Aggregate health check statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HealthStats {
    pub total_checks: u64,
    pub total_failures: u64,
    pub failure_rate_percent: f64,
    /// Indexed fast, medium, deep
    pub checks_by_level: [u64; 3],
    pub failures_by_level: [u64; 3],
}

#[derive(Default)]
struct HealthCounters {
    total_checks: u64,
    total_failures: u64,
    checks_by_level: [u64; 3],
    failures_by_level: [u64; 3],
}

/// Health checker with per-level timeouts.
pub struct HealthChecker {
    fast_timeout: Duration,
    medium_timeout: Duration,
    deep_timeout: Duration,
    counters: Mutex<HealthCounters>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
    }

    pub fn with_timeouts(fast: Duration, medium: Duration, deep: Duration) -> Self {
        tracing::debug!(
            fast_ms = fast.as_millis() as u64,
            medium_ms = medium.as_millis() as u64,
            deep_ms = deep.as_millis() as u64,
            "health checker initialized"
        );
        Self {
            fast_timeout: fast,
            medium_timeout: medium,
            deep_timeout: deep,
            counters: Mutex::new(HealthCounters::default()),
        }
    }

    /// Check one connection at the given level.
    pub async fn check<C: VectorClient>(
        &self,
        client: &C,
        level: HealthCheckLevel,
    ) -> HealthCheckResult {
        let start = Instant::now();
        let outcome = match level {
            HealthCheckLevel::Fast => self.fast_check(client).await,
            HealthCheckLevel::Medium => self.medium_check(client).await,
            HealthCheckLevel::Deep => self.deep_check(client).await,
        };
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (healthy, error) = match outcome {
            Ok(()) => (true, None),
            Err(reason) => {
                tracing::warn!(level = level.as_str(), error = %reason, "health check failed");
                (false, Some(reason))
            }
        };

        {
            let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            counters.total_checks += 1;
            counters.checks_by_level[level.index()] += 1;
            if !healthy {
                counters.total_failures += 1;
                counters.failures_by_level[level.index()] += 1;
            }
        }

        HealthCheckResult {
            healthy,
            level,
            duration_ms,
            error,
        }
    }

    async fn fast_check<C: VectorClient>(&self, client: &C) -> Result<(), String> {
        match tokio::time::timeout(self.fast_timeout, client.list_collections()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "fast health check timeout (>{}ms)",
                self.fast_timeout.as_millis()
            )),
        }
    }

    async fn medium_check<C: VectorClient>(&self, client: &C) -> Result<(), String> {
        match tokio::time::timeout(self.medium_timeout, client.list_collections()).await {
            // Any well-formed listing counts as a valid response, empty included.
            Ok(Ok(_collections)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "medium health check timeout (>{}ms)",
                self.medium_timeout.as_millis()
            )),
        }
    }

    async fn deep_check<C: VectorClient>(&self, client: &C) -> Result<(), String> {
        let probe = async {
            let collections = client.list_collections().await.map_err(|e| e.to_string())?;
            // No collections to query, but the connection works.
            let Some(first) = collections.first() else {
                return Ok(());
            };
            client
                .count(first, &PointFilter::new())
                .await
                .map_err(|e| e.to_string())?;
            Ok(())
        };
        match tokio::time::timeout(self.deep_timeout, probe).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "deep health check timeout (>{}ms)",
                self.deep_timeout.as_millis()
            )),
        }
    }

    pub fn stats(&self) -> HealthStats {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let failure_rate_percent = if counters.total_checks > 0 {
            counters.total_failures as f64 / counters.total_checks as f64 * 100.0
        } else {
            0.0
        };
        HealthStats {
            total_checks: counters.total_checks,
            total_failures: counters.total_failures,
            failure_rate_percent,
            checks_by_level: counters.checks_by_level,
            failures_by_level: counters.failures_by_level,
        }
    }

    pub fn reset_stats(&self) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        *counters = HealthCounters::default();
        tracing::debug!("health checker stats reset");
    }
}
