//! Connection pooling for the vector store.
//!
//! A bounded FIFO pool of clients with health checking, age-based recycling,
//! acquisition timeout, and performance metrics. One coarse mutex guards the
//! pool state; it is never held across client creation, health checks, queue
//! waits, or client closes. Waiters are served in FIFO order by a fair
//! semaphore whose permit count always mirrors the idle queue length.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::PoolConfig;
use crate::error::{RecallError, StorageError};
use crate::store::client::{ClientFactory, VectorClient};
use crate::store::health::{HealthChecker, HealthCheckLevel, HealthStats};
use crate::store::monitor::{MonitorConfig, PoolMonitor};

/// Rolling window of acquire durations used for avg/p95/max.
const ACQUIRE_WINDOW: usize = 1000;
/// Client creation attempts before giving up.
const CREATE_ATTEMPTS: u32 = 3;

/// Next retry delay for client creation: 1s, 2s, 4s.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base * 2u32.saturating_pow(attempt)
}

/// Pool statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub total_acquires: u64,
    pub total_releases: u64,
    pub total_timeouts: u64,
    pub total_health_failures: u64,
    pub connections_created: u64,
    pub connections_recycled: u64,
    pub connections_failed: u64,
    pub avg_acquire_time_ms: f64,
    pub p95_acquire_time_ms: f64,
    pub max_acquire_time_ms: f64,
}

/// Wrapper holding per-connection metadata while pooled or lent out.
struct PooledConnection<C> {
    client: Arc<C>,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
}

struct PoolInner<C> {
    idle: VecDeque<PooledConnection<C>>,
    created_count: usize,
    active_connections: usize,
    /// client identity -> wrapper, so metadata survives acquire/release
    client_map: HashMap<usize, PooledConnection<C>>,
    acquire_times: VecDeque<f64>,
    initialized: bool,
    closed: bool,
    total_acquires: u64,
    total_releases: u64,
    total_timeouts: u64,
    total_health_failures: u64,
    connections_created: u64,
    connections_recycled: u64,
    connections_failed: u64,
    avg_acquire_time_ms: f64,
    p95_acquire_time_ms: f64,
    max_acquire_time_ms: f64,
}

impl<C> PoolInner<C> {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            created_count: 0,
            active_connections: 0,
            client_map: HashMap::new(),
            acquire_times: VecDeque::new(),
            initialized: false,
            closed: false,
            total_acquires: 0,
            total_releases: 0,
            total_timeouts: 0,
            total_health_failures: 0,
            connections_created: 0,
            connections_recycled: 0,
            connections_failed: 0,
            avg_acquire_time_ms: 0.0,
            p95_acquire_time_ms: 0.0,
            max_acquire_time_ms: 0.0,
        }
    }

    fn record_acquire_time(&mut self, duration_ms: f64) {
        self.acquire_times.push_back(duration_ms);
        while self.acquire_times.len() > ACQUIRE_WINDOW {
            self.acquire_times.pop_front();
        }
        let len = self.acquire_times.len();
        if len == 0 {
            return;
        }
        self.avg_acquire_time_ms = self.acquire_times.iter().sum::<f64>() / len as f64;
        let mut sorted: Vec<f64> = self.acquire_times.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let p95_idx = ((len as f64) * 0.95) as usize;
        self.p95_acquire_time_ms = sorted[p95_idx.min(len - 1)];
        self.max_acquire_time_ms = sorted[len - 1];
    }
}

fn client_key<C>(client: &Arc<C>) -> usize {
    Arc::as_ptr(client) as usize
}

/// Rolls back a reserved capacity slot unless defused after a successful
/// client creation. Also covers cancellation while the creation is pending.
struct SlotGuard<'a, F: ClientFactory> {
    pool: &'a ConnectionPool<F>,
    armed: bool,
}

impl<F: ClientFactory> Drop for SlotGuard<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.pool.lock_inner();
            inner.created_count = inner.created_count.saturating_sub(1);
        }
    }
}

/// Connection pool over a client factory.
///
/// ```ignore
/// let pool = Arc::new(ConnectionPool::new(factory, PoolConfig::default())?);
/// pool.initialize().await?;
/// let client = pool.acquire().await?;
/// // use client ...
/// pool.release(&client);
/// pool.close().await;
/// ```
pub struct ConnectionPool<F: ClientFactory> {
    config: PoolConfig,
    factory: F,
    inner: Mutex<PoolInner<F::Client>>,
    /// Fair semaphore; permit count mirrors `inner.idle.len()`
    idle_slots: Semaphore,
    health_checker: Option<HealthChecker>,
    monitor: Option<PoolMonitor>,
}

impl<F: ClientFactory> ConnectionPool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, RecallError> {
        config.validate()?;

        let health_checker = config.enable_health_checks.then(HealthChecker::new);
        let monitor = config
            .enable_monitoring
            .then(|| PoolMonitor::new(MonitorConfig::default()));

        tracing::info!(
            min_size = config.min_size,
            max_size = config.max_size,
            timeout_s = config.timeout.as_secs_f64(),
            recycle_s = config.recycle.as_secs(),
            health_checks = config.enable_health_checks,
            monitoring = config.enable_monitoring,
            "connection pool created"
        );

        Ok(Self {
            config,
            factory,
            inner: Mutex::new(PoolInner::new()),
            idle_slots: Semaphore::new(0),
            health_checker,
            monitor,
        })
    }

    // A poisoned lock only means another thread panicked mid-update; the
    // recovered state is still consistent for counters and queues.
    fn lock_inner(&self) -> MutexGuard<'_, PoolInner<F::Client>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create `min_size` connections and start the monitor if enabled.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), StorageError> {
        {
            let inner = self.lock_inner();
            if inner.initialized {
                tracing::warn!("pool already initialized, skipping");
                return Ok(());
            }
        }

        tracing::info!(connections = self.config.min_size, "initializing connection pool");

        for created in 0..self.config.min_size {
            let conn = match self.create_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "failed to initialize connection pool");
                    self.close().await;
                    return Err(StorageError::Connection {
                        url: self.factory.url().to_string(),
                        reason: format!("pool initialization failed: {e}"),
                    });
                }
            };
            {
                let mut inner = self.lock_inner();
                inner.created_count += 1;
                inner.connections_created += 1;
                inner.idle.push_back(conn);
            }
            self.idle_slots.add_permits(1);
            tracing::debug!(
                created = created + 1,
                min_size = self.config.min_size,
                "created initial connection"
            );
        }

        self.lock_inner().initialized = true;
        tracing::info!(connections = self.config.min_size, "connection pool initialized");

        if let Some(monitor) = &self.monitor {
            let weak = Arc::downgrade(self);
            monitor.start(move || weak.upgrade().map(|pool| pool.stats()));
        }

        Ok(())
    }

    /// Acquire a healthy connection.
    ///
    /// Takes an idle connection without blocking when one exists, creates a
    /// new one while under `max_size`, and otherwise waits FIFO up to the
    /// configured timeout. Stale connections are recycled; an unhealthy one
    /// is replaced once before the acquire fails.
    pub async fn acquire(&self) -> Result<Arc<F::Client>, StorageError> {
        let start = Instant::now();
        {
            let inner = self.lock_inner();
            if inner.closed {
                return Err(StorageError::Backend("pool is closed".into()));
            }
            if !inner.initialized {
                return Err(StorageError::Backend(
                    "pool not initialized; call initialize() first".into(),
                ));
            }
        }

        let taken = match self.try_take_idle() {
            Some(conn) => Some(conn),
            None => self.try_create_new().await?,
        };

        let mut conn = match taken {
            Some(conn) => conn,
            None => {
                match tokio::time::timeout(self.config.timeout, self.idle_slots.acquire()).await {
                    Ok(Ok(permit)) => {
                        permit.forget();
                        self.pop_idle()?
                    }
                    Ok(Err(_)) => {
                        return Err(StorageError::Backend("pool is closed".into()));
                    }
                    Err(_) => {
                        let active = {
                            let mut inner = self.lock_inner();
                            inner.total_timeouts += 1;
                            inner.active_connections
                        };
                        return Err(StorageError::PoolExhausted {
                            active,
                            max_size: self.config.max_size,
                            timeout: self.config.timeout,
                        });
                    }
                }
            }
        };

        // Age-based recycling: close the stale connection, then create a
        // replacement in the freed slot.
        if conn.created_at.elapsed() >= self.config.recycle {
            tracing::debug!(
                age_s = conn.created_at.elapsed().as_secs_f64(),
                recycle_s = self.config.recycle.as_secs(),
                "connection needs recycling"
            );
            self.retire(conn);
            conn = self.create_with_slot().await?;
            self.lock_inner().connections_recycled += 1;
        }

        if let Some(checker) = &self.health_checker {
            let result = checker.check(conn.client.as_ref(), HealthCheckLevel::Fast).await;
            if !result.healthy {
                tracing::warn!(error = ?result.error, "acquired unhealthy connection");
                self.lock_inner().total_health_failures += 1;

                self.retire(conn);
                conn = self.create_with_slot().await?;

                let recheck = checker.check(conn.client.as_ref(), HealthCheckLevel::Fast).await;
                if !recheck.healthy {
                    tracing::error!("newly created connection is unhealthy");
                    self.retire(conn);
                    return Err(StorageError::HealthCheckFailed {
                        reason: "unable to create healthy connection after retry".into(),
                        attempt: 2,
                    });
                }
            }
        }

        conn.last_used = Instant::now();
        conn.use_count += 1;
        let client = Arc::clone(&conn.client);
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        {
            let mut inner = self.lock_inner();
            inner.client_map.insert(client_key(&client), conn);
            inner.active_connections += 1;
            inner.total_acquires += 1;
            inner.record_acquire_time(duration_ms);
            tracing::debug!(
                active = inner.active_connections,
                idle = inner.idle.len(),
                acquire_ms = duration_ms,
                "acquired connection"
            );
        }

        Ok(client)
    }

    /// Return a connection to the pool. Unknown clients get a fresh wrapper
    /// with reset metadata and a warning.
    pub fn release(&self, client: &Arc<F::Client>) {
        let mut inner = self.lock_inner();
        if inner.closed {
            tracing::warn!("attempting to release connection to closed pool");
            return;
        }

        let conn = match inner.client_map.remove(&client_key(client)) {
            Some(mut conn) => {
                conn.last_used = Instant::now();
                conn
            }
            None => {
                tracing::warn!(
                    "released client not found in tracking map - creating new wrapper"
                );
                let now = Instant::now();
                PooledConnection {
                    client: Arc::clone(client),
                    created_at: now,
                    last_used: now,
                    use_count: 0,
                }
            }
        };

        inner.idle.push_back(conn);
        inner.active_connections = inner.active_connections.saturating_sub(1);
        inner.total_releases += 1;
        tracing::debug!(
            active = inner.active_connections,
            idle = inner.idle.len(),
            "released connection"
        );
        drop(inner);

        self.idle_slots.add_permits(1);
    }

    /// Close every connection and shut the pool down. Idempotent.
    pub async fn close(&self) {
        {
            let inner = self.lock_inner();
            if inner.closed {
                tracing::debug!("pool already closed");
                return;
            }
        }
        tracing::info!("closing connection pool");

        if let Some(monitor) = &self.monitor {
            monitor.stop().await;
        }

        let clients: Vec<Arc<F::Client>> = {
            let mut inner = self.lock_inner();
            inner.closed = true;
            let mut clients: Vec<_> = inner
                .client_map
                .drain()
                .map(|(_, conn)| conn.client)
                .collect();
            clients.extend(inner.idle.drain(..).map(|conn| conn.client));
            inner.active_connections = 0;
            inner.created_count = 0;
            inner.initialized = false;
            clients
        };

        // Permits mirror the now-empty idle queue.
        while self.idle_slots.try_acquire().map(|p| p.forget()).is_ok() {}

        for client in &clients {
            client.close();
        }
        tracing::info!(closed = clients.len(), "connection pool closed");
    }

    /// Recover from corrupted state: close everything, clear state, and
    /// re-initialize to `min_size` if the pool had been initialized. The
    /// pool lock is never held across initialization.
    pub async fn reset(self: &Arc<Self>) -> Result<(), StorageError> {
        tracing::warn!("resetting connection pool to recover from corrupted state");

        let was_initialized = { self.lock_inner().initialized };
        self.close().await;

        {
            let mut inner = self.lock_inner();
            inner.closed = false;
            inner.client_map.clear();
            inner.idle.clear();
            inner.acquire_times.clear();
        }
        while self.idle_slots.try_acquire().map(|p| p.forget()).is_ok() {}

        if was_initialized {
            self.initialize().await?;
            tracing::info!("connection pool reset and reinitialized");
        } else {
            tracing::info!("connection pool reset (was not initialized)");
        }
        Ok(())
    }

    /// Cheap corruption probe: a pool whose capacity is fully accounted for
    /// but has neither idle nor tracked-active connections has leaked.
    pub fn is_healthy(&self) -> bool {
        let inner = self.lock_inner();
        if inner.closed || !inner.initialized {
            return false;
        }
        let idle = inner.idle.len();
        let active = inner.client_map.len();
        if inner.created_count >= self.config.max_size && idle == 0 && active == 0 {
            tracing::warn!(
                created = inner.created_count,
                idle,
                active,
                max = self.config.max_size,
                "pool state corruption detected"
            );
            return false;
        }
        true
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock_inner();
        PoolStats {
            pool_size: inner.created_count,
            active_connections: inner.active_connections,
            idle_connections: inner.idle.len(),
            total_acquires: inner.total_acquires,
            total_releases: inner.total_releases,
            total_timeouts: inner.total_timeouts,
            total_health_failures: inner.total_health_failures,
            connections_created: inner.connections_created,
            connections_recycled: inner.connections_recycled,
            connections_failed: inner.connections_failed,
            avg_acquire_time_ms: inner.avg_acquire_time_ms,
            p95_acquire_time_ms: inner.p95_acquire_time_ms,
            max_acquire_time_ms: inner.max_acquire_time_ms,
        }
    }

    pub fn health_stats(&self) -> Option<HealthStats> {
        self.health_checker.as_ref().map(HealthChecker::stats)
    }

    pub fn monitor(&self) -> Option<&PoolMonitor> {
        self.monitor.as_ref()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn try_take_idle(&self) -> Option<PooledConnection<F::Client>> {
        match self.idle_slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                // A permit guarantees an idle entry: permits are only added
                // after a push and removed before a pop.
                self.lock_inner().idle.pop_front()
            }
            Err(_) => None,
        }
    }

    fn pop_idle(&self) -> Result<PooledConnection<F::Client>, StorageError> {
        self.lock_inner()
            .idle
            .pop_front()
            .ok_or_else(|| StorageError::Backend("pool state corrupted: idle queue empty".into()))
    }

    /// Reserve a capacity slot and create a connection in it, if capacity
    /// remains. Returns `None` when the pool is at `max_size`.
    async fn try_create_new(&self) -> Result<Option<PooledConnection<F::Client>>, StorageError> {
        {
            let mut inner = self.lock_inner();
            if inner.created_count >= self.config.max_size {
                return Ok(None);
            }
            inner.created_count += 1;
            tracing::debug!(
                created = inner.created_count,
                max = self.config.max_size,
                "pool empty, creating new connection"
            );
        }

        let mut guard = SlotGuard { pool: self, armed: true };
        let conn = self.create_connection().await?;
        guard.armed = false;
        self.lock_inner().connections_created += 1;
        Ok(Some(conn))
    }

    /// Unconditionally reserve a slot and create a connection in it, used to
    /// replace a just-retired connection.
    async fn create_with_slot(&self) -> Result<PooledConnection<F::Client>, StorageError> {
        self.lock_inner().created_count += 1;
        let mut guard = SlotGuard { pool: self, armed: true };
        let conn = self.create_connection().await?;
        guard.armed = false;
        self.lock_inner().connections_created += 1;
        Ok(conn)
    }

    /// Close a connection and free its capacity slot.
    fn retire(&self, conn: PooledConnection<F::Client>) {
        conn.client.close();
        let mut inner = self.lock_inner();
        inner.created_count = inner.created_count.saturating_sub(1);
        tracing::debug!(
            idle_s = conn.last_used.elapsed().as_secs_f64(),
            uses = conn.use_count,
            "connection recycled"
        );
    }

    /// Create a client with exponential backoff on connection errors.
    /// Non-connection errors fail immediately.
    async fn create_connection(&self) -> Result<PooledConnection<F::Client>, StorageError> {
        let mut attempt = 0;
        loop {
            match self.factory.connect().await {
                Ok(client) => {
                    tracing::debug!("created new connection");
                    let now = Instant::now();
                    return Ok(PooledConnection {
                        client: Arc::new(client),
                        created_at: now,
                        last_used: now,
                        use_count: 0,
                    });
                }
                Err(StorageError::Connection { url, reason }) => {
                    if attempt + 1 < CREATE_ATTEMPTS {
                        let delay = backoff_delay(attempt, Duration::from_secs(1));
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_attempts = CREATE_ATTEMPTS,
                            delay_s = delay.as_secs(),
                            error = %reason,
                            "connection error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        self.lock_inner().connections_failed += 1;
                        tracing::error!(
                            attempts = CREATE_ATTEMPTS,
                            error = %reason,
                            "failed to create connection"
                        );
                        return Err(StorageError::Connection {
                            url,
                            reason: format!(
                                "failed to connect after {CREATE_ATTEMPTS} attempts: {reason}"
                            ),
                        });
                    }
                }
                Err(e) => {
                    self.lock_inner().connections_failed += 1;
                    tracing::error!(error = %e, "failed to create connection");
                    return Err(e);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_tracking_map_for_tests(&self) {
        self.lock_inner().client_map.clear();
    }
}
