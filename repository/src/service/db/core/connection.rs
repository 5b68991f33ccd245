//! Connection pool
//!
//! A bounded free set of driver connections with lifetime-based recycling.
//! The free set is guarded by one `parking_lot::Mutex` that is never held
//! across an `.await`; connections are opened and closed outside the lock.

use crate::service::db::core::config::PoolConfig;
use crate::service::db::core::driver::{Driver, DriverConnection};
use crate::service::db::core::types::PoolStats;
use crate::tool::{DbResult, RepositoryError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One live connection plus its creation time.
pub struct PooledConnection {
    conn: Box<dyn DriverConnection>,
    created_at: Instant,
}

impl PooledConnection {
    fn new(conn: Box<dyn DriverConnection>) -> Self {
        Self {
            conn,
            created_at: Instant::now(),
        }
    }

    /// Time since the connection was opened.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// True once the connection has outlived `max_lifetime`.
    pub fn is_stale(&self, max_lifetime: Duration) -> bool {
        self.age() > max_lifetime
    }

    pub fn connection(&mut self) -> &mut dyn DriverConnection {
        self.conn.as_mut()
    }

    async fn close(self) -> DbResult<()> {
        self.conn.close().await
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("age", &self.age())
            .finish()
    }
}

/// Internal counters
#[derive(Default)]
struct PoolStatistics {
    checked_out: AtomicU64,   // connections currently held by sessions
    total_created: AtomicU64, // connections opened
    total_closed: AtomicU64,  // connections closed or discarded
}

/// Bounded pool of driver connections.
pub struct ConnectionPool {
    driver: Arc<dyn Driver>,
    config: PoolConfig,
    free: Mutex<Vec<PooledConnection>>,
    stats: PoolStatistics,
}

impl ConnectionPool {
    /// Creates an empty pool. Call [`ConnectionPool::initialize`] to warm it up.
    pub fn new(driver: Arc<dyn Driver>, config: PoolConfig) -> Self {
        Self {
            driver,
            config: config.normalized(),
            free: Mutex::new(Vec::new()),
            stats: PoolStatistics::default(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of idle connections in the free set.
    pub fn idle_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Eagerly opens `count` connections (capped at `max_size`).
    pub async fn initialize(&self, count: usize) -> DbResult<()> {
        let count = count.min(self.config.max_size);
        info!(
            "Initializing connection pool with {} connections to {}",
            count,
            self.driver.describe()
        );

        for _ in 0..count {
            let conn = self.open().await?;
            self.put_back(conn).await;
        }

        info!("Connection pool ready ({} idle)", self.idle_count());
        Ok(())
    }

    /// Takes a connection out of the pool.
    ///
    /// Stale connections are closed and skipped; an empty free set opens a
    /// new connection. When the free set falls below `min_size` one
    /// replacement is opened before returning.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        loop {
            let (popped, remaining) = {
                let mut free = self.free.lock();
                let popped = free.pop();
                (popped, free.len())
            };

            let conn = match popped {
                Some(conn) => conn,
                None => {
                    let conn = self.open().await.map_err(|e| {
                        RepositoryError::PoolExhausted(format!(
                            "no connection available: {}",
                            e
                        ))
                    })?;
                    self.stats.checked_out.fetch_add(1, Ordering::Relaxed);
                    return Ok(conn);
                }
            };

            if remaining < self.config.min_size {
                self.top_up().await;
            }

            if conn.is_stale(self.config.max_lifetime) {
                debug!("Discarding stale connection (age {:?})", conn.age());
                self.discard(conn).await;
                continue;
            }

            self.stats.checked_out.fetch_add(1, Ordering::Relaxed);
            return Ok(conn);
        }
    }

    /// Returns a connection to the free set, or closes it when it is stale
    /// or the free set is full.
    pub async fn release(&self, conn: PooledConnection) {
        self.stats.checked_out.fetch_sub(1, Ordering::Relaxed);
        self.put_back(conn).await;
    }

    /// Closes a checked-out connection instead of returning it.
    pub async fn invalidate(&self, conn: PooledConnection) {
        self.stats.checked_out.fetch_sub(1, Ordering::Relaxed);
        self.discard(conn).await;
    }

    /// Synchronous return path used from `Drop`.
    ///
    /// Stale or surplus connections are handed to the runtime to close when
    /// one is available and dropped otherwise.
    pub(crate) fn release_now(&self, conn: PooledConnection) {
        self.stats.checked_out.fetch_sub(1, Ordering::Relaxed);
        if let Some(conn) = self.try_push(conn) {
            self.close_detached(conn);
        }
    }

    /// Drops a checked-out connection without returning it, from `Drop`.
    pub(crate) fn discard_now(&self, conn: PooledConnection) {
        self.stats.checked_out.fetch_sub(1, Ordering::Relaxed);
        self.close_detached(conn);
    }

    /// Closes every idle connection.
    pub async fn shutdown(&self) {
        let drained: Vec<PooledConnection> = std::mem::take(&mut *self.free.lock());
        info!("Closing connection pool ({} idle connections)", drained.len());
        for conn in drained {
            self.discard(conn).await;
        }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle_connections: self.idle_count(),
            checked_out: self.stats.checked_out.load(Ordering::Relaxed),
            total_created: self.stats.total_created.load(Ordering::Relaxed),
            total_closed: self.stats.total_closed.load(Ordering::Relaxed),
            max_size: self.config.max_size,
            min_size: self.config.min_size,
        }
    }

    async fn open(&self) -> DbResult<PooledConnection> {
        let conn = self.driver.connect().await?;
        self.stats.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection::new(conn))
    }

    async fn top_up(&self) {
        match self.open().await {
            Ok(conn) => self.put_back(conn).await,
            Err(e) => warn!("Failed to top up connection pool: {}", e),
        }
    }

    async fn put_back(&self, conn: PooledConnection) {
        if let Some(conn) = self.try_push(conn) {
            self.discard(conn).await;
        }
    }

    /// Pushes a healthy connection under the lock; hands it back when it
    /// must be closed instead.
    fn try_push(&self, conn: PooledConnection) -> Option<PooledConnection> {
        if conn.is_stale(self.config.max_lifetime) {
            return Some(conn);
        }
        let mut free = self.free.lock();
        if free.len() >= self.config.max_size {
            return Some(conn);
        }
        free.push(conn);
        None
    }

    async fn discard(&self, conn: PooledConnection) {
        self.stats.total_closed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = conn.close().await {
            debug!("Error while closing connection: {}", e);
        }
    }

    fn close_detached(&self, conn: PooledConnection) {
        self.stats.total_closed.fetch_add(1, Ordering::Relaxed);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = conn.close().await {
                    debug!("Error while closing connection: {}", e);
                }
            });
        }
    }
}
