use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::DbError;

/// Opens and tears down one connection on behalf of the pool.
#[async_trait]
pub trait Manager: Send + Sync {
    type Connection: Send;

    async fn connect(&self) -> Result<Self::Connection, DbError>;

    /// Close one connection. The pool calls this for every connection it
    /// still holds when it shuts down; failures are the manager's to log.
    async fn disconnect(&self, conn: Self::Connection);
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Connections opened eagerly at construction.
    pub min_connections: u32,
    /// Hard upper bound on concurrently checked-out connections.
    pub max_connections: u32,
    /// How long [`Pool::acquire`] may wait for a free connection before
    /// giving up. `None` blocks until one is returned.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// A bounded pool of reusable connections.
///
/// Checkout is guarded by a semaphore sized `max_connections`; the free
/// list lives behind a mutex that is only ever locked between await
/// points, never across one. Once closed, a pool never reopens.
pub struct Pool<M: Manager> {
    manager: M,
    options: PoolOptions,
    idle: Mutex<Vec<M::Connection>>,
    permits: Semaphore,
    closed: AtomicBool,
}

impl<M: Manager> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("options", &self.options)
            .field("idle", &self.idle_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<M: Manager> Pool<M> {
    /// Establish the pool, eagerly opening `min_connections` connections.
    ///
    /// Construction either yields a fully usable pool or fails with
    /// [`DbError::PoolInit`]; a partially opened set of connections is torn
    /// down before the error is returned.
    pub async fn connect(manager: M, options: PoolOptions) -> Result<Self, DbError> {
        if options.max_connections == 0 {
            return Err(DbError::Config {
                reason: "max_connections must be at least 1".to_string(),
            });
        }
        if options.min_connections > options.max_connections {
            return Err(DbError::Config {
                reason: format!(
                    "min_connections ({}) exceeds max_connections ({})",
                    options.min_connections, options.max_connections
                ),
            });
        }

        let mut idle = Vec::with_capacity(options.min_connections as usize);
        for _ in 0..options.min_connections {
            match manager.connect().await {
                Ok(conn) => idle.push(conn),
                Err(source) => {
                    for conn in idle {
                        manager.disconnect(conn).await;
                    }
                    return Err(DbError::PoolInit {
                        source: Box::new(source),
                    });
                }
            }
        }

        tracing::info!(
            min = options.min_connections,
            max = options.max_connections,
            "connection pool initialized"
        );

        Ok(Self {
            manager,
            permits: Semaphore::new(options.max_connections as usize),
            options,
            idle: Mutex::new(idle),
            closed: AtomicBool::new(false),
        })
    }

    /// Lease a connection, blocking while every connection is checked out,
    /// subject to `acquire_timeout`. The lease is returned to the pool when
    /// the guard drops, on every exit path.
    pub async fn acquire(&self) -> Result<PooledConnection<'_, M>, DbError> {
        if self.is_closed() {
            return Err(DbError::PoolClosed);
        }

        let permit = match self.options.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, self.permits.acquire())
                .await
                .map_err(|_| DbError::AcquireTimeout(limit))?,
            None => self.permits.acquire().await,
        }
        .map_err(|_| DbError::PoolClosed)?;

        let reused = self.lock_idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            // Holding the permit keeps the pool below max_connections, so
            // opening a fresh connection here cannot overshoot the bound.
            None => self.manager.connect().await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            broken: false,
            pool: self,
            _permit: permit,
        })
    }

    /// Close every connection and refuse further leases.
    ///
    /// Outstanding leases are waited for rather than revoked; once they are
    /// all returned the connections are torn down. Idempotent: a second
    /// call is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Collecting every permit blocks until all leases have come home.
        // New acquires already fail fast on the closed flag.
        if let Ok(all) = self.permits.acquire_many(self.options.max_connections).await {
            all.forget();
        }
        self.permits.close();

        let idle = std::mem::take(&mut *self.lock_idle());
        for conn in idle {
            self.manager.disconnect(conn).await;
        }

        tracing::info!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Connections currently parked in the free list.
    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<M::Connection>> {
        self.idle.lock().expect("pool free list poisoned")
    }
}

/// A connection leased from the pool.
///
/// Dereferences to the underlying connection. Dropping the guard checks the
/// connection back in and wakes the next waiter.
pub struct PooledConnection<'p, M: Manager> {
    conn: Option<M::Connection>,
    broken: bool,
    pool: &'p Pool<M>,
    _permit: SemaphorePermit<'p>,
}

impl<M: Manager> PooledConnection<'_, M> {
    /// Mark the connection unusable. A broken connection is dropped on
    /// check-in instead of re-entering the free list, so the next checkout
    /// opens a fresh one.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl<M: Manager> fmt::Debug for PooledConnection<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl<M: Manager> Deref for PooledConnection<'_, M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl<M: Manager> DerefMut for PooledConnection<'_, M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl<M: Manager> Drop for PooledConnection<'_, M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken {
                // Dropping the connection closes it; the freed permit lets
                // the next acquire open a replacement.
                drop(conn);
            } else {
                self.pool.lock_idle().push(conn);
            }
        }
        // The permit drops after the push, so close() cannot drain the
        // free list before this connection lands in it.
    }
}
