//! Connection pool management.
//!
//! The pool is a slot arena: every physical connection lives in a slot, and
//! the slot's occupant can be swapped for a fresh connection without
//! disturbing the others. `available` holds the indices of idle slots (FIFO),
//! `in_use` the identities of checked-out connections. All bookkeeping,
//! including opening and validating connections, happens under one mutex.

use crate::config::PoolConfig;
use crate::driver::{Connection, Driver, DriverError};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryResult};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Identity of one physical connection opened by a pool.
///
/// A replacement for a dead connection gets a new id, even in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Snapshot of the pool's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub available: usize,
    pub in_use: usize,
    pub total: usize,
}

struct Slot<C> {
    id: ConnectionId,
    conn: Arc<Mutex<C>>,
}

impl<C> Clone for Slot<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            conn: Arc::clone(&self.conn),
        }
    }
}

struct PoolState<C> {
    slots: Vec<Option<Slot<C>>>,
    available: VecDeque<usize>,
    in_use: HashSet<ConnectionId>,
    vacant: Vec<usize>,
    closed: bool,
}

impl<C> PoolState<C> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            available: VecDeque::new(),
            in_use: HashSet::new(),
            vacant: Vec::new(),
            closed: false,
        }
    }

    /// Put a connection into a free slot and return its index.
    fn place(&mut self, slot: Slot<C>) -> usize {
        match self.vacant.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    /// Pop the oldest idle slot.
    fn take_available(&mut self) -> Option<(usize, Slot<C>)> {
        while let Some(idx) = self.available.pop_front() {
            if let Some(Some(slot)) = self.slots.get(idx) {
                return Some((idx, slot.clone()));
            }
        }
        None
    }

    fn vacate(&mut self, idx: usize) -> Option<Slot<C>> {
        let slot = self.slots.get_mut(idx)?.take();
        if slot.is_some() {
            self.vacant.push(idx);
        }
        slot
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            available: self.available.len(),
            in_use: self.in_use.len(),
            total: self.slots.iter().filter(|s| s.is_some()).count(),
        }
    }
}

struct PoolShared<D: Driver> {
    driver: D,
    config: PoolConfig,
    next_id: AtomicU64,
    state: Mutex<PoolState<D::Connection>>,
}

impl<D: Driver> PoolShared<D> {
    fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Open a connection with the pool's auto-commit setting applied.
    async fn open(&self) -> Result<Slot<D::Connection>, DriverError> {
        let mut conn = self
            .driver
            .open(&self.config.url, &self.config.credentials)
            .await?;
        if let Err(e) = conn.set_auto_commit(self.config.auto_commit).await {
            let _ = conn.close().await;
            return Err(e);
        }

        let id = self.next_id();
        debug!(connection_id = %id, "Opened connection");
        Ok(Slot {
            id,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn acquire(self: &Arc<Self>) -> DbResult<PooledConnection<D>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(DbError::pool_closed());
        }

        let (idx, slot) = match state.take_available() {
            Some((idx, slot)) => {
                let dead = slot.conn.lock().await.is_closed().await;
                match dead {
                    Ok(false) => {
                        debug!(connection_id = %slot.id, slot = idx, "Reusing idle connection");
                        (idx, slot)
                    }
                    Ok(true) => {
                        debug!(connection_id = %slot.id, slot = idx, "Replacing dead connection");
                        let _ = slot.conn.lock().await.close().await;
                        match self.open().await {
                            Ok(fresh) => {
                                state.slots[idx] = Some(fresh.clone());
                                (idx, fresh)
                            }
                            Err(e) => {
                                state.vacate(idx);
                                return Err(DbError::connection(
                                    "Failed to create connection",
                                    Some(e),
                                ));
                            }
                        }
                    }
                    Err(e) => {
                        warn!(connection_id = %slot.id, error = %e, "Connection validation failed");
                        if let Some(stale) = state.vacate(idx) {
                            let _ = stale.conn.lock().await.close().await;
                        }
                        return Err(DbError::connection(
                            "Failed to validate connection",
                            Some(e),
                        ));
                    }
                }
            }
            None => {
                let fresh = self
                    .open()
                    .await
                    .map_err(|e| DbError::connection("Failed to create connection", Some(e)))?;
                let idx = state.place(fresh.clone());
                (idx, fresh)
            }
        };

        state.in_use.insert(slot.id);

        Ok(PooledConnection {
            id: slot.id,
            slot: idx,
            conn: slot.conn,
            pool: Arc::clone(self),
            released: false,
        })
    }

    /// Roll back uncommitted work and restore the configured auto-commit mode.
    async fn reset(&self, conn: &mut D::Connection) -> Result<(), DriverError> {
        conn.rollback().await?;
        if conn.auto_commit() != self.config.auto_commit {
            conn.set_auto_commit(self.config.auto_commit).await?;
        }
        Ok(())
    }

    async fn release(&self, id: ConnectionId, idx: usize, conn: Arc<Mutex<D::Connection>>) {
        let mut state = self.state.lock().await;
        if !state.in_use.remove(&id) {
            debug!(connection_id = %id, "Release of a connection not in use, ignoring");
            return;
        }

        let mut conn = conn.lock().await;
        let reset = match conn.is_closed().await {
            Ok(false) => self.reset(&mut conn).await.map(|_| true),
            Ok(true) => Ok(false),
            Err(e) => Err(e),
        };

        match reset {
            Ok(true) => {
                state.available.push_back(idx);
                debug!(connection_id = %id, slot = idx, "Connection returned to pool");
            }
            Ok(false) => {
                state.vacate(idx);
                debug!(connection_id = %id, slot = idx, "Discarded dead connection");
            }
            Err(e) => {
                warn!(
                    connection_id = %id,
                    error = %e,
                    "Failed to reset connection on release, discarding it"
                );
                let _ = conn.close().await;
                state.vacate(idx);
            }
        }
    }
}

/// A pool of physical connections opened through a [`Driver`].
///
/// Cloning is cheap and yields a handle to the same pool.
pub struct ConnectionPool<D: Driver> {
    shared: Arc<PoolShared<D>>,
}

impl<D: Driver> Clone for ConnectionPool<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Driver> std::fmt::Debug for ConnectionPool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("driver", &self.shared.config.driver)
            .field("initial_size", &self.shared.config.initial_size)
            .finish()
    }
}

impl<D: Driver> ConnectionPool<D> {
    /// Create a pool and open `config.initial_size` connections eagerly.
    ///
    /// If any of them fails to open, the ones already opened are closed and
    /// no pool is returned.
    pub async fn new(driver: D, config: PoolConfig) -> DbResult<Self> {
        let shared = Arc::new(PoolShared {
            driver,
            config,
            next_id: AtomicU64::new(0),
            state: Mutex::new(PoolState::new()),
        });

        let mut opened = Vec::with_capacity(shared.config.initial_size);
        for _ in 0..shared.config.initial_size {
            match shared.open().await {
                Ok(slot) => opened.push(slot),
                Err(e) => {
                    for slot in opened {
                        let _ = slot.conn.lock().await.close().await;
                    }
                    return Err(DbError::connection(
                        "Failed to initialize connection pool",
                        Some(e),
                    ));
                }
            }
        }

        {
            let mut state = shared.state.lock().await;
            for slot in opened {
                let idx = state.place(slot);
                state.available.push_back(idx);
            }
        }

        info!(
            db_type = %shared.config.driver,
            initial_size = shared.config.initial_size,
            auto_commit = shared.config.auto_commit,
            "Connection pool initialized"
        );

        Ok(Self { shared })
    }

    /// Check out a connection, reusing an idle one when possible.
    pub async fn acquire(&self) -> DbResult<PooledConnection<D>> {
        self.shared.acquire().await
    }

    /// Return a connection to the pool.
    ///
    /// Uncommitted work is rolled back. Connections that are dead or cannot be
    /// reset are discarded. Never fails; connections this pool does not
    /// consider checked out are ignored.
    pub async fn release(&self, mut conn: PooledConnection<D>) {
        if !Arc::ptr_eq(&conn.pool, &self.shared) {
            // Left to the handle's drop, which returns it to its own pool
            debug!(connection_id = %conn.id, "Release of a connection from another pool, ignoring");
            return;
        }
        conn.released = true;
        self.shared
            .release(conn.id, conn.slot, Arc::clone(&conn.conn))
            .await;
    }

    /// Close every connection and refuse further acquires. Idempotent.
    pub async fn close(&self) {
        let mut state = self.shared.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;

        let slots: Vec<Slot<D::Connection>> = state.slots.drain(..).flatten().collect();
        state.available.clear();
        state.in_use.clear();
        state.vacant.clear();

        for slot in slots {
            if let Err(e) = slot.conn.lock().await.close().await {
                debug!(connection_id = %slot.id, error = %e, "Error closing connection");
            }
        }

        info!("Connection pool closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.shared.state.lock().await.closed
    }

    pub async fn stats(&self) -> PoolStats {
        self.shared.state.lock().await.stats()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

/// A checked-out connection.
///
/// Hand it back with [`ConnectionPool::release`]. A handle dropped without
/// release is returned to its pool by a background task.
pub struct PooledConnection<D: Driver> {
    id: ConnectionId,
    slot: usize,
    conn: Arc<Mutex<D::Connection>>,
    pool: Arc<PoolShared<D>>,
    released: bool,
}

impl<D: Driver> std::fmt::Debug for PooledConnection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .finish()
    }
}

impl<D: Driver> PooledConnection<D> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether this connection was checked out of `pool`.
    pub fn belongs_to(&self, pool: &ConnectionPool<D>) -> bool {
        Arc::ptr_eq(&self.pool, &pool.shared)
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<QueryResult, DriverError> {
        self.conn.lock().await.execute(sql, params).await
    }

    pub async fn auto_commit(&self) -> bool {
        self.conn.lock().await.auto_commit()
    }

    pub async fn set_auto_commit(&self, enabled: bool) -> Result<(), DriverError> {
        self.conn.lock().await.set_auto_commit(enabled).await
    }

    pub async fn commit(&self) -> Result<(), DriverError> {
        self.conn.lock().await.commit().await
    }

    pub async fn rollback(&self) -> Result<(), DriverError> {
        self.conn.lock().await.rollback().await
    }

    pub async fn is_closed(&self) -> Result<bool, DriverError> {
        self.conn.lock().await.is_closed().await
    }

    /// Close the physical connection. The pool discards it on release.
    pub async fn close(&self) -> Result<(), DriverError> {
        self.conn.lock().await.close().await
    }
}

impl<D: Driver> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let pool = Arc::clone(&self.pool);
        let conn = Arc::clone(&self.conn);
        let (id, slot) = (self.id, self.slot);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    connection_id = %id,
                    "Connection released via Drop - consider using explicit release()"
                );
                handle.spawn(async move {
                    pool.release(id, slot, conn).await;
                });
            }
            Err(_) => {
                warn!(connection_id = %id, "Connection dropped outside a runtime, not returned to pool");
            }
        }
    }
}
