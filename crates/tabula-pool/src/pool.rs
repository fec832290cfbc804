//! Connection pool implementation.
//!
//! Bookkeeping lives in one [`parking_lot::Mutex`] that is only held for
//! short synchronous sections. Connecting and closing always happen with the
//! lock released.
//!
//! Requests that find the pool exhausted wait in a FIFO queue of oneshot
//! senders. A released connection goes straight to the head waiter, which
//! resumes on its own task. When a connection is destroyed while requests
//! are waiting, the freed capacity is reserved for the head waiter, which
//! then opens a replacement itself.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tabula_client::instrumentation::{DB_SYSTEM, span_names};
use tabula_client::{Connection, Connector};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::ConnectionMetadata;

/// A bounded pool of database connections.
///
/// Cloning a `Pool` is cheap and yields another handle to the same pool.
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

struct PoolInner<C: Connector> {
    config: PoolConfig,
    connector: C,
    state: Mutex<PoolState<C::Connection>>,
    metrics: Counters,
}

struct PoolState<T> {
    /// Connections opened (or being opened) and not yet destroyed.
    active: u32,
    /// Released connections, reused last-in first-out.
    idle: Vec<Slot<T>>,
    waiting: VecDeque<oneshot::Sender<Grant<T>>>,
    closed: bool,
    next_id: u64,
}

struct Slot<T> {
    conn: T,
    meta: ConnectionMetadata,
}

/// What a queued request receives.
enum Grant<T> {
    /// A released connection, handed over directly.
    Connection(Slot<T>),
    /// Capacity freed by a destroyed connection, already counted in `active`.
    Open,
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    closed: AtomicU64,
    checkouts: AtomicU64,
    waits: AtomicU64,
    faults: AtomicU64,
    timeouts: AtomicU64,
}

enum Step<'a, C: Connector> {
    Ready(Slot<C::Connection>),
    Open(Reservation<'a, C>),
    Wait(Waiter<'a, C>),
}

impl<C: Connector> Pool<C> {
    /// Create a pool. No connection is opened until the first `acquire`.
    pub fn new(config: PoolConfig, connector: C) -> Result<Self, PoolError> {
        config.validate()?;

        tracing::debug!(
            max_connections = config.max_connections,
            acquire_timeout = ?config.acquire_timeout,
            "creating connection pool"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                connector,
                state: Mutex::new(PoolState {
                    active: 0,
                    idle: Vec::new(),
                    waiting: VecDeque::new(),
                    closed: false,
                    next_id: 1,
                }),
                metrics: Counters::default(),
            }),
        })
    }

    /// Create a pool builder.
    pub fn builder(connector: C) -> PoolBuilder<C> {
        PoolBuilder {
            connector,
            config: PoolConfig::default(),
        }
    }

    /// Get a connection from the pool.
    ///
    /// Hands out an idle connection if there is one, opens a new one if the
    /// pool is below `max_connections`, and otherwise waits in line until a
    /// connection is released.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        let span = tracing::trace_span!(
            span_names::ACQUIRE,
            db.system = DB_SYSTEM,
            max_connections = self.inner.config.max_connections,
        );
        match self.inner.config.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.acquire_inner().instrument(span))
                .await
                .map_err(|_| {
                    self.inner.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(?timeout, "connection acquisition timed out");
                    PoolError::AcquisitionTimeout(timeout)
                })?,
            None => self.acquire_inner().instrument(span).await,
        }
    }

    /// Get an idle connection without waiting or connecting.
    ///
    /// Returns `Ok(None)` when no idle connection is available.
    pub fn try_acquire(&self) -> Result<Option<PooledConnection<C>>, PoolError> {
        let mut stale = Vec::new();
        let slot = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            self.inner.pop_idle(&mut state, &mut stale)
        };
        for conn in stale {
            self.inner.spawn_close(conn);
        }
        Ok(slot.map(|slot| self.checkout(slot)))
    }

    async fn acquire_inner(&self) -> Result<PooledConnection<C>, PoolError> {
        tracing::trace!("acquiring connection from pool");

        // Every change to `active` or `waiting` is paired with its guard
        // before the lock is released, so dropping this future at any await
        // point gives the capacity or the queue slot back.
        let mut stale = Vec::new();
        let step = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }

            if let Some(slot) = self.inner.pop_idle(&mut state, &mut stale) {
                Step::Ready(slot)
            } else if state.active < self.inner.config.max_connections {
                state.active += 1;
                Step::Open(Reservation::new(&self.inner))
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiting.push_back(tx);
                tracing::trace!(
                    waiting = state.waiting.len(),
                    "pool exhausted, queueing request"
                );
                Step::Wait(Waiter {
                    rx: Some(rx),
                    inner: &self.inner,
                })
            }
        };

        for conn in stale {
            self.inner.spawn_close(conn);
        }

        match step {
            Step::Ready(slot) => Ok(self.checkout(slot)),
            Step::Open(reservation) => self.open(reservation).await,
            Step::Wait(waiter) => {
                self.inner.metrics.waits.fetch_add(1, Ordering::Relaxed);
                match waiter.wait().await? {
                    Grant::Connection(slot) => {
                        tracing::trace!(connection_id = slot.meta.id, "received released connection");
                        Ok(self.checkout(slot))
                    }
                    Grant::Open => self.open(Reservation::new(&self.inner)).await,
                }
            }
        }
    }

    /// Open a new connection on capacity already counted in `active`.
    async fn open(&self, reservation: Reservation<'_, C>) -> Result<PooledConnection<C>, PoolError> {
        match self.inner.connector.connect().await {
            Ok(conn) => {
                reservation.disarm();
                let id = {
                    let mut state = self.inner.state.lock();
                    let id = state.next_id;
                    state.next_id += 1;
                    id
                };
                self.inner.metrics.created.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(connection_id = id, "opened new pooled connection");
                Ok(self.checkout(Slot {
                    conn,
                    meta: ConnectionMetadata::new(id),
                }))
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to open connection");
                drop(reservation);
                Err(PoolError::ConnectionCreation(e))
            }
        }
    }

    fn checkout(&self, mut slot: Slot<C::Connection>) -> PooledConnection<C> {
        slot.meta.mark_checkout();
        self.inner.metrics.checkouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(connection_id = slot.meta.id, "connection checked out");
        PooledConnection {
            slot: Some(slot),
            pool: Arc::clone(&self.inner),
            faulted: false,
        }
    }

    /// Return a connection to the pool.
    ///
    /// The connection goes to the request at the head of the queue, or back
    /// to the idle set when nobody is waiting. A connection marked broken is
    /// closed instead, and its capacity passes to the head waiter.
    ///
    /// Pool bookkeeping is settled before the first await, so the caller
    /// may report its own result as soon as this returns.
    pub async fn release(&self, mut conn: PooledConnection<C>) {
        if !Arc::ptr_eq(&conn.pool, &self.inner) {
            tracing::warn!("connection released to a pool it does not belong to");
            return;
        }

        let faulted = conn.faulted;
        let Some(slot) = conn.slot.take() else {
            return;
        };
        if let Some(destroyed) = self.inner.checkin(slot, faulted) {
            self.inner.close_connection(destroyed).await;
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are closed and every waiting request fails with
    /// [`PoolError::PoolClosed`]. Connections still checked out are closed
    /// when they are released.
    pub async fn close(&self) {
        let (idle, waiting) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.active -= idle.len() as u32;
            (idle, std::mem::take(&mut state.waiting))
        };

        // Dropping the senders wakes every waiter with PoolClosed.
        drop(waiting);

        let count = idle.len();
        for slot in idle {
            self.inner.close_connection(slot.conn).await;
        }

        tracing::info!(closed_idle = count, "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        let available = state.idle.len() as u32;
        PoolStatus {
            available,
            in_use: state.active - available,
            total: state.active,
            max: self.inner.config.max_connections,
            waiting: state.waiting.iter().filter(|tx| !tx.is_closed()).count() as u32,
        }
    }

    /// Get lifetime counters for the pool.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let m = &self.inner.metrics;
        PoolMetrics {
            connections_created: m.created.load(Ordering::Relaxed),
            connections_closed: m.closed.load(Ordering::Relaxed),
            checkouts: m.checkouts.load(Ordering::Relaxed),
            waits: m.waits.load(Ordering::Relaxed),
            faults: m.faults.load(Ordering::Relaxed),
            timeouts: m.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the connector used to open connections.
    #[must_use]
    pub fn connector(&self) -> &C {
        &self.inner.connector
    }
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<C: Connector> PoolInner<C> {
    /// Pop the most recently released idle connection that is still valid.
    ///
    /// Invalid ones are counted out of `active` and collected into `stale`.
    fn pop_idle(
        &self,
        state: &mut PoolState<C::Connection>,
        stale: &mut Vec<C::Connection>,
    ) -> Option<Slot<C::Connection>> {
        while let Some(slot) = state.idle.pop() {
            if !self.config.test_on_checkout || slot.conn.is_valid() {
                return Some(slot);
            }
            tracing::debug!(connection_id = slot.meta.id, "discarding invalid idle connection");
            state.active -= 1;
            stale.push(slot.conn);
        }
        None
    }

    /// Take back a checked-out connection.
    ///
    /// Returns the connection when it must be destroyed instead of reused.
    fn checkin(&self, mut slot: Slot<C::Connection>, faulted: bool) -> Option<C::Connection> {
        let mut state = self.state.lock();

        if faulted || state.closed || !slot.conn.is_valid() {
            if faulted || !slot.conn.is_valid() {
                self.metrics.faults.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    connection_id = slot.meta.id,
                    "destroying faulted connection"
                );
            }
            slot.meta.mark_broken();
            state.active -= 1;
            self.grant_capacity(&mut state);
            return Some(slot.conn);
        }

        slot.meta.mark_checkin();
        while let Some(tx) = state.waiting.pop_front() {
            let id = slot.meta.id;
            match tx.send(Grant::Connection(slot)) {
                Ok(()) => {
                    tracing::trace!(connection_id = id, "handed connection to waiter");
                    return None;
                }
                // The waiter gave up; try the next one.
                Err(Grant::Connection(returned)) => slot = returned,
                Err(Grant::Open) => return None,
            }
        }

        tracing::trace!(connection_id = slot.meta.id, "connection returned to idle");
        state.idle.push(slot);
        None
    }

    /// Hand capacity below `max_connections` to waiting requests.
    fn grant_capacity(&self, state: &mut PoolState<C::Connection>) {
        while state.active < self.config.max_connections {
            let Some(tx) = state.waiting.pop_front() else {
                break;
            };
            state.active += 1;
            if tx.send(Grant::Open).is_ok() {
                tracing::trace!("granted capacity to waiter");
            } else {
                state.active -= 1;
            }
        }
    }

    /// Give back capacity that was counted in `active` but never used.
    fn release_capacity(&self) {
        let mut state = self.state.lock();
        state.active -= 1;
        self.grant_capacity(&mut state);
    }

    /// Put a grant that reached a cancelled waiter back into circulation.
    fn return_grant(&self, grant: Grant<C::Connection>) {
        match grant {
            Grant::Connection(slot) => {
                if let Some(conn) = self.checkin(slot, false) {
                    self.spawn_close(conn);
                }
            }
            Grant::Open => self.release_capacity(),
        }
    }

    /// Close a connection in the background, for callers that cannot await.
    ///
    /// Outside a runtime the connection is simply dropped.
    fn spawn_close(&self, conn: C::Connection) {
        self.metrics.closed.fetch_add(1, Ordering::Relaxed);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.close().await {
                        tracing::debug!(error = %e, "error while closing connection");
                    }
                });
            }
            Err(_) => drop(conn),
        }
    }

    async fn close_connection(&self, conn: C::Connection) {
        self.metrics.closed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "error while closing connection");
        }
    }
}

/// A queued acquire request.
///
/// If the request is cancelled after a grant was sent but before it was
/// received, dropping the waiter puts the grant back into circulation.
struct Waiter<'a, C: Connector> {
    rx: Option<oneshot::Receiver<Grant<C::Connection>>>,
    inner: &'a PoolInner<C>,
}

impl<C: Connector> Waiter<'_, C> {
    async fn wait(mut self) -> Result<Grant<C::Connection>, PoolError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(PoolError::PoolClosed);
        };
        let result = rx.await;
        self.rx = None;
        result.map_err(|_| PoolError::PoolClosed)
    }
}

impl<C: Connector> Drop for Waiter<'_, C> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(grant) = rx.try_recv() {
                self.inner.return_grant(grant);
            }
        }
    }
}

/// Capacity counted in `active` for a connection that is being opened.
///
/// Released if the connect fails or the acquiring future is dropped.
struct Reservation<'a, C: Connector> {
    inner: &'a PoolInner<C>,
    armed: bool,
}

impl<'a, C: Connector> Reservation<'a, C> {
    fn new(inner: &'a PoolInner<C>) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C: Connector> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.release_capacity();
        }
    }
}

/// Builder for [`Pool`].
pub struct PoolBuilder<C: Connector> {
    connector: C,
    config: PoolConfig,
}

impl<C: Connector> PoolBuilder<C> {
    /// Use a complete configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.acquire_timeout = Some(timeout);
        self
    }

    /// Enable or disable testing connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.config.test_on_checkout = enabled;
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<Pool<C>, PoolError> {
        Pool::new(self.config, self.connector)
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use (or being opened).
    pub in_use: u32,
    /// Total number of open connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
    /// Number of requests waiting for a connection.
    pub waiting: u32,
}

impl PoolStatus {
    /// Percentage of the connection bound currently checked out.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        f64::from(self.in_use) / f64::from(self.max) * 100.0
    }
}

/// Lifetime counters for a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Connections opened.
    pub connections_created: u64,
    /// Connections closed.
    pub connections_closed: u64,
    /// Successful checkouts.
    pub checkouts: u64,
    /// Requests that had to wait in the queue.
    pub waits: u64,
    /// Connections destroyed because they faulted.
    pub faults: u64,
    /// Requests that timed out waiting.
    pub timeouts: u64,
}

/// A connection checked out of the pool.
///
/// Dereferences to the underlying connection. When dropped, the connection
/// is returned to the pool; [`Pool::release`] does the same and also waits
/// for a broken connection to finish closing.
pub struct PooledConnection<C: Connector> {
    slot: Option<Slot<C::Connection>>,
    pool: Arc<PoolInner<C>>,
    faulted: bool,
}

impl<C: Connector> PooledConnection<C> {
    /// Mark the connection as broken so it is destroyed on release.
    ///
    /// The flag only lives as long as this checkout.
    pub fn mark_broken(&mut self) {
        if !self.faulted {
            tracing::debug!(connection_id = ?self.metadata().map(|m| m.id), "connection marked broken");
        }
        self.faulted = true;
    }

    /// Check if the connection was marked broken during this checkout.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.faulted
    }

    /// Lifecycle metadata for the connection.
    #[must_use]
    pub fn metadata(&self) -> Option<&ConnectionMetadata> {
        self.slot.as_ref().map(|s| &s.meta)
    }

    /// Detach the connection from the pool.
    ///
    /// The pool stops counting it, and the capacity it held passes to the
    /// next waiting request.
    pub fn detach(mut self) -> Option<C::Connection> {
        let slot = self.slot.take()?;
        tracing::debug!(connection_id = slot.meta.id, "connection detached from pool");
        self.pool.release_capacity();
        Some(slot.conn)
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        match &self.slot {
            Some(slot) => &slot.conn,
            // The slot is only taken by methods that consume the guard.
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.slot {
            Some(slot) => &mut slot.conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connector> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("metadata", &self.metadata())
            .field("faulted", &self.faulted)
            .finish()
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            tracing::trace!(connection_id = slot.meta.id, "returning connection to pool");
            if let Some(conn) = self.pool.checkin(slot, self.faulted) {
                self.pool.spawn_close(conn);
            }
        }
    }
}
