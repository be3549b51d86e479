//! Route-keyed connection pool with bounded capacity
//!
//! This module provides the lease accounting for pooled connections:
//! - A global limit on open connections and a per-route limit on leases
//! - Reuse of the most recently used idle connection before creating one
//! - Async waiting for capacity with a hard acquire timeout
//! - Idle expiry sweeps that never touch leased connections
//!
//! The pool never performs I/O. A freshly created connection has no
//! transport handle; the caller opens one outside the pool lock and
//! attaches it. All state lives behind one mutex that is only held while
//! the accounting structures are mutated.

use super::route::Route;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Source of unique pool identities, used to reject foreign connections
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Error types for connection pool operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Timed out after {waited:?} waiting for a connection to {route}")]
    Timeout { route: Route, waited: Duration },

    #[error("Pool limits can never satisfy a lease for {route}")]
    Exhausted { route: Route },

    #[error("Connection pool has been shut down")]
    Shutdown,
}

/// Capacity limits, fixed when the pool is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLimits {
    /// Maximum number of open connections across all routes
    pub max_total: usize,

    /// Default maximum number of leased connections per route
    pub max_per_route: usize,

    /// Per-route limits that replace `max_per_route`
    pub route_overrides: HashMap<Route, usize>,
}

impl PoolLimits {
    pub fn new(max_total: usize, max_per_route: usize) -> Self {
        Self {
            max_total,
            max_per_route,
            route_overrides: HashMap::new(),
        }
    }

    /// Raise or lower the limit for one route
    pub fn with_route_limit(mut self, route: Route, max: usize) -> Self {
        self.route_overrides.insert(route, max);
        self
    }

    /// Effective per-route limit
    pub fn max_for(&self, route: &Route) -> usize {
        self.route_overrides
            .get(route)
            .copied()
            .unwrap_or(self.max_per_route)
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::new(200, 20)
    }
}

/// Lifecycle state of a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Leased,
    Closed,
}

/// A connection slot bound to one route
///
/// Leased connections are owned by the caller until handed back through
/// [`ConnectionPool::release`] or [`ConnectionPool::invalidate`]. Dropping a
/// leased connection frees its slot and closes it.
pub struct PooledConnection<C> {
    id: u64,
    pool_id: u64,
    route: Route,
    state: ConnectionState,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
    handle: Option<C>,
    /// Back-reference used only to free the lease on drop
    pool: Option<Weak<PoolShared<C>>>,
}

impl<C> PooledConnection<C> {
    fn new(id: u64, pool_id: u64, route: Route) -> Self {
        let now = Instant::now();
        Self {
            id,
            pool_id,
            route,
            state: ConnectionState::Idle,
            created_at: now,
            last_used: now,
            use_count: 0,
            handle: None,
            pool: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Number of times this connection has been leased
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    /// Time since the connection was last returned to the pool
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Whether a transport handle is attached
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&C> {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut C> {
        self.handle.as_mut()
    }

    /// Attach a freshly opened transport handle, returning any previous one
    pub fn attach(&mut self, handle: C) -> Option<C> {
        self.handle.replace(handle)
    }

    /// Detach the transport handle
    pub fn take_handle(&mut self) -> Option<C> {
        self.handle.take()
    }

    /// Mark the connection closed and drop its handle
    ///
    /// A closed connection handed to `release` is discarded, not pooled.
    pub fn close(&mut self) {
        self.handle = None;
        self.state = ConnectionState::Closed;
    }

    fn disarm(&mut self) {
        self.pool = None;
    }
}

impl<C> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("state", &self.state)
            .field("use_count", &self.use_count)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(shared) = self.pool.take().and_then(|weak| weak.upgrade()) {
            warn!(
                route = %self.route,
                connection_id = self.id,
                "Leased connection dropped without release, closing it"
            );
            shared.forget_lease(self.id);
        }
    }
}

/// Statistics snapshot for the whole pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total connections created
    pub total_created: u64,

    /// Total leases served from the idle set
    pub total_reused: u64,

    /// Total connections closed (evicted, invalidated or shut down)
    pub total_closed: u64,

    /// Connections currently leased
    pub leased: usize,

    /// Connections currently idle
    pub idle: usize,

    /// Callers currently waiting in `acquire`
    pub pending: usize,

    /// Configured global limit
    pub max_total: usize,
}

/// Statistics snapshot for one route
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub leased: usize,
    pub idle: usize,
    pub max: usize,
}

/// Mutable accounting, guarded by `PoolShared::state`
struct PoolState<C> {
    /// Idle connections per route, least recently used first
    idle: HashMap<Route, VecDeque<PooledConnection<C>>>,

    /// Leased connection ids and their routes
    leased: HashMap<u64, Route>,

    leased_per_route: HashMap<Route, usize>,

    idle_count: usize,

    next_id: u64,

    shutdown: bool,

    total_created: u64,
    total_reused: u64,
    total_closed: u64,
}

impl<C> PoolState<C> {
    fn new() -> Self {
        Self {
            idle: HashMap::new(),
            leased: HashMap::new(),
            leased_per_route: HashMap::new(),
            idle_count: 0,
            next_id: 1,
            shutdown: false,
            total_created: 0,
            total_reused: 0,
            total_closed: 0,
        }
    }

    fn open_count(&self) -> usize {
        self.leased.len() + self.idle_count
    }

    fn leased_on(&self, route: &Route) -> usize {
        self.leased_per_route.get(route).copied().unwrap_or(0)
    }

    /// Hand out a connection for `route` if limits allow, without waiting
    ///
    /// Dropped connections are pushed to `closed` so they can be released
    /// after the lock.
    fn try_lease(
        &mut self,
        route: &Route,
        limits: &PoolLimits,
        pool_id: u64,
        closed: &mut Vec<PooledConnection<C>>,
    ) -> Result<Option<PooledConnection<C>>, PoolError> {
        if self.shutdown {
            return Err(PoolError::Shutdown);
        }

        let reused = match self.idle.get_mut(route) {
            Some(queue) => {
                let conn = queue.pop_back();
                if queue.is_empty() {
                    self.idle.remove(route);
                }
                conn
            }
            None => None,
        };

        if let Some(conn) = reused {
            self.idle_count -= 1;
            self.total_reused += 1;
            debug!(
                route = %route,
                connection_id = conn.id,
                use_count = conn.use_count,
                "Reusing idle connection"
            );
            return Ok(Some(self.lease(conn)));
        }

        if self.leased_on(route) >= limits.max_for(route) {
            return Ok(None);
        }

        if self.open_count() >= limits.max_total {
            match self.pop_lru_idle() {
                Some(victim) => {
                    debug!(
                        route = %victim.route,
                        connection_id = victim.id,
                        "Closing idle connection of another route to make room"
                    );
                    closed.push(self.close_conn(victim));
                }
                None => return Ok(None),
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.total_created += 1;
        debug!(route = %route, connection_id = id, "Created new connection");

        Ok(Some(self.lease(PooledConnection::new(id, pool_id, route.clone()))))
    }

    fn lease(&mut self, mut conn: PooledConnection<C>) -> PooledConnection<C> {
        conn.state = ConnectionState::Leased;
        conn.use_count += 1;
        self.leased.insert(conn.id, conn.route.clone());
        *self.leased_per_route.entry(conn.route.clone()).or_insert(0) += 1;
        conn
    }

    /// Drop lease accounting for `id`; false if it was not leased here
    fn unlease(&mut self, id: u64) -> bool {
        let Some(route) = self.leased.remove(&id) else {
            return false;
        };
        if let Some(count) = self.leased_per_route.get_mut(&route) {
            *count -= 1;
            if *count == 0 {
                self.leased_per_route.remove(&route);
            }
        }
        true
    }

    /// Least recently used idle connection across all routes
    fn pop_lru_idle(&mut self) -> Option<PooledConnection<C>> {
        let route = self
            .idle
            .iter()
            .filter_map(|(route, queue)| queue.front().map(|c| (route, c.last_used)))
            .min_by_key(|(_, last_used)| *last_used)
            .map(|(route, _)| route.clone())?;

        let queue = self.idle.get_mut(&route)?;
        let conn = queue.pop_front();
        if queue.is_empty() {
            self.idle.remove(&route);
        }
        if conn.is_some() {
            self.idle_count -= 1;
        }
        conn
    }

    fn close_conn(&mut self, mut conn: PooledConnection<C>) -> PooledConnection<C> {
        conn.close();
        self.total_closed += 1;
        conn
    }

    fn drain_idle_where(
        &mut self,
        mut should_close: impl FnMut(&PooledConnection<C>) -> bool,
    ) -> Vec<PooledConnection<C>> {
        let mut closed = Vec::new();
        for queue in self.idle.values_mut() {
            let mut kept = VecDeque::with_capacity(queue.len());
            for conn in queue.drain(..) {
                if should_close(&conn) {
                    closed.push(conn);
                } else {
                    kept.push_back(conn);
                }
            }
            *queue = kept;
        }
        self.idle.retain(|_, queue| !queue.is_empty());
        self.idle_count -= closed.len();

        closed.into_iter().map(|conn| self.close_conn(conn)).collect()
    }
}

/// State shared between the pool and the back-references of its leases
struct PoolShared<C> {
    id: u64,
    limits: PoolLimits,
    state: Mutex<PoolState<C>>,
    /// Signalled whenever capacity or an idle connection may have appeared
    available: Notify,
    pending: AtomicUsize,
}

impl<C> PoolShared<C> {
    fn lock_state(&self) -> MutexGuard<'_, PoolState<C>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn forget_lease(&self, id: u64) {
        {
            let mut state = self.lock_state();
            if state.unlease(id) {
                state.total_closed += 1;
            }
        }
        self.available.notify_waiters();
    }
}

/// Decrements the pending-waiter count when an acquire stops waiting
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Bounded pool of connections partitioned by [`Route`]
pub struct ConnectionPool<C> {
    shared: Arc<PoolShared<C>>,
}

impl<C: Send + 'static> ConnectionPool<C> {
    /// Create an empty pool with the given limits
    pub fn new(limits: PoolLimits) -> Self {
        info!(
            max_total = limits.max_total,
            max_per_route = limits.max_per_route,
            overrides = limits.route_overrides.len(),
            "Connection pool created"
        );

        Self {
            shared: Arc::new(PoolShared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                limits,
                state: Mutex::new(PoolState::new()),
                available: Notify::new(),
                pending: AtomicUsize::new(0),
            }),
        }
    }

    pub fn limits(&self) -> &PoolLimits {
        &self.shared.limits
    }

    /// Lease a connection for `route`, waiting up to `timeout` for capacity
    ///
    /// An idle connection is preferred over creating a new one; among idle
    /// connections the most recently used wins. A connection created here
    /// has no transport handle yet: attach one before releasing it, or the
    /// release discards it instead of pooling it. A timeout too large to
    /// form a deadline (such as `Duration::MAX`) waits without limit.
    pub async fn acquire(
        &self,
        route: &Route,
        timeout: Duration,
    ) -> Result<PooledConnection<C>, PoolError> {
        let shared = &self.shared;
        if shared.limits.max_total == 0 || shared.limits.max_for(route) == 0 {
            return Err(PoolError::Exhausted {
                route: route.clone(),
            });
        }

        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let mut pending: Option<PendingGuard<'_>> = None;

        loop {
            // Register interest before checking so a release between the
            // check and the wait is not lost.
            let notified = shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut closed = Vec::new();
            let leased = shared
                .lock_state()
                .try_lease(route, &shared.limits, shared.id, &mut closed);
            drop(closed);

            match leased? {
                Some(mut conn) => {
                    conn.pool = Some(Arc::downgrade(shared));
                    return Ok(conn);
                }
                None => {
                    if pending.is_none() {
                        debug!(route = %route, "No capacity, waiting for a connection");
                        pending = Some(PendingGuard::enter(&shared.pending));
                    }
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        debug!(route = %route, "Timed out waiting for a connection");
                        return Err(PoolError::Timeout {
                            route: route.clone(),
                            waited: started.elapsed(),
                        });
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Return a leased connection to the idle set of its route
    ///
    /// Connections unknown to this pool are ignored with a warning; one owned
    /// by another pool is dropped, which frees its slot there. Closed or
    /// never-opened connections free their slot but are not pooled, so only
    /// a lease with an attached handle comes back as Idle.
    pub fn release(&self, mut conn: PooledConnection<C>) {
        let shared = &self.shared;
        if conn.pool_id != shared.id {
            warn!(
                route = %conn.route,
                connection_id = conn.id,
                "Ignoring release of a connection owned by another pool"
            );
            return;
        }
        conn.disarm();

        let discarded = {
            let mut state = shared.lock_state();
            if !state.unlease(conn.id) {
                drop(state);
                warn!(
                    route = %conn.route,
                    connection_id = conn.id,
                    "Ignoring release of a connection not leased from this pool"
                );
                return;
            }

            if conn.state == ConnectionState::Closed {
                warn!(
                    route = %conn.route,
                    connection_id = conn.id,
                    "Released connection was already closed, discarding"
                );
                state.total_closed += 1;
                Some(conn)
            } else if conn.handle.is_none() {
                debug!(
                    route = %conn.route,
                    connection_id = conn.id,
                    "Released connection was never opened, discarding"
                );
                Some(state.close_conn(conn))
            } else if state.shutdown {
                Some(state.close_conn(conn))
            } else {
                conn.state = ConnectionState::Idle;
                conn.last_used = Instant::now();
                state.idle.entry(conn.route.clone()).or_default().push_back(conn);
                state.idle_count += 1;
                None
            }
        };

        drop(discarded);
        shared.available.notify_waiters();
    }

    /// Remove a leased connection from circulation
    ///
    /// Used when the connection itself is broken; it is never returned to
    /// the idle set.
    pub fn invalidate(&self, mut conn: PooledConnection<C>) {
        let shared = &self.shared;
        if conn.pool_id != shared.id {
            warn!(
                route = %conn.route,
                connection_id = conn.id,
                "Ignoring invalidation of a connection owned by another pool"
            );
            return;
        }
        conn.disarm();

        let closed = {
            let mut state = shared.lock_state();
            if !state.unlease(conn.id) {
                drop(state);
                warn!(
                    route = %conn.route,
                    connection_id = conn.id,
                    "Ignoring invalidation of a connection not leased from this pool"
                );
                return;
            }
            debug!(route = %conn.route, connection_id = conn.id, "Invalidating connection");
            state.close_conn(conn)
        };

        drop(closed);
        shared.available.notify_waiters();
    }

    /// Close idle connections unused for longer than `idle_threshold`
    ///
    /// Returns the number of connections closed. Leased connections are
    /// never touched.
    pub fn close_expired(&self, idle_threshold: Duration) -> usize {
        let now = Instant::now();
        let closed = self
            .shared
            .lock_state()
            .drain_idle_where(|conn| now.saturating_duration_since(conn.last_used) > idle_threshold);

        let count = closed.len();
        for conn in &closed {
            debug!(
                route = %conn.route,
                connection_id = conn.id,
                idle_ms = now.saturating_duration_since(conn.last_used).as_millis() as u64,
                "Closed expired idle connection"
            );
        }
        drop(closed);

        if count > 0 {
            self.shared.available.notify_waiters();
        }
        count
    }

    /// Close every idle connection
    pub fn close_idle(&self) -> usize {
        let closed = self.shared.lock_state().drain_idle_where(|_| true);
        let count = closed.len();
        drop(closed);

        if count > 0 {
            debug!(closed = count, "Closed all idle connections");
            self.shared.available.notify_waiters();
        }
        count
    }

    /// Shut the pool down
    ///
    /// Idle connections are closed now, waiters fail with
    /// [`PoolError::Shutdown`], and leased connections are closed when they
    /// come back.
    pub fn shutdown(&self) {
        let closed = {
            let mut state = self.shared.lock_state();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.drain_idle_where(|_| true)
        };

        let leased = self.stats().leased;
        info!(
            closed_idle = closed.len(),
            still_leased = leased,
            "Connection pool shut down"
        );
        drop(closed);
        self.shared.available.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock_state().shutdown
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock_state();
        PoolStats {
            total_created: state.total_created,
            total_reused: state.total_reused,
            total_closed: state.total_closed,
            leased: state.leased.len(),
            idle: state.idle_count,
            pending: self.shared.pending.load(Ordering::Relaxed),
            max_total: self.shared.limits.max_total,
        }
    }

    /// Get statistics for a single route
    pub fn route_stats(&self, route: &Route) -> RouteStats {
        let state = self.shared.lock_state();
        RouteStats {
            leased: state.leased_on(route),
            idle: state.idle.get(route).map_or(0, VecDeque::len),
            max: self.shared.limits.max_for(route),
        }
    }

    /// Get statistics for every route with leased or idle connections
    pub fn all_route_stats(&self) -> HashMap<Route, RouteStats> {
        let state = self.shared.lock_state();
        let mut stats: HashMap<Route, RouteStats> = HashMap::new();

        for (route, leased) in &state.leased_per_route {
            stats.entry(route.clone()).or_default().leased = *leased;
        }
        for (route, queue) in &state.idle {
            stats.entry(route.clone()).or_default().idle = queue.len();
        }
        for (route, entry) in stats.iter_mut() {
            entry.max = self.shared.limits.max_for(route);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route::new("http", "localhost", 9000)
    }

    #[test]
    fn test_pool_limits_defaults() {
        let limits = PoolLimits::default();
        assert_eq!(limits.max_total, 200);
        assert_eq!(limits.max_per_route, 20);
        assert!(limits.route_overrides.is_empty());
    }

    #[test]
    fn test_route_override() {
        let special = Route::new("https", "api.example.com", 443);
        let limits = PoolLimits::new(200, 20).with_route_limit(special.clone(), 50);
        assert_eq!(limits.max_for(&special), 50);
        assert_eq!(limits.max_for(&route()), 20);
    }

    #[tokio::test]
    async fn test_acquire_creates_then_reuses() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(4, 2));
        let mut conn = pool.acquire(&route(), Duration::from_millis(10)).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Leased);
        assert!(!conn.is_open());
        conn.attach(7);
        let id = conn.id();

        pool.release(conn);
        let stats = pool.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.idle, 1);

        let again = pool.acquire(&route(), Duration::from_millis(10)).await.unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(again.route(), &route());
        assert_eq!(again.use_count(), 2);
        assert_eq!(again.handle(), Some(&7));

        let stats = pool.stats();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.total_reused, 1);
        pool.release(again);
    }

    #[tokio::test(start_paused = true)]
    async fn test_most_recently_used_is_preferred() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(4, 4));
        let mut first = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        let mut second = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        first.attach(1);
        second.attach(2);
        let second_id = second.id();

        pool.release(first);
        tokio::time::advance(Duration::from_secs(1)).await;
        pool.release(second);

        let picked = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        assert_eq!(picked.id(), second_id);
        pool.release(picked);
    }

    #[tokio::test]
    async fn test_zero_limits_are_exhausted() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(10, 0));
        let err = pool.acquire(&route(), Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, PoolError::Exhausted { route: route() });

        let pool = ConnectionPool::<u32>::new(PoolLimits::new(0, 10));
        let err = pool.acquire(&route(), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_without_phantom_lease() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(1, 1));
        let held = pool.acquire(&route(), Duration::ZERO).await.unwrap();

        let err = pool
            .acquire(&route(), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Timeout { .. }));

        let stats = pool.stats();
        assert_eq!(stats.leased, 1);
        assert_eq!(stats.pending, 0);
        pool.release(held);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_leases_free_slot() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(1, 1));
        let conn = pool.acquire(&route(), Duration::MAX).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Leased);
        assert_eq!(pool.stats().leased, 1);
        pool.release(conn);
    }

    #[tokio::test]
    async fn test_unopened_release_is_discarded() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(2, 2));
        let conn = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        pool.release(conn);

        let stats = pool.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.total_closed, 1);
    }

    #[tokio::test]
    async fn test_release_of_foreign_connection_is_ignored() {
        let pool_a = ConnectionPool::<u32>::new(PoolLimits::new(2, 2));
        let pool_b = ConnectionPool::<u32>::new(PoolLimits::new(2, 2));

        let mut conn = pool_a.acquire(&route(), Duration::ZERO).await.unwrap();
        conn.attach(1);
        pool_b.release(conn);

        assert_eq!(pool_b.stats().idle, 0);
        assert_eq!(pool_b.stats().total_closed, 0);
        // Dropping the foreign connection hands its slot back to pool_a.
        assert_eq!(pool_a.stats().leased, 0);
        assert_eq!(pool_a.stats().idle, 0);
    }

    #[tokio::test]
    async fn test_release_closed_connection_frees_slot() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(1, 1));
        let mut conn = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        conn.attach(1);
        conn.close();
        pool.release(conn);

        let stats = pool.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.total_closed, 1);
    }

    #[tokio::test]
    async fn test_invalidate_never_returns_to_idle() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(2, 2));
        let mut conn = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        conn.attach(1);
        pool.invalidate(conn);

        let stats = pool.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.total_closed, 1);
    }

    #[tokio::test]
    async fn test_dropped_lease_frees_slot() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(1, 1));
        {
            let _conn = pool.acquire(&route(), Duration::ZERO).await.unwrap();
            assert_eq!(pool.stats().leased, 1);
        }
        assert_eq!(pool.stats().leased, 0);
        assert!(pool.acquire(&route(), Duration::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_full_pool_closes_idle_of_other_route() {
        let other = Route::new("http", "other", 80);
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(1, 1));

        let mut conn = pool.acquire(&other, Duration::ZERO).await.unwrap();
        conn.attach(1);
        pool.release(conn);
        assert_eq!(pool.stats().idle, 1);

        let conn = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        assert_eq!(conn.route(), &route());
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.leased, 1);
        assert_eq!(stats.total_closed, 1);
        pool.release(conn);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_expired_only_touches_stale_idle() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(4, 4));
        let mut stale = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        let mut fresh = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        let leased = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        stale.attach(1);
        fresh.attach(2);
        let fresh_id = fresh.id();

        pool.release(stale);
        tokio::time::advance(Duration::from_secs(15)).await;
        pool.release(fresh);

        assert_eq!(pool.close_expired(Duration::from_secs(10)), 1);
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.leased, 1);

        let survivor = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        assert_eq!(survivor.id(), fresh_id);
        pool.release(survivor);
        pool.release(leased);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_and_closes() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(4, 4));
        let mut idle = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        let mut leased = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        idle.attach(1);
        leased.attach(2);
        pool.release(idle);

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert_eq!(pool.stats().idle, 0);

        let err = pool.acquire(&route(), Duration::ZERO).await.unwrap_err();
        assert_eq!(err, PoolError::Shutdown);

        pool.release(leased);
        let stats = pool.stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.total_closed, 2);
    }

    #[tokio::test]
    async fn test_route_stats() {
        let pool = ConnectionPool::<u32>::new(PoolLimits::new(10, 3));
        let mut a = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        let b = pool.acquire(&route(), Duration::ZERO).await.unwrap();
        a.attach(1);
        pool.release(a);

        let stats = pool.route_stats(&route());
        assert_eq!(stats, RouteStats { leased: 1, idle: 1, max: 3 });
        assert_eq!(pool.all_route_stats().len(), 1);
        pool.release(b);
    }
}
