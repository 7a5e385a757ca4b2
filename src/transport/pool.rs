//! Bounded pool of connections to the authorization host.
//!
//! The lock only guards the reuse/open/wait decision; connects and exchanges
//! run outside it.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::{Connection, TransportError};
use crate::config::GatewayConfig;

#[derive(Debug, Default)]
struct PoolState {
    idle: VecDeque<Connection>,
    /// Idle plus checked-out plus connects in flight.
    total: usize,
    closed: bool,
}

impl PoolState {
    fn checked_out(&self) -> usize {
        self.total - self.idle.len()
    }
}

enum Checkout {
    Idle(Connection),
    Open,
    Exhausted,
}

#[derive(Debug)]
pub struct ConnectionPool {
    config: Arc<GatewayConfig>,
    state: Mutex<PoolState>,
    available: Notify,
    shutdown: watch::Sender<bool>,
}

impl ConnectionPool {
    /// Build a pool without opening any connection.
    pub fn new(config: Arc<GatewayConfig>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            state: Mutex::new(PoolState::default()),
            available: Notify::new(),
            shutdown,
        })
    }

    /// Build a pool and eagerly open `min_connections`.
    ///
    /// Warm-up is best effort: the first failed connect stops it and the
    /// remaining connections are opened on demand.
    pub async fn connect(config: Arc<GatewayConfig>) -> Arc<Self> {
        let pool = Self::new(config);
        pool.warm_up().await;
        pool
    }

    async fn warm_up(&self) {
        for _ in 0..self.config.min_connections {
            match Connection::open(&self.config).await {
                Ok(conn) => {
                    let mut state = self.lock();
                    state.total += 1;
                    state.idle.push_back(conn);
                }
                Err(e) => {
                    warn!(address = %self.config.address(), error = %e, "pool warm-up stopped");
                    break;
                }
            }
        }
        info!(
            address = %self.config.address(),
            idle = self.idle_connections(),
            max = self.config.max_connections,
            "connection pool initialized"
        );
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Check out a connection: a live idle one first, then a new one while
    /// under `max_connections`, otherwise wait up to the pool timeout.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, TransportError> {
        let wait = self.config.pool_timeout();
        let deadline = Instant::now() + wait;
        loop {
            // Register before looking so a release between the check and the
            // wait is not lost.
            let mut notified = pin!(self.available.notified());
            notified.as_mut().enable();

            match self.try_checkout()? {
                Checkout::Idle(conn) => {
                    debug!(peer = %conn.peer(), "reusing idle connection");
                    return Ok(PooledConnection::new(conn, Arc::clone(self)));
                }
                Checkout::Open => {
                    let slot = SlotGuard { pool: self };
                    let conn = Connection::open(&self.config).await?;
                    std::mem::forget(slot);
                    return Ok(PooledConnection::new(conn, Arc::clone(self)));
                }
                Checkout::Exhausted => {
                    if timeout_at(deadline, notified).await.is_err() {
                        warn!(max = self.config.max_connections, "connection pool exhausted");
                        return Err(TransportError::NoConnectionAvailable(wait));
                    }
                }
            }
        }
    }

    fn try_checkout(&self) -> Result<Checkout, TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::PoolClosed);
        }
        while let Some(conn) = state.idle.pop_front() {
            if conn.is_live() {
                return Ok(Checkout::Idle(conn));
            }
            state.total -= 1;
            debug!(peer = %conn.peer(), "dropped dead idle connection");
        }
        if state.total < self.config.max_connections {
            state.total += 1;
            return Ok(Checkout::Open);
        }
        Ok(Checkout::Exhausted)
    }

    fn checkin(&self, conn: Connection) {
        {
            let mut state = self.lock();
            if !state.closed && state.idle.len() < self.config.max_connections && conn.is_live() {
                state.idle.push_back(conn);
            } else {
                state.total -= 1;
                debug!(peer = %conn.peer(), "closed released connection");
            }
        }
        self.available.notify_one();
    }

    fn discard(&self, conn: Connection) {
        self.lock().total -= 1;
        debug!(peer = %conn.peer(), "invalidated connection");
        drop(conn);
        self.available.notify_one();
    }

    fn release_slot(&self) {
        self.lock().total -= 1;
        self.available.notify_one();
    }

    /// Connections currently open or being opened.
    pub fn total_connections(&self) -> usize {
        self.lock().total
    }

    pub fn idle_connections(&self) -> usize {
        self.lock().idle.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Flips to `true` once shutdown starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Refuse new checkouts, give checked-out connections the grace period to
    /// come back, then close everything left idle.
    pub async fn shutdown(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.shutdown.send_replace(true);
        self.available.notify_waiters();

        let deadline = Instant::now() + self.config.shutdown_grace();
        loop {
            let mut notified = pin!(self.available.notified());
            notified.as_mut().enable();
            let busy = self.lock().checked_out();
            if busy == 0 {
                break;
            }
            if timeout_at(deadline, notified).await.is_err() {
                warn!(busy, "shutdown grace elapsed with connections still checked out");
                break;
            }
        }

        let drained: Vec<Connection> = {
            let mut state = self.lock();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            drained
        };
        info!(closed = drained.len(), "connection pool shut down");
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Gives back a reserved slot if the connect fails or is cancelled.
struct SlotGuard<'a> {
    pool: &'a ConnectionPool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.pool.release_slot();
    }
}

/// A checked-out connection.
///
/// Dropping it without [`release`](Self::release) invalidates it, since an
/// interrupted exchange can leave the stream mid-frame.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
}

impl PooledConnection {
    fn new(conn: Connection, pool: Arc<ConnectionPool>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    pub async fn exchange(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        match self.conn.as_mut() {
            Some(conn) => conn.exchange(payload).await,
            None => Err(TransportError::PoolClosed),
        }
    }

    /// Return a healthy connection to the pool.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.checkin(conn);
        }
    }

    /// Close the connection and free its slot.
    pub fn invalidate(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Accepts and holds connections open, counting them.
    async fn silent_host() -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });
        (port, accepted)
    }

    fn config(port: u16, min: usize, max: usize) -> Arc<GatewayConfig> {
        Arc::new(GatewayConfig {
            host: "127.0.0.1".into(),
            port,
            min_connections: min,
            max_connections: max,
            pool_timeout_ms: 150,
            shutdown_grace_ms: 200,
            ..GatewayConfig::default()
        })
    }

    #[tokio::test]
    async fn warm_up_opens_min_connections() {
        let (port, _) = silent_host().await;
        let pool = ConnectionPool::connect(config(port, 2, 4)).await;
        assert_eq!(pool.total_connections(), 2);
        assert_eq!(pool.idle_connections(), 2);
    }

    #[tokio::test]
    async fn warm_up_failure_does_not_abort() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let pool = ConnectionPool::connect(config(port, 2, 4)).await;
        assert_eq!(pool.total_connections(), 0);
        assert!(!pool.is_closed());
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let (port, accepted) = silent_host().await;
        let pool = ConnectionPool::connect(config(port, 0, 2)).await;

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.total_connections(), 1);
        conn.release();
        assert_eq!(pool.idle_connections(), 1);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.total_connections(), 1);
        conn.release();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_frees_the_slot() {
        let (port, _) = silent_host().await;
        let pool = ConnectionPool::connect(config(port, 0, 1)).await;

        let conn = pool.acquire().await.unwrap();
        conn.invalidate();
        assert_eq!(pool.total_connections(), 0);
        assert_eq!(pool.idle_connections(), 0);

        let conn = pool.acquire().await.unwrap();
        drop(conn);
        assert_eq!(pool.total_connections(), 0);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let (port, _) = silent_host().await;
        let pool = ConnectionPool::connect(config(port, 0, 1)).await;

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, TransportError::NoConnectionAvailable(_)));
        assert_eq!(pool.total_connections(), 1);
    }

    #[tokio::test]
    async fn release_unblocks_waiter() {
        let (port, _) = silent_host().await;
        let pool = ConnectionPool::connect(config(port, 0, 1)).await;

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|c| c.release()) })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        held.release();

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(pool.total_connections(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_idle_and_rejects_acquire() {
        let (port, _) = silent_host().await;
        let pool = ConnectionPool::connect(config(port, 2, 2)).await;
        let signal = pool.shutdown_signal();

        pool.shutdown().await;
        assert!(*signal.borrow());
        assert_eq!(pool.total_connections(), 0);
        assert!(matches!(
            pool.acquire().await.unwrap_err(),
            TransportError::PoolClosed
        ));
    }

    #[tokio::test]
    async fn shutdown_waits_for_checked_out_connection() {
        let (port, _) = silent_host().await;
        let pool = ConnectionPool::connect(config(port, 0, 1)).await;
        let held = pool.acquire().await.unwrap();

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            held.release();
        });
        pool.shutdown().await;
        releaser.await.unwrap();
        assert_eq!(pool.total_connections(), 0);
    }
}
