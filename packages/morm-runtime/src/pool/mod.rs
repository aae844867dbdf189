//! Connection pool: bounded concurrency via a semaphore, idle-connection
//! reuse, a circuit breaker guarding new connection attempts, and
//! retry-with-backoff around the connector itself.
//!
//! Grounded on the teacher's `network::connection` (a tracked-connection
//! registry) and `network::shutdown` (atomic in-flight counter + `watch`
//! channel draining), generalized from a server's inbound-connection
//! registry to an outbound pool of store connections.

pub mod circuit_breaker;
pub mod retry;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

pub use circuit_breaker::{CircuitBreaker, State as CircuitState};
pub use retry::{backoff_delay, retry_with_backoff, Retryable};

use crate::clock::Clock;
use crate::config::{CircuitBreakerConfig, PoolConfig, RetryConfig};
use crate::error::PoolError;

impl Retryable for PoolError {
    fn is_transient(&self) -> bool {
        matches!(self, PoolError::ConnectFailed(_) | PoolError::AcquireTimeout(_))
    }
}

/// Produces raw store connections. Implemented by the Mongo driver wrapper
/// in `adapter::mongo` and by an in-memory stub for tests.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Send;

    async fn connect(&self) -> Result<Self::Connection, PoolError>;

    /// Health-checks an idle connection before it's handed back out, or
    /// periodically from `Pool::spawn_validator`'s background task.
    /// Connectors with no cheap liveness check can leave this at the
    /// default, which always reports healthy.
    async fn check(&self, _conn: &Self::Connection) -> bool {
        true
    }
}

struct PoolInner<C: Connector> {
    connector: C,
    config: PoolConfig,
    retry: RetryConfig,
    breaker: CircuitBreaker,
    idle: Mutex<VecDeque<C::Connection>>,
    semaphore: Arc<Semaphore>,
    in_flight: AtomicU64,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    cancel: CancellationToken,
}

/// A bounded pool of `C::Connection`s.
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector + 'static> Pool<C> {
    #[must_use]
    pub fn new(
        connector: C,
        config: PoolConfig,
        retry: RetryConfig,
        breaker_config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(PoolInner {
                connector,
                breaker: CircuitBreaker::new(breaker_config, clock),
                semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
                idle: Mutex::new(VecDeque::new()),
                in_flight: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                shutdown,
                cancel: CancellationToken::new(),
                retry,
                config,
            }),
        }
    }

    /// Spawns a background task that periodically validates idle
    /// connections via `Connector::check`, evicting any that fail,
    /// mirroring the teacher's `BackgroundWorker`/`BackgroundRunnable`
    /// pattern. The task exits once `close` is called. A
    /// `validation_interval_ms` of `0` disables validation and returns
    /// `None`.
    pub fn spawn_validator(&self) -> Option<JoinHandle<()>> {
        if self.inner.config.validation_interval_ms == 0 {
            return None;
        }
        let interval = Duration::from_millis(self.inner.config.validation_interval_ms);
        let inner = Arc::clone(&self.inner);
        let cancel = self.inner.cancel.clone();
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                let mut survivors = VecDeque::new();
                while let Some(conn) = inner.idle.lock().pop_front() {
                    if inner.connector.check(&conn).await {
                        survivors.push_back(conn);
                    } else {
                        warn!("evicting idle connection that failed validation");
                    }
                }
                inner.idle.lock().extend(survivors);
            }
            info!("pool validator task stopped");
        }))
    }

    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.inner.breaker.state()
    }

    /// Acquires a session, reusing an idle connection when one is
    /// available. Otherwise opens a new connection, subject to the
    /// circuit breaker and the retry policy.
    ///
    /// # Errors
    /// - [`PoolError::Closed`] if [`Pool::close`] has already run.
    /// - [`PoolError::AcquireTimeout`] if no permit/connection becomes
    ///   available within `acquire_timeout_ms`.
    /// - [`PoolError::CircuitOpen`] if the breaker is open and not yet
    ///   eligible for a half-open probe.
    /// - [`PoolError::RetriesExhausted`] if every connect attempt failed.
    #[instrument(name = "pool.acquire", skip(self))]
    pub async fn acquire(&self) -> Result<Session<C>, PoolError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let acquire_timeout = Duration::from_millis(self.inner.config.acquire_timeout_ms);
        let permit = tokio::time::timeout(acquire_timeout, Arc::clone(&self.inner.semaphore).acquire_owned())
            .await
            .map_err(|_| PoolError::AcquireTimeout(acquire_timeout))?
            .expect("pool semaphore is never closed while the pool itself is alive");

        if let Some(conn) = self.inner.idle.lock().pop_front() {
            self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
            return Ok(Session {
                pool: Arc::clone(&self.inner),
                conn: Some(conn),
                _permit: permit,
            });
        }

        if !self.inner.breaker.allow() {
            return Err(PoolError::CircuitOpen);
        }

        let retry = self.inner.retry.clone();
        let inner = Arc::clone(&self.inner);
        let conn = retry_with_backoff(&retry, |_attempt| {
            let inner = Arc::clone(&inner);
            async move {
                match inner.connector.connect().await {
                    Ok(conn) => {
                        inner.breaker.record_success();
                        Ok(conn)
                    }
                    Err(err) => {
                        inner.breaker.record_failure();
                        Err(err)
                    }
                }
            }
        })
        .await?;

        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        Ok(Session {
            pool: Arc::clone(&self.inner),
            conn: Some(conn),
            _permit: permit,
        })
    }

    /// Stops accepting new idle-connection returns and waits (up to
    /// `timeout`) for in-flight sessions to finish, mirroring the
    /// teacher's `ShutdownController::wait_for_drain`.
    #[instrument(name = "pool.close", skip(self))]
    pub async fn close(&self, timeout: Duration) -> bool {
        self.inner.closed.store(true, Ordering::Release);
        let _ = self.inner.shutdown.send(true);
        self.inner.cancel.cancel();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.inner.in_flight.load(Ordering::Relaxed) == 0 {
                self.inner.idle.lock().clear();
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("pool close timed out with sessions still in flight");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.inner.in_flight.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }
}

/// An RAII-held connection. Returned to the pool's idle queue on drop
/// unless the pool has since been closed.
pub struct Session<C: Connector> {
    pool: Arc<PoolInner<C>>,
    conn: Option<C::Connection>,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> Session<C> {
    pub fn connection(&mut self) -> &mut C::Connection {
        self.conn
            .as_mut()
            .expect("connection is present for the lifetime of the session")
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        self.pool.in_flight.fetch_sub(1, Ordering::Relaxed);
        if let Some(conn) = self.conn.take() {
            if !self.pool.closed.load(Ordering::Acquire) {
                self.pool.idle.lock().push_back(conn);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::sync::atomic::AtomicU32;

    struct CountingConnector {
        attempts: AtomicU32,
        fail_first_n: u32,
        reject_all_on_check: AtomicBool,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        type Connection = u32;

        async fn connect(&self) -> Result<Self::Connection, PoolError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(PoolError::ConnectFailed("simulated".to_string()))
            } else {
                Ok(n)
            }
        }

        async fn check(&self, _conn: &Self::Connection) -> bool {
            !self.reject_all_on_check.load(Ordering::SeqCst)
        }
    }

    fn test_pool_with_validation(
        connector: CountingConnector,
        max_connections: u32,
        validation_interval_ms: u64,
    ) -> Pool<CountingConnector> {
        Pool::new(
            connector,
            PoolConfig {
                min_connections: 0,
                max_connections,
                acquire_timeout_ms: 1_000,
                idle_timeout_ms: 60_000,
                validation_interval_ms,
            },
            RetryConfig {
                max_attempts: 5,
                base_delay_ms: 1,
                max_delay_ms: 10,
            },
            CircuitBreakerConfig {
                failure_threshold: 100,
                open_cooldown_ms: 1_000,
                half_open_success_threshold: 1,
            },
            Arc::new(SystemClock),
        )
    }

    fn test_pool(connector: CountingConnector, max_connections: u32) -> Pool<CountingConnector> {
        test_pool_with_validation(connector, max_connections, 0)
    }

    #[tokio::test]
    async fn acquire_reuses_released_connections() {
        let pool = test_pool(
            CountingConnector {
                attempts: AtomicU32::new(0),
                fail_first_n: 0,
                reject_all_on_check: AtomicBool::new(false),
            },
            1,
        );
        let session = pool.acquire().await.unwrap();
        drop(session);
        let session2 = pool.acquire().await.unwrap();
        // Only one physical connect() call should have happened; the
        // second acquire reused the idle connection.
        drop(session2);
        assert_eq!(pool.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn acquire_retries_transient_connect_failures() {
        let pool = test_pool(
            CountingConnector {
                attempts: AtomicU32::new(0),
                fail_first_n: 2,
                reject_all_on_check: AtomicBool::new(false),
            },
            1,
        );
        let session = pool.acquire().await.unwrap();
        assert_eq!(session.pool.connector.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn close_drains_in_flight_sessions() {
        let pool = test_pool(
            CountingConnector {
                attempts: AtomicU32::new(0),
                fail_first_n: 0,
                reject_all_on_check: AtomicBool::new(false),
            },
            1,
        );
        let session = pool.acquire().await.unwrap();
        let pool_clone = pool.clone();
        let closer = tokio::spawn(async move { pool_clone.close(Duration::from_millis(500)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(session);
        assert!(closer.await.unwrap());
    }

    #[tokio::test]
    async fn validator_evicts_idle_connections_that_fail_check() {
        let pool = test_pool_with_validation(
            CountingConnector {
                attempts: AtomicU32::new(0),
                fail_first_n: 0,
                reject_all_on_check: AtomicBool::new(false),
            },
            1,
            15,
        );
        let handle = pool.spawn_validator().expect("validation interval is non-zero");

        let session = pool.acquire().await.unwrap();
        assert_eq!(pool.inner.connector.attempts.load(Ordering::SeqCst), 1);
        drop(session);

        pool.inner.connector.reject_all_on_check.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;

        // The idle connection should have been evicted by the validator, so
        // this acquire must dial a fresh one rather than reuse the idle one.
        let session2 = pool.acquire().await.unwrap();
        assert_eq!(pool.inner.connector.attempts.load(Ordering::SeqCst), 2);
        drop(session2);

        pool.close(Duration::from_millis(100)).await;
        handle.abort();
    }
}
