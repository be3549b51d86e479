//! Request execution with pooled connections and automatic retry
//!
//! One call to [`RequestExecutor::execute`] is one logical request. Each
//! attempt leases a connection, opens it if needed, sends the request, and
//! hands the connection back: released when it is still sound, invalidated
//! when the failure broke it. Failed attempts are classified and passed to
//! the retry table; callers only ever see the final response or one
//! terminal error.

use crate::pool::{ConnectionPool, PoolError, PooledConnection};
use crate::retry::{Backoff, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::transport::{ErrorKind, Request, RequestError, Response, Transport, TransportError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Maximum time to establish a connection
    pub connect_timeout: Duration,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Maximum time for sending the request and reading the response
    pub transfer_timeout: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout: Duration::from_millis(1000),
            acquire_timeout: Duration::from_millis(500),
            transfer_timeout: Duration::from_secs(10),
        }
    }
}

/// Terminal failure of a logical request
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("Could not lease a connection: {0}")]
    Pool(#[from] PoolError),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Request {request_id} failed after {attempts} attempt(s): {last_error}")]
    ExecutionFailed {
        request_id: u64,
        attempts: u32,
        #[source]
        last_error: TransportError,
    },
}

impl ExecuteError {
    /// Number of network attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            ExecuteError::Pool(_) | ExecuteError::InvalidRequest(_) => 0,
            ExecuteError::ExecutionFailed { attempts, .. } => *attempts,
        }
    }

    /// Classification of the last transport failure, if any
    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        match self {
            ExecuteError::Pool(_) | ExecuteError::InvalidRequest(_) => None,
            ExecuteError::ExecutionFailed { last_error, .. } => Some(last_error.kind),
        }
    }
}

/// Progress of one logical request
///
/// The error that ends a request travels in `ExecuteError::ExecutionFailed`.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub request_id: u64,
    pub execution_count: u32,
}

impl Attempt {
    fn new(request_id: u64) -> Self {
        Self {
            request_id,
            execution_count: 0,
        }
    }
}

/// Executes requests over a shared connection pool
pub struct RequestExecutor<T: Transport> {
    pool: Arc<ConnectionPool<T::Connection>>,
    transport: Arc<T>,
    defaults: RequestConfig,
    backoff: Option<Backoff>,
    next_request_id: AtomicU64,
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(pool: Arc<ConnectionPool<T::Connection>>, transport: Arc<T>) -> Self {
        Self {
            pool,
            transport,
            defaults: RequestConfig::default(),
            backoff: None,
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Set the limits used by [`execute`](Self::execute)
    pub fn with_defaults(mut self, defaults: RequestConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Pause between attempts
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<T::Connection>> {
        &self.pool
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn defaults(&self) -> &RequestConfig {
        &self.defaults
    }

    /// Execute `request` with the executor's default limits
    pub async fn execute(&self, request: &Request) -> Result<Response, ExecuteError> {
        self.execute_with(request, &self.defaults).await
    }

    /// Execute `request` with explicit limits
    pub async fn execute_with(
        &self,
        request: &Request,
        config: &RequestConfig,
    ) -> Result<Response, ExecuteError> {
        let policy = RetryPolicy {
            max_attempts: config.max_attempts,
            backoff: self.backoff,
        };
        let idempotent = request.is_idempotent();
        let route = request.route();
        let mut attempt = Attempt::new(self.next_request_id.fetch_add(1, Ordering::Relaxed));

        loop {
            let mut conn = self.pool.acquire(route, config.acquire_timeout).await?;
            let outcome = self.attempt_once(&mut conn, request, config).await;
            attempt.execution_count += 1;

            let err = match outcome {
                Ok(response) => {
                    self.pool.release(conn);
                    debug!(
                        request_id = attempt.request_id,
                        route = %route,
                        attempts = attempt.execution_count,
                        status = response.status.as_u16(),
                        "Request completed"
                    );
                    return Ok(response);
                }
                Err(err) => err,
            };

            if err.kind.breaks_connection() {
                self.pool.invalidate(conn);
            } else {
                self.pool.release(conn);
            }

            let retry = policy.should_retry(err.kind, attempt.execution_count, idempotent);
            if !retry {
                warn!(
                    request_id = attempt.request_id,
                    route = %route,
                    attempts = attempt.execution_count,
                    error = %err,
                    "Request failed"
                );
                return Err(ExecuteError::ExecutionFailed {
                    request_id: attempt.request_id,
                    attempts: attempt.execution_count,
                    last_error: err,
                });
            }

            debug!(
                request_id = attempt.request_id,
                route = %route,
                attempt = attempt.execution_count,
                error = %err,
                "Attempt failed, retrying"
            );

            let delay = policy.delay_for(attempt.execution_count);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// One network attempt on a leased connection
    async fn attempt_once(
        &self,
        conn: &mut PooledConnection<T::Connection>,
        request: &Request,
        config: &RequestConfig,
    ) -> Result<Response, TransportError> {
        let stale = conn
            .handle()
            .is_some_and(|handle| !self.transport.is_reusable(handle));
        if stale {
            debug!(
                route = %conn.route(),
                connection_id = conn.id(),
                "Pooled connection is stale, reopening"
            );
            drop(conn.take_handle());
        }

        if !conn.is_open() {
            let connect = self.transport.connect(conn.route());
            let handle = match tokio::time::timeout(config.connect_timeout, connect).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(TransportError::new(
                        ErrorKind::ConnectTimeout,
                        format!(
                            "connect to {} exceeded {:?}",
                            conn.route(),
                            config.connect_timeout
                        ),
                    ))
                }
            };
            conn.attach(handle);
        }

        let handle = conn
            .handle_mut()
            .ok_or_else(|| TransportError::new(ErrorKind::Io, "connection has no handle"))?;

        match tokio::time::timeout(config.transfer_timeout, self.transport.send(handle, request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::new(
                ErrorKind::IoTimeout,
                format!("transfer exceeded {:?}", config.transfer_timeout),
            )),
        }
    }
}
