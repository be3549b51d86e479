use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::executor::{ExecuteError, RequestExecutor};
use crate::pool::{ConnectionPool, IdleEvictor};
use crate::transport::{HttpConnection, HyperTransport, Request, Response};

/// Runtime shared by every CLI command
///
/// Owns the pool, the executor built on top of it and the idle evictor.
/// Clones share all three.
#[derive(Clone)]
pub struct Core {
    pub config: Arc<Config>,
    pool: Arc<ConnectionPool<HttpConnection>>,
    executor: Arc<RequestExecutor<HyperTransport>>,
    evictor: Arc<IdleEvictor<HttpConnection>>,
}

impl Core {
    /// Build the runtime and start the evictor when enabled
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let pool = Arc::new(ConnectionPool::new(config.pool_limits()?));
        let transport =
            Arc::new(HyperTransport::new().context("Failed to initialise TLS connector")?);

        let mut executor = RequestExecutor::new(pool.clone(), transport)
            .with_defaults(config.request_config());
        if let Some(backoff) = config.retry_policy().backoff {
            executor = executor.with_backoff(backoff);
        }

        let evictor = Arc::new(IdleEvictor::new(pool.clone(), config.evictor_config()));
        if config.evictor.enabled {
            evictor.start();
        }

        Ok(Self {
            config,
            pool,
            executor: Arc::new(executor),
            evictor,
        })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<HttpConnection>> {
        &self.pool
    }

    pub fn executor(&self) -> &Arc<RequestExecutor<HyperTransport>> {
        &self.executor
    }

    pub fn evictor(&self) -> &Arc<IdleEvictor<HttpConnection>> {
        &self.evictor
    }

    /// Fetch `url` with a GET request
    pub async fn get(&self, url: &str) -> Result<Response, ExecuteError> {
        let request = Request::get(url)?;
        self.executor.execute(&request).await
    }

    /// Stop the evictor, then close every pooled connection
    ///
    /// Waiters still blocked in `acquire` fail with `PoolError::Shutdown`.
    pub async fn shutdown(&self) {
        self.evictor.stop().await;
        self.pool.shutdown();
        info!("Core shut down");
    }
}
