//! routepool - route-aware pooled HTTP client with automatic retry

pub mod cli;
pub mod config;
pub mod core;
pub mod executor;
pub mod harness;
pub mod pool;
pub mod retry;
pub mod transport;

pub use crate::config::Config;
pub use crate::core::Core;
pub use executor::{ExecuteError, RequestConfig, RequestExecutor};
pub use harness::{ConcurrencyHarness, HarnessReport};
pub use pool::{ConnectionPool, IdleEvictor, PoolError, PoolLimits, PooledConnection, Route};
pub use retry::RetryPolicy;
pub use transport::{ErrorKind, HyperTransport, Request, Response, Transport, TransportError};
