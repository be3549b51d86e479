//! Connection pooling and idle eviction module
//!
//! This module provides:
//! - Route keys that partition pooled connections by destination
//! - A bounded, route-aware connection pool with async acquire
//! - A background evictor for connections left idle too long

pub mod connection;
pub mod evictor;
pub mod route;

pub use connection::{
    ConnectionPool, ConnectionState, PoolError, PoolLimits, PoolStats, PooledConnection,
    RouteStats,
};
pub use evictor::{EvictorConfig, IdleEvictor};
pub use route::{Route, RouteError};
