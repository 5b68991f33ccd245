//! Core database modules
//!
//! Pool, sessions, the driver seam and the shared value types.

pub mod config;
pub mod connection;
pub mod driver;
pub mod mysql;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DbServiceConfig, PoolConfig, QueryConfig};
pub use connection::{ConnectionPool, PooledConnection};
pub use driver::{Driver, DriverConnection};
pub use mysql::MySqlDriver;
pub use session::{Session, SessionContext};
pub use types::*;
