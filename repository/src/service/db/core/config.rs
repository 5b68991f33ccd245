//! Database core configuration
//!
//! Pool sizing/lifetime and statement logging, with builder helpers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings consumed by the database core.
#[derive(Debug, Clone, Default)]
pub struct DbServiceConfig {
    /// connection pool settings
    pub pool_config: PoolConfig,

    /// statement execution settings
    pub query_config: QueryConfig,
}

/// Connection pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// the pool is topped up whenever the free set drops below this
    pub min_size: usize,

    /// the free set never grows beyond this
    pub max_size: usize,

    /// connections created eagerly by `initialize`
    pub initial_size: usize,

    /// connections older than this are closed instead of reused
    pub max_lifetime: Duration,
}

/// Statement execution settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// log every executed statement (text only)
    pub log_sql: bool,
}

impl DbServiceConfig {
    /// Builder method for pool configuration
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Builder method for statement logging
    pub fn with_sql_logging(mut self, enabled: bool) -> Self {
        self.query_config.log_sql = enabled;
        self
    }
}

impl PoolConfig {
    pub const DEFAULT_MIN_SIZE: usize = 16;
    pub const DEFAULT_MAX_SIZE: usize = 2048;
    pub const DEFAULT_INITIAL_SIZE: usize = 128;
    pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    /// Clamps inconsistent sizes: `min_size <= max_size`, `initial_size <= max_size`.
    pub fn normalized(mut self) -> Self {
        self.max_size = self.max_size.max(1);
        self.min_size = self.min_size.min(self.max_size);
        self.initial_size = self.initial_size.min(self.max_size);
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: Self::DEFAULT_MIN_SIZE,
            max_size: Self::DEFAULT_MAX_SIZE,
            initial_size: Self::DEFAULT_INITIAL_SIZE,
            max_lifetime: Self::DEFAULT_MAX_LIFETIME,
        }
    }
}
