pub mod redis_config;
pub mod settings;

pub use redis_config::{RedisConfig, RedisSettings};
pub use settings::{env_from_args, DataSourceConfig, EnvironmentConfig, PoolSettings, Settings};
