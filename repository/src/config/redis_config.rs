//! Redis connection settings

use crate::tool::DbResult;
use redis::{aio::ConnectionManager, Client};
use serde::{Deserialize, Serialize};
use tracing::info;

pub type RedisConnection = ConnectionManager;

/// `redis` section of an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub enable: bool,
    pub database: i64,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            enable: false,
            database: 0,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
        }
    }
}

impl RedisSettings {
    /// `redis://[:password@]host:port/database`
    pub fn url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Shared, cloneable Redis connection.
#[derive(Clone)]
pub struct RedisConfig {
    pub conn: RedisConnection,
    pub host: String,
    pub port: u16,
}

impl RedisConfig {
    pub async fn connect(settings: &RedisSettings) -> DbResult<Self> {
        let client = Client::open(settings.url())?;
        let manager = ConnectionManager::new(client).await?;
        info!(
            "Redis connected: {}:{} (db {})",
            settings.host, settings.port, settings.database
        );
        Ok(Self {
            conn: manager,
            host: settings.host.clone(),
            port: settings.port,
        })
    }

    pub fn get_connection(&self) -> RedisConnection {
        self.conn.clone()
    }
}
