//! Redis entity cache
//!
//! Entities are stored as JSON with a 24h expiry. The ids of cached
//! entities are tracked in a set per type so the whole type can be
//! invalidated without scanning the keyspace.

use crate::config::redis_config::RedisConfig;
use crate::service::cache::{CacheKey, CacheManager};
use crate::service::db::entity::Entity;
use crate::tool::DbResult;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::marker::PhantomData;
use tracing::debug;

/// Cache backed by a shared Redis connection manager.
pub struct RedisCacheManager<T> {
    conn: RedisConfig,
    key: CacheKey,
    ttl_secs: u64,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> RedisCacheManager<T> {
    pub const DEFAULT_EXPIRES_SECS: u64 = 24 * 60 * 60;

    pub fn new(conn: RedisConfig) -> Self {
        Self {
            conn,
            key: CacheKey::of::<T>(),
            ttl_secs: Self::DEFAULT_EXPIRES_SECS,
            _entity: PhantomData,
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    async fn try_save(&self, id: i64, entity: &T) -> DbResult<()> {
        let data_key = self.key.item_key(id);
        let index_key = self.key.index_key();
        let json = serde_json::to_string(entity)?;
        let mut conn = self.conn.get_connection();

        let mut p = redis::pipe();
        p.atomic()
            .cmd("SET").arg(&data_key).arg(&json).arg("EX").arg(self.ttl_secs)
            .cmd("SADD").arg(&index_key).arg(id)
            .cmd("EXPIRE").arg(&index_key).arg(self.ttl_secs);

        let _: () = p.query_async(&mut conn).await?;
        Ok(())
    }

    async fn try_get(&self, id: i64) -> DbResult<Option<T>> {
        let mut conn = self.conn.get_connection();
        let raw: Option<String> = conn.get(self.key.item_key(id)).await?;
        match raw {
            Some(json) if !json.is_empty() => Ok(Some(serde_json::from_str(&json)?)),
            _ => Ok(None),
        }
    }

    async fn try_remove(&self, id: i64) -> DbResult<()> {
        let mut conn = self.conn.get_connection();

        let mut p = redis::pipe();
        p.atomic()
            .cmd("DEL").arg(self.key.item_key(id))
            .cmd("SREM").arg(self.key.index_key()).arg(id);

        let _: () = p.query_async(&mut conn).await?;
        Ok(())
    }

    async fn try_remove_all(&self) -> DbResult<usize> {
        let index_key = self.key.index_key();
        let mut conn = self.conn.get_connection();

        let ids: Vec<String> = conn.smembers(&index_key).await?;

        let mut p = redis::pipe();
        p.atomic();
        for id in &ids {
            p.cmd("DEL").arg(format!("{}:{}", index_key, id));
        }
        p.cmd("DEL").arg(&index_key);

        let _: () = p.query_async(&mut conn).await?;
        Ok(ids.len())
    }
}

#[async_trait]
impl<T: Entity> CacheManager<T> for RedisCacheManager<T> {
    async fn save(&self, entity: &T) -> bool {
        let Some(id) = entity.id() else {
            return false;
        };
        match self.try_save(id, entity).await {
            Ok(()) => true,
            Err(e) => {
                e.log("RedisCacheManager::save");
                false
            }
        }
    }

    async fn get(&self, id: i64) -> Option<T> {
        match self.try_get(id).await {
            Ok(entity) => entity,
            Err(e) => {
                e.log("RedisCacheManager::get");
                None
            }
        }
    }

    async fn remove(&self, id: i64) {
        if let Err(e) = self.try_remove(id).await {
            e.log("RedisCacheManager::remove");
        }
    }

    async fn remove_all(&self) {
        match self.try_remove_all().await {
            Ok(count) => debug!("Evicted {} cached entries of {}", count, self.key.index_key()),
            Err(e) => e.log("RedisCacheManager::remove_all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::redis_config::RedisSettings;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CachedUser {
        id: Option<i64>,
        name: String,
    }

    impl Entity for CachedUser {
        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[tokio::test]
    #[ignore] // needs a running redis server on 127.0.0.1:6379
    async fn test_save_remove_and_remove_all() -> anyhow::Result<()> {
        let conn = RedisConfig::connect(&RedisSettings::default()).await?;
        let cache = RedisCacheManager::<CachedUser>::new(conn);

        for id in [5, 6] {
            let user = CachedUser {
                id: Some(id),
                name: format!("user{}", id),
            };
            assert!(cache.save(&user).await);
        }
        assert_eq!(cache.get(5).await.map(|u| u.name), Some("user5".to_string()));

        cache.remove(5).await;
        assert!(cache.get(5).await.is_none());

        cache.remove_all().await;
        assert!(cache.get(6).await.is_none());
        Ok(())
    }
}
