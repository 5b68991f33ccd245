//! Entity caches
//!
//! Repositories consult a [`CacheManager`] around reads and invalidate it
//! around writes. Two backends exist: an in-process LRU map and Redis.

pub mod inner_cache;
pub mod redis_cache;

use crate::config::redis_config::RedisConfig;
use crate::service::db::entity::Entity;
use async_trait::async_trait;
use std::sync::Arc;

pub use inner_cache::InnerCacheManager;
pub use redis_cache::RedisCacheManager;

/// Per-entity-type cache keyed by primary key.
///
/// Backend failures are logged and reported as a miss; they never fail the
/// surrounding database operation.
#[async_trait]
pub trait CacheManager<T: Entity>: Send + Sync {
    /// Stores the entity under its id. Returns false when it has no id or
    /// the backend rejected it.
    async fn save(&self, entity: &T) -> bool;

    async fn get(&self, id: i64) -> Option<T>;

    async fn remove(&self, id: i64);

    /// Drops every cached entity of this type.
    async fn remove_all(&self);
}

/// Key layout: `simple:repository:{type}:{id}` for entries and
/// `simple:repository:{type}` for the set of cached ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    type_key: String,
}

impl CacheKey {
    pub const PREFIX: &'static str = "simple:repository:";

    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
        }
    }

    pub fn of<T: Entity>() -> Self {
        Self::new(T::type_key())
    }

    pub fn item_key(&self, id: i64) -> String {
        format!("{}{}:{}", Self::PREFIX, self.type_key, id)
    }

    pub fn index_key(&self) -> String {
        format!("{}{}", Self::PREFIX, self.type_key)
    }
}

/// Redis-backed cache when a connection is configured, in-process otherwise.
pub fn cache_for<T: Entity>(redis: Option<&RedisConfig>) -> Arc<dyn CacheManager<T>> {
    match redis {
        Some(config) => Arc::new(RedisCacheManager::<T>::new(config.clone())),
        None => Arc::new(InnerCacheManager::<T>::new()),
    }
}
