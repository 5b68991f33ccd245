//! In-process entity cache

use crate::service::cache::CacheManager;
use crate::service::db::entity::Entity;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Bounded LRU map from id to entity.
pub struct InnerCacheManager<T> {
    entries: Mutex<LruCache<i64, T>>,
}

impl<T: Entity> InnerCacheManager<T> {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: Entity> Default for InnerCacheManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> CacheManager<T> for InnerCacheManager<T> {
    async fn save(&self, entity: &T) -> bool {
        match entity.id() {
            Some(id) => {
                self.entries.lock().put(id, entity.clone());
                true
            }
            None => false,
        }
    }

    async fn get(&self, id: i64) -> Option<T> {
        self.entries.lock().get(&id).cloned()
    }

    async fn remove(&self, id: i64) {
        self.entries.lock().pop(&id);
    }

    async fn remove_all(&self) {
        self.entries.lock().clear();
    }
}
