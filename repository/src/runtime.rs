//! Repository runtime
//!
//! Builds the shared pieces once at startup (pool, template store, cache
//! backend) and hands out per-caller contexts and per-entity repositories.

use crate::config::redis_config::RedisConfig;
use crate::config::settings::Settings;
use crate::service::cache::{cache_for, CacheManager};
use crate::service::db::core::connection::ConnectionPool;
use crate::service::db::core::driver::Driver;
use crate::service::db::core::mysql::MySqlDriver;
use crate::service::db::core::session::SessionContext;
use crate::service::db::core::types::PoolStats;
use crate::service::db::entity::Entity;
use crate::service::db::repository::BaseRepository;
use crate::service::db::template::store::SqlTemplateStore;
use crate::tool::DbResult;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct RepositoryRuntime {
    settings: Settings,
    pool: Arc<ConnectionPool>,
    templates: Arc<SqlTemplateStore>,
    redis: Option<RedisConfig>,
    log_sql: bool,
    /// one `Arc<dyn CacheManager<T>>` per entity type
    caches: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl RepositoryRuntime {
    /// Starts from an already chosen driver and template store.
    ///
    /// Opens the pool's initial connections and connects Redis when the
    /// active environment enables it.
    pub async fn init(
        settings: Settings,
        driver: Arc<dyn Driver>,
        templates: SqlTemplateStore,
    ) -> DbResult<Self> {
        let env = settings.active()?.clone();
        let db_config = env.db_service_config();
        let pool_config = db_config.pool_config.clone();

        info!(
            "Starting repository runtime: env={}, datasource={}",
            settings.env,
            driver.describe()
        );

        let pool = Arc::new(ConnectionPool::new(driver, pool_config.clone()));
        pool.initialize(pool_config.initial_size).await?;

        let redis = if env.redis.enable {
            Some(RedisConfig::connect(&env.redis).await?)
        } else {
            None
        };

        info!(
            "Repository runtime ready: {} templates, {} idle connections, cache={}",
            templates.len(),
            pool.idle_count(),
            if redis.is_some() { "redis" } else { "in-process" }
        );

        Ok(Self {
            settings,
            pool,
            templates: Arc::new(templates),
            redis,
            log_sql: db_config.query_config.log_sql,
            caches: Mutex::new(HashMap::new()),
        })
    }

    /// Starts with the MySQL driver and the configured template directory.
    pub async fn from_settings(settings: Settings) -> DbResult<Self> {
        let driver = Arc::new(MySqlDriver::new(&settings.active()?.datasource)?);
        let templates = SqlTemplateStore::load(settings.template_dir())?;
        Self::init(settings, driver, templates).await
    }

    /// A fresh per-caller session handle.
    pub fn context(&self) -> SessionContext {
        SessionContext::new(self.pool.clone(), self.log_sql)
    }

    /// Repository for `T`. Every repository of the same type shares one
    /// cache.
    pub fn repository<T: Entity>(&self) -> BaseRepository<T> {
        let cached = self.settings.is_cached_table(&T::table_name());
        BaseRepository::new(self.templates.clone(), self.cache::<T>(), cached)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn templates(&self) -> &Arc<SqlTemplateStore> {
        &self.templates
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Closes every idle connection.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!("Repository runtime stopped");
    }

    fn cache<T: Entity>(&self) -> Arc<dyn CacheManager<T>> {
        let mut caches = self.caches.lock();
        if let Some(existing) = caches
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn CacheManager<T>>>())
        {
            return existing.clone();
        }

        let cache = cache_for::<T>(self.redis.as_ref());
        caches.insert(TypeId::of::<T>(), Box::new(cache.clone()));
        cache
    }
}
