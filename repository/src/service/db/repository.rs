//! Entity repository
//!
//! [`BaseRepository`] turns entities and conditions into SQL text, runs it
//! through the caller's [`SessionContext`] and keeps the entity cache
//! consistent with every write.

use crate::service::cache::CacheManager;
use crate::service::db::condition::Condition;
use crate::service::db::core::session::SessionContext;
use crate::service::db::core::types::{Params, Record};
use crate::service::db::entity::{from_record, Entity, ID_COLUMN};
use crate::service::db::search::Search;
use crate::service::db::template::literal::format_value;
use crate::service::db::template::rewriter;
use crate::service::db::template::store::SqlTemplateStore;
use crate::tool::error::helpers;
use crate::tool::{DbResult, RepositoryError};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Rows per multi-row insert statement.
pub const MAX_BATCH_NUMBER: usize = 10_000;

/// CRUD, template and cache operations for one entity type.
pub struct BaseRepository<T: Entity> {
    table: String,
    templates: Arc<SqlTemplateStore>,
    cache: Arc<dyn CacheManager<T>>,
    cached: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for BaseRepository<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            templates: self.templates.clone(),
            cache: self.cache.clone(),
            cached: self.cached,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> BaseRepository<T> {
    /// `cached` enables the cache for this entity's table.
    pub fn new(
        templates: Arc<SqlTemplateStore>,
        cache: Arc<dyn CacheManager<T>>,
        cached: bool,
    ) -> Self {
        Self {
            table: T::table_name(),
            templates,
            cache,
            cached,
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    // ---- writes -------------------------------------------------------

    /// Inserts the non-null fields of `entity` and stores the generated id
    /// back into it.
    pub async fn add(&self, ctx: &mut SessionContext, entity: &mut T) -> DbResult<()> {
        let record = present_fields(entity.encode()?);
        if record.is_empty() {
            return Err(RepositoryError::EntityRequired(format!(
                "nothing to insert into {}",
                self.table
            )));
        }

        let fields: Vec<&str> = record.keys().map(String::as_str).collect();
        let values: Vec<String> = record.values().map(format_value).collect();
        let sql = format!(
            "insert into {} ({}) values ({})",
            self.table,
            fields.join(","),
            values.join(",")
        );

        let ids = ctx.session().await?.insert(&sql, T::id_type()).await?;
        if let Some(id) = ids.first() {
            entity.set_id(id.as_i64());
        }
        Ok(())
    }

    /// Inserts many entities with multi-row statements of at most
    /// [`MAX_BATCH_NUMBER`] rows. Ids are excluded from the column list and
    /// the generated ids are stored back in order.
    pub async fn add_batch(&self, ctx: &mut SessionContext, entities: &mut [T]) -> DbResult<()> {
        if entities.is_empty() {
            return Err(RepositoryError::EntityRequired(format!(
                "empty batch for {}",
                self.table
            )));
        }

        for chunk in entities.chunks_mut(MAX_BATCH_NUMBER) {
            let records = chunk
                .iter()
                .map(|entity| entity.encode())
                .collect::<DbResult<Vec<Record>>>()?;

            let fields: Vec<String> = records[0]
                .keys()
                .filter(|name| name.as_str() != ID_COLUMN)
                .cloned()
                .collect();
            if fields.is_empty() {
                return Err(RepositoryError::EntityRequired(format!(
                    "nothing to insert into {}",
                    self.table
                )));
            }

            let rows: Vec<String> = records
                .iter()
                .map(|record| {
                    let values: Vec<String> = fields
                        .iter()
                        .map(|field| {
                            record
                                .get(field)
                                .map(format_value)
                                .unwrap_or_else(|| "null".to_string())
                        })
                        .collect();
                    format!("({})", values.join(","))
                })
                .collect();

            let sql = format!(
                "insert into {} ({}) values {}",
                self.table,
                fields.join(","),
                rows.join(",")
            );

            let ids = ctx.session().await?.insert(&sql, T::id_type()).await?;
            for (entity, id) in chunk.iter_mut().zip(ids) {
                entity.set_id(id.as_i64());
            }
        }
        Ok(())
    }

    /// Updates the non-null fields of `entity` by id.
    pub async fn update(&self, ctx: &mut SessionContext, entity: &T) -> DbResult<u64> {
        self.update_one(ctx, entity, false).await
    }

    /// Updates every field of `entity`, nulls included, by id.
    pub async fn update_all(&self, ctx: &mut SessionContext, entity: &T) -> DbResult<u64> {
        self.update_one(ctx, entity, true).await
    }

    /// Updates many entities by id in one batch. Duplicate ids are
    /// updated once (first occurrence wins).
    pub async fn update_batch(
        &self,
        ctx: &mut SessionContext,
        entities: &[T],
        update_null: bool,
    ) -> DbResult<u64> {
        if entities.is_empty() {
            return Err(RepositoryError::EntityRequired(format!(
                "empty batch for {}",
                self.table
            )));
        }

        let mut seen = HashSet::new();
        let mut statements = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = require_id(entity)?;
            if seen.insert(id) {
                statements.push(self.update_sql(entity, id, update_null)?);
            }
        }

        let rows = ctx.session().await?.update_batch(&statements).await?;
        self.del_all_cache().await;
        Ok(rows)
    }

    /// Updates every row matching `condition` with the fields of `entity`
    /// (its id excluded).
    pub async fn update_by_condition(
        &self,
        ctx: &mut SessionContext,
        entity: &T,
        condition: &Condition,
        update_null: bool,
    ) -> DbResult<u64> {
        if condition.is_empty() {
            return Err(RepositoryError::ConditionRequired(format!(
                "update of {}",
                self.table
            )));
        }

        let assignments = self.assignments(entity, update_null)?;
        let sql = format!(
            "update {} set {} where {}",
            self.table,
            assignments,
            condition.where_clause()
        );

        let rows = ctx.session().await?.update(&sql).await?;
        self.del_all_cache().await;
        Ok(rows)
    }

    /// Deletes one row by id.
    pub async fn delete(&self, ctx: &mut SessionContext, id: i64) -> DbResult<u64> {
        let sql = format!("delete from {} where {} = {}", self.table, ID_COLUMN, id);
        let rows = ctx.session().await?.update(&sql).await?;
        if rows > 0 {
            self.del_cache(id).await;
        }
        Ok(rows)
    }

    /// Deletes rows by id; an empty list deletes nothing.
    pub async fn delete_ids(&self, ctx: &mut SessionContext, ids: &[i64]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let condition = Condition::new().in_(ID_COLUMN, ids.to_vec());
        self.delete_by_condition(ctx, &condition).await
    }

    /// Deletes every row matching a non-empty condition.
    pub async fn delete_by_condition(
        &self,
        ctx: &mut SessionContext,
        condition: &Condition,
    ) -> DbResult<u64> {
        if condition.is_empty() {
            return Err(RepositoryError::ConditionRequired(format!(
                "delete from {}",
                self.table
            )));
        }

        let sql = format!("delete from {} where {}", self.table, condition.where_clause());
        let rows = ctx.session().await?.update(&sql).await?;
        self.del_all_cache().await;
        Ok(rows)
    }

    // ---- reads --------------------------------------------------------

    pub async fn get(&self, ctx: &mut SessionContext, id: i64) -> DbResult<Option<T>> {
        let sql = format!("select * from {} where {} = {}", self.table, ID_COLUMN, id);
        Ok(self.query_entities(ctx, &sql).await?.into_iter().next())
    }

    /// First row matching `condition`.
    pub async fn get_by_condition(
        &self,
        ctx: &mut SessionContext,
        condition: &Condition,
    ) -> DbResult<Option<T>> {
        Ok(self.list(ctx, condition).await?.into_iter().next())
    }

    /// Rows matching `condition`, ordered and limited as it specifies.
    pub async fn list(&self, ctx: &mut SessionContext, condition: &Condition) -> DbResult<Vec<T>> {
        let sql = format!("select * from {} where {}", self.table, condition.tail());
        self.query_entities(ctx, &sql).await
    }

    pub async fn list_ids(&self, ctx: &mut SessionContext, ids: &[i64]) -> DbResult<Vec<T>> {
        if ids.is_empty() {
            return Err(RepositoryError::ConditionRequired(format!(
                "id list for {}",
                self.table
            )));
        }
        let condition = Condition::new().in_(ID_COLUMN, ids.to_vec());
        self.list(ctx, &condition).await
    }

    /// One page of rows, or all rows when paging is off.
    pub async fn list_page(&self, ctx: &mut SessionContext, search: &Search) -> DbResult<Vec<T>> {
        self.list(ctx, &search.paged_condition()).await
    }

    pub async fn count(&self, ctx: &mut SessionContext, condition: &Condition) -> DbResult<i64> {
        let sql = format!(
            "select count(1) from {} where {}",
            self.table,
            condition.where_clause()
        );
        ctx.session().await?.count(&sql).await
    }

    // ---- templates ----------------------------------------------------

    /// Runs a named query template and decodes each row into `E`.
    pub async fn select<E: DeserializeOwned>(
        &self,
        ctx: &mut SessionContext,
        index_name: &str,
        params: &Params,
    ) -> DbResult<Vec<E>> {
        let sql = self.render_template(index_name, params)?;
        let rows = ctx.session().await?.query(&sql).await?;
        rows.into_iter().map(from_record).collect()
    }

    /// Runs a named mutating template. Any change invalidates the whole
    /// entity cache.
    pub async fn execute(
        &self,
        ctx: &mut SessionContext,
        index_name: &str,
        params: &Params,
    ) -> DbResult<u64> {
        let sql = self.render_template(index_name, params)?;
        let rows = ctx.session().await?.update(&sql).await?;
        if rows > 0 {
            self.del_all_cache().await;
        }
        Ok(rows)
    }

    // ---- cache --------------------------------------------------------

    /// Cache-first lookup; misses are loaded and cached.
    pub async fn get_cached(&self, ctx: &mut SessionContext, id: i64) -> DbResult<Option<T>> {
        if !self.cached {
            return self.get(ctx, id).await;
        }
        if let Some(entity) = self.cache.get(id).await {
            return Ok(Some(entity));
        }

        let loaded = self.get(ctx, id).await?;
        if let Some(entity) = &loaded {
            self.cache.save(entity).await;
        }
        Ok(loaded)
    }

    /// Cache-first lookup of many ids; misses are loaded in one query.
    pub async fn get_cached_many(
        &self,
        ctx: &mut SessionContext,
        ids: &[i64],
    ) -> DbResult<HashMap<i64, T>> {
        let mut found = HashMap::new();
        if ids.is_empty() {
            return Ok(found);
        }

        let mut missing = Vec::new();
        if self.cached {
            for &id in ids {
                match self.cache.get(id).await {
                    Some(entity) => {
                        found.insert(id, entity);
                    }
                    None => missing.push(id),
                }
            }
        } else {
            missing.extend_from_slice(ids);
        }

        if missing.is_empty() {
            return Ok(found);
        }

        for entity in self.list_ids(ctx, &missing).await? {
            if let Some(id) = entity.id() {
                if self.cached {
                    self.cache.save(&entity).await;
                }
                found.insert(id, entity);
            }
        }
        Ok(found)
    }

    pub async fn del_cache(&self, id: i64) {
        if self.cached {
            self.cache.remove(id).await;
        }
    }

    pub async fn del_all_cache(&self) {
        if self.cached {
            debug!("Invalidating every cached {}", self.table);
            self.cache.remove_all().await;
        }
    }

    // ---- helpers ------------------------------------------------------

    async fn update_one(
        &self,
        ctx: &mut SessionContext,
        entity: &T,
        update_null: bool,
    ) -> DbResult<u64> {
        let id = require_id(entity)?;
        let sql = self.update_sql(entity, id, update_null)?;
        let rows = ctx.session().await?.update(&sql).await?;
        self.del_cache(id).await;
        Ok(rows)
    }

    fn update_sql(&self, entity: &T, id: i64, update_null: bool) -> DbResult<String> {
        Ok(format!(
            "update {} set {} where {} = {}",
            self.table,
            self.assignments(entity, update_null)?,
            ID_COLUMN,
            id
        ))
    }

    /// `a = 1, b = 'x'` for every field but the id.
    fn assignments(&self, entity: &T, update_null: bool) -> DbResult<String> {
        let mut record = entity.encode()?;
        record.remove(ID_COLUMN);
        if !update_null {
            record = present_fields(record);
        }
        if record.is_empty() {
            return Err(RepositoryError::EntityRequired(format!(
                "nothing to update in {}",
                self.table
            )));
        }

        let assignments: Vec<String> = record
            .iter()
            .map(|(field, value)| format!("{} = {}", field, format_value(value)))
            .collect();
        Ok(assignments.join(", "))
    }

    fn render_template(&self, index_name: &str, params: &Params) -> DbResult<String> {
        let template = self.templates.get(index_name)?;
        rewriter::rewrite(template, params)
    }

    async fn query_entities(&self, ctx: &mut SessionContext, sql: &str) -> DbResult<Vec<T>> {
        let rows = ctx.session().await?.query(sql).await?;
        rows.into_iter().map(T::decode).collect()
    }
}

fn require_id<T: Entity>(entity: &T) -> DbResult<i64> {
    helpers::map_option_error(
        entity.id(),
        RepositoryError::EntityRequired(format!("{} without id", T::table_name())),
    )
}

fn present_fields(record: Record) -> Record {
    record
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::cache::InnerCacheManager;
    use crate::service::db::core::config::PoolConfig;
    use crate::service::db::core::connection::ConnectionPool;
    use crate::service::db::core::testing::MockDriver;
    use crate::service::db::core::types::SqlValue;
    use crate::service::db::condition::SortType;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct UserEntity {
        id: Option<i64>,
        user_name: Option<String>,
        age: Option<i64>,
    }

    impl Entity for UserEntity {
        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    fn user(id: Option<i64>, name: &str, age: Option<i64>) -> UserEntity {
        UserEntity {
            id,
            user_name: Some(name.to_string()),
            age,
        }
    }

    fn row(id: i64, name: &str) -> Record {
        let mut row = Record::new();
        row.insert("id".into(), SqlValue::Int(id));
        row.insert("user_name".into(), SqlValue::Text(name.into()));
        row.insert("age".into(), SqlValue::Null);
        row
    }

    struct Fixture {
        driver: Arc<MockDriver>,
        cache: Arc<InnerCacheManager<UserEntity>>,
        repository: BaseRepository<UserEntity>,
        ctx: SessionContext,
    }

    fn setup(cached: bool) -> Fixture {
        let driver = Arc::new(MockDriver::new());
        let pool = Arc::new(ConnectionPool::new(
            driver.clone(),
            PoolConfig::default().with_min_size(0).with_max_size(2),
        ));
        let templates = Arc::new(SqlTemplateStore::from_sources([(
            "user",
            "/* @name find_by_name */ select * from user where 1 = 1 and user_name = &{user_name};
             /* @name rename_all */ update user set user_name = &{name} where age > ${age};",
        )]));
        let cache = Arc::new(InnerCacheManager::<UserEntity>::new());
        let repository = BaseRepository::new(templates, cache.clone(), cached);
        Fixture {
            driver,
            cache,
            repository,
            ctx: SessionContext::new(pool, false),
        }
    }

    fn last_statement(driver: &MockDriver) -> String {
        driver.statements().last().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_add_assigns_generated_id() {
        let mut f = setup(false);
        f.driver.set_outcome(1, 41);

        let mut entity = user(None, "kim", None);
        f.repository.add(&mut f.ctx, &mut entity).await.unwrap();

        assert_eq!(entity.id, Some(41));
        assert_eq!(
            last_statement(&f.driver),
            "insert into user (user_name) values ('kim')"
        );
    }

    #[tokio::test]
    async fn test_add_batch_excludes_id_and_assigns_range() {
        let mut f = setup(false);
        f.driver.set_outcome(2, 10);

        let mut entities = vec![user(Some(99), "a", Some(1)), user(None, "b", None)];
        f.repository.add_batch(&mut f.ctx, &mut entities).await.unwrap();

        assert_eq!(
            last_statement(&f.driver),
            "insert into user (age,user_name) values (1,'a'),(null,'b')"
        );
        assert_eq!(entities[0].id, Some(10));
        assert_eq!(entities[1].id, Some(11));

        let err = f.repository.add_batch(&mut f.ctx, &mut []).await.unwrap_err();
        assert!(matches!(err, RepositoryError::EntityRequired(_)));
    }

    #[tokio::test]
    async fn test_update_variants() {
        let mut f = setup(false);
        let entity = user(Some(5), "lee", None);

        f.repository.update(&mut f.ctx, &entity).await.unwrap();
        assert_eq!(
            last_statement(&f.driver),
            "update user set user_name = 'lee' where id = 5"
        );

        f.repository.update_all(&mut f.ctx, &entity).await.unwrap();
        assert_eq!(
            last_statement(&f.driver),
            "update user set age = null, user_name = 'lee' where id = 5"
        );

        let err = f
            .repository
            .update(&mut f.ctx, &user(None, "x", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::EntityRequired(_)));
    }

    #[tokio::test]
    async fn test_update_batch_skips_duplicate_ids() {
        let mut f = setup(false);
        let entities = vec![
            user(Some(1), "a", None),
            user(Some(1), "b", None),
            user(Some(2), "c", None),
        ];

        let rows = f
            .repository
            .update_batch(&mut f.ctx, &entities, false)
            .await
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(
            f.driver.statements(),
            vec![
                "update user set user_name = 'a' where id = 1".to_string(),
                "update user set user_name = 'c' where id = 2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_condition_writes_require_condition() {
        let mut f = setup(false);
        let entity = user(None, "z", None);

        let err = f
            .repository
            .update_by_condition(&mut f.ctx, &entity, &Condition::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConditionRequired(_)));

        let err = f
            .repository
            .delete_by_condition(&mut f.ctx, &Condition::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConditionRequired(_)));
        assert!(f.driver.statements().is_empty());

        f.repository
            .update_by_condition(&mut f.ctx, &entity, &Condition::new().gt("age", 3), false)
            .await
            .unwrap();
        assert_eq!(
            last_statement(&f.driver),
            "update user set user_name = 'z' where age > 3"
        );
    }

    #[tokio::test]
    async fn test_delete_shapes() {
        let mut f = setup(false);

        f.repository.delete(&mut f.ctx, 7).await.unwrap();
        assert_eq!(last_statement(&f.driver), "delete from user where id = 7");

        f.repository.delete_ids(&mut f.ctx, &[1, 2]).await.unwrap();
        assert_eq!(last_statement(&f.driver), "delete from user where id in (1,2)");

        assert_eq!(f.repository.delete_ids(&mut f.ctx, &[]).await.unwrap(), 0);
        assert_eq!(f.driver.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_reads() {
        let mut f = setup(false);
        f.driver.set_rows(vec![row(1, "a"), row(2, "b")]);

        let first = f.repository.get(&mut f.ctx, 1).await.unwrap();
        assert_eq!(first, Some(user(Some(1), "a", None)));
        assert_eq!(last_statement(&f.driver), "select * from user where id = 1");

        let condition = Condition::new()
            .eq("user_name", "a")
            .put_sort("id", SortType::Desc)
            .limit(5);
        let listed = f.repository.list(&mut f.ctx, &condition).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(
            last_statement(&f.driver),
            "select * from user where user_name = 'a' order by id desc limit 5"
        );

        let search = Search::new(Condition::new()).with_page(2, 10);
        f.repository.list_page(&mut f.ctx, &search).await.unwrap();
        assert_eq!(
            last_statement(&f.driver),
            "select * from user where 1 = 1 limit 10,10"
        );

        let err = f.repository.list_ids(&mut f.ctx, &[]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ConditionRequired(_)));
    }

    #[tokio::test]
    async fn test_count() {
        let mut f = setup(false);
        let mut count_row = Record::new();
        count_row.insert("count(1)".into(), SqlValue::Int(12));
        f.driver.set_rows(vec![count_row]);

        let total = f
            .repository
            .count(&mut f.ctx, &Condition::new().ge("age", 18))
            .await
            .unwrap();
        assert_eq!(total, 12);
        assert_eq!(
            last_statement(&f.driver),
            "select count(1) from user where age >= 18"
        );
    }

    #[tokio::test]
    async fn test_templates() {
        let mut f = setup(false);
        f.driver.set_rows(vec![row(3, "kim")]);

        let params = Params::new().bind("userName", "kim");
        let found: Vec<UserEntity> = f
            .repository
            .select(&mut f.ctx, "user.find_by_name", &params)
            .await
            .unwrap();
        assert_eq!(found, vec![user(Some(3), "kim", None)]);
        assert_eq!(
            last_statement(&f.driver),
            "select * from user where 1 = 1 and user_name = 'kim'"
        );

        let params = Params::new().bind("name", "x").bind("age", 30);
        f.repository
            .execute(&mut f.ctx, "user.rename_all", &params)
            .await
            .unwrap();
        assert_eq!(
            last_statement(&f.driver),
            "update user set user_name = 'x' where age > 30"
        );

        let err = f
            .repository
            .execute(&mut f.ctx, "user.missing", &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn test_cached_reads_and_invalidation() {
        let mut f = setup(true);
        f.driver.set_rows(vec![row(5, "a")]);

        let loaded = f.repository.get_cached(&mut f.ctx, 5).await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(f.cache.len(), 1);

        let reads = f.driver.statements().len();
        f.repository.get_cached(&mut f.ctx, 5).await.unwrap();
        assert_eq!(f.driver.statements().len(), reads);

        f.repository.delete(&mut f.ctx, 5).await.unwrap();
        assert!(f.cache.is_empty());

        f.repository.get_cached(&mut f.ctx, 5).await.unwrap();
        assert_eq!(f.cache.len(), 1);
        f.repository
            .delete_by_condition(&mut f.ctx, &Condition::new().eq("age", 1))
            .await
            .unwrap();
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_cached_many() {
        let mut f = setup(true);
        f.cache.save(&user(Some(1), "cached", None)).await;
        f.driver.set_rows(vec![row(2, "b")]);

        let found = f
            .repository
            .get_cached_many(&mut f.ctx, &[1, 2])
            .await
            .unwrap();
        assert_eq!(found[&1].user_name.as_deref(), Some("cached"));
        assert_eq!(found[&2].user_name.as_deref(), Some("b"));
        assert_eq!(last_statement(&f.driver), "select * from user where id in (2)");
        assert_eq!(f.cache.len(), 2);
    }

    #[tokio::test]
    async fn test_uncached_table_skips_cache() {
        let mut f = setup(false);
        f.driver.set_rows(vec![row(5, "a")]);

        f.repository.get_cached(&mut f.ctx, 5).await.unwrap();
        assert!(f.cache.is_empty());
    }
}
