//! Sessions
//!
//! A [`Session`] owns one pooled connection for the length of a logical
//! operation. A [`SessionContext`] is the explicit per-caller handle that
//! lazily opens at most one session and releases it on request or on drop.

use crate::service::db::core::connection::{ConnectionPool, PooledConnection};
use crate::service::db::core::driver::DriverConnection;
use crate::service::db::core::types::{GeneratedId, IdType, Record};
use crate::tool::{DbResult, RepositoryError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Unit of work bound to one pooled connection.
pub struct Session {
    pool: Arc<ConnectionPool>,
    conn: Option<PooledConnection>,
    in_transaction: bool,
    log_sql: bool,
}

impl Session {
    /// Acquires a connection and wraps it in a session.
    pub async fn open(pool: Arc<ConnectionPool>, log_sql: bool) -> DbResult<Self> {
        let conn = pool.acquire().await?;
        debug!("Session opened");
        Ok(Self {
            pool,
            conn: Some(conn),
            in_transaction: false,
            log_sql,
        })
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Runs a query and returns its rows keyed by lower-case column name.
    pub async fn query(&mut self, sql: &str) -> DbResult<Vec<Record>> {
        self.log(sql);
        self.connection()?.query(sql).await
    }

    /// Runs a count query: the single column of the first row, or 0 when
    /// no row comes back. A row with more than one column is rejected since
    /// record columns carry no select order.
    pub async fn count(&mut self, sql: &str) -> DbResult<i64> {
        let rows = self.query(sql).await?;
        let row = match rows.first() {
            Some(row) => row,
            None => return Ok(0),
        };
        if row.len() > 1 {
            return Err(RepositoryError::Query(format!(
                "count query must return one column, got {}: {}",
                row.len(),
                sql
            )));
        }
        Ok(row.values().next().and_then(|value| value.as_i64()).unwrap_or(0))
    }

    /// Runs one mutating statement and returns the affected row count.
    pub async fn update(&mut self, sql: &str) -> DbResult<u64> {
        self.log(sql);
        let outcome = self.connection()?.execute(sql).await?;
        Ok(outcome.rows_affected)
    }

    /// Runs several mutating statements as one batch and returns the total
    /// affected row count.
    pub async fn update_batch(&mut self, statements: &[String]) -> DbResult<u64> {
        if statements.is_empty() {
            return Ok(0);
        }
        for sql in statements {
            self.log(sql);
        }
        let counts = self.connection()?.execute_batch(statements).await?;
        Ok(counts.iter().sum())
    }

    /// Runs an insert and returns the generated keys.
    ///
    /// Multi-row inserts yield the consecutive range starting at the
    /// driver's last insert id.
    pub async fn insert(&mut self, sql: &str, id_type: IdType) -> DbResult<Vec<GeneratedId>> {
        self.log(sql);
        let outcome = self.connection()?.execute(sql).await?;

        match outcome.last_insert_id {
            Some(first) => (0..outcome.rows_affected)
                .map(|offset| GeneratedId::new((first + offset) as i64, id_type))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Disables auto-commit until the session is committed or rolled back.
    pub async fn open_transaction(&mut self) -> DbResult<()> {
        if self.in_transaction {
            return Ok(());
        }
        self.connection()?.set_auto_commit(false).await?;
        self.in_transaction = true;
        debug!("Transaction opened");
        Ok(())
    }

    /// Commits any open transaction and returns the connection to the pool.
    pub async fn commit(mut self) -> DbResult<()> {
        self.finish(true).await
    }

    /// Rolls back any open transaction and returns the connection to the pool.
    pub async fn rollback(mut self) -> DbResult<()> {
        self.finish(false).await
    }

    /// Returns the connection to the pool without committing.
    ///
    /// A connection left inside an open transaction is closed instead.
    pub async fn clear(mut self) {
        if let Some(conn) = self.conn.take() {
            if self.in_transaction {
                warn!("Session cleared with an open transaction, discarding connection");
                self.pool.invalidate(conn).await;
            } else {
                self.pool.release(conn).await;
            }
        }
    }

    async fn finish(&mut self, commit: bool) -> DbResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        if !self.in_transaction {
            self.pool.release(conn).await;
            return Ok(());
        }

        let result = Self::end_transaction(conn.connection(), commit).await;
        self.in_transaction = false;
        match &result {
            Ok(()) => {
                info!("Transaction {}", if commit { "committed" } else { "rolled back" });
                self.pool.release(conn).await;
            }
            Err(e) => {
                e.log("Session::finish");
                self.pool.invalidate(conn).await;
            }
        }
        result
    }

    async fn end_transaction(conn: &mut dyn DriverConnection, commit: bool) -> DbResult<()> {
        if commit {
            conn.commit().await?;
        } else {
            conn.rollback().await?;
        }
        conn.set_auto_commit(true).await
    }

    fn connection(&mut self) -> DbResult<&mut dyn DriverConnection> {
        self.conn
            .as_mut()
            .map(PooledConnection::connection)
            .ok_or_else(|| RepositoryError::Transaction("session already closed".to_string()))
    }

    fn log(&self, sql: &str) {
        if self.log_sql {
            info!("[sql] {}", sql);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.in_transaction {
                warn!("Session dropped inside a transaction, discarding connection");
                self.pool.discard_now(conn);
            } else {
                self.pool.release_now(conn);
            }
        }
    }
}

/// Per-caller session handle.
///
/// Holds at most one [`Session`]; the first database access opens it and
/// later accesses reuse it until it is committed, rolled back or released.
pub struct SessionContext {
    pool: Arc<ConnectionPool>,
    log_sql: bool,
    session: Option<Session>,
}

impl SessionContext {
    pub fn new(pool: Arc<ConnectionPool>, log_sql: bool) -> Self {
        Self {
            pool,
            log_sql,
            session: None,
        }
    }

    /// Returns the bound session, opening one if needed.
    pub async fn session(&mut self) -> DbResult<&mut Session> {
        if self.session.is_none() {
            let session = Session::open(self.pool.clone(), self.log_sql).await?;
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| RepositoryError::Transaction("session unavailable".to_string()))
    }

    /// True while a session is bound to this context.
    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.session
            .as_ref()
            .map(Session::in_transaction)
            .unwrap_or(false)
    }

    /// Opens (or reuses) the session and starts a transaction on it.
    pub async fn open_transaction(&mut self) -> DbResult<()> {
        self.session().await?.open_transaction().await
    }

    /// Commits and unbinds the session.
    pub async fn commit(&mut self) -> DbResult<()> {
        match self.session.take() {
            Some(session) => session.commit().await,
            None => Ok(()),
        }
    }

    /// Rolls back and unbinds the session.
    pub async fn rollback(&mut self) -> DbResult<()> {
        match self.session.take() {
            Some(session) => session.rollback().await,
            None => Ok(()),
        }
    }

    /// Returns the session's connection to the pool and unbinds it.
    pub async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            session.clear().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::db::core::config::PoolConfig;
    use crate::service::db::core::testing::MockDriver;
    use crate::service::db::core::types::SqlValue;

    fn setup() -> (Arc<MockDriver>, Arc<ConnectionPool>) {
        let driver = Arc::new(MockDriver::new());
        let config = PoolConfig::default().with_min_size(0).with_max_size(4);
        let pool = Arc::new(ConnectionPool::new(driver.clone(), config));
        (driver, pool)
    }

    #[tokio::test]
    async fn test_context_reuses_one_session() {
        let (driver, pool) = setup();
        let mut context = SessionContext::new(pool.clone(), false);

        context.session().await.unwrap().update("delete from t where id = 1").await.unwrap();
        context.session().await.unwrap().update("delete from t where id = 2").await.unwrap();

        assert_eq!(driver.connects(), 1);
        assert!(context.is_bound());

        context.release().await;
        assert!(!context.is_bound());
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_insert_returns_consecutive_ids() {
        let (driver, pool) = setup();
        driver.set_outcome(3, 41);
        let mut session = Session::open(pool, false).await.unwrap();

        let ids = session
            .insert("insert into t(a) values (1),(2),(3)", IdType::Int)
            .await
            .unwrap();
        assert_eq!(
            ids,
            vec![GeneratedId::Int(41), GeneratedId::Int(42), GeneratedId::Int(43)]
        );
    }

    #[tokio::test]
    async fn test_count_reads_first_column() {
        let (driver, pool) = setup();
        let mut row = Record::new();
        row.insert("count(1)".to_string(), SqlValue::Int(12));
        driver.set_rows(vec![row]);

        let mut session = Session::open(pool, false).await.unwrap();
        assert_eq!(session.count("select count(1) from t").await.unwrap(), 12);

        driver.set_rows(vec![]);
        assert_eq!(session.count("select count(1) from t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_rejects_multi_column_rows() {
        let (driver, pool) = setup();
        let mut row = Record::new();
        row.insert("total".to_string(), SqlValue::Int(5));
        row.insert("a_max".to_string(), SqlValue::Int(99));
        driver.set_rows(vec![row]);

        let mut session = Session::open(pool, false).await.unwrap();
        let result = session
            .count("select count(1) as total, max(id) as a_max from t")
            .await;
        assert!(matches!(result, Err(RepositoryError::Query(_))));
    }

    #[tokio::test]
    async fn test_insert_rejects_keys_wider_than_int() {
        let (driver, pool) = setup();
        driver.set_outcome(1, i32::MAX as u64 + 1);

        let mut session = Session::open(pool, false).await.unwrap();
        let result = session.insert("insert into t(a) values (1)", IdType::Int).await;
        assert!(matches!(result, Err(RepositoryError::Update(_))));

        let ids = session
            .insert("insert into t(a) values (1)", IdType::Long)
            .await
            .unwrap();
        assert_eq!(ids, vec![GeneratedId::Long(i32::MAX as i64 + 1)]);
    }

    #[tokio::test]
    async fn test_commit_restores_auto_commit_and_releases() {
        let (driver, pool) = setup();
        let mut context = SessionContext::new(pool.clone(), true);

        context.open_transaction().await.unwrap();
        assert!(context.in_transaction());
        context.session().await.unwrap().update("update t set a = 1").await.unwrap();
        context.commit().await.unwrap();

        assert_eq!(
            driver.statements(),
            vec!["autocommit off", "update t set a = 1", "commit", "autocommit on"]
        );
        assert!(!context.is_bound());
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback() {
        let (driver, pool) = setup();
        let mut context = SessionContext::new(pool, false);

        context.open_transaction().await.unwrap();
        context.rollback().await.unwrap();
        assert_eq!(
            driver.statements(),
            vec!["autocommit off", "rollback", "autocommit on"]
        );
    }

    #[tokio::test]
    async fn test_clear_inside_transaction_discards_connection() {
        let (driver, pool) = setup();
        let mut context = SessionContext::new(pool.clone(), false);

        context.open_transaction().await.unwrap();
        context.release().await;

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(driver.closes(), 1);
        assert_eq!(pool.stats().checked_out, 0);
    }

    #[tokio::test]
    async fn test_dropped_context_returns_connection() {
        let (_driver, pool) = setup();
        {
            let mut context = SessionContext::new(pool.clone(), false);
            context.session().await.unwrap();
        }
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.stats().checked_out, 0);
    }
}
