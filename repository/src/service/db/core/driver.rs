//! Driver seam
//!
//! The pool and sessions only talk to the database through these two traits.
//! [`crate::service::db::core::mysql::MySqlDriver`] is the production
//! implementation; tests plug in scripted drivers.

use crate::service::db::core::types::{ExecOutcome, Record};
use crate::tool::DbResult;
use async_trait::async_trait;

/// Opens new physical connections.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Opens one connection with auto-commit enabled.
    async fn connect(&self) -> DbResult<Box<dyn DriverConnection>>;

    /// Human-readable target, used in log lines.
    fn describe(&self) -> String;
}

/// One live database connection.
///
/// Statements are plain text; no server-side preparation is assumed.
#[async_trait]
pub trait DriverConnection: Send {
    /// Runs a query and decodes every row.
    async fn query(&mut self, sql: &str) -> DbResult<Vec<Record>>;

    /// Runs one mutating statement.
    async fn execute(&mut self, sql: &str) -> DbResult<ExecOutcome>;

    /// Runs several mutating statements back to back and returns the
    /// affected row count of each.
    async fn execute_batch(&mut self, statements: &[String]) -> DbResult<Vec<u64>> {
        let mut counts = Vec::with_capacity(statements.len());
        for sql in statements {
            counts.push(self.execute(sql).await?.rows_affected);
        }
        Ok(counts)
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Closes the physical connection.
    async fn close(self: Box<Self>) -> DbResult<()>;
}
