//! In-memory driver for unit tests

use crate::service::db::core::driver::{Driver, DriverConnection};
use crate::service::db::core::types::{ExecOutcome, Record};
use crate::tool::{DbResult, RepositoryError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    connects: AtomicUsize,
    closes: AtomicUsize,
    fail_connects: AtomicBool,
    statements: Mutex<Vec<String>>,
    rows: Mutex<Vec<Record>>,
    rows_affected: AtomicU64,
    last_insert_id: AtomicU64,
}

/// Driver whose connections record every statement and answer queries with
/// a fixed row set.
#[derive(Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        driver.state.rows_affected.store(1, Ordering::SeqCst);
        driver
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn fail_connects(&self, fail: bool) {
        self.state.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub fn set_rows(&self, rows: Vec<Record>) {
        *self.state.rows.lock() = rows;
    }

    pub fn set_outcome(&self, rows_affected: u64, last_insert_id: u64) {
        self.state.rows_affected.store(rows_affected, Ordering::SeqCst);
        self.state.last_insert_id.store(last_insert_id, Ordering::SeqCst);
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.statements.lock().clone()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn connect(&self) -> DbResult<Box<dyn DriverConnection>> {
        if self.state.fail_connects.load(Ordering::SeqCst) {
            return Err(RepositoryError::PoolExhausted("connection refused".into()));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

impl MockConnection {
    fn record(&self, sql: &str) {
        self.state.statements.lock().push(sql.to_string());
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn query(&mut self, sql: &str) -> DbResult<Vec<Record>> {
        self.record(sql);
        Ok(self.state.rows.lock().clone())
    }

    async fn execute(&mut self, sql: &str) -> DbResult<ExecOutcome> {
        self.record(sql);
        let last_insert_id = match self.state.last_insert_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        };
        Ok(ExecOutcome {
            rows_affected: self.state.rows_affected.load(Ordering::SeqCst),
            last_insert_id,
        })
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> DbResult<()> {
        self.record(if enabled { "autocommit on" } else { "autocommit off" });
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.record("commit");
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.record("rollback");
        Ok(())
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
