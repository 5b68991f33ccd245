//! Shared fixtures for integration tests: a scripted in-memory driver and
//! a test entity.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use simple_repository::service::db::core::{
    Driver, DriverConnection, ExecOutcome, PoolConfig, Record, SqlValue,
};
use simple_repository::{DbResult, Entity, RepositoryError, Settings};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Script {
    statements: Mutex<Vec<String>>,
    /// (statement prefix, rows) pairs; the first matching prefix answers
    responses: Mutex<Vec<(String, Vec<Record>)>>,
    next_id: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    refuse: AtomicBool,
}

/// Driver that records every statement, answers queries from scripted
/// responses and numbers inserted rows like an auto-increment column.
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Script>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        driver.script.next_id.store(1, Ordering::SeqCst);
        driver
    }

    pub fn respond(&self, prefix: &str, rows: Vec<Record>) {
        self.script
            .responses
            .lock()
            .push((prefix.to_lowercase(), rows));
    }

    pub fn statements(&self) -> Vec<String> {
        self.script.statements.lock().clone()
    }

    pub fn last_statement(&self) -> Option<String> {
        self.script.statements.lock().last().cloned()
    }

    pub fn clear_statements(&self) {
        self.script.statements.lock().clear();
    }

    pub fn opened(&self) -> usize {
        self.script.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.script.closed.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.script.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn connect(&self) -> DbResult<Box<dyn DriverConnection>> {
        if self.script.refuse.load(Ordering::SeqCst) {
            return Err(RepositoryError::PoolExhausted("connection refused".into()));
        }
        self.script.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            script: self.script.clone(),
        }))
    }

    fn describe(&self) -> String {
        "scripted://memory".to_string()
    }
}

struct ScriptedConnection {
    script: Arc<Script>,
}

#[async_trait]
impl DriverConnection for ScriptedConnection {
    async fn query(&mut self, sql: &str) -> DbResult<Vec<Record>> {
        self.script.statements.lock().push(sql.to_string());
        let responses = self.script.responses.lock();
        let rows = responses
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(rows)
    }

    async fn execute(&mut self, sql: &str) -> DbResult<ExecOutcome> {
        self.script.statements.lock().push(sql.to_string());
        if sql.starts_with("insert") {
            let rows = sql.matches("),(").count() as u64 + 1;
            let first = self.script.next_id.fetch_add(rows, Ordering::SeqCst);
            return Ok(ExecOutcome {
                rows_affected: rows,
                last_insert_id: Some(first),
            });
        }
        Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> DbResult<()> {
        let sql = if enabled { "set autocommit = 1" } else { "set autocommit = 0" };
        self.script.statements.lock().push(sql.to_string());
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.script.statements.lock().push("commit".to_string());
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.script.statements.lock().push("rollback".to_string());
        Ok(())
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntity {
    pub id: Option<i64>,
    pub user_name: Option<String>,
    pub age: Option<i64>,
}

impl UserEntity {
    pub fn named(name: &str, age: i64) -> Self {
        Self {
            id: None,
            user_name: Some(name.to_string()),
            age: Some(age),
        }
    }
}

impl Entity for UserEntity {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

pub fn user_row(id: i64, name: &str, age: i64) -> Record {
    let mut row = Record::new();
    row.insert("id".to_string(), SqlValue::Int(id));
    row.insert("user_name".to_string(), SqlValue::Text(name.to_string()));
    row.insert("age".to_string(), SqlValue::Int(age));
    row
}

pub fn small_pool() -> PoolConfig {
    PoolConfig::default()
        .with_min_size(1)
        .with_max_size(4)
        .with_initial_size(2)
}

/// Settings for an in-process runtime: `user` is a cached table and Redis
/// stays off.
pub fn test_settings() -> Settings {
    Settings::from_yaml_str(
        r#"
simple:
  env: test
  cache-table: user
  test:
    log: true
    datasource:
      url: mysql://127.0.0.1:3306/simple_test
    pool:
      min-size: 1
      max-size: 4
      initial-size: 2
"#,
    )
    .expect("valid test settings")
}

pub fn template_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("sql")
}
