//! Simple repository
//!
//! A small persistence layer over MySQL: pooled connections, per-caller
//! sessions with optional transactions, named SQL templates whose optional
//! clauses disappear when their parameter is absent, a fluent condition
//! builder and an entity cache backed by an in-process LRU or Redis.
//!
//! # Layout
//!
//! ```text
//! simple_repository
//! ├── config     (YAML settings, environments, Redis)
//! ├── logging    (tracing subscriber setup)
//! ├── runtime    (startup wiring)
//! ├── service
//! │   ├── cache  (CacheManager, LRU and Redis backends)
//! │   └── db
//! │       ├── core        (driver seam, pool, sessions)
//! │       ├── template    (template store and rewriter)
//! │       ├── condition   (where/order/limit builder)
//! │       └── repository  (BaseRepository)
//! └── tool       (errors, naming helpers)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use simple_repository::{Condition, Entity, RepositoryRuntime, Settings};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct UserEntity {
//!     id: Option<i64>,
//!     user_name: Option<String>,
//! }
//!
//! impl Entity for UserEntity {
//!     fn id(&self) -> Option<i64> {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: i64) {
//!         self.id = Some(id);
//!     }
//! }
//!
//! # async fn run() -> simple_repository::DbResult<()> {
//! let runtime = RepositoryRuntime::from_settings(Settings::from_env()?).await?;
//! let users = runtime.repository::<UserEntity>();
//! let mut ctx = runtime.context();
//!
//! ctx.open_transaction().await?;
//! let mut user = UserEntity { id: None, user_name: Some("kim".into()) };
//! users.add(&mut ctx, &mut user).await?;
//! let found = users.list(&mut ctx, &Condition::new().eq("user_name", "kim")).await?;
//! ctx.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod runtime;
pub mod service;
pub mod tool;

pub use config::Settings;
pub use runtime::RepositoryRuntime;
pub use service::cache::CacheManager;
pub use service::db::core::{Params, SessionContext, SqlValue};
pub use service::db::{BaseRepository, Condition, Entity, Search, SortType};
pub use tool::{DbResult, RepositoryError};
