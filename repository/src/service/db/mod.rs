//! Database layer
//!
//! `core` owns connections and sessions, `template` turns named SQL into
//! executable text, and [`repository::BaseRepository`] ties both to entities.

pub mod condition;
pub mod core;
pub mod entity;
pub mod repository;
pub mod search;
pub mod template;

pub use condition::{Condition, SortType};
pub use entity::{Entity, ID_COLUMN};
pub use repository::BaseRepository;
pub use search::Search;
