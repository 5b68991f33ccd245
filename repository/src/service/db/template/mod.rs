//! SQL templates: loading, placeholder elision and literal rendering

pub mod literal;
pub mod rewriter;
pub mod store;

pub use literal::{escape_literal, format_raw, format_value};
pub use rewriter::{render, rewrite};
pub use store::{SqlTemplate, SqlTemplateStore};
