//! Fluent WHERE-clause builder
//!
//! Each comparison appends one ` field op value` fragment. A comparison
//! with an empty field name or a null value appends ` 1 = 1` instead, so a
//! chain such as `eq(..).and().eq(..)` stays well-formed when optional
//! inputs are missing.
//!
//! ```
//! use simple_repository::service::db::condition::{Condition, SortType};
//!
//! let condition = Condition::new()
//!     .eq("age", 18)
//!     .and()
//!     .in_("id", vec![1, 2])
//!     .put_sort("id", SortType::Desc);
//! assert_eq!(condition.where_sql(), " age = 18 and id in (1,2)");
//! assert_eq!(condition.order_clause(), "order by id desc");
//! ```

use crate::service::db::core::types::SqlValue;
use crate::service::db::template::literal::{escape_literal, format_value};
use serde::{Deserialize, Serialize};
use std::fmt;

const MATCH_ALL: &str = " 1 = 1";

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    Asc,
    Desc,
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortType::Asc => write!(f, "asc"),
            SortType::Desc => write!(f, "desc"),
        }
    }
}

/// Accumulated predicate text plus independent sort rules and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    where_sql: String,
    sorts: Vec<(String, SortType)>,
    limit: Option<String>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, field: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(field, "=", value.into())
    }

    pub fn ne(self, field: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(field, "!=", value.into())
    }

    pub fn lt(self, field: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(field, "<", value.into())
    }

    pub fn le(self, field: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(field, "<=", value.into())
    }

    pub fn gt(self, field: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(field, ">", value.into())
    }

    pub fn ge(self, field: &str, value: impl Into<SqlValue>) -> Self {
        self.compare(field, ">=", value.into())
    }

    /// ` field like '%value%'`
    pub fn like(mut self, field: &str, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        if field.trim().is_empty() || value.is_null() {
            return self.push(MATCH_ALL);
        }
        let fragment = format!(" {} like '%{}%'", field, escape_literal(&value.to_string()));
        self.where_sql.push_str(&fragment);
        self
    }

    /// ` field in (a,b)`; elements are quoted when the first one is text or
    /// a date-time.
    pub fn in_<T: Into<SqlValue>>(self, field: &str, values: Vec<T>) -> Self {
        self.membership(field, "in", values)
    }

    pub fn not_in<T: Into<SqlValue>>(self, field: &str, values: Vec<T>) -> Self {
        self.membership(field, "not in", values)
    }

    pub fn is_null(mut self, field: &str) -> Self {
        if field.trim().is_empty() {
            return self.push(MATCH_ALL);
        }
        self.where_sql.push_str(&format!(" {} is null", field));
        self
    }

    pub fn is_not_null(mut self, field: &str) -> Self {
        if field.trim().is_empty() {
            return self.push(MATCH_ALL);
        }
        self.where_sql.push_str(&format!(" {} is not null", field));
        self
    }

    pub fn between(
        mut self,
        field: &str,
        start: impl Into<SqlValue>,
        end: impl Into<SqlValue>,
    ) -> Self {
        let (start, end) = (start.into(), end.into());
        if field.trim().is_empty() || start.is_null() || end.is_null() {
            return self.push(MATCH_ALL);
        }
        let fragment = format!(
            " {} between {} and {}",
            field,
            literal(&start),
            literal(&end)
        );
        self.where_sql.push_str(&fragment);
        self
    }

    pub fn and(self) -> Self {
        self.push(" and")
    }

    pub fn or(self) -> Self {
        self.push(" or")
    }

    /// Appends ` (inner)`; an empty inner condition is ignored.
    pub fn paren(self, inner: Condition) -> Self {
        let inner_sql = inner.where_sql.trim();
        if inner_sql.is_empty() {
            return self;
        }
        let fragment = format!(" ({})", inner_sql);
        self.push(&fragment)
    }

    /// Appends a clause that matches every row.
    pub fn match_all(self) -> Self {
        self.push(MATCH_ALL)
    }

    /// ` limit size`
    pub fn limit(mut self, size: u64) -> Self {
        self.limit = Some(format!("limit {}", size));
        self
    }

    /// ` limit start,end`
    pub fn limit_range(mut self, start: u64, end: u64) -> Self {
        self.limit = Some(format!("limit {},{}", start, end));
        self
    }

    pub fn put_sort(mut self, field: &str, sort_type: SortType) -> Self {
        if !field.trim().is_empty() {
            self.sorts.push((field.trim().to_string(), sort_type));
        }
        self
    }

    /// The predicate text exactly as accumulated.
    pub fn where_sql(&self) -> &str {
        &self.where_sql
    }

    /// True when no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.where_sql.trim().is_empty()
    }

    /// The trimmed predicate, or `1 = 1` when there is none.
    pub fn where_clause(&self) -> String {
        if self.is_empty() {
            MATCH_ALL.trim().to_string()
        } else {
            self.where_sql.trim().to_string()
        }
    }

    /// `order by f asc, g desc`, or an empty string.
    pub fn order_clause(&self) -> String {
        if self.sorts.is_empty() {
            return String::new();
        }
        let rules: Vec<String> = self
            .sorts
            .iter()
            .map(|(field, sort_type)| format!("{} {}", field, sort_type))
            .collect();
        format!("order by {}", rules.join(", "))
    }

    /// `limit ...`, or an empty string.
    pub fn limit_clause(&self) -> String {
        self.limit.clone().unwrap_or_default()
    }

    /// Predicate, ordering and limit joined for use after `where`.
    pub fn tail(&self) -> String {
        let mut parts = vec![self.where_clause()];
        parts.push(self.order_clause());
        parts.push(self.limit_clause());
        parts.retain(|part| !part.is_empty());
        parts.join(" ")
    }

    fn compare(mut self, field: &str, operator: &str, value: SqlValue) -> Self {
        if field.trim().is_empty() || value.is_null() {
            return self.push(MATCH_ALL);
        }
        let fragment = format!(" {} {} {}", field, operator, literal(&value));
        self.where_sql.push_str(&fragment);
        self
    }

    fn membership<T: Into<SqlValue>>(mut self, field: &str, keyword: &str, values: Vec<T>) -> Self {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        if field.trim().is_empty() || values.is_empty() {
            return self.push(MATCH_ALL);
        }

        // the first element decides; text later in a bare list is still quoted
        let quoted = values[0].is_textual();
        let rendered: Vec<String> = values
            .iter()
            .map(|value| {
                if quoted {
                    format!("'{}'", escape_literal(&value.to_string()))
                } else {
                    literal(value)
                }
            })
            .collect();

        let fragment = format!(" {} {} ({})", field, keyword, rendered.join(","));
        self.where_sql.push_str(&fragment);
        self
    }

    fn push(mut self, fragment: &str) -> Self {
        self.where_sql.push_str(fragment);
        self
    }
}

/// Literal form for a single comparison operand. Empty text stays an empty
/// quoted string rather than `null`.
fn literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(text) => format!("'{}'", escape_literal(text)),
        other => format_value(other),
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tail())
    }
}
