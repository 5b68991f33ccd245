//! Common type definitions for the database core
//!
//! Values bound into templates, rows returned by sessions and the outcome
//! of mutating statements.

use crate::tool::naming::hump_to_underline;
use crate::tool::{DbResult, RepositoryError};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Canonical date-time rendering used for every SQL literal.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A typed SQL value.
///
/// Rows are decoded into these according to the column's declared type, and
/// template/condition parameters are bound as these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric kept in its textual form
    Decimal(String),
    Text(String),
    DateTime(NaiveDateTime),
    List(Vec<SqlValue>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// A value counts as bound when it is neither null nor empty.
    pub fn is_present(&self) -> bool {
        match self {
            SqlValue::Null => false,
            SqlValue::Text(s) => !s.is_empty(),
            SqlValue::List(items) => !items.is_empty(),
            _ => true,
        }
    }

    /// Whether the value renders as a quoted literal.
    pub fn is_textual(&self) -> bool {
        matches!(self, SqlValue::Text(_) | SqlValue::DateTime(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Float(v) => Some(*v as i64),
            SqlValue::Decimal(s) | SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) | SqlValue::Decimal(s) => Some(s),
            _ => None,
        }
    }
}

/// Plain, unquoted rendering.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "null"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Decimal(s) | SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format(DATE_TIME_FORMAT)),
            SqlValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for SqlValue {
            fn from(v: $t) -> Self {
                SqlValue::Int(v as i64)
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Float(v as f64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        v.and_hms_opt(0, 0, 0)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for SqlValue {
    fn from(v: Vec<T>) -> Self {
        SqlValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// One decoded result row: lower-case column name -> value.
pub type Record = BTreeMap<String, SqlValue>;

/// Named parameters bound into a template.
///
/// Names are normalized to underscore form on insertion so callers may use
/// either `userName` or `user_name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: HashMap<String, SqlValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style bind.
    pub fn bind(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<SqlValue>) {
        self.values.insert(hump_to_underline(name.trim()), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    /// True when `name` is bound to a non-null, non-empty value.
    pub fn is_present(&self, name: &str) -> bool {
        self.values.get(name).map(SqlValue::is_present).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SqlValue)> {
        self.values.iter()
    }

    /// Binds every field of an encoded record.
    pub fn from_record(record: Record) -> Self {
        let mut params = Self::new();
        for (name, value) in record {
            params.insert(&name, value);
        }
        params
    }

    /// Binds every field of any serializable struct or map.
    pub fn from_serialize<T: Serialize>(value: &T) -> DbResult<Self> {
        Ok(Self::from_record(crate::service::db::entity::to_record(value)?))
    }
}

impl<K: AsRef<str>, V: Into<SqlValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k.as_ref(), v);
        }
        params
    }
}

/// Primary key width used when reading generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdType {
    Int,
    #[default]
    Long,
}

/// A generated primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratedId {
    Int(i32),
    Long(i64),
}

impl GeneratedId {
    /// Fails when the key does not fit the requested width.
    pub fn new(id: i64, id_type: IdType) -> DbResult<Self> {
        match id_type {
            IdType::Int => i32::try_from(id).map(GeneratedId::Int).map_err(|_| {
                RepositoryError::Update(format!("generated key {} does not fit an int id", id))
            }),
            IdType::Long => Ok(GeneratedId::Long(id)),
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            GeneratedId::Int(v) => *v as i64,
            GeneratedId::Long(v) => *v,
        }
    }
}

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}

/// Connection pool statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub idle_connections: usize,
    pub checked_out: u64,
    pub total_created: u64,
    pub total_closed: u64,
    pub max_size: usize,
    pub min_size: usize,
}
