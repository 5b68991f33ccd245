//! Entity mapping
//!
//! An [`Entity`] is any serde-serializable record with an integer primary
//! key named `id`. Encoding goes through `serde_json` so field names map to
//! columns by their underscore form.

use crate::service::db::core::types::{IdType, Record, SqlValue, DATE_TIME_FORMAT};
use crate::tool::naming::{hump_to_underline, table_name_of};
use crate::tool::{DbResult, RepositoryError};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Primary key column shared by every entity table.
pub const ID_COLUMN: &str = "id";

/// Date-time layout produced by chrono's serde support.
const JSON_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A persisted record type.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table name; defaults to the type name without an `Entity` suffix in
    /// underscore form (`UserInfoEntity` -> `user_info`).
    fn table_name() -> String {
        table_name_of(std::any::type_name::<Self>())
    }

    /// Width of generated keys.
    fn id_type() -> IdType {
        IdType::Long
    }

    /// Namespace used for cache keys.
    fn type_key() -> String {
        std::any::type_name::<Self>().to_string()
    }

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// Column -> value form of the entity.
    fn encode(&self) -> DbResult<Record> {
        to_record(self)
    }

    /// Rebuilds an entity from a decoded row.
    fn decode(record: Record) -> DbResult<Self> {
        from_record(record)
    }
}

/// Encodes any struct or map into a record keyed by underscore names.
pub fn to_record<T: Serialize + ?Sized>(value: &T) -> DbResult<Record> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields
            .into_iter()
            .map(|(name, value)| (hump_to_underline(&name), json_to_sql(value)))
            .collect()),
        other => Err(RepositoryError::Codec(format!(
            "expected a struct or map, got {}",
            other
        ))),
    }
}

/// Decodes a record into any deserializable type.
pub fn from_record<T: DeserializeOwned>(record: Record) -> DbResult<T> {
    let fields: Map<String, Value> = record
        .into_iter()
        .map(|(name, value)| (name, sql_to_json(value)))
        .collect();
    Ok(serde_json::from_value(Value::Object(fields))?)
}

fn json_to_sql(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Bool(b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(v), _) => SqlValue::Int(v),
            (None, Some(v)) => SqlValue::Int(v as i64),
            _ => SqlValue::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => parse_date_time(&s)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Text(s)),
        Value::Array(items) => SqlValue::List(items.into_iter().map(json_to_sql).collect()),
        nested @ Value::Object(_) => SqlValue::Text(nested.to_string()),
    }
}

fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(b),
        SqlValue::Int(v) => Value::Number(v.into()),
        SqlValue::Float(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Decimal(text) => {
            if let Ok(v) = text.parse::<i64>() {
                Value::Number(v.into())
            } else {
                text.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::String(text))
            }
        }
        SqlValue::Text(text) => Value::String(text),
        SqlValue::DateTime(dt) => Value::String(dt.format(JSON_DATE_TIME_FORMAT).to_string()),
        SqlValue::List(items) => Value::Array(items.into_iter().map(sql_to_json).collect()),
    }
}

fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    // only the exact layouts chrono and the database emit
    if text.len() < 19 {
        return None;
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT))
        .ok()
}
