//! SQL literal rendering
//!
//! Every value spliced into statement text, by templates and conditions
//! alike, goes through this module. Statements are sent as plain text so the
//! escaping here is the only barrier between bound values and the SQL
//! grammar; keep new call sites on bound parameters where the driver allows.

use crate::service::db::core::types::{SqlValue, DATE_TIME_FORMAT};

/// Escapes a string for use inside a single-quoted MySQL literal.
///
/// Backslashes are doubled first, then single quotes become `\'`.
pub fn escape_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Renders a value as a SQL literal.
///
/// * null, empty text and empty lists -> `null`
/// * text -> `'escaped'`
/// * date-time -> `'yyyy-MM-dd HH:mm:ss'`
/// * list -> `(a,b,...)` with each element rendered recursively
/// * numbers and booleans -> their plain form; NaN and infinities -> `null`
/// * decimals that are not finite numbers -> quoted like text
pub fn format_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "null".to_string(),
        SqlValue::Text(s) if s.is_empty() => "null".to_string(),
        SqlValue::Text(s) => format!("'{}'", escape_literal(s)),
        SqlValue::DateTime(dt) => format!("'{}'", dt.format(DATE_TIME_FORMAT)),
        SqlValue::List(items) if items.is_empty() => "null".to_string(),
        SqlValue::List(items) => {
            let rendered: Vec<String> = items.iter().map(format_value).collect();
            format!("({})", rendered.join(","))
        }
        SqlValue::Float(v) if !v.is_finite() => "null".to_string(),
        SqlValue::Decimal(s) if !s.parse::<f64>().map_or(false, f64::is_finite) => {
            format!("'{}'", escape_literal(s))
        }
        SqlValue::Bool(_) | SqlValue::Int(_) | SqlValue::Float(_) | SqlValue::Decimal(_) => {
            value.to_string()
        }
    }
}

/// Raw rendering used by `${name}` placeholders: text is inserted as-is,
/// everything else as a literal.
pub fn format_raw(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s.clone(),
        other => format_value(other),
    }
}
