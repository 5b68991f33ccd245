//! Humped / underscore name conversion
//!
//! Column names are underscore-separated while parameter maps handed in by
//! callers are frequently humped (`userName`). Both directions live here.

/// Converts a humped name to its underscore form: `userName` -> `user_name`.
///
/// Every upper-case character after the first one is preceded by `_`; digits
/// never are. The result is always lower case.
pub fn hump_to_underline(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 4);
    for (i, ch) in text.chars().enumerate() {
        if i > 0 && ch.is_uppercase() {
            result.push('_');
        }
        result.extend(ch.to_lowercase());
    }
    result
}

/// Converts an underscore name to humped form: `user_name` -> `UserName`.
///
/// Leading, trailing and doubled underscores are skipped.
pub fn underline_to_hump(text: &str, initial_upper_case: bool) -> String {
    let humped: String = if text.contains('_') {
        text.split('_')
            .filter(|part| !part.is_empty())
            .map(initial_upper)
            .collect()
    } else {
        text.to_string()
    };

    if initial_upper_case {
        initial_upper(&humped)
    } else {
        initial_lower(&humped)
    }
}

/// Last path segment of a type name with an `Entity` suffix removed,
/// converted to underscore form: `app::model::UserInfoEntity` -> `user_info`.
pub fn table_name_of(type_name: &str) -> String {
    // generic arguments never name a table
    let base = type_name.split('<').next().unwrap_or(type_name);
    let simple = base.rsplit("::").next().unwrap_or(base);
    hump_to_underline(&simple.replace("Entity", ""))
}

fn initial_upper(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn initial_lower(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
