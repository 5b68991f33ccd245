//! Placeholder rewriting
//!
//! Templates carry two kinds of placeholders: `${name}` is replaced by the
//! raw value (text unquoted) and `&{name}` by a quoted literal. A clause
//! whose parameter is absent is elided: the text from the nearest
//! preceding boundary (` set `, ` where `, ` on `, ` and `, ` or `, `(`,
//! ` having `, `,`) up to the closing `}` becomes ` 1 = 1 `.

use crate::service::db::core::types::Params;
use crate::service::db::template::literal::{format_raw, format_value};
use crate::service::db::template::store::SqlTemplate;
use crate::tool::naming::hump_to_underline;
use crate::tool::{DbResult, RepositoryError};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Text substituted for an elided clause.
pub const ELIDED_CLAUSE: &str = " 1 = 1 ";

const BOUNDARY_TAGS: [&str; 8] = [
    " set ", " where ", " on ", " and ", " or ", "(", " having ", ",",
];

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace pattern");
    static ref TRAILING_ELIDED: Regex =
        Regex::new(r",\s*1 = 1\b").expect("valid elided clause pattern");
    static ref LEADING_ELIDED_SET: Regex =
        Regex::new(r"\bset 1 = 1 ,").expect("valid elided set pattern");
    static ref PLACEHOLDER: Regex =
        Regex::new(r"([$&])\{([^}]*)\}").expect("valid placeholder pattern");
}

/// One placeholder and the clause that disappears with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub fragment: String,
}

/// Finds every placeholder of `sql` together with its elidable fragment.
///
/// Works on a lower-cased copy; each fragment found is replaced by
/// [`ELIDED_CLAUSE`] before the next placeholder is located so nested
/// boundaries resolve against already-elided text.
pub fn pre_analysis(sql: &str) -> Vec<Placeholder> {
    let mut work = sql.to_lowercase();
    let mut found = Vec::new();

    loop {
        let start = match (work.find("${"), work.find("&{")) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => break,
        };
        let end = match work[start..].find('}') {
            Some(offset) => start + offset + 1,
            None => break, // unterminated placeholder
        };

        let name = work[start + 2..end - 1].trim().to_string();
        let boundary = clause_start(&work[..start]);
        let raw = work[boundary..end].to_string();

        found.push(Placeholder {
            name,
            fragment: raw.trim().to_string(),
        });
        work = work.replace(&raw, ELIDED_CLAUSE);
    }

    found
}

/// End of the closest boundary tag in `prefix`, or 0 when there is none.
fn clause_start(prefix: &str) -> usize {
    BOUNDARY_TAGS
        .iter()
        .filter_map(|tag| prefix.rfind(tag).map(|i| i + tag.len()))
        .max()
        .unwrap_or(0)
}

/// Elides every clause whose parameter is absent and normalizes the result.
///
/// Returns lower-cased SQL with the remaining placeholders still in place.
pub fn revise(sql: &str, params: &Params) -> String {
    let mut revised = sql.to_lowercase();
    for placeholder in pre_analysis(sql) {
        if !params.is_present(&placeholder.name) {
            revised = revised.replace(&placeholder.fragment, ELIDED_CLAUSE);
        }
    }
    cleanup(&revised)
}

fn cleanup(sql: &str) -> String {
    let collapsed = WHITESPACE.replace_all(sql, " ");
    let trimmed = TRAILING_ELIDED.replace_all(&collapsed, "");
    let fixed = LEADING_ELIDED_SET.replace_all(&trimmed, "set ");
    WHITESPACE.replace_all(&fixed, " ").into_owned()
}

/// Replaces every bound placeholder in one left-to-right pass.
///
/// Unknown placeholders are left untouched. Substituted text is never
/// rescanned.
pub fn substitute(sql: &str, params: &Params) -> String {
    PLACEHOLDER
        .replace_all(sql, |caps: &Captures| {
            let name = caps[2].trim();
            match params.get(name) {
                Some(value) if &caps[1] == "$" => format_raw(value),
                Some(value) => format_value(value),
                None => caps[0].to_string(),
            }
        })
        .trim()
        .to_string()
}

/// Fails with the first required field that has no present value.
pub fn check_required(required_fields: &[String], params: &Params) -> DbResult<()> {
    for field in required_fields {
        let name = hump_to_underline(field.trim());
        if !params.is_present(&name) {
            return Err(RepositoryError::MissingRequiredParameter(name));
        }
    }
    Ok(())
}

/// Renders ad-hoc SQL: elision followed by substitution.
pub fn render(sql: &str, params: &Params) -> String {
    substitute(&revise(sql, params), params)
}

/// Renders a stored template after checking its required fields.
pub fn rewrite(template: &SqlTemplate, params: &Params) -> DbResult<String> {
    check_required(&template.required_fields, params)?;
    Ok(render(&template.sql, params))
}
