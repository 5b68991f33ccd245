//! Named SQL templates
//!
//! Every `*.sql` file in the template directory contributes statements
//! separated by `;`. Each statement starts with a comment block naming it:
//!
//! ```sql
//! /*
//!  * @name by_age
//!  * @required age
//!  */
//! select * from user where age > ${age} and name = &{name};
//! ```
//!
//! The statement is stored as `<file stem>.<name>`; lookups ignore case.

use crate::tool::{DbResult, RepositoryError};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const NAME_TAG: &str = "@name";
const REQUIRED_TAG: &str = "@required";
const COMMENT_END: &str = "*/";

/// One compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    /// `<file tag>.<statement name>`
    pub name: String,
    /// lower-cased, whitespace-collapsed body
    pub sql: String,
    /// parameters that must be bound and non-empty
    pub required_fields: Vec<String>,
}

/// Read-only registry of templates, built once at startup.
#[derive(Debug, Default)]
pub struct SqlTemplateStore {
    templates: HashMap<String, SqlTemplate>,
}

impl SqlTemplateStore {
    /// Loads every `*.sql` file of `directory`.
    pub fn load(directory: impl AsRef<Path>) -> DbResult<Self> {
        let directory = directory.as_ref();
        let mut files: Vec<_> = fs::read_dir(directory)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("sql"))
                        .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(RepositoryError::Config(format!(
                "no sql template files found in {}",
                directory.display()
            )));
        }

        let mut store = Self::default();
        for path in files {
            let tag = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let content = fs::read_to_string(&path)?;
            debug!("Parsing sql template file {}", path.display());
            store.parse_file(&tag, &content);
        }

        info!(
            "Loaded {} sql templates from {}",
            store.len(),
            directory.display()
        );
        Ok(store)
    }

    /// Builds a store from in-memory `(file tag, content)` pairs.
    pub fn from_sources<I, S, T>(sources: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut store = Self::default();
        for (tag, content) in sources {
            store.parse_file(&tag.as_ref().to_lowercase(), content.as_ref());
        }
        store
    }

    /// Looks up `<file tag>.<statement name>`.
    pub fn get(&self, index_name: &str) -> DbResult<&SqlTemplate> {
        self.templates
            .get(&index_name.trim().to_lowercase())
            .ok_or_else(|| RepositoryError::TemplateNotFound(index_name.to_string()))
    }

    pub fn contains(&self, index_name: &str) -> bool {
        self.templates.contains_key(&index_name.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// All templates ordered by name.
    pub fn templates(&self) -> Vec<&SqlTemplate> {
        let mut all: Vec<&SqlTemplate> = self.templates.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn parse_file(&mut self, tag: &str, content: &str) {
        for chunk in content.split(';') {
            if chunk.trim().is_empty() {
                continue;
            }
            match parse_statement(tag, chunk) {
                Some(template) => {
                    info!(
                        "Template {} loaded (required: {:?}): {}",
                        template.name, template.required_fields, template.sql
                    );
                    let key = template.name.to_lowercase();
                    if self.templates.insert(key, template).is_some() {
                        warn!("Duplicate sql template name in {}, the later one wins", tag);
                    }
                }
                None => warn!(
                    "Skipping sql chunk without @name annotation in {}: {}",
                    tag,
                    chunk.trim()
                ),
            }
        }
    }
}

fn parse_statement(tag: &str, chunk: &str) -> Option<SqlTemplate> {
    let name = annotation(chunk, NAME_TAG).filter(|name| !name.is_empty())?;
    let body_start = chunk.find(COMMENT_END)? + COMMENT_END.len();
    let sql = collapse(&chunk[body_start..].to_lowercase());
    if sql.is_empty() {
        return None;
    }

    let required_fields = annotation(chunk, REQUIRED_TAG)
        .map(|fields| {
            fields
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(SqlTemplate {
        name: format!("{}.{}", tag, name),
        sql,
        required_fields,
    })
}

/// Text after `tag` up to the end of its line, without a closing `*/`.
fn annotation(chunk: &str, tag: &str) -> Option<String> {
    let start = chunk.find(tag)? + tag.len();
    let rest = &chunk[start..];
    let line = rest.lines().next().unwrap_or("");
    let line = line.split(COMMENT_END).next().unwrap_or(line);
    Some(collapse(line))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
