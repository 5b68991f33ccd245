//! Repository configuration document
//!
//! A YAML file (default `simple-repository.yml`), optionally nested under a
//! top-level `simple:` key, holding global settings plus one section per
//! environment (`dev`, `test`, `pre`, `pro`). The active environment comes
//! from `--simple.env=<env>`, then `SIMPLE_ENV`, then the document's `env`.

use crate::config::redis_config::RedisSettings;
use crate::service::db::core::config::{DbServiceConfig, PoolConfig};
use crate::tool::{DbResult, RepositoryError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "simple-repository.yml";
pub const CONFIG_PATH_VAR: &str = "SIMPLE_CONFIG";
pub const ENV_VAR: &str = "SIMPLE_ENV";
pub const ENV_ARG_PREFIX: &str = "--simple.env=";
pub const ENV_TAGS: [&str; 4] = ["dev", "test", "pre", "pro"];

/// `datasource` section of an environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub driver: Option<String>,
}

/// `pool` section of an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PoolSettings {
    pub min_size: usize,
    pub max_size: usize,
    pub initial_size: usize,
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        Self {
            min_size: defaults.min_size,
            max_size: defaults.max_size,
            initial_size: defaults.initial_size,
            max_lifetime_secs: defaults.max_lifetime.as_secs(),
        }
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        PoolConfig::default()
            .with_min_size(settings.min_size)
            .with_max_size(settings.max_size)
            .with_initial_size(settings.initial_size)
            .with_max_lifetime(Duration::from_secs(settings.max_lifetime_secs))
            .normalized()
    }
}

/// One environment section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// log every executed statement
    pub log: bool,
    pub datasource: DataSourceConfig,
    pub redis: RedisSettings,
    pub pool: PoolSettings,
}

impl EnvironmentConfig {
    pub fn db_service_config(&self) -> DbServiceConfig {
        DbServiceConfig::default()
            .with_pool_config(PoolConfig::from(&self.pool))
            .with_sql_logging(self.log)
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    pub env: String,
    /// `|`-separated table names whose entities are cached
    pub cache_table: String,
    /// legacy template location, `.`-separated
    pub sql_index_package: Option<String>,
    pub sql_dir: Option<String>,
    pub dev: Option<EnvironmentConfig>,
    pub test: Option<EnvironmentConfig>,
    pub pre: Option<EnvironmentConfig>,
    pub pro: Option<EnvironmentConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            cache_table: String::new(),
            sql_index_package: None,
            sql_dir: None,
            dev: None,
            test: None,
            pre: None,
            pro: None,
        }
    }
}

impl Settings {
    /// Parses a document, unwrapping a top-level `simple:` key if present.
    pub fn from_yaml_str(text: &str) -> DbResult<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(text)?;
        let root = match document.get("simple") {
            Some(nested) if nested.is_mapping() => nested.clone(),
            _ => document,
        };
        if root.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(root)?)
    }

    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            RepositoryError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        info!("Loading repository configuration from {}", path.display());
        Self::from_yaml_str(&text)
    }

    /// Loads `.env`, then the file named by `SIMPLE_CONFIG` (default
    /// `simple-repository.yml`), then applies `SIMPLE_ENV`.
    pub fn from_env() -> DbResult<Self> {
        if dotenv::dotenv().is_err() {
            warn!(".env file not found, using process environment only");
        }
        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut settings = Self::load(&path)?;
        if let Ok(env_name) = env::var(ENV_VAR) {
            settings = settings.with_env(&env_name)?;
        }
        Ok(settings)
    }

    /// Selects the active environment.
    pub fn with_env(mut self, env_name: &str) -> DbResult<Self> {
        let env_name = env_name.trim().to_lowercase();
        if !ENV_TAGS.contains(&env_name.as_str()) {
            return Err(RepositoryError::Config(format!(
                "unknown environment '{}', expected one of {:?}",
                env_name, ENV_TAGS
            )));
        }
        self.env = env_name;
        Ok(self)
    }

    /// Applies `--simple.env=<env>` from the command line, if given.
    pub fn with_args<I, S>(self, args: I) -> DbResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match env_from_args(args) {
            Some(env_name) => self.with_env(&env_name),
            None => Ok(self),
        }
    }

    /// The section of the active environment.
    pub fn active(&self) -> DbResult<&EnvironmentConfig> {
        let section = match self.env.as_str() {
            "dev" => self.dev.as_ref(),
            "test" => self.test.as_ref(),
            "pre" => self.pre.as_ref(),
            "pro" => self.pro.as_ref(),
            _ => None,
        };
        section.ok_or_else(|| {
            RepositoryError::Config(format!("no configuration for environment '{}'", self.env))
        })
    }

    /// Lower-cased names of cached tables.
    pub fn cache_tables(&self) -> BTreeSet<String> {
        self.cache_table
            .split('|')
            .map(|table| table.trim().to_lowercase())
            .filter(|table| !table.is_empty())
            .collect()
    }

    pub fn is_cached_table(&self, table: &str) -> bool {
        self.cache_tables().contains(&table.trim().to_lowercase())
    }

    /// Template directory: `sql-dir`, else `sql-index-package` as a path,
    /// else `sql`.
    pub fn template_dir(&self) -> PathBuf {
        if let Some(dir) = self.sql_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return PathBuf::from(dir.trim());
        }
        if let Some(package) = self
            .sql_index_package
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        {
            return package.trim().split('.').collect();
        }
        PathBuf::from("sql")
    }
}

/// Environment named by a `--simple.env=<env>` argument; the last one wins.
pub fn env_from_args<I, S>(args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .filter_map(|arg| {
            arg.as_ref()
                .strip_prefix(ENV_ARG_PREFIX)
                .map(|env_name| env_name.trim().to_string())
        })
        .filter(|env_name| !env_name.is_empty())
        .last()
}
