//! Repository error management
//!
//! Every failure the persistence core can raise is a variant of
//! [`RepositoryError`]. Errors are never retried here; they propagate to the
//! caller, which can use [`RepositoryError::log`] to report them with a
//! severity-appropriate level.

use thiserror::Error;
use tracing::{error, info, warn};

/// Shorthand result type used across the crate.
pub type DbResult<T> = Result<T, RepositoryError>;

/// Errors raised by the pool, sessions, templates, conditions and caches.
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    // connection management
    #[error("connection pool exhausted: {0}")]
    PoolExhausted(String),

    // statement execution
    #[error("query failed: {0}")]
    Query(String),

    #[error("update failed: {0}")]
    Update(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    // templates
    #[error("sql template not found: {0}")]
    TemplateNotFound(String),

    #[error("required parameter is missing: {0}")]
    MissingRequiredParameter(String),

    // guards against accidental full-table mutation
    #[error("a non-empty condition is required: {0}")]
    ConditionRequired(String),

    #[error("an entity (with id) is required: {0}")]
    EntityRequired(String),

    // collaborators
    #[error("cache error: {0}")]
    Cache(String),

    #[error("entity codec error: {0}")]
    Codec(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl RepositoryError {
    /// Returns the severity of the error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // the database or cache backend is unreachable
            RepositoryError::PoolExhausted(_) | RepositoryError::Cache(_) => {
                ErrorSeverity::Critical
            }

            RepositoryError::Query(_)
            | RepositoryError::Update(_)
            | RepositoryError::Transaction(_)
            | RepositoryError::Config(_)
            | RepositoryError::Io(_) => ErrorSeverity::High,

            // caller passed bad input
            RepositoryError::MissingRequiredParameter(_)
            | RepositoryError::ConditionRequired(_)
            | RepositoryError::EntityRequired(_)
            | RepositoryError::Codec(_) => ErrorSeverity::Medium,

            RepositoryError::TemplateNotFound(_) => ErrorSeverity::Low,
        }
    }

    /// Logs the error at a level matching its severity.
    pub fn log(&self, context: &str) {
        match self.severity() {
            ErrorSeverity::Critical => error!("[CRITICAL] {} - {}", context, self),
            ErrorSeverity::High => error!("[HIGH] {} - {}", context, self),
            ErrorSeverity::Medium => warn!("[MEDIUM] {} - {}", context, self),
            ErrorSeverity::Low => info!("[LOW] {} - {}", context, self),
        }
    }

    /// True for failures caused by the caller's input rather than the backend.
    pub fn is_caller_error(&self) -> bool {
        self.severity() == ErrorSeverity::Medium
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Critical, // backend unavailable
    High,     // statement or configuration failure
    Medium,   // invalid input
    Low,      // lookups that simply missed
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RepositoryError::PoolExhausted(err.to_string())
            }
            sqlx::Error::Configuration(e) => RepositoryError::Config(e.to_string()),
            sqlx::Error::Tls(e) => RepositoryError::PoolExhausted(e.to_string()),
            _ => RepositoryError::Query(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for RepositoryError {
    fn from(err: redis::RedisError) -> Self {
        RepositoryError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Codec(err.to_string())
    }
}

impl From<serde_yaml::Error> for RepositoryError {
    fn from(err: serde_yaml::Error) -> Self {
        RepositoryError::Config(err.to_string())
    }
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Io(err.to_string())
    }
}

/// Error tracking helpers
pub mod helpers {
    use super::*;

    /// Converts an `Option` into a result, logging the error on `None`.
    ///
    /// # Arguments
    /// * `option` - value to unwrap
    /// * `error` - error returned when the value is absent
    pub fn map_option_error<T>(option: Option<T>, error: RepositoryError) -> DbResult<T> {
        option.ok_or_else(|| {
            error.log("Option to Error");
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_levels() {
        assert_eq!(
            RepositoryError::PoolExhausted("down".into()).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            RepositoryError::Query("syntax".into()).severity(),
            ErrorSeverity::High
        );
        assert!(RepositoryError::ConditionRequired("delete".into()).is_caller_error());
        assert!(!RepositoryError::TemplateNotFound("x.y".into()).is_caller_error());
    }

    #[test]
    fn test_display_names_the_field() {
        let err = RepositoryError::MissingRequiredParameter("user_id".into());
        assert_eq!(err.to_string(), "required parameter is missing: user_id");
    }

    #[test]
    fn test_map_option_error() {
        let missing: Option<u8> = None;
        let err = helpers::map_option_error(missing, RepositoryError::EntityRequired("id".into()))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::EntityRequired(_)));
        assert_eq!(helpers::map_option_error(Some(3), RepositoryError::Io("x".into())).unwrap(), 3);
    }
}
