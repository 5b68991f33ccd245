//! MySQL driver
//!
//! Plain-text statements over single sqlx connections. Pooling is done by
//! [`crate::service::db::core::connection::ConnectionPool`], not by sqlx.

use crate::config::settings::DataSourceConfig;
use crate::service::db::core::driver::{Driver, DriverConnection};
use crate::service::db::core::types::{ExecOutcome, Record, SqlValue};
use crate::tool::{DbResult, RepositoryError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::{debug, warn};

/// Opens connections described by a datasource section.
pub struct MySqlDriver {
    options: MySqlConnectOptions,
    target: String,
}

impl MySqlDriver {
    /// Builds connect options from the datasource url and credentials.
    ///
    /// A leading `jdbc:` on the url is accepted and ignored.
    pub fn new(config: &DataSourceConfig) -> DbResult<Self> {
        let url = config.url.trim();
        let url = url.strip_prefix("jdbc:").unwrap_or(url);

        let mut options = MySqlConnectOptions::from_str(url)
            .map_err(|e| RepositoryError::Config(format!("invalid datasource url: {}", e)))?;
        if !config.username.is_empty() {
            options = options.username(&config.username);
        }
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if let Some(driver) = &config.driver {
            debug!("datasource driver hint ignored: {}", driver);
        }

        let target = url.split('?').next().unwrap_or(url).to_string();
        Ok(Self { options, target })
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    async fn connect(&self) -> DbResult<Box<dyn DriverConnection>> {
        let conn = self.options.connect().await.map_err(|e| {
            warn!("failed to open connection to {}: {}", self.target, e);
            RepositoryError::PoolExhausted(format!("connect failed: {}", e))
        })?;
        Ok(Box::new(MySqlDriverConnection { conn }))
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

struct MySqlDriverConnection {
    conn: MySqlConnection,
}

#[async_trait]
impl DriverConnection for MySqlDriverConnection {
    async fn query(&mut self, sql: &str) -> DbResult<Vec<Record>> {
        let rows = (&mut self.conn)
            .fetch_all(sql)
            .await
            .map_err(|e| RepositoryError::Query(format!("{} ({})", e, sql)))?;
        rows.iter().map(row_to_record).collect()
    }

    async fn execute(&mut self, sql: &str) -> DbResult<ExecOutcome> {
        let result = (&mut self.conn)
            .execute(sql)
            .await
            .map_err(|e| RepositoryError::Update(format!("{} ({})", e, sql)))?;

        let last_insert_id = match result.last_insert_id() {
            0 => None,
            id => Some(id),
        };
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id,
        })
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> DbResult<()> {
        let sql = if enabled {
            "SET autocommit = 1"
        } else {
            "SET autocommit = 0"
        };
        (&mut self.conn)
            .execute(sql)
            .await
            .map_err(|e| RepositoryError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        (&mut self.conn)
            .execute("COMMIT")
            .await
            .map_err(|e| RepositoryError::Transaction(format!("commit failed: {}", e)))?;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        (&mut self.conn)
            .execute("ROLLBACK")
            .await
            .map_err(|e| RepositoryError::Transaction(format!("rollback failed: {}", e)))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        let MySqlDriverConnection { conn } = *self;
        conn.close().await?;
        Ok(())
    }
}

/// Decodes one row into `lower-case column -> value` using the column's
/// declared type.
fn row_to_record(row: &MySqlRow) -> DbResult<Record> {
    let mut record = Record::new();

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name().to_lowercase();

        let is_null = row
            .try_get_raw(index)
            .map(|raw| raw.is_null())
            .map_err(|e| RepositoryError::Query(format!("column {}: {}", name, e)))?;
        if is_null {
            record.insert(name, SqlValue::Null);
            continue;
        }

        let type_name = column.type_info().name().to_uppercase();
        let value = decode_column(row, index, &type_name)
            .map_err(|e| RepositoryError::Query(format!("column {} ({}): {}", name, type_name, e)))?;
        record.insert(name, value);
    }

    Ok(record)
}

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> Result<SqlValue, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" | "BOOL" => SqlValue::Bool(row.try_get_unchecked::<bool, _>(index)?),
        "BIT" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            SqlValue::Bool(bytes.iter().any(|b| *b != 0 && *b != b'0'))
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            SqlValue::Int(row.try_get_unchecked::<i64, _>(index)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => SqlValue::Int(row.try_get_unchecked::<u64, _>(index)? as i64),
        "FLOAT" | "DOUBLE" | "REAL" => SqlValue::Float(row.try_get_unchecked::<f64, _>(index)?),
        "DECIMAL" | "NUMERIC" => SqlValue::Decimal(row.try_get_unchecked::<String, _>(index)?),
        "DATE" => SqlValue::from(row.try_get_unchecked::<NaiveDate, _>(index)?),
        "DATETIME" | "TIMESTAMP" => {
            SqlValue::DateTime(row.try_get_unchecked::<NaiveDateTime, _>(index)?)
        }
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => SqlValue::Text(text),
            Err(_) => {
                let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datasource(url: &str) -> DataSourceConfig {
        DataSourceConfig {
            url: url.to_string(),
            username: "root".to_string(),
            password: "secret".to_string(),
            driver: None,
        }
    }

    #[test]
    fn test_jdbc_prefix_is_accepted() {
        let driver = MySqlDriver::new(&datasource("jdbc:mysql://127.0.0.1:3306/simple?useSSL=false"))
            .unwrap();
        assert_eq!(driver.describe(), "mysql://127.0.0.1:3306/simple");
    }

    #[test]
    fn test_invalid_url_is_a_config_error() {
        let err = MySqlDriver::new(&datasource("not a url")).err().unwrap();
        assert!(matches!(err, RepositoryError::Config(_)));
    }
}
