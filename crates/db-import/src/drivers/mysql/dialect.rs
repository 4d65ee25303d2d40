//! MySQL/MariaDB source dialect.
//!
//! Uses a single-connection SQLx pool. Rows are streamed over the text
//! protocol so every field arrives in its textual encoding.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column, Executor, Row, TypeInfo};
use tracing::info;

use crate::config::SourceConfig;
use crate::core::identifier::quote_mysql;
use crate::core::{ColumnType, RawRecord, RecordCursor};
use crate::drivers::sql::{ColumnConstraints, DescribedColumn, SqlDialect};
use crate::error::{MigrateError, Result};

/// Timeout for acquiring the source connection.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_PORT: u16 = 3306;

const LIST_TABLES_QUERY: &str = "SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME \
     FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_NAME";

// CAST to CHAR and SIGNED to avoid collation and unsigned decoding differences.
const COLUMN_CONSTRAINTS_QUERY: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
        CAST(CASE
            WHEN CHARACTER_MAXIMUM_LENGTH IS NULL THEN 0
            WHEN CHARACTER_MAXIMUM_LENGTH > 2147483647 THEN -1
            ELSE CHARACTER_MAXIMUM_LENGTH
        END AS SIGNED) AS max_length,
        IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
        IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_identity,
        IF(COLUMN_KEY = 'PRI', 1, 0) AS is_pk
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

fn server_message(e: &sqlx::Error) -> String {
    e.as_database_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| e.to_string())
}

/// MySQL dialect over an SQLx pool.
#[derive(Debug, Default)]
pub struct MysqlDialect {
    pool: Option<MySqlPool>,
}

impl MysqlDialect {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self) -> Result<&MySqlPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| MigrateError::connection("not connected to MySQL source"))
    }
}

#[async_trait]
impl SqlDialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn list_tables_query(&self) -> String {
        LIST_TABLES_QUERY.to_string()
    }

    fn map_type(&self, type_name: &str) -> ColumnType {
        match type_name.to_uppercase().as_str() {
            "TINYINT" | "TINYINT UNSIGNED" => ColumnType::Byte,
            "SMALLINT" | "YEAR" => ColumnType::ShortInteger,
            "SMALLINT UNSIGNED" | "MEDIUMINT" | "MEDIUMINT UNSIGNED" | "INT" => {
                ColumnType::Integer
            }
            "INT UNSIGNED" | "BIGINT" => ColumnType::BigInteger,
            "BOOLEAN" => ColumnType::Boolean,
            "FLOAT" => ColumnType::Float,
            "DOUBLE" | "DECIMAL" => ColumnType::Double,
            "DATE" => ColumnType::Date,
            "TIME" => ColumnType::Time,
            "DATETIME" | "TIMESTAMP" => ColumnType::DateTime,
            "CHAR" | "VARCHAR" | "ENUM" | "SET" => ColumnType::Text,
            "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "JSON" => ColumnType::LongText,
            "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
                ColumnType::Blob
            }
            // BIGINT UNSIGNED does not fit a signed destination column.
            _ => ColumnType::Unknown,
        }
    }

    fn is_connected(&self) -> bool {
        self.pool.as_ref().is_some_and(|p| !p.is_closed())
    }

    async fn connect(&mut self, source: &SourceConfig) -> Result<()> {
        let host = source.host.as_deref().unwrap_or("localhost");
        let port = source.port.unwrap_or(DEFAULT_PORT);

        let mut options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .ssl_mode(MySqlSslMode::Preferred);
        if let Some(database) = &source.database {
            options = options.database(database);
        }
        if let Some(user) = &source.user {
            options = options.username(user);
        }
        if let Some(password) = &source.password {
            options = options.password(password);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| {
                MigrateError::connection_with(
                    format!("could not connect to MySQL at {}:{}", host, port),
                    server_message(&e),
                )
            })?;

        info!("Connected to MySQL source: {}:{}", host, port);
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }

    async fn describe(&mut self, sql: &str) -> Result<Vec<DescribedColumn>> {
        let pool = self.pool()?;
        let described = pool
            .describe(sql)
            .await
            .map_err(|e| MigrateError::schema_with("could not describe query", server_message(&e)))?;
        Ok(described
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| DescribedColumn {
                name: c.name().to_string(),
                type_name: c.type_info().name().to_string(),
                nullable: described.nullable(i),
            })
            .collect())
    }

    async fn open_cursor<'a>(
        &'a mut self,
        sql: &'a str,
        context: &str,
    ) -> Result<Box<dyn RecordCursor + 'a>> {
        let pool = self.pool()?;
        Ok(Box::new(MysqlCursor {
            stream: sqlx::raw_sql(sql).fetch(pool),
            context: context.to_string(),
        }))
    }

    async fn column_constraints(
        &mut self,
        table: &str,
    ) -> Result<HashMap<String, ColumnConstraints>> {
        let rows: Vec<MySqlRow> = sqlx::query(COLUMN_CONSTRAINTS_QUERY)
            .bind(table)
            .fetch_all(self.pool()?)
            .await
            .map_err(|e| {
                MigrateError::schema_with(
                    format!("could not read constraints of {}", table),
                    server_message(&e),
                )
            })?;

        let read = |e: sqlx::Error| {
            MigrateError::schema_with("unexpected catalog row", server_message(&e))
        };
        let mut constraints = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("COLUMN_NAME").map_err(read)?;
            let max_length: i64 = row.try_get("max_length").map_err(read)?;
            constraints.insert(
                name.to_lowercase(),
                ColumnConstraints {
                    nullable: row.try_get::<i64, _>("is_nullable").map_err(read)? == 1,
                    primary_key: row.try_get::<i64, _>("is_pk").map_err(read)? == 1,
                    auto_increment: row.try_get::<i64, _>("is_identity").map_err(read)? == 1,
                    max_length: u32::try_from(max_length).ok().filter(|&l| l > 0),
                },
            );
        }
        Ok(constraints)
    }
}

/// Rows of a text-protocol query.
struct MysqlCursor<'a> {
    stream: BoxStream<'a, std::result::Result<MySqlRow, sqlx::Error>>,
    context: String,
}

#[async_trait]
impl RecordCursor for MysqlCursor<'_> {
    async fn next_record(&mut self) -> Result<Option<RawRecord>> {
        let Some(row) = self.stream.next().await else {
            return Ok(None);
        };
        let row = row.map_err(|e| {
            MigrateError::copy_with(&self.context, "could not fetch row", Some(server_message(&e)))
        })?;

        let mut fields = Vec::with_capacity(row.len());
        for i in 0..row.len() {
            let field: Option<&[u8]> = row.try_get_unchecked(i).map_err(|e| {
                MigrateError::copy_with(
                    &self.context,
                    format!("could not read column {}", i),
                    Some(server_message(&e)),
                )
            })?;
            fields.push(field.map(<[u8]>::to_vec));
        }
        Ok(Some(RawRecord::new(fields)))
    }
}
