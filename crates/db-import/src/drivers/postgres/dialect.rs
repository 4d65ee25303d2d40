//! PostgreSQL source dialect.
//!
//! Rows are streamed with the simple query protocol, which returns every
//! field in its text encoding; conversion to destination types happens in the
//! shared copy loop.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, SimpleQueryMessage, SimpleQueryStream};
use tracing::debug;

use crate::config::SourceConfig;
use crate::core::identifier::quote_pg;
use crate::core::{ColumnType, RawRecord, RecordCursor};
use crate::drivers::sql::{BlobDecoder, ColumnConstraints, DescribedColumn, SqlDialect};
use crate::error::{MigrateError, Result};

/// Connection timeout for source connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_PORT: u16 = 5432;

const LIST_TABLES_QUERY: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const COLUMN_CONSTRAINTS_QUERY: &str = r#"
    SELECT
        c.column_name::text AS column_name,
        (c.is_nullable = 'YES') AS is_nullable,
        c.character_maximum_length::int4 AS max_length,
        (c.is_identity = 'YES' OR COALESCE(c.column_default, '') LIKE 'nextval(%') AS is_identity,
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
             AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND tc.table_schema = c.table_schema
              AND tc.table_name = c.table_name
              AND kcu.column_name = c.column_name
        ) AS is_pk
    FROM information_schema.columns c
    WHERE c.table_schema = current_schema() AND c.table_name::text = $1
    ORDER BY c.ordinal_position
"#;

/// Message reported by the server, or the client error text.
pub(crate) fn server_message(e: &tokio_postgres::Error) -> String {
    e.as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| e.to_string())
}

/// Decode a `bytea` field in hex output format (`\x4142`).
///
/// Anything else, including the pre-9.0 escape format, yields `None`.
pub(crate) fn decode_bytea_hex(text: &[u8]) -> Option<Vec<u8>> {
    let hex = text.strip_prefix(b"\\x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.chunks_exact(2)
        .map(|pair| {
            let hi = char::from(pair[0]).to_digit(16)?;
            let lo = char::from(pair[1]).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}

/// PostgreSQL dialect over a single tokio-postgres connection.
#[derive(Default)]
pub struct PostgresDialect {
    client: Option<Client>,
    connection: Option<JoinHandle<()>>,
}

impl PostgresDialect {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::connection("not connected to PostgreSQL source"))
    }
}

#[async_trait]
impl SqlDialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn list_tables_query(&self) -> String {
        LIST_TABLES_QUERY.to_string()
    }

    fn blob_decoder(&self) -> Option<BlobDecoder> {
        Some(decode_bytea_hex)
    }

    fn map_type(&self, type_name: &str) -> ColumnType {
        match type_name.to_lowercase().as_str() {
            "int2" => ColumnType::ShortInteger,
            "int4" | "oid" => ColumnType::Integer,
            "int8" => ColumnType::BigInteger,
            "bool" => ColumnType::Boolean,
            "float4" => ColumnType::Float,
            "float8" | "numeric" => ColumnType::Double,
            "date" => ColumnType::Date,
            "timestamp" | "timestamptz" => ColumnType::DateTime,
            "time" | "timetz" => ColumnType::Time,
            "varchar" | "bpchar" | "char" | "name" | "uuid" => ColumnType::Text,
            "text" | "json" | "jsonb" | "xml" => ColumnType::LongText,
            "bytea" => ColumnType::Blob,
            _ => ColumnType::Unknown,
        }
    }

    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    async fn connect(&mut self, source: &SourceConfig) -> Result<()> {
        let host = source.host.as_deref().unwrap_or("localhost");
        let port = source.port.unwrap_or(DEFAULT_PORT);

        let mut config = tokio_postgres::Config::new();
        config.host(host);
        config.port(port);
        config.connect_timeout(CONNECT_TIMEOUT);
        if let Some(database) = &source.database {
            config.dbname(database);
        }
        if let Some(user) = &source.user {
            config.user(user);
        }
        if let Some(password) = &source.password {
            config.password(password);
        }

        let target = format!("source {}:{}", host, port);
        let (client, handle) = super::tls::connect(&config, source.ssl_mode, &target).await?;

        self.client = Some(client);
        self.connection = Some(handle);
        debug!("Connected to PostgreSQL source {}:{}", host, port);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        // Dropping the client ends the connection task.
        self.client = None;
        if let Some(handle) = self.connection.take() {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn describe(&mut self, sql: &str) -> Result<Vec<DescribedColumn>> {
        let statement = self
            .client()?
            .prepare(sql)
            .await
            .map_err(|e| MigrateError::schema_with("could not describe query", server_message(&e)))?;
        Ok(statement
            .columns()
            .iter()
            .map(|c| DescribedColumn {
                name: c.name().to_string(),
                type_name: c.type_().name().to_string(),
                nullable: None,
            })
            .collect())
    }

    async fn open_cursor<'a>(
        &'a mut self,
        sql: &'a str,
        context: &str,
    ) -> Result<Box<dyn RecordCursor + 'a>> {
        let stream = self.client()?.simple_query_raw(sql).await.map_err(|e| {
            MigrateError::copy_with(context, "query failed", Some(server_message(&e)))
        })?;
        Ok(Box::new(PostgresCursor {
            stream: Box::pin(stream),
            context: context.to_string(),
        }))
    }

    async fn column_constraints(
        &mut self,
        table: &str,
    ) -> Result<HashMap<String, ColumnConstraints>> {
        let rows = self
            .client()?
            .query(COLUMN_CONSTRAINTS_QUERY, &[&table])
            .await
            .map_err(|e| {
                MigrateError::schema_with(
                    format!("could not read constraints of {}", table),
                    server_message(&e),
                )
            })?;

        let mut constraints = HashMap::with_capacity(rows.len());
        for row in rows {
            let read = |e: tokio_postgres::Error| {
                MigrateError::schema_with("unexpected catalog row", server_message(&e))
            };
            let name: String = row.try_get("column_name").map_err(read)?;
            let max_length: Option<i32> = row.try_get("max_length").map_err(read)?;
            constraints.insert(
                name.to_lowercase(),
                ColumnConstraints {
                    nullable: row.try_get("is_nullable").map_err(read)?,
                    primary_key: row.try_get("is_pk").map_err(read)?,
                    auto_increment: row.try_get("is_identity").map_err(read)?,
                    max_length: max_length.and_then(|l| u32::try_from(l).ok()),
                },
            );
        }
        Ok(constraints)
    }
}

/// Text-encoded rows of a simple query.
struct PostgresCursor {
    stream: Pin<Box<SimpleQueryStream>>,
    context: String,
}

#[async_trait]
impl RecordCursor for PostgresCursor {
    async fn next_record(&mut self) -> Result<Option<RawRecord>> {
        while let Some(message) = self.stream.next().await {
            let message = message.map_err(|e| {
                MigrateError::copy_with(&self.context, "could not fetch row", Some(server_message(&e)))
            })?;
            if let SimpleQueryMessage::Row(row) = message {
                let fields = (0..row.len())
                    .map(|i| row.get(i).map(|s| s.as_bytes().to_vec()))
                    .collect();
                return Ok(Some(RawRecord::new(fields)));
            }
        }
        Ok(None)
    }
}
