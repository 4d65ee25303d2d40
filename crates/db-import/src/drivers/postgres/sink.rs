//! PostgreSQL destination.
//!
//! Creates one table per imported source table and inserts rows with a
//! prepared statement per table. Rows are written as they arrive; there is no
//! enclosing transaction.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Statement};
use tracing::{debug, info};

use super::dialect::server_message;
use super::tls;
use crate::config::DestinationConfig;
use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::{ColumnSchema, ColumnType, SinkError, TableSchema, TableSink, Value};
use crate::error::{MigrateError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

type Param = Box<dyn ToSql + Sync + Send>;

/// [`TableSink`] writing into a PostgreSQL schema.
pub struct PostgresSink {
    client: Client,
    connection: JoinHandle<()>,
    schema: String,
    inserts: HashMap<String, Statement>,
}

impl PostgresSink {
    /// Connect to the destination database and make sure its schema exists.
    pub async fn connect(config: &DestinationConfig) -> Result<Self> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .password(&config.password)
            .connect_timeout(CONNECT_TIMEOUT);
        let target = format!(
            "destination {}:{}/{}",
            config.host, config.port, config.database
        );
        let (client, connection) = tls::connect(&pg, config.ssl_mode, &target).await?;

        let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_pg(&config.schema)?);
        client.batch_execute(&create_schema).await.map_err(|e| {
            MigrateError::connection_with(
                format!("could not create schema {}", config.schema),
                server_message(&e),
            )
        })?;

        info!(
            "Connected to destination: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );
        Ok(Self {
            client,
            connection,
            schema: config.schema.clone(),
            inserts: HashMap::new(),
        })
    }

    /// Close the connection.
    pub async fn close(self) {
        drop(self.client);
        let _ = self.connection.await;
    }

    async fn insert_statement(
        &mut self,
        schema: &TableSchema,
    ) -> std::result::Result<Statement, SinkError> {
        if let Some(statement) = self.inserts.get(&schema.name) {
            return Ok(statement.clone());
        }
        let sql = insert_sql(&self.schema, schema)?;
        let statement = self
            .client
            .prepare(&sql)
            .await
            .map_err(|e| sink_error(format!("could not prepare insert into {}", schema.name), &e))?;
        self.inserts.insert(schema.name.clone(), statement.clone());
        Ok(statement)
    }
}

fn sink_error(message: String, e: &tokio_postgres::Error) -> SinkError {
    SinkError::new(message).with_server_message(server_message(e))
}

fn identifier_error(e: MigrateError) -> SinkError {
    SinkError::new(e.to_string())
}

/// PostgreSQL column type for a destination column.
pub(crate) fn pg_type(column: &ColumnSchema) -> String {
    match column.column_type {
        ColumnType::Byte | ColumnType::ShortInteger => "smallint".to_string(),
        ColumnType::Integer => "integer".to_string(),
        ColumnType::BigInteger => "bigint".to_string(),
        ColumnType::Boolean => "boolean".to_string(),
        ColumnType::Date => "date".to_string(),
        ColumnType::DateTime => "timestamp".to_string(),
        ColumnType::Time => "time".to_string(),
        ColumnType::Float => "real".to_string(),
        ColumnType::Double => "double precision".to_string(),
        ColumnType::Text => match column.max_length {
            Some(len) if len > 0 => format!("varchar({})", len),
            _ => "text".to_string(),
        },
        ColumnType::LongText | ColumnType::Unknown => "text".to_string(),
        ColumnType::Blob => "bytea".to_string(),
    }
}

/// `CREATE TABLE` statement for `table` in `schema`.
pub(crate) fn create_table_sql(schema: &str, table: &TableSchema) -> Result<String> {
    let mut defs = Vec::with_capacity(table.columns.len() + 1);
    for col in &table.columns {
        let mut def = format!("{} {}", quote_pg(&col.name)?, pg_type(col));
        if col.auto_increment && col.column_type.is_integer() {
            def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        if !col.nullable {
            def.push_str(" NOT NULL");
        }
        defs.push(def);
    }

    let pk = table.primary_key();
    if !pk.is_empty() {
        let cols = pk
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?;
        defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        qualify_pg(schema, &table.name)?,
        defs.join(",\n    ")
    ))
}

fn insert_sql(schema: &str, table: &TableSchema) -> std::result::Result<String, SinkError> {
    let cols = table
        .columns
        .iter()
        .map(|c| quote_pg(&c.name))
        .collect::<Result<Vec<_>>>()
        .map_err(identifier_error)?;
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("${}", i)).collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualify_pg(schema, &table.name).map_err(identifier_error)?,
        cols.join(", "),
        placeholders.join(", ")
    ))
}

/// Statement parameter for `value` in a column of type `column_type`.
pub(crate) fn to_param(
    value: Value,
    column: &ColumnSchema,
) -> std::result::Result<Param, SinkError> {
    let mismatch = |v: &Value| {
        SinkError::new(format!(
            "value {:?} does not fit column {} of type {}",
            v, column.name, column.column_type
        ))
    };

    let param: Param = match (column.column_type, value) {
        (ColumnType::Byte | ColumnType::ShortInteger, Value::Null) => Box::new(None::<i16>),
        (ColumnType::Integer, Value::Null) => Box::new(None::<i32>),
        (ColumnType::BigInteger, Value::Null) => Box::new(None::<i64>),
        (ColumnType::Boolean, Value::Null) => Box::new(None::<bool>),
        (ColumnType::Date, Value::Null) => Box::new(None::<chrono::NaiveDate>),
        (ColumnType::DateTime, Value::Null) => Box::new(None::<chrono::NaiveDateTime>),
        (ColumnType::Time, Value::Null) => Box::new(None::<chrono::NaiveTime>),
        (ColumnType::Float, Value::Null) => Box::new(None::<f32>),
        (ColumnType::Double, Value::Null) => Box::new(None::<f64>),
        (ColumnType::Blob, Value::Null) => Box::new(None::<Vec<u8>>),
        (_, Value::Null) => Box::new(None::<String>),

        (ColumnType::Byte | ColumnType::ShortInteger, Value::Int64(v)) => {
            Box::new(i16::try_from(v).map_err(|_| mismatch(&Value::Int64(v)))?)
        }
        (ColumnType::Integer, Value::Int64(v)) => {
            Box::new(i32::try_from(v).map_err(|_| mismatch(&Value::Int64(v)))?)
        }
        (ColumnType::BigInteger, Value::Int64(v)) => Box::new(v),
        (ColumnType::Boolean, Value::Bool(v)) => Box::new(v),
        (ColumnType::Float, Value::Float64(v)) => Box::new(v as f32),
        (ColumnType::Double, Value::Float64(v)) => Box::new(v),
        (ColumnType::Float, Value::Int64(v)) => Box::new(v as f32),
        (ColumnType::Double, Value::Int64(v)) => Box::new(v as f64),
        (ColumnType::Date, Value::Date(v)) => Box::new(v),
        (ColumnType::DateTime, Value::DateTime(v)) => Box::new(v),
        (ColumnType::Time, Value::Time(v)) => Box::new(v),
        (ColumnType::Blob, Value::Bytes(v)) => Box::new(v),
        (ColumnType::Blob, Value::Text(v)) => Box::new(v.into_bytes()),
        (ColumnType::Text | ColumnType::LongText | ColumnType::Unknown, value) => {
            Box::new(value_to_text(value))
        }
        (_, other) => return Err(mismatch(&other)),
    };
    Ok(param)
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Int64(v) => Some(v.to_string()),
        Value::Float64(v) => Some(v.to_string()),
        Value::Text(v) => Some(v),
        Value::Bytes(v) => Some(String::from_utf8_lossy(&v).into_owned()),
        Value::Bool(v) => Some(v.to_string()),
        Value::DateTime(v) => Some(v.to_string()),
        Value::Date(v) => Some(v.to_string()),
        Value::Time(v) => Some(v.to_string()),
    }
}

#[async_trait]
impl TableSink for PostgresSink {
    async fn create_table(&mut self, schema: &TableSchema) -> std::result::Result<(), SinkError> {
        let sql = create_table_sql(&self.schema, schema).map_err(identifier_error)?;
        debug!("Creating destination table: {}", sql);
        self.client
            .batch_execute(&sql)
            .await
            .map_err(|e| sink_error(format!("could not create table {}", schema.name), &e))?;
        Ok(())
    }

    async fn insert_row(
        &mut self,
        schema: &TableSchema,
        values: Vec<Value>,
    ) -> std::result::Result<(), SinkError> {
        if values.len() != schema.columns.len() {
            return Err(SinkError::new(format!(
                "expected {} values for {}, got {}",
                schema.columns.len(),
                schema.name,
                values.len()
            )));
        }
        let statement = self.insert_statement(schema).await?;

        let params = values
            .into_iter()
            .zip(&schema.columns)
            .map(|(value, column)| to_param(value, column))
            .collect::<std::result::Result<Vec<Param>, SinkError>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.client
            .execute(&statement, &refs)
            .await
            .map_err(|e| sink_error(format!("could not insert into {}", schema.name), &e))?;
        Ok(())
    }
}
