//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: source dialect used by the SQL driver
//! - [`PostgresSink`]: destination that creates tables and inserts rows

mod dialect;
mod sink;
mod tls;

#[cfg(test)]
pub(crate) use dialect::decode_bytea_hex;
pub use dialect::PostgresDialect;
pub use sink::PostgresSink;
