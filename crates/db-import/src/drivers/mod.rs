//! Source drivers and the PostgreSQL destination.
//!
//! - [`sql`]: [`SqlMigrationDriver`], one [`MigrationDriver`] implementation
//!   for every SQL engine, parameterized by a [`SqlDialect`]
//! - [`postgres`]: PostgreSQL dialect (tokio-postgres) and [`PostgresSink`]
//! - [`mysql`]: MySQL/MariaDB dialect (SQLx)
//! - [`tsv`]: tab-separated text files, implementing [`MigrationDriver`]
//!   directly
//!
//! # Adding a Source
//!
//! SQL engines only need a new [`SqlDialect`]. Anything else implements
//! [`MigrationDriver`] itself. Either way, register a plugin for it in
//! [`BuiltinPlugins`](crate::registry::BuiltinPlugins) or hand one to the
//! registry through a custom [`PluginLoader`](crate::registry::PluginLoader).
//!
//! [`MigrationDriver`]: crate::core::MigrationDriver

pub mod mysql;
pub mod postgres;
pub mod sql;
pub mod tsv;

#[cfg(test)]
pub(crate) mod testing;

pub use mysql::MysqlDialect;
pub use postgres::{PostgresDialect, PostgresSink};
pub use sql::{SqlDialect, SqlMigrationDriver};
pub use tsv::TsvMigrationDriver;
