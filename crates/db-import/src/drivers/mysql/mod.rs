//! MySQL/MariaDB source driver, built on SQLx.
//!
//! Supports MySQL 5.7+, 8.0+ and MariaDB 10.2+.

mod dialect;

pub use dialect::MysqlDialect;
