//! Caller-driven type resolution for columns a driver cannot type.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{MigrateError, Result};

use super::schema::ColumnType;

/// Decides the destination type of a column the driver could not map.
///
/// Called with the qualified `table.column` name. Any closure of the shape
/// `Fn(&str) -> Result<ColumnType, String>` is a resolver.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, qualified_column: &str) -> std::result::Result<ColumnType, String>;
}

impl<F> TypeResolver for F
where
    F: Fn(&str) -> std::result::Result<ColumnType, String> + Send + Sync,
{
    fn resolve(&self, qualified_column: &str) -> std::result::Result<ColumnType, String> {
        self(qualified_column)
    }
}

/// Resolves every ambiguous column to the same type.
#[derive(Debug, Clone, Copy)]
pub struct FixedTypeResolver(pub ColumnType);

impl TypeResolver for FixedTypeResolver {
    fn resolve(&self, _qualified_column: &str) -> std::result::Result<ColumnType, String> {
        Ok(self.0)
    }
}

/// Refuses every ambiguous column.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectUnknownTypes;

impl TypeResolver for RejectUnknownTypes {
    fn resolve(&self, qualified_column: &str) -> std::result::Result<ColumnType, String> {
        Err(format!("no type given for {}", qualified_column))
    }
}

/// Per-job memo of resolver answers, keyed by lower-cased `(table, column)`.
#[derive(Debug, Default)]
pub struct TypeCache {
    answers: HashMap<(String, String), ColumnType>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all answers. Called when a new job connects.
    pub fn clear(&mut self) {
        self.answers.clear();
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Return the cached type for the column, asking `resolver` on first use.
    ///
    /// Failed or `Unknown` answers are not cached.
    pub fn resolve(
        &mut self,
        table: &str,
        column: &str,
        resolver: &dyn TypeResolver,
    ) -> Result<ColumnType> {
        let key = (table.to_lowercase(), column.to_lowercase());
        if let Some(ty) = self.answers.get(&key) {
            return Ok(*ty);
        }

        let qualified = format!("{}.{}", table, column);
        let ty = resolver
            .resolve(&qualified)
            .map_err(|message| MigrateError::TypeResolution {
                column: qualified.clone(),
                message,
            })?;
        if !ty.is_known() {
            return Err(MigrateError::TypeResolution {
                column: qualified,
                message: "resolver returned an unknown type".to_string(),
            });
        }

        debug!("Resolved type of {} to {}", qualified, ty);
        self.answers.insert(key, ty);
        Ok(ty)
    }
}
