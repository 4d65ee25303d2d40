//! Source to destination schema translation.

use std::collections::HashSet;

use crate::core::identifier::{to_identifier, unique_name};
use crate::core::TableSchema;
use crate::error::Result;

/// Turns a source table schema into the schema created in the destination.
///
/// Implementations must be pure: the same input always gives the same output.
pub trait SchemaTranslator: Send + Sync {
    fn translate(&self, source: &TableSchema) -> Result<TableSchema>;
}

/// Makes table and column names valid plain identifiers.
///
/// The table caption keeps the source spelling. Column names that collide
/// after normalization get a numeric suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierTranslator;

impl SchemaTranslator for IdentifierTranslator {
    fn translate(&self, source: &TableSchema) -> Result<TableSchema> {
        let mut table = TableSchema::new(to_identifier(&source.name).to_lowercase());
        table.caption = source.caption.clone();

        let mut taken = HashSet::new();
        for column in &source.columns {
            let base = to_identifier(&column.name).to_lowercase();
            let name = unique_name(&base, |n| taken.contains(n));
            taken.insert(name.clone());

            let mut translated = column.clone();
            translated.name = name;
            table.add_column(translated)?;
        }
        Ok(table)
    }
}
