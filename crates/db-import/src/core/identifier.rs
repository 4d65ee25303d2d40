//! Identifier validation, quoting and normalization.
//!
//! SQL identifiers (table names, column names) cannot be passed as statement
//! parameters, so every dynamic statement built by the drivers and the sink
//! quotes them through this module.

use crate::error::{MigrateError, Result};

/// Longest name accepted in quoted SQL. MySQL allows 64 characters; longer
/// PostgreSQL names are truncated by the server.
const MAX_QUOTED_LENGTH: usize = 128;

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1).
const MAX_PLAIN_LENGTH: usize = 63;

/// Check that `name` can be spliced into SQL once quoted.
pub fn validate_identifier(name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        "is empty"
    } else if name.contains('\0') {
        "contains a NUL character"
    } else if name.len() > MAX_QUOTED_LENGTH {
        "is too long"
    } else {
        return Ok(());
    };
    Err(MigrateError::schema(format!("identifier {:?} {}", name, problem)))
}

/// Double-quoted PostgreSQL identifier.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    let escaped = name.replace('"', "\"\"");
    Ok(format!("\"{escaped}\""))
}

/// Backtick-quoted MySQL identifier.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    let escaped = name.replace('`', "``");
    Ok(format!("`{escaped}`"))
}

/// `"schema"."table"`.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    let schema = quote_pg(schema)?;
    let table = quote_pg(table)?;
    Ok(format!("{schema}.{table}"))
}

/// Turn an arbitrary name into a plain identifier.
///
/// Letters, digits and underscores are kept; runs of anything else become a
/// single underscore. A leading digit gets an underscore prefix and an empty
/// result becomes `"_"`. The result is cut to 63 bytes on a character
/// boundary.
pub fn to_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }

    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }

    while out.len() > MAX_PLAIN_LENGTH {
        out.pop();
    }
    out
}

/// `base`, or `base_2`, `base_3`, ... for the first one not `taken`.
pub fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut name = base.to_string();
    let mut n = 2;
    while taken(&name) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    name
}
