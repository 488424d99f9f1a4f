//! Identifier validation for collections, query names and fields.
//!
//! Every user-supplied name passes through here before it reaches planning,
//! the registry, or storage. Names are plain SQL identifiers restricted to
//! `[A-Za-z0-9_]`; a leading underscore is reserved for system-internal
//! collections (materialized query tables, internal event streams).

use crate::error::{Result, SqlError};

/// Maximum length of a collection or field identifier.
pub const MAX_IDENTIFIER_LENGTH: usize = 100;

/// Validate a user-supplied collection or continuous query name.
pub fn check_collection(name: &str) -> Result<()> {
    check_charset(name)?;
    if name.starts_with('_') {
        return Err(SqlError::InvalidIdentifier(format!(
            "{name}: names starting with an underscore are reserved for system collections"
        )));
    }
    Ok(())
}

/// Validate a column or dimension identifier.
///
/// Unlike collections, a leading underscore is allowed here: system fields
/// such as `_actor` and `_time` are legal column references.
pub fn check_field(name: &str) -> Result<()> {
    check_charset(name)
}

fn check_charset(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SqlError::InvalidIdentifier("identifier is empty".to_string()));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SqlError::InvalidIdentifier(format!(
            "{name}: identifier exceeds {MAX_IDENTIFIER_LENGTH} characters"
        )));
    }
    if let Some(c) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(SqlError::InvalidIdentifier(format!(
            "{name}: character {c:?} is not allowed in identifiers"
        )));
    }
    Ok(())
}
