//! SQL identifier validation and quoting.
//!
//! PostgreSQL does not allow parameter binding for identifiers in DDL, so
//! database, role, schema and table names end up interpolated into
//! statements. Every call site must route names through [`validate_ident`]
//! and [`quote_ident`] before interpolation.

use crate::errors::{AppError, AppResult};

/// Maximum identifier length accepted (PostgreSQL's NAMEDATALEN - 1).
const MAX_IDENT_LEN: usize = 63;

/// Validates an identifier against the allow-list character set.
///
/// Accepted: first character ASCII alphabetic or `_`, remainder ASCII
/// alphanumeric, `_` or `$`, total length 1..=63.
pub fn validate_ident(name: &str) -> AppResult<()> {
    if name.is_empty() || name.len() > MAX_IDENT_LEN {
        return Err(AppError::Validation(format!(
            "identifier '{name}' must be 1-{MAX_IDENT_LEN} characters"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('\0');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(AppError::Validation(format!(
            "identifier '{name}' must start with a letter or underscore"
        )));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$')) {
        return Err(AppError::Validation(format!(
            "identifier '{name}' contains forbidden character '{bad}'"
        )));
    }
    Ok(())
}

/// Validates and double-quotes an identifier for safe interpolation.
pub fn quote_ident(name: &str) -> AppResult<String> {
    validate_ident(name)?;
    // The allow-list excludes double quotes, so plain wrapping is enough.
    Ok(format!("\"{name}\""))
}

/// Quotes a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_are_accepted() {
        for name in ["appdb", "my_table", "_internal", "t1", "col$2"] {
            assert!(validate_ident(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn injection_attempts_are_rejected() {
        for name in [
            "app; DROP DATABASE postgres",
            "app\"db",
            "app'db",
            "app db",
            "1table",
            "",
            "app--",
        ] {
            assert!(validate_ident(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn overlong_identifiers_are_rejected() {
        let name = "a".repeat(64);
        assert!(validate_ident(&name).is_err());
        assert!(validate_ident(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn quote_ident_wraps_in_double_quotes() {
        assert_eq!(quote_ident("appdb").unwrap(), "\"appdb\"");
    }

    #[test]
    fn quote_literal_doubles_single_quotes() {
        assert_eq!(quote_literal("pa'ss"), "'pa''ss'");
        assert_eq!(quote_literal("plain"), "'plain'");
    }
}
