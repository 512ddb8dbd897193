//! Validation utilities.

pub mod identifier;
pub mod password;

pub use identifier::{quote_ident, quote_literal, validate_ident};
