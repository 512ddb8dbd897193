//! Shared types for the PostgreSQL admin engine.
//!
//! Holds everything the engine crate and its embedders agree on:
//! configuration snapshots, the error taxonomy, connection target / metrics
//! / alert models, and the validation utilities used before any identifier
//! reaches a SQL statement.

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod utils;
