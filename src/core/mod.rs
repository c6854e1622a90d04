//! Core Module
//!
//! The database access layer and the error type shared by the whole crate.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, DriverError, Result};
