//! Database Module
//!
//! This module provides the thread-scoped database access layer, organized
//! into focused submodules:
//!
//! - **Driver Interface** (`driver.rs`): traits a database driver implements, connect parameters, placeholder styles
//! - **SQLite Driver** (`sqlite.rs`): the rusqlite-backed driver
//! - **Engine** (`engine.rs`): the process-wide connection factory and its one-time cell
//! - **Connection Management** (`connection.rs`): lazy connections, per-context state, connection scopes
//! - **Transactions** (`transaction.rs`): nested transaction scopes
//! - **Query Execution** (`query.rs`): the query and mutation executors
//! - **Rows** (`row.rs`): the mapping type every query returns
//!
//! ## Error Handling
//!
//! All operations use the crate-wide `DbError` type. Driver errors are passed
//! through unchanged; connections are released on every exit path.
pub mod connection;
pub mod driver;
pub mod engine;
pub mod profiling;
pub mod query;
pub mod row;
pub mod sqlite;
pub mod transaction;
pub mod value;

pub use connection::*;
pub use driver::*;
pub use engine::*;
pub use query::*;
pub use row::*;
pub use sqlite::SqliteConnector;
pub use transaction::*;
pub use value::*;
