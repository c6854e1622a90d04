//! # transwarp
//!
//! A thread-scoped database access layer: lazily acquired connections, nested
//! transaction scopes that commit or roll back at the outermost level, and a
//! small SQL surface returning rows as [`RowMapping`]s.
//!
//! ```
//! use transwarp::{args, ConnectParams, EngineCell, SqliteConnector};
//!
//! # fn main() -> transwarp::Result<()> {
//! let cell = EngineCell::new();
//! let engine = cell.init(ConnectParams::new("", "", ":memory:"), SqliteConnector)?;
//! let mut ctx = engine.context();
//!
//! ctx.with_connection(|ctx| {
//!     ctx.execute("create table users (id text primary key, name text)", &[])?;
//!     ctx.transaction(|tx| {
//!         tx.insert("users", [("id", "u1"), ("name", "Bob")])?;
//!         tx.insert("users", [("id", "u2"), ("name", "Ann")])
//!     })?;
//!
//!     let bob = ctx.query_one("select * from users where id=?", &args!["u1"])?.unwrap();
//!     assert_eq!(bob.get_as::<String>("name")?, "Bob");
//!     let n: i64 = ctx.query_scalar_as("select count(*) from users", &[])?;
//!     assert_eq!(n, 2);
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

// Core infrastructure modules
pub mod core;

pub mod config;
pub mod ids;
pub mod local;
pub mod test_utils;

pub use crate::core::db::{
    create_engine, ConnectParams, ConnectionScope, Connector, Cursor, Engine, EngineCell,
    IntoValue, LazyConnection, OptionValue, ParamStyle, PhysicalConnection, RowMapping,
    SqliteConnector, StatementType, ThreadContext, TransactionScope, Value, ENGINE,
};
pub use crate::core::{DbError, DriverError, Result};
pub use ids::next_id;
