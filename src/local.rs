//! Thread-bound database context.
//!
//! Each thread gets its own [`ThreadContext`], created on first use from the
//! global [`ENGINE`]. The free functions here are the module-level form of
//! the executors on [`ThreadContext`]:
//!
//! ```no_run
//! use transwarp::{args, create_engine, local, ConnectParams, SqliteConnector};
//!
//! # fn main() -> transwarp::Result<()> {
//! create_engine(ConnectParams::new("www-data", "www-data", "awesome.db"), SqliteConnector)?;
//! local::transaction(|ctx| {
//!     ctx.insert("users", [("id", "u1"), ("name", "Bob")])?;
//!     ctx.execute("update users set admin=? where id=?", &args![true, "u1"])
//! })?;
//! let user = local::query_one("select * from users where id=?", &args!["u1"])?;
//! # Ok(())
//! # }
//! ```
//!
//! Inside a `connection` or `transaction` closure use the `ctx` handed to the
//! closure. Calling back into this module from there fails with
//! [`DbError::ContextInUse`].

use crate::core::db::connection::ThreadContext;
use crate::core::db::engine::ENGINE;
use crate::core::db::row::RowMapping;
use crate::core::db::value::{IntoValue, Value};
use crate::core::{DbError, Result};
use std::cell::RefCell;

thread_local! {
    static CONTEXT: RefCell<Option<ThreadContext>> = const { RefCell::new(None) };
}

/// Runs `f` with this thread's context.
pub fn with_thread_context<T, F>(f: F) -> Result<T>
where
    F: FnOnce(&mut ThreadContext) -> Result<T>,
{
    CONTEXT.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| DbError::ContextInUse)?;
        let ctx = match slot.take() {
            Some(ctx) => ctx,
            None => ENGINE.get()?.context(),
        };
        f(slot.insert(ctx))
    })
}

/// Runs `f` inside a connection scope on this thread's context.
pub fn connection<T, F>(f: F) -> Result<T>
where
    F: FnOnce(&mut ThreadContext) -> Result<T>,
{
    with_thread_context(|ctx| ctx.with_connection(f))
}

/// Runs `f` inside a transaction on this thread's context.
pub fn transaction<T, F>(f: F) -> Result<T>
where
    F: FnOnce(&mut ThreadContext) -> Result<T>,
{
    with_thread_context(|ctx| ctx.transaction(f))
}

pub fn query_one(sql: &str, args: &[Value]) -> Result<Option<RowMapping>> {
    with_thread_context(|ctx| ctx.query_one(sql, args))
}

pub fn query_many(sql: &str, args: &[Value]) -> Result<Vec<RowMapping>> {
    with_thread_context(|ctx| ctx.query_many(sql, args))
}

pub fn query_scalar(sql: &str, args: &[Value]) -> Result<Value> {
    with_thread_context(|ctx| ctx.query_scalar(sql, args))
}

pub fn insert<I, K, V>(table: &str, fields: I) -> Result<usize>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: IntoValue,
{
    with_thread_context(|ctx| ctx.insert(table, fields))
}

pub fn execute(sql: &str, args: &[Value]) -> Result<usize> {
    with_thread_context(|ctx| ctx.execute(sql, args))
}

pub fn update(sql: &str, args: &[Value]) -> Result<usize> {
    execute(sql, args)
}
