//! Connection Management Module
//!
//! This module provides the per-context connection state: a [`LazyConnection`]
//! that opens its physical connection on first use, the [`ThreadContext`] that
//! owns it together with the transaction nesting counter, and the
//! [`ConnectionScope`] guard that gives a connection the lifetime of the
//! outermost scope that needed one.

use super::driver::{Cursor, PhysicalConnection};
use super::engine::Engine;
use crate::core::{DbError, Result};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A connection slot that connects on the first cursor request.
pub struct LazyConnection {
    engine: Arc<Engine>,
    handle: Option<Box<dyn PhysicalConnection>>,
}

impl LazyConnection {
    pub fn new(engine: Arc<Engine>) -> Self {
        LazyConnection {
            engine,
            handle: None,
        }
    }

    /// Returns `true` once the physical connection has been opened.
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns a new cursor, connecting first if needed.
    ///
    /// # Errors
    ///
    /// [`DbError::Connect`] if the driver cannot connect, [`DbError::Driver`]
    /// if it cannot create a cursor.
    pub fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                let handle = self.engine.connect()?;
                info!("open connection <{:p}>...", &*handle);
                handle
            }
        };
        self.handle
            .insert(handle)
            .cursor()
            .map_err(DbError::Driver)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.handle
            .as_mut()
            .ok_or(DbError::NoConnection)?
            .commit()
            .map_err(DbError::Driver)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.handle
            .as_mut()
            .ok_or(DbError::NoConnection)?
            .rollback()
            .map_err(DbError::Driver)
    }

    /// Closes the physical connection if one is open. Calling it again is a no-op.
    pub fn cleanup(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => {
                info!("close connection <{:p}>...", &*handle);
                handle.close().map_err(DbError::Driver)
            }
            None => Ok(()),
        }
    }
}

impl Drop for LazyConnection {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("closing connection on drop failed: {}", e);
        }
    }
}

/// Connection state of one execution context.
///
/// A context is never shared: it is either owned by the caller and threaded
/// through call chains as `&mut ThreadContext`, or bound to the current thread
/// by [`crate::local`]. `transactions > 0` implies `connection.is_some()`.
///
/// The connection lifecycle belongs to [`ConnectionScope`] and
/// [`TransactionScope`](super::transaction::TransactionScope); code running
/// inside a scope cannot release the connection behind its back:
///
/// ```compile_fail
/// # use transwarp::test_utils::RecordingConnector;
/// let mut ctx = RecordingConnector::new().engine().context();
/// ctx.transaction(|tx| tx.cleanup()).unwrap();
/// ```
pub struct ThreadContext {
    engine: Arc<Engine>,
    connection: Option<LazyConnection>,
    pub(crate) transactions: usize,
}

impl ThreadContext {
    pub fn new(engine: Arc<Engine>) -> Self {
        ThreadContext {
            engine,
            connection: None,
            transactions: 0,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn is_init(&self) -> bool {
        self.connection.is_some()
    }

    /// Returns `true` if a physical connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map(LazyConnection::is_connected)
            .unwrap_or(false)
    }

    pub fn transaction_depth(&self) -> usize {
        self.transactions
    }

    /// Installs a fresh lazy connection and resets the nesting counter.
    /// Only scopes call this.
    pub(crate) fn init(&mut self) {
        debug!("open lazy connection...");
        self.connection = Some(LazyConnection::new(Arc::clone(&self.engine)));
        self.transactions = 0;
    }

    /// Releases the connection and returns the context to its empty state.
    pub(crate) fn cleanup(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(mut conn) => conn.cleanup(),
            None => Ok(()),
        }
    }

    /// Returns a cursor from the context's connection.
    ///
    /// Callers enter a [`ConnectionScope`] first; without one this fails with
    /// [`DbError::NoConnection`].
    pub fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        self.connection
            .as_mut()
            .ok_or(DbError::NoConnection)?
            .cursor()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(DbError::NoConnection)?
            .commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(DbError::NoConnection)?
            .rollback()
    }

    /// Runs `f` inside a [`ConnectionScope`].
    ///
    /// Only the outermost scope opens and closes the connection; nested calls
    /// reuse it.
    pub fn with_connection<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ThreadContext) -> Result<T>,
    {
        let mut scope = ConnectionScope::enter(self);
        let result = f(&mut *scope);
        let released = scope.exit();
        let value = result?;
        released?;
        Ok(value)
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("initialized", &self.is_init())
            .field("connected", &self.is_connected())
            .field("transactions", &self.transactions)
            .finish()
    }
}

/// Scoped connection acquisition.
///
/// On entry the context is initialized unless it already is; on exit the
/// connection is released only if this scope initialized it. Dropping the
/// guard is an exit; [`ConnectionScope::exit`] does the same and reports a
/// failed close.
pub struct ConnectionScope<'a> {
    ctx: &'a mut ThreadContext,
    should_cleanup: bool,
}

impl<'a> ConnectionScope<'a> {
    pub fn enter(ctx: &'a mut ThreadContext) -> Self {
        let should_cleanup = if ctx.is_init() {
            false
        } else {
            ctx.init();
            true
        };
        ConnectionScope {
            ctx,
            should_cleanup,
        }
    }

    /// Returns `true` if this scope initialized the connection.
    pub fn owns_connection(&self) -> bool {
        self.should_cleanup
    }

    pub fn exit(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if !std::mem::replace(&mut self.should_cleanup, false) {
            return Ok(());
        }
        self.ctx.cleanup().map_err(|e| {
            warn!("releasing connection failed: {}", e);
            e
        })
    }
}

impl Deref for ConnectionScope<'_> {
    type Target = ThreadContext;

    fn deref(&self) -> &ThreadContext {
        self.ctx
    }
}

impl DerefMut for ConnectionScope<'_> {
    fn deref_mut(&mut self) -> &mut ThreadContext {
        self.ctx
    }
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Event, RecordingConnector};

    #[test]
    fn test_lazy_connection_connects_on_first_cursor_only() {
        let recorder = RecordingConnector::new();
        let mut conn = LazyConnection::new(recorder.engine());
        assert!(!conn.is_connected());
        assert_eq!(recorder.connects(), 0);

        drop(conn.cursor().unwrap());
        drop(conn.cursor().unwrap());
        assert!(conn.is_connected());
        assert_eq!(recorder.connects(), 1);

        conn.cleanup().unwrap();
        conn.cleanup().unwrap();
        assert_eq!(recorder.closes(), 1);
    }

    #[test]
    fn test_commit_before_connect_is_no_connection() {
        let recorder = RecordingConnector::new();
        let mut conn = LazyConnection::new(recorder.engine());
        assert!(matches!(conn.commit(), Err(DbError::NoConnection)));
        assert!(matches!(conn.rollback(), Err(DbError::NoConnection)));
    }

    #[test]
    fn test_connect_failure_leaves_connection_unset() {
        let recorder = RecordingConnector::new();
        recorder.fail_connect();
        let mut conn = LazyConnection::new(recorder.engine());
        assert!(matches!(conn.cursor().err(), Some(DbError::Connect(_))));
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_context_cursor_requires_init() {
        let recorder = RecordingConnector::new();
        let mut ctx = recorder.engine().context();
        assert!(matches!(ctx.cursor().err(), Some(DbError::NoConnection)));
    }

    #[test]
    fn test_nested_scopes_share_one_connection() {
        let recorder = RecordingConnector::new();
        let mut ctx = recorder.engine().context();
        {
            let mut outer = ConnectionScope::enter(&mut ctx);
            assert!(outer.owns_connection());
            drop(outer.cursor().unwrap());
            {
                let mut inner = ConnectionScope::enter(&mut outer);
                assert!(!inner.owns_connection());
                drop(inner.cursor().unwrap());
                inner.exit().unwrap();
            }
            assert!(outer.is_connected());
        }
        assert!(!ctx.is_init());
        assert_eq!(recorder.connects(), 1);
        assert_eq!(recorder.closes(), 1);
    }

    #[test]
    fn test_scope_without_statements_never_connects() {
        let recorder = RecordingConnector::new();
        let mut ctx = recorder.engine().context();
        ctx.with_connection(|c| {
            assert!(c.is_init());
            Ok(())
        })
        .unwrap();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_scope_releases_on_error() {
        let recorder = RecordingConnector::new();
        let mut ctx = recorder.engine().context();
        let result: Result<()> = ctx.with_connection(|c| {
            drop(c.cursor()?);
            Err(DbError::Query("boom".to_string()))
        });
        assert!(matches!(result, Err(DbError::Query(_))));
        assert!(!ctx.is_init());
        assert_eq!(
            recorder.events(),
            vec![Event::Connect(1), Event::CursorClosed(1), Event::Close(1)]
        );
    }

    #[test]
    fn test_close_failure_is_reported_by_exit() {
        let recorder = RecordingConnector::new();
        recorder.fail_close();
        let mut ctx = recorder.engine().context();
        let result = ctx.with_connection(|c| {
            drop(c.cursor()?);
            Ok(7)
        });
        assert!(matches!(result, Err(DbError::Driver(_))));
        assert!(!ctx.is_init());
    }
}
