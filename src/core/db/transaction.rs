//! Transaction Scope Module
//!
//! Nested transactions over the connection of a [`ThreadContext`]. Scopes
//! share one physical transaction: entering bumps the nesting counter, and
//! only the outermost exit commits or rolls back.

use super::connection::ThreadContext;
use super::profiling::profiling;
use crate::core::{DbError, Result};
use std::ops::{Deref, DerefMut};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Scoped transaction.
///
/// Exit through [`TransactionScope::commit`] on success or
/// [`TransactionScope::rollback`] on failure. Dropping an unfinished scope,
/// e.g. on an early `?` return or a panic, exits it as a failure.
pub struct TransactionScope<'a> {
    ctx: &'a mut ThreadContext,
    should_close_conn: bool,
    finished: bool,
}

impl<'a> TransactionScope<'a> {
    pub fn begin(ctx: &'a mut ThreadContext) -> Self {
        let should_close_conn = if ctx.is_init() {
            false
        } else {
            ctx.init();
            true
        };
        ctx.transactions += 1;
        if ctx.transactions == 1 {
            info!("begin transaction...");
        } else {
            info!("join current transaction...");
        }
        TransactionScope {
            ctx,
            should_close_conn,
            finished: false,
        }
    }

    /// Returns `true` if this scope will release the connection on exit.
    pub fn owns_connection(&self) -> bool {
        self.should_close_conn
    }

    /// Exits the scope as a success. At the outermost level this commits.
    ///
    /// # Errors
    ///
    /// A failed commit is followed by a rollback attempt; the commit error is
    /// returned either way.
    pub fn commit(mut self) -> Result<()> {
        self.exit(false)
    }

    /// Exits the scope as a failure. At the outermost level this rolls back.
    pub fn rollback(mut self) -> Result<()> {
        self.exit(true)
    }

    fn exit(&mut self, failed: bool) -> Result<()> {
        if std::mem::replace(&mut self.finished, true) {
            return Ok(());
        }
        let outcome = match self.ctx.transactions.checked_sub(1) {
            Some(0) => {
                self.ctx.transactions = 0;
                if failed {
                    self.rollback_outermost()
                } else {
                    self.commit_outermost()
                }
            }
            Some(depth) => {
                self.ctx.transactions = depth;
                Ok(())
            }
            None => {
                error!("transaction depth underflow: the scope's transaction is gone");
                Err(DbError::NoConnection)
            }
        };
        let released = if self.should_close_conn {
            self.ctx.cleanup()
        } else {
            Ok(())
        };
        outcome?;
        released
    }

    fn commit_outermost(&mut self) -> Result<()> {
        if !self.ctx.is_connected() {
            debug!("commit transaction: no statement was issued");
            return Ok(());
        }
        info!("commit transaction...");
        match self.ctx.commit() {
            Ok(()) => {
                info!("commit ok.");
                Ok(())
            }
            Err(e) => {
                warn!("commit failed: {}, try rollback...", e);
                match self.ctx.rollback() {
                    Ok(()) => warn!("rollback ok."),
                    Err(rollback_err) => {
                        error!("rollback after failed commit failed: {}", rollback_err)
                    }
                }
                Err(e)
            }
        }
    }

    fn rollback_outermost(&mut self) -> Result<()> {
        if !self.ctx.is_connected() {
            debug!("rollback transaction: no statement was issued");
            return Ok(());
        }
        warn!("rollback transaction...");
        self.ctx.rollback()?;
        info!("rollback ok.");
        Ok(())
    }
}

impl Deref for TransactionScope<'_> {
    type Target = ThreadContext;

    fn deref(&self) -> &ThreadContext {
        self.ctx
    }
}

impl DerefMut for TransactionScope<'_> {
    fn deref_mut(&mut self) -> &mut ThreadContext {
        self.ctx
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            warn!("transaction scope dropped during panic");
        } else {
            warn!("transaction scope dropped without commit");
        }
        if let Err(e) = self.exit(true) {
            error!("rollback on drop failed: {}", e);
        }
    }
}

impl ThreadContext {
    /// Runs `f` inside a [`TransactionScope`]: commits when `f` succeeds, rolls
    /// back and returns `f`'s error when it fails.
    ///
    /// Nested calls join the enclosing transaction.
    ///
    /// # Errors
    ///
    /// - `f`'s own error after a successful rollback
    /// - [`DbError::RollbackFailed`] when the rollback fails as well, with `f`'s
    ///   error as its source
    /// - the commit error when committing fails
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ThreadContext) -> Result<T>,
    {
        let start = Instant::now();
        let threshold = self.engine().slow_query_threshold();
        let mut scope = TransactionScope::begin(self);
        let depth = scope.transaction_depth();
        let outcome = match f(&mut *scope) {
            Ok(value) => scope.commit().map(|()| value),
            Err(e) => match scope.rollback() {
                Ok(()) => Err(e),
                Err(rollback) => Err(DbError::RollbackFailed {
                    source: Box::new(e),
                    rollback: Box::new(rollback),
                }),
            },
        };
        if depth == 1 {
            profiling(start, "transaction", threshold);
        }
        outcome
    }
}
