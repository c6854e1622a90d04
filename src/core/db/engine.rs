//! Engine Module
//!
//! The [`Engine`] is the process-wide connection factory. It owns the connect
//! parameters and the driver, never a live connection. Engines are installed
//! into an [`EngineCell`], which accepts exactly one engine for its lifetime.

use super::connection::ThreadContext;
use super::driver::{ConnectParams, Connector, ParamStyle, PhysicalConnection};
use crate::config::Config;
use crate::core::db::profiling::SLOW_QUERY_THRESHOLD;
use crate::core::{DbError, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Immutable connection factory shared by every thread context.
pub struct Engine {
    params: ConnectParams,
    connector: Arc<dyn Connector>,
    slow_query_threshold: Duration,
}

impl Engine {
    pub(crate) fn new(
        params: ConnectParams,
        connector: Arc<dyn Connector>,
        slow_query_threshold: Duration,
    ) -> Self {
        Engine {
            params,
            connector,
            slow_query_threshold,
        }
    }

    /// Opens a new physical connection. Driver failures come back as
    /// [`DbError::Connect`] with the driver error untouched.
    pub fn connect(&self) -> Result<Box<dyn PhysicalConnection>> {
        self.connector.connect(&self.params).map_err(|e| {
            warn!("connect to {} failed: {}", self.params.database, e);
            DbError::Connect(e)
        })
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    pub fn param_style(&self) -> ParamStyle {
        self.connector.param_style()
    }

    pub fn slow_query_threshold(&self) -> Duration {
        self.slow_query_threshold
    }

    /// Creates an empty context bound to this engine.
    pub fn context(self: &Arc<Self>) -> ThreadContext {
        ThreadContext::new(Arc::clone(self))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("params", &self.params)
            .field("param_style", &self.param_style())
            .field("slow_query_threshold", &self.slow_query_threshold)
            .finish()
    }
}

/// One-time slot for an [`Engine`].
///
/// The first successful `init*` call wins. Every later call fails with
/// [`DbError::AlreadyInitialized`] and leaves the installed engine untouched.
#[derive(Debug)]
pub struct EngineCell {
    cell: OnceCell<Arc<Engine>>,
}

impl EngineCell {
    pub const fn new() -> Self {
        EngineCell {
            cell: OnceCell::new(),
        }
    }

    /// Installs an engine built from `params` with the default slow query threshold.
    pub fn init<C>(&self, params: ConnectParams, connector: C) -> Result<Arc<Engine>>
    where
        C: Connector + 'static,
    {
        self.install(Engine::new(params, Arc::new(connector), SLOW_QUERY_THRESHOLD))
    }

    /// Installs an engine described by a loaded configuration file.
    pub fn init_from_config<C>(&self, config: &Config, connector: C) -> Result<Arc<Engine>>
    where
        C: Connector + 'static,
    {
        self.install(Engine::new(
            config.database.connect_params(),
            Arc::new(connector),
            config.slow_query_threshold(),
        ))
    }

    fn install(&self, engine: Engine) -> Result<Arc<Engine>> {
        if self.cell.get().is_some() {
            return Err(DbError::AlreadyInitialized);
        }
        let engine = Arc::new(engine);
        self.cell
            .set(Arc::clone(&engine))
            .map_err(|_| DbError::AlreadyInitialized)?;
        info!("Init engine <{:p}> for {} ok.", Arc::as_ptr(&engine), engine.params.database);
        Ok(engine)
    }

    /// Returns the installed engine.
    pub fn get(&self) -> Result<Arc<Engine>> {
        self.cell.get().cloned().ok_or(DbError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Default for EngineCell {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide engine used by the thread-bound facade in [`crate::local`].
pub static ENGINE: EngineCell = EngineCell::new();

/// Installs the process-wide engine. Call once during startup, before any
/// thread starts issuing queries.
pub fn create_engine<C>(params: ConnectParams, connector: C) -> Result<Arc<Engine>>
where
    C: Connector + 'static,
{
    ENGINE.init(params, connector)
}
