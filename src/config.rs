use crate::core::db::driver::{ConnectParams, OptionValue, DEFAULT_HOST, DEFAULT_PORT};
use crate::core::db::profiling::SLOW_QUERY_THRESHOLD;
use crate::core::{DbError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub profiling: Option<ProfilingConfig>,
}

/// Connection parameters.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

/// Statement timing configuration.
#[derive(Debug, Deserialize)]
pub struct ProfilingConfig {
    pub slow_query_ms: Option<u64>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl DatabaseConfig {
    /// Connection parameters with the driver defaults merged in.
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams::new(&self.user, &self.password, &self.database)
            .host(&self.host)
            .port(self.port)
            .options(self.options.clone())
    }
}

impl Config {
    pub fn slow_query_threshold(&self) -> Duration {
        self.profiling
            .as_ref()
            .and_then(|p| p.slow_query_ms)
            .map(Duration::from_millis)
            .unwrap_or(SLOW_QUERY_THRESHOLD)
    }
}

impl FromStr for Config {
    type Err = DbError;

    fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DbError::Config(e.to_string()))
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = transwarp::config::load_config("db.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    content.parse()
}

/// `<config dir>/transwarp/db.toml`, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("transwarp").join("db.toml"))
}
