//! Driver Interface Module
//!
//! The outbound seam between the access layer and a concrete database driver.
//! A [`Connector`] turns [`ConnectParams`] into a [`PhysicalConnection`], which
//! hands out [`Cursor`]s. Dropping a cursor closes it.

use crate::core::DriverError;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Result type returned by driver trait methods.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Positional parameter marker understood by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?`
    Qmark,
    /// `%s`
    Format,
    /// `?1`, `?2`, ...
    Numbered,
}

impl ParamStyle {
    /// Returns the marker for the parameter at the 1-based `position`.
    pub fn marker(self, position: usize) -> Cow<'static, str> {
        match self {
            ParamStyle::Qmark => Cow::Borrowed("?"),
            ParamStyle::Format => Cow::Borrowed("%s"),
            ParamStyle::Numbered => Cow::Owned(format!("?{}", position)),
        }
    }
}

/// Rewrites every portable `?` placeholder into the driver's native marker.
///
/// Question marks inside quoted text (`'...'`, `"..."`, `` `...` ``) are left
/// alone. With [`ParamStyle::Qmark`] the input is returned unchanged.
pub fn substitute_placeholders(sql: &str, style: ParamStyle) -> Cow<'_, str> {
    if style == ParamStyle::Qmark || !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut position = 0;
    for ch in sql.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                out.push(ch);
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => {
                    position += 1;
                    out.push_str(&style.marker(position));
                }
                _ => out.push(ch),
            },
        }
    }
    Cow::Owned(out)
}

/// A single driver option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3306;

/// Connection parameters handed to a [`Connector`].
///
/// `options` always contains the defaults `use_unicode=true`, `charset=utf8`,
/// `collation=utf8_general_ci` and `autocommit=false` unless overridden, and
/// `buffered=true` regardless of what the caller asked for.
#[derive(Clone, PartialEq)]
pub struct ConnectParams {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
    pub options: BTreeMap<String, OptionValue>,
}

impl ConnectParams {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        ConnectParams {
            user: user.into(),
            password: password.into(),
            database: database.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            options: Self::merge_options(BTreeMap::new()),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets a single driver option. `buffered` cannot be turned off.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self.options
            .insert("buffered".to_string(), OptionValue::Bool(true));
        self
    }

    /// Replaces the caller-supplied options, re-applying the defaults.
    pub fn options(mut self, options: BTreeMap<String, OptionValue>) -> Self {
        self.options = Self::merge_options(options);
        self
    }

    /// Looks up a boolean option, falling back to `default`.
    pub fn bool_option(&self, key: &str, default: bool) -> bool {
        match self.options.get(key) {
            Some(OptionValue::Bool(b)) => *b,
            Some(OptionValue::Int(i)) => *i != 0,
            _ => default,
        }
    }

    /// Looks up an integer option.
    pub fn int_option(&self, key: &str) -> Option<i64> {
        match self.options.get(key) {
            Some(OptionValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    fn merge_options(overrides: BTreeMap<String, OptionValue>) -> BTreeMap<String, OptionValue> {
        let mut merged = BTreeMap::new();
        merged.insert("use_unicode".to_string(), OptionValue::Bool(true));
        merged.insert("charset".to_string(), OptionValue::from("utf8"));
        merged.insert("collation".to_string(), OptionValue::from("utf8_general_ci"));
        merged.insert("autocommit".to_string(), OptionValue::Bool(false));
        merged.extend(overrides);
        merged.insert("buffered".to_string(), OptionValue::Bool(true));
        merged
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("user", &self.user)
            .field("password", &"******")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("options", &self.options)
            .finish()
    }
}

/// Factory for physical connections.
pub trait Connector: Send + Sync {
    /// Opens a new physical connection.
    fn connect(&self, params: &ConnectParams) -> DriverResult<Box<dyn PhysicalConnection>>;

    /// Native positional marker of this driver.
    fn param_style(&self) -> ParamStyle {
        ParamStyle::Qmark
    }
}

/// A live connection to the database.
pub trait PhysicalConnection: Send {
    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>>;
    fn commit(&mut self) -> DriverResult<()>;
    fn rollback(&mut self) -> DriverResult<()>;
    fn close(self: Box<Self>) -> DriverResult<()>;
}

/// Statement execution handle borrowed from a [`PhysicalConnection`].
pub trait Cursor {
    /// Executes `sql` with positional `args` (already in native marker form).
    fn execute(&mut self, sql: &str, args: &[Value]) -> DriverResult<()>;

    /// Column names of the last result set, `None` for statements without one.
    fn description(&self) -> Option<&[String]>;

    fn fetchone(&mut self) -> DriverResult<Option<Vec<Value>>>;

    fn fetchall(&mut self) -> DriverResult<Vec<Vec<Value>>>;

    /// Rows affected (or returned) by the last statement.
    fn rowcount(&self) -> usize;
}
