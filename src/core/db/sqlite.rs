//! SQLite Driver Module
//!
//! [`Connector`] implementation on top of rusqlite. The `database` parameter is
//! the path of the database file, or `:memory:` for an in-memory database.
//! Host, port and credentials do not apply to SQLite and are ignored.

use super::driver::{
    ConnectParams, Connector, Cursor, DriverResult, ParamStyle, PhysicalConnection,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Opens rusqlite connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, params: &ConnectParams) -> DriverResult<Box<dyn PhysicalConnection>> {
        let conn = Connection::open(&params.database)?;

        // Initialize connection with common pragmas
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if let Some(ms) = params.int_option("busy_timeout") {
            conn.busy_timeout(Duration::from_millis(ms.max(0) as u64))?;
        }

        for key in ["use_unicode", "charset", "collation"] {
            if let Some(value) = params.options.get(key) {
                debug!("sqlite ignores option {}={}", key, value);
            }
        }

        Ok(Box::new(SqliteConnection {
            conn,
            autocommit: params.bool_option("autocommit", false),
        }))
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Numbered
    }
}

/// A rusqlite connection.
///
/// With `autocommit` off, a transaction is opened when a cursor is handed out
/// and stays open until `commit` or `rollback`. Closing the connection with a
/// transaction still open rolls it back.
pub struct SqliteConnection {
    conn: Connection,
    autocommit: bool,
}

impl SqliteConnection {
    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

impl PhysicalConnection for SqliteConnection {
    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>> {
        if !self.autocommit && !self.in_transaction() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(Box::new(SqliteCursor::new(&self.conn)))
    }

    fn commit(&mut self) -> DriverResult<()> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> DriverResult<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}

/// Buffered cursor: every result row is fetched during `execute`.
pub struct SqliteCursor<'c> {
    conn: &'c Connection,
    description: Option<Vec<String>>,
    rows: VecDeque<Vec<Value>>,
    rowcount: usize,
}

impl<'c> SqliteCursor<'c> {
    fn new(conn: &'c Connection) -> Self {
        SqliteCursor {
            conn,
            description: None,
            rows: VecDeque::new(),
            rowcount: 0,
        }
    }
}

impl Cursor for SqliteCursor<'_> {
    fn execute(&mut self, sql: &str, args: &[Value]) -> DriverResult<()> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        self.rows.clear();

        if column_count == 0 {
            self.description = None;
            self.rowcount = stmt.execute(params_from_iter(args.iter()))?;
            return Ok(());
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(row.get::<_, Value>(i)?);
            }
            self.rows.push_back(values);
        }
        self.rowcount = self.rows.len();
        self.description = Some(columns);
        Ok(())
    }

    fn description(&self) -> Option<&[String]> {
        self.description.as_deref()
    }

    fn fetchone(&mut self) -> DriverResult<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }

    fn fetchall(&mut self) -> DriverResult<Vec<Vec<Value>>> {
        Ok(self.rows.drain(..).collect())
    }

    fn rowcount(&self) -> usize {
        self.rowcount
    }
}
