//! # Test Utilities Module
//!
//! A scripted, in-process driver that records what the access layer asks of
//! it. Use it to check connection and transaction behaviour without a
//! database server:
//!
//! ```
//! use transwarp::test_utils::RecordingConnector;
//!
//! let recorder = RecordingConnector::new();
//! let mut ctx = recorder.engine().context();
//! ctx.execute("delete from users", &[]).unwrap();
//! assert_eq!(recorder.connects(), 1);
//! assert_eq!(recorder.commits(), 1);
//! assert_eq!(recorder.closes(), 1);
//! ```

use crate::core::db::driver::{
    ConnectParams, Connector, Cursor, DriverResult, ParamStyle, PhysicalConnection,
};
use crate::core::db::engine::Engine;
use crate::core::db::profiling::SLOW_QUERY_THRESHOLD;
use crate::core::db::value::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One driver interaction. Connections are numbered from 1 in connect order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect(usize),
    Execute {
        conn: usize,
        sql: String,
        args: Vec<Value>,
    },
    CursorClosed(usize),
    Commit(usize),
    Rollback(usize),
    Close(usize),
}

#[derive(Debug, Clone)]
struct ResultSet {
    pattern: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<Event>,
    results: Vec<ResultSet>,
    affected: usize,
    connections: usize,
    fail_connect: bool,
    fail_execute: Option<String>,
    fail_commit: bool,
    fail_rollback: bool,
    fail_close: bool,
}

/// Scripted [`Connector`] with `%s` markers.
///
/// Clones share the same script and event log.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    inner: Arc<Mutex<Recorder>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine using this connector that is not installed in any cell.
    pub fn engine(&self) -> Arc<Engine> {
        Arc::new(Engine::new(
            ConnectParams::new("test", "test", "test"),
            Arc::new(self.clone()),
            SLOW_QUERY_THRESHOLD,
        ))
    }

    /// Serves `rows` with `columns` for every statement containing `pattern`.
    /// Earlier registrations win.
    pub fn respond(&self, pattern: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> &Self {
        self.lock().results.push(ResultSet {
            pattern: pattern.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        });
        self
    }

    /// Row count reported for statements without a scripted result set.
    pub fn affect(&self, rows: usize) -> &Self {
        self.lock().affected = rows;
        self
    }

    pub fn fail_connect(&self) -> &Self {
        self.lock().fail_connect = true;
        self
    }

    /// Fails every statement containing `pattern`.
    pub fn fail_execute(&self, pattern: &str) -> &Self {
        self.lock().fail_execute = Some(pattern.to_string());
        self
    }

    pub fn fail_commit(&self) -> &Self {
        self.lock().fail_commit = true;
        self
    }

    pub fn fail_rollback(&self) -> &Self {
        self.lock().fail_rollback = true;
        self
    }

    pub fn fail_close(&self) -> &Self {
        self.lock().fail_close = true;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Executed statements with their arguments, in order.
    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Execute { sql, args, .. } => Some((sql.clone(), args.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.count(|e| matches!(e, Event::Connect(_)))
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, Event::Close(_)))
    }

    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Commit(_)))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Rollback(_)))
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.lock().events.iter().filter(|e| pred(e)).count()
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for RecordingConnector {
    fn connect(&self, _params: &ConnectParams) -> DriverResult<Box<dyn PhysicalConnection>> {
        let mut recorder = self.lock();
        if recorder.fail_connect {
            return Err("connect refused".into());
        }
        recorder.connections += 1;
        let id = recorder.connections;
        recorder.events.push(Event::Connect(id));
        Ok(Box::new(RecordingConnection {
            id,
            recorder: Arc::clone(&self.inner),
        }))
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Format
    }
}

struct RecordingConnection {
    id: usize,
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingConnection {
    fn record(&self, event: Event) -> MutexGuard<'_, Recorder> {
        let mut recorder = self.recorder.lock().unwrap_or_else(PoisonError::into_inner);
        recorder.events.push(event);
        recorder
    }
}

impl PhysicalConnection for RecordingConnection {
    fn cursor(&mut self) -> DriverResult<Box<dyn Cursor + '_>> {
        Ok(Box::new(RecordingCursor {
            conn: self.id,
            recorder: Arc::clone(&self.recorder),
            description: None,
            rows: VecDeque::new(),
            rowcount: 0,
        }))
    }

    fn commit(&mut self) -> DriverResult<()> {
        if self.record(Event::Commit(self.id)).fail_commit {
            return Err("commit failed".into());
        }
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        if self.record(Event::Rollback(self.id)).fail_rollback {
            return Err("rollback failed".into());
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> DriverResult<()> {
        if self.record(Event::Close(self.id)).fail_close {
            return Err("close failed".into());
        }
        Ok(())
    }
}

struct RecordingCursor {
    conn: usize,
    recorder: Arc<Mutex<Recorder>>,
    description: Option<Vec<String>>,
    rows: VecDeque<Vec<Value>>,
    rowcount: usize,
}

impl Cursor for RecordingCursor {
    fn execute(&mut self, sql: &str, args: &[Value]) -> DriverResult<()> {
        let mut recorder = self.recorder.lock().unwrap_or_else(PoisonError::into_inner);
        recorder.events.push(Event::Execute {
            conn: self.conn,
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        if let Some(pattern) = &recorder.fail_execute {
            if sql.contains(pattern.as_str()) {
                return Err(format!("execute failed: {}", sql).into());
            }
        }
        match recorder.results.iter().find(|r| sql.contains(r.pattern.as_str())) {
            Some(result) => {
                self.description = Some(result.columns.clone());
                self.rows = result.rows.iter().cloned().collect();
                self.rowcount = self.rows.len();
            }
            None => {
                self.description = None;
                self.rows.clear();
                self.rowcount = recorder.affected;
            }
        }
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

impl Drop for RecordingCursor {
    fn drop(&mut self) {
        self.recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .push(Event::CursorClosed(self.conn));
    }
}
