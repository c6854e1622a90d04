//! Query Execution Module
//!
//! The SQL surface used by the entity layer: `query_one`, `query_many`,
//! `query_scalar`, `insert` and `execute`. Every executor runs inside its own
//! connection scope, so a bare call outside any explicit scope connects,
//! executes and releases the connection again.

use super::connection::ThreadContext;
use super::driver::substitute_placeholders;
use super::profiling::profiling;
use super::row::{RowMapping, RowShape};
use super::value::{IntoValue, Value};
use crate::core::{DbError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, ValueRef};
use std::time::Instant;
use tracing::info;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

impl ThreadContext {
    /// Executes a SELECT and returns its first row, or `None` if there is none.
    ///
    /// # Arguments
    ///
    /// * `sql` - SQL text using `?` as the positional placeholder
    /// * `args` - Positional arguments, one per placeholder
    pub fn query_one(&mut self, sql: &str, args: &[Value]) -> Result<Option<RowMapping>> {
        self.with_connection(|ctx| ctx.select(sql, args, true))
            .map(|rows| rows.into_iter().next())
    }

    /// Executes a SELECT and returns every row; an empty result is an empty `Vec`.
    pub fn query_many(&mut self, sql: &str, args: &[Value]) -> Result<Vec<RowMapping>> {
        self.with_connection(|ctx| ctx.select(sql, args, false))
    }

    /// Executes a SELECT that yields exactly one column and returns the value
    /// of its first row.
    ///
    /// # Errors
    ///
    /// [`DbError::MultiColumns`] when the row has more than one column, and
    /// `MultiColumns(0)` when there is no row at all.
    pub fn query_scalar(&mut self, sql: &str, args: &[Value]) -> Result<Value> {
        let row = self.query_one(sql, args)?;
        let width = row.as_ref().map(RowMapping::len).unwrap_or(0);
        match row {
            Some(row) if width == 1 => Ok(row.into_values().remove(0)),
            _ => Err(DbError::MultiColumns(width)),
        }
    }

    /// [`query_scalar`](Self::query_scalar) converted to `T`, e.g. a `COUNT(*)` as `i64`.
    pub fn query_scalar_as<T: FromSql>(&mut self, sql: &str, args: &[Value]) -> Result<T> {
        let value = self.query_scalar(sql, args)?;
        T::column_result(ValueRef::from(&value)).map_err(|source| DbError::Conversion {
            column: String::from("<scalar>"),
            source,
        })
    }

    /// Builds and executes an INSERT from column/value pairs.
    ///
    /// The column list and the placeholder list follow the order of `fields`.
    /// Table and column names must be plain identifiers.
    ///
    /// # Returns
    ///
    /// The number of inserted rows.
    pub fn insert<I, K, V>(&mut self, table: &str, fields: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoValue,
    {
        let (sql, args) = build_insert(table, fields)?;
        self.execute(&sql, &args)
    }

    /// Executes a mutating statement and returns the affected row count.
    ///
    /// Outside an explicit transaction the statement is committed on its own.
    /// Inside one, the commit is left to the outermost transaction scope.
    pub fn execute(&mut self, sql: &str, args: &[Value]) -> Result<usize> {
        self.with_connection(|ctx| {
            let sql = substitute_placeholders(sql, ctx.engine().param_style());
            let threshold = ctx.engine().slow_query_threshold();
            info!("SQL: {}, ARGS: {:?}", sql, args);

            let start = Instant::now();
            let rowcount = {
                let mut cursor = ctx.cursor()?;
                cursor.execute(&sql, args).map_err(DbError::Driver)?;
                cursor.rowcount()
            };
            profiling(start, &sql, threshold);

            if ctx.transaction_depth() == 0 {
                info!("auto commit");
                ctx.commit()?;
            }
            Ok(rowcount)
        })
    }

    /// Alias of [`execute`](Self::execute) for UPDATE/DELETE call sites.
    pub fn update(&mut self, sql: &str, args: &[Value]) -> Result<usize> {
        self.execute(sql, args)
    }

    fn select(&mut self, sql: &str, args: &[Value], first: bool) -> Result<Vec<RowMapping>> {
        let sql = substitute_placeholders(sql, self.engine().param_style());
        let threshold = self.engine().slow_query_threshold();
        info!("SQL: {}, ARGS: {:?}", sql, args);

        let start = Instant::now();
        let rows = {
            let mut cursor = self.cursor()?;
            cursor.execute(&sql, args).map_err(DbError::Driver)?;
            let shape = RowShape::new(cursor.description().unwrap_or_default().iter().cloned());
            if first {
                cursor
                    .fetchone()
                    .map_err(DbError::Driver)?
                    .map(|values| shape.row(values))
                    .into_iter()
                    .collect()
            } else {
                cursor
                    .fetchall()
                    .map_err(DbError::Driver)?
                    .into_iter()
                    .map(|values| shape.row(values))
                    .collect()
            }
        };
        profiling(start, &sql, threshold);
        Ok(rows)
    }
}

/// Builds the INSERT statement and its positional arguments.
pub fn build_insert<I, K, V>(table: &str, fields: I) -> Result<(String, Vec<Value>)>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: IntoValue,
{
    check_identifier(table)?;
    let mut columns = Vec::new();
    let mut args = Vec::new();
    for (column, value) in fields {
        let column = column.as_ref();
        check_identifier(column)?;
        columns.push(format!("`{}`", column));
        args.push(value.into_value());
    }
    if columns.is_empty() {
        return Err(DbError::Query(format!(
            "insert into `{}` needs at least one column",
            table
        )));
    }

    let placeholders = vec!["?"; columns.len()].join(",");
    let sql = format!(
        "insert into `{}` ({}) values ({})",
        table,
        columns.join(","),
        placeholders
    );
    Ok((sql, args))
}

fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DbError::Query(format!("invalid identifier: {:?}", name)))
    }
}

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    /// SELECT statement, including WITH ... SELECT
    Select,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// CREATE, DROP and ALTER statements
    Ddl,
    /// Other statement types
    Other,
}

impl StatementType {
    /// Determines the statement type from a SQL string
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" | "PRAGMA" | "EXPLAIN" => StatementType::Select,
            "INSERT" | "REPLACE" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            "CREATE" | "DROP" | "ALTER" => StatementType::Ddl,
            _ => StatementType::Other,
        }
    }

    /// Returns `true` for statements that produce a result set.
    pub fn returns_rows(self) -> bool {
        self == StatementType::Select
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::test_utils::{Event, RecordingConnector};

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_query_one_maps_first_row() {
        let recorder = RecordingConnector::new();
        recorder.respond(
            "from users",
            &["id", "name"],
            vec![vec![text("u1"), text("Bob")], vec![text("u2"), text("Ann")]],
        );
        let mut ctx = recorder.engine().context();

        let row = ctx
            .query_one("select id, name from users where id=?", &args!["u1"])
            .unwrap()
            .expect("a row");
        assert_eq!(row.attr("name").unwrap(), &text("Bob"));
        assert_eq!(
            recorder.executed(),
            vec![(
                "select id, name from users where id=%s".to_string(),
                vec![text("u1")]
            )]
        );
    }

    #[test]
    fn test_query_one_without_rows_is_none() {
        let recorder = RecordingConnector::new();
        recorder.respond("from users", &["id"], vec![]);
        let mut ctx = recorder.engine().context();
        assert!(ctx.query_one("select id from users", &[]).unwrap().is_none());
    }

    #[test]
    fn test_query_many_returns_all_rows_or_empty() {
        let recorder = RecordingConnector::new();
        recorder.respond("from blogs", &["id"], vec![vec![text("b1")], vec![text("b2")]]);
        recorder.respond("from comments", &["id"], vec![]);
        let mut ctx = recorder.engine().context();

        let blogs = ctx.query_many("select id from blogs", &[]).unwrap();
        assert_eq!(blogs.len(), 2);
        assert_eq!(blogs[1]["id"], text("b2"));
        assert!(ctx.query_many("select id from comments", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_query_scalar_rejects_two_columns() {
        let recorder = RecordingConnector::new();
        recorder.respond("from users", &["id", "name"], vec![vec![text("u1"), text("Bob")]]);
        let mut ctx = recorder.engine().context();
        assert!(matches!(
            ctx.query_scalar("select id, name from users", &[]),
            Err(DbError::MultiColumns(2))
        ));
    }

    #[test]
    fn test_query_scalar_fails_on_zero_rows() {
        let recorder = RecordingConnector::new();
        recorder.respond("count(*)", &["n"], vec![]);
        let mut ctx = recorder.engine().context();
        assert!(matches!(
            ctx.query_scalar("select count(*) from users", &[]),
            Err(DbError::MultiColumns(0))
        ));
    }

    #[test]
    fn test_query_scalar_as_converts() {
        let recorder = RecordingConnector::new();
        recorder.respond("count(*)", &["n"], vec![vec![Value::Integer(3)]]);
        let mut ctx = recorder.engine().context();
        let n: i64 = ctx.query_scalar_as("select count(*) from users", &[]).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_insert_builds_matching_columns_and_args() {
        let recorder = RecordingConnector::new();
        let mut ctx = recorder.engine().context();
        ctx.insert("users", [("id", "u1"), ("name", "Bob")]).unwrap();

        let executed = recorder.executed();
        assert_eq!(executed.len(), 1);
        let (sql, args) = &executed[0];
        insta::assert_snapshot!(sql, @"insert into `users` (`id`,`name`) values (%s,%s)");
        assert_eq!(args, &vec![text("u1"), text("Bob")]);
    }

    #[test]
    fn test_insert_rejects_bad_identifiers_and_empty_fields() {
        let recorder = RecordingConnector::new();
        let mut ctx = recorder.engine().context();
        let no_fields: Vec<(&str, Value)> = Vec::new();
        assert!(matches!(ctx.insert("users", no_fields), Err(DbError::Query(_))));
        assert!(matches!(
            ctx.insert("users; drop table users", [("id", "u1")]),
            Err(DbError::Query(_))
        ));
        assert!(matches!(ctx.insert("users", [("na`me", "x")]), Err(DbError::Query(_))));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_execute_auto_commits_outside_transaction() {
        let recorder = RecordingConnector::new();
        recorder.affect(3);
        let mut ctx = recorder.engine().context();
        let n = ctx.update("update users set admin=? where admin=?", &args![true, false]).unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            recorder.events(),
            vec![
                Event::Connect(1),
                Event::Execute {
                    conn: 1,
                    sql: "update users set admin=%s where admin=%s".to_string(),
                    args: vec![Value::Integer(1), Value::Integer(0)],
                },
                Event::CursorClosed(1),
                Event::Commit(1),
                Event::Close(1),
            ]
        );
    }

    #[test]
    fn test_each_statement_outside_transaction_commits_independently() {
        let recorder = RecordingConnector::new();
        let mut ctx = recorder.engine().context();
        ctx.with_connection(|c| {
            c.execute("delete from comments", &[])?;
            c.execute("delete from blogs", &[])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(recorder.connects(), 1);
        assert_eq!(recorder.commits(), 2);
    }

    #[test]
    fn test_bare_executor_leaves_no_connection_open() {
        let recorder = RecordingConnector::new();
        recorder.respond("from users", &["id"], vec![vec![text("u1")]]);
        let mut ctx = recorder.engine().context();
        ctx.query_many("select id from users", &[]).unwrap();
        ctx.execute("delete from users", &[]).unwrap();
        assert!(!ctx.is_init());
        assert_eq!(recorder.connects(), 2);
        assert_eq!(recorder.closes(), 2);
    }

    #[test]
    fn test_failed_statement_closes_cursor_and_connection() {
        let recorder = RecordingConnector::new();
        recorder.fail_execute("users");
        let mut ctx = recorder.engine().context();
        let result = ctx.execute("delete from users", &[]);
        assert!(matches!(result, Err(DbError::Driver(_))));
        assert_eq!(recorder.commits(), 0);
        let events = recorder.events();
        assert_eq!(events[events.len() - 2..], [Event::CursorClosed(1), Event::Close(1)]);
        assert!(!ctx.is_init());
    }

    #[test]
    fn test_statement_type_classification() {
        assert_eq!(StatementType::from_sql("SELECT * FROM users"), StatementType::Select);
        assert_eq!(
            StatementType::from_sql("  with x as (select 1) select * from x"),
            StatementType::Select
        );
        assert_eq!(
            StatementType::from_sql("insert into users values (1, 'test')"),
            StatementType::Insert
        );
        assert_eq!(StatementType::from_sql("UPDATE users SET name = 'new'"), StatementType::Update);
        assert_eq!(
            StatementType::from_sql("DELETE FROM users WHERE id = 1"),
            StatementType::Delete
        );
        assert_eq!(StatementType::from_sql("CREATE TABLE test (id INTEGER)"), StatementType::Ddl);
        assert_eq!(StatementType::from_sql("BEGIN"), StatementType::Other);
        assert!(StatementType::from_sql("pragma table_info(users)").returns_rows());
        assert!(!StatementType::from_sql("").returns_rows());
    }
}
