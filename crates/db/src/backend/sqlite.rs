// Copyright (C) 2026 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::backend::{Connection, ConnectionFactory, ResultRows};
use crate::error::BackendError;
use quire_common::Value;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{ErrorCode, ToSql, params_from_iter};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens connections to a SQLite database file, in WAL mode so that sessions and the cluster
/// node can read while another connection writes.
pub struct SqliteConnectionFactory {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnectionFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

impl ConnectionFactory for SqliteConnectionFactory {
    fn connect(&self) -> Result<Box<dyn Connection>, BackendError> {
        let conn = rusqlite::Connection::open(&self.path).map_err(classify)?;
        conn.busy_timeout(self.busy_timeout).map_err(classify)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(classify)?;
        Ok(Box::new(SqliteConnection { conn }))
    }
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, BackendError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
        stmt.execute(params_from_iter(params.iter().map(Param)))
            .map_err(classify)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultRows, BackendError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(classify)?;
        let width = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(Param)))
            .map_err(classify)?;
        let mut result = vec![];
        while let Some(row) = rows.next().map_err(classify)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql(row.get_ref(i).map_err(classify)?)?);
            }
            result.push(values);
        }
        Ok(result)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), BackendError> {
        self.conn.execute_batch(sql).map_err(classify)
    }
}

struct Param<'a>(&'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(Sql::Null),
            Value::Boolean(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
            Value::Long(l) => ToSqlOutput::Owned(Sql::Integer(*l)),
            Value::Double(d) => ToSqlOutput::Owned(Sql::Real(*d)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Array(a) => ToSqlOutput::Owned(Sql::Text(
                serde_json::to_string(a)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            )),
        })
    }
}

fn from_sql(value: ValueRef<'_>) -> Result<Value, BackendError> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Long(i)),
        ValueRef::Real(r) => Ok(Value::Double(r)),
        ValueRef::Text(t) => Ok(Value::String(String::from_utf8_lossy(t).into_owned())),
        ValueRef::Blob(_) => Err(BackendError::Decode {
            column: "<blob>".to_string(),
            message: "blob columns are not supported".to_string(),
        }),
    }
}

/// Failures that mean the connection itself is unusable are reported as `Connection` so that
/// the caller resets it.
fn classify(e: rusqlite::Error) -> BackendError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e
        && matches!(
            err.code,
            ErrorCode::CannotOpen | ErrorCode::SystemIoFailure | ErrorCode::NotADatabase
        )
    {
        return BackendError::Connection(e.to_string());
    }
    BackendError::Statement(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_values() {
        let tmpdir = TempDir::new().unwrap();
        let factory = SqliteConnectionFactory::new(tmpdir.path().join("t.db"));
        let mut conn = factory.connect().unwrap();
        conn.execute_batch("CREATE TABLE t (a TEXT, b INTEGER, c REAL)")
            .unwrap();
        let n = conn
            .execute(
                "INSERT INTO t (a, b, c) VALUES (?, ?, ?)",
                &[Value::from("x"), Value::from(true), Value::from(1.5)],
            )
            .unwrap();
        assert_eq!(n, 1);
        let rows = conn
            .query("SELECT a, b, c FROM t WHERE a = ?", &[Value::from("x")])
            .unwrap();
        assert_eq!(
            rows,
            vec![vec![Value::from("x"), Value::Long(1), Value::Double(1.5)]]
        );
    }

    #[test]
    fn test_bad_statement_is_not_a_connection_failure() {
        let tmpdir = TempDir::new().unwrap();
        let factory = SqliteConnectionFactory::new(tmpdir.path().join("t.db"));
        let mut conn = factory.connect().unwrap();
        let err = conn.query("SELECT * FROM missing", &[]).unwrap_err();
        assert!(matches!(err, BackendError::Statement(_)));
    }
}
