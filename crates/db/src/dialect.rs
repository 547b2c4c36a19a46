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

use crate::error::BackendError;
use crate::model::ColumnType;
use quire_common::Value;

/// Backend-specific SQL vocabulary and value conversions.
pub trait Dialect: Send + Sync {
    fn quote(&self, identifier: &str) -> String {
        format!("\"{identifier}\"")
    }

    /// Largest number of parameters allowed in a single `IN (...)` list.
    fn max_in_list(&self) -> usize;

    /// A cheap statement used to check that a connection is still alive.
    fn validation_query(&self) -> &str {
        "SELECT 1"
    }

    /// Whether `error` means the connection is dead and must be reopened.
    fn is_connection_closed(&self, error: &BackendError) -> bool {
        matches!(error, BackendError::Connection(_))
    }

    fn sql_type(&self, ty: ColumnType) -> &'static str;

    /// Column definition for an auto-incrementing integer key.
    fn serial_primary_key(&self) -> &'static str;

    fn begin_sql(&self) -> &str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &str {
        "ROLLBACK"
    }

    /// Converts a column value into something the backend can bind.
    fn encode(&self, value: &Value, ty: ColumnType) -> Result<Value, BackendError>;

    /// Converts a raw backend value read from a column of type `ty`.
    fn decode(&self, column: &str, raw: Value, ty: ColumnType) -> Result<Value, BackendError>;
}

pub const SQLITE_MAX_IN_LIST: usize = 999;

#[derive(Debug, Clone)]
pub struct SqliteDialect {
    max_in_list: usize,
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self {
            max_in_list: SQLITE_MAX_IN_LIST,
        }
    }
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_in_list(max_in_list: usize) -> Self {
        Self {
            max_in_list: max_in_list.max(1),
        }
    }
}

impl Dialect for SqliteDialect {
    fn max_in_list(&self) -> usize {
        self.max_in_list
    }

    fn sql_type(&self, ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::Id | ColumnType::String | ColumnType::Array => "TEXT",
            ColumnType::Long | ColumnType::Boolean => "INTEGER",
            ColumnType::Double => "REAL",
        }
    }

    fn serial_primary_key(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn encode(&self, value: &Value, ty: ColumnType) -> Result<Value, BackendError> {
        Ok(match (value, ty) {
            (Value::Null, _) => Value::Null,
            (Value::Boolean(b), _) => Value::Long(i64::from(*b)),
            (Value::Array(a), _) => Value::String(serde_json::to_string(a).map_err(|e| {
                BackendError::Decode {
                    column: "<array>".to_string(),
                    message: e.to_string(),
                }
            })?),
            (other, _) => other.clone(),
        })
    }

    fn decode(&self, column: &str, raw: Value, ty: ColumnType) -> Result<Value, BackendError> {
        let mismatch = |raw: &Value| BackendError::Decode {
            column: column.to_string(),
            message: format!("unexpected {raw} for {ty:?} column"),
        };
        match (ty, raw) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnType::Boolean, Value::Long(l)) => Ok(Value::Boolean(l != 0)),
            (ColumnType::Long, Value::Long(l)) => Ok(Value::Long(l)),
            (ColumnType::Double, Value::Double(d)) => Ok(Value::Double(d)),
            (ColumnType::Double, Value::Long(l)) => Ok(Value::Double(l as f64)),
            (ColumnType::Id | ColumnType::String, Value::String(s)) => Ok(Value::String(s)),
            (ColumnType::Array, Value::String(s)) => serde_json::from_str::<Vec<Value>>(&s)
                .map(Value::Array)
                .map_err(|e| BackendError::Decode {
                    column: column.to_string(),
                    message: e.to_string(),
                }),
            (_, raw) => Err(mismatch(&raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booleans_and_arrays_are_stored_as_primitives() {
        let d = SqliteDialect::new();
        let encoded = d.encode(&Value::from(true), ColumnType::Boolean).unwrap();
        assert_eq!(encoded, Value::Long(1));
        assert_eq!(
            d.decode("isproperty", encoded, ColumnType::Boolean).unwrap(),
            Value::Boolean(true)
        );

        let mixins = Value::Array(vec![Value::from("Folderish"), Value::from("Versionable")]);
        let encoded = d.encode(&mixins, ColumnType::Array).unwrap();
        assert!(matches!(encoded, Value::String(_)));
        assert_eq!(
            d.decode("mixintypes", encoded, ColumnType::Array).unwrap(),
            mixins
        );
    }

    #[test]
    fn test_decode_rejects_mismatched_types() {
        let d = SqliteDialect::new();
        assert!(d.decode("title", Value::Long(3), ColumnType::String).is_err());
        assert_eq!(
            d.decode("title", Value::Null, ColumnType::String).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_max_in_list_is_at_least_one() {
        assert_eq!(SqliteDialect::with_max_in_list(0).max_in_list(), 1);
        assert_eq!(SqliteDialect::new().max_in_list(), SQLITE_MAX_IN_LIST);
    }
}
