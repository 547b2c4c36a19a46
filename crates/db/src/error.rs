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

use quire_common::{ContractError, Id};

/// A raw failure reported by the relational backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The connection is broken or could not be (re)established.
    #[error("Connection failure: {0}")]
    Connection(String),
    #[error("Statement failed: {0}")]
    Statement(String),
    #[error("Could not decode value for {column}: {message}")]
    Decode { column: String, message: String },
}

/// The error surfaced by every storage mapper operation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Could not {operation} {table}{}: {source} [{sql}]", fmt_id(.id))]
    Backend {
        operation: &'static str,
        table: String,
        id: Option<Id>,
        sql: String,
        #[source]
        source: BackendError,
    },
    #[error("Could not open backend connection: {0}")]
    Connect(#[source] BackendError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error("Invalid cluster invalidation record for node {node}: {message}")]
    Codec { node: String, message: String },
}

fn fmt_id(id: &Option<Id>) -> String {
    id.as_ref().map(|id| format!("/{id}")).unwrap_or_default()
}

impl StorageError {
    pub fn backend(
        operation: &'static str,
        table: &str,
        id: Option<&Id>,
        sql: &str,
        source: BackendError,
    ) -> Self {
        StorageError::Backend {
            operation,
            table: table.to_string(),
            id: id.cloned(),
            sql: sql.to_string(),
            source,
        }
    }

    /// The underlying backend failure, if this error came from the backend.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            StorageError::Backend { source, .. } | StorageError::Connect(source) => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_names_operation_table_and_id() {
        let err = StorageError::backend(
            "delete",
            "dublincore",
            Some(&Id::from("abc")),
            "DELETE FROM \"dublincore\" WHERE \"id\" = ?",
            BackendError::Statement("disk full".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Could not delete dublincore/abc: Statement failed: disk full"));
        assert_eq!(
            err.backend_error(),
            Some(&BackendError::Statement("disk full".to_string()))
        );
    }
}
