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

use crate::model::RowId;

/// Violations of the mapper's calling contract. These are programming errors: they are surfaced
/// immediately and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Unknown column '{key}' in table {table}")]
    UnknownColumn { table: String, key: String },
    #[error("Null value for key '{key}' in table {table}")]
    NullValue { table: String, key: String },
    #[error("Missing value for criterion '{key}' in select on {table}")]
    MissingCriterion { table: String, key: String },
    #[error("Changed key '{key}' is not present in row {row}")]
    ChangedKeyNotInRow { row: RowId, key: String },
    #[error("{row} appears in more than one list of the same batch")]
    DuplicateBatchEntry { row: RowId },
    #[error("Table {table} is not a {expected} fragment")]
    WrongFragmentKind {
        table: String,
        expected: &'static str,
    },
}
