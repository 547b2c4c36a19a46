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

//! The seam between the mappers and the relational engine.
//!
//! Parameters and results are plain backend values (no booleans or arrays); the `Dialect` is
//! responsible for converting column values on the way in and out.

mod sqlite;

pub use sqlite::{SqliteConnection, SqliteConnectionFactory};

use crate::error::BackendError;
use quire_common::Value;

pub type ResultRows = Vec<Vec<Value>>;

/// A single open session against the backend. Statements run in autocommit mode unless the
/// caller has issued the dialect's transaction statements.
pub trait Connection: Send {
    /// Runs a statement that does not produce rows, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, BackendError>;

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultRows, BackendError>;

    /// Runs a parameterless script of one or more statements.
    fn execute_batch(&mut self, sql: &str) -> Result<(), BackendError>;
}

pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>, BackendError>;
}
