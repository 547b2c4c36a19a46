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

//! Fixtures for unit tests: a small document model, and a SQLite connection factory that counts
//! round-trips and can simulate a dead backend.

use crate::backend::{Connection, ConnectionFactory, ResultRows, SqliteConnectionFactory};
use crate::error::BackendError;
use crate::model::{ColumnType, Model};
use quire_common::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Folder: dublincore. File: dublincore, content, subjects. Attachment (a complex property
/// child): attachment. Mixin Tagged: tags.
pub(crate) fn test_model() -> Model {
    Model::builder()
        .simple_fragment(
            "dublincore",
            &[
                ("title", ColumnType::String),
                ("creator", ColumnType::String),
                ("modified", ColumnType::Long),
            ],
        )
        .simple_fragment(
            "content",
            &[("data", ColumnType::String), ("length", ColumnType::Long)],
        )
        .simple_fragment("attachment", &[("filename", ColumnType::String)])
        .collection_fragment("subjects", ColumnType::String)
        .collection_fragment("tags", ColumnType::String)
        .document_type("Folder", &["dublincore"])
        .document_type("File", &["dublincore", "content", "subjects"])
        .document_type("Attachment", &["attachment"])
        .mixin("Tagged", &["tags"])
        .build()
        .unwrap()
}

#[derive(Default)]
pub(crate) struct Counters {
    connects: AtomicUsize,
    queries: AtomicUsize,
    executes: AtomicUsize,
    failures: AtomicUsize,
    statement_failures: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl Counters {
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    /// Every connection of the factory fails its next `n` statements as if the backend died.
    pub(crate) fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Every connection of the factory fails its next `n` statements with an ordinary
    /// statement error, leaving the connection alive.
    pub(crate) fn fail_next_statements(&self, n: usize) {
        self.statement_failures.store(n, Ordering::SeqCst);
    }

    /// SQL of every `execute` so far, oldest first.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn take_failure(&self) -> Result<(), BackendError> {
        if take_one(&self.failures) {
            return Err(BackendError::Connection(
                "simulated connection loss".to_string(),
            ));
        }
        if take_one(&self.statement_failures) {
            return Err(BackendError::Statement("simulated statement failure".to_string()));
        }
        Ok(())
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub(crate) struct InstrumentedFactory {
    inner: SqliteConnectionFactory,
    counters: Arc<Counters>,
}

impl InstrumentedFactory {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: SqliteConnectionFactory::new(path),
            counters: Arc::new(Counters::default()),
        }
    }

    pub(crate) fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }
}

impl ConnectionFactory for InstrumentedFactory {
    fn connect(&self) -> Result<Box<dyn Connection>, BackendError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InstrumentedConnection {
            inner: self.inner.connect()?,
            counters: self.counters.clone(),
        }))
    }
}

struct InstrumentedConnection {
    inner: Box<dyn Connection>,
    counters: Arc<Counters>,
}

impl Connection for InstrumentedConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, BackendError> {
        self.counters.executes.fetch_add(1, Ordering::SeqCst);
        self.counters.executed.lock().unwrap().push(sql.to_string());
        self.counters.take_failure()?;
        self.inner.execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<ResultRows, BackendError> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        self.counters.take_failure()?;
        self.inner.query(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), BackendError> {
        self.counters.take_failure()?;
        self.inner.execute_batch(sql)
    }
}
