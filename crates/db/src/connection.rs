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

//! Backend connections that survive the backend going away.
//!
//! A `ManagedConnection` resets itself (close, then reopen) when a statement fails because the
//! connection is dead. Since a dead backend usually means every other connection is dead too,
//! a reset flags all sibling connections registered with the same `ConnectionPropagator` to run
//! their validation query before their next transaction.

use crate::backend::{Connection, ConnectionFactory};
use crate::dialect::Dialect;
use crate::error::{BackendError, StorageError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, warn};

/// Tracks the live connections of a repository so that one of them can flag the others.
#[derive(Default)]
pub struct ConnectionPropagator {
    next_id: AtomicU64,
    connections: Mutex<Vec<(u64, Weak<AtomicBool>)>>,
}

impl ConnectionPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, check_valid: &Arc<AtomicBool>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.lock().unwrap();
        connections.push((id, Arc::downgrade(check_valid)));
        id
    }

    fn unregister(&self, id: u64) {
        let mut connections = self.connections.lock().unwrap();
        connections.retain(|(c, _)| *c != id);
    }

    /// Asks every connection except `except` to validate itself before its next use.
    pub fn check_connection_valid(&self, except: u64) {
        let mut connections = self.connections.lock().unwrap();
        connections.retain(|(id, flag)| match flag.upgrade() {
            Some(flag) => {
                if *id != except {
                    flag.store(true, Ordering::Release);
                }
                true
            }
            None => false,
        });
    }

    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type ResetListener = Box<dyn Fn() + Send + Sync>;

pub struct ManagedConnection {
    id: u64,
    factory: Arc<dyn ConnectionFactory>,
    dialect: Arc<dyn Dialect>,
    propagator: Arc<ConnectionPropagator>,
    connection: Option<Box<dyn Connection>>,
    check_valid: Arc<AtomicBool>,
    reset_count: u64,
    on_reset: Option<ResetListener>,
}

impl ManagedConnection {
    pub fn open(
        factory: Arc<dyn ConnectionFactory>,
        dialect: Arc<dyn Dialect>,
        propagator: Arc<ConnectionPropagator>,
    ) -> Result<Self, StorageError> {
        let connection = factory.connect().map_err(StorageError::Connect)?;
        let check_valid = Arc::new(AtomicBool::new(false));
        let id = propagator.register(&check_valid);
        Ok(Self {
            id,
            factory,
            dialect,
            propagator,
            connection: Some(connection),
            check_valid,
            reset_count: 0,
            on_reset: None,
        })
    }

    /// Called after every successful reset.
    pub fn on_reset(&mut self, listener: impl Fn() + Send + Sync + 'static) {
        self.on_reset = Some(Box::new(listener));
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Number of successful resets so far; callers compare it before and after a failure to
    /// know whether the failure was a reset.
    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }

    pub fn is_check_requested(&self) -> bool {
        self.check_valid.load(Ordering::Acquire)
    }

    /// Runs `f` on the live connection. If it fails because the connection is dead, the
    /// connection is reset before the error is returned.
    pub fn with<T>(
        &mut self,
        f: impl FnOnce(&mut dyn Connection) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let result = match self.connection.as_mut() {
            Some(connection) => f(connection.as_mut()),
            None => Err(BackendError::Connection("connection is closed".to_string())),
        };
        if let Err(e) = &result {
            self.check_reset(e);
        }
        result
    }

    fn check_reset(&mut self, e: &BackendError) {
        if !self.dialect.is_connection_closed(e) {
            return;
        }
        if let Err(reset_err) = self.reset() {
            error!(error = ?reset_err, "Could not reset connection {}", self.id);
        }
    }

    /// Closes and reopens the underlying connection, then flags the sibling connections.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        error!("Resetting connection {}", self.id);
        self.close();
        let connection = self.factory.connect().map_err(StorageError::Connect)?;
        self.connection = Some(connection);
        self.reset_count += 1;
        self.check_valid.store(false, Ordering::Release);
        self.propagator.check_connection_valid(self.id);
        if let Some(listener) = &self.on_reset {
            listener();
        }
        Ok(())
    }

    /// Runs the validation query if another connection asked for it, resetting this one if the
    /// query shows it is dead.
    pub fn check_valid(&mut self) -> Result<(), StorageError> {
        // The request stands until validation either passes or resets the connection.
        if !self.check_valid.load(Ordering::Acquire) {
            return Ok(());
        }
        debug!("Validating connection {}", self.id);
        let sql = self.dialect.validation_query().to_string();
        let result = match self.connection.as_mut() {
            Some(connection) => connection.query(&sql, &[]).map(|_| ()),
            None => Err(BackendError::Connection("connection is closed".to_string())),
        };
        match result {
            Ok(()) => {
                self.check_valid.store(false, Ordering::Release);
                Ok(())
            }
            Err(e) if self.dialect.is_connection_closed(&e) => {
                warn!(error = ?e, "Connection {} failed validation", self.id);
                self.reset()
            }
            Err(e) => Err(StorageError::backend("validate", "", None, &sql, e)),
        }
    }

    /// Drops the underlying connection; failures to close are not reported.
    pub fn close(&mut self) {
        self.connection = None;
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }
}

impl Drop for ManagedConnection {
    fn drop(&mut self) {
        self.propagator.unregister(self.id);
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::testing::InstrumentedFactory;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn open(
        factory: &Arc<InstrumentedFactory>,
        propagator: &Arc<ConnectionPropagator>,
    ) -> ManagedConnection {
        ManagedConnection::open(
            factory.clone(),
            Arc::new(SqliteDialect::new()),
            propagator.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_connection_failure_resets_and_flags_siblings() {
        let tmpdir = TempDir::new().unwrap();
        let factory = Arc::new(InstrumentedFactory::new(tmpdir.path().join("c.db")));
        let propagator = Arc::new(ConnectionPropagator::new());
        let mut a = open(&factory, &propagator);
        let b = open(&factory, &propagator);
        let resets = Arc::new(AtomicUsize::new(0));
        let seen = resets.clone();
        a.on_reset(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        factory.counters().fail_next(1);
        let err = a.with(|c| c.query("SELECT 1", &[])).unwrap_err();
        assert!(matches!(err, BackendError::Connection(_)));

        assert_eq!(a.reset_count(), 1);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert!(!a.is_check_requested());
        assert!(b.is_check_requested());
        assert_eq!(factory.counters().connects(), 3);

        // The reset connection works again.
        assert!(a.with(|c| c.query("SELECT 1", &[])).is_ok());
    }

    #[test]
    fn test_statement_failure_does_not_reset() {
        let tmpdir = TempDir::new().unwrap();
        let factory = Arc::new(InstrumentedFactory::new(tmpdir.path().join("c.db")));
        let propagator = Arc::new(ConnectionPropagator::new());
        let mut a = open(&factory, &propagator);
        assert!(a.with(|c| c.query("SELECT * FROM nope", &[])).is_err());
        assert_eq!(a.reset_count(), 0);
    }

    #[test]
    fn test_check_valid_runs_validation_once() {
        let tmpdir = TempDir::new().unwrap();
        let factory = Arc::new(InstrumentedFactory::new(tmpdir.path().join("c.db")));
        let propagator = Arc::new(ConnectionPropagator::new());
        let mut a = open(&factory, &propagator);
        let mut b = open(&factory, &propagator);

        a.reset().unwrap();
        let before = factory.counters().queries();
        b.check_valid().unwrap();
        b.check_valid().unwrap();
        assert_eq!(factory.counters().queries(), before + 1);
        assert_eq!(b.reset_count(), 0);

        // A dead sibling found during validation is reset in turn.
        a.reset().unwrap();
        factory.counters().fail_next(1);
        b.check_valid().unwrap();
        assert_eq!(b.reset_count(), 1);
        assert!(a.is_check_requested());
    }

    #[test]
    fn test_failed_validation_keeps_the_check_pending() {
        let tmpdir = TempDir::new().unwrap();
        let factory = Arc::new(InstrumentedFactory::new(tmpdir.path().join("c.db")));
        let propagator = Arc::new(ConnectionPropagator::new());
        let mut a = open(&factory, &propagator);
        let mut b = open(&factory, &propagator);

        a.reset().unwrap();
        factory.counters().fail_next_statements(1);
        let err = b.check_valid().unwrap_err();
        assert!(matches!(
            err,
            StorageError::Backend {
                source: BackendError::Statement(_),
                ..
            }
        ));
        assert_eq!(b.reset_count(), 0);
        assert!(b.is_check_requested());

        // The next attempt validates again and clears the request.
        let before = factory.counters().queries();
        b.check_valid().unwrap();
        assert_eq!(factory.counters().queries(), before + 1);
        assert!(!b.is_check_requested());
    }

    #[test]
    fn test_dropped_connections_unregister() {
        let tmpdir = TempDir::new().unwrap();
        let factory = Arc::new(InstrumentedFactory::new(tmpdir.path().join("c.db")));
        let propagator = Arc::new(ConnectionPropagator::new());
        let a = open(&factory, &propagator);
        {
            let _b = open(&factory, &propagator);
            assert_eq!(propagator.len(), 2);
        }
        assert_eq!(propagator.len(), 1);
        drop(a);
        assert!(propagator.is_empty());
    }
}
