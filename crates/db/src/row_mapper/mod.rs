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

//! Translation between logical fragment rows and the SQL statements that persist them.
//!
//! A `RowMapper` belongs to one session and owns one backend connection. It also owns the
//! session's invalidations queue, registered with the repository's propagator for as long as
//! the mapper lives.

mod copy;
mod read;
mod write;

pub use copy::CopyHierarchyResult;

use crate::cluster::ClusterNodeHandler;
use crate::connection::ManagedConnection;
use crate::error::StorageError;
use crate::invalidations::{InvalidationsPropagator, InvalidationsQueue};
use crate::model::{ColumnInfo, Model};
use crate::sql_info::{SqlInfo, Statement};
use quire_common::{Id, Invalidations, Value};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperSettings {
    /// Largest number of ids sent in one `IN (...)` list.
    pub max_in_list: usize,
    /// Rename extra children found under a duplicated name instead of only reporting them.
    pub repair_duplicate_child_names: bool,
}

pub struct RowMapper {
    model: Arc<Model>,
    sql: Arc<SqlInfo>,
    conn: ManagedConnection,
    propagator: Arc<InvalidationsPropagator>,
    queue: Arc<InvalidationsQueue>,
    cluster: Option<Arc<ClusterNodeHandler>>,
    settings: MapperSettings,
}

impl RowMapper {
    pub fn new(
        sql: Arc<SqlInfo>,
        conn: ManagedConnection,
        propagator: Arc<InvalidationsPropagator>,
        cluster: Option<Arc<ClusterNodeHandler>>,
        settings: MapperSettings,
    ) -> Self {
        let queue = Arc::new(InvalidationsQueue::new(format!("mapper-{}", conn.id())));
        propagator.add_queue(queue.clone());
        Self {
            model: sql.model().clone(),
            sql,
            conn,
            propagator,
            queue,
            cluster,
            settings,
        }
    }

    pub fn queue(&self) -> &Arc<InvalidationsQueue> {
        &self.queue
    }

    pub fn connection(&self) -> &ManagedConnection {
        &self.conn
    }

    /// Validates the connection if a sibling reset asked for it, then opens a transaction.
    pub fn begin(&mut self) -> Result<(), StorageError> {
        self.conn.check_valid()?;
        let sql = self.sql.dialect().begin_sql().to_string();
        self.batch("begin transaction", &sql)
    }

    pub fn commit(&mut self) -> Result<(), StorageError> {
        let sql = self.sql.dialect().commit_sql().to_string();
        self.batch("commit transaction", &sql)
    }

    pub fn rollback(&mut self) -> Result<(), StorageError> {
        let sql = self.sql.dialect().rollback_sql().to_string();
        self.batch("roll back transaction", &sql)
    }

    /// Invalidations this session must apply before reading: those pushed by other local
    /// sessions plus, when clustered, those received from other nodes. `None` if nothing
    /// changed.
    pub fn receive_invalidations(&mut self) -> Result<Option<Invalidations>, StorageError> {
        self.conn.check_valid()?;
        if let Some(cluster) = &self.cluster
            && let Some(remote) = cluster.receive_cluster_invalidations()?
            && !remote.is_empty()
        {
            debug!("Received cluster invalidations: {remote}");
            cluster.propagate_invalidations(&remote);
        }
        let invalidations = self.queue.drain();
        Ok((!invalidations.is_empty()).then_some(invalidations))
    }

    /// Publishes this session's committed changes to the other local sessions and, when
    /// clustered, to the other nodes.
    pub fn send_invalidations(
        &mut self,
        invalidations: &Invalidations,
    ) -> Result<(), StorageError> {
        if invalidations.is_empty() {
            return Ok(());
        }
        self.propagator.propagate(invalidations, Some(&self.queue));
        if let Some(cluster) = &self.cluster {
            cluster.send_cluster_invalidations(invalidations)?;
        }
        Ok(())
    }

    fn encode(&self, column: &ColumnInfo, value: &Value) -> Result<Value, StorageError> {
        self.sql
            .dialect()
            .encode(value, column.ty)
            .map_err(|e| StorageError::backend("encode", &column.key, None, "", e))
    }

    fn encode_params<'a>(
        &self,
        stmt: &Statement,
        values: impl IntoIterator<Item = &'a Value>,
    ) -> Result<Vec<Value>, StorageError> {
        stmt.params
            .iter()
            .zip(values)
            .map(|(column, value)| self.encode(column, value))
            .collect()
    }

    /// Decodes one result row against the statement's `what` columns.
    fn decode_row(
        &self,
        stmt: &Statement,
        table: &str,
        raw: Vec<Value>,
    ) -> Result<Vec<Value>, StorageError> {
        stmt.what
            .iter()
            .zip(raw)
            .map(|(column, raw)| {
                self.sql
                    .dialect()
                    .decode(&column.key, raw, column.ty)
                    .map_err(|e| StorageError::backend("decode", table, None, &stmt.sql, e))
            })
            .collect()
    }

    fn execute(
        &mut self,
        operation: &'static str,
        table: &str,
        id: Option<&Id>,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, StorageError> {
        trace!(sql, params = params.len(), "execute");
        self.conn
            .with(|c| c.execute(sql, params))
            .map_err(|e| StorageError::backend(operation, table, id, sql, e))
    }

    fn query(
        &mut self,
        operation: &'static str,
        table: &str,
        id: Option<&Id>,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Vec<Value>>, StorageError> {
        trace!(sql, params = params.len(), "query");
        self.conn
            .with(|c| c.query(sql, params))
            .map_err(|e| StorageError::backend(operation, table, id, sql, e))
    }

    fn batch(&mut self, operation: &'static str, sql: &str) -> Result<(), StorageError> {
        self.conn
            .with(|c| c.execute_batch(sql))
            .map_err(|e| StorageError::backend(operation, "", None, sql, e))
    }
}

impl Drop for RowMapper {
    fn drop(&mut self) {
        self.propagator.remove_queue(&self.queue);
    }
}

fn decode_id(table: &str, value: &Value) -> Result<Id, StorageError> {
    value.as_id().ok_or_else(|| {
        StorageError::backend(
            "decode",
            table,
            None,
            "",
            crate::error::BackendError::Decode {
                column: crate::model::MAIN_KEY.to_string(),
                message: format!("expected an id, got {value}"),
            },
        )
    })
}
