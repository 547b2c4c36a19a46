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

use crate::connection::ManagedConnection;
use crate::error::StorageError;
use crate::sql_info::{CLUSTER_INVALS_TABLE, CLUSTER_NODES_TABLE, SqlInfo};
use quire_common::{Invalidations, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The cluster node's own connection and the statements it runs on it.
pub(crate) struct ClusterMapper {
    node_id: String,
    conn: ManagedConnection,
    sql: Arc<SqlInfo>,
}

impl ClusterMapper {
    pub(crate) fn new(node_id: String, conn: ManagedConnection, sql: Arc<SqlInfo>) -> Self {
        Self { node_id, conn, sql }
    }

    pub(crate) fn reset_count(&self) -> u64 {
        self.conn.reset_count()
    }

    fn execute(
        &mut self,
        operation: &'static str,
        table: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, StorageError> {
        self.conn
            .with(|c| c.execute(sql, params))
            .map_err(|e| StorageError::backend(operation, table, None, sql, e))
    }

    /// Registers this node, replacing a stale registration left under the same id along with
    /// anything still queued for it.
    pub(crate) fn create_cluster_node(&mut self) -> Result<(), StorageError> {
        let node = Value::from(self.node_id.as_str());
        let purge = self.sql.purge_cluster_invalidations();
        self.execute(
            "purge invalidations in",
            CLUSTER_INVALS_TABLE,
            &purge,
            std::slice::from_ref(&node),
        )?;
        let delete = self.sql.delete_cluster_node();
        self.execute(
            "unregister node in",
            CLUSTER_NODES_TABLE,
            &delete,
            std::slice::from_ref(&node),
        )?;
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let insert = self.sql.insert_cluster_node();
        self.execute(
            "register node in",
            CLUSTER_NODES_TABLE,
            &insert,
            &[node, Value::Long(created)],
        )?;
        Ok(())
    }

    pub(crate) fn remove_cluster_node(&mut self) -> Result<(), StorageError> {
        let delete = self.sql.delete_cluster_node();
        let node = Value::from(self.node_id.as_str());
        self.execute(
            "unregister node in",
            CLUSTER_NODES_TABLE,
            &delete,
            std::slice::from_ref(&node),
        )?;
        let purge = self.sql.purge_cluster_invalidations();
        self.execute("purge invalidations in", CLUSTER_INVALS_TABLE, &purge, &[node])?;
        Ok(())
    }

    /// Queues `invalidations` for every other registered node.
    pub(crate) fn insert_cluster_invalidations(
        &mut self,
        invalidations: &Invalidations,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(invalidations).map_err(|e| StorageError::Codec {
            node: self.node_id.clone(),
            message: e.to_string(),
        })?;
        let insert = self.sql.insert_cluster_invalidations();
        self.execute(
            "send invalidations to",
            CLUSTER_INVALS_TABLE,
            &insert,
            &[Value::from(payload), Value::from(self.node_id.as_str())],
        )?;
        Ok(())
    }

    /// Collects and removes everything queued for this node.
    pub(crate) fn get_cluster_invalidations(&mut self) -> Result<Invalidations, StorageError> {
        let node = Value::from(self.node_id.as_str());
        let select = self.sql.select_cluster_invalidations();
        let rows = self
            .conn
            .with(|c| c.query(&select, std::slice::from_ref(&node)))
            .map_err(|e| {
                StorageError::backend(
                    "receive invalidations from",
                    CLUSTER_INVALS_TABLE,
                    None,
                    &select,
                    e,
                )
            })?;
        let mut invalidations = Invalidations::new();
        let mut max_seq = None;
        for row in rows {
            let (Some(seq), Some(payload)) = (
                row.first().and_then(Value::as_long),
                row.get(1).and_then(Value::as_str),
            ) else {
                return Err(self.codec_error("malformed cluster invalidation row"));
            };
            let received: Invalidations = serde_json::from_str(payload)
                .map_err(|e| self.codec_error(&e.to_string()))?;
            invalidations.merge(&received);
            max_seq = max_seq.max(Some(seq));
        }
        if let Some(max_seq) = max_seq {
            let delete = self.sql.delete_cluster_invalidations();
            self.execute(
                "acknowledge invalidations in",
                CLUSTER_INVALS_TABLE,
                &delete,
                &[node, Value::Long(max_seq)],
            )?;
        }
        Ok(invalidations)
    }

    fn codec_error(&self, message: &str) -> StorageError {
        StorageError::Codec {
            node: self.node_id.clone(),
            message: message.to_string(),
        }
    }

    pub(crate) fn close(&mut self) {
        self.conn.close();
    }
}
