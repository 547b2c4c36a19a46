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

use crate::backend::ConnectionFactory;
use crate::cluster::mapper::ClusterMapper;
use crate::connection::{ConnectionPropagator, ManagedConnection};
use crate::dialect::Dialect;
use crate::error::StorageError;
use crate::invalidations::InvalidationsPropagator;
use crate::sql_info::SqlInfo;
use minstant::Instant;
use quire_common::Invalidations;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct ClusterState {
    mapper: ClusterMapper,
    /// When the backend was last polled; `None` makes the next poll due immediately.
    last_poll: Option<Instant>,
    closed: bool,
}

/// This repository instance's membership in the cluster.
///
/// Polling the backend for remote invalidations is rate-limited to once per
/// `clustering_delay`. All backend access goes through one connection and is serialized.
pub struct ClusterNodeHandler {
    node_id: String,
    clustering_delay: Duration,
    propagator: Arc<InvalidationsPropagator>,
    state: Mutex<ClusterState>,
}

impl ClusterNodeHandler {
    /// Opens the node's connection and registers the node.
    ///
    /// Whenever that connection has to be reset, invalidations sent to this node while it was
    /// unreachable may have been lost, so every local session is told to forget everything.
    pub fn new(
        node_id: impl Into<String>,
        clustering_delay: Duration,
        sql: Arc<SqlInfo>,
        factory: Arc<dyn ConnectionFactory>,
        dialect: Arc<dyn Dialect>,
        connections: Arc<ConnectionPropagator>,
        propagator: Arc<InvalidationsPropagator>,
    ) -> Result<Self, StorageError> {
        let node_id = node_id.into();
        let mut conn = ManagedConnection::open(factory, dialect, connections)?;
        let on_reset = propagator.clone();
        conn.on_reset(move || connection_was_reset(&on_reset));
        let mut mapper = ClusterMapper::new(node_id.clone(), conn, sql);
        mapper.create_cluster_node()?;
        info!("Registered cluster node {node_id}");
        Ok(Self {
            node_id,
            clustering_delay,
            propagator,
            state: Mutex::new(ClusterState {
                mapper,
                last_poll: None,
                closed: false,
            }),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn clustering_delay(&self) -> Duration {
        self.clustering_delay
    }

    pub fn propagator(&self) -> &Arc<InvalidationsPropagator> {
        &self.propagator
    }

    /// Makes the next `receive_cluster_invalidations` poll regardless of the delay.
    pub fn process_next_poll(&self) {
        self.state.lock().unwrap().last_poll = None;
    }

    /// Collects invalidations sent by other nodes, or `None` if the last poll was less than
    /// `clustering_delay` ago or the node is closed.
    ///
    /// If the poll fails because the connection had to be reset, it is retried once on the new
    /// connection.
    pub fn receive_cluster_invalidations(&self) -> Result<Option<Invalidations>, StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Ok(None);
        }
        if let Some(last_poll) = state.last_poll
            && last_poll.elapsed() < self.clustering_delay
        {
            return Ok(None);
        }
        let resets = state.mapper.reset_count();
        let invalidations = match state.mapper.get_cluster_invalidations() {
            Ok(invalidations) => invalidations,
            Err(e) if state.mapper.reset_count() > resets => {
                warn!(error = ?e, "Cluster connection was reset while polling; retrying");
                state.mapper.get_cluster_invalidations()?
            }
            Err(e) => return Err(e),
        };
        state.last_poll = Some(Instant::now());
        if !invalidations.is_empty() {
            debug!("Node {} received {invalidations}", self.node_id);
        }
        Ok(Some(invalidations))
    }

    /// Queues `invalidations` for every other node. Empty sets are not sent, and a closed node
    /// sends nothing.
    pub fn send_cluster_invalidations(
        &self,
        invalidations: &Invalidations,
    ) -> Result<(), StorageError> {
        if invalidations.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Ok(());
        }
        state.mapper.insert_cluster_invalidations(invalidations)
    }

    /// Delivers invalidations received from the cluster to every local session.
    pub fn propagate_invalidations(&self, invalidations: &Invalidations) {
        self.propagator.propagate(invalidations, None);
    }

    pub fn connection_was_reset(&self) {
        connection_was_reset(&self.propagator);
    }

    /// Unregisters the node and closes its connection. Failing to unregister is logged, not
    /// returned. Closing twice is harmless.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Err(e) = state.mapper.remove_cluster_node() {
            error!(error = ?e, "Could not unregister cluster node {}", self.node_id);
        }
        state.mapper.close();
        info!("Closed cluster node {}", self.node_id);
    }
}

impl Drop for ClusterNodeHandler {
    fn drop(&mut self) {
        self.close();
    }
}

fn connection_was_reset(propagator: &InvalidationsPropagator) {
    warn!("Cluster connection was reset; invalidating all local caches");
    propagator.propagate(&Invalidations::everything(), None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::invalidations::InvalidationsQueue;
    use crate::model::Model;
    use crate::testing::InstrumentedFactory;
    use quire_common::RowId;
    use tempfile::TempDir;

    struct Node {
        handler: ClusterNodeHandler,
        factory: Arc<InstrumentedFactory>,
        queue: Arc<InvalidationsQueue>,
    }

    fn node(tmpdir: &TempDir, node_id: &str, delay: Duration) -> Node {
        let dialect: Arc<dyn Dialect> = Arc::new(SqliteDialect::new());
        let sql = Arc::new(SqlInfo::new(
            Arc::new(Model::builder().build().unwrap()),
            dialect.clone(),
        ));
        let factory = Arc::new(InstrumentedFactory::new(tmpdir.path().join("cluster.db")));
        {
            let mut conn = ManagedConnection::open(
                factory.clone(),
                dialect.clone(),
                Arc::new(ConnectionPropagator::new()),
            )
            .unwrap();
            for ddl in sql.create_cluster_schema() {
                conn.with(|c| c.execute_batch(&ddl)).unwrap();
            }
        }
        let propagator = Arc::new(InvalidationsPropagator::new());
        let queue = Arc::new(InvalidationsQueue::new(node_id));
        propagator.add_queue(queue.clone());
        let handler = ClusterNodeHandler::new(
            node_id,
            delay,
            sql,
            factory.clone(),
            dialect,
            Arc::new(ConnectionPropagator::new()),
            propagator,
        )
        .unwrap();
        Node {
            handler,
            factory,
            queue,
        }
    }

    fn modified(table: &str, id: &str) -> Invalidations {
        let mut inv = Invalidations::new();
        inv.add_modified(RowId::new(table, id));
        inv
    }

    #[test]
    fn test_poll_is_gated_by_clustering_delay() {
        let tmpdir = TempDir::new().unwrap();
        let a = node(&tmpdir, "a", Duration::from_secs(3600));

        assert!(a.handler.receive_cluster_invalidations().unwrap().is_some());
        let queries = a.factory.counters().queries();
        assert_eq!(a.handler.receive_cluster_invalidations().unwrap(), None);
        assert_eq!(a.factory.counters().queries(), queries);

        a.handler.process_next_poll();
        assert!(a.handler.receive_cluster_invalidations().unwrap().is_some());
        assert_eq!(a.factory.counters().queries(), queries + 1);
    }

    #[test]
    fn test_invalidations_reach_other_nodes_only() {
        let tmpdir = TempDir::new().unwrap();
        let a = node(&tmpdir, "a", Duration::ZERO);
        let b = node(&tmpdir, "b", Duration::ZERO);
        let c = node(&tmpdir, "c", Duration::ZERO);

        let sent = modified("dublincore", "x");
        a.handler.send_cluster_invalidations(&sent).unwrap();

        let nothing = Some(Invalidations::new());
        assert_eq!(a.handler.receive_cluster_invalidations().unwrap(), nothing);
        assert_eq!(b.handler.receive_cluster_invalidations().unwrap(), Some(sent.clone()));
        assert_eq!(c.handler.receive_cluster_invalidations().unwrap(), Some(sent));
        // Delivered exactly once.
        assert_eq!(b.handler.receive_cluster_invalidations().unwrap(), nothing);
    }

    #[test]
    fn test_pending_invalidations_are_merged() {
        let tmpdir = TempDir::new().unwrap();
        let a = node(&tmpdir, "a", Duration::ZERO);
        let b = node(&tmpdir, "b", Duration::ZERO);

        let x = modified("dublincore", "x");
        a.handler.send_cluster_invalidations(&x).unwrap();
        let mut deleted = Invalidations::new();
        deleted.add_deleted(RowId::new("dublincore", "x"));
        a.handler.send_cluster_invalidations(&deleted).unwrap();

        let received = b.handler.receive_cluster_invalidations().unwrap().unwrap();
        assert_eq!(received, deleted);
    }

    #[test]
    fn test_sending_nothing_touches_nothing() {
        let tmpdir = TempDir::new().unwrap();
        let a = node(&tmpdir, "a", Duration::ZERO);
        let executes = a.factory.counters().executes();
        a.handler.send_cluster_invalidations(&Invalidations::new()).unwrap();
        assert_eq!(a.factory.counters().executes(), executes);
    }

    #[test]
    fn test_reset_during_poll_retries_once_and_invalidates_everything() {
        let tmpdir = TempDir::new().unwrap();
        let a = node(&tmpdir, "a", Duration::ZERO);
        let b = node(&tmpdir, "b", Duration::ZERO);
        let sent = modified("dublincore", "x");
        a.handler.send_cluster_invalidations(&sent).unwrap();

        b.factory.counters().fail_next(1);
        let received = b.handler.receive_cluster_invalidations().unwrap();
        assert_eq!(received, Some(sent));
        assert!(b.queue.drain().is_all());
        assert!(a.queue.drain().is_empty());
    }

    #[test]
    fn test_second_failure_is_returned() {
        let tmpdir = TempDir::new().unwrap();
        let a = node(&tmpdir, "a", Duration::ZERO);
        a.factory.counters().fail_next(2);
        assert!(a.handler.receive_cluster_invalidations().is_err());
    }

    #[test]
    fn test_connection_was_reset_broadcasts_all() {
        let tmpdir = TempDir::new().unwrap();
        let a = node(&tmpdir, "a", Duration::ZERO);
        a.handler.connection_was_reset();
        assert_eq!(a.queue.drain(), Invalidations::everything());
    }

    #[test]
    fn test_closed_node_no_longer_receives() {
        let tmpdir = TempDir::new().unwrap();
        let a = node(&tmpdir, "a", Duration::ZERO);
        let b = node(&tmpdir, "b", Duration::ZERO);
        b.handler.close();
        b.handler.close();
        assert_eq!(b.handler.receive_cluster_invalidations().unwrap(), None);
        let x = modified("dublincore", "x");
        a.handler.send_cluster_invalidations(&x).unwrap();

        let c = node(&tmpdir, "c", Duration::ZERO);
        let received = c.handler.receive_cluster_invalidations().unwrap();
        assert_eq!(received, Some(Invalidations::new()));
    }
}
