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
use crate::cluster::{ClusterNodeHandler, ClusterRegistry};
use crate::config::RepositoryConfig;
use crate::connection::{ConnectionPropagator, ManagedConnection};
use crate::dialect::Dialect;
use crate::error::StorageError;
use crate::invalidations::InvalidationsPropagator;
use crate::model::Model;
use crate::row_mapper::{MapperSettings, RowMapper};
use crate::sql_info::SqlInfo;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// A repository instance: the model, the backend, and the shared state of its sessions.
pub struct Repository {
    config: RepositoryConfig,
    sql: Arc<SqlInfo>,
    factory: Arc<dyn ConnectionFactory>,
    connections: Arc<ConnectionPropagator>,
    propagator: Arc<InvalidationsPropagator>,
    registry: Arc<ClusterRegistry>,
    cluster: Option<Arc<ClusterNodeHandler>>,
}

impl Repository {
    /// Creates the schema if configured to, and joins the cluster if clustering is enabled.
    ///
    /// When `registry` already holds a node for this repository name, that node and its session
    /// queues are shared instead of registering a second node.
    pub fn open(
        config: RepositoryConfig,
        model: Model,
        dialect: Arc<dyn Dialect>,
        factory: Arc<dyn ConnectionFactory>,
        registry: Arc<ClusterRegistry>,
    ) -> Result<Self, StorageError> {
        let sql = Arc::new(SqlInfo::new(Arc::new(model), dialect.clone()));
        let connections = Arc::new(ConnectionPropagator::new());
        if config.create_schema {
            let mut conn =
                ManagedConnection::open(factory.clone(), dialect.clone(), connections.clone())?;
            let mut ddl = sql.create_schema();
            if config.clustering.enabled {
                ddl.extend(sql.create_cluster_schema());
            }
            for statement in ddl {
                conn.with(|c| c.execute_batch(&statement))
                    .map_err(|e| StorageError::backend("create", "schema", None, &statement, e))?;
            }
        }
        let (cluster, propagator) = if config.clustering.enabled {
            let handler = registry.get_or_create(&config.name, || {
                let node_id = config
                    .clustering
                    .node_id
                    .clone()
                    .unwrap_or_else(|| Uuid::now_v7().to_string());
                ClusterNodeHandler::new(
                    node_id,
                    config.clustering.delay,
                    sql.clone(),
                    factory.clone(),
                    dialect.clone(),
                    connections.clone(),
                    Arc::new(InvalidationsPropagator::new()),
                )
            })?;
            let propagator = handler.propagator().clone();
            (Some(handler), propagator)
        } else {
            (None, Arc::new(InvalidationsPropagator::new()))
        };
        info!(
            "Opened repository {} (cluster node: {})",
            config.name,
            cluster.as_ref().map(|c| c.node_id()).unwrap_or("none")
        );
        Ok(Self {
            config,
            sql,
            factory,
            connections,
            propagator,
            registry,
            cluster,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<Model> {
        self.sql.model()
    }

    pub fn propagator(&self) -> &Arc<InvalidationsPropagator> {
        &self.propagator
    }

    pub fn cluster_node_handler(&self) -> Option<&Arc<ClusterNodeHandler>> {
        self.cluster.as_ref()
    }

    /// A mapper for a new session, on its own connection.
    pub fn new_mapper(&self) -> Result<RowMapper, StorageError> {
        let dialect = self.sql.dialect().clone();
        let max_in_list = match self.config.max_in_list {
            Some(max) => max.min(dialect.max_in_list()).max(1),
            None => dialect.max_in_list(),
        };
        let conn =
            ManagedConnection::open(self.factory.clone(), dialect, self.connections.clone())?;
        Ok(RowMapper::new(
            self.sql.clone(),
            conn,
            self.propagator.clone(),
            self.cluster.clone(),
            MapperSettings {
                max_in_list,
                repair_duplicate_child_names: self.config.repair_duplicate_child_names,
            },
        ))
    }

    /// Leaves the cluster. Mappers already handed out keep working locally.
    pub fn close(&self) {
        if self.cluster.is_some() {
            self.registry.close(&self.config.name);
        }
    }
}
