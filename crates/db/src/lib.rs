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

//! Row-level storage for fragment-based documents on a relational backend.
//!
//! A document node is stored as a set of fragment rows sharing its id: one hierarchy row, plus
//! rows in the simple and collection fragment tables its types call for. The `RowMapper`
//! reads and writes those rows for one session; invalidations keep the caches of the other
//! sessions, local or on other cluster nodes, coherent with what was written.

pub use crate::backend::{Connection, ConnectionFactory, SqliteConnectionFactory};
pub use crate::cluster::{ClusterNodeHandler, ClusterRegistry};
pub use crate::config::{ClusteringConfig, RepositoryConfig};
pub use crate::connection::{ConnectionPropagator, ManagedConnection};
pub use crate::dialect::{Dialect, SqliteDialect};
pub use crate::error::{BackendError, StorageError};
pub use crate::invalidations::{InvalidationsPropagator, InvalidationsQueue};
pub use crate::model::{ColumnType, FragmentKind, IdWithTypes, Model, ModelBuilder};
pub use crate::repository::Repository;
pub use crate::row_mapper::{CopyHierarchyResult, MapperSettings, RowMapper};

pub mod backend;
pub mod cluster;
pub mod config;
mod connection;
mod dialect;
mod error;
mod invalidations;
pub mod model;
mod repository;
mod row_mapper;
pub mod sql_info;

#[cfg(test)]
mod testing;
