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

//! SQL text for every statement the mappers run, generated from the model and the dialect.

use crate::dialect::Dialect;
use crate::model::*;
use quire_common::ContractError;
use std::sync::Arc;

pub const CLUSTER_NODES_TABLE: &str = "cluster_nodes";
pub const CLUSTER_INVALS_TABLE: &str = "cluster_invals";
pub const CLUSTER_NODE_KEY: &str = "nodeid";
pub const CLUSTER_CREATED_KEY: &str = "created";
pub const CLUSTER_SEQ_KEY: &str = "seq";
pub const CLUSTER_PAYLOAD_KEY: &str = "payload";

/// A statement with the columns its placeholders bind (`params`) and, for selects, the columns
/// of each result row (`what`), both in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<ColumnInfo>,
    pub what: Vec<ColumnInfo>,
}

pub struct SqlInfo {
    model: Arc<Model>,
    dialect: Arc<dyn Dialect>,
}

impl SqlInfo {
    pub fn new(model: Arc<Model>, dialect: Arc<dyn Dialect>) -> Self {
        Self { model, dialect }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    fn q(&self, identifier: &str) -> String {
        self.dialect.quote(identifier)
    }

    fn column_list(&self, alias: Option<&str>, columns: &[ColumnInfo]) -> String {
        columns
            .iter()
            .map(|c| match alias {
                Some(alias) => format!("{alias}.{}", self.q(&c.key)),
                None => self.q(&c.key),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn placeholders(n: usize) -> String {
        vec!["?"; n].join(", ")
    }

    fn with_id(table: &TableInfo) -> Vec<ColumnInfo> {
        let mut columns = vec![table.id_column()];
        columns.extend(table.columns.iter().cloned());
        columns
    }

    /// Selects the rows of `n` ids from a fragment table. Collection rows come back as
    /// `(id, item)`, grouped by id and ordered by position.
    pub fn select_by_ids(&self, table: &str, n: usize) -> Result<Statement, ContractError> {
        let info = self.model.table(table)?;
        let id = info.id_column();
        let what = match info.kind {
            FragmentKind::Simple => Self::with_id(info),
            FragmentKind::Collection { element } => {
                vec![id.clone(), ColumnInfo::new(COLL_ITEM_KEY, element)]
            }
        };
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            self.column_list(None, &what),
            self.q(table),
            self.q(MAIN_KEY),
            Self::placeholders(n)
        );
        if info.is_collection() {
            sql.push_str(&format!(
                " ORDER BY {}, {}",
                self.q(MAIN_KEY),
                self.q(COLL_POS_KEY)
            ));
        }
        Ok(Statement {
            sql,
            params: vec![id; n],
            what,
        })
    }

    /// Inserts one simple row, or one `(id, pos, item)` element of a collection.
    pub fn insert(&self, table: &str) -> Result<Statement, ContractError> {
        let info = self.model.table(table)?;
        let params = Self::with_id(info);
        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.q(table),
                self.column_list(None, &params),
                Self::placeholders(params.len())
            ),
            params,
            what: vec![],
        })
    }

    pub fn update_by_id<'a>(
        &self,
        table: &str,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<Statement, ContractError> {
        let info = self.model.table(table)?;
        let mut params = vec![];
        for key in keys {
            params.push(info.column(key)?.clone());
        }
        let assignments = params
            .iter()
            .map(|c| format!("{} = ?", self.q(&c.key)))
            .collect::<Vec<_>>()
            .join(", ");
        params.push(info.id_column());
        Ok(Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = ?",
                self.q(table),
                assignments,
                self.q(MAIN_KEY)
            ),
            params,
            what: vec![],
        })
    }

    pub fn delete(&self, table: &str) -> Result<Statement, ContractError> {
        let info = self.model.table(table)?;
        Ok(Statement {
            sql: format!(
                "DELETE FROM {} WHERE {} = ?",
                self.q(table),
                self.q(MAIN_KEY)
            ),
            params: vec![info.id_column()],
            what: vec![],
        })
    }

    fn hier(&self) -> Result<&TableInfo, ContractError> {
        self.model.table(HIER_TABLE)
    }

    /// Children of a parent, filtered by the complex-property flag, optionally by name.
    pub fn select_children(&self, by_name: bool) -> Result<Statement, ContractError> {
        let hier = self.hier()?;
        let mut params = vec![hier.column(HIER_PARENT_KEY)?.clone()];
        if by_name {
            params.push(hier.column(HIER_CHILD_NAME_KEY)?.clone());
        }
        params.push(hier.column(HIER_CHILD_ISPROPERTY_KEY)?.clone());
        let what = Self::with_id(hier);
        let criteria = params
            .iter()
            .map(|c| format!("{} = ?", self.q(&c.key)))
            .collect::<Vec<_>>()
            .join(" AND ");
        Ok(Statement {
            sql: format!(
                "SELECT {} FROM {} WHERE {}",
                self.column_list(None, &what),
                self.q(HIER_TABLE),
                criteria
            ),
            params,
            what,
        })
    }

    /// Version rows of a version series, restricted to nodes flagged as versions.
    pub fn select_versions_by_series(&self) -> Result<Statement, ContractError> {
        let versions = self.model.table(VERSION_TABLE)?;
        let hier = self.hier()?;
        let what = Self::with_id(versions);
        Ok(Statement {
            sql: format!(
                "SELECT {} FROM {} v JOIN {} h ON h.{} = v.{} WHERE v.{} = ? AND h.{} = ?",
                self.column_list(Some("v"), &what),
                self.q(VERSION_TABLE),
                self.q(HIER_TABLE),
                self.q(MAIN_KEY),
                self.q(MAIN_KEY),
                self.q(VERSION_VERSIONABLE_KEY),
                self.q(MAIN_IS_VERSION_KEY),
            ),
            params: vec![
                versions.column(VERSION_VERSIONABLE_KEY)?.clone(),
                hier.column(MAIN_IS_VERSION_KEY)?.clone(),
            ],
            what,
        })
    }

    /// Proxy rows by target (or by version series), optionally restricted to one parent.
    pub fn select_proxies(
        &self,
        by_target: bool,
        with_parent: bool,
    ) -> Result<Statement, ContractError> {
        let proxies = self.model.table(PROXY_TABLE)?;
        let what = Self::with_id(proxies);
        let key = if by_target {
            PROXY_TARGET_KEY
        } else {
            PROXY_VERSIONABLE_KEY
        };
        let mut params = vec![proxies.column(key)?.clone()];
        let mut sql = format!(
            "SELECT {} FROM {} p",
            self.column_list(Some("p"), &what),
            self.q(PROXY_TABLE)
        );
        if with_parent {
            sql.push_str(&format!(
                " JOIN {} h ON h.{} = p.{}",
                self.q(HIER_TABLE),
                self.q(MAIN_KEY),
                self.q(MAIN_KEY)
            ));
        }
        sql.push_str(&format!(" WHERE p.{} = ?", self.q(key)));
        if with_parent {
            sql.push_str(&format!(" AND h.{} = ?", self.q(HIER_PARENT_KEY)));
            params.push(self.hier()?.column(HIER_PARENT_KEY)?.clone());
        }
        Ok(Statement { sql, params, what })
    }

    /// Child ids with their types, for walking a subtree.
    pub fn select_children_ids_and_types(
        &self,
        only_complex: bool,
    ) -> Result<Statement, ContractError> {
        let hier = self.hier()?;
        let what = vec![
            hier.id_column(),
            hier.column(MAIN_PRIMARY_TYPE_KEY)?.clone(),
            hier.column(MAIN_MIXIN_TYPES_KEY)?.clone(),
        ];
        let mut params = vec![hier.column(HIER_PARENT_KEY)?.clone()];
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.column_list(None, &what),
            self.q(HIER_TABLE),
            self.q(HIER_PARENT_KEY)
        );
        if only_complex {
            sql.push_str(&format!(" AND {} = ?", self.q(HIER_CHILD_ISPROPERTY_KEY)));
            params.push(hier.column(HIER_CHILD_ISPROPERTY_KEY)?.clone());
        }
        Ok(Statement { sql, params, what })
    }

    /// Copies one hierarchy row under a new id. The params are the new id, the new parent, the
    /// explicit name if any, the cleared version-tracking columns when snapshotting a version,
    /// and finally the source id.
    pub fn copy_hier(
        &self,
        explicit_name: bool,
        create_version: bool,
    ) -> Result<Statement, ContractError> {
        let hier = self.hier()?;
        let mut overridden = vec![hier.id_column(), hier.column(HIER_PARENT_KEY)?.clone()];
        if explicit_name {
            overridden.push(hier.column(HIER_CHILD_NAME_KEY)?.clone());
        }
        if create_version {
            overridden.push(hier.column(MAIN_BASE_VERSION_KEY)?.clone());
            overridden.push(hier.column(MAIN_CHECKED_IN_KEY)?.clone());
        }
        let copied: Vec<ColumnInfo> = hier
            .columns
            .iter()
            .filter(|c| !overridden.iter().any(|o| o.key == c.key))
            .cloned()
            .collect();
        let mut insert_columns = overridden.clone();
        insert_columns.extend(copied.iter().cloned());
        let mut selected = vec!["?".to_string(); overridden.len()];
        selected.extend(copied.iter().map(|c| self.q(&c.key)));
        let mut params = overridden;
        params.push(hier.id_column());
        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) SELECT {} FROM {} WHERE {} = ?",
                self.q(HIER_TABLE),
                self.column_list(None, &insert_columns),
                selected.join(", "),
                self.q(HIER_TABLE),
                self.q(MAIN_KEY)
            ),
            params,
            what: vec![],
        })
    }

    /// Copies all rows of one id in a fragment table to a new id.
    pub fn copy_rows(&self, table: &str) -> Result<Statement, ContractError> {
        let info = self.model.table(table)?;
        let columns = self.column_list(None, &info.columns);
        Ok(Statement {
            sql: format!(
                "INSERT INTO {t} ({id}, {columns}) SELECT ?, {columns} FROM {t} WHERE {id} = ?",
                t = self.q(table),
                id = self.q(MAIN_KEY),
            ),
            params: vec![info.id_column(), info.id_column()],
            what: vec![],
        })
    }

    /// DDL for every fragment table and its indexes.
    pub fn create_schema(&self) -> Vec<String> {
        let mut ddl = vec![];
        for table in self.model.tables() {
            let id = format!(
                "{} {} NOT NULL",
                self.q(MAIN_KEY),
                self.dialect.sql_type(ColumnType::Id)
            );
            let mut defs = vec![id];
            defs.extend(table.columns.iter().map(|c| {
                format!("{} {}", self.q(&c.key), self.dialect.sql_type(c.ty))
            }));
            match table.kind {
                FragmentKind::Simple => defs.push(format!("PRIMARY KEY ({})", self.q(MAIN_KEY))),
                FragmentKind::Collection { .. } => defs.push(format!(
                    "PRIMARY KEY ({}, {})",
                    self.q(MAIN_KEY),
                    self.q(COLL_POS_KEY)
                )),
            }
            ddl.push(format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                self.q(&table.name),
                defs.join(", ")
            ));
        }
        for (table, key) in [
            (HIER_TABLE, HIER_PARENT_KEY),
            (VERSION_TABLE, VERSION_VERSIONABLE_KEY),
            (PROXY_TABLE, PROXY_TARGET_KEY),
            (PROXY_TABLE, PROXY_VERSIONABLE_KEY),
        ] {
            ddl.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                self.q(&format!("{table}_{key}_idx")),
                self.q(table),
                self.q(key)
            ));
        }
        ddl
    }

    pub fn create_cluster_schema(&self) -> Vec<String> {
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({} {} PRIMARY KEY, {} {})",
                self.q(CLUSTER_NODES_TABLE),
                self.q(CLUSTER_NODE_KEY),
                self.dialect.sql_type(ColumnType::String),
                self.q(CLUSTER_CREATED_KEY),
                self.dialect.sql_type(ColumnType::Long),
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({} {}, {} {} NOT NULL, {} {} NOT NULL)",
                self.q(CLUSTER_INVALS_TABLE),
                self.q(CLUSTER_SEQ_KEY),
                self.dialect.serial_primary_key(),
                self.q(CLUSTER_NODE_KEY),
                self.dialect.sql_type(ColumnType::String),
                self.q(CLUSTER_PAYLOAD_KEY),
                self.dialect.sql_type(ColumnType::String),
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                self.q("cluster_invals_nodeid_idx"),
                self.q(CLUSTER_INVALS_TABLE),
                self.q(CLUSTER_NODE_KEY)
            ),
        ]
    }

    pub fn insert_cluster_node(&self) -> String {
        format!(
            "INSERT INTO {} ({}, {}) VALUES (?, ?)",
            self.q(CLUSTER_NODES_TABLE),
            self.q(CLUSTER_NODE_KEY),
            self.q(CLUSTER_CREATED_KEY)
        )
    }

    pub fn delete_cluster_node(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {} = ?",
            self.q(CLUSTER_NODES_TABLE),
            self.q(CLUSTER_NODE_KEY)
        )
    }

    /// Queues one payload for every registered node except the sender.
    pub fn insert_cluster_invalidations(&self) -> String {
        format!(
            "INSERT INTO {i} ({n}, {p}) SELECT {n}, ? FROM {t} WHERE {n} <> ?",
            i = self.q(CLUSTER_INVALS_TABLE),
            t = self.q(CLUSTER_NODES_TABLE),
            n = self.q(CLUSTER_NODE_KEY),
            p = self.q(CLUSTER_PAYLOAD_KEY),
        )
    }

    pub fn select_cluster_invalidations(&self) -> String {
        format!(
            "SELECT {s}, {p} FROM {i} WHERE {n} = ? ORDER BY {s}",
            i = self.q(CLUSTER_INVALS_TABLE),
            n = self.q(CLUSTER_NODE_KEY),
            s = self.q(CLUSTER_SEQ_KEY),
            p = self.q(CLUSTER_PAYLOAD_KEY),
        )
    }

    /// Drops everything queued for a node, acknowledged or not.
    pub fn purge_cluster_invalidations(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {} = ?",
            self.q(CLUSTER_INVALS_TABLE),
            self.q(CLUSTER_NODE_KEY),
        )
    }

    pub fn delete_cluster_invalidations(&self) -> String {
        format!(
            "DELETE FROM {i} WHERE {n} = ? AND {s} <= ?",
            i = self.q(CLUSTER_INVALS_TABLE),
            n = self.q(CLUSTER_NODE_KEY),
            s = self.q(CLUSTER_SEQ_KEY),
        )
    }
}
