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

//! The storage model: which fragment tables exist, their columns, and which fragments make up
//! each document type.

use indexmap::{IndexMap, IndexSet};
use quire_common::{ContractError, Id};
use std::collections::HashMap;

pub const MAIN_KEY: &str = "id";

pub const HIER_TABLE: &str = "hierarchy";
pub const HIER_PARENT_KEY: &str = "parentid";
pub const HIER_CHILD_NAME_KEY: &str = "name";
pub const HIER_CHILD_POS_KEY: &str = "pos";
pub const HIER_CHILD_ISPROPERTY_KEY: &str = "isproperty";
pub const MAIN_PRIMARY_TYPE_KEY: &str = "primarytype";
pub const MAIN_MIXIN_TYPES_KEY: &str = "mixintypes";
pub const MAIN_IS_VERSION_KEY: &str = "isversion";
pub const MAIN_BASE_VERSION_KEY: &str = "baseversionid";
pub const MAIN_CHECKED_IN_KEY: &str = "ischeckedin";

pub const VERSION_TABLE: &str = "versions";
pub const VERSION_VERSIONABLE_KEY: &str = "versionableid";
pub const VERSION_LABEL_KEY: &str = "label";
pub const VERSION_IS_LATEST_KEY: &str = "islatest";

pub const PROXY_TABLE: &str = "proxies";
pub const PROXY_TARGET_KEY: &str = "targetid";
pub const PROXY_VERSIONABLE_KEY: &str = "versionableid";

pub const ACL_TABLE: &str = "acls";

pub const COLL_POS_KEY: &str = "pos";
pub const COLL_ITEM_KEY: &str = "item";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Id,
    String,
    Long,
    Double,
    Boolean,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub key: String,
    pub ty: ColumnType,
}

impl ColumnInfo {
    pub fn new(key: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            key: key.into(),
            ty,
        }
    }
}

/// Storage shape of a fragment table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// One row per id.
    Simple,
    /// Zero or more `(id, pos, item)` rows per id, read back as one ordered array.
    Collection { element: ColumnType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub kind: FragmentKind,
    /// Every column except the id column.
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, FragmentKind::Collection { .. })
    }

    pub fn column(&self, key: &str) -> Result<&ColumnInfo, ContractError> {
        self.columns
            .iter()
            .find(|c| c.key == key)
            .ok_or_else(|| ContractError::UnknownColumn {
                table: self.name.clone(),
                key: key.to_string(),
            })
    }

    pub fn id_column(&self) -> ColumnInfo {
        ColumnInfo::new(MAIN_KEY, ColumnType::Id)
    }
}

/// A node id together with the types that decide which fragments it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdWithTypes {
    pub id: Id,
    pub primary_type: String,
    pub mixin_types: Vec<String>,
}

impl IdWithTypes {
    pub fn new(
        id: impl Into<Id>,
        primary_type: impl Into<String>,
        mixin_types: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            primary_type: primary_type.into(),
            mixin_types,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    tables: IndexMap<String, TableInfo>,
    type_fragments: HashMap<String, Vec<String>>,
    mixin_fragments: HashMap<String, Vec<String>>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    pub fn table(&self, name: &str) -> Result<&TableInfo, ContractError> {
        self.tables
            .get(name)
            .ok_or_else(|| ContractError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn is_collection_fragment(&self, name: &str) -> Result<bool, ContractError> {
        Ok(self.table(name)?.is_collection())
    }

    pub fn generate_id(&self) -> Id {
        Id::generate()
    }

    /// Fragment tables of a node: the hierarchy, the fragments of its primary type and of each
    /// mixin, and the ACLs. Unknown types contribute nothing.
    pub fn fragments_of(&self, types: &IdWithTypes) -> IndexSet<&str> {
        let mut fragments = IndexSet::new();
        fragments.insert(HIER_TABLE);
        let primary = self.type_fragments.get(&types.primary_type);
        let mixins = types
            .mixin_types
            .iter()
            .filter_map(|mixin| self.mixin_fragments.get(mixin));
        for fragment in primary.into_iter().chain(mixins).flatten() {
            fragments.insert(fragment.as_str());
        }
        fragments.insert(ACL_TABLE);
        fragments
    }

    /// Groups ids by the fragment tables they have rows in.
    pub fn per_fragment_ids<'a>(
        &self,
        nodes: impl IntoIterator<Item = &'a IdWithTypes>,
    ) -> IndexMap<String, IndexSet<Id>> {
        let mut result: IndexMap<String, IndexSet<Id>> = IndexMap::new();
        for node in nodes {
            for fragment in self.fragments_of(node) {
                result
                    .entry(fragment.to_string())
                    .or_default()
                    .insert(node.id.clone());
            }
        }
        result
    }
}

pub struct ModelBuilder {
    tables: IndexMap<String, TableInfo>,
    type_fragments: HashMap<String, Vec<String>>,
    mixin_fragments: HashMap<String, Vec<String>>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    /// A builder already holding the system tables.
    pub fn new() -> Self {
        let builder = Self {
            tables: IndexMap::new(),
            type_fragments: HashMap::new(),
            mixin_fragments: HashMap::new(),
        };
        builder
            .simple_fragment(
                HIER_TABLE,
                &[
                    (HIER_PARENT_KEY, ColumnType::Id),
                    (HIER_CHILD_POS_KEY, ColumnType::Long),
                    (HIER_CHILD_NAME_KEY, ColumnType::String),
                    (HIER_CHILD_ISPROPERTY_KEY, ColumnType::Boolean),
                    (MAIN_PRIMARY_TYPE_KEY, ColumnType::String),
                    (MAIN_MIXIN_TYPES_KEY, ColumnType::Array),
                    (MAIN_IS_VERSION_KEY, ColumnType::Boolean),
                    (MAIN_BASE_VERSION_KEY, ColumnType::Id),
                    (MAIN_CHECKED_IN_KEY, ColumnType::Boolean),
                ],
            )
            .simple_fragment(
                VERSION_TABLE,
                &[
                    (VERSION_VERSIONABLE_KEY, ColumnType::Id),
                    (VERSION_LABEL_KEY, ColumnType::String),
                    (VERSION_IS_LATEST_KEY, ColumnType::Boolean),
                ],
            )
            .simple_fragment(
                PROXY_TABLE,
                &[
                    (PROXY_TARGET_KEY, ColumnType::Id),
                    (PROXY_VERSIONABLE_KEY, ColumnType::Id),
                ],
            )
            .collection_fragment(ACL_TABLE, ColumnType::String)
    }

    pub fn simple_fragment(mut self, name: &str, columns: &[(&str, ColumnType)]) -> Self {
        let columns = columns
            .iter()
            .map(|(key, ty)| ColumnInfo::new(*key, *ty))
            .collect();
        self.tables.insert(
            name.to_string(),
            TableInfo {
                name: name.to_string(),
                kind: FragmentKind::Simple,
                columns,
            },
        );
        self
    }

    pub fn collection_fragment(mut self, name: &str, element: ColumnType) -> Self {
        self.tables.insert(
            name.to_string(),
            TableInfo {
                name: name.to_string(),
                kind: FragmentKind::Collection { element },
                columns: vec![
                    ColumnInfo::new(COLL_POS_KEY, ColumnType::Long),
                    ColumnInfo::new(COLL_ITEM_KEY, element),
                ],
            },
        );
        self
    }

    pub fn document_type(mut self, name: &str, fragments: &[&str]) -> Self {
        self.type_fragments
            .insert(name.to_string(), fragments.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn mixin(mut self, name: &str, fragments: &[&str]) -> Self {
        self.mixin_fragments
            .insert(name.to_string(), fragments.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Fails if a type or mixin names a fragment table that was never declared.
    pub fn build(self) -> Result<Model, ContractError> {
        let declared = self
            .type_fragments
            .values()
            .chain(self.mixin_fragments.values())
            .flatten();
        for fragment in declared {
            if !self.tables.contains_key(fragment) {
                return Err(ContractError::UnknownTable(fragment.clone()));
            }
        }
        Ok(Model {
            tables: self.tables,
            type_fragments: self.type_fragments,
            mixin_fragments: self.mixin_fragments,
        })
    }
}
