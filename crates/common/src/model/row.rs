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

use crate::model::{ContractError, Id, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identity-only reference to the fragment of `id` stored in `table`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId {
    pub table: String,
    pub id: Id,
}

impl RowId {
    pub fn new(table: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
        }
    }
}

impl Display for RowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.table, self.id)
    }
}

/// The payload of a fragment row, by fragment kind.
///
/// A simple fragment has exactly one physical row per id, so its payload is a mapping of column
/// key to value. A collection fragment has zero or more physical rows per id (one element plus a
/// position each); logically that is a single ordered array. Positions never leave the mapper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RowData {
    Simple(IndexMap<String, Value>),
    Collection(Vec<Value>),
}

/// The data of one fragment for one id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub table: String,
    pub id: Id,
    pub data: RowData,
}

impl Row {
    /// An empty simple-fragment row.
    pub fn simple(table: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            data: RowData::Simple(IndexMap::new()),
        }
    }

    pub fn simple_with<K, V>(
        table: impl Into<String>,
        id: impl Into<Id>,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            table: table.into(),
            id: id.into(),
            data: RowData::Simple(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn collection(table: impl Into<String>, id: impl Into<Id>, values: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            data: RowData::Collection(values),
        }
    }

    pub fn row_id(&self) -> RowId {
        RowId {
            table: self.table.clone(),
            id: self.id.clone(),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.data, RowData::Collection(_))
    }

    /// Column value of a simple row; `None` for absent keys and for collection rows.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match &self.data {
            RowData::Simple(values) => values.get(key),
            RowData::Collection(_) => None,
        }
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), ContractError> {
        match &mut self.data {
            RowData::Simple(values) => {
                values.insert(key.into(), value.into());
                Ok(())
            }
            RowData::Collection(_) => Err(ContractError::WrongFragmentKind {
                table: self.table.clone(),
                expected: "simple",
            }),
        }
    }

    pub fn values(&self) -> Option<&IndexMap<String, Value>> {
        match &self.data {
            RowData::Simple(values) => Some(values),
            RowData::Collection(_) => None,
        }
    }

    pub fn array(&self) -> Option<&[Value]> {
        match &self.data {
            RowData::Simple(_) => None,
            RowData::Collection(values) => Some(values),
        }
    }

    /// Column keys of a simple row, in insertion order. Empty for collection rows.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values()
            .into_iter()
            .flat_map(|values| values.keys().map(String::as_str))
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.table, self.id)?;
        match &self.data {
            RowData::Simple(values) => {
                f.write_str("{")?;
                for (i, (k, v)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
            RowData::Collection(values) => write!(f, "{}", Value::Array(values.clone())),
        }
    }
}

/// Outcome of fetching one requested fragment.
///
/// `Row` is a row that exists (for collections, possibly with an empty array), `Absent` a simple
/// fragment known not to exist. Ids that were never requested have no entry at all, which is
/// what a cache records as "unknown".
#[derive(Clone, Debug, PartialEq)]
pub enum Fetched {
    Row(Row),
    Absent(RowId),
}

impl Fetched {
    pub fn row_id(&self) -> RowId {
        match self {
            Fetched::Row(row) => row.row_id(),
            Fetched::Absent(row_id) => row_id.clone(),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Fetched::Absent(_))
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Fetched::Row(row) => Some(row),
            Fetched::Absent(_) => None,
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Fetched::Row(row) => Some(row),
            Fetched::Absent(_) => None,
        }
    }
}
