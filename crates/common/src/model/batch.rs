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

use crate::model::{ContractError, Row, RowId};
use std::collections::{BTreeSet, HashMap};

/// A row plus the subset of its columns that actually changed. Only those columns are written.
#[derive(Clone, Debug, PartialEq)]
pub struct RowUpdate {
    pub row: Row,
    pub keys: BTreeSet<String>,
}

impl RowUpdate {
    /// Fails if a changed key is not one of the row's columns. Collection rows are always
    /// rewritten whole, so their key set is not checked.
    pub fn new<K: Into<String>>(
        row: Row,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<Self, ContractError> {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        if !row.is_collection()
            && let Some(missing) = keys.iter().find(|k| row.get(k).is_none())
        {
            return Err(ContractError::ChangedKeyNotInRow {
                row: row.row_id(),
                key: missing.clone(),
            });
        }
        Ok(Self { row, keys })
    }
}

/// Everything one flush writes: creates, updates and deletes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowBatch {
    pub creates: Vec<Row>,
    pub updates: Vec<RowUpdate>,
    pub deletes: Vec<RowId>,
}

impl RowBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, row: Row) -> &mut Self {
        self.creates.push(row);
        self
    }

    pub fn update(&mut self, update: RowUpdate) -> &mut Self {
        self.updates.push(update);
        self
    }

    pub fn delete(&mut self, row_id: RowId) -> &mut Self {
        self.deletes.push(row_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// A given `(table, id)` may appear in at most one of the three lists.
    pub fn validate(&self) -> Result<(), ContractError> {
        let mut seen: HashMap<RowId, usize> = HashMap::new();
        let lists = [
            self.creates.iter().map(Row::row_id).collect::<Vec<_>>(),
            self.updates.iter().map(|u| u.row.row_id()).collect(),
            self.deletes.clone(),
        ];
        for (list_no, row_ids) in lists.into_iter().enumerate() {
            for row_id in row_ids {
                match seen.get(&row_id) {
                    Some(other) if *other != list_no => {
                        return Err(ContractError::DuplicateBatchEntry { row: row_id });
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(row_id, list_no);
                    }
                }
            }
        }
        Ok(())
    }
}
