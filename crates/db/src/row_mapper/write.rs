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

use crate::error::StorageError;
use crate::model::{HIER_TABLE, MAIN_KEY};
use crate::row_mapper::RowMapper;
use indexmap::IndexMap;
use quire_common::{ContractError, Id, Row, RowBatch, RowData, RowUpdate, Value};
use tracing::debug;

impl RowMapper {
    /// Applies a batch: creates grouped by table (hierarchy rows first, so fragments never
    /// precede their node, then the other tables in order of first appearance), then updates,
    /// then deletes.
    pub fn write(&mut self, batch: &RowBatch) -> Result<(), StorageError> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }
        debug!(
            creates = batch.creates.len(),
            updates = batch.updates.len(),
            deletes = batch.deletes.len(),
            "write"
        );
        // Grouped by table so that consecutive inserts reuse one prepared statement.
        let mut by_table: IndexMap<&str, Vec<&Row>> = IndexMap::new();
        by_table.insert(HIER_TABLE, Vec::new());
        for row in &batch.creates {
            by_table.entry(row.table.as_str()).or_default().push(row);
        }
        for row in by_table.into_values().flatten() {
            self.insert_row(row)?;
        }
        for update in &batch.updates {
            self.update_row(update)?;
        }
        for row_id in &batch.deletes {
            self.delete_rows(&row_id.table, &row_id.id)?;
        }
        Ok(())
    }

    fn insert_row(&mut self, row: &Row) -> Result<(), StorageError> {
        match &row.data {
            RowData::Simple(_) => self.insert_simple_row(row),
            RowData::Collection(values) => self.insert_collection_rows(&row.table, &row.id, values),
        }
    }

    fn insert_simple_row(&mut self, row: &Row) -> Result<(), StorageError> {
        let info = self.model.table(&row.table)?;
        if info.is_collection() {
            return Err(wrong_kind(&row.table, "simple"));
        }
        for key in row.keys() {
            info.column(key)?;
        }
        let stmt = self.sql.insert(&row.table)?;
        let id = Value::from(&row.id);
        let null = Value::Null;
        let values: Vec<&Value> = stmt
            .params
            .iter()
            .map(|c| match c.key.as_str() {
                MAIN_KEY => &id,
                key => row.get(key).unwrap_or(&null),
            })
            .collect();
        let params = self.encode_params(&stmt, values)?;
        self.execute("insert", &row.table, Some(&row.id), &stmt.sql, &params)?;
        Ok(())
    }

    /// One `(id, pos, item)` row per element, positions starting at 0.
    fn insert_collection_rows(
        &mut self,
        table: &str,
        id: &Id,
        values: &[Value],
    ) -> Result<(), StorageError> {
        if !self.model.is_collection_fragment(table)? {
            return Err(wrong_kind(table, "collection"));
        }
        let stmt = self.sql.insert(table)?;
        let id_value = Value::from(id);
        for (pos, value) in values.iter().enumerate() {
            let pos = Value::Long(pos as i64);
            let params = self.encode_params(&stmt, [&id_value, &pos, value])?;
            self.execute("insert", table, Some(id), &stmt.sql, &params)?;
        }
        Ok(())
    }

    fn update_row(&mut self, update: &RowUpdate) -> Result<(), StorageError> {
        match &update.row.data {
            RowData::Simple(_) => {
                let keys: Vec<&str> = update.keys.iter().map(String::as_str).collect();
                self.update_simple_row(&update.row, &keys)
            }
            RowData::Collection(values) => {
                self.delete_rows(&update.row.table, &update.row.id)?;
                self.insert_collection_rows(&update.row.table, &update.row.id, values)
            }
        }
    }

    /// Updates only `keys` of a simple row. No keys, no statement.
    fn update_simple_row(&mut self, row: &Row, keys: &[&str]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        if self.model.is_collection_fragment(&row.table)? {
            return Err(wrong_kind(&row.table, "simple"));
        }
        let stmt = self.sql.update_by_id(&row.table, keys.iter().copied())?;
        let mut values = Vec::with_capacity(keys.len() + 1);
        for key in keys {
            let value = row.get(key).ok_or_else(|| ContractError::ChangedKeyNotInRow {
                row: row.row_id(),
                key: key.to_string(),
            })?;
            values.push(value.clone());
        }
        values.push(Value::from(&row.id));
        let params = self.encode_params(&stmt, &values)?;
        self.execute("update", &row.table, Some(&row.id), &stmt.sql, &params)?;
        Ok(())
    }

    /// Updates every column present in `row`.
    pub(crate) fn update_simple_row_with_values(&mut self, row: &Row) -> Result<(), StorageError> {
        let keys: Vec<String> = row.keys().map(str::to_string).collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.update_simple_row(row, &keys)
    }

    fn delete_rows(&mut self, table: &str, id: &Id) -> Result<(), StorageError> {
        let stmt = self.sql.delete(table)?;
        let params = self.encode_params(&stmt, [&Value::from(id)])?;
        self.execute("delete", table, Some(id), &stmt.sql, &params)?;
        Ok(())
    }
}

fn wrong_kind(table: &str, expected: &'static str) -> StorageError {
    ContractError::WrongFragmentKind {
        table: table.to_string(),
        expected,
    }
    .into()
}
