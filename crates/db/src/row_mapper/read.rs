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
use crate::model::*;
use crate::row_mapper::{RowMapper, decode_id};
use crate::sql_info::Statement;
use indexmap::{IndexMap, IndexSet};
use minstant::Instant;
use quire_common::{ContractError, Fetched, Id, Row, RowData, RowId, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, trace, warn};

impl RowMapper {
    /// Fetches the rows for `row_ids`, issuing one query per table per chunk of ids.
    ///
    /// Every requested id yields exactly one result: a `Row` if it exists (collections always
    /// exist, possibly empty) or `Fetched::Absent` for a missing simple row.
    pub fn read(&mut self, row_ids: &[RowId]) -> Result<Vec<Fetched>, StorageError> {
        let mut by_table: IndexMap<&str, IndexSet<&Id>> = IndexMap::new();
        for row_id in row_ids {
            by_table
                .entry(row_id.table.as_str())
                .or_default()
                .insert(&row_id.id);
        }
        let start = Instant::now();
        let mut result = Vec::with_capacity(row_ids.len());
        for (table, ids) in by_table {
            let collection = self.model.is_collection_fragment(table)?;
            let ids: Vec<Id> = ids.into_iter().cloned().collect();
            for chunk in ids.chunks(self.settings.max_in_list.max(1)) {
                if collection {
                    result.extend(
                        self.read_collection_arrays(table, chunk)?
                            .into_iter()
                            .map(Fetched::Row),
                    );
                } else {
                    let mut missing: IndexSet<&Id> = chunk.iter().collect();
                    for row in self.read_simple_rows(table, chunk)? {
                        missing.shift_remove(&row.id);
                        result.push(Fetched::Row(row));
                    }
                    result.extend(
                        missing
                            .into_iter()
                            .map(|id| Fetched::Absent(RowId::new(table, id.clone()))),
                    );
                }
            }
        }
        trace!(rows = row_ids.len(), elapsed = ?start.elapsed(), "read");
        Ok(result)
    }

    fn read_simple_rows(&mut self, table: &str, ids: &[Id]) -> Result<Vec<Row>, StorageError> {
        let stmt = self.sql.select_by_ids(table, ids.len())?;
        let values: Vec<Value> = ids.iter().map(Value::from).collect();
        let params = self.encode_params(&stmt, &values)?;
        let raw = self.query("read", table, None, &stmt.sql, &params)?;
        raw.into_iter()
            .map(|raw| self.simple_row(&stmt, table, raw))
            .collect()
    }

    fn simple_row(
        &self,
        stmt: &Statement,
        table: &str,
        raw: Vec<Value>,
    ) -> Result<Row, StorageError> {
        let values = self.decode_row(stmt, table, raw)?;
        let id = decode_id(table, values.first().unwrap_or(&Value::Null))?;
        let columns = stmt.what.iter().zip(values).skip(1);
        Ok(Row::simple_with(
            table,
            id,
            columns.map(|(column, value)| (column.key.clone(), value)),
        ))
    }

    /// Reads the arrays of a collection table for `ids`, one row per id, in request order.
    pub(crate) fn read_collection_arrays(
        &mut self,
        table: &str,
        ids: &[Id],
    ) -> Result<Vec<Row>, StorageError> {
        let stmt = self.sql.select_by_ids(table, ids.len())?;
        let values: Vec<Value> = ids.iter().map(Value::from).collect();
        let params = self.encode_params(&stmt, &values)?;
        let raw = self.query("read", table, None, &stmt.sql, &params)?;
        let mut elements = Vec::with_capacity(raw.len());
        for raw in raw {
            let mut values = self.decode_row(&stmt, table, raw)?.into_iter();
            let id = decode_id(table, &values.next().unwrap_or(Value::Null))?;
            elements.push((id, values.next().unwrap_or(Value::Null)));
        }
        Ok(group_collection_rows(table, ids, elements))
    }

    pub fn read_simple_row(&mut self, row_id: &RowId) -> Result<Option<Row>, StorageError> {
        if self.model.is_collection_fragment(&row_id.table)? {
            return Err(ContractError::WrongFragmentKind {
                table: row_id.table.clone(),
                expected: "simple",
            }
            .into());
        }
        Ok(self
            .read_simple_rows(&row_id.table, std::slice::from_ref(&row_id.id))?
            .into_iter()
            .next())
    }

    pub fn read_collection_row_array(
        &mut self,
        row_id: &RowId,
    ) -> Result<Vec<Value>, StorageError> {
        if !self.model.is_collection_fragment(&row_id.table)? {
            return Err(ContractError::WrongFragmentKind {
                table: row_id.table.clone(),
                expected: "collection",
            }
            .into());
        }
        let row = self
            .read_collection_arrays(&row_id.table, std::slice::from_ref(&row_id.id))?
            .into_iter()
            .next();
        Ok(match row {
            Some(Row {
                data: RowData::Collection(values),
                ..
            }) => values,
            _ => vec![],
        })
    }

    /// Runs a select whose placeholders are all bound from `criteria`, returning simple rows of
    /// `table`. Criteria naming columns of `table` are copied into each returned row.
    fn select_rows(
        &mut self,
        table: &str,
        stmt: &Statement,
        criteria: &[(&str, Value)],
    ) -> Result<Vec<Row>, StorageError> {
        let mut params = Vec::with_capacity(stmt.params.len());
        for column in &stmt.params {
            let Some((_, value)) = criteria.iter().find(|(key, _)| *key == column.key) else {
                return Err(ContractError::MissingCriterion {
                    table: table.to_string(),
                    key: column.key.clone(),
                }
                .into());
            };
            if value.is_null() {
                return Err(ContractError::NullValue {
                    table: table.to_string(),
                    key: column.key.clone(),
                }
                .into());
            }
            params.push(self.encode(column, value)?);
        }
        let info = self.model.table(table)?.clone();
        let raw = self.query("select", table, None, &stmt.sql, &params)?;
        let mut rows = Vec::with_capacity(raw.len());
        for raw in raw {
            let mut row = self.simple_row(stmt, table, raw)?;
            for (key, value) in criteria {
                if info.column(key).is_ok() {
                    row.put(*key, value.clone())?;
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// The hierarchy row of the child of `parent_id` called `name`.
    ///
    /// The backend has no uniqueness constraint on child names, so concurrent creation can leave
    /// several children under the same name. The first one found is returned; the others are
    /// reported, and renamed to `name.<millis>` unless repair is disabled.
    pub fn read_child_hier_row(
        &mut self,
        parent_id: &Id,
        name: &str,
        is_property: bool,
    ) -> Result<Option<Row>, StorageError> {
        let stmt = self.sql.select_children(true)?;
        let criteria = [
            (HIER_PARENT_KEY, Value::from(parent_id)),
            (HIER_CHILD_NAME_KEY, Value::from(name)),
            (HIER_CHILD_ISPROPERTY_KEY, Value::from(is_property)),
        ];
        let mut rows = self.select_rows(HIER_TABLE, &stmt, &criteria)?.into_iter();
        let Some(first) = rows.next() else {
            return Ok(None);
        };
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        for (i, duplicate) in rows.enumerate() {
            if !self.settings.repair_duplicate_child_names {
                warn!(
                    "Child {name} of {parent_id} is duplicated by {}; leaving it in place",
                    duplicate.id
                );
                continue;
            }
            let new_name = format!("{name}.{}", millis + i as u128);
            error!(
                "Child {name} of {parent_id} is duplicated by {}; renaming it to {new_name}",
                duplicate.id
            );
            let rename = Row::simple_with(
                HIER_TABLE,
                duplicate.id,
                [(HIER_CHILD_NAME_KEY, Value::from(new_name))],
            );
            self.update_simple_row_with_values(&rename)?;
        }
        Ok(Some(first))
    }

    pub fn read_child_hier_rows(
        &mut self,
        parent_id: &Id,
        is_property: bool,
    ) -> Result<Vec<Row>, StorageError> {
        let stmt = self.sql.select_children(false)?;
        let criteria = [
            (HIER_PARENT_KEY, Value::from(parent_id)),
            (HIER_CHILD_ISPROPERTY_KEY, Value::from(is_property)),
        ];
        self.select_rows(HIER_TABLE, &stmt, &criteria)
    }

    /// Version rows of the series `versionable_id`.
    pub fn get_version_rows(&mut self, versionable_id: &Id) -> Result<Vec<Row>, StorageError> {
        let stmt = self.sql.select_versions_by_series()?;
        let criteria = [
            (VERSION_VERSIONABLE_KEY, Value::from(versionable_id)),
            (MAIN_IS_VERSION_KEY, Value::from(true)),
        ];
        self.select_rows(VERSION_TABLE, &stmt, &criteria)
    }

    /// Proxies pointing at `search_id` (a version when `by_target`, otherwise a version series),
    /// optionally only those filed under `parent_id`.
    pub fn get_proxy_rows(
        &mut self,
        by_target: bool,
        search_id: &Id,
        parent_id: Option<&Id>,
    ) -> Result<Vec<Row>, StorageError> {
        let stmt = self.sql.select_proxies(by_target, parent_id.is_some())?;
        let key = if by_target {
            PROXY_TARGET_KEY
        } else {
            PROXY_VERSIONABLE_KEY
        };
        let mut criteria = vec![(key, Value::from(search_id))];
        if let Some(parent_id) = parent_id {
            criteria.push((HIER_PARENT_KEY, Value::from(parent_id)));
        }
        self.select_rows(PROXY_TABLE, &stmt, &criteria)
    }
}

/// Folds `(id, element)` pairs, grouped by id and ordered by position, into one collection row
/// per requested id. Ids with no elements get an empty array.
pub(crate) fn group_collection_rows(
    table: &str,
    ids: &[Id],
    elements: Vec<(Id, Value)>,
) -> Vec<Row> {
    let mut arrays: IndexMap<Id, Vec<Value>> = IndexMap::with_capacity(ids.len());
    let mut current: Option<(Id, Vec<Value>)> = None;
    for (id, element) in elements {
        match &mut current {
            Some((current_id, values)) if *current_id == id => values.push(element),
            _ => {
                if let Some((done_id, values)) = current.take() {
                    arrays.insert(done_id, values);
                }
                current = Some((id, vec![element]));
            }
        }
    }
    if let Some((done_id, values)) = current {
        arrays.insert(done_id, values);
    }
    ids.iter()
        .map(|id| {
            let values = arrays.shift_remove(id).unwrap_or_default();
            Row::collection(table, id.clone(), values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_group_collection_rows_by_contiguous_ids() {
        let ids = [Id::from("A"), Id::from("B")];
        let elements = vec![
            (Id::from("A"), Value::from("v1")),
            (Id::from("A"), Value::from("v2")),
        ];
        let rows = group_collection_rows("subjects", &ids, elements);
        assert_eq!(
            rows,
            vec![
                Row::collection("subjects", "A", vec![Value::from("v1"), Value::from("v2")]),
                Row::collection("subjects", "B", vec![]),
            ]
        );
    }

    #[test]
    fn test_group_collection_rows_keeps_request_order() {
        let ids = [Id::from("c"), Id::from("a"), Id::from("b")];
        let elements = vec![
            (Id::from("a"), Value::from("1")),
            (Id::from("c"), Value::from("2")),
            (Id::from("c"), Value::from("3")),
        ];
        let rows = group_collection_rows("tags", &ids, elements);
        let arrays: Vec<_> = rows
            .iter()
            .map(|r| (r.id.as_str(), r.array().unwrap().len()))
            .collect();
        assert_eq!(arrays, vec![("c", 2), ("a", 1), ("b", 0)]);
    }
}
