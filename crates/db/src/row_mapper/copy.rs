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
use indexmap::{IndexMap, IndexSet};
use quire_common::{Id, Invalidations, PARENT, Row, RowId, Value};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHierarchyResult {
    /// Id of the copy of the source root (the overwritten id when overwriting).
    pub new_root_id: Id,
    /// Source id to copied id, for every node copied.
    pub id_map: IndexMap<Id, Id>,
    /// What other sessions must forget as a result of the copy.
    pub invalidations: Invalidations,
}

impl RowMapper {
    /// Copies the subtree rooted at `source`.
    ///
    /// With a `dest_parent_id`, the copy is filed under it (renamed to `dest_name` if given) and
    /// includes every descendant. Without one, the copy is a version snapshot: it has no parent,
    /// its version-tracking columns are cleared, and only complex-property children are copied.
    /// With an `overwrite_row`, the root is not copied: the existing row is updated with its
    /// values, and the source's fragments replace the existing node's fragments.
    ///
    /// The destination may lie inside the source's subtree; the copy then holds the subtree as
    /// it was before the copy started. ACL rows are never copied.
    pub fn copy_hierarchy(
        &mut self,
        source: &IdWithTypes,
        dest_parent_id: Option<&Id>,
        dest_name: Option<&str>,
        overwrite_row: Option<&Row>,
    ) -> Result<CopyHierarchyResult, StorageError> {
        let mut invalidations = Invalidations::new();
        let mut id_map = IndexMap::new();
        let mut id_to_types = IndexMap::new();
        let overwrite_id = overwrite_row.map(|row| row.id.clone());
        if let Some(row) = overwrite_row {
            self.update_simple_row_with_values(row)?;
            id_map.insert(source.id.clone(), row.id.clone());
            invalidations.add_modified(RowId::new(HIER_TABLE, row.id.clone()));
        }
        let new_root_id = self.copy_hier_recursive(
            source,
            dest_parent_id,
            dest_name,
            overwrite_id.as_ref(),
            &mut id_map,
            &mut id_to_types,
        )?;
        // A new version has no parent whose children changed.
        if let Some(parent) = overwrite_id.as_ref().or(dest_parent_id) {
            invalidations.add_modified(RowId::new(PARENT, parent.clone()));
        }
        for (table, ids) in self.model.per_fragment_ids(id_to_types.values()) {
            if table == HIER_TABLE || table == ACL_TABLE {
                continue;
            }
            let Some(overwritten) = self.copy_rows(&table, &ids, &id_map, overwrite_id.as_ref())?
            else {
                continue;
            };
            let Some(overwrite_id) = &overwrite_id else {
                continue;
            };
            let row_id = RowId::new(table, overwrite_id.clone());
            if overwritten {
                invalidations.add_modified(row_id);
            } else {
                invalidations.add_deleted(row_id);
            }
        }
        debug!(
            "Copied {} as {new_root_id} ({} nodes)",
            source.id,
            id_map.len()
        );
        Ok(CopyHierarchyResult {
            new_root_id,
            id_map,
            invalidations,
        })
    }

    fn copy_hier_recursive(
        &mut self,
        source: &IdWithTypes,
        parent_id: Option<&Id>,
        name: Option<&str>,
        overwrite_id: Option<&Id>,
        id_map: &mut IndexMap<Id, Id>,
        id_to_types: &mut IndexMap<Id, IdWithTypes>,
    ) -> Result<Id, StorageError> {
        id_to_types.insert(source.id.clone(), source.clone());
        let new_id = match overwrite_id {
            Some(overwrite_id) => {
                id_map.insert(source.id.clone(), overwrite_id.clone());
                overwrite_id.clone()
            }
            None => self.copy_hier(&source.id, parent_id, name, id_map)?,
        };
        let only_complex = parent_id.is_none();
        for child in self.children_ids_with_types(&source.id, only_complex)? {
            // Copying into the source's own subtree lists the copies made so far.
            if id_map.values().any(|copied| *copied == child.id) {
                continue;
            }
            self.copy_hier_recursive(&child, Some(&new_id), None, None, id_map, id_to_types)?;
        }
        Ok(new_id)
    }

    /// Copies one hierarchy row to a fresh id. No parent means a version snapshot.
    fn copy_hier(
        &mut self,
        id: &Id,
        parent_id: Option<&Id>,
        name: Option<&str>,
        id_map: &mut IndexMap<Id, Id>,
    ) -> Result<Id, StorageError> {
        let create_version = parent_id.is_none();
        let stmt = self.sql.copy_hier(name.is_some(), create_version)?;
        let new_id = self.model.generate_id();
        // The last placeholder is the source id.
        let overridden = &stmt.params[..stmt.params.len().saturating_sub(1)];
        let mut values = Vec::with_capacity(stmt.params.len());
        for column in overridden {
            values.push(match column.key.as_str() {
                MAIN_KEY => Value::from(&new_id),
                HIER_PARENT_KEY => Value::from(parent_id),
                HIER_CHILD_NAME_KEY => Value::from(name),
                _ => Value::Null,
            });
        }
        values.push(Value::from(id));
        let params = self.encode_params(&stmt, &values)?;
        self.execute("copy", HIER_TABLE, Some(id), &stmt.sql, &params)?;
        id_map.insert(id.clone(), new_id.clone());
        Ok(new_id)
    }

    fn children_ids_with_types(
        &mut self,
        id: &Id,
        only_complex: bool,
    ) -> Result<Vec<IdWithTypes>, StorageError> {
        let stmt = self.sql.select_children_ids_and_types(only_complex)?;
        let mut values = vec![Value::from(id)];
        if only_complex {
            values.push(Value::from(true));
        }
        let params = self.encode_params(&stmt, &values)?;
        let raw = self.query("read children of", HIER_TABLE, Some(id), &stmt.sql, &params)?;
        let mut children = Vec::with_capacity(raw.len());
        for raw in raw {
            let mut values = self.decode_row(&stmt, HIER_TABLE, raw)?.into_iter();
            let child_id = decode_id(HIER_TABLE, &values.next().unwrap_or(Value::Null))?;
            let primary_type = values
                .next()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let mixin_types = values
                .next()
                .and_then(|v| {
                    v.as_array()
                        .map(|a| a.iter().filter_map(|m| m.as_str().map(str::to_string)).collect())
                })
                .unwrap_or_default();
            children.push(IdWithTypes {
                id: child_id,
                primary_type,
                mixin_types,
            });
        }
        Ok(children)
    }

    /// Copies the rows of `ids` in `table` to their mapped ids. The overwritten node's rows
    /// are deleted first.
    ///
    /// Returns whether the overwritten node has rows in `table` afterwards: `Some(true)` if it
    /// does, `Some(false)` if it had some before and none after, `None` if it had none either
    /// way or nothing was overwritten.
    fn copy_rows(
        &mut self,
        table: &str,
        ids: &IndexSet<Id>,
        id_map: &IndexMap<Id, Id>,
        overwrite_id: Option<&Id>,
    ) -> Result<Option<bool>, StorageError> {
        let copy = self.sql.copy_rows(table)?;
        let delete = self.sql.delete(table)?;
        let mut before = false;
        let mut after = false;
        for id in ids {
            let Some(new_id) = id_map.get(id) else {
                continue;
            };
            let overwrite = Some(new_id) == overwrite_id;
            if overwrite {
                let params = self.encode_params(&delete, [&Value::from(new_id)])?;
                before = self.execute("delete", table, Some(new_id), &delete.sql, &params)? > 0;
            }
            let params = self.encode_params(&copy, &[Value::from(new_id), Value::from(id)])?;
            let count = self.execute("copy", table, Some(id), &copy.sql, &params)?;
            if overwrite {
                after = count > 0;
            }
        }
        Ok(match (before, after) {
            (_, true) => Some(true),
            (true, false) => Some(false),
            (false, false) => None,
        })
    }
}
