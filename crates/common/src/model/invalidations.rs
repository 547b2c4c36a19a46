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

//! The set of rows known to have changed, used to evict per-session row caches.
//!
//! Values are kept normalized so that merging is a commutative monoid:
//! - when `all` is set both maps are empty;
//! - a `(table, id)` is never both modified and deleted (deletion wins);
//! - no table maps to an empty id set.

use crate::model::{Id, RowId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Pseudo-table for "the children of this id changed".
pub const PARENT: &str = "__PARENT__";
/// Pseudo-table for "the proxies of this version series changed".
pub const SERIES_PROXIES: &str = "__SERIES_PROXIES__";
/// Pseudo-table for "the proxies targeting this id changed".
pub const TARGET_PROXIES: &str = "__TARGET_PROXIES__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationKind {
    Modified,
    Deleted,
}

type TableIds = BTreeMap<String, BTreeSet<Id>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalidations {
    all: bool,
    modified: TableIds,
    deleted: TableIds,
}

impl Invalidations {
    pub fn new() -> Self {
        Self::default()
    }

    /// "Treat every cached row as unknown."
    pub fn everything() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn clear(&mut self) {
        self.all = false;
        self.modified.clear();
        self.deleted.clear();
    }

    pub fn modified(&self) -> &BTreeMap<String, BTreeSet<Id>> {
        &self.modified
    }

    pub fn deleted(&self) -> &BTreeMap<String, BTreeSet<Id>> {
        &self.deleted
    }

    pub fn is_modified(&self, row_id: &RowId) -> bool {
        contains(&self.modified, row_id)
    }

    pub fn is_deleted(&self, row_id: &RowId) -> bool {
        contains(&self.deleted, row_id)
    }

    pub fn modified_rows(&self) -> impl Iterator<Item = RowId> + '_ {
        rows(&self.modified)
    }

    pub fn deleted_rows(&self) -> impl Iterator<Item = RowId> + '_ {
        rows(&self.deleted)
    }

    pub fn add_modified(&mut self, row_id: RowId) {
        if self.all || self.is_deleted(&row_id) {
            return;
        }
        self.modified
            .entry(row_id.table)
            .or_default()
            .insert(row_id.id);
    }

    pub fn add_deleted(&mut self, row_id: RowId) {
        if self.all {
            return;
        }
        if let Some(ids) = self.modified.get_mut(&row_id.table) {
            ids.remove(&row_id.id);
            if ids.is_empty() {
                self.modified.remove(&row_id.table);
            }
        }
        self.deleted
            .entry(row_id.table)
            .or_default()
            .insert(row_id.id);
    }

    /// Records `id` as changed in each of `tables`.
    pub fn add(&mut self, id: &Id, tables: &[&str], kind: InvalidationKind) {
        for table in tables {
            let row_id = RowId::new(*table, id.clone());
            match kind {
                InvalidationKind::Modified => self.add_modified(row_id),
                InvalidationKind::Deleted => self.add_deleted(row_id),
            }
        }
    }

    /// Unions `other` into `self`: per-table set union, deletion dominating modification, OR on
    /// `all`.
    pub fn merge(&mut self, other: &Invalidations) {
        if self.all {
            return;
        }
        if other.all {
            *self = Self::everything();
            return;
        }
        for row_id in other.deleted_rows() {
            self.add_deleted(row_id);
        }
        for row_id in other.modified_rows() {
            self.add_modified(row_id);
        }
    }

    pub fn merged(mut self, other: &Invalidations) -> Self {
        self.merge(other);
        self
    }
}

fn contains(map: &TableIds, row_id: &RowId) -> bool {
    map.get(&row_id.table)
        .is_some_and(|ids| ids.contains(&row_id.id))
}

fn rows(map: &TableIds) -> impl Iterator<Item = RowId> + '_ {
    map.iter()
        .flat_map(|(table, ids)| ids.iter().map(move |id| RowId::new(table.clone(), id.clone())))
}

fn write_rows(f: &mut Formatter<'_>, name: &str, map: &TableIds) -> std::fmt::Result {
    write!(f, "{name}=[")?;
    for (i, row_id) in rows(map).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{row_id}")?;
    }
    f.write_str("]")
}

impl Display for Invalidations {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Invalidations(")?;
        if self.all {
            f.write_str("all=true")?;
        }
        if !self.modified.is_empty() {
            write_rows(f, "modified", &self.modified)?;
            if !self.deleted.is_empty() {
                f.write_str(",")?;
            }
        }
        if !self.deleted.is_empty() {
            write_rows(f, "deleted", &self.deleted)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inv(modified: &[(&str, &str)], deleted: &[(&str, &str)]) -> Invalidations {
        let mut inv = Invalidations::new();
        for (t, id) in deleted {
            inv.add_deleted(RowId::new(*t, *id));
        }
        for (t, id) in modified {
            inv.add_modified(RowId::new(*t, *id));
        }
        inv
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = inv(&[("dc", "1"), ("file", "2")], &[("dc", "3")]);
        let b = inv(&[("dc", "3"), ("hierarchy", "4")], &[("file", "2")]);
        assert_eq!(a.clone().merged(&b), b.clone().merged(&a));
    }

    #[test]
    fn test_merge_is_associative() {
        let a = inv(&[("dc", "1")], &[]);
        let b = inv(&[], &[("dc", "1"), ("dc", "2")]);
        let c = inv(&[("dc", "2"), ("dc", "5")], &[("file", "9")]);
        let left = a.clone().merged(&b).merged(&c);
        let right = a.merged(&b.merged(&c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_empty_is_identity() {
        let a = inv(&[("dc", "1")], &[("file", "2")]);
        assert_eq!(a.clone().merged(&Invalidations::new()), a);
        assert_eq!(Invalidations::new().merged(&a), a);
        assert!(Invalidations::new().merged(&Invalidations::new()).is_empty());
    }

    #[test]
    fn test_deletion_dominates_modification() {
        let modified = inv(&[("dc", "1"), ("dc", "2")], &[]);
        let deleted = inv(&[], &[("dc", "1")]);
        let merged = modified.merged(&deleted);
        assert!(merged.is_deleted(&RowId::new("dc", "1")));
        assert!(!merged.is_modified(&RowId::new("dc", "1")));
        assert!(merged.is_modified(&RowId::new("dc", "2")));
    }

    #[test]
    fn test_all_subsumes_maps() {
        let a = inv(&[("dc", "1")], &[("file", "2")]);
        let merged = a.clone().merged(&Invalidations::everything());
        assert!(merged.is_all());
        assert!(merged.modified().is_empty());
        assert!(merged.deleted().is_empty());
        assert_eq!(Invalidations::everything().merged(&a), merged);
    }

    #[test]
    fn test_add_for_several_tables() {
        let mut inv = Invalidations::new();
        inv.add(&Id::from("x"), &["dc", "file"], InvalidationKind::Deleted);
        assert_eq!(
            inv.deleted_rows().collect::<Vec<_>>(),
            vec![RowId::new("dc", "x"), RowId::new("file", "x")]
        );
        assert_eq!(inv.to_string(), "Invalidations(deleted=[dc/x, file/x])");
    }

    #[test]
    fn test_serde_roundtrip_for_cluster_payloads() {
        let a = inv(&[(PARENT, "p")], &[("dc", "1")]);
        let json = serde_json::to_string(&a).unwrap();
        let back: Invalidations = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }
}
