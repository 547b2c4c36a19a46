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

#![allow(dead_code)]

use quire_common::{Id, Row, Value};
use quire_db::model::*;
use quire_db::{
    ClusterRegistry, Model, Repository, RepositoryConfig, SqliteConnectionFactory, SqliteDialect,
};
use std::path::Path;
use std::sync::Arc;

pub fn document_model() -> Model {
    Model::builder()
        .simple_fragment(
            "dublincore",
            &[
                ("title", ColumnType::String),
                ("creator", ColumnType::String),
            ],
        )
        .simple_fragment("content", &[("data", ColumnType::String)])
        .simple_fragment("attachment", &[("filename", ColumnType::String)])
        .collection_fragment("subjects", ColumnType::String)
        .document_type("Folder", &["dublincore"])
        .document_type("File", &["dublincore", "content", "subjects"])
        .document_type("Attachment", &["attachment"])
        .build()
        .unwrap()
}

pub fn open(path: &Path, config: RepositoryConfig, registry: &Arc<ClusterRegistry>) -> Repository {
    // Only the first test in a binary installs the subscriber.
    let _ = quire_common::tracing::init_tracing(false);
    Repository::open(
        config,
        document_model(),
        Arc::new(SqliteDialect::new()),
        Arc::new(SqliteConnectionFactory::new(path.join("repository.db"))),
        registry.clone(),
    )
    .unwrap()
}

/// A hierarchy row; `parent` is `None` for roots and versions.
pub fn hier(
    id: &str,
    parent: Option<&str>,
    name: &str,
    primary_type: &str,
    is_property: bool,
) -> Row {
    Row::simple_with(
        HIER_TABLE,
        id,
        [
            (HIER_PARENT_KEY, Value::from(parent.map(Id::from))),
            (HIER_CHILD_NAME_KEY, Value::from(name)),
            (HIER_CHILD_ISPROPERTY_KEY, Value::from(is_property)),
            (MAIN_PRIMARY_TYPE_KEY, Value::from(primary_type)),
            (MAIN_IS_VERSION_KEY, Value::from(false)),
        ],
    )
}

pub fn title(id: &str, title: &str) -> Row {
    Row::simple_with("dublincore", id, [("title", title), ("creator", "bob")])
}
