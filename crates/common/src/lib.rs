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

pub use model::{
    ContractError, Fetched, Id, InvalidationKind, Invalidations, PARENT, Row, RowBatch, RowData,
    RowId, RowUpdate, SERIES_PROXIES, TARGET_PROXIES, Value,
};

pub mod model;
pub mod tracing;
