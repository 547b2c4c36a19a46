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

mod batch;
mod errors;
mod invalidations;
mod row;
mod value;

pub use batch::{RowBatch, RowUpdate};
pub use errors::ContractError;
pub use invalidations::{InvalidationKind, Invalidations, PARENT, SERIES_PROXIES, TARGET_PROXIES};
pub use row::{Fetched, Row, RowData, RowId};
pub use value::{Id, Value};
