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

//! Invalidation exchange between repository instances sharing one backend.
//!
//! Each instance registers itself as a node. Sending an invalidation set queues one copy of it
//! for every other registered node; each node periodically collects and deletes what was queued
//! for it.

mod mapper;
mod node_handler;
mod registry;

pub use node_handler::ClusterNodeHandler;
pub use registry::ClusterRegistry;
