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

use crate::cluster::ClusterNodeHandler;
use crate::error::StorageError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// The cluster node handlers of a process, one per repository name.
///
/// Repository instances opened with the same registry and name share a single node, and with
/// it a single set of local session queues.
#[derive(Default)]
pub struct ClusterRegistry {
    handlers: Mutex<HashMap<String, Arc<ClusterNodeHandler>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, repository: &str) -> Option<Arc<ClusterNodeHandler>> {
        self.handlers.lock().unwrap().get(repository).cloned()
    }

    /// The handler registered for `repository`, created with `create` if there is none yet.
    pub fn get_or_create(
        &self,
        repository: &str,
        create: impl FnOnce() -> Result<ClusterNodeHandler, StorageError>,
    ) -> Result<Arc<ClusterNodeHandler>, StorageError> {
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(handler) = handlers.get(repository) {
            return Ok(handler.clone());
        }
        let handler = Arc::new(create()?);
        handlers.insert(repository.to_string(), handler.clone());
        Ok(handler)
    }

    /// Removes and closes the handler of `repository`, if any.
    pub fn close(&self, repository: &str) {
        let removed = self.handlers.lock().unwrap().remove(repository);
        if let Some(handler) = removed {
            info!("Closing cluster node {} of {repository}", handler.node_id());
            handler.close();
        }
    }

    pub fn close_all(&self) {
        let handlers: Vec<_> = self.handlers.lock().unwrap().drain().collect();
        for (repository, handler) in handlers {
            info!("Closing cluster node {} of {repository}", handler.node_id());
            handler.close();
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
