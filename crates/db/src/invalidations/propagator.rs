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

use crate::invalidations::InvalidationsQueue;
use arc_swap::ArcSwap;
use quire_common::Invalidations;
use std::sync::Arc;

/// Fans invalidations out to every registered session queue.
///
/// The queue list is copy-on-write: propagation walks a snapshot and never blocks sessions that
/// are being opened or closed concurrently.
pub struct InvalidationsPropagator {
    queues: ArcSwap<Vec<Arc<InvalidationsQueue>>>,
}

impl Default for InvalidationsPropagator {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationsPropagator {
    pub fn new() -> Self {
        Self {
            queues: ArcSwap::from_pointee(vec![]),
        }
    }

    pub fn add_queue(&self, queue: Arc<InvalidationsQueue>) {
        self.queues.rcu(|queues| {
            let mut queues = Vec::clone(queues);
            if !queues.iter().any(|q| Arc::ptr_eq(q, &queue)) {
                queues.push(queue.clone());
            }
            queues
        });
    }

    pub fn remove_queue(&self, queue: &Arc<InvalidationsQueue>) {
        self.queues.rcu(|queues| {
            let mut queues = Vec::clone(queues);
            queues.retain(|q| !Arc::ptr_eq(q, queue));
            queues
        });
    }

    pub fn queue_count(&self) -> usize {
        self.queues.load().len()
    }

    /// Pushes `invalidations` to every queue except `exclude`.
    pub fn propagate(
        &self,
        invalidations: &Invalidations,
        exclude: Option<&Arc<InvalidationsQueue>>,
    ) {
        if invalidations.is_empty() {
            return;
        }
        let queues = self.queues.load();
        for queue in queues.iter() {
            if exclude.is_some_and(|e| Arc::ptr_eq(e, queue)) {
                continue;
            }
            queue.push(invalidations);
        }
    }
}
