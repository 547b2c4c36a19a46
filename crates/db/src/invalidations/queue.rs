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

use quire_common::Invalidations;
use std::sync::Mutex;

/// Mailbox of invalidations waiting to be applied to one session's caches.
pub struct InvalidationsQueue {
    name: String,
    pending: Mutex<Invalidations>,
}

impl InvalidationsQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: Mutex::new(Invalidations::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, invalidations: &Invalidations) {
        self.pending.lock().unwrap().merge(invalidations);
    }

    /// Takes everything pushed since the last drain, leaving the queue empty.
    pub fn drain(&self) -> Invalidations {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }
}

impl std::fmt::Debug for InvalidationsQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationsQueue")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_common::RowId;
    use shuttle::{check_random, sync::Arc, thread};

    #[test]
    fn test_drain_empties_the_queue() {
        let queue = InvalidationsQueue::new("session-1");
        let mut a = Invalidations::new();
        a.add_modified(RowId::new("dublincore", "x"));
        let mut b = Invalidations::new();
        b.add_deleted(RowId::new("dublincore", "x"));
        queue.push(&a);
        queue.push(&b);

        let drained = queue.drain();
        assert!(drained.is_deleted(&RowId::new("dublincore", "x")));
        assert!(!drained.is_modified(&RowId::new("dublincore", "x")));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_concurrent_pushes_are_not_lost() {
        check_random(
            || {
                let queue = Arc::new(InvalidationsQueue::new("q"));
                let mut handles = vec![];
                for i in 0..3 {
                    let queue = queue.clone();
                    handles.push(thread::spawn(move || {
                        let mut inv = Invalidations::new();
                        inv.add_modified(RowId::new("dublincore", format!("{i}")));
                        queue.push(&inv);
                    }));
                }
                let mut drained = Invalidations::new();
                drained.merge(&queue.drain());
                for handle in handles {
                    handle.join().unwrap();
                }
                drained.merge(&queue.drain());
                assert_eq!(drained.modified_rows().count(), 3);
            },
            100,
        );
    }
}
