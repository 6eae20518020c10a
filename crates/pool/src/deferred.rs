// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexPool.
//
// PlexPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexPool. If not, see <https://www.gnu.org/licenses/>.

//! The post-lock action queue.
//!
//! ## Purpose
//! Work recorded under the pool lock that must not run until the lock is
//! released: caller-supplied callbacks, spawn-task launches, abort-hook
//! invocations, ticket signals. Every mutating entry point builds one
//! queue, drains it exactly once after dropping its guard, and actions run
//! in insertion order. This is the single mechanism that keeps callbacks
//! and potentially re-entrant collaborator code out of the critical
//! section.

/// Ordered queue of zero-argument actions to run after the pool lock is
/// released.
#[derive(Default)]
pub struct DeferredActions {
    actions: Vec<Box<dyn FnOnce() + Send>>,
}

impl DeferredActions {
    /// An empty queue. Does not allocate until the first push.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action; it runs after every action pushed before it.
    pub fn push(&mut self, action: impl FnOnce() + Send + 'static) {
        self.actions.push(Box::new(action));
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run all actions in insertion order, consuming the queue.
    ///
    /// Must only be called once the pool lock has been released.
    pub fn run(self) {
        for action in self.actions {
            action();
        }
    }
}

impl std::fmt::Debug for DeferredActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredActions")
            .field("len", &self.actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_in_insertion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut deferred = DeferredActions::new();
        for i in 0..5 {
            let order = order.clone();
            deferred.push(move || order.lock().unwrap().push(i));
        }

        assert_eq!(deferred.len(), 5);
        deferred.run();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_queue_is_a_noop() {
        let deferred = DeferredActions::new();
        assert!(deferred.is_empty());
        deferred.run();
    }
}
