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

//! The session handle.
//!
//! A [`Session`] gives its holder exclusive use of one worker for one
//! request. Dropping (or explicitly closing) the session returns the worker
//! to its group; the release notification runs outside any pool lock, so a
//! session may safely be dropped from anywhere, including from inside a
//! request callback.

use crate::{GetError, WorkerInfo};

/// Callback through which the outcome of a session request is delivered.
///
/// The pool guarantees the callback is never invoked while the pool lock is
/// held.
pub type GetCallback = Box<dyn FnOnce(Result<Session, GetError>) + Send + 'static>;

/// Exclusive use of one worker for one request.
pub struct Session {
    app_group_name: String,
    worker: Option<WorkerInfo>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl Session {
    /// A session bound to `worker`; `on_close` runs exactly once when the
    /// session is closed or dropped.
    pub fn new(worker: WorkerInfo, on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            app_group_name: worker.app_group_name.clone(),
            worker: Some(worker),
            on_close: Some(Box::new(on_close)),
        }
    }

    /// A worker-less session produced for noop requests.
    pub fn noop(app_group_name: impl Into<String>) -> Self {
        Self {
            app_group_name: app_group_name.into(),
            worker: None,
            on_close: None,
        }
    }

    /// Name of the application group the session belongs to.
    pub fn app_group_name(&self) -> &str {
        &self.app_group_name
    }

    /// The worker backing this session; `None` for noop sessions.
    pub fn worker(&self) -> Option<&WorkerInfo> {
        self.worker.as_ref()
    }

    /// Whether this session was produced for a noop request.
    pub fn is_noop(&self) -> bool {
        self.worker.is_none()
    }

    /// Release the worker back to its group.
    ///
    /// Equivalent to dropping the session; provided so call sites can make
    /// the hand-back explicit.
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("app_group_name", &self.app_group_name)
            .field("worker", &self.worker)
            .finish()
    }
}
