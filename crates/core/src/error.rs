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

//! Error types delivered through session request callbacks.
//!
//! Administrative operations return booleans or enumerations instead of
//! errors; invariant violations and lifecycle misuse are programmer errors
//! and panic. Only session requests carry recoverable errors, and those are
//! surfaced to the request callback rather than thrown at the caller.

use thiserror::Error;

/// Error delivered to a session request callback.
#[derive(Debug, Clone, Error)]
pub enum GetError {
    /// The request was aborted before a session could be produced.
    #[error("{0}")]
    Aborted(String),

    /// Spawning a worker for the request's group failed.
    #[error("could not spawn an application worker: {0}")]
    SpawnFailed(String),
}

impl GetError {
    /// The abort delivered to every waiter of a group that is detached.
    pub fn group_detached() -> Self {
        GetError::Aborted("The containing Group was detached.".to_string())
    }

    /// The abort delivered to pool-level waiters when the pool shuts down.
    pub fn pool_destroyed() -> Self {
        GetError::Aborted("The Pool is being shut down.".to_string())
    }
}

/// Error produced by a [`SpawningFactory`](crate::SpawningFactory)
/// implementation when it cannot start a worker.
#[derive(Debug, Clone, Error)]
pub enum SpawnError {
    /// The worker could not be started.
    #[error("failed to start application worker: {0}")]
    Failed(String),

    /// Spawning was aborted by the factory, e.g. because it is shutting
    /// down.
    #[error("spawning was aborted")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_detached_message_is_stable() {
        // Callers match on this message; it is part of the public contract.
        assert_eq!(
            GetError::group_detached().to_string(),
            "The containing Group was detached."
        );
    }
}
