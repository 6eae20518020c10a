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

//! Collaborator traits.
//!
//! The pool never starts or signals OS processes itself. Spawning is
//! delegated to a [`SpawningFactory`] implementation, and the graceful
//! shutdown path can ask a [`ConnectionAborter`] to cut long-running
//! connections (e.g. WebSockets) so workers can drain. Both are held as
//! trait objects; neither is ever invoked while the pool lock is held.

use async_trait::async_trait;

use crate::{Options, SpawnError, WorkerInfo};

/// A worker freshly started by the factory, not yet attached to a group.
#[derive(Debug, Clone)]
pub struct SpawnedWorker {
    /// Operating-system process id of the new worker.
    pub pid: u32,
}

/// Starts application workers on behalf of the pool.
#[async_trait]
pub trait SpawningFactory: Send + Sync {
    /// Start one worker for the application described by `options`.
    ///
    /// May take arbitrarily long; the pool accounts the spawn against its
    /// capacity ceiling for the whole duration of the call.
    async fn spawn_worker(&self, options: &Options) -> Result<SpawnedWorker, SpawnError>;
}

/// Hook invoked while preparing for shutdown to abort long-running
/// connections held by a worker.
pub trait ConnectionAborter: Send + Sync {
    /// Tell `worker` to abort its long-running connections.
    fn abort_long_running_connections(&self, worker: &WorkerInfo);
}
