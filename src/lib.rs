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

//! PlexPool: admission and placement engine for an application-server
//! process pool.
//!
//! The pool receives requests for a worker session in a named application
//! group and decides whether to route to an existing worker, spawn a new
//! worker, evict an idle worker, or park the request, while coordinating
//! worker lifecycle (attach, disable, detach, restart) under a global
//! capacity ceiling shared across all groups.
//!
//! Independent crates, re-exported here:
//! - [`plexpool_core`]: request options, pool configuration, session
//!   handles, result enumerations, and the collaborator traits.
//! - [`plexpool_pool`]: the pool orchestrator itself.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use plexpool_core as core;
pub use plexpool_pool as pool;

// Re-export the main surface for convenience
pub use plexpool_core::{
    ConnectionAborter, DisableResult, GetCallback, GetError, Options, PoolConfig, RestartMethod,
    Session, SpawnError, SpawnedWorker, SpawningFactory, WorkerInfo,
};
pub use plexpool_pool::{GroupDescriptor, LifeStatus, Pool, PoolMetrics, PoolSnapshot};
