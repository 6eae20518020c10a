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

//! # PlexPool Orchestrator
//!
//! ## Purpose
//! The admission and placement engine of an application-server process
//! pool. A [`Pool`] divides a global capacity ceiling among independent
//! application groups, deciding per request whether to route to an existing
//! worker, spawn a new one, evict an idle one, or park the request on a
//! wait list, and coordinates worker lifecycle: attach, disable, detach,
//! restart.
//!
//! ## Architecture
//! ```text
//! Pool (one coarse lock, deferred-action protocol)
//!   ├─ GroupMap (name → Group)
//!   │    └─ Group (enabled/disabling/disabled workers, group wait list,
//!   │              spawn & restart state)
//!   ├─ global get wait list
//!   ├─ garbage collector  (background task, idle reaping)
//!   └─ analytics sweeper  (background task, shape reports)
//! ```
//!
//! Spawning is delegated to a
//! [`SpawningFactory`](plexpool_core::SpawningFactory); sessions are handed
//! out as [`Session`](plexpool_core::Session) handles whose drop returns
//! the worker to its group.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod deferred;
mod group;
mod group_map;
mod pool;
mod process;
mod ticket;

pub use deferred::DeferredActions;
pub use pool::{GroupDescriptor, GroupSnapshot, LifeStatus, Pool, PoolMetrics, PoolSnapshot, ProcessSnapshot};
pub use ticket::{ticket, DetachGroupTicket, DisableTicket, Ticket, TicketSignal};
