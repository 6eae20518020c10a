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

//! # PlexPool Core
//!
//! ## Purpose
//! Shared contracts between the pool orchestrator and its collaborators:
//! request options, agent-wide configuration, the session handle handed to
//! callers, result enumerations, error types, and the traits implemented by
//! the spawning factory and the connection-abort hook.
//!
//! ## Key Components
//! - [`Options`]: per-request tuning, persisted on wait lists
//! - [`PoolConfig`]: agent-wide configuration with built-in defaults
//! - [`Session`]: exclusive use of one worker for one request
//! - [`SpawningFactory`]: the collaborator that actually starts workers
//! - [`GetError`] / [`SpawnError`] / [`ConfigError`]: error surfaces

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod options;
mod session;
mod spawn;
mod types;

pub use config::{ConfigError, PoolConfig};
pub use error::{GetError, SpawnError};
pub use options::{AnalyticsTxn, Options};
pub use session::{GetCallback, Session};
pub use spawn::{ConnectionAborter, SpawnedWorker, SpawningFactory};
pub use types::{DisableResult, RestartMethod, WorkerInfo};
