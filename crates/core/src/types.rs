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

//! Identifiers and result enumerations shared across the pool surface.

use serde::{Deserialize, Serialize};

/// Identity of one application worker, as exposed to callers.
///
/// The `gupid` is globally unique across the worker's lifetime; the OS `pid`
/// may be recycled by the kernel after the worker exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Globally unique worker id, assigned at attach time.
    pub gupid: String,
    /// Operating-system process id.
    pub pid: u32,
    /// Name of the application group that owns the worker.
    pub app_group_name: String,
}

/// Outcome of a disable request against one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisableResult {
    /// The worker was moved to the disabled list.
    Success,
    /// The worker was already disabled; nothing changed.
    AlreadyDisabled,
    /// The worker cannot be disabled in its current state.
    Error,
    /// No such worker is known to the pool.
    Noop,
    /// The worker is busy; the result will be delivered asynchronously once
    /// its last session is released.
    Deferred,
}

/// How a group restart should treat the workers of the previous generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestartMethod {
    /// Old workers are retired as they become idle.
    #[default]
    Default,
    /// Old workers are detached immediately, busy or not.
    Blocking,
    /// Alias for the gradual strategy; kept distinct for configurability.
    Rolling,
}
