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

//! Bookkeeping for one attached worker process.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use plexpool_core::WorkerInfo;

/// One worker process attached to a group. Owned by its group; which of the
/// group's lists it sits on (enabled, disabling, disabled) determines its
/// lifecycle state.
pub(crate) struct Process {
    pub info: WorkerInfo,
    /// Group restart generation the worker belongs to. Workers from an
    /// older generation are retired as they become idle.
    pub generation: u64,
    pub spawned_at: DateTime<Utc>,
    /// Number of sessions currently held against the worker.
    pub sessions: u32,
    /// When the worker last became idle. Meaningless while busy.
    pub last_idle_at: Instant,
}

impl Process {
    pub fn new(pid: u32, gupid: String, app_group_name: String, generation: u64) -> Self {
        Self {
            info: WorkerInfo {
                gupid,
                pid,
                app_group_name,
            },
            generation,
            spawned_at: Utc::now(),
            sessions: 0,
            last_idle_at: Instant::now(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.sessions == 0
    }

    /// How long the worker has been idle, or `None` while it is busy.
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        if self.is_idle() {
            Some(now.saturating_duration_since(self.last_idle_at))
        } else {
            None
        }
    }
}
