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

//! Diagnostic snapshots of the pool shape, serializable for admin tooling.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{LifeStatus, PoolState};
use crate::group::Group;
use crate::process::Process;

/// One worker, as seen at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    /// Operating-system process id.
    pub pid: u32,
    /// Globally unique worker id.
    pub gupid: String,
    /// Sessions currently held against the worker.
    pub sessions: u32,
    /// When the worker was attached.
    pub spawned_at: DateTime<Utc>,
    /// Milliseconds the worker has been idle; `None` while busy.
    pub idle_millis: Option<u64>,
}

/// One group, as seen at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSnapshot {
    /// The group's unique name.
    pub name: String,
    /// Filesystem root of the application.
    pub app_root: String,
    /// The group's share of the capacity ceiling.
    pub capacity_used: u32,
    /// Requests parked on the group's own wait list.
    pub get_wait_list_size: usize,
    /// Whether a spawn is in flight.
    pub spawning: bool,
    /// Whether the group is replacing its workers.
    pub restarting: bool,
    /// Whether a wanted spawn is blocked on the capacity ceiling.
    pub waiting_for_capacity: bool,
    /// Workers serving sessions.
    pub enabled: Vec<ProcessSnapshot>,
    /// Workers draining towards disabled.
    pub disabling: Vec<ProcessSnapshot>,
    /// Workers taken out of rotation.
    pub disabled: Vec<ProcessSnapshot>,
}

/// The whole pool, as seen at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    /// Lifecycle state.
    pub life_status: LifeStatus,
    /// Capacity ceiling.
    pub max: u32,
    /// Capacity currently in use.
    pub capacity_used: u32,
    /// Requests parked on the global wait list.
    pub get_wait_list_size: usize,
    /// All application groups.
    pub groups: Vec<GroupSnapshot>,
}

pub(crate) fn snapshot(st: &PoolState) -> PoolSnapshot {
    let now = Instant::now();
    PoolSnapshot {
        life_status: st.life_status,
        max: st.max,
        capacity_used: st.capacity_used(),
        get_wait_list_size: st.get_waitlist.len(),
        groups: st.groups.iter().map(|g| group_snapshot(g, now)).collect(),
    }
}

fn group_snapshot(group: &Group, now: Instant) -> GroupSnapshot {
    let processes = |list: &[Process]| list.iter().map(|p| process_snapshot(p, now)).collect();
    GroupSnapshot {
        name: group.name().to_string(),
        app_root: group.options.app_root.clone(),
        capacity_used: group.capacity_used(),
        get_wait_list_size: group.get_waitlist_len(),
        spawning: group.spawning(),
        restarting: group.restarting(),
        waiting_for_capacity: group.is_waiting_for_capacity(),
        enabled: processes(group.enabled()),
        disabling: processes(group.disabling()),
        disabled: processes(group.disabled()),
    }
}

fn process_snapshot(process: &Process, now: Instant) -> ProcessSnapshot {
    ProcessSnapshot {
        pid: process.info.pid,
        gupid: process.info.gupid.clone(),
        sessions: process.sessions,
        spawned_at: process.spawned_at,
        idle_millis: process.idle_for(now).map(|d| d.as_millis() as u64),
    }
}
