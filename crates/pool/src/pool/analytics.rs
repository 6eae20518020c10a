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

//! Analytics collection.
//!
//! Monotonic pool counters, bumped lock-free from the hot paths, plus a
//! background sweeper that periodically reports the pool shape through
//! structured logging. Only the wake-up contract matters to the
//! orchestrator; what collectors do with the report is their business.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use super::PoolShared;
use crate::group::Group;

/// Snapshot of the pool's monotonic counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolMetrics {
    /// Session requests received.
    pub total_gets: u64,
    /// Requests parked on the global wait list.
    pub parked_gets: u64,
    /// Sessions handed out.
    pub sessions_created: u64,
    /// Sessions released.
    pub sessions_closed: u64,
    /// Workers attached after a successful spawn.
    pub workers_spawned: u64,
    /// Spawns that failed.
    pub spawn_failures: u64,
    /// Workers detached, for any reason.
    pub workers_detached: u64,
    /// Groups created.
    pub groups_created: u64,
    /// Groups detached.
    pub groups_detached: u64,
    /// Garbage collector sweeps performed.
    pub gc_runs: u64,
}

#[derive(Default)]
pub(crate) struct MetricsCounters {
    pub total_gets: AtomicU64,
    pub parked_gets: AtomicU64,
    pub sessions_created: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub workers_spawned: AtomicU64,
    pub spawn_failures: AtomicU64,
    pub workers_detached: AtomicU64,
    pub groups_created: AtomicU64,
    pub groups_detached: AtomicU64,
    pub gc_runs: AtomicU64,
}

impl MetricsCounters {
    pub fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            total_gets: self.total_gets.load(Ordering::Relaxed),
            parked_gets: self.parked_gets.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
            workers_detached: self.workers_detached.load(Ordering::Relaxed),
            groups_created: self.groups_created.load(Ordering::Relaxed),
            groups_detached: self.groups_detached.load(Ordering::Relaxed),
            gc_runs: self.gc_runs.load(Ordering::Relaxed),
        }
    }
}

/// Periodic reporter. Exits on the pool's shutdown signal or once the pool
/// itself is gone.
pub(crate) fn spawn_analytics_task(shared: &Arc<PoolShared>) -> JoinHandle<()> {
    let weak: Weak<PoolShared> = Arc::downgrade(shared);
    let mut shutdown_rx = shared.shutdown_rx();
    let interval = shared.analytics_interval;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    match changed {
                        Ok(()) if !*shutdown_rx.borrow() => continue,
                        _ => break,
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
            let Some(shared) = weak.upgrade() else { break };
            report(&shared);
        }
    })
}

fn report(shared: &PoolShared) {
    let metrics = shared.metrics.snapshot();
    let st = shared.lock();
    debug!(
        life_status = ?st.life_status,
        max = st.max,
        capacity_used = st.capacity_used(),
        group_count = st.groups.len(),
        process_count = st.groups.iter().map(Group::process_count).sum::<u32>(),
        get_wait_list_size = st.get_waitlist.len(),
        sessions_created = metrics.sessions_created,
        sessions_closed = metrics.sessions_closed,
        workers_spawned = metrics.workers_spawned,
        spawn_failures = metrics.spawn_failures,
        "pool analytics"
    );
}
