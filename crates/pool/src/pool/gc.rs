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

//! Garbage collection.
//!
//! A background sweeper that detaches workers idle past `max_idle_time`
//! (never dropping a group below its configured minimum) and removes
//! groups with nothing left to do. Sleeps until the earliest idle expiry
//! and is woken early when the idle threshold changes or a group is
//! created.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

use super::{LifeStatus, PoolShared};
use crate::deferred::DeferredActions;

/// Floor on the sweep interval so a tiny `max_idle_time` cannot turn the
/// collector into a busy loop.
const MIN_SLEEP: Duration = Duration::from_millis(10);

pub(crate) fn spawn_gc_task(shared: &Arc<PoolShared>) -> JoinHandle<()> {
    let weak: Weak<PoolShared> = Arc::downgrade(shared);
    let mut shutdown_rx = shared.shutdown_rx();
    tokio::spawn(async move {
        loop {
            let Some(shared) = weak.upgrade() else { break };
            let sleep_for = shared.gc_next_deadline();
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    match changed {
                        Ok(()) if !*shutdown_rx.borrow() => continue,
                        _ => break,
                    }
                }
                // Recompute the deadline on wake-up.
                _ = shared.gc_wakeup.notified() => continue,
                _ = tokio::time::sleep(sleep_for) => shared.gc_sweep(),
            }
        }
    })
}

impl PoolShared {
    /// Time until the earliest idle worker crosses the reaping threshold.
    fn gc_next_deadline(&self) -> Duration {
        let st = self.lock();
        let max_idle = st.max_idle_time;
        let now = Instant::now();
        let mut next = max_idle;
        for group in st.groups.iter() {
            for process in group.enabled() {
                if let Some(idle) = process.idle_for(now) {
                    next = next.min(max_idle.saturating_sub(idle));
                }
            }
        }
        next.max(MIN_SLEEP)
    }

    /// One collection cycle: reap expired idle workers, drop collectable
    /// groups, then redistribute the freed capacity.
    pub(crate) fn gc_sweep(self: &Arc<Self>) {
        let mut deferred = DeferredActions::new();
        {
            let mut st = self.lock();
            if st.life_status >= LifeStatus::ShuttingDown {
                return;
            }
            let now = Instant::now();
            let max_idle = st.max_idle_time;

            let victims: Vec<(String, String)> = st
                .groups
                .iter()
                .flat_map(|g| {
                    g.collect_idle(now, max_idle)
                        .into_iter()
                        .map(move |gupid| (g.name().to_string(), gupid))
                })
                .collect();
            for (name, gupid) in &victims {
                debug!(group = %name, gupid = %gupid, "collecting idle worker");
                if let Some(group) = st.groups.get_mut(name) {
                    group.detach(gupid, &mut deferred);
                    self.metrics.workers_detached.fetch_add(1, Ordering::Relaxed);
                }
            }

            let empty_groups: Vec<String> = st
                .groups
                .iter()
                .filter(|g| g.garbage_collectable())
                .map(|g| g.name().to_string())
                .collect();
            for name in &empty_groups {
                debug!(group = %name, "collecting idle group");
                if let Some(group) = st.groups.remove(name) {
                    if let Some(draining) = group.shutdown(Box::new(|| {}), &mut deferred) {
                        st.draining.push(draining);
                    }
                    self.metrics.groups_detached.fetch_add(1, Ordering::Relaxed);
                }
            }

            if !victims.is_empty() || !empty_groups.is_empty() {
                self.assign_sessions_to_get_waiters(&mut st, &mut deferred);
                self.possibly_spawn_more_processes_for_existing_groups(&mut st, &mut deferred);
            }
            self.metrics.gc_runs.fetch_add(1, Ordering::Relaxed);
            st.verify();
        }
        deferred.run();
    }
}
