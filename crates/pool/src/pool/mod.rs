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

//! The pool orchestrator.
//!
//! ## Purpose
//! Single point where a shared capacity budget is divided among independent
//! application groups: admission (route, spawn, evict, or park), the global
//! wait list, the life-status state machine, and the mutation protocol that
//! keeps concurrent external calls composable.
//!
//! ## Locking protocol
//! All shared state sits behind one coarse mutex. Every mutating entry
//! point acquires it, mutates, appends side-effecting work to a
//! [`DeferredActions`] queue, releases the lock, then drains the queue.
//! Caller-supplied callbacks and collaborator code never run under the
//! lock; synchronous administrative operations block on oneshot-backed
//! tickets with the lock released.

mod analytics;
mod gc;
mod inspection;

pub use analytics::PoolMetrics;
pub use inspection::{GroupSnapshot, PoolSnapshot, ProcessSnapshot};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use plexpool_core::{
    ConnectionAborter, DisableResult, GetCallback, GetError, Options, PoolConfig, RestartMethod,
    Session, SpawnError, SpawnedWorker, SpawningFactory, WorkerInfo,
};

use crate::deferred::DeferredActions;
use crate::group::{DrainingGroup, GetHandled, GetWaiter, Group};
use crate::group_map::GroupMap;
use crate::ticket::{ticket, DetachGroupTicket, DisableTicket};
use analytics::MetricsCounters;

/// Lifecycle of the pool. Advances monotonically and never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LifeStatus {
    /// Serving requests.
    Alive,
    /// Graceful shutdown announced; respawning is suppressed.
    PreparedForShutdown,
    /// `destroy()` is tearing groups down.
    ShuttingDown,
    /// Terminal. The pool may now be dropped.
    ShutDown,
}

/// Identity of a group, as handed to administrative callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDescriptor {
    /// The group's unique name.
    pub name: String,
    /// The group's unique secret.
    pub secret: String,
}

/// Builds the release notifications embedded into sessions. Creating a
/// session through the factory also counts it.
pub(crate) struct SessionCloserFactory {
    shared: Weak<PoolShared>,
}

impl SessionCloserFactory {
    /// A factory with no pool behind it; sessions it produces release into
    /// the void. Only unit tests drive groups without a pool.
    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        Self { shared: Weak::new() }
    }

    pub(crate) fn make(&self, worker: &WorkerInfo) -> Box<dyn FnOnce() + Send> {
        if let Some(shared) = self.shared.upgrade() {
            shared.metrics.sessions_created.fetch_add(1, Ordering::Relaxed);
        }
        let weak = self.shared.clone();
        let worker = worker.clone();
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.release_session(&worker);
            }
        })
    }
}

pub(crate) struct PoolState {
    max: u32,
    max_idle_time: Duration,
    self_checking: bool,
    life_status: LifeStatus,
    groups: GroupMap,
    get_waitlist: VecDeque<GetWaiter>,
    /// Detached groups whose in-flight spawns have not landed yet.
    draining: Vec<DrainingGroup>,
}

impl PoolState {
    pub(crate) fn capacity_used(&self) -> u32 {
        self.groups.iter().map(Group::capacity_used).sum()
    }

    pub(crate) fn at_full_capacity(&self) -> bool {
        self.capacity_used() >= self.max
    }

    fn find_group_of_gupid(&self, gupid: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.find_process(gupid).is_some())
            .map(Group::name)
    }

    fn all_workers(&self) -> Vec<WorkerInfo> {
        self.groups
            .iter()
            .flat_map(|g| g.processes().map(|p| p.info.clone()))
            .collect()
    }

    /// Re-establish the cross-group invariants; panics on violation.
    /// Called after every mutation while self-checking is enabled.
    fn verify_invariants(&self) {
        for waiter in &self.get_waitlist {
            assert!(
                !self.groups.contains(&waiter.options.app_group_name),
                "pool wait list holds a request for existing group `{}`",
                waiter.options.app_group_name
            );
        }
        if !self.get_waitlist.is_empty() {
            assert!(
                self.capacity_used() >= self.max,
                "pool wait list is non-empty below capacity ({} < {})",
                self.capacity_used(),
                self.max
            );
        }
    }

    fn verify(&self) {
        if self.self_checking {
            self.verify_invariants();
        }
    }
}

pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
    factory: Arc<dyn SpawningFactory>,
    aborter: Mutex<Option<Arc<dyn ConnectionAborter>>>,
    pub(crate) metrics: MetricsCounters,
    analytics_interval: Duration,
    gc_wakeup: Notify,
    shutdown_tx: watch::Sender<bool>,
    initialized: AtomicBool,
    /// Background sweepers; signalled and joined on destroy.
    interruptable: Mutex<Vec<JoinHandle<()>>>,
    /// In-flight spawn tasks; joined (never cancelled) on destroy.
    non_interruptable: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolShared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().expect("pool state lock poisoned")
    }

    pub(crate) fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    fn closer_factory(self: &Arc<Self>) -> SessionCloserFactory {
        SessionCloserFactory {
            shared: Arc::downgrade(self),
        }
    }

    fn register_non_interruptable(&self, handle: JoinHandle<()>) {
        let mut handles = self
            .non_interruptable
            .lock()
            .expect("task registry lock poisoned");
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    // ------------------------------------------------------------------
    // Core algorithms (all called with the state guard held)
    // ------------------------------------------------------------------

    fn create_group(self: &Arc<Self>, st: &mut PoolState, options: &Options) {
        debug!(group = %options.app_group_name, "creating group");
        st.groups.insert(Group::new(options));
        self.metrics.groups_created.fetch_add(1, Ordering::Relaxed);
        // New groups change the earliest idle deadline.
        self.gc_wakeup.notify_one();
    }

    /// Route a request to an existing group; consider spawning when it got
    /// parked on the group's wait list.
    fn get_from_group(
        self: &Arc<Self>,
        st: &mut PoolState,
        name: &str,
        options: &Options,
        callback: GetCallback,
        deferred: &mut DeferredActions,
    ) {
        let closers = self.closer_factory();
        let handled = st
            .groups
            .get_mut(name)
            .expect("routing to a group that is not in the map")
            .get(options, callback, deferred, &closers);
        if handled == GetHandled::Queued {
            self.maybe_spawn_for_group(st, name, deferred);
        }
    }

    fn create_group_and_get(
        self: &Arc<Self>,
        st: &mut PoolState,
        options: &Options,
        callback: GetCallback,
        deferred: &mut DeferredActions,
    ) {
        self.create_group(st, options);
        let name = options.app_group_name.clone();
        self.get_from_group(st, &name, options, callback, deferred);
    }

    /// Start a spawn for the group if it wants one and capacity allows;
    /// otherwise mark it as waiting for capacity.
    fn maybe_spawn_for_group(
        self: &Arc<Self>,
        st: &mut PoolState,
        name: &str,
        deferred: &mut DeferredActions,
    ) {
        let Some(group) = st.groups.get(name) else {
            return;
        };
        if !group.should_spawn() {
            return;
        }
        if st.at_full_capacity() {
            st.groups
                .get_mut(name)
                .expect("group checked above")
                .set_waiting_for_capacity(true);
        } else {
            self.start_spawn(st, name, deferred);
        }
    }

    /// Account a spawn against the group and defer launching the factory
    /// call; the spawn task reports back through `complete_spawn`.
    fn start_spawn(self: &Arc<Self>, st: &mut PoolState, name: &str, deferred: &mut DeferredActions) {
        let group = st.groups.get_mut(name).expect("spawning for unknown group");
        group.begin_spawn();
        debug!(group = %name, "spawning new worker");

        let options = group.options.persist();
        let secret = group.secret().to_string();
        let name = name.to_string();
        let factory = Arc::clone(&self.factory);
        let weak = Arc::downgrade(self);
        deferred.push(move || {
            let task_weak = weak.clone();
            let handle = tokio::spawn(async move {
                let result = factory.spawn_worker(&options).await;
                if let Some(shared) = task_weak.upgrade() {
                    shared.complete_spawn(&name, &secret, result);
                }
            });
            if let Some(shared) = weak.upgrade() {
                shared.register_non_interruptable(handle);
            }
        });
    }

    /// Process the global wait list in FIFO order, forwarding each waiter
    /// to its group, creating the group when capacity allows, or retaining
    /// the waiter. On exit no retained waiter names an existing group, and
    /// waiters are only retained at full capacity.
    fn assign_sessions_to_get_waiters(
        self: &Arc<Self>,
        st: &mut PoolState,
        deferred: &mut DeferredActions,
    ) {
        let waiters = std::mem::take(&mut st.get_waitlist);
        let mut retained = VecDeque::new();

        for waiter in waiters {
            let GetWaiter { options, callback } = waiter;
            if st.groups.contains(&options.app_group_name) {
                let name = options.app_group_name.clone();
                self.get_from_group(st, &name, &options, callback, deferred);
            } else if !st.at_full_capacity() && st.life_status <= LifeStatus::PreparedForShutdown {
                self.create_group_and_get(st, &options, callback, deferred);
            } else {
                retained.push_back(GetWaiter { options, callback });
            }
        }

        st.get_waitlist = retained;
    }

    /// Two passes over the groups: first those already waiting for
    /// capacity, then those that merely want to scale up. Both stop at the
    /// capacity ceiling.
    fn possibly_spawn_more_processes_for_existing_groups(
        self: &Arc<Self>,
        st: &mut PoolState,
        deferred: &mut DeferredActions,
    ) {
        if st.life_status >= LifeStatus::ShuttingDown {
            return;
        }

        let waiting: Vec<String> = st
            .groups
            .iter()
            .filter(|g| g.is_waiting_for_capacity())
            .map(|g| g.name().to_string())
            .collect();
        for name in waiting {
            if st.at_full_capacity() {
                return;
            }
            trace!(group = %name, "group was waiting for capacity");
            self.start_spawn(st, &name, deferred);
        }

        let should: Vec<String> = st
            .groups
            .iter()
            .filter(|g| g.should_spawn() && !g.is_waiting_for_capacity())
            .map(|g| g.name().to_string())
            .collect();
        for name in should {
            if st.at_full_capacity() {
                return;
            }
            trace!(group = %name, "group requests more workers");
            self.start_spawn(st, &name, deferred);
        }
    }

    /// Detach the oldest idle worker across all groups except `exclude`.
    fn force_free_capacity(
        self: &Arc<Self>,
        st: &mut PoolState,
        exclude: Option<&str>,
        deferred: &mut DeferredActions,
    ) -> Option<WorkerInfo> {
        let now = Instant::now();
        let mut oldest: Option<(Duration, String, String)> = None;
        for group in st.groups.iter() {
            if Some(group.name()) == exclude {
                continue;
            }
            if let Some((idle, gupid)) = group.oldest_idle_worker(now) {
                if oldest.as_ref().map_or(true, |(best, _, _)| idle > *best) {
                    oldest = Some((idle, group.name().to_string(), gupid));
                }
            }
        }

        let (_, group_name, gupid) = oldest?;
        let group = st
            .groups
            .get_mut(&group_name)
            .expect("owning group disappeared");
        debug_assert_eq!(group.get_waitlist_len(), 0, "idle worker implies no group waiters");
        let info = group.find_process(&gupid).map(|p| p.info.clone());
        debug!(group = %group_name, gupid = %gupid, "forcefully detaching idle worker to free capacity");
        group.detach(&gupid, deferred);
        self.metrics.workers_detached.fetch_add(1, Ordering::Relaxed);
        info
    }

    /// Detach one worker and fix up the invariants afterwards.
    fn detach_process_unlocked(
        self: &Arc<Self>,
        st: &mut PoolState,
        gupid: &str,
        deferred: &mut DeferredActions,
    ) -> bool {
        let Some(name) = st.find_group_of_gupid(gupid).map(str::to_string) else {
            return false;
        };
        st.groups
            .get_mut(&name)
            .expect("owning group disappeared")
            .detach(gupid, deferred);
        self.metrics.workers_detached.fetch_add(1, Ordering::Relaxed);
        self.assign_sessions_to_get_waiters(st, deferred);
        self.possibly_spawn_more_processes_for_existing_groups(st, deferred);
        true
    }

    // ------------------------------------------------------------------
    // Completions arriving from outside the lock
    // ------------------------------------------------------------------

    /// A spawn task finished. The group is identified by name *and* secret
    /// so a re-created namesake never receives another group's worker.
    fn complete_spawn(
        self: &Arc<Self>,
        name: &str,
        secret: &str,
        result: Result<SpawnedWorker, SpawnError>,
    ) {
        let mut deferred = DeferredActions::new();
        {
            let mut st = self.lock();
            let group_matches = st
                .groups
                .get(name)
                .map(|g| g.secret() == secret)
                .unwrap_or(false);

            if group_matches {
                let closers = self.closer_factory();
                match result {
                    Ok(worker) => {
                        st.groups
                            .get_mut(name)
                            .expect("group checked above")
                            .attach_spawned(worker.pid, &mut deferred, &closers);
                        self.metrics.workers_spawned.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(error) => {
                        warn!(group = %name, %error, "worker spawn failed; reclaiming capacity");
                        st.groups
                            .get_mut(name)
                            .expect("group checked above")
                            .spawn_failed(&error, &mut deferred);
                        self.metrics.spawn_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
                self.assign_sessions_to_get_waiters(&mut st, &mut deferred);
                self.possibly_spawn_more_processes_for_existing_groups(&mut st, &mut deferred);
            } else if let Some(index) = st.draining.iter().position(|d| d.secret == secret) {
                let record = &mut st.draining[index];
                record.spawns_left = record.spawns_left.saturating_sub(1);
                if record.spawns_left == 0 {
                    let record = st.draining.remove(index);
                    debug!(group = %record.name, "detached group finished draining");
                    if let Some(on_done) = record.on_done {
                        deferred.push(on_done);
                    }
                }
            } else {
                debug!(group = %name, "spawn completed for unknown group; worker discarded");
            }
            st.verify();
        }
        deferred.run();
    }

    /// A session was closed; the worker goes back to its group and freed
    /// capacity is redistributed.
    fn release_session(self: &Arc<Self>, worker: &WorkerInfo) {
        self.metrics.sessions_closed.fetch_add(1, Ordering::Relaxed);
        let mut deferred = DeferredActions::new();
        {
            let mut st = self.lock();
            if st.groups.contains(&worker.app_group_name) {
                let closers = self.closer_factory();
                st.groups
                    .get_mut(&worker.app_group_name)
                    .expect("group checked above")
                    .on_session_released(&worker.gupid, &mut deferred, &closers);
                self.assign_sessions_to_get_waiters(&mut st, &mut deferred);
                self.possibly_spawn_more_processes_for_existing_groups(&mut st, &mut deferred);
            }
            st.verify();
        }
        deferred.run();
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if let Ok(st) = self.state.get_mut() {
            assert!(
                st.life_status == LifeStatus::ShutDown,
                "Pool must be destroy()ed before it is dropped"
            );
        }
    }
}

/// The pool. Cheap to clone; all clones share one underlying pool.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<PoolShared>,
}

impl Pool {
    /// Build a pool around `factory`.
    ///
    /// Panics when `config` does not allow at least one worker; use
    /// [`PoolConfig::validate`] (or [`Pool::from_agent_options`]) to reject
    /// bad configuration gracefully.
    pub fn new(factory: Arc<dyn SpawningFactory>, config: PoolConfig) -> Self {
        assert!(config.max >= 1, "pool capacity ceiling must be at least 1");
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    max: config.max,
                    max_idle_time: config.max_idle_time,
                    self_checking: config.self_checking,
                    life_status: LifeStatus::Alive,
                    groups: GroupMap::new(),
                    get_waitlist: VecDeque::new(),
                    draining: Vec::new(),
                }),
                factory,
                aborter: Mutex::new(None),
                metrics: MetricsCounters::default(),
                analytics_interval: config.analytics_interval,
                gc_wakeup: Notify::new(),
                shutdown_tx,
                initialized: AtomicBool::new(false),
                interruptable: Mutex::new(Vec::new()),
                non_interruptable: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build a pool configured from an agent-wide key-value option map.
    pub fn from_agent_options(
        factory: Arc<dyn SpawningFactory>,
        agent_options: &std::collections::HashMap<String, String>,
    ) -> Result<Self, plexpool_core::ConfigError> {
        let config = PoolConfig::from_agent_options(agent_options)?;
        Ok(Self::new(factory, config))
    }

    /// Start the background sweepers. Must be called exactly once, right
    /// after construction, from within a tokio runtime.
    pub fn initialize(&self) {
        let already = self.shared.initialized.swap(true, Ordering::SeqCst);
        assert!(!already, "Pool::initialize() must be called exactly once");
        let mut handles = self
            .shared
            .interruptable
            .lock()
            .expect("task registry lock poisoned");
        handles.push(gc::spawn_gc_task(&self.shared));
        handles.push(analytics::spawn_analytics_task(&self.shared));
    }

    /// Install the hook used while preparing for shutdown to abort
    /// long-running connections.
    pub fn set_connection_aborter(&self, aborter: Arc<dyn ConnectionAborter>) {
        *self.shared.aborter.lock().expect("aborter lock poisoned") = Some(aborter);
    }

    // ------------------------------------------------------------------
    // Session acquisition
    // ------------------------------------------------------------------

    /// Request a session for the group named in `options`.
    ///
    /// The callback fires exactly once, never while the pool lock is held:
    /// with a session once a worker is available, or with an error when the
    /// request is aborted or its group cannot spawn.
    pub fn async_get(&self, options: &Options, callback: GetCallback) {
        let shared = &self.shared;
        shared.metrics.total_gets.fetch_add(1, Ordering::Relaxed);
        let mut deferred = DeferredActions::new();
        {
            let mut st = shared.lock();
            assert!(
                st.life_status <= LifeStatus::PreparedForShutdown,
                "async_get() called after shutdown began"
            );
            trace!(group = %options.app_group_name, "async_get");

            if st.groups.contains(&options.app_group_name) {
                let name = options.app_group_name.clone();
                shared.get_from_group(&mut st, &name, options, callback, &mut deferred);
            } else if !st.at_full_capacity() {
                shared.create_group_and_get(&mut st, options, callback, &mut deferred);
            } else {
                match shared.force_free_capacity(&mut st, None, &mut deferred) {
                    Some(_) => {
                        shared.create_group_and_get(&mut st, options, callback, &mut deferred);
                    }
                    None => {
                        // Nothing can be evicted; park the request.
                        debug!(group = %options.app_group_name, "no capacity and nothing evictable; parking request");
                        st.get_waitlist.push_back(GetWaiter {
                            options: options.persist(),
                            callback,
                        });
                        shared.metrics.parked_gets.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            st.verify();
        }
        deferred.run();
    }

    /// Synchronous wrapper around [`Pool::async_get`]: waits for the
    /// callback and propagates its error.
    pub async fn get(&self, options: &Options) -> Result<Session, GetError> {
        let (signal, ticket) = ticket();
        self.async_get(options, Box::new(move |result| signal.complete(result)));
        ticket
            .wait()
            .await
            .unwrap_or_else(|| Err(GetError::Aborted("The session request was abandoned.".to_string())))
    }

    /// Make sure a group exists for `options`, creating it (ignoring the
    /// capacity ceiling) if needed, and return its identity.
    pub fn ensure_group(&self, options: &Options) -> GroupDescriptor {
        let mut st = self.shared.lock();
        assert!(
            st.life_status <= LifeStatus::PreparedForShutdown,
            "ensure_group() called after shutdown began"
        );
        if !st.groups.contains(&options.app_group_name) {
            self.shared.create_group(&mut st, options);
        }
        let group = st
            .groups
            .get(&options.app_group_name)
            .expect("group just ensured");
        let descriptor = GroupDescriptor {
            name: group.name().to_string(),
            secret: group.secret().to_string(),
        };
        st.verify();
        descriptor
    }

    // ------------------------------------------------------------------
    // Tuning
    // ------------------------------------------------------------------

    /// Update the capacity ceiling. When it grows, pool-level waiters are
    /// served before groups scale up discretionarily.
    pub fn set_max(&self, max: u32) {
        assert!(max >= 1, "pool capacity ceiling must be at least 1");
        let mut deferred = DeferredActions::new();
        {
            let mut st = self.shared.lock();
            let bigger = max > st.max;
            st.max = max;
            if bigger {
                self.shared.assign_sessions_to_get_waiters(&mut st, &mut deferred);
                self.shared
                    .possibly_spawn_more_processes_for_existing_groups(&mut st, &mut deferred);
            }
            st.verify();
        }
        deferred.run();
    }

    /// Update the idle-reaping threshold and wake the garbage collector.
    pub fn set_max_idle_time(&self, max_idle_time: Duration) {
        {
            let mut st = self.shared.lock();
            st.max_idle_time = max_idle_time;
        }
        self.shared.gc_wakeup.notify_one();
    }

    /// Toggle post-mutation invariant verification.
    pub fn enable_self_checking(&self, enabled: bool) {
        self.shared.lock().self_checking = enabled;
    }

    // ------------------------------------------------------------------
    // Worker lifecycle
    // ------------------------------------------------------------------

    /// Detach a worker by identity. Returns whether a detach occurred.
    pub fn detach_process(&self, worker: &WorkerInfo) -> bool {
        self.detach_process_by_gupid(&worker.gupid)
    }

    /// Detach a worker by gupid. Returns whether a detach occurred.
    pub fn detach_process_by_gupid(&self, gupid: &str) -> bool {
        let mut deferred = DeferredActions::new();
        let detached = {
            let mut st = self.shared.lock();
            let detached = self
                .shared
                .detach_process_unlocked(&mut st, gupid, &mut deferred);
            st.verify();
            detached
        };
        deferred.run();
        detached
    }

    /// Detach a worker by OS pid. Returns whether a detach occurred.
    pub fn detach_process_by_pid(&self, pid: u32) -> bool {
        let mut deferred = DeferredActions::new();
        let detached = {
            let mut st = self.shared.lock();
            let gupid = st
                .groups
                .iter()
                .flat_map(Group::processes)
                .find(|p| p.info.pid == pid)
                .map(|p| p.info.gupid.clone());
            let detached = match gupid {
                Some(gupid) => self
                    .shared
                    .detach_process_unlocked(&mut st, &gupid, &mut deferred),
                None => false,
            };
            st.verify();
            detached
        };
        deferred.run();
        detached
    }

    /// Detach a whole group, failing its parked requests with a
    /// [`GetError::group_detached`] abort. Blocks until the group has
    /// finished shutting down. Returns whether the group existed.
    pub async fn detach_group_by_name(&self, name: &str) -> bool {
        let Some(done) = self.begin_detach_group(name) else {
            return false;
        };
        done.wait().await;
        true
    }

    /// Resolve a group secret, then detach as by name.
    pub async fn detach_group_by_secret(&self, secret: &str) -> bool {
        let name = {
            let st = self.shared.lock();
            let found = st.groups
                .iter()
                .find(|g| g.secret() == secret)
                .map(|g| g.name().to_string());
            found
        };
        match name {
            Some(name) => self.detach_group_by_name(&name).await,
            None => false,
        }
    }

    /// The locked part of a group detach; the returned ticket fires once
    /// the group (including its in-flight spawns) has drained.
    fn begin_detach_group(&self, name: &str) -> Option<DetachGroupTicket> {
        let mut deferred = DeferredActions::new();
        let done = {
            let mut st = self.shared.lock();
            let mut group = st.groups.remove(name)?;
            debug!(group = %name, "detaching group");

            group.drain_waitlist(GetError::group_detached(), &mut deferred);
            let (signal, done) = ticket();
            if let Some(draining) =
                group.shutdown(Box::new(move || signal.complete(())), &mut deferred)
            {
                st.draining.push(draining);
            }
            self.shared.metrics.groups_detached.fetch_add(1, Ordering::Relaxed);

            self.shared.assign_sessions_to_get_waiters(&mut st, &mut deferred);
            self.shared
                .possibly_spawn_more_processes_for_existing_groups(&mut st, &mut deferred);
            st.verify();
            done
        };
        deferred.run();
        Some(done)
    }

    /// Disable a worker so it no longer serves sessions. When the worker is
    /// busy the call blocks until its last session is released.
    pub async fn disable_process(&self, gupid: &str) -> DisableResult {
        let (result, done) = self.begin_disable(gupid);
        match result {
            DisableResult::Deferred => done.wait().await.unwrap_or(DisableResult::Error),
            other => other,
        }
    }

    fn begin_disable(&self, gupid: &str) -> (DisableResult, DisableTicket) {
        let (signal, done) = ticket();
        let mut deferred = DeferredActions::new();
        let result = {
            let mut st = self.shared.lock();
            let result = match st.find_group_of_gupid(gupid).map(str::to_string) {
                Some(name) => {
                    let group = st.groups.get_mut(&name).expect("owning group disappeared");
                    group.disable(
                        gupid,
                        Box::new(move |result| signal.complete(result)),
                        &mut deferred,
                    )
                }
                None => DisableResult::Noop,
            };
            st.verify();
            result
        };
        deferred.run();
        (result, done)
    }

    /// Restart the named group, unless it is already restarting or the
    /// pool has prepared for shutdown. Returns whether the group exists
    /// and the pool still accepts restarts.
    pub fn restart_group_by_name(&self, name: &str, method: RestartMethod) -> bool {
        let mut deferred = DeferredActions::new();
        let found = {
            let mut st = self.shared.lock();
            if st.life_status >= LifeStatus::PreparedForShutdown {
                // Respawn is suppressed from here on; restarting would
                // fight the shutdown.
                false
            } else if let Some(group) = st.groups.get_mut(name) {
                if !group.restarting() {
                    group.restart(method, &mut deferred);
                }
                self.shared
                    .possibly_spawn_more_processes_for_existing_groups(&mut st, &mut deferred);
                st.verify();
                true
            } else {
                false
            }
        };
        deferred.run();
        found
    }

    /// Restart every group rooted at `app_root`. Returns how many matched.
    pub fn restart_groups_by_app_root(&self, app_root: &str, method: RestartMethod) -> u32 {
        let mut deferred = DeferredActions::new();
        let count = {
            let mut st = self.shared.lock();
            if st.life_status >= LifeStatus::PreparedForShutdown {
                0
            } else {
                let names: Vec<String> = st
                    .groups
                    .iter()
                    .filter(|g| g.options.app_root == app_root)
                    .map(|g| g.name().to_string())
                    .collect();
                for name in &names {
                    let group = st.groups.get_mut(name).expect("group listed above");
                    if !group.restarting() {
                        group.restart(method, &mut deferred);
                    }
                }
                self.shared
                    .possibly_spawn_more_processes_for_existing_groups(&mut st, &mut deferred);
                st.verify();
                names.len() as u32
            }
        };
        deferred.run();
        count
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Announce a graceful shutdown: suppress respawning and ask every
    /// worker to abort its long-running connections.
    pub fn prepare_for_shutdown(&self) {
        let mut deferred = DeferredActions::new();
        {
            let mut st = self.shared.lock();
            assert_eq!(
                st.life_status,
                LifeStatus::Alive,
                "prepare_for_shutdown() requires a live pool"
            );
            st.life_status = LifeStatus::PreparedForShutdown;

            let aborter = self
                .shared
                .aborter
                .lock()
                .expect("aborter lock poisoned")
                .clone();
            for group in st.groups.iter_mut() {
                group.options.min_processes = 0;
                if let Some(aborter) = &aborter {
                    for process in group.processes() {
                        let aborter = Arc::clone(aborter);
                        let worker = process.info.clone();
                        deferred.push(move || aborter.abort_long_running_connections(&worker));
                    }
                }
            }
            st.verify();
        }
        deferred.run();
    }

    /// Tear the pool down: abort parked requests, detach every group, then
    /// stop and join the background tasks. Must be called before the pool
    /// is dropped.
    pub async fn destroy(&self) {
        let mut deferred = DeferredActions::new();
        {
            let mut st = self.shared.lock();
            assert!(
                st.life_status <= LifeStatus::PreparedForShutdown,
                "destroy() called twice"
            );
            st.life_status = LifeStatus::ShuttingDown;

            let error = GetError::pool_destroyed();
            while let Some(waiter) = st.get_waitlist.pop_front() {
                let callback = waiter.callback;
                let error = error.clone();
                deferred.push(move || callback(Err(error)));
            }
            st.verify();
        }
        deferred.run();

        loop {
            let name = {
                let st = self.shared.lock();
                st.groups.pick_any().map(str::to_string)
            };
            match name {
                Some(name) => {
                    self.detach_group_by_name(&name).await;
                }
                None => break,
            }
        }

        let _ = self.shared.shutdown_tx.send(true);
        self.shared.gc_wakeup.notify_one();

        let interruptable: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self
                .shared
                .interruptable
                .lock()
                .expect("task registry lock poisoned"),
        );
        for handle in interruptable {
            let _ = handle.await;
        }
        let non_interruptable: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self
                .shared
                .non_interruptable
                .lock()
                .expect("task registry lock poisoned"),
        );
        for handle in non_interruptable {
            let _ = handle.await;
        }

        let mut st = self.shared.lock();
        st.life_status = LifeStatus::ShutDown;
        st.verify();
    }

    // ------------------------------------------------------------------
    // Read-only queries
    // ------------------------------------------------------------------

    /// Current life status.
    pub fn life_status(&self) -> LifeStatus {
        self.shared.lock().life_status
    }

    /// Count of workers plus spawns in flight across all groups.
    pub fn capacity_used(&self) -> u32 {
        self.shared.lock().capacity_used()
    }

    /// Whether the capacity ceiling is reached.
    pub fn at_full_capacity(&self) -> bool {
        self.shared.lock().at_full_capacity()
    }

    /// Every attached worker, across all groups and lifecycle lists.
    pub fn get_processes(&self) -> Vec<WorkerInfo> {
        self.shared.lock().all_workers()
    }

    /// Total number of attached workers, excluding spawns in flight.
    pub fn get_process_count(&self) -> u32 {
        self.shared.lock().groups.iter().map(Group::process_count).sum()
    }

    /// Number of application groups.
    pub fn get_group_count(&self) -> usize {
        self.shared.lock().groups.len()
    }

    /// Length of the global wait list.
    pub fn get_wait_list_size(&self) -> usize {
        self.shared.lock().get_waitlist.len()
    }

    /// Look a group up by its secret.
    pub fn find_group_by_secret(&self, secret: &str) -> Option<GroupDescriptor> {
        let st = self.shared.lock();
        let found = st.groups
            .iter()
            .find(|g| g.secret() == secret)
            .map(|g| GroupDescriptor {
                name: g.name().to_string(),
                secret: g.secret().to_string(),
            });
        found
    }

    /// Look a worker up by gupid.
    pub fn find_process_by_gupid(&self, gupid: &str) -> Option<WorkerInfo> {
        let st = self.shared.lock();
        let found = st.groups
            .iter()
            .flat_map(Group::processes)
            .find(|p| p.info.gupid == gupid)
            .map(|p| p.info.clone());
        found
    }

    /// Look a worker up by OS pid.
    pub fn find_process_by_pid(&self, pid: u32) -> Option<WorkerInfo> {
        let st = self.shared.lock();
        let found = st.groups
            .iter()
            .flat_map(Group::processes)
            .find(|p| p.info.pid == pid)
            .map(|p| p.info.clone());
        found
    }

    /// Whether at least one worker is being spawned.
    pub fn is_spawning(&self) -> bool {
        self.shared.lock().groups.iter().any(Group::spawning)
    }

    /// Snapshot of the monotonic pool counters.
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.metrics.snapshot()
    }

    /// Serializable snapshot of the pool shape for diagnostics.
    pub fn inspect(&self) -> PoolSnapshot {
        inspection::snapshot(&self.shared.lock())
    }

    /// Whether the pool lock is currently available to this thread.
    ///
    /// Lock-aware callback stubs use this to verify that callbacks are
    /// never invoked while the pool lock is held.
    pub fn self_check_unlocked(&self) -> bool {
        self.shared.state.try_lock().is_ok()
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.shared.lock();
        f.debug_struct("Pool")
            .field("life_status", &st.life_status)
            .field("max", &st.max)
            .field("capacity_used", &st.capacity_used())
            .field("group_count", &st.groups.len())
            .field("get_wait_list_size", &st.get_waitlist.len())
            .finish()
    }
}
