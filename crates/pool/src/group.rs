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

//! Per-application-group state machine.
//!
//! ## Purpose
//! A group owns the workers serving one named application: the enabled,
//! disabling and disabled lists, the group's own wait list, and the spawn /
//! restart transitional state. The pool drives it exclusively from under
//! the pool lock; a group never takes that lock itself and never invokes a
//! callback directly. Everything with side effects goes through the
//! [`DeferredActions`] queue the pool threads through every call.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;
use ulid::Ulid;

use plexpool_core::{
    DisableResult, GetCallback, GetError, Options, RestartMethod, Session, SpawnError,
};

use crate::deferred::DeferredActions;
use crate::pool::SessionCloserFactory;
use crate::process::Process;

/// A parked session request: a persisted copy of the request options plus
/// the callback to complete it with.
pub(crate) struct GetWaiter {
    pub options: Options,
    pub callback: GetCallback,
}

/// Callback completing a deferred disable.
pub(crate) type DisableCallback = Box<dyn FnOnce(DisableResult) + Send + 'static>;

/// How a `Group::get` call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GetHandled {
    /// The callback was scheduled on the deferred queue with a session.
    Dispatched,
    /// The callback was parked on the group's wait list; the caller should
    /// consider spawning.
    Queued,
}

/// Record of a detached group whose in-flight spawns have not landed yet.
/// The shutdown ticket fires once the last spawn completes.
pub(crate) struct DrainingGroup {
    pub name: String,
    pub secret: String,
    pub spawns_left: u32,
    pub on_done: Option<Box<dyn FnOnce() + Send>>,
}

pub(crate) struct Group {
    name: String,
    secret: String,
    pub options: Options,
    generation: u64,
    enabled: Vec<Process>,
    disabling: Vec<Process>,
    disabled: Vec<Process>,
    get_waitlist: VecDeque<GetWaiter>,
    spawns_in_flight: u32,
    waiting_for_capacity: bool,
    /// Set after a spawn failure so the group does not retry in a loop;
    /// cleared by fresh demand, a restart, or a successful attach.
    spawn_blocked: bool,
    restarting: bool,
    disable_waiters: Vec<(String, DisableCallback)>,
}

impl Group {
    pub fn new(options: &Options) -> Self {
        Self {
            name: options.app_group_name.clone(),
            secret: Ulid::new().to_string(),
            options: options.persist(),
            generation: 0,
            enabled: Vec::new(),
            disabling: Vec::new(),
            disabled: Vec::new(),
            get_waitlist: VecDeque::new(),
            spawns_in_flight: 0,
            waiting_for_capacity: false,
            spawn_blocked: false,
            restarting: false,
            disable_waiters: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    // ------------------------------------------------------------------
    // Session acquisition
    // ------------------------------------------------------------------

    /// Serve a session request. Either schedules the callback with a
    /// session on `deferred`, or parks the request on the group's wait
    /// list.
    pub fn get(
        &mut self,
        options: &Options,
        callback: GetCallback,
        deferred: &mut DeferredActions,
        closers: &SessionCloserFactory,
    ) -> GetHandled {
        if options.noop {
            let session = Session::noop(&self.name);
            deferred.push(move || callback(Ok(session)));
            return GetHandled::Dispatched;
        }

        if let Some(session) = self.checkout_idle_worker(closers) {
            deferred.push(move || callback(Ok(session)));
            GetHandled::Dispatched
        } else {
            self.get_waitlist.push_back(GetWaiter {
                options: options.persist(),
                callback,
            });
            // Fresh demand re-arms spawning after an earlier failure.
            self.spawn_blocked = false;
            GetHandled::Queued
        }
    }

    /// Check out the most recently used idle enabled worker of the current
    /// generation, leaving longer-idle workers to age out.
    fn checkout_idle_worker(&mut self, closers: &SessionCloserFactory) -> Option<Session> {
        let generation = self.generation;
        let candidate = self
            .enabled
            .iter_mut()
            .filter(|p| p.is_idle() && p.generation == generation)
            .max_by_key(|p| p.last_idle_at)?;

        candidate.sessions += 1;
        let on_close = closers.make(&candidate.info);
        Some(Session::new(candidate.info.clone(), on_close))
    }

    fn idle_worker_count(&self) -> usize {
        let generation = self.generation;
        self.enabled
            .iter()
            .filter(|p| p.is_idle() && p.generation == generation)
            .count()
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    /// Whether the group could use another worker: it is below its
    /// configured minimum, or requests are parked with nothing idle to
    /// serve them. Spawns are serialized per group. Only workers of the
    /// current generation count, so a restarting group asks for its
    /// replacements while the old generation drains.
    pub fn should_spawn(&self) -> bool {
        if self.spawns_in_flight > 0 || self.spawn_blocked {
            return false;
        }
        let generation = self.generation;
        let current = self
            .enabled
            .iter()
            .filter(|p| p.generation == generation)
            .count() as u32;
        let below_min = current < self.options.min_processes;
        let starved = !self.get_waitlist.is_empty() && self.idle_worker_count() == 0;
        below_min || starved
    }

    pub fn spawning(&self) -> bool {
        self.spawns_in_flight > 0
    }

    pub fn is_waiting_for_capacity(&self) -> bool {
        self.waiting_for_capacity
    }

    pub fn set_waiting_for_capacity(&mut self, waiting: bool) {
        self.waiting_for_capacity = waiting;
    }

    /// Account one spawn against the group. The pool launches the actual
    /// factory call after the lock is released.
    pub fn begin_spawn(&mut self) {
        self.spawns_in_flight += 1;
        self.waiting_for_capacity = false;
    }

    /// Attach a freshly spawned worker and hand it to the oldest waiter,
    /// if any. Returns the new worker's gupid.
    pub fn attach_spawned(
        &mut self,
        pid: u32,
        deferred: &mut DeferredActions,
        closers: &SessionCloserFactory,
    ) -> String {
        self.spawns_in_flight = self.spawns_in_flight.saturating_sub(1);
        self.spawn_blocked = false;
        // The first worker of the new generation completes a restart.
        self.restarting = false;

        let process = Process::new(pid, Ulid::new().to_string(), self.name.clone(), self.generation);
        let gupid = process.info.gupid.clone();
        debug!(group = %self.name, pid, gupid = %gupid, "worker attached");
        self.enabled.push(process);

        self.assign_waiters(deferred, closers);
        gupid
    }

    /// Account a failed spawn. Waiters are only failed when no worker can
    /// ever serve them; otherwise they stay parked for the next release.
    pub fn spawn_failed(&mut self, error: &SpawnError, deferred: &mut DeferredActions) {
        self.spawns_in_flight = self.spawns_in_flight.saturating_sub(1);
        self.waiting_for_capacity = false;
        self.spawn_blocked = true;
        if self.enabled.is_empty() && self.spawns_in_flight == 0 {
            let error = GetError::SpawnFailed(error.to_string());
            self.drain_waitlist(error, deferred);
        }
    }

    /// Match parked requests against idle workers.
    fn assign_waiters(&mut self, deferred: &mut DeferredActions, closers: &SessionCloserFactory) {
        while !self.get_waitlist.is_empty() {
            let Some(session) = self.checkout_idle_worker(closers) else {
                break;
            };
            let waiter = self.get_waitlist.pop_front().expect("waitlist checked non-empty");
            let callback = waiter.callback;
            deferred.push(move || callback(Ok(session)));
        }
    }

    // ------------------------------------------------------------------
    // Worker lifecycle
    // ------------------------------------------------------------------

    /// Remove a worker from whichever list holds it. Pending disables for
    /// the worker fail. Sessions still held against the worker become
    /// dangling and are ignored on release.
    pub fn detach(&mut self, gupid: &str, deferred: &mut DeferredActions) -> bool {
        let found = remove_process(&mut self.enabled, gupid)
            .or_else(|| remove_process(&mut self.disabling, gupid))
            .or_else(|| remove_process(&mut self.disabled, gupid));
        match found {
            Some(process) => {
                debug!(group = %self.name, gupid = %process.info.gupid, "worker detached");
                self.fail_disable_waiters(gupid, deferred);
                true
            }
            None => false,
        }
    }

    /// Disable a worker so it no longer serves sessions.
    pub fn disable(
        &mut self,
        gupid: &str,
        callback: DisableCallback,
        _deferred: &mut DeferredActions,
    ) -> DisableResult {
        if self.disabled.iter().any(|p| p.info.gupid == gupid) {
            return DisableResult::AlreadyDisabled;
        }
        if self.disabling.iter().any(|p| p.info.gupid == gupid) {
            self.disable_waiters.push((gupid.to_string(), callback));
            return DisableResult::Deferred;
        }
        let Some(index) = self.enabled.iter().position(|p| p.info.gupid == gupid) else {
            return DisableResult::Noop;
        };
        if self.restarting {
            return DisableResult::Error;
        }

        let process = self.enabled.remove(index);
        if process.is_idle() {
            self.disabled.push(process);
            DisableResult::Success
        } else {
            self.disabling.push(process);
            self.disable_waiters.push((gupid.to_string(), callback));
            DisableResult::Deferred
        }
    }

    /// Note that a session against `gupid` was released.
    ///
    /// May complete pending disables, retire old-generation workers, and
    /// hand the freed worker to the oldest parked request.
    pub fn on_session_released(
        &mut self,
        gupid: &str,
        deferred: &mut DeferredActions,
        closers: &SessionCloserFactory,
    ) {
        let now = Instant::now();

        if let Some(index) = self.enabled.iter().position(|p| p.info.gupid == gupid) {
            let process = &mut self.enabled[index];
            process.sessions = process.sessions.saturating_sub(1);
            process.last_idle_at = now;
            if process.is_idle() && process.generation < self.generation {
                // Old generation: retire instead of reusing.
                let process = self.enabled.remove(index);
                debug!(group = %self.name, gupid = %process.info.gupid, "retired old-generation worker");
            } else {
                self.assign_waiters(deferred, closers);
            }
            return;
        }

        if let Some(index) = self.disabling.iter().position(|p| p.info.gupid == gupid) {
            let process = &mut self.disabling[index];
            process.sessions = process.sessions.saturating_sub(1);
            process.last_idle_at = now;
            if process.is_idle() {
                let process = self.disabling.remove(index);
                self.disabled.push(process);
                self.complete_disable_waiters(gupid, deferred);
            }
        }
        // A dangling release for a worker that was detached meanwhile is
        // silently ignored.
    }

    fn complete_disable_waiters(&mut self, gupid: &str, deferred: &mut DeferredActions) {
        for (_, callback) in extract_disable_waiters(&mut self.disable_waiters, gupid) {
            deferred.push(move || callback(DisableResult::Success));
        }
    }

    fn fail_disable_waiters(&mut self, gupid: &str, deferred: &mut DeferredActions) {
        for (_, callback) in extract_disable_waiters(&mut self.disable_waiters, gupid) {
            deferred.push(move || callback(DisableResult::Error));
        }
    }

    // ------------------------------------------------------------------
    // Restart and shutdown
    // ------------------------------------------------------------------

    pub fn restarting(&self) -> bool {
        self.restarting
    }

    /// Begin replacing the group's workers with a fresh generation.
    pub fn restart(&mut self, method: RestartMethod, deferred: &mut DeferredActions) {
        self.generation += 1;
        self.restarting = true;
        self.spawn_blocked = false;
        debug!(group = %self.name, ?method, generation = self.generation, "group restarting");

        match method {
            RestartMethod::Blocking => {
                // Everything goes now, busy or not.
                let gupids: Vec<String> = self
                    .enabled
                    .iter()
                    .chain(self.disabling.iter())
                    .map(|p| p.info.gupid.clone())
                    .collect();
                for gupid in gupids {
                    self.detach(&gupid, deferred);
                }
            }
            RestartMethod::Default | RestartMethod::Rolling => {
                // Idle workers go now; busy ones are retired on release.
                let idle: Vec<String> = self
                    .enabled
                    .iter()
                    .filter(|p| p.is_idle())
                    .map(|p| p.info.gupid.clone())
                    .collect();
                for gupid in idle {
                    self.detach(&gupid, deferred);
                }
            }
        }

        // With no replacements to wait for, the restart is already over;
        // lingering old-generation workers retire on release.
        if self.options.min_processes == 0 && self.get_waitlist.is_empty() {
            self.restarting = false;
        }
    }

    /// Tear the group down. The caller must have drained the group's wait
    /// list first. Returns a draining record when spawns are still in
    /// flight; `on_done` then fires once the last of them lands.
    pub fn shutdown(
        mut self,
        on_done: Box<dyn FnOnce() + Send>,
        deferred: &mut DeferredActions,
    ) -> Option<DrainingGroup> {
        debug_assert!(
            self.get_waitlist.is_empty(),
            "group wait list must be drained before shutdown"
        );

        let gupids: Vec<String> = self.processes().map(|p| p.info.gupid.clone()).collect();
        for gupid in gupids {
            self.detach(&gupid, deferred);
        }

        if self.spawns_in_flight == 0 {
            deferred.push(on_done);
            None
        } else {
            Some(DrainingGroup {
                name: self.name,
                secret: self.secret,
                spawns_left: self.spawns_in_flight,
                on_done: Some(on_done),
            })
        }
    }

    /// Fail every parked request with `error`.
    pub fn drain_waitlist(&mut self, error: GetError, deferred: &mut DeferredActions) {
        while let Some(waiter) = self.get_waitlist.pop_front() {
            let callback = waiter.callback;
            let error = error.clone();
            deferred.push(move || callback(Err(error)));
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Workers plus spawns in flight; the group's share of the pool's
    /// capacity ceiling.
    pub fn capacity_used(&self) -> u32 {
        (self.enabled.len() + self.disabling.len() + self.disabled.len()) as u32
            + self.spawns_in_flight
    }

    /// Attached workers, excluding spawns in flight.
    pub fn process_count(&self) -> u32 {
        (self.enabled.len() + self.disabling.len() + self.disabled.len()) as u32
    }

    pub fn get_waitlist_len(&self) -> usize {
        self.get_waitlist.len()
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.enabled
            .iter()
            .chain(self.disabling.iter())
            .chain(self.disabled.iter())
    }

    pub fn find_process(&self, gupid: &str) -> Option<&Process> {
        self.processes().find(|p| p.info.gupid == gupid)
    }

    pub fn enabled(&self) -> &[Process] {
        &self.enabled
    }

    pub fn disabling(&self) -> &[Process] {
        &self.disabling
    }

    pub fn disabled(&self) -> &[Process] {
        &self.disabled
    }

    /// The enabled worker that has been idle the longest, if any.
    pub fn oldest_idle_worker(&self, now: Instant) -> Option<(Duration, String)> {
        self.enabled
            .iter()
            .filter_map(|p| p.idle_for(now).map(|idle| (idle, p.info.gupid.clone())))
            .max_by_key(|(idle, _)| *idle)
    }

    /// Enabled workers idle past `max_idle_time` that can go without
    /// dropping the group below its configured minimum.
    pub fn collect_idle(&self, now: Instant, max_idle_time: Duration) -> Vec<String> {
        let reapable = self
            .enabled
            .len()
            .saturating_sub(self.options.min_processes as usize);
        let mut expired: Vec<(Duration, String)> = self
            .enabled
            .iter()
            .filter_map(|p| p.idle_for(now).map(|idle| (idle, p.info.gupid.clone())))
            .filter(|(idle, _)| *idle >= max_idle_time)
            .collect();
        // Longest idle first.
        expired.sort_by(|a, b| b.0.cmp(&a.0));
        expired
            .into_iter()
            .take(reapable)
            .map(|(_, gupid)| gupid)
            .collect()
    }

    /// Whether the garbage collector may remove the whole group.
    pub fn garbage_collectable(&self) -> bool {
        self.process_count() == 0
            && self.spawns_in_flight == 0
            && self.get_waitlist.is_empty()
            && !self.restarting
            && self.options.min_processes == 0
    }
}

fn remove_process(list: &mut Vec<Process>, gupid: &str) -> Option<Process> {
    list.iter()
        .position(|p| p.info.gupid == gupid)
        .map(|index| list.remove(index))
}

fn extract_disable_waiters(
    waiters: &mut Vec<(String, DisableCallback)>,
    gupid: &str,
) -> Vec<(String, DisableCallback)> {
    let mut matched = Vec::new();
    let mut index = 0;
    while index < waiters.len() {
        if waiters[index].0 == gupid {
            matched.push(waiters.remove(index));
        } else {
            index += 1;
        }
    }
    matched
}
