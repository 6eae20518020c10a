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

//! End-to-end scenarios for the pool orchestrator, driven through a
//! scriptable stub spawning factory.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use plexpool_core::{
    ConnectionAborter, DisableResult, GetCallback, GetError, Options, PoolConfig, RestartMethod,
    Session, SpawnError, SpawnedWorker, SpawningFactory, WorkerInfo,
};
use plexpool_pool::{LifeStatus, Pool};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Stub factory: hands out sequential pids, optionally failing on demand.
struct StubFactory {
    next_pid: AtomicU32,
    fail_with: Mutex<Option<String>>,
}

impl StubFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(1000),
            fail_with: Mutex::new(None),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        let factory = Self::new();
        factory.set_failure(Some(message.to_string()));
        factory
    }

    fn set_failure(&self, message: Option<String>) {
        *self.fail_with.lock().unwrap() = message;
    }
}

#[async_trait]
impl SpawningFactory for StubFactory {
    async fn spawn_worker(&self, _options: &Options) -> Result<SpawnedWorker, SpawnError> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(SpawnError::Failed(message));
        }
        Ok(SpawnedWorker {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
        })
    }
}

fn pool_with(factory: Arc<dyn SpawningFactory>, max: u32) -> Pool {
    let pool = Pool::new(
        factory,
        PoolConfig {
            max,
            ..PoolConfig::default()
        },
    );
    pool.initialize();
    pool
}

fn opts(name: &str) -> Options {
    Options::for_app_group(name)
}

/// Callback that forwards its result into a channel.
fn capture() -> (GetCallback, mpsc::UnboundedReceiver<Result<Session, GetError>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
        rx,
    )
}

/// Poll `cond` until it holds or a generous deadline passes.
async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

// ----------------------------------------------------------------------
// End-to-end scenarios
// ----------------------------------------------------------------------

#[tokio::test]
async fn happy_get_creates_group_and_spawns() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 2);

    let session = pool.get(&opts("a")).await.expect("get should succeed");
    assert!(!session.is_noop());
    assert_eq!(session.app_group_name(), "a");
    assert!(session.worker().is_some());

    assert_eq!(pool.get_group_count(), 1);
    assert_eq!(pool.get_wait_list_size(), 0);
    assert_eq!(pool.get_process_count(), 1);
    assert_eq!(pool.capacity_used(), 1);

    drop(session);
    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn over_capacity_request_is_parked() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 1);

    // One busy worker in "a" fills the pool.
    let session_a = pool.get(&opts("a")).await?;
    assert!(pool.at_full_capacity());

    let (callback, mut rx) = capture();
    pool.async_get(&opts("b"), callback);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "parked callback must not fire yet");
    assert_eq!(pool.get_wait_list_size(), 1);
    assert!(pool.at_full_capacity());
    // The waiter's group must not exist while it is parked.
    assert_eq!(pool.get_group_count(), 1);

    drop(session_a);
    pool.destroy().await;

    // Destroy aborts the parked request.
    let aborted = rx.recv().await.expect("waiter must be completed");
    assert!(matches!(aborted, Err(GetError::Aborted(_))));
    Ok(())
}

#[tokio::test]
async fn capacity_release_unparks_waiter() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 1);

    let session_a = pool.get(&opts("a")).await?;
    let worker_a = session_a.worker().unwrap().clone();

    let (callback, mut rx) = capture();
    pool.async_get(&opts("b"), callback);
    assert_eq!(pool.get_wait_list_size(), 1);

    // Detaching the busy "a" worker frees capacity for "b".
    assert!(pool.detach_process(&worker_a));

    let result = rx.recv().await.expect("waiter must be completed");
    let session_b = result.expect("waiter should get a session");
    assert_eq!(session_b.app_group_name(), "b");
    assert_eq!(pool.get_wait_list_size(), 0);
    assert_eq!(pool.capacity_used(), 1);

    drop(session_a);
    drop(session_b);
    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn group_detach_aborts_its_waiters() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 1);

    // "a" has one busy worker; two more requests park on the group's own
    // wait list because the pool is full.
    let session = pool.get(&opts("a")).await?;
    let (cb1, mut rx1) = capture();
    let (cb2, mut rx2) = capture();
    pool.async_get(&opts("a"), cb1);
    pool.async_get(&opts("a"), cb2);

    let snapshot = pool.inspect();
    assert_eq!(snapshot.groups[0].get_wait_list_size, 2);

    assert!(pool.detach_group_by_name("a").await);
    assert_eq!(pool.get_group_count(), 0);

    for rx in [&mut rx1, &mut rx2] {
        let result = rx.recv().await.expect("waiter must be completed");
        match result {
            Err(GetError::Aborted(message)) => {
                assert_eq!(message, "The containing Group was detached.");
            }
            other => panic!("expected group-detached abort, got {other:?}"),
        }
    }

    drop(session);
    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn set_max_drains_pool_wait_list() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 1);

    let session_a = pool.get(&opts("a")).await?;
    let (cb1, mut rx1) = capture();
    let (cb2, mut rx2) = capture();
    pool.async_get(&opts("b"), cb1);
    pool.async_get(&opts("b"), cb2);
    assert_eq!(pool.get_wait_list_size(), 2);

    pool.set_max(3);

    // The global wait list empties synchronously: the first waiter created
    // group "b", the second moved onto its wait list.
    assert_eq!(pool.get_wait_list_size(), 0);
    assert!(!pool.at_full_capacity());

    let s1 = rx1.recv().await.unwrap().expect("first waiter gets a session");
    let s2 = rx2.recv().await.unwrap().expect("second waiter gets a session");
    assert_eq!(s1.app_group_name(), "b");
    assert_eq!(s2.app_group_name(), "b");

    drop(session_a);
    drop(s1);
    drop(s2);
    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn disable_busy_worker_is_deferred() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 4);

    let mut options = opts("a");
    options.min_processes = 2;
    let session = pool.get(&options).await?;
    let busy_gupid = session.worker().unwrap().gupid.clone();
    wait_until("group tops up to two workers", || pool.get_process_count() == 2).await;

    let disabling = {
        let pool = pool.clone();
        let gupid = busy_gupid.clone();
        tokio::spawn(async move { pool.disable_process(&gupid).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!disabling.is_finished(), "disable must block while the worker is busy");

    drop(session);
    let result = disabling.await?;
    assert_eq!(result, DisableResult::Success);

    let snapshot = pool.inspect();
    let group = &snapshot.groups[0];
    assert!(group.disabled.iter().any(|p| p.gupid == busy_gupid));
    assert!(group.enabled.iter().all(|p| p.gupid != busy_gupid));

    // Disabling again reports the worker already disabled and changes
    // nothing.
    assert_eq!(
        pool.disable_process(&busy_gupid).await,
        DisableResult::AlreadyDisabled
    );
    assert_eq!(pool.disable_process("no-such-gupid").await, DisableResult::Noop);

    pool.destroy().await;
    Ok(())
}

// ----------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------

#[tokio::test]
async fn spawn_failure_frees_capacity_and_surfaces_to_the_waiter() -> Result<()> {
    init_tracing();
    let factory = StubFactory::failing("bundle install failed");
    let pool = pool_with(factory.clone(), 2);

    let result = pool.get(&opts("a")).await;
    match result {
        Err(GetError::SpawnFailed(message)) => assert!(message.contains("bundle install failed")),
        other => panic!("expected spawn failure, got {other:?}"),
    }
    assert_eq!(pool.capacity_used(), 0);
    assert!(pool.metrics().spawn_failures >= 1);

    // Once the factory recovers, the same group serves sessions again.
    factory.set_failure(None);
    let session = pool.get(&opts("a")).await?;
    assert_eq!(session.app_group_name(), "a");

    drop(session);
    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn detached_group_is_recreated_on_demand() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 2);

    let first = pool.get(&opts("a")).await?;
    let first_gupid = first.worker().unwrap().gupid.clone();
    drop(first);

    assert!(pool.detach_group_by_name("a").await);
    assert_eq!(pool.get_group_count(), 0);
    assert!(!pool.detach_group_by_name("a").await, "second detach finds nothing");

    let second = pool.get(&opts("a")).await?;
    assert_eq!(pool.get_group_count(), 1);
    assert_ne!(second.worker().unwrap().gupid, first_gupid);

    drop(second);
    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn set_max_is_idempotent() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 2);
    let session = pool.get(&opts("a")).await?;

    pool.set_max(4);
    let first = serde_json::to_value(pool.inspect())?;
    pool.set_max(4);
    let second = serde_json::to_value(pool.inspect())?;
    assert_eq!(first["max"], second["max"]);
    assert_eq!(first["capacity_used"], second["capacity_used"]);
    assert_eq!(first["get_wait_list_size"], second["get_wait_list_size"]);

    drop(session);
    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn callbacks_never_run_under_the_pool_lock() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 1);

    // Immediate-dispatch path: a warmed-up group with an idle worker.
    let warmup = pool.get(&opts("a")).await?;
    drop(warmup);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let probe = pool.clone();
    pool.async_get(
        &opts("a"),
        Box::new(move |result| {
            // A callback invoked under the lock would see it held.
            let _ = tx.send((probe.self_check_unlocked(), result.is_ok()));
        }),
    );
    let (unlocked, ok) = rx.recv().await.unwrap();
    assert!(unlocked, "callback observed the pool lock held");
    assert!(ok);

    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn life_status_advances_monotonically() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 2);
    assert_eq!(pool.life_status(), LifeStatus::Alive);

    let session = pool.get(&opts("a")).await?;
    drop(session);

    pool.prepare_for_shutdown();
    assert_eq!(pool.life_status(), LifeStatus::PreparedForShutdown);

    // Restarts are rejected as no-ops once shutdown was announced.
    assert!(!pool.restart_group_by_name("a", RestartMethod::Default));
    assert_eq!(pool.restart_groups_by_app_root("/var/www/a", RestartMethod::Default), 0);

    pool.destroy().await;
    assert_eq!(pool.life_status(), LifeStatus::ShutDown);
    Ok(())
}

#[tokio::test]
async fn prepare_for_shutdown_aborts_long_running_connections() -> Result<()> {
    init_tracing();

    #[derive(Default)]
    struct CountingAborter {
        aborted: Mutex<Vec<WorkerInfo>>,
    }
    impl ConnectionAborter for CountingAborter {
        fn abort_long_running_connections(&self, worker: &WorkerInfo) {
            self.aborted.lock().unwrap().push(worker.clone());
        }
    }

    let pool = pool_with(StubFactory::new(), 2);
    let aborter = Arc::new(CountingAborter::default());
    pool.set_connection_aborter(aborter.clone());

    let session = pool.get(&opts("a")).await?;
    let worker = session.worker().unwrap().clone();

    pool.prepare_for_shutdown();
    let aborted = aborter.aborted.lock().unwrap().clone();
    assert_eq!(aborted, vec![worker]);

    drop(session);
    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn garbage_collector_reaps_idle_workers_and_groups() -> Result<()> {
    init_tracing();
    let factory: Arc<dyn SpawningFactory> = StubFactory::new();
    let pool = Pool::new(
        factory,
        PoolConfig {
            max: 2,
            max_idle_time: Duration::from_millis(100),
            ..PoolConfig::default()
        },
    );
    pool.initialize();

    let mut options = opts("a");
    options.min_processes = 0;
    let session = pool.get(&options).await?;
    assert_eq!(pool.get_process_count(), 1);
    drop(session);

    wait_until("idle worker and empty group collected", || {
        pool.get_process_count() == 0 && pool.get_group_count() == 0
    })
    .await;
    assert!(pool.metrics().gc_runs >= 1);

    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn ensure_group_creates_without_consuming_capacity() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 2);

    let descriptor = pool.ensure_group(&opts("z"));
    assert_eq!(descriptor.name, "z");
    assert_eq!(pool.get_group_count(), 1);
    assert_eq!(pool.capacity_used(), 0);
    assert!(!pool.is_spawning());

    // Idempotent: same group, same secret.
    let again = pool.ensure_group(&opts("z"));
    assert_eq!(again, descriptor);

    assert_eq!(
        pool.find_group_by_secret(&descriptor.secret)
            .map(|d| d.name),
        Some("z".to_string())
    );

    // A noop get touches the group without occupying a worker.
    let mut noop_options = opts("z");
    noop_options.noop = true;
    let session = pool.get(&noop_options).await?;
    assert!(session.is_noop());
    assert_eq!(pool.capacity_used(), 0);

    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn detach_group_by_secret_resolves_the_name() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 2);

    let descriptor = pool.ensure_group(&opts("z"));
    assert!(pool.detach_group_by_secret(&descriptor.secret).await);
    assert_eq!(pool.get_group_count(), 0);
    assert!(!pool.detach_group_by_secret(&descriptor.secret).await);

    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn restart_replaces_workers_with_a_new_generation() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 4);

    let session = pool.get(&opts("a")).await?;
    let old_gupid = session.worker().unwrap().gupid.clone();
    drop(session);

    assert!(pool.restart_group_by_name("a", RestartMethod::Default));
    wait_until("replacement worker attached", || {
        pool.get_process_count() == 1 && pool.find_process_by_gupid(&old_gupid).is_none()
    })
    .await;

    let snapshot = pool.inspect();
    assert!(!snapshot.groups[0].restarting);

    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn process_lookups_cover_pid_and_gupid() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 2);

    let session = pool.get(&opts("a")).await?;
    let worker = session.worker().unwrap().clone();

    assert_eq!(pool.find_process_by_gupid(&worker.gupid), Some(worker.clone()));
    assert_eq!(pool.find_process_by_pid(worker.pid), Some(worker.clone()));
    assert_eq!(pool.get_processes(), vec![worker.clone()]);
    assert!(pool.find_process_by_gupid("missing").is_none());

    drop(session);
    assert!(pool.detach_process_by_pid(worker.pid));
    assert!(!pool.detach_process_by_pid(worker.pid));
    assert_eq!(pool.get_process_count(), 0);

    pool.destroy().await;
    Ok(())
}

#[tokio::test]
async fn inspection_snapshot_serializes() -> Result<()> {
    init_tracing();
    let pool = pool_with(StubFactory::new(), 2);
    let session = pool.get(&opts("a")).await?;

    let value = serde_json::to_value(pool.inspect())?;
    assert_eq!(value["life_status"], "Alive");
    assert_eq!(value["max"], 2);
    assert_eq!(value["capacity_used"], 1);
    assert_eq!(value["groups"][0]["name"], "a");
    assert_eq!(value["groups"][0]["enabled"][0]["sessions"], 1);

    drop(session);
    pool.destroy().await;
    Ok(())
}
