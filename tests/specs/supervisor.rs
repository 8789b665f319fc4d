// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor lifecycle scenarios.

use crate::prelude::{spawn_ready_responder, test_metadata, wait_for_state, wait_until};
use rosey_bus::MemoryBus;
use rosey_core::{PluginState, RestartConfig, RestartPolicy, SystemClock};
use rosey_supervisor::{
    FakeProcessAdapter, FakeSampler, PluginSupervisor, SupervisorError,
};
use std::sync::Arc;
use std::time::Duration;

type TestSupervisor = PluginSupervisor<FakeProcessAdapter, FakeSampler, SystemClock>;

fn supervisor(
    id: &str,
    restart: RestartConfig,
) -> (TestSupervisor, MemoryBus, FakeProcessAdapter) {
    let bus = MemoryBus::new();
    let adapter = FakeProcessAdapter::new();
    let supervisor = PluginSupervisor::new(
        test_metadata(id, restart),
        Arc::new(bus.clone()),
        "nats://localhost:4222",
        adapter.clone(),
        FakeSampler::new(),
        SystemClock,
    );
    (supervisor, bus, adapter)
}

fn flaky_restart() -> RestartConfig {
    RestartConfig {
        policy: RestartPolicy::Always,
        max_restarts: 3,
        window: Duration::from_secs(10),
        initial_backoff: Duration::from_millis(5),
        backoff_multiplier: 1.0,
        max_backoff: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn silent_plugin_fails_at_readiness_timeout() {
    let (supervisor, bus, adapter) = supervisor("mute", RestartConfig::default());
    // no ready responder: the child starts but never reports ready

    supervisor.mark_loaded().await.unwrap();
    let before = std::time::Instant::now();
    let err = supervisor.start().await.unwrap_err();
    let elapsed = before.elapsed();

    assert!(matches!(err, SupervisorError::ReadinessTimeout { .. }));
    assert_eq!(supervisor.state(), PluginState::Failed);
    // the transition happened at ~readiness_timeout (200ms), not early
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2));
    // the child was terminated
    assert_eq!(adapter.kill_count(), 1);

    use rosey_bus::Bus;
    bus.flush().await.unwrap();
    assert_eq!(bus.published_matching("rosey.plugins.mute.error").len(), 1);
}

#[tokio::test]
async fn circuit_breaker_opens_on_fourth_crash_within_window() {
    let (supervisor, bus, adapter) = supervisor("flaky", flaky_restart());
    spawn_ready_responder(&bus, &adapter, "flaky");

    supervisor.mark_loaded().await.unwrap();
    supervisor.start().await.unwrap();

    for round in 1..=4u32 {
        wait_until("respawn", || {
            adapter.spawn_count() == round as usize
                && supervisor.state() == PluginState::Running
        })
        .await;
        let pid = *adapter.spawned_pids().last().unwrap();
        adapter.exit(pid, 1);
        wait_until("crash handled", || {
            supervisor.state() != PluginState::Running
                || adapter.spawn_count() > round as usize
        })
        .await;
    }

    wait_for_state("flaky", PluginState::Failed, || supervisor.state()).await;
    // initial start plus exactly max_restarts restarts
    assert_eq!(adapter.spawn_count(), 4);

    use rosey_bus::Bus;
    bus.flush().await.unwrap();
    assert_eq!(
        bus.published_matching("rosey.plugins.flaky.circuit_open").len(),
        1
    );
    assert_eq!(bus.published_matching("rosey.plugins.flaky.crashed").len(), 4);
}

#[tokio::test]
async fn at_most_one_live_supervisor_per_plugin() {
    let (supervisor, bus, adapter) = supervisor("dice", RestartConfig::default());
    spawn_ready_responder(&bus, &adapter, "dice");

    supervisor.mark_loaded().await.unwrap();
    supervisor.start().await.unwrap();
    assert!(supervisor.state().is_live());
    assert!(supervisor.pid().is_some());

    // a second start on the same supervisor is rejected outright
    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidTransition { .. }));
    assert_eq!(adapter.spawn_count(), 1);

    supervisor.stop().await.unwrap();
    assert!(!supervisor.state().is_live());
    assert_eq!(supervisor.pid(), None);
}

#[tokio::test]
async fn restart_count_stays_within_max_until_failed() {
    let (supervisor, bus, adapter) = supervisor("flaky", flaky_restart());
    spawn_ready_responder(&bus, &adapter, "flaky");

    supervisor.mark_loaded().await.unwrap();
    supervisor.start().await.unwrap();

    for round in 1..=3u32 {
        wait_until("respawn", || {
            adapter.spawn_count() == round as usize
                && supervisor.state() == PluginState::Running
        })
        .await;
        assert!(supervisor.restart_count() <= 3);
        let pid = *adapter.spawned_pids().last().unwrap();
        adapter.exit(pid, 1);
        wait_until("crash handled", || {
            supervisor.state() != PluginState::Running
                || adapter.spawn_count() > round as usize
        })
        .await;
    }

    wait_until("final respawn", || adapter.spawn_count() == 4).await;
    assert!(supervisor.restart_count() <= 3);
}
