// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the spec suite.

use rosey_bus::{Bus, MemoryBus};
use rosey_core::{Envelope, PluginId, PluginMetadata, PluginState, RestartConfig, Subject};
use rosey_supervisor::FakeProcessAdapter;
use std::time::Duration;

/// Plugin metadata tuned for fast tests.
pub fn test_metadata(id: &str, restart: RestartConfig) -> PluginMetadata {
    PluginMetadata::new(id, "/opt/rosey/plugins/test")
        .with_readiness_timeout(Duration::from_millis(200))
        .with_graceful_timeout(Duration::from_millis(50))
        .with_restart(restart)
}

/// Simulate well-behaved plugin processes: publish `ready` for every spawn.
pub fn spawn_ready_responder(bus: &MemoryBus, adapter: &FakeProcessAdapter, id: &str) {
    let bus = bus.clone();
    let adapter = adapter.clone();
    let id = PluginId::new(id);
    tokio::spawn(async move {
        let mut acked = 0;
        loop {
            let spawned = adapter.spawn_count();
            if spawned > acked {
                acked = spawned;
                let envelope =
                    Envelope::new(Subject::plugin(&id, "ready"), "plugin.ready", id.as_str());
                let _ = bus.publish(envelope).await;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });
}

/// Poll until `check` passes or a 3 s deadline expires.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Poll a state reader until it reports `expected`.
pub async fn wait_for_state(what: &str, expected: PluginState, state: impl Fn() -> PluginState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if state() == expected {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "timed out waiting for {what} to reach {expected}, still {}",
                state()
            );
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
