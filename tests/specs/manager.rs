// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin-manager lifecycle scenarios.

use crate::prelude::{spawn_ready_responder, test_metadata};
use rosey_bus::{Bus, MemoryBus};
use rosey_core::{PluginId, PluginState, RestartConfig, SystemClock};
use rosey_router::{CommandResolver, CommandRouter};
use rosey_supervisor::{FakeProcessAdapter, FakeSampler};
use std::sync::Arc;

type Manager = rosey_manager::PluginManager<FakeProcessAdapter, FakeSampler, SystemClock>;

fn setup() -> (Arc<Manager>, MemoryBus, FakeProcessAdapter) {
    let bus = MemoryBus::new();
    let adapter = FakeProcessAdapter::new();
    let manager = Arc::new(rosey_manager::PluginManager::new(
        Arc::new(bus.clone()),
        "nats://localhost:4222",
        adapter.clone(),
        FakeSampler::new(),
        SystemClock,
    ));
    (manager, bus, adapter)
}

struct ManagerIndex(Arc<Manager>);

impl CommandResolver for ManagerIndex {
    fn resolve(&self, prefix: &str) -> Option<PluginId> {
        self.0.for_command(prefix)
    }
}

#[tokio::test]
async fn full_lifecycle_load_start_stop_unload() {
    let (manager, bus, adapter) = setup();
    spawn_ready_responder(&bus, &adapter, "dice");
    let id = PluginId::new("dice");

    let mut metadata = test_metadata("dice", RestartConfig::default());
    metadata.command_prefixes = vec!["roll".to_string()];
    manager.load(metadata).await.unwrap();
    assert_eq!(manager.get(&id).unwrap().state, PluginState::Loaded);

    manager.start(&id).await.unwrap();
    let status = manager.get(&id).unwrap();
    assert_eq!(status.state, PluginState::Running);
    assert!(status.pid.is_some());

    manager.stop(&id).await.unwrap();
    manager.unload(&id).await.unwrap();
    assert!(manager.list().is_empty());
    assert_eq!(manager.for_command("roll"), None);
}

#[tokio::test]
async fn command_index_feeds_the_router() {
    let (manager, bus, adapter) = setup();
    spawn_ready_responder(&bus, &adapter, "dice");

    let mut metadata = test_metadata("dice", RestartConfig::default());
    metadata.command_prefixes = vec!["roll".to_string()];
    manager.load(metadata).await.unwrap();
    manager.start(&PluginId::new("dice")).await.unwrap();

    let router = CommandRouter::new(Arc::new(bus.clone()))
        .with_resolver(Arc::new(ManagerIndex(Arc::clone(&manager))));
    router.bind().await.unwrap();

    let envelope = rosey_core::Envelope::new(
        "rosey.platform.cytube.message",
        "message",
        "cytube",
    )
    .with_data("message", serde_json::json!("!roll 2d6"))
    .with_data("user", serde_json::json!("alice"));
    bus.publish(envelope).await.unwrap();
    bus.flush().await.unwrap();

    assert_eq!(bus.published_matching("rosey.commands.dice.execute").len(), 1);
}
