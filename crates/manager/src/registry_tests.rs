// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rosey_bus::MemoryBus;
use rosey_core::SystemClock;
use rosey_supervisor::{FakeProcessAdapter, FakeSampler};
use std::sync::Arc;

type TestRegistry = Registry<FakeProcessAdapter, FakeSampler, SystemClock>;

fn entry(id: &str, prefixes: &[&str]) -> RegistryEntry<FakeProcessAdapter, FakeSampler, SystemClock> {
    let metadata = PluginMetadata::new(id, "/usr/bin/rosey-plugin").with_command_prefixes(prefixes);
    let permissions = metadata.permissions.clone();
    let supervisor = PluginSupervisor::new(
        metadata,
        Arc::new(MemoryBus::new()),
        "nats://localhost:4222",
        FakeProcessAdapter::new(),
        FakeSampler::new(),
        SystemClock,
    );
    RegistryEntry {
        supervisor,
        permissions,
    }
}

#[test]
fn insert_and_get() {
    let registry = TestRegistry::new();
    registry.insert(entry("dice", &["roll"])).unwrap();

    assert!(registry.contains(&PluginId::new("dice")));
    assert_eq!(registry.len(), 1);
    let fetched = registry.get(&PluginId::new("dice")).unwrap();
    assert_eq!(fetched.metadata().id, "dice");
}

#[test]
fn duplicate_plugin_rejected() {
    let registry = TestRegistry::new();
    registry.insert(entry("dice", &["roll"])).unwrap();

    let err = registry.insert(entry("dice", &["other"])).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicatePlugin(_)));
    assert_eq!(registry.len(), 1);
}

#[test]
fn command_prefix_conflict_rejected() {
    let registry = TestRegistry::new();
    registry.insert(entry("dice", &["roll", "d20"])).unwrap();

    let err = registry.insert(entry("gamble", &["bet", "roll"])).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::CommandPrefixConflict { ref prefix, ref existing }
            if prefix == "roll" && *existing == PluginId::new("dice")
    ));

    // the failed insert claimed nothing
    assert!(!registry.contains(&PluginId::new("gamble")));
    assert_eq!(registry.for_command("bet"), None);
}

#[test]
fn for_command_resolves_owner() {
    let registry = TestRegistry::new();
    registry.insert(entry("dice", &["roll"])).unwrap();
    registry.insert(entry("trivia", &["trivia", "answer"])).unwrap();

    assert_eq!(registry.for_command("roll"), Some(PluginId::new("dice")));
    assert_eq!(registry.for_command("answer"), Some(PluginId::new("trivia")));
    assert_eq!(registry.for_command("quote"), None);
}

#[test]
fn remove_releases_prefixes() {
    let registry = TestRegistry::new();
    registry.insert(entry("dice", &["roll"])).unwrap();
    registry.remove(&PluginId::new("dice")).unwrap();

    assert!(registry.is_empty());
    assert_eq!(registry.for_command("roll"), None);

    // the prefix can be claimed again
    registry.insert(entry("other", &["roll"])).unwrap();
    assert_eq!(registry.for_command("roll"), Some(PluginId::new("other")));
}

#[test]
fn remove_unknown_errors() {
    let registry = TestRegistry::new();
    let err = registry.remove(&PluginId::new("ghost")).unwrap_err();
    assert!(matches!(err, RegistryError::PluginUnknown(_)));
}

#[test]
fn ids_are_sorted() {
    let registry = TestRegistry::new();
    registry.insert(entry("trivia", &[])).unwrap();
    registry.insert(entry("dice", &[])).unwrap();
    registry.insert(entry("quotes", &[])).unwrap();

    assert_eq!(
        registry.ids(),
        vec![
            PluginId::new("dice"),
            PluginId::new("quotes"),
            PluginId::new("trivia")
        ]
    );
}
