// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch scenarios.

use rosey_bus::{Bus, MemoryBus};
use rosey_core::{Envelope, PluginId};
use rosey_router::{CommandResolver, CommandRouter, MatchType, RouteRule};
use serde_json::json;
use std::sync::Arc;

struct DiceOnly;

impl CommandResolver for DiceOnly {
    fn resolve(&self, prefix: &str) -> Option<PluginId> {
        (prefix == "roll").then(|| PluginId::new("dice"))
    }
}

fn cytube_message(text: &str) -> Envelope {
    Envelope::new("rosey.platform.cytube.message", "message", "cytube")
        .with_data("message", json!(text))
        .with_data("channel", json!("lobby"))
        .with_data("user", json!("alice"))
}

#[tokio::test]
async fn dice_command_dispatches_to_dice_roll_and_nothing_else() {
    let bus = MemoryBus::new();
    let router = CommandRouter::new(Arc::new(bus.clone()))
        .with_resolver(Arc::new(DiceOnly));
    router
        .add_rule(
            RouteRule::new(
                "dice-roll",
                10,
                "roll",
                MatchType::Exact,
                "rosey.commands.dice.roll",
            )
            .unwrap(),
        )
        .unwrap();
    router.bind().await.unwrap();

    bus.publish(cytube_message("!roll 2d6")).await.unwrap();
    bus.flush().await.unwrap();

    let dispatched = bus.published_matching("rosey.commands.dice.roll");
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].data["channel"], json!("lobby"));
    assert_eq!(dispatched[0].data["user"], json!("alice"));
    assert_eq!(dispatched[0].data["args"], json!("2d6"));
    assert!(bus
        .published_matching("rosey.events.command.unhandled")
        .is_empty());
}

#[tokio::test]
async fn each_input_yields_exactly_one_dispatch_or_one_unhandled() {
    let bus = MemoryBus::new();
    let router = CommandRouter::new(Arc::new(bus.clone()))
        .with_resolver(Arc::new(DiceOnly));
    router.bind().await.unwrap();

    bus.publish(cytube_message("!roll 2d6")).await.unwrap();
    bus.publish(cytube_message("!fortune")).await.unwrap();
    bus.publish(cytube_message("!roll d20")).await.unwrap();
    bus.flush().await.unwrap();

    assert_eq!(bus.published_matching("rosey.commands.>").len(), 2);
    let unhandled = bus.published_matching("rosey.events.command.unhandled");
    assert_eq!(unhandled.len(), 1);
    assert_eq!(unhandled[0].data["command"], json!("fortune"));
}

#[tokio::test]
async fn tie_break_prefers_first_inserted_rule() {
    let bus = MemoryBus::new();
    let router = CommandRouter::new(Arc::new(bus.clone()));
    for (id, destination) in [
        ("first", "rosey.commands.first.execute"),
        ("second", "rosey.commands.second.execute"),
    ] {
        router
            .add_rule(RouteRule::new(id, 7, "roll", MatchType::Exact, destination).unwrap())
            .unwrap();
    }
    router.bind().await.unwrap();

    bus.publish(cytube_message("!roll")).await.unwrap();
    bus.flush().await.unwrap();

    assert_eq!(bus.published_matching("rosey.commands.first.execute").len(), 1);
    assert!(bus
        .published_matching("rosey.commands.second.execute")
        .is_empty());
}

#[tokio::test]
async fn plain_chat_is_ignored_entirely() {
    let bus = MemoryBus::new();
    let router = CommandRouter::new(Arc::new(bus.clone()))
        .with_resolver(Arc::new(DiceOnly));
    router.bind().await.unwrap();

    bus.publish(cytube_message("rolling on the floor")).await.unwrap();
    bus.flush().await.unwrap();

    assert!(bus.published_matching("rosey.commands.>").is_empty());
    assert!(bus.published_matching("rosey.events.>").is_empty());
}
