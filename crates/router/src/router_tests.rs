// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::rule::MatchType;
use rosey_bus::MemoryBus;
use serde_json::json;

struct StaticResolver(Vec<(&'static str, &'static str)>);

impl CommandResolver for StaticResolver {
    fn resolve(&self, prefix: &str) -> Option<PluginId> {
        self.0
            .iter()
            .find(|(p, _)| *p == prefix)
            .map(|(_, plugin)| PluginId::new(*plugin))
    }
}

fn setup() -> (CommandRouter, MemoryBus) {
    let bus = MemoryBus::new();
    let router = CommandRouter::new(Arc::new(bus.clone()))
        .with_resolver(Arc::new(StaticResolver(vec![("roll", "dice"), ("trivia", "trivia")])));
    (router, bus)
}

fn platform_message(text: &str) -> Envelope {
    Envelope::new("rosey.platform.cytube.message", "message", "cytube")
        .with_data("message", json!(text))
        .with_data("channel", json!("lobby"))
        .with_data("user", json!("alice"))
}

fn rule(id: &str, priority: i32, pattern: &str, destination: &str) -> RouteRule {
    RouteRule::new(id, priority, pattern, MatchType::Exact, destination).unwrap()
}

#[tokio::test]
async fn index_dispatch_defaults_to_execute_action() {
    let (router, bus) = setup();

    let outcome = router.dispatch(&platform_message("!roll 2d6")).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            destination: "rosey.commands.dice.execute".to_string()
        }
    );

    bus.flush().await.unwrap();
    let dispatched = bus.published_matching("rosey.commands.dice.execute");
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].data["command"], json!("roll"));
    assert_eq!(dispatched[0].data["args"], json!("2d6"));
    assert_eq!(dispatched[0].data["channel"], json!("lobby"));
    assert_eq!(dispatched[0].data["user"], json!("alice"));
    assert!(bus.published_matching("rosey.events.command.unhandled").is_empty());
}

#[tokio::test]
async fn rule_beats_command_index() {
    let (router, bus) = setup();
    router
        .add_rule(rule("dice-roll", 10, "roll", "rosey.commands.dice.roll"))
        .unwrap();

    let outcome = router.dispatch(&platform_message("!roll 2d6")).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            destination: "rosey.commands.dice.roll".to_string()
        }
    );

    bus.flush().await.unwrap();
    assert_eq!(bus.published_matching("rosey.commands.dice.roll").len(), 1);
    assert!(bus.published_matching("rosey.commands.dice.execute").is_empty());
}

#[tokio::test]
async fn higher_priority_rule_wins() {
    let (router, _bus) = setup();
    router
        .add_rule(rule("low", 1, "roll", "rosey.commands.low.execute"))
        .unwrap();
    router
        .add_rule(rule("high", 5, "roll", "rosey.commands.high.execute"))
        .unwrap();

    let outcome = router.dispatch(&platform_message("!roll")).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            destination: "rosey.commands.high.execute".to_string()
        }
    );
}

#[tokio::test]
async fn equal_priority_ties_break_by_insertion_order() {
    let (router, _bus) = setup();
    router
        .add_rule(rule("first", 5, "roll", "rosey.commands.first.execute"))
        .unwrap();
    router
        .add_rule(rule("second", 5, "roll", "rosey.commands.second.execute"))
        .unwrap();

    let outcome = router.dispatch(&platform_message("!roll")).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            destination: "rosey.commands.first.execute".to_string()
        }
    );
}

#[tokio::test]
async fn disabled_rule_is_skipped() {
    let (router, _bus) = setup();
    router
        .add_rule(rule("special", 10, "roll", "rosey.commands.special.execute"))
        .unwrap();
    assert!(router.set_enabled("special", false));

    let outcome = router.dispatch(&platform_message("!roll")).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            destination: "rosey.commands.dice.execute".to_string()
        }
    );
}

#[tokio::test]
async fn unmatched_command_emits_one_unhandled_event() {
    let (router, bus) = setup();

    let outcome = router.dispatch(&platform_message("!unknown stuff")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Unhandled);

    bus.flush().await.unwrap();
    let unhandled = bus.published_matching("rosey.events.command.unhandled");
    assert_eq!(unhandled.len(), 1);
    assert_eq!(unhandled[0].data["command"], json!("unknown"));
    assert!(bus.published_matching("rosey.commands.>").is_empty());
}

#[tokio::test]
async fn plain_chat_produces_nothing() {
    let (router, bus) = setup();

    let outcome = router.dispatch(&platform_message("just chatting")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::NotACommand);

    bus.flush().await.unwrap();
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn correlation_id_propagates_to_dispatch() {
    let (router, bus) = setup();
    let envelope = platform_message("!roll 2d6");

    router.dispatch(&envelope).await.unwrap();
    bus.flush().await.unwrap();

    let dispatched = bus.published_matching("rosey.commands.dice.execute");
    assert_eq!(dispatched[0].correlation_id, envelope.correlation_id);
}

#[tokio::test]
async fn reply_to_is_preserved() {
    let (router, bus) = setup();
    let envelope = platform_message("!roll 2d6")
        .with_metadata("reply_to", json!("rosey.inbox.abc123"));

    router.dispatch(&envelope).await.unwrap();
    bus.flush().await.unwrap();

    let dispatched = bus.published_matching("rosey.commands.dice.execute");
    assert_eq!(dispatched[0].reply_to(), Some("rosey.inbox.abc123"));
}

#[tokio::test]
async fn failed_dispatch_reports_to_originator() {
    let bus = MemoryBus::new();
    let router = CommandRouter::new(Arc::new(bus.clone()));
    // destination that can never be published to
    router
        .add_rule(rule("broken", 10, "roll", "not-a-valid..subject"))
        .unwrap();
    router.bind().await.unwrap();

    let envelope = platform_message("!roll 2d6")
        .with_metadata("reply_to", json!("rosey.inbox.xyz"));
    bus.publish(envelope.clone()).await.unwrap();
    bus.flush().await.unwrap();

    // command.error event with the originator's correlation id
    let errors = bus.published_matching("rosey.events.command.error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].correlation_id, envelope.correlation_id);

    // structured failure on the reply inbox
    let replies = bus.published_matching("rosey.inbox.xyz");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].data["success"], json!(false));
    assert!(replies[0].data["error"]
        .as_str()
        .unwrap_or_default()
        .contains("invalid subject"));
}

#[tokio::test]
async fn duplicate_rule_id_rejected() {
    let (router, _bus) = setup();
    router
        .add_rule(rule("r1", 0, "a", "rosey.commands.a.execute"))
        .unwrap();
    let err = router
        .add_rule(rule("r1", 0, "b", "rosey.commands.b.execute"))
        .unwrap_err();
    assert!(matches!(err, RouterError::DuplicateRule(_)));
}

#[tokio::test]
async fn remove_rule_unroutes() {
    let (router, _bus) = setup();
    router
        .add_rule(rule("special", 10, "trivia", "rosey.commands.special.execute"))
        .unwrap();
    assert!(router.remove_rule("special"));
    assert!(!router.remove_rule("special"));

    let outcome = router.dispatch(&platform_message("!trivia")).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            destination: "rosey.commands.trivia.execute".to_string()
        }
    );
}

#[tokio::test]
async fn bound_router_routes_bus_traffic_end_to_end() {
    let (router, bus) = setup();
    router.bind().await.unwrap();

    bus.publish(platform_message("!roll 2d6")).await.unwrap();
    bus.flush().await.unwrap();

    let dispatched = bus.published_matching("rosey.commands.dice.execute");
    assert_eq!(dispatched.len(), 1);

    router.unbind().await;
    bus.publish(platform_message("!roll 3d8")).await.unwrap();
    bus.flush().await.unwrap();
    assert_eq!(bus.published_matching("rosey.commands.dice.execute").len(), 1);
}

#[tokio::test]
async fn wildcard_rule_routes_any_platform_command() {
    let (router, bus) = setup();
    let audit = RouteRule::new(
        "audit",
        100,
        "rosey.platform.*.message",
        MatchType::Wildcard,
        "rosey.commands.audit.{prefix}",
    )
    .unwrap();
    router.add_rule(audit).unwrap();

    let outcome = router.dispatch(&platform_message("!quote add hi")).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            destination: "rosey.commands.audit.quote".to_string()
        }
    );
    bus.flush().await.unwrap();
    assert_eq!(bus.published_matching("rosey.commands.audit.quote").len(), 1);
}
