// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subject grammar scenarios.

use rosey_core::subject::{matches_pattern, parse, validate, ParsedSubject};

#[test]
fn parse_platform_subject_yields_structured_parts() {
    let parsed = parse("rosey.platform.cytube.message").unwrap();
    assert_eq!(
        parsed,
        ParsedSubject::Platform {
            platform: "cytube".to_string(),
            event: "message".to_string(),
        }
    );
}

#[test]
fn command_subjects_match_command_wildcards_only() {
    assert!(matches_pattern(
        "rosey.commands.trivia.answer",
        "rosey.commands.*.*"
    ));
    assert!(!matches_pattern(
        "rosey.commands.trivia.answer",
        "rosey.events.>"
    ));
}

#[test]
fn every_wire_subject_shape_validates() {
    for subject in [
        "rosey.platform.cytube.message",
        "rosey.events.command.unhandled",
        "rosey.commands.dice.roll",
        "rosey.plugins.dice.ready",
        "rosey.plugins.dice.resource.exceeded",
        "rosey.plugins.dice.circuit_open",
        "rosey.monitoring.ratelimit.threshold",
        "rosey.security.violation",
        "rosey.db.row.quotes.insert",
        "rosey.db.kv.llm.get",
        "rosey.db.migrate.quotes.status",
    ] {
        assert!(validate(subject), "{subject} should validate");
    }
}

#[test]
fn greater_matches_the_bare_prefix_and_any_remainder() {
    assert!(matches_pattern("rosey.events.message", "rosey.events.>"));
    assert!(matches_pattern("rosey.events.user.join", "rosey.events.>"));
    // a subject of exactly the prefix length matches a terminal '>'
    assert!(matches_pattern("rosey.events", "rosey.events.>"));
    assert!(!matches_pattern("rosey.commands", "rosey.events.>"));
}
