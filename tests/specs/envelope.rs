// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope codec scenarios.

use rosey_core::{Envelope, Priority};
use serde_json::json;

#[test]
fn envelope_roundtrip_preserves_priority() {
    let envelope = Envelope::new("rosey.events.message", "message", "cytube")
        .with_data("text", json!("hi"))
        .with_priority(Priority::High);

    let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
    assert_eq!(decoded, envelope);
    assert_eq!(u8::from(decoded.priority), 3);
}

#[test]
fn decoder_defaults_and_rejections() {
    // missing priority defaults to NORMAL
    let bytes = serde_json::to_vec(&json!({
        "subject": "rosey.events.message",
        "event_type": "message",
        "source": "cytube",
        "data": {"text": "hi"},
        "future_field": [1, 2, 3],
    }))
    .unwrap();
    let decoded = Envelope::decode(&bytes).unwrap();
    assert_eq!(decoded.priority, Priority::Normal);

    // missing required fields are rejected
    let bytes = serde_json::to_vec(&json!({
        "event_type": "message",
        "source": "cytube",
        "data": {},
    }))
    .unwrap();
    assert!(Envelope::decode(&bytes).is_err());
}
