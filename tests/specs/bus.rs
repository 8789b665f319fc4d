// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pub/sub delivery scenarios over the in-memory broker.

use parking_lot::Mutex;
use rosey_bus::{handler, Bus, MemoryBus, StreamConfig};
use rosey_core::Envelope;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn message(subject: &str) -> Envelope {
    Envelope::new(subject, "message", "spec").with_data("text", json!("payload"))
}

#[tokio::test]
async fn every_matching_subscription_observes_each_publish_exactly_once() {
    let bus = MemoryBus::new();
    let wide: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let narrow: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&wide);
    bus.subscribe(
        "rosey.events.>",
        handler(move |envelope| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().push(envelope.subject) }
        }),
    )
    .await
    .unwrap();

    let sink = Arc::clone(&narrow);
    bus.subscribe(
        "rosey.events.media.*",
        handler(move |envelope| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().push(envelope.subject) }
        }),
    )
    .await
    .unwrap();

    bus.publish(message("rosey.events.message")).await.unwrap();
    bus.publish(message("rosey.events.media.change")).await.unwrap();
    bus.publish(message("rosey.commands.dice.roll")).await.unwrap();
    bus.flush().await.unwrap();

    assert_eq!(
        wide.lock().clone(),
        vec!["rosey.events.message", "rosey.events.media.change"]
    );
    assert_eq!(narrow.lock().clone(), vec!["rosey.events.media.change"]);
}

#[tokio::test]
async fn unsubscribed_handler_receives_nothing_further() {
    let bus = MemoryBus::new();
    let seen = Arc::new(Mutex::new(0usize));

    let sink = Arc::clone(&seen);
    let sub = bus
        .subscribe(
            "rosey.events.>",
            handler(move |_| {
                let sink = Arc::clone(&sink);
                async move { *sink.lock() += 1 }
            }),
        )
        .await
        .unwrap();

    bus.publish(message("rosey.events.one")).await.unwrap();
    bus.flush().await.unwrap();
    bus.unsubscribe(sub).await.unwrap();
    bus.publish(message("rosey.events.two")).await.unwrap();
    bus.flush().await.unwrap();

    assert_eq!(*seen.lock(), 1);
}

#[tokio::test]
async fn request_reply_with_late_reply_dropped() {
    let bus = MemoryBus::new();

    // responder answers twice; only the first reply lands
    let responder = bus.clone();
    bus.subscribe(
        "rosey.commands.echo.execute",
        handler(move |envelope| {
            let responder = responder.clone();
            async move {
                let mut data = serde_json::Map::new();
                data.insert("n".to_string(), json!(1));
                let _ = responder.reply(&envelope, data.clone()).await;
                data.insert("n".to_string(), json!(2));
                let _ = responder.reply(&envelope, data).await;
            }
        }),
    )
    .await
    .unwrap();

    let reply = bus
        .request(
            "rosey.commands.echo.execute",
            serde_json::Map::new(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(reply.data["n"], json!(1));
}

#[tokio::test]
async fn durable_publish_acks_with_stream_sequence() {
    let bus = MemoryBus::new();
    bus.create_stream(StreamConfig::new(
        "rosey-events",
        vec!["rosey.events.>".to_string()],
    ))
    .await
    .unwrap();

    let first = bus
        .publish_durable(message("rosey.events.message"), None)
        .await
        .unwrap();
    let second = bus
        .publish_durable(message("rosey.events.message"), Some("rosey-events"))
        .await
        .unwrap();

    assert_eq!(first.stream, "rosey-events");
    assert_eq!((first.sequence, second.sequence), (1, 2));
    assert_eq!(bus.stream_messages("rosey-events").len(), 2);
}
