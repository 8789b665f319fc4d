// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversation memory scenarios over the bus-backed KV.

use rosey_bus::{Bus, MemoryBus};
use rosey_core::ChannelId;
use rosey_memory::{ConversationMemory, MemoryCategory, MemoryConfig, MessageRole};

async fn memory_over_bus() -> (ConversationMemory, MemoryBus) {
    let bus = MemoryBus::new();
    let kv = bus.kv_bucket("rosey_memory").await.unwrap();
    (
        ConversationMemory::new(
            kv,
            MemoryConfig {
                context_size: 4,
                max_memories_per_channel: 50,
            },
        ),
        bus,
    )
}

#[tokio::test]
async fn appended_messages_come_back_in_order() {
    let (memory, _bus) = memory_over_bus().await;
    let channel = ChannelId::new("lobby");

    for i in 0..4 {
        memory
            .append_message(&channel, MessageRole::User, &format!("line {i}"), Some("alice"))
            .await
            .unwrap();
    }

    let recent = memory.recent_messages(&channel, Some(4)).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["line 0", "line 1", "line 2", "line 3"]);
}

#[tokio::test]
async fn kv_state_survives_a_new_wrapper_over_the_same_bucket() {
    let (memory, bus) = memory_over_bus().await;
    let channel = ChannelId::new("lobby");

    memory
        .append_message(&channel, MessageRole::System, "you are rosey", None)
        .await
        .unwrap();
    let id = memory
        .remember(&channel, "alice runs the movie night", MemoryCategory::Fact, 4, None)
        .await
        .unwrap();

    // a fresh wrapper over the same bucket sees everything
    let kv = bus.kv_bucket("rosey_memory").await.unwrap();
    let reopened = ConversationMemory::new(kv, MemoryConfig::default());

    let recent = reopened.recent_messages(&channel, None).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].role, MessageRole::System);

    let found = reopened.recall(&channel, "movie", 5).await.unwrap();
    assert_eq!(found, vec!["alice runs the movie night"]);
    assert!(reopened.forget(&channel, &id).await.unwrap());
}

#[tokio::test]
async fn reset_context_reports_dropped_count() {
    let (memory, _bus) = memory_over_bus().await;
    let channel = ChannelId::new("lobby");

    for _ in 0..3 {
        memory
            .append_message(&channel, MessageRole::User, "hi", None)
            .await
            .unwrap();
    }

    assert_eq!(memory.reset_context(&channel).await.unwrap(), 3);
    assert!(memory
        .recent_messages(&channel, None)
        .await
        .unwrap()
        .is_empty());
}
