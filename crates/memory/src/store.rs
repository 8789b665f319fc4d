// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! KV-backed conversation memory.

use chrono::{DateTime, Utc};
use rosey_bus::{KvBucket, KvError};
use rosey_core::{ChannelId, ShortId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Memory errors
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("stored record is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("importance must be 1-5, got {0}")]
    InvalidImportance(u8),
}

/// Memory configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Messages handed back as context by default; the stored list keeps
    /// twice this many.
    pub context_size: usize,
    pub max_memories_per_channel: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_size: 20,
            max_memories_per_channel: 50,
        }
    }
}

/// Who said a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        };
        write!(f, "{name}")
    }
}

/// One message in a channel's recent history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Kind of structured memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Fact,
    Preference,
    Topic,
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(MemoryCategory::Fact),
            "preference" => Ok(MemoryCategory::Preference),
            "topic" => Ok(MemoryCategory::Topic),
            other => Err(format!("unknown memory category: {other}")),
        }
    }
}

/// A remembered item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMemory {
    pub id: String,
    pub content: String,
    pub category: MemoryCategory,
    /// 1 (trivia) to 5 (load-bearing).
    pub importance: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Typed wrapper over the durable KV bucket.
pub struct ConversationMemory {
    kv: Arc<dyn KvBucket>,
    config: MemoryConfig,
}

impl ConversationMemory {
    pub fn new(kv: Arc<dyn KvBucket>, config: MemoryConfig) -> Self {
        Self { kv, config }
    }

    fn messages_key(channel: &ChannelId) -> String {
        format!("messages:{channel}:recent")
    }

    fn memory_key(channel: &ChannelId, id: &str) -> String {
        format!("memories:{channel}:{id}")
    }

    fn memories_prefix(channel: &ChannelId) -> String {
        format!("memories:{channel}:")
    }

    /// Append a message, trimming the stored list to twice the context size
    /// (oldest first).
    pub async fn append_message(
        &self,
        channel: &ChannelId,
        role: MessageRole,
        content: &str,
        user_id: Option<&str>,
    ) -> Result<(), MemoryError> {
        let mut messages = self.load_messages(channel).await?;
        messages.push(StoredMessage {
            role,
            content: content.to_string(),
            user_id: user_id.map(|u| u.to_string()),
            timestamp: Utc::now(),
        });

        let cap = self.config.context_size * 2;
        if messages.len() > cap {
            messages.drain(..messages.len() - cap);
        }

        self.kv
            .put(&Self::messages_key(channel), serde_json::to_vec(&messages)?)
            .await?;
        Ok(())
    }

    /// Last `limit` messages (default: context size), in append order.
    pub async fn recent_messages(
        &self,
        channel: &ChannelId,
        limit: Option<usize>,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        let messages = self.load_messages(channel).await?;
        let limit = limit.unwrap_or(self.config.context_size);
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    /// Drop a channel's history; returns how many messages were dropped.
    pub async fn reset_context(&self, channel: &ChannelId) -> Result<usize, MemoryError> {
        let count = self.load_messages(channel).await?.len();
        self.kv.delete(&Self::messages_key(channel)).await?;
        debug!(channel = %channel, count, "context reset");
        Ok(count)
    }

    /// Store a memory; returns its id.
    ///
    /// When the channel is at its memory cap, the least important (oldest
    /// first among equals) is evicted.
    pub async fn remember(
        &self,
        channel: &ChannelId,
        content: &str,
        category: MemoryCategory,
        importance: u8,
        user_id: Option<&str>,
    ) -> Result<String, MemoryError> {
        if !(1..=5).contains(&importance) {
            return Err(MemoryError::InvalidImportance(importance));
        }

        let existing = self.load_memories(channel).await?;
        if existing.len() >= self.config.max_memories_per_channel {
            if let Some(evict) = existing
                .iter()
                .min_by_key(|m| (m.importance, m.created_at))
            {
                debug!(channel = %channel, id = %evict.id, "evicting memory at cap");
                self.kv
                    .delete(&Self::memory_key(channel, &evict.id))
                    .await?;
            }
        }

        let id = uuid::Uuid::new_v4().simple().to_string().short(8).to_string();
        let memory = StoredMemory {
            id: id.clone(),
            content: content.to_string(),
            category,
            importance,
            user_id: user_id.map(|u| u.to_string()),
            created_at: Utc::now(),
        };

        self.kv
            .put(&Self::memory_key(channel, &id), serde_json::to_vec(&memory)?)
            .await?;
        Ok(id)
    }

    /// Recall memory contents matching a query.
    ///
    /// Naive keyword search: a memory matches when any whitespace-split
    /// query term is a case-insensitive substring of its content. Ranked by
    /// importance descending, then recency.
    pub async fn recall(
        &self,
        channel: &ChannelId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, MemoryError> {
        let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<StoredMemory> = self
            .load_memories(channel)
            .await?
            .into_iter()
            .filter(|memory| {
                let content = memory.content.to_lowercase();
                terms.iter().any(|term| content.contains(term))
            })
            .collect();

        matches.sort_by(|a, b| {
            b.importance
                .cmp(&a.importance)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(matches.into_iter().take(limit).map(|m| m.content).collect())
    }

    /// Delete one memory; returns whether it existed.
    pub async fn forget(&self, channel: &ChannelId, id: &str) -> Result<bool, MemoryError> {
        let key = Self::memory_key(channel, id);
        if self.kv.get(&key).await?.is_none() {
            return Ok(false);
        }
        self.kv.delete(&key).await?;
        Ok(true)
    }

    async fn load_messages(&self, channel: &ChannelId) -> Result<Vec<StoredMessage>, MemoryError> {
        match self.kv.get(&Self::messages_key(channel)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    async fn load_memories(&self, channel: &ChannelId) -> Result<Vec<StoredMemory>, MemoryError> {
        let keys = self.kv.keys(&Self::memories_prefix(channel)).await?;
        let mut memories = Vec::with_capacity(keys.len());
        for key in keys {
            // a record deleted between keys() and get() is not an error
            let Some(bytes) = self.kv.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice(&bytes) {
                Ok(memory) => memories.push(memory),
                Err(e) => debug!(key = %key, error = %e, "skipping undecodable memory"),
            }
        }
        Ok(memories)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
