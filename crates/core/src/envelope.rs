// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message envelope and its JSON wire codec.
//!
//! Wire format: a flat JSON object with stable field names. The decoder is
//! tolerant of unknown fields (forward compat) but rejects missing required
//! fields (`subject`, `event_type`, `source`, `data`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Codec errors
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Message priority, encoded as an integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Normal),
            3 => Ok(Priority::High),
            4 => Ok(Priority::Critical),
            other => Err(format!("invalid priority: {other}")),
        }
    }
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_epoch_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn is_empty_map(map: &Map<String, Value>) -> bool {
    map.is_empty()
}

/// A single message on the bus.
///
/// All communication between components uses envelopes; the payload in
/// `data` is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing key (must validate per the subject grammar when published).
    pub subject: String,
    /// Free-form event tag (`message`, `user.join`, `plugin.crashed`, ...).
    pub event_type: String,
    /// Component that created the envelope.
    pub source: String,
    /// Opaque payload.
    pub data: Map<String, Value>,
    /// Correlation id for tracking related envelopes; generated when absent.
    #[serde(default = "new_correlation_id")]
    pub correlation_id: String,
    /// Seconds since the Unix epoch.
    #[serde(default = "now_epoch_secs")]
    pub timestamp: f64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "is_empty_map")]
    pub metadata: Map<String, Value>,
}

impl Envelope {
    pub fn new(
        subject: impl Into<String>,
        event_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            event_type: event_type.into(),
            source: source.into(),
            data: Map::new(),
            correlation_id: new_correlation_id(),
            timestamp: now_epoch_secs(),
            priority: Priority::Normal,
            metadata: Map::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn with_data_map(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Subject a single reply must be sent to, if the sender asked for one.
    pub fn reply_to(&self) -> Option<&str> {
        self.metadata.get("reply_to").and_then(|v| v.as_str())
    }

    /// Build a response envelope.
    ///
    /// Carries this envelope's correlation id in the response metadata so
    /// the originator can associate it, per the request/reply contract.
    pub fn respond(
        &self,
        subject: impl Into<String>,
        event_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Envelope {
        Envelope::new(subject, event_type, source).with_metadata(
            "correlation_id",
            Value::String(self.correlation_id.clone()),
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
