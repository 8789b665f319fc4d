// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rosey-bus: Subject-based pub/sub client for the Rosey core.
//!
//! The [`Bus`] trait is the seam every component talks through. Production
//! uses [`NatsBus`] (core NATS + JetStream); tests use `MemoryBus`, an
//! in-process broker with the same wildcard and queue-group semantics.

pub mod kv;
mod nats;

pub use kv::{KvBucket, KvError};
pub use nats::{BusConfig, NatsBus};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryBus;

use async_trait::async_trait;
use rosey_core::{subject, Envelope, EnvelopeError};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Bus errors
#[derive(Debug, Error)]
pub enum BusError {
    #[error("not connected to bus")]
    NotConnected,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    #[error("codec error: {0}")]
    Codec(#[from] EnvelopeError),

    #[error("unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("envelope has no reply subject")]
    NoReplySubject,

    #[error("stream error: {0}")]
    Stream(String),

    #[error("kv unavailable: {0}")]
    KvUnavailable(String),
}

/// Handle for an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Boxed future returned by subscription handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A subscription handler.
///
/// Handlers run on the subscription's delivery task, one invocation at a
/// time in arrival order, and must not block; anything slow should be
/// spawned. Handlers own their error handling; the bus only logs and drops
/// undecodable payloads.
pub type Handler = Arc<dyn Fn(Envelope) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |envelope| Box::pin(f(envelope)))
}

/// Acknowledgment for a durable publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub stream: String,
    pub sequence: u64,
}

/// Retention policy for a durable stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Limits,
    Interest,
    WorkQueue,
}

/// Durable stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: Retention,
    pub max_msgs: i64,
    pub max_bytes: i64,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, subjects: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subjects,
            retention: Retention::Limits,
            max_msgs: 10_000,
            max_bytes: 100 * 1024 * 1024,
        }
    }
}

/// The message bus seam.
///
/// Per-subject ordering within a subscription is the broker's guarantee and
/// is preserved by the delivery task; no ordering is promised across
/// subscriptions. `publish` is at-most-once; `publish_durable` is
/// at-least-once and awaits the broker ack.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Client name, used as the `source` of bus-generated envelopes.
    fn client_name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Publish with at-most-once delivery.
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError>;

    /// Publish with at-least-once delivery; waits for the broker ack.
    ///
    /// `stream` pins the expected destination stream when given.
    async fn publish_durable(
        &self,
        envelope: Envelope,
        stream: Option<&str>,
    ) -> Result<PublishAck, BusError>;

    /// Subscribe a handler to a subject pattern.
    async fn subscribe(&self, subject: &str, handler: Handler)
        -> Result<SubscriptionId, BusError>;

    /// Subscribe as part of a queue group; each message goes to one member.
    async fn subscribe_queue(
        &self,
        subject: &str,
        queue: &str,
        handler: Handler,
    ) -> Result<SubscriptionId, BusError>;

    /// Cancel a subscription, including the broker-side registration.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError>;

    /// Create (or update) a durable stream.
    async fn create_stream(&self, config: StreamConfig) -> Result<(), BusError>;

    /// Open a named durable KV bucket.
    async fn kv_bucket(&self, name: &str) -> Result<Arc<dyn KvBucket>, BusError>;

    /// Flush pending outbound messages.
    async fn flush(&self) -> Result<(), BusError>;

    /// Drain subscriptions and close the connection.
    async fn disconnect(&self) -> Result<(), BusError>;

    /// Send a request and await a single reply.
    ///
    /// Allocates a single-use reply inbox; the inbox closes after the first
    /// reply and late replies are dropped silently.
    async fn request(
        &self,
        subject: &str,
        data: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Envelope, BusError> {
        let inbox = format!("rosey.inbox.{}", uuid::Uuid::new_v4().simple());
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Envelope>(1);

        let sub = self
            .subscribe(
                &inbox,
                handler(move |envelope| {
                    let tx = tx.clone();
                    async move {
                        // capacity 1: the first reply wins, later ones drop
                        let _ = tx.try_send(envelope);
                    }
                }),
            )
            .await?;

        let mut envelope = Envelope::new(subject, "request", self.client_name());
        envelope.data = data;
        envelope
            .metadata
            .insert("reply_to".to_string(), Value::String(inbox));

        let result = match self.publish(envelope).await {
            Ok(()) => match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(reply)) => Ok(reply),
                _ => Err(BusError::RequestTimeout(timeout)),
            },
            Err(e) => Err(e),
        };

        let _ = self.unsubscribe(sub).await;
        result
    }

    /// Reply to a request envelope on its `reply_to` inbox.
    async fn reply(
        &self,
        original: &Envelope,
        data: Map<String, Value>,
    ) -> Result<(), BusError> {
        let reply_to = original
            .reply_to()
            .ok_or(BusError::NoReplySubject)?
            .to_string();
        let mut envelope = original.respond(reply_to, "reply", self.client_name());
        envelope.data = data;
        self.publish(envelope).await
    }
}

/// Validate a subject before it leaves this process.
pub(crate) fn check_subject(s: &str) -> Result<(), BusError> {
    if subject::validate(s) {
        Ok(())
    } else {
        Err(BusError::InvalidSubject(s.to_string()))
    }
}
