// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process bus for testing.
//!
//! Implements the full [`Bus`] contract (wildcard fan-out, queue groups,
//! request/reply, durable streams, KV buckets) against in-memory state.
//! Delivery runs on one task per subscription, preserving arrival order
//! within a subscription exactly like the real broker client.
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::kv::MemoryKv;
use crate::{
    check_subject, Bus, BusError, Handler, KvBucket, PublishAck, StreamConfig, SubscriptionId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rosey_core::{subject, Envelope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct SubEntry {
    pattern: String,
    queue: Option<String>,
    tx: mpsc::UnboundedSender<Envelope>,
}

struct StreamState {
    config: StreamConfig,
    messages: Vec<Envelope>,
}

struct State {
    connected: bool,
    next_sub: u64,
    subs: HashMap<SubscriptionId, SubEntry>,
    queue_rr: HashMap<String, usize>,
    streams: Vec<StreamState>,
    buckets: HashMap<String, Arc<MemoryKv>>,
    published: Vec<Envelope>,
}

/// In-memory broker + client, for tests.
#[derive(Clone)]
pub struct MemoryBus {
    name: String,
    inner: Arc<Mutex<State>>,
    /// Messages sent but not yet fully handled; `flush` waits for zero.
    pending: Arc<AtomicI64>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_name("memory-bus")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(State {
                connected: true,
                next_sub: 1,
                subs: HashMap::new(),
                queue_rr: HashMap::new(),
                streams: Vec::new(),
                buckets: HashMap::new(),
                published: Vec::new(),
            })),
            pending: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Every envelope published so far, in publish order.
    pub fn published(&self) -> Vec<Envelope> {
        self.inner.lock().published.clone()
    }

    /// Published envelopes whose subject matches `pattern`.
    pub fn published_matching(&self, pattern: &str) -> Vec<Envelope> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|e| subject::matches_pattern(&e.subject, pattern))
            .cloned()
            .collect()
    }

    /// Messages captured by a durable stream.
    pub fn stream_messages(&self, name: &str) -> Vec<Envelope> {
        self.inner
            .lock()
            .streams
            .iter()
            .find(|s| s.config.name == name)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Simulate a connection loss: subsequent publishes fail.
    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    fn fan_out(&self, envelope: &Envelope) {
        let mut state = self.inner.lock();

        // queue groups: one member per group receives the message
        let mut group_targets: HashMap<String, Vec<SubscriptionId>> = HashMap::new();
        let mut direct: Vec<SubscriptionId> = Vec::new();

        for (id, entry) in &state.subs {
            if !subject::matches_pattern(&envelope.subject, &entry.pattern) {
                continue;
            }
            match &entry.queue {
                Some(queue) => group_targets
                    .entry(format!("{}|{}", entry.pattern, queue))
                    .or_default()
                    .push(*id),
                None => direct.push(*id),
            }
        }

        for (key, mut ids) in group_targets {
            ids.sort_by_key(|id| id.0);
            let rr = state.queue_rr.entry(key).or_insert(0);
            let chosen = ids[*rr % ids.len()];
            *rr += 1;
            direct.push(chosen);
        }

        for id in direct {
            if let Some(entry) = state.subs.get(&id) {
                self.pending.fetch_add(1, Ordering::SeqCst);
                if entry.tx.send(envelope.clone()).is_err() {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
    }

    fn add_sub(
        &self,
        pattern: &str,
        queue: Option<&str>,
        handler: Handler,
    ) -> Result<SubscriptionId, BusError> {
        check_subject(pattern)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                handler(envelope).await;
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        });

        let mut state = self.inner.lock();
        if !state.connected {
            return Err(BusError::NotConnected);
        }
        let id = SubscriptionId(state.next_sub);
        state.next_sub += 1;
        state.subs.insert(
            id,
            SubEntry {
                pattern: pattern.to_string(),
                queue: queue.map(|q| q.to_string()),
                tx,
            },
        );
        Ok(id)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    fn client_name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        check_subject(&envelope.subject)?;
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        self.inner.lock().published.push(envelope.clone());
        self.fan_out(&envelope);
        Ok(())
    }

    async fn publish_durable(
        &self,
        envelope: Envelope,
        stream: Option<&str>,
    ) -> Result<PublishAck, BusError> {
        check_subject(&envelope.subject)?;
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        let ack = {
            let mut state = self.inner.lock();
            state.published.push(envelope.clone());

            let target = state.streams.iter_mut().find(|s| match stream {
                Some(name) => s.config.name == name,
                None => s
                    .config
                    .subjects
                    .iter()
                    .any(|p| subject::matches_pattern(&envelope.subject, p)),
            });

            let Some(target) = target else {
                return Err(BusError::Stream(format!(
                    "no stream for subject {}",
                    envelope.subject
                )));
            };
            target.messages.push(envelope.clone());
            PublishAck {
                stream: target.config.name.clone(),
                sequence: target.messages.len() as u64,
            }
        };

        self.fan_out(&envelope);
        Ok(ack)
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Handler,
    ) -> Result<SubscriptionId, BusError> {
        self.add_sub(subject, None, handler)
    }

    async fn subscribe_queue(
        &self,
        subject: &str,
        queue: &str,
        handler: Handler,
    ) -> Result<SubscriptionId, BusError> {
        self.add_sub(subject, Some(queue), handler)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        self.inner
            .lock()
            .subs
            .remove(&id)
            .map(|_| ())
            .ok_or(BusError::UnknownSubscription(id))
    }

    async fn create_stream(&self, config: StreamConfig) -> Result<(), BusError> {
        let mut state = self.inner.lock();
        if let Some(existing) = state
            .streams
            .iter_mut()
            .find(|s| s.config.name == config.name)
        {
            existing.config = config;
        } else {
            state.streams.push(StreamState {
                config,
                messages: Vec::new(),
            });
        }
        Ok(())
    }

    async fn kv_bucket(&self, name: &str) -> Result<Arc<dyn KvBucket>, BusError> {
        let bucket = {
            let mut state = self.inner.lock();
            Arc::clone(
                state
                    .buckets
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(MemoryKv::new())),
            )
        };
        Ok(bucket)
    }

    /// Wait until every delivered message has been fully handled,
    /// including messages published by handlers themselves.
    async fn flush(&self) -> Result<(), BusError> {
        while self.pending.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        let mut state = self.inner.lock();
        state.connected = false;
        state.subs.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
