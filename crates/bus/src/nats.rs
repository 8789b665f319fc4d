// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS-backed bus client.
//!
//! Wraps a core NATS connection plus a JetStream context. Plain publishes
//! are at-most-once; durable publishes go through JetStream and await the
//! ack. Subscriptions survive reconnects (the NATS client resubscribes);
//! publishes while disconnected are rejected rather than buffered.

use crate::kv::NatsKv;
use crate::{
    check_subject, Bus, BusError, Handler, KvBucket, PublishAck, Retention, StreamConfig,
    SubscriptionId,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use rosey_core::Envelope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// NATS server URLs.
    pub servers: Vec<String>,
    /// Client name; also the `source` of bus-generated envelopes.
    pub name: String,
    /// Bounded reconnect attempts after a connection loss.
    pub max_reconnect_attempts: usize,
    /// Fixed wait between reconnect attempts.
    pub reconnect_wait: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "rosey-bot".to_string(),
            max_reconnect_attempts: 60,
            reconnect_wait: Duration::from_secs(2),
        }
    }
}

type ConnectionCallback = Box<dyn Fn() + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_connect: Mutex<Vec<ConnectionCallback>>,
    on_disconnect: Mutex<Vec<ConnectionCallback>>,
    on_error: Mutex<Vec<ErrorCallback>>,
}

impl Callbacks {
    fn fire_connect(&self) {
        for cb in self.on_connect.lock().iter() {
            cb();
        }
    }

    fn fire_disconnect(&self) {
        for cb in self.on_disconnect.lock().iter() {
            cb();
        }
    }

    fn fire_error(&self, error: &str) {
        for cb in self.on_error.lock().iter() {
            cb(error);
        }
    }
}

struct SubEntry {
    subject: String,
    shutdown: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

/// Bus client over NATS.
pub struct NatsBus {
    config: BusConfig,
    client: async_nats::Client,
    jetstream: async_nats::jetstream::Context,
    subs: Mutex<HashMap<SubscriptionId, SubEntry>>,
    next_sub: AtomicU64,
    closed: AtomicBool,
    callbacks: Arc<Callbacks>,
}

impl NatsBus {
    /// Connect to the broker.
    pub async fn connect(config: BusConfig) -> Result<Self, BusError> {
        info!(servers = ?config.servers, name = %config.name, "connecting to NATS");

        let callbacks = Arc::new(Callbacks::default());
        let event_callbacks = Arc::clone(&callbacks);
        let reconnect_wait = config.reconnect_wait;

        let options = async_nats::ConnectOptions::new()
            .name(&config.name)
            .max_reconnects(config.max_reconnect_attempts)
            .reconnect_delay_callback(move |_attempt| reconnect_wait)
            .event_callback(move |event| {
                let callbacks = Arc::clone(&event_callbacks);
                async move {
                    match event {
                        async_nats::Event::Connected => {
                            info!("connected to NATS");
                            callbacks.fire_connect();
                        }
                        async_nats::Event::Disconnected => {
                            warn!("disconnected from NATS");
                            callbacks.fire_disconnect();
                        }
                        async_nats::Event::ClientError(e) => {
                            warn!(error = %e, "NATS client error");
                            callbacks.fire_error(&e.to_string());
                        }
                        async_nats::Event::ServerError(e) => {
                            warn!(error = %e, "NATS server error");
                            callbacks.fire_error(&e.to_string());
                        }
                        other => {
                            debug!(event = %other, "NATS event");
                        }
                    }
                }
            });

        let client = options
            .connect(config.servers.join(","))
            .await
            .map_err(|e| BusError::ConnectFailed(e.to_string()))?;

        let jetstream = async_nats::jetstream::new(client.clone());

        Ok(Self {
            config,
            client,
            jetstream,
            subs: Mutex::new(HashMap::new()),
            next_sub: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            callbacks,
        })
    }

    /// Register a callback fired on (re)connection.
    pub fn on_connect(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.on_connect.lock().push(Box::new(callback));
    }

    /// Register a callback fired exactly once per disconnection event.
    pub fn on_disconnect(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.on_disconnect.lock().push(Box::new(callback));
    }

    /// Register a callback fired on client or server errors.
    pub fn on_error(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.callbacks.on_error.lock().push(Box::new(callback));
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn spawn_delivery(
        &self,
        subject: String,
        mut subscriber: async_nats::Subscriber,
        handler: Handler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_sub.fetch_add(1, Ordering::SeqCst));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task_subject = subject.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        // cancel the broker-side subscription, not just the task
                        if let Err(e) = subscriber.unsubscribe().await {
                            warn!(subject = %task_subject, error = %e, "unsubscribe failed");
                        }
                        break;
                    }
                    msg = subscriber.next() => {
                        let Some(msg) = msg else { break };
                        match Envelope::decode(&msg.payload) {
                            Ok(envelope) => handler(envelope).await,
                            Err(e) => {
                                warn!(
                                    subject = %task_subject,
                                    error = %e,
                                    "dropping undecodable message"
                                );
                            }
                        }
                    }
                }
            }
        });

        self.subs.lock().insert(
            id,
            SubEntry {
                subject,
                shutdown: shutdown_tx,
                task,
            },
        );
        id
    }

    fn retention_policy(
        retention: Retention,
    ) -> async_nats::jetstream::stream::RetentionPolicy {
        use async_nats::jetstream::stream::RetentionPolicy;
        match retention {
            Retention::Limits => RetentionPolicy::Limits,
            Retention::Interest => RetentionPolicy::Interest,
            Retention::WorkQueue => RetentionPolicy::WorkQueue,
        }
    }
}

#[async_trait]
impl Bus for NatsBus {
    fn client_name(&self) -> &str {
        &self.config.name
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.client.connection_state() == async_nats::connection::State::Connected
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        check_subject(&envelope.subject)?;
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        let payload = envelope.encode()?;
        self.client
            .publish(envelope.subject.clone(), payload.into())
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))?;

        debug!(subject = %envelope.subject, event_type = %envelope.event_type, "published");
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

        let payload = envelope.encode()?;
        let mut headers = async_nats::HeaderMap::new();
        if let Some(stream) = stream {
            headers.insert("Nats-Expected-Stream", stream);
        }

        let ack = self
            .jetstream
            .publish_with_headers(envelope.subject.clone(), headers, payload.into())
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))?
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))?;

        debug!(
            subject = %envelope.subject,
            stream = %ack.stream,
            sequence = ack.sequence,
            "published durable"
        );
        Ok(PublishAck {
            stream: ack.stream,
            sequence: ack.sequence,
        })
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: Handler,
    ) -> Result<SubscriptionId, BusError> {
        check_subject(subject)?;
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;

        debug!(subject, "subscribed");
        Ok(self.spawn_delivery(subject.to_string(), subscriber, handler))
    }

    async fn subscribe_queue(
        &self,
        subject: &str,
        queue: &str,
        handler: Handler,
    ) -> Result<SubscriptionId, BusError> {
        check_subject(subject)?;
        let subscriber = self
            .client
            .queue_subscribe(subject.to_string(), queue.to_string())
            .await
            .map_err(|e| BusError::SubscribeFailed(e.to_string()))?;

        debug!(subject, queue, "subscribed (queue)");
        Ok(self.spawn_delivery(subject.to_string(), subscriber, handler))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        let entry = self
            .subs
            .lock()
            .remove(&id)
            .ok_or(BusError::UnknownSubscription(id))?;

        debug!(subject = %entry.subject, "unsubscribing");
        let _ = entry.shutdown.send(());
        let _ = entry.task.await;
        Ok(())
    }

    async fn create_stream(&self, config: StreamConfig) -> Result<(), BusError> {
        let js_config = async_nats::jetstream::stream::Config {
            name: config.name.clone(),
            subjects: config.subjects.clone(),
            retention: Self::retention_policy(config.retention),
            max_messages: config.max_msgs,
            max_bytes: config.max_bytes,
            ..Default::default()
        };

        self.jetstream
            .get_or_create_stream(js_config)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;

        info!(stream = %config.name, subjects = ?config.subjects, "stream ready");
        Ok(())
    }

    async fn kv_bucket(&self, name: &str) -> Result<Arc<dyn KvBucket>, BusError> {
        if let Ok(store) = self.jetstream.get_key_value(name).await {
            return Ok(Arc::new(NatsKv::new(store)));
        }

        let store = self
            .jetstream
            .create_key_value(async_nats::jetstream::kv::Config {
                bucket: name.to_string(),
                history: 5,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::KvUnavailable(e.to_string()))?;

        info!(bucket = name, "kv bucket created");
        Ok(Arc::new(NatsKv::new(store)))
    }

    async fn flush(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        info!("disconnecting from NATS");
        self.closed.store(true, Ordering::SeqCst);

        let entries: Vec<SubEntry> = self.subs.lock().drain().map(|(_, e)| e).collect();
        for entry in entries {
            let _ = entry.shutdown.send(());
            let _ = entry.task.await;
        }

        let _ = self.client.flush().await;
        Ok(())
    }
}
