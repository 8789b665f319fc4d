// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The command router.

use crate::command::CommandInvocation;
use crate::rule::RouteRule;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rosey_bus::{handler, Bus, BusError, SubscriptionId};
use rosey_core::{Envelope, PluginId, Subject};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Source tag on router-emitted envelopes.
const SOURCE: &str = "router";

/// Router errors
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid route rule: {0}")]
    RuleInvalid(String),

    #[error("duplicate route rule id: {0}")]
    DuplicateRule(String),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

/// Resolves a command prefix to the plugin claiming it (the registry's
/// command index, behind a seam so the router does not depend on the
/// manager).
pub trait CommandResolver: Send + Sync + 'static {
    fn resolve(&self, prefix: &str) -> Option<PluginId>;
}

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Exactly one command envelope went out on this subject.
    Dispatched { destination: String },
    /// No rule or index entry matched; one `command.unhandled` event went out.
    Unhandled,
    /// The envelope was ordinary chat, not a command.
    NotACommand,
}

/// Routes platform commands to plugin subjects.
#[derive(Clone)]
pub struct CommandRouter {
    bus: Arc<dyn Bus>,
    resolver: Option<Arc<dyn CommandResolver>>,
    rules: Arc<Mutex<IndexMap<String, RouteRule>>>,
    subs: Arc<Mutex<Vec<SubscriptionId>>>,
}

impl CommandRouter {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self {
            bus,
            resolver: None,
            rules: Arc::new(Mutex::new(IndexMap::new())),
            subs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Attach the registry's command index.
    pub fn with_resolver(mut self, resolver: Arc<dyn CommandResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Add an explicit rule. Insertion order breaks priority ties.
    pub fn add_rule(&self, rule: RouteRule) -> Result<(), RouterError> {
        let mut rules = self.rules.lock();
        if rules.contains_key(&rule.id) {
            return Err(RouterError::DuplicateRule(rule.id));
        }
        rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        // shift-remove keeps the insertion order of the survivors
        self.rules.lock().shift_remove(id).is_some()
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.rules.lock().get_mut(id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn rules(&self) -> Vec<RouteRule> {
        self.rules.lock().values().cloned().collect()
    }

    /// Subscribe to the platform subjects and route everything inbound.
    pub async fn bind(&self) -> Result<(), RouterError> {
        for pattern in ["rosey.platform.*.message", "rosey.platform.*.command"] {
            let router = self.clone();
            let sub = self
                .bus
                .subscribe(
                    pattern,
                    handler(move |envelope| {
                        let router = router.clone();
                        async move {
                            router.handle(envelope).await;
                        }
                    }),
                )
                .await?;
            self.subs.lock().push(sub);
        }
        Ok(())
    }

    /// Cancel the platform subscriptions.
    pub async fn unbind(&self) {
        let subs: Vec<SubscriptionId> = self.subs.lock().drain(..).collect();
        for sub in subs {
            let _ = self.bus.unsubscribe(sub).await;
        }
    }

    /// Route one envelope.
    ///
    /// Emits exactly one command envelope when something matches, or
    /// exactly one `command.unhandled` event when nothing does.
    pub async fn dispatch(&self, envelope: &Envelope) -> Result<DispatchOutcome, RouterError> {
        let Some(invocation) = CommandInvocation::from_envelope(envelope) else {
            return Ok(DispatchOutcome::NotACommand);
        };

        // explicit rules first: descending priority, stable within a priority
        let mut ordered: Vec<RouteRule> = self.rules.lock().values().cloned().collect();
        ordered.sort_by_key(|rule| std::cmp::Reverse(rule.priority));

        for rule in ordered.iter().filter(|r| r.enabled) {
            if rule.matches(&envelope.subject, &invocation) {
                let destination = rule.destination_for(&invocation);
                debug!(rule = %rule.id, destination = %destination, "rule matched");
                self.forward(envelope, &invocation, &destination).await?;
                return Ok(DispatchOutcome::Dispatched { destination });
            }
        }

        // then the registry's command index
        if let Some(plugin) = self
            .resolver
            .as_ref()
            .and_then(|r| r.resolve(&invocation.prefix))
        {
            let destination = Subject::command(plugin.as_str(), "execute").to_string();
            debug!(plugin = %plugin, destination = %destination, "index matched");
            self.forward(envelope, &invocation, &destination).await?;
            return Ok(DispatchOutcome::Dispatched { destination });
        }

        debug!(prefix = %invocation.prefix, "command unhandled");
        self.bus
            .publish(
                Envelope::new(
                    "rosey.events.command.unhandled",
                    "command.unhandled",
                    SOURCE,
                )
                .with_correlation_id(envelope.correlation_id.clone())
                .with_data("command", json!(invocation.prefix))
                .with_data("channel", json!(invocation.channel))
                .with_data("user", json!(invocation.user))
                .with_data("platform", json!(invocation.platform)),
            )
            .await?;
        Ok(DispatchOutcome::Unhandled)
    }

    /// Handler entry point: route, and report failures instead of raising.
    async fn handle(&self, envelope: Envelope) {
        if let Err(e) = self.dispatch(&envelope).await {
            warn!(subject = %envelope.subject, error = %e, "dispatch failed");
            self.report_error(&envelope, &e.to_string()).await;
        }
    }

    async fn forward(
        &self,
        envelope: &Envelope,
        invocation: &CommandInvocation,
        destination: &str,
    ) -> Result<(), RouterError> {
        let mut out = Envelope::new(destination, "command", SOURCE)
            .with_correlation_id(envelope.correlation_id.clone())
            .with_priority(envelope.priority)
            .with_data("command", json!(invocation.prefix))
            .with_data("args", json!(invocation.args))
            .with_data("channel", json!(invocation.channel))
            .with_data("user", json!(invocation.user))
            .with_data("platform", json!(invocation.platform));

        // a requested reply inbox travels with the dispatch
        if let Some(reply_to) = envelope.reply_to() {
            out.metadata
                .insert("reply_to".to_string(), Value::String(reply_to.to_string()));
        }

        self.bus.publish(out).await?;
        Ok(())
    }

    /// Failure reporting: a structured reply when an inbox was given,
    /// always a `command.error` event.
    async fn report_error(&self, envelope: &Envelope, reason: &str) {
        let event = Envelope::new("rosey.events.command.error", "command.error", SOURCE)
            .with_correlation_id(envelope.correlation_id.clone())
            .with_data("error", json!(reason))
            .with_data("subject", json!(envelope.subject));
        if let Err(e) = self.bus.publish(event).await {
            warn!(error = %e, "could not publish command.error");
        }

        if envelope.reply_to().is_some() {
            let mut data = Map::new();
            data.insert("success".to_string(), Value::Bool(false));
            data.insert("error".to_string(), Value::String(reason.to_string()));
            if let Err(e) = self.bus.reply(envelope, data).await {
                warn!(error = %e, "could not deliver error reply");
            }
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
