// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subject hierarchy for the message bus.
//!
//! Every subject is a dot-separated token sequence rooted at `rosey`:
//!
//! ```text
//! rosey.platform.<platform>.<event>
//! rosey.events.<event>
//! rosey.commands.<plugin>.<action>
//! rosey.plugins.<plugin>.<event>
//! rosey.monitoring.<metric>
//! rosey.security.<event>
//! rosey.db.<service>.<plugin>.<op>
//! ```
//!
//! Patterns may use `*` (exactly one token) and `>` (the remaining tokens,
//! terminal position only), with NATS matching semantics.

use crate::id::PluginId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Root token every subject starts with.
pub const BASE: &str = "rosey";

/// Category roots.
pub const PLATFORM: &str = "rosey.platform";
pub const EVENTS: &str = "rosey.events";
pub const COMMANDS: &str = "rosey.commands";
pub const PLUGINS: &str = "rosey.plugins";
pub const MONITORING: &str = "rosey.monitoring";
pub const SECURITY: &str = "rosey.security";
pub const DB: &str = "rosey.db";

/// Errors from subject parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("invalid subject: {0}")]
    Invalid(String),

    #[error("subject too short: {0}")]
    TooShort(String),
}

/// A subject string (routing key) on the bus.
///
/// Construction is unchecked, like the builder in the wire protocol it
/// mirrors; call [`Subject::is_valid`] (or the free [`validate`]) at publish
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(pub String);

impl Subject {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `rosey.platform.<platform>.<event>`
    pub fn platform(platform: &str, event: &str) -> Self {
        Self(format!("{PLATFORM}.{platform}.{event}"))
    }

    /// `rosey.events.<event>`
    pub fn event(event: &str) -> Self {
        Self(format!("{EVENTS}.{event}"))
    }

    /// `rosey.commands.<plugin>.<action>`
    pub fn command(plugin: &str, action: &str) -> Self {
        Self(format!("{COMMANDS}.{plugin}.{action}"))
    }

    /// `rosey.plugins.<plugin>.<event>`
    pub fn plugin(plugin: &PluginId, event: &str) -> Self {
        Self(format!("{PLUGINS}.{plugin}.{event}"))
    }

    /// `rosey.monitoring.<metric>`
    pub fn monitoring(metric: &str) -> Self {
        Self(format!("{MONITORING}.{metric}"))
    }

    /// `rosey.security.<event>`
    pub fn security(event: &str) -> Self {
        Self(format!("{SECURITY}.{event}"))
    }

    /// Pattern covering every command subject a plugin owns:
    /// `rosey.commands.<plugin>.>`
    pub fn plugin_commands(plugin: &PluginId) -> Self {
        Self(format!("{COMMANDS}.{plugin}.>"))
    }

    /// Pattern covering every lifecycle subject a plugin owns:
    /// `rosey.plugins.<plugin>.>`
    pub fn plugin_events(plugin: &PluginId) -> Self {
        Self(format!("{PLUGINS}.{plugin}.>"))
    }

    pub fn is_valid(&self) -> bool {
        validate(&self.0)
    }

    pub fn parsed(&self) -> Result<ParsedSubject, SubjectError> {
        parse(&self.0)
    }

    pub fn matches(&self, pattern: &str) -> bool {
        matches_pattern(&self.0, pattern)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Subject> for String {
    fn from(s: Subject) -> String {
        s.0
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Structured view of a subject, by category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSubject {
    Platform { platform: String, event: String },
    Events { event: String },
    Commands { plugin: String, action: String },
    Plugins { plugin: String, event: String },
    Monitoring { metric: String },
    Security { event: String },
    Db { service: String, plugin: String, op: String },
    Other { category: String, rest: String },
}

/// Validate a subject or pattern.
///
/// Rules: non-empty dot-separated tokens, first token `rosey`, at least two
/// tokens, `>` only in terminal position. `*` and `>` are legal tokens, so
/// patterns validate with the same function.
pub fn validate(subject: &str) -> bool {
    let tokens: Vec<&str> = subject.split('.').collect();
    if tokens.len() < 2 || tokens[0] != BASE {
        return false;
    }
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return false;
        }
        if *token == ">" && i + 1 != tokens.len() {
            return false;
        }
    }
    true
}

/// Parse a subject into its category-specific parts.
///
/// Trailing parts keep their internal dots (`rosey.events.user.join` parses
/// to event `user.join`).
pub fn parse(subject: &str) -> Result<ParsedSubject, SubjectError> {
    if !validate(subject) {
        if subject.split('.').count() < 2 {
            return Err(SubjectError::TooShort(subject.to_string()));
        }
        return Err(SubjectError::Invalid(subject.to_string()));
    }

    let tokens: Vec<&str> = subject.split('.').collect();
    let rest = |from: usize| tokens[from..].join(".");

    let parsed = match tokens[1] {
        "platform" if tokens.len() >= 4 => ParsedSubject::Platform {
            platform: tokens[2].to_string(),
            event: rest(3),
        },
        "events" if tokens.len() >= 3 => ParsedSubject::Events { event: rest(2) },
        "commands" if tokens.len() >= 4 => ParsedSubject::Commands {
            plugin: tokens[2].to_string(),
            action: rest(3),
        },
        "plugins" if tokens.len() >= 4 => ParsedSubject::Plugins {
            plugin: tokens[2].to_string(),
            event: rest(3),
        },
        "monitoring" if tokens.len() >= 3 => ParsedSubject::Monitoring { metric: rest(2) },
        "security" if tokens.len() >= 3 => ParsedSubject::Security { event: rest(2) },
        "db" if tokens.len() >= 5 => ParsedSubject::Db {
            service: tokens[2].to_string(),
            plugin: tokens[3].to_string(),
            op: rest(4),
        },
        _ => ParsedSubject::Other {
            category: tokens[1].to_string(),
            rest: rest(2),
        },
    };
    Ok(parsed)
}

/// Match a subject against a pattern with NATS wildcard semantics.
///
/// `*` matches exactly one token. `>` matches the remaining tokens and is
/// only meaningful in terminal position; a `>` at token index *i* accepts
/// any subject of at least *i* tokens whose first *i* tokens match, so a
/// subject equal to the pattern's prefix matches too. Patterns without `>`
/// require equal token counts.
pub fn matches_pattern(subject: &str, pattern: &str) -> bool {
    let s: Vec<&str> = subject.split('.').collect();
    let p: Vec<&str> = pattern.split('.').collect();

    for (i, pt) in p.iter().enumerate() {
        if *pt == ">" {
            return i + 1 == p.len() && s.len() >= i;
        }
        match s.get(i) {
            Some(st) if *pt == "*" || pt == st => continue,
            _ => return false,
        }
    }
    s.len() == p.len()
}

/// Fluent builder for subjects.
///
/// ```
/// use rosey_core::subject::SubjectBuilder;
///
/// let subject = SubjectBuilder::new().platform("cytube").part("message").build();
/// assert_eq!(subject.as_str(), "rosey.platform.cytube.message");
/// ```
#[derive(Debug, Clone)]
pub struct SubjectBuilder {
    parts: Vec<String>,
}

impl SubjectBuilder {
    pub fn new() -> Self {
        Self {
            parts: vec![BASE.to_string()],
        }
    }

    /// Add the platform category and a platform name.
    pub fn platform(mut self, platform: &str) -> Self {
        self.parts.push("platform".to_string());
        self.parts.push(platform.to_string());
        self
    }

    /// Add the events category.
    pub fn events(mut self) -> Self {
        self.parts.push("events".to_string());
        self
    }

    /// Add the commands category, a plugin, and an action.
    pub fn command(mut self, plugin: &str, action: &str) -> Self {
        self.parts.push("commands".to_string());
        self.parts.push(plugin.to_string());
        self.parts.push(action.to_string());
        self
    }

    /// Add the plugins category and a plugin name.
    pub fn plugin(mut self, plugin: &str) -> Self {
        self.parts.push("plugins".to_string());
        self.parts.push(plugin.to_string());
        self
    }

    /// Add the monitoring category.
    pub fn monitoring(mut self) -> Self {
        self.parts.push("monitoring".to_string());
        self
    }

    /// Add the security category.
    pub fn security(mut self) -> Self {
        self.parts.push("security".to_string());
        self
    }

    /// Add an arbitrary part.
    pub fn part(mut self, part: &str) -> Self {
        self.parts.push(part.to_string());
        self
    }

    pub fn build(self) -> Subject {
        Subject(self.parts.join("."))
    }
}

impl Default for SubjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "subject_tests.rs"]
mod tests;
