// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route rules: pattern → destination subject, with priorities.

use crate::command::CommandInvocation;
use rosey_core::subject;
use std::fmt;

/// How a rule's pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Pattern equals the normalized command prefix.
    Exact,
    /// Normalized command prefix starts with the pattern.
    Prefix,
    /// Compiled regex applied to the raw command text.
    Regex,
    /// Subject wildcard pattern applied to the envelope subject.
    Wildcard,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Regex => "regex",
            MatchType::Wildcard => "wildcard",
        };
        write!(f, "{name}")
    }
}

/// One routing rule.
///
/// Destination templates substitute `{prefix}`, `{args}`, `{channel}`,
/// `{user}`, `{platform}`, and (for regex rules) `{1}`..`{n}` capture
/// groups from the raw text.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub id: String,
    /// Higher wins; ties go to insertion order.
    pub priority: i32,
    pub pattern: String,
    pub match_type: MatchType,
    pub destination: String,
    pub enabled: bool,
    compiled: Option<regex::Regex>,
}

impl RouteRule {
    pub fn new(
        id: impl Into<String>,
        priority: i32,
        pattern: impl Into<String>,
        match_type: MatchType,
        destination: impl Into<String>,
    ) -> Result<Self, crate::RouterError> {
        let pattern = pattern.into();
        let compiled = match match_type {
            MatchType::Regex => Some(
                regex::Regex::new(&pattern)
                    .map_err(|e| crate::RouterError::RuleInvalid(e.to_string()))?,
            ),
            _ => None,
        };
        Ok(Self {
            id: id.into(),
            priority,
            pattern,
            match_type,
            destination: destination.into(),
            enabled: true,
            compiled,
        })
    }

    /// Evaluate this rule against an envelope subject and its invocation.
    pub fn matches(&self, envelope_subject: &str, invocation: &CommandInvocation) -> bool {
        match self.match_type {
            MatchType::Exact => invocation.prefix == self.pattern,
            MatchType::Prefix => invocation.prefix.starts_with(&self.pattern),
            MatchType::Regex => self
                .compiled
                .as_ref()
                .is_some_and(|re| re.is_match(&invocation.raw)),
            MatchType::Wildcard => subject::matches_pattern(envelope_subject, &self.pattern),
        }
    }

    /// Destination subject with substitutions applied.
    pub fn destination_for(&self, invocation: &CommandInvocation) -> String {
        let mut destination = self
            .destination
            .replace("{prefix}", &invocation.prefix)
            .replace("{args}", &invocation.args)
            .replace("{channel}", &invocation.channel)
            .replace("{user}", &invocation.user)
            .replace("{platform}", &invocation.platform);

        if let Some(re) = &self.compiled {
            if let Some(captures) = re.captures(&invocation.raw) {
                for i in 1..captures.len() {
                    let placeholder = format!("{{{i}}}");
                    let value = captures.get(i).map(|m| m.as_str()).unwrap_or_default();
                    destination = destination.replace(&placeholder, value);
                }
            }
        }
        destination
    }
}

#[cfg(test)]
#[path = "rule_tests.rs"]
mod tests;
