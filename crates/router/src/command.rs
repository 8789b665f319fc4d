// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Normalized command extraction from platform envelopes.

use rosey_core::{subject, Envelope, ParsedSubject};

/// Command sigil stripped from the first token of chat messages.
pub const DEFAULT_SIGIL: char = '!';

/// A platform message normalized into a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// First whitespace-delimited token, sigil stripped.
    pub prefix: String,
    /// Everything after the prefix, trimmed.
    pub args: String,
    pub channel: String,
    pub user: String,
    pub platform: String,
    /// The unmodified command text.
    pub raw: String,
}

impl CommandInvocation {
    /// Extract a command from a platform envelope.
    ///
    /// Only `rosey.platform.<p>.message` and `.command` subjects qualify.
    /// Chat messages count as commands only when they carry the sigil;
    /// explicit command events always do. Returns `None` for anything else
    /// (which is ordinary chat, not an error).
    pub fn from_envelope(envelope: &Envelope) -> Option<CommandInvocation> {
        let parsed = subject::parse(&envelope.subject).ok()?;
        let ParsedSubject::Platform { platform, event } = parsed else {
            return None;
        };
        let is_command_event = match event.as_str() {
            "command" => true,
            "message" => false,
            _ => return None,
        };

        let text = ["message", "command", "text"]
            .iter()
            .find_map(|key| envelope.data.get(*key).and_then(|v| v.as_str()))?
            .trim();
        if text.is_empty() {
            return None;
        }

        let sigiled = text.starts_with(DEFAULT_SIGIL);
        if !is_command_event && !sigiled {
            return None;
        }

        let (first, rest) = match text.split_once(char::is_whitespace) {
            Some((first, rest)) => (first, rest.trim()),
            None => (text, ""),
        };
        let prefix = first.trim_start_matches(DEFAULT_SIGIL);
        if prefix.is_empty() {
            return None;
        }

        let field = |key: &str| {
            envelope
                .data
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        Some(CommandInvocation {
            prefix: prefix.to_string(),
            args: rest.to_string(),
            channel: field("channel"),
            user: field("user"),
            platform,
            raw: text.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
