// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path access policy for `file.*` permission checks.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether a rule grants or denies access under its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PolicyRule {
    root: PathBuf,
    mode: AccessMode,
}

/// An ordered list of absolute path roots, each tagged allow or deny.
///
/// A path is accessible iff the longest-prefix match is an allow rule; a
/// path with no matching rule is denied. Immutable after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAccessPolicy {
    rules: Vec<PolicyRule>,
}

impl FileAccessPolicy {
    pub fn builder() -> FileAccessPolicyBuilder {
        FileAccessPolicyBuilder { rules: Vec::new() }
    }

    /// Policy with no rules: every path is denied.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Evaluate a path by longest-prefix match.
    ///
    /// A tie at equal prefix length (duplicate roots) prefers an explicit
    /// allow.
    pub fn allows(&self, path: &Path) -> bool {
        let mut best_len = 0usize;
        let mut best: Option<AccessMode> = None;

        for rule in &self.rules {
            if !path.starts_with(&rule.root) {
                continue;
            }
            let len = rule.root.components().count();
            if len > best_len {
                best_len = len;
                best = Some(rule.mode);
            } else if len == best_len && rule.mode == AccessMode::Allow {
                best = Some(AccessMode::Allow);
            }
        }

        best == Some(AccessMode::Allow)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Builder for [`FileAccessPolicy`]; consumed by `build` so the finished
/// policy cannot gain rules afterwards.
#[derive(Debug, Clone)]
pub struct FileAccessPolicyBuilder {
    rules: Vec<PolicyRule>,
}

impl FileAccessPolicyBuilder {
    pub fn allow(mut self, root: impl Into<PathBuf>) -> Self {
        self.rules.push(PolicyRule {
            root: root.into(),
            mode: AccessMode::Allow,
        });
        self
    }

    pub fn deny(mut self, root: impl Into<PathBuf>) -> Self {
        self.rules.push(PolicyRule {
            root: root.into(),
            mode: AccessMode::Deny,
        });
        self
    }

    pub fn rule(mut self, root: impl Into<PathBuf>, mode: AccessMode) -> Self {
        self.rules.push(PolicyRule {
            root: root.into(),
            mode,
        });
        self
    }

    pub fn build(self) -> FileAccessPolicy {
        FileAccessPolicy { rules: self.rules }
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
