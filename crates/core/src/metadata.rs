// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin metadata.

use crate::id::PluginId;
use crate::limits::{ResourceLimits, RestartConfig};
use crate::permission::PluginPermissions;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the orchestrator knows about a plugin before it runs.
///
/// Plugins are independent executables speaking the bus protocol; the
/// binding between a plugin id and its executable lives here.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub id: PluginId,
    pub executable: PathBuf,
    /// Extra argv before the orchestrator-appended identity flags.
    pub args: Vec<String>,
    /// Command prefixes this plugin claims (for the router's index).
    pub command_prefixes: Vec<String>,
    pub version: String,
    pub permissions: PluginPermissions,
    pub resources: ResourceLimits,
    pub restart: RestartConfig,
    /// How long the plugin has to publish on `plugins.<id>.ready`.
    pub readiness_timeout: Duration,
    /// How long a polite shutdown may take before the child is killed.
    pub graceful_timeout: Duration,
}

impl PluginMetadata {
    pub fn new(id: impl Into<PluginId>, executable: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            permissions: PluginPermissions::new(
                id.clone(),
                crate::permission::PermissionProfile::Minimal.permissions(),
            ),
            id,
            executable: executable.into(),
            args: Vec::new(),
            command_prefixes: Vec::new(),
            version: "0.0.0".to_string(),
            resources: ResourceLimits::default(),
            restart: RestartConfig::default(),
            readiness_timeout: Duration::from_secs(10),
            graceful_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_command_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.command_prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_permissions(mut self, permissions: PluginPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_restart(mut self, restart: RestartConfig) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_resources(mut self, resources: ResourceLimits) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout = timeout;
        self
    }
}
