// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration (TOML).
//!
//! Durations are plain seconds on disk; unknown keys are rejected so typos
//! surface at startup instead of silently defaulting.

use rosey_bus::BusConfig;
use rosey_core::{
    FileAccessPolicy, Permission, PermissionError, PermissionProfile, PluginId, PluginMetadata,
    PluginPermissions, ResourceLimits, RestartConfig, RestartPolicy,
};
use rosey_memory::MemoryConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("plugin {plugin}: {reason}")]
    Plugin { plugin: String, reason: String },
}

/// Top-level daemon configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoseyConfig {
    pub bus: BusSection,
    pub memory: MemorySection,
    /// Lock and log files live here.
    pub state_dir: Option<PathBuf>,
    #[serde(rename = "plugin")]
    pub plugins: Vec<PluginSection>,
}

impl RoseyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".rosey"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir().join("roseyd.log")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("roseyd.lock")
    }

    /// Resolve every `[[plugin]]` table into metadata, failing fast on the
    /// first bad one.
    pub fn plugin_metadata(&self) -> Result<Vec<PluginMetadata>, ConfigError> {
        self.plugins.iter().map(|p| p.to_metadata()).collect()
    }
}

/// `[bus]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSection {
    pub servers: Vec<String>,
    pub name: String,
    pub max_reconnect_attempts: usize,
    pub reconnect_wait_secs: f64,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "rosey-bot".to_string(),
            max_reconnect_attempts: 60,
            reconnect_wait_secs: 2.0,
        }
    }
}

impl BusSection {
    pub fn to_bus_config(&self) -> BusConfig {
        BusConfig {
            servers: self.servers.clone(),
            name: self.name.clone(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_wait: Duration::from_secs_f64(self.reconnect_wait_secs),
        }
    }
}

/// `[memory]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemorySection {
    pub context_size: usize,
    pub max_memories: usize,
    pub bucket: String,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            context_size: 20,
            max_memories: 50,
            bucket: "rosey_memory".to_string(),
        }
    }
}

impl MemorySection {
    pub fn to_config(&self) -> MemoryConfig {
        MemoryConfig {
            context_size: self.context_size,
            max_memories_per_channel: self.max_memories,
        }
    }
}

/// `[[plugin]]`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSection {
    pub id: String,
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub command_prefixes: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_readiness_secs")]
    pub readiness_timeout_secs: f64,
    #[serde(default = "default_graceful_secs")]
    pub graceful_timeout_secs: f64,
    #[serde(default)]
    pub restart: RestartSection,
    #[serde(default)]
    pub resources: ResourceSection,
    #[serde(default)]
    pub permissions: PermissionsSection,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_readiness_secs() -> f64 {
    10.0
}

fn default_graceful_secs() -> f64 {
    5.0
}

impl PluginSection {
    pub fn to_metadata(&self) -> Result<PluginMetadata, ConfigError> {
        let id = PluginId::new(&self.id);
        let permissions = self.permissions.to_permissions(&id)?;

        let mut metadata = PluginMetadata::new(id, &self.executable)
            .with_permissions(permissions)
            .with_restart(self.restart.to_config(&self.id)?)
            .with_resources(self.resources.to_limits())
            .with_readiness_timeout(Duration::from_secs_f64(self.readiness_timeout_secs))
            .with_graceful_timeout(Duration::from_secs_f64(self.graceful_timeout_secs));
        metadata.args = self.args.clone();
        metadata.command_prefixes = self.command_prefixes.clone();
        metadata.version = self.version.clone();
        Ok(metadata)
    }
}

/// `[plugin.restart]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestartSection {
    pub policy: String,
    pub max_restarts: u32,
    pub window_secs: f64,
    pub initial_backoff_secs: f64,
    pub multiplier: f64,
    pub max_backoff_secs: f64,
}

impl Default for RestartSection {
    fn default() -> Self {
        Self {
            policy: "on_failure".to_string(),
            max_restarts: 3,
            window_secs: 60.0,
            initial_backoff_secs: 1.0,
            multiplier: 2.0,
            max_backoff_secs: 30.0,
        }
    }
}

impl RestartSection {
    fn to_config(&self, plugin: &str) -> Result<RestartConfig, ConfigError> {
        let policy: RestartPolicy =
            self.policy.parse().map_err(|reason| ConfigError::Plugin {
                plugin: plugin.to_string(),
                reason,
            })?;
        Ok(RestartConfig {
            policy,
            max_restarts: self.max_restarts,
            window: Duration::from_secs_f64(self.window_secs),
            initial_backoff: Duration::from_secs_f64(self.initial_backoff_secs),
            backoff_multiplier: self.multiplier,
            max_backoff: Duration::from_secs_f64(self.max_backoff_secs),
        })
    }
}

/// `[plugin.resources]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceSection {
    pub max_rss_mb: u64,
    pub max_cpu_percent: f64,
    pub max_handles: u64,
    pub sample_interval_secs: f64,
}

impl Default for ResourceSection {
    fn default() -> Self {
        Self {
            max_rss_mb: 256,
            max_cpu_percent: 50.0,
            max_handles: 256,
            sample_interval_secs: 5.0,
        }
    }
}

impl ResourceSection {
    fn to_limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_rss_bytes: self.max_rss_mb * 1024 * 1024,
            max_cpu_percent: self.max_cpu_percent,
            max_open_handles: self.max_handles,
            sample_interval: Duration::from_secs_f64(self.sample_interval_secs),
        }
    }
}

/// `[plugin.permissions]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionsSection {
    pub profile: String,
    pub grant: Vec<String>,
    pub deny: Vec<String>,
    pub file_policy: Vec<FileRule>,
    pub allowed_hosts: Option<Vec<String>>,
    pub allowed_commands: Option<Vec<String>>,
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            profile: "standard".to_string(),
            grant: Vec::new(),
            deny: Vec::new(),
            file_policy: Vec::new(),
            allowed_hosts: None,
            allowed_commands: None,
        }
    }
}

/// One `{ path, mode }` entry under `file_policy`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRule {
    pub path: PathBuf,
    pub mode: String,
}

impl PermissionsSection {
    fn to_permissions(&self, id: &PluginId) -> Result<PluginPermissions, ConfigError> {
        let profile: PermissionProfile = self.profile.parse()?;
        let grants = parse_permissions(&self.grant)?;
        let denies = parse_permissions(&self.deny)?;

        let mut builder = FileAccessPolicy::builder();
        for rule in &self.file_policy {
            builder = match rule.mode.as_str() {
                "allow" => builder.allow(&rule.path),
                "deny" => builder.deny(&rule.path),
                other => {
                    return Err(ConfigError::Plugin {
                        plugin: id.to_string(),
                        reason: format!("unknown file policy mode: {other}"),
                    })
                }
            };
        }

        let mut permissions =
            PluginPermissions::create_restricted(id.clone(), profile, &grants, &denies)
                .with_file_policy(builder.build());
        if let Some(hosts) = &self.allowed_hosts {
            permissions = permissions.with_allowed_hosts(hosts.clone());
        }
        if let Some(commands) = &self.allowed_commands {
            permissions = permissions.with_allowed_commands(commands.clone());
        }
        Ok(permissions)
    }
}

fn parse_permissions(names: &[String]) -> Result<Vec<Permission>, ConfigError> {
    names
        .iter()
        .map(|name| name.parse().map_err(ConfigError::Permission))
        .collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
