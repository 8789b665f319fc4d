// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability model for plugins.
//!
//! Permissions are drawn from a closed set and granted per plugin, either
//! directly or through a pre-defined profile. Checks never mutate state and
//! a denial is fatal to the attempted operation (never retried).

use crate::id::PluginId;
use crate::policy::FileAccessPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// A named capability.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Permission {
    #[serde(rename = "file.read")]
    FileRead,
    #[serde(rename = "file.write")]
    FileWrite,
    #[serde(rename = "net.http")]
    NetHttp,
    #[serde(rename = "net.socket")]
    NetSocket,
    #[serde(rename = "db.read")]
    DbRead,
    #[serde(rename = "db.write")]
    DbWrite,
    #[serde(rename = "cmd.execute")]
    CmdExecute,
    #[serde(rename = "plugin.spawn")]
    PluginSpawn,
    #[serde(rename = "config.read")]
    ConfigRead,
    #[serde(rename = "config.write")]
    ConfigWrite,
}

impl Permission {
    /// All capabilities, in canonical order.
    pub const ALL: [Permission; 10] = [
        Permission::FileRead,
        Permission::FileWrite,
        Permission::NetHttp,
        Permission::NetSocket,
        Permission::DbRead,
        Permission::DbWrite,
        Permission::CmdExecute,
        Permission::PluginSpawn,
        Permission::ConfigRead,
        Permission::ConfigWrite,
    ];

    /// Canonical wire name (`file.read`, `cmd.execute`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Permission::FileRead => "file.read",
            Permission::FileWrite => "file.write",
            Permission::NetHttp => "net.http",
            Permission::NetSocket => "net.socket",
            Permission::DbRead => "db.read",
            Permission::DbWrite => "db.write",
            Permission::CmdExecute => "cmd.execute",
            Permission::PluginSpawn => "plugin.spawn",
            Permission::ConfigRead => "config.read",
            Permission::ConfigWrite => "config.write",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .find(|p| p.name() == s)
            .copied()
            .ok_or_else(|| PermissionError::UnknownPermission(s.to_string()))
    }
}

/// An ordered set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(Permission::ALL.into_iter().collect())
    }

    pub fn grant(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    pub fn revoke(&mut self, permission: Permission) {
        self.0.remove(&permission);
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Pre-defined permission sets.
///
/// Profiles are constants; composing on top of one (see
/// [`PluginPermissions::create_restricted`]) produces a new set and never
/// mutates the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionProfile {
    /// Basic execution only.
    Minimal,
    /// Minimal + file.read + net.http.
    Standard,
    /// Standard + file.write + db.read.
    Extended,
    /// All permissions.
    Admin,
}

impl PermissionProfile {
    pub fn permissions(&self) -> PermissionSet {
        match self {
            PermissionProfile::Minimal => [Permission::CmdExecute].into_iter().collect(),
            PermissionProfile::Standard => {
                [Permission::CmdExecute, Permission::FileRead, Permission::NetHttp]
                    .into_iter()
                    .collect()
            }
            PermissionProfile::Extended => [
                Permission::CmdExecute,
                Permission::FileRead,
                Permission::NetHttp,
                Permission::FileWrite,
                Permission::DbRead,
            ]
            .into_iter()
            .collect(),
            PermissionProfile::Admin => PermissionSet::all(),
        }
    }
}

impl FromStr for PermissionProfile {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(PermissionProfile::Minimal),
            "standard" => Ok(PermissionProfile::Standard),
            "extended" => Ok(PermissionProfile::Extended),
            "admin" => Ok(PermissionProfile::Admin),
            other => Err(PermissionError::UnknownProfile(other.to_string())),
        }
    }
}

impl fmt::Display for PermissionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionProfile::Minimal => "minimal",
            PermissionProfile::Standard => "standard",
            PermissionProfile::Extended => "extended",
            PermissionProfile::Admin => "admin",
        };
        write!(f, "{name}")
    }
}

/// Context for a permission check.
#[derive(Debug, Clone, Copy)]
pub enum AccessContext<'a> {
    /// Path for `file.*` checks.
    Path(&'a Path),
    /// Host for `net.*` checks.
    Host(&'a str),
    /// Command for `cmd.execute` checks.
    Command(&'a str),
}

impl fmt::Display for AccessContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessContext::Path(p) => write!(f, "path {}", p.display()),
            AccessContext::Host(h) => write!(f, "host {h}"),
            AccessContext::Command(c) => write!(f, "command {c}"),
        }
    }
}

/// Permission errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("permission denied: {plugin} lacks {permission}{}", context.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Denied {
        plugin: PluginId,
        permission: Permission,
        context: Option<String>,
    },

    #[error("path not allowed for {plugin}: {}", path.display())]
    PathNotAllowed { plugin: PluginId, path: PathBuf },

    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    #[error("unknown permission profile: {0}")]
    UnknownProfile(String),
}

/// The permissions granted to one plugin.
#[derive(Debug, Clone)]
pub struct PluginPermissions {
    plugin_id: PluginId,
    granted: PermissionSet,
    file_policy: FileAccessPolicy,
    allowed_hosts: Option<Vec<String>>,
    allowed_commands: Option<Vec<String>>,
}

impl PluginPermissions {
    pub fn new(plugin_id: PluginId, granted: PermissionSet) -> Self {
        Self {
            plugin_id,
            granted,
            file_policy: FileAccessPolicy::deny_all(),
            allowed_hosts: None,
            allowed_commands: None,
        }
    }

    /// Compose a set from a profile plus per-plugin grants and denies.
    pub fn create_restricted(
        plugin_id: PluginId,
        profile: PermissionProfile,
        extra_grants: &[Permission],
        denies: &[Permission],
    ) -> Self {
        let mut granted = profile.permissions();
        for p in extra_grants {
            granted.grant(*p);
        }
        for p in denies {
            granted.revoke(*p);
        }
        Self::new(plugin_id, granted)
    }

    /// Attach a file-access policy. The policy is immutable once attached.
    pub fn with_file_policy(mut self, policy: FileAccessPolicy) -> Self {
        self.file_policy = policy;
        self
    }

    /// Restrict `net.*` to a host allowlist. `None` means any host.
    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = Some(hosts);
        self
    }

    /// Restrict `cmd.execute` to a command allowlist. `None` means any.
    pub fn with_allowed_commands(mut self, commands: Vec<String>) -> Self {
        self.allowed_commands = Some(commands);
        self
    }

    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    pub fn granted(&self) -> &PermissionSet {
        &self.granted
    }

    pub fn file_policy(&self) -> &FileAccessPolicy {
        &self.file_policy
    }

    /// Check a capability, optionally against a context.
    pub fn check(
        &self,
        permission: Permission,
        context: Option<AccessContext<'_>>,
    ) -> Result<(), PermissionError> {
        if !self.granted.contains(permission) {
            return Err(PermissionError::Denied {
                plugin: self.plugin_id.clone(),
                permission,
                context: context.map(|c| c.to_string()),
            });
        }

        match (permission, context) {
            (Permission::FileRead | Permission::FileWrite, Some(AccessContext::Path(path))) => {
                if !self.file_policy.allows(path) {
                    return Err(PermissionError::PathNotAllowed {
                        plugin: self.plugin_id.clone(),
                        path: path.to_path_buf(),
                    });
                }
            }
            (Permission::NetHttp | Permission::NetSocket, Some(AccessContext::Host(host))) => {
                if let Some(hosts) = &self.allowed_hosts {
                    if !hosts.iter().any(|h| h == host) {
                        return Err(PermissionError::Denied {
                            plugin: self.plugin_id.clone(),
                            permission,
                            context: Some(format!("host {host}")),
                        });
                    }
                }
            }
            (Permission::CmdExecute, Some(AccessContext::Command(cmd))) => {
                if let Some(commands) = &self.allowed_commands {
                    if !commands.iter().any(|c| c == cmd) {
                        return Err(PermissionError::Denied {
                            plugin: self.plugin_id.clone(),
                            permission,
                            context: Some(format!("command {cmd}")),
                        });
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Stable, sorted listing of granted permissions for logging.
    pub fn summary(&self) -> Vec<String> {
        let mut names: Vec<String> = self.granted.iter().map(|p| p.name().to_string()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "permission_tests.rs"]
mod tests;
