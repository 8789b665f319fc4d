// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin registry and command index.

use parking_lot::RwLock;
use rosey_core::{Clock, PluginId, PluginMetadata, PluginPermissions};
use rosey_supervisor::{PluginSupervisor, ProcessAdapter, ResourceSampler};
use std::collections::HashMap;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin unknown: {0}")]
    PluginUnknown(PluginId),

    #[error("duplicate plugin: {0}")]
    DuplicatePlugin(PluginId),

    #[error("command prefix '{prefix}' already claimed by {existing}")]
    CommandPrefixConflict { prefix: String, existing: PluginId },
}

/// One known plugin.
pub struct RegistryEntry<P: ProcessAdapter, S: ResourceSampler, C: Clock> {
    pub supervisor: PluginSupervisor<P, S, C>,
    pub permissions: PluginPermissions,
}

impl<P: ProcessAdapter, S: ResourceSampler, C: Clock> RegistryEntry<P, S, C> {
    pub fn metadata(&self) -> &PluginMetadata {
        self.supervisor.metadata()
    }
}

impl<P: ProcessAdapter, S: ResourceSampler, C: Clock> Clone for RegistryEntry<P, S, C> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

impl<P: ProcessAdapter, S: ResourceSampler, C: Clock> std::fmt::Debug for RegistryEntry<P, S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("metadata", self.metadata())
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// Mapping plugin id → entry, plus the command-prefix index.
///
/// Mutations take the write lock; reads are concurrent.
pub struct Registry<P: ProcessAdapter, S: ResourceSampler, C: Clock> {
    entries: RwLock<HashMap<PluginId, RegistryEntry<P, S, C>>>,
    command_index: RwLock<HashMap<String, PluginId>>,
}

impl<P: ProcessAdapter, S: ResourceSampler, C: Clock> Registry<P, S, C> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            command_index: RwLock::new(HashMap::new()),
        }
    }

    /// Register a plugin, claiming its command prefixes.
    ///
    /// Rejected wholesale on a duplicate id or a prefix collision; a failed
    /// insert leaves the index untouched.
    pub fn insert(&self, entry: RegistryEntry<P, S, C>) -> Result<(), RegistryError> {
        let id = entry.metadata().id.clone();
        let prefixes = entry.metadata().command_prefixes.clone();

        let mut entries = self.entries.write();
        let mut index = self.command_index.write();

        if entries.contains_key(&id) {
            return Err(RegistryError::DuplicatePlugin(id));
        }
        for prefix in &prefixes {
            if let Some(existing) = index.get(prefix) {
                return Err(RegistryError::CommandPrefixConflict {
                    prefix: prefix.clone(),
                    existing: existing.clone(),
                });
            }
        }

        for prefix in prefixes {
            index.insert(prefix, id.clone());
        }
        entries.insert(id, entry);
        Ok(())
    }

    /// Remove a plugin and release its command prefixes.
    pub fn remove(&self, id: &PluginId) -> Result<RegistryEntry<P, S, C>, RegistryError> {
        let mut entries = self.entries.write();
        let mut index = self.command_index.write();

        let entry = entries
            .remove(id)
            .ok_or_else(|| RegistryError::PluginUnknown(id.clone()))?;
        index.retain(|_, owner| owner != id);
        Ok(entry)
    }

    pub fn get(&self, id: &PluginId) -> Option<RegistryEntry<P, S, C>> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &PluginId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Plugin ids, sorted.
    pub fn ids(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Plugin owning a command prefix, if any.
    pub fn for_command(&self, prefix: &str) -> Option<PluginId> {
        self.command_index.read().get(prefix).cloned()
    }
}

impl<P: ProcessAdapter, S: ResourceSampler, C: Clock> Default for Registry<P, S, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
