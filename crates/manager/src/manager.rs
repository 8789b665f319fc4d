// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin manager: lifecycle operations over the registry.

use crate::registry::{Registry, RegistryEntry, RegistryError};
use rosey_bus::Bus;
use rosey_core::{Clock, PluginId, PluginMetadata, PluginState};
use rosey_supervisor::{
    PluginSupervisor, ProcessAdapter, ResourceSampler, SupervisorError,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("plugin {id} cannot be unloaded while {state}")]
    NotUnloadable { id: PluginId, state: PluginState },
}

/// Point-in-time status of one plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    pub id: PluginId,
    pub state: PluginState,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub uptime_secs: Option<f64>,
    pub version: String,
}

/// Central orchestrator for the plugin set.
///
/// Owns the registry; each loaded plugin gets its own supervisor, which in
/// turn owns the process and its monitor. Lifecycle events reach external
/// observers through the bus subjects the supervisor publishes on.
pub struct PluginManager<P: ProcessAdapter, S: ResourceSampler, C: Clock> {
    bus: Arc<dyn Bus>,
    bus_endpoint: String,
    processes: P,
    sampler: S,
    clock: C,
    registry: Registry<P, S, C>,
}

impl<P: ProcessAdapter, S: ResourceSampler, C: Clock> PluginManager<P, S, C> {
    pub fn new(
        bus: Arc<dyn Bus>,
        bus_endpoint: impl Into<String>,
        processes: P,
        sampler: S,
        clock: C,
    ) -> Self {
        Self {
            bus,
            bus_endpoint: bus_endpoint.into(),
            processes,
            sampler,
            clock,
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> &Registry<P, S, C> {
        &self.registry
    }

    /// Register a plugin and move it to LOADED.
    pub async fn load(&self, metadata: PluginMetadata) -> Result<(), ManagerError> {
        let id = metadata.id.clone();
        let permissions = metadata.permissions.clone();
        info!(
            plugin = %id,
            version = %metadata.version,
            permissions = ?permissions.summary(),
            "loading plugin"
        );

        let supervisor = PluginSupervisor::new(
            metadata,
            Arc::clone(&self.bus),
            self.bus_endpoint.clone(),
            self.processes.clone(),
            self.sampler.clone(),
            self.clock.clone(),
        );

        self.registry.insert(RegistryEntry {
            supervisor: supervisor.clone(),
            permissions,
        })?;
        supervisor.mark_loaded().await?;
        Ok(())
    }

    /// Unregister a plugin. Only legal from LOADED, STOPPED, or FAILED.
    pub async fn unload(&self, id: &PluginId) -> Result<(), ManagerError> {
        let entry = self.entry(id)?;
        let state = entry.supervisor.state();
        if !state.can_unload() {
            return Err(ManagerError::NotUnloadable {
                id: id.clone(),
                state,
            });
        }
        entry.supervisor.mark_unloaded().await?;
        self.registry.remove(id)?;
        info!(plugin = %id, "plugin unloaded");
        Ok(())
    }

    pub async fn start(&self, id: &PluginId) -> Result<(), ManagerError> {
        let entry = self.entry(id)?;
        entry.supervisor.start().await?;
        Ok(())
    }

    /// Returns `true` iff the plugin stopped gracefully.
    pub async fn stop(&self, id: &PluginId) -> Result<bool, ManagerError> {
        let entry = self.entry(id)?;
        Ok(entry.supervisor.stop().await?)
    }

    pub async fn restart(&self, id: &PluginId) -> Result<(), ManagerError> {
        let entry = self.entry(id)?;
        entry.supervisor.restart().await?;
        Ok(())
    }

    /// Start every loaded plugin, collecting per-plugin failures.
    pub async fn start_all(&self) -> Vec<(PluginId, ManagerError)> {
        let mut failures = Vec::new();
        for id in self.registry.ids() {
            if let Err(e) = self.start(&id).await {
                failures.push((id, e));
            }
        }
        failures
    }

    /// Stop every running plugin, in reverse load order.
    pub async fn stop_all(&self) {
        for id in self.registry.ids().into_iter().rev() {
            if let Some(entry) = self.registry.get(&id) {
                if entry.supervisor.state() == PluginState::Running {
                    let _ = entry.supervisor.stop().await;
                }
            }
        }
    }

    pub fn get(&self, id: &PluginId) -> Result<PluginStatus, ManagerError> {
        let entry = self.entry(id)?;
        Ok(Self::status_of(&entry))
    }

    /// Status of every known plugin, sorted by id.
    pub fn list(&self) -> Vec<PluginStatus> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.get(&id))
            .map(|entry| Self::status_of(&entry))
            .collect()
    }

    /// Plugin claiming a command prefix.
    pub fn for_command(&self, prefix: &str) -> Option<PluginId> {
        self.registry.for_command(prefix)
    }

    fn entry(&self, id: &PluginId) -> Result<RegistryEntry<P, S, C>, ManagerError> {
        self.registry
            .get(id)
            .ok_or_else(|| RegistryError::PluginUnknown(id.clone()).into())
    }

    fn status_of(entry: &RegistryEntry<P, S, C>) -> PluginStatus {
        let supervisor = &entry.supervisor;
        PluginStatus {
            id: supervisor.plugin_id().clone(),
            state: supervisor.state(),
            pid: supervisor.pid(),
            restart_count: supervisor.restart_count(),
            uptime_secs: supervisor.uptime().map(|d| d.as_secs_f64()),
            version: supervisor.metadata().version.clone(),
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
