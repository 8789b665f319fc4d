// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a supervised plugin.
///
/// ```text
/// UNLOADED → LOADED → STARTING → RUNNING → STOPPING → STOPPED
///                        │           │
///                        ▼           ▼
///                      FAILED ←── CRASHED → STARTING (restart)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Unloaded,
    Loaded,
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
    Failed,
}

impl PluginState {
    /// Whether `next` is a legal transition from this state.
    pub fn can_transition(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Unloaded, Loaded)
                | (Loaded, Starting)
                | (Loaded, Unloaded)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Crashed)
                | (Stopping, Stopped)
                | (Stopped, Starting)
                | (Stopped, Unloaded)
                | (Crashed, Starting)
                | (Crashed, Failed)
                | (Failed, Unloaded)
        )
    }

    /// States in which the supervisor's `pid` refers to a live process.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            PluginState::Starting | PluginState::Running | PluginState::Stopping
        )
    }

    /// States from which the plugin may be unloaded.
    pub fn can_unload(self) -> bool {
        matches!(
            self,
            PluginState::Loaded | PluginState::Stopped | PluginState::Failed
        )
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginState::Unloaded => "unloaded",
            PluginState::Loaded => "loaded",
            PluginState::Starting => "starting",
            PluginState::Running => "running",
            PluginState::Stopping => "stopping",
            PluginState::Stopped => "stopped",
            PluginState::Crashed => "crashed",
            PluginState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
