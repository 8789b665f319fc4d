// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource limits and restart policy configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Whether and when a crashed plugin is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Never restart; a crash goes straight to FAILED.
    Never,
    /// Restart on abnormal exit; a zero exit maps to STOPPED.
    OnFailure,
    /// Restart on any exit.
    Always,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::OnFailure
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(RestartPolicy::Never),
            "on_failure" => Ok(RestartPolicy::OnFailure),
            "always" => Ok(RestartPolicy::Always),
            other => Err(format!("unknown restart policy: {other}")),
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestartPolicy::Never => "never",
            RestartPolicy::OnFailure => "on_failure",
            RestartPolicy::Always => "always",
        };
        write!(f, "{name}")
    }
}

/// Restart behavior for one plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartConfig {
    pub policy: RestartPolicy,
    /// Attempts tolerated within `window` before the circuit opens.
    pub max_restarts: u32,
    pub window: Duration,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            policy: RestartPolicy::OnFailure,
            max_restarts: 3,
            window: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Resource ceilings enforced by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    pub max_rss_bytes: u64,
    /// Averaged over the monitor's sampling window.
    pub max_cpu_percent: f64,
    pub max_open_handles: u64,
    pub sample_interval: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_rss_bytes: 256 * 1024 * 1024,
            max_cpu_percent: 50.0,
            max_open_handles: 256,
            sample_interval: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
#[path = "limits_tests.rs"]
mod tests;
