// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rosey-supervisor: Per-plugin process supervision.
//!
//! A [`PluginSupervisor`] exclusively owns one child process and drives its
//! lifecycle: spawn, readiness handshake, resource monitoring, graceful
//! shutdown with a forced-kill fallback, crash detection, and restart with
//! exponential backoff behind a circuit breaker.

pub mod monitor;
pub mod process;
pub mod restart;
pub mod sampler;
mod supervisor;

pub use monitor::{Breach, Metric, MonitorConfig, ResourceMonitor};
pub use process::{
    ExitStatus, ProcessAdapter, ProcessError, ProcessHandle, SpawnSpec, TokioProcessAdapter,
};
pub use restart::{RestartDecision, RestartTracker};
pub use sampler::{ProcfsSampler, ResourceSample, ResourceSampler, SampleError};
pub use supervisor::{PluginSupervisor, SupervisorError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use process::{FakeProcessAdapter, ProcessCall, SpawnBehavior};
#[cfg(any(test, feature = "test-support"))]
pub use sampler::FakeSampler;
