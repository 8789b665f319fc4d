// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource monitoring for a supervised process.
//!
//! A monitor samples its process at `sample_interval` and evaluates the
//! configured limits. A limit only counts as breached after
//! `breach_debounce` consecutive breaching samples, which filters short
//! spikes. Each breach is published on
//! `rosey.plugins.<id>.resource.exceeded` and forwarded to the supervisor.

use crate::sampler::{ResourceSample, ResourceSampler};
use rosey_bus::Bus;
use rosey_core::{Envelope, PluginId, Priority, ResourceLimits, Subject};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Which limit was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cpu,
    Rss,
    Handles,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cpu => "cpu_percent",
            Metric::Rss => "rss_bytes",
            Metric::Handles => "open_handles",
        };
        write!(f, "{name}")
    }
}

/// A debounced limit violation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breach {
    pub metric: Metric,
    pub observed: f64,
    pub limit: f64,
}

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub limits: ResourceLimits,
    /// Consecutive breaching samples before a breach is reported.
    pub breach_debounce: u32,
    /// Samples in the rolling CPU average window.
    pub cpu_window: usize,
}

impl MonitorConfig {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            breach_debounce: 3,
            cpu_window: 5,
        }
    }
}

struct MonitorState {
    last: Option<ResourceSample>,
    cpu_window: VecDeque<f64>,
    consecutive: [u32; 3],
}

struct Shared {
    plugin: PluginId,
    paused: AtomicBool,
    state: Mutex<MonitorState>,
}

/// Sampling loop for one process.
pub struct ResourceMonitor {
    shared: Arc<Shared>,
    task: tokio::task::JoinHandle<()>,
}

impl ResourceMonitor {
    /// Start monitoring `pid`.
    ///
    /// Breaches are published on the bus and sent to `breach_tx`; the
    /// supervisor decides whether repeated breaches warrant a restart.
    pub fn start<S: ResourceSampler>(
        plugin: PluginId,
        pid: u32,
        config: MonitorConfig,
        sampler: S,
        bus: Arc<dyn Bus>,
        breach_tx: mpsc::UnboundedSender<Breach>,
    ) -> Self {
        let shared = Arc::new(Shared {
            plugin,
            paused: AtomicBool::new(false),
            state: Mutex::new(MonitorState {
                last: None,
                cpu_window: VecDeque::new(),
                consecutive: [0; 3],
            }),
        });

        let loop_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.limits.sample_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if loop_shared.paused.load(Ordering::SeqCst) {
                    continue;
                }

                let sample = match sampler.sample(pid) {
                    Ok(sample) => sample,
                    Err(e) => {
                        debug!(plugin = %loop_shared.plugin, pid, error = %e, "sample failed");
                        continue;
                    }
                };

                let breaches = evaluate(&loop_shared, &config, sample);
                for breach in breaches {
                    warn!(
                        plugin = %loop_shared.plugin,
                        metric = %breach.metric,
                        observed = breach.observed,
                        limit = breach.limit,
                        "resource limit exceeded"
                    );
                    publish_breach(&bus, &loop_shared.plugin, &config, &breach).await;
                    if breach_tx.send(breach).is_err() {
                        return;
                    }
                }
            }
        });

        Self { shared, task }
    }

    pub fn last_sample(&self) -> Option<ResourceSample> {
        self.shared.state.lock().last
    }

    /// Rolling average over the last `cpu_window` samples.
    pub fn rolling_cpu_avg(&self) -> f64 {
        let state = self.shared.state.lock();
        if state.cpu_window.is_empty() {
            return 0.0;
        }
        state.cpu_window.iter().sum::<f64>() / state.cpu_window.len() as f64
    }

    /// Suspend sampling (used during graceful shutdown).
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    /// Stop the sampling loop.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Update rolling state and return newly-debounced breaches.
fn evaluate(shared: &Shared, config: &MonitorConfig, sample: ResourceSample) -> Vec<Breach> {
    let mut state = shared.state.lock();
    state.last = Some(sample);

    state.cpu_window.push_back(sample.cpu_percent);
    while state.cpu_window.len() > config.cpu_window {
        state.cpu_window.pop_front();
    }
    let cpu_avg = state.cpu_window.iter().sum::<f64>() / state.cpu_window.len() as f64;

    let limits = &config.limits;
    let checks = [
        (Metric::Cpu, cpu_avg, limits.max_cpu_percent),
        (
            Metric::Rss,
            sample.rss_bytes as f64,
            limits.max_rss_bytes as f64,
        ),
        (
            Metric::Handles,
            sample.open_handles as f64,
            limits.max_open_handles as f64,
        ),
    ];

    let mut breaches = Vec::new();
    for (i, (metric, observed, limit)) in checks.into_iter().enumerate() {
        if observed > limit {
            state.consecutive[i] += 1;
            if state.consecutive[i] >= config.breach_debounce {
                state.consecutive[i] = 0;
                breaches.push(Breach {
                    metric,
                    observed,
                    limit,
                });
            }
        } else {
            state.consecutive[i] = 0;
        }
    }
    breaches
}

async fn publish_breach(
    bus: &Arc<dyn Bus>,
    plugin: &PluginId,
    config: &MonitorConfig,
    breach: &Breach,
) {
    let duration =
        config.limits.sample_interval.as_secs_f64() * f64::from(config.breach_debounce);
    let envelope = Envelope::new(
        Subject::plugin(plugin, "resource.exceeded"),
        "plugin.resource.exceeded",
        "monitor",
    )
    .with_priority(Priority::High)
    .with_data("plugin", json!(plugin))
    .with_data("metric", json!(breach.metric.to_string()))
    .with_data("observed", json!(breach.observed))
    .with_data("limit", json!(breach.limit))
    .with_data("duration_secs", json!(duration));

    if let Err(e) = bus.publish(envelope).await {
        warn!(plugin = %plugin, error = %e, "failed to publish breach event");
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
