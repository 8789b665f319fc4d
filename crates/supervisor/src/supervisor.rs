// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-plugin supervisor.

use crate::monitor::{Breach, MonitorConfig, ResourceMonitor};
use crate::process::{ExitStatus, ProcessAdapter, ProcessHandle, SpawnSpec};
use crate::restart::{RestartDecision, RestartTracker};
use crate::sampler::ResourceSampler;
use rosey_bus::{handler, Bus, BusError};
use rosey_core::{
    Clock, Envelope, PluginId, PluginMetadata, PluginState, Priority, RestartPolicy, Subject,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("spawn failed for {plugin}: {reason}")]
    SpawnFailed { plugin: PluginId, reason: String },

    #[error("plugin {plugin} not ready after {timeout:?}")]
    ReadinessTimeout {
        plugin: PluginId,
        timeout: Duration,
    },

    #[error("illegal transition for {plugin}: {from} -> {to}")]
    InvalidTransition {
        plugin: PluginId,
        from: PluginState,
        to: PluginState,
    },

    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

/// Source tag on supervisor-emitted envelopes.
const SOURCE: &str = "supervisor";

/// Two breaches closer together than this trigger a supervised restart.
const BREACH_RESTART_COOLDOWN: Duration = Duration::from_secs(30);

type StateChangeFn = Box<dyn Fn(PluginState, PluginState) + Send + Sync>;
type StartedFn = Box<dyn Fn() + Send + Sync>;
type StoppedFn = Box<dyn Fn(bool) + Send + Sync>;
type CrashedFn = Box<dyn Fn(Option<i32>) + Send + Sync>;

#[derive(Default)]
struct Observers {
    state_change: Mutex<Vec<StateChangeFn>>,
    started: Mutex<Vec<StartedFn>>,
    stopped: Mutex<Vec<StoppedFn>>,
    crashed: Mutex<Vec<CrashedFn>>,
}

struct SupState<H> {
    state: PluginState,
    pid: Option<u32>,
    started_at: Option<Instant>,
    handle: Option<Arc<H>>,
    monitor: Option<ResourceMonitor>,
    tracker: RestartTracker,
    last_breach: Option<Instant>,
    watch_task: Option<tokio::task::JoinHandle<()>>,
    breach_task: Option<tokio::task::JoinHandle<()>>,
}

struct Inner<P: ProcessAdapter, S, C> {
    metadata: PluginMetadata,
    bus: Arc<dyn Bus>,
    bus_endpoint: String,
    processes: P,
    sampler: S,
    clock: C,
    state: Mutex<SupState<P::Handle>>,
    observers: Observers,
    /// Bumped on every start so stale exit-watch tasks disarm themselves.
    generation: AtomicU64,
}

/// Owns one plugin subprocess and drives its lifecycle state machine.
///
/// Cloning is shallow; all clones supervise the same plugin.
pub struct PluginSupervisor<P: ProcessAdapter, S: ResourceSampler, C: Clock> {
    inner: Arc<Inner<P, S, C>>,
}

impl<P: ProcessAdapter, S: ResourceSampler, C: Clock> Clone for PluginSupervisor<P, S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: ProcessAdapter, S: ResourceSampler, C: Clock> PluginSupervisor<P, S, C> {
    pub fn new(
        metadata: PluginMetadata,
        bus: Arc<dyn Bus>,
        bus_endpoint: impl Into<String>,
        processes: P,
        sampler: S,
        clock: C,
    ) -> Self {
        let tracker = RestartTracker::new(metadata.restart.clone());
        Self {
            inner: Arc::new(Inner {
                metadata,
                bus,
                bus_endpoint: bus_endpoint.into(),
                processes,
                sampler,
                clock,
                state: Mutex::new(SupState {
                    state: PluginState::Unloaded,
                    pid: None,
                    started_at: None,
                    handle: None,
                    monitor: None,
                    tracker,
                    last_breach: None,
                    watch_task: None,
                    breach_task: None,
                }),
                observers: Observers::default(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn plugin_id(&self) -> &PluginId {
        &self.inner.metadata.id
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.inner.metadata
    }

    pub fn state(&self) -> PluginState {
        self.inner.state.lock().state
    }

    /// Pid of the child; live only in {STARTING, RUNNING, STOPPING, CRASHED}.
    pub fn pid(&self) -> Option<u32> {
        self.inner.state.lock().pid
    }

    /// Restart attempts inside the current window.
    pub fn restart_count(&self) -> u32 {
        let now = self.inner.clock.now();
        self.inner.state.lock().tracker.attempts_in_window(now)
    }

    pub fn uptime(&self) -> Option<Duration> {
        let state = self.inner.state.lock();
        if !state.state.is_live() {
            return None;
        }
        state
            .started_at
            .map(|at| self.inner.clock.now().duration_since(at))
    }

    // ---- observers ----

    pub fn on_state_change(&self, callback: impl Fn(PluginState, PluginState) + Send + Sync + 'static) {
        self.inner.observers.state_change.lock().push(Box::new(callback));
    }

    pub fn on_started(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.observers.started.lock().push(Box::new(callback));
    }

    pub fn on_stopped(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.observers.stopped.lock().push(Box::new(callback));
    }

    pub fn on_crashed(&self, callback: impl Fn(Option<i32>) + Send + Sync + 'static) {
        self.inner.observers.crashed.lock().push(Box::new(callback));
    }

    // ---- lifecycle ----

    /// UNLOADED → LOADED; called by the manager on load.
    pub async fn mark_loaded(&self) -> Result<(), SupervisorError> {
        self.transition(PluginState::Loaded).await?;
        Ok(())
    }

    /// {LOADED, STOPPED, FAILED} → UNLOADED; called by the manager on unload.
    pub async fn mark_unloaded(&self) -> Result<(), SupervisorError> {
        self.transition(PluginState::Unloaded).await?;
        Ok(())
    }

    /// Start the plugin: spawn, monitor, readiness handshake.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let id = self.inner.metadata.id.clone();
        self.transition(PluginState::Starting).await?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // subscribe before spawn so a fast plugin's ready is never missed
        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);
        let ready_sub = match self
            .inner
            .bus
            .subscribe(
                Subject::plugin(&id, "ready").as_str(),
                handler(move |_envelope| {
                    let tx = ready_tx.clone();
                    async move {
                        let _ = tx.try_send(());
                    }
                }),
            )
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                self.fail(&format!("ready subscription failed: {e}")).await;
                return Err(e.into());
            }
        };

        let spec = self.spawn_spec();
        info!(plugin = %id, executable = %spec.executable.display(), "starting plugin");

        let handle = match self.inner.processes.spawn(&spec).await {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                let _ = self.inner.bus.unsubscribe(ready_sub).await;
                self.fail(&format!("spawn failed: {e}")).await;
                return Err(SupervisorError::SpawnFailed {
                    plugin: id,
                    reason: e.to_string(),
                });
            }
        };

        let pid = handle.pid();
        {
            let mut state = self.inner.state.lock();
            state.pid = Some(pid);
            state.started_at = Some(self.inner.clock.now());
            state.handle = Some(Arc::clone(&handle));
        }
        self.start_monitor(pid);

        let timeout = self.inner.metadata.readiness_timeout;
        let ready = tokio::time::timeout(timeout, ready_rx.recv()).await;
        let _ = self.inner.bus.unsubscribe(ready_sub).await;

        if !matches!(ready, Ok(Some(()))) {
            warn!(plugin = %id, ?timeout, "plugin never reported ready");
            let _ = handle.kill().await;
            let _ = tokio::time::timeout(Duration::from_secs(1), handle.wait()).await;
            self.clear_process();
            self.fail("readiness timeout").await;
            return Err(SupervisorError::ReadinessTimeout {
                plugin: id,
                timeout,
            });
        }

        self.transition(PluginState::Running).await?;
        self.spawn_exit_watch(handle, generation);

        self.publish(
            Envelope::new(Subject::plugin(&id, "started"), "plugin.started", SOURCE)
                .with_data("plugin", json!(id))
                .with_data("pid", json!(pid)),
        )
        .await;
        for cb in self.inner.observers.started.lock().iter() {
            cb();
        }
        info!(plugin = %id, pid, "plugin running");
        Ok(())
    }

    /// Stop the plugin: polite shutdown request, then forced kill.
    ///
    /// Returns `true` iff the child exited within the graceful timeout.
    pub async fn stop(&self) -> Result<bool, SupervisorError> {
        let id = self.inner.metadata.id.clone();
        if self.state() == PluginState::Stopped {
            return Ok(true);
        }
        self.transition(PluginState::Stopping).await?;

        let handle = {
            let mut state = self.inner.state.lock();
            if let Some(task) = state.watch_task.take() {
                task.abort();
            }
            if let Some(monitor) = &state.monitor {
                monitor.pause();
            }
            state.handle.clone()
        };

        let Some(handle) = handle else {
            self.clear_process();
            self.transition(PluginState::Stopped).await?;
            return Ok(true);
        };

        // ask it to exit
        self.publish(
            Envelope::new(Subject::plugin(&id, "shutdown"), "plugin.shutdown", SOURCE)
                .with_priority(Priority::High)
                .with_data("plugin", json!(id)),
        )
        .await;

        let graceful_timeout = self.inner.metadata.graceful_timeout;
        let exit = tokio::time::timeout(graceful_timeout, handle.wait()).await;
        let (graceful, exit_code) = match exit {
            Ok(Ok(status)) => (true, status.code),
            Ok(Err(_)) => (false, None),
            Err(_) => {
                warn!(plugin = %id, ?graceful_timeout, "graceful stop timed out, killing");
                let _ = handle.kill().await;
                self.publish(
                    Envelope::new(Subject::plugin(&id, "error"), "plugin.force_killed", SOURCE)
                        .with_priority(Priority::High)
                        .with_data("plugin", json!(id)),
                )
                .await;
                let _ = tokio::time::timeout(Duration::from_secs(1), handle.wait()).await;
                (false, None)
            }
        };

        self.clear_process();
        self.transition(PluginState::Stopped).await?;

        self.publish(
            Envelope::new(Subject::plugin(&id, "stopped"), "plugin.stopped", SOURCE)
                .with_data("plugin", json!(id))
                .with_data("graceful", json!(graceful))
                .with_data("exit_code", json!(exit_code)),
        )
        .await;
        for cb in self.inner.observers.stopped.lock().iter() {
            cb(graceful);
        }
        info!(plugin = %id, graceful, "plugin stopped");
        Ok(graceful)
    }

    /// Stop (when running) then start.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        if self.state() == PluginState::Running {
            self.stop().await?;
        }
        self.start().await
    }

    // ---- internals ----

    fn spawn_spec(&self) -> SpawnSpec {
        let metadata = &self.inner.metadata;
        let mut args = metadata.args.clone();
        args.push("--plugin-id".to_string());
        args.push(metadata.id.to_string());
        args.push("--bus-url".to_string());
        args.push(self.inner.bus_endpoint.clone());
        SpawnSpec {
            executable: metadata.executable.clone(),
            args,
            env: Vec::new(),
            cwd: None,
        }
    }

    async fn transition(&self, to: PluginState) -> Result<PluginState, SupervisorError> {
        let id = &self.inner.metadata.id;
        let from = {
            let mut state = self.inner.state.lock();
            let from = state.state;
            if !from.can_transition(to) {
                return Err(SupervisorError::InvalidTransition {
                    plugin: id.clone(),
                    from,
                    to,
                });
            }
            state.state = to;
            from
        };

        for cb in self.inner.observers.state_change.lock().iter() {
            cb(from, to);
        }

        self.publish(
            Envelope::new(
                Subject::plugin(id, "state_change"),
                "plugin.state_change",
                SOURCE,
            )
            .with_data("plugin", json!(id))
            .with_data("from", json!(from))
            .with_data("to", json!(to)),
        )
        .await;
        Ok(from)
    }

    /// STARTING → FAILED with an error event.
    async fn fail(&self, reason: &str) {
        let id = &self.inner.metadata.id;
        error!(plugin = %id, reason, "plugin failed");
        if let Err(e) = self.transition(PluginState::Failed).await {
            warn!(plugin = %id, error = %e, "could not mark plugin failed");
            return;
        }
        self.publish(
            Envelope::new(Subject::plugin(id, "error"), "plugin.error", SOURCE)
                .with_priority(Priority::High)
                .with_data("plugin", json!(id))
                .with_data("reason", json!(reason)),
        )
        .await;
    }

    fn clear_process(&self) {
        let mut state = self.inner.state.lock();
        state.pid = None;
        state.handle = None;
        if let Some(monitor) = state.monitor.take() {
            monitor.stop();
        }
        if let Some(task) = state.breach_task.take() {
            task.abort();
        }
    }

    fn start_monitor(&self, pid: u32) {
        let (breach_tx, mut breach_rx) = mpsc::unbounded_channel::<Breach>();
        let monitor = ResourceMonitor::start(
            self.inner.metadata.id.clone(),
            pid,
            MonitorConfig::new(self.inner.metadata.resources.clone()),
            self.inner.sampler.clone(),
            Arc::clone(&self.inner.bus),
            breach_tx,
        );

        let sup = self.clone();
        let breach_task = tokio::spawn(async move {
            while let Some(breach) = breach_rx.recv().await {
                let now = sup.inner.clock.now();
                let repeat = {
                    let mut state = sup.inner.state.lock();
                    let repeat = state
                        .last_breach
                        .is_some_and(|at| now.duration_since(at) <= BREACH_RESTART_COOLDOWN);
                    state.last_breach = Some(now);
                    repeat
                };
                if repeat && sup.state() == PluginState::Running {
                    warn!(
                        plugin = %sup.inner.metadata.id,
                        metric = %breach.metric,
                        "repeated limit breaches, restarting plugin"
                    );
                    if let Err(e) = sup.restart().await {
                        error!(plugin = %sup.inner.metadata.id, error = %e, "breach restart failed");
                    }
                }
            }
        });

        let mut state = self.inner.state.lock();
        state.monitor = Some(monitor);
        state.breach_task = Some(breach_task);
        state.last_breach = None;
    }

    fn spawn_exit_watch(&self, handle: Arc<P::Handle>, generation: u64) {
        let sup = self.clone();
        let task = tokio::spawn(async move {
            let exit = handle
                .wait()
                .await
                .unwrap_or(ExitStatus { code: None });

            // a newer start owns the process slot now
            if sup.inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            // exits during STOPPING belong to stop()
            if sup.state() != PluginState::Running {
                return;
            }
            sup.handle_exit(exit).await;
        });
        self.inner.state.lock().watch_task = Some(task);
    }

    /// Child exited while RUNNING.
    async fn handle_exit(&self, exit: ExitStatus) {
        let id = self.inner.metadata.id.clone();
        let policy = self.inner.metadata.restart.policy;

        // a clean self-exit is a stop, not a crash, unless policy is ALWAYS
        if exit.success() && policy != RestartPolicy::Always {
            info!(plugin = %id, "plugin exited cleanly");
            if self.transition(PluginState::Stopping).await.is_err() {
                return;
            }
            self.clear_process();
            let _ = self.transition(PluginState::Stopped).await;
            self.publish(
                Envelope::new(Subject::plugin(&id, "stopped"), "plugin.stopped", SOURCE)
                    .with_data("plugin", json!(id))
                    .with_data("graceful", json!(true))
                    .with_data("exit_code", json!(exit.code)),
            )
            .await;
            for cb in self.inner.observers.stopped.lock().iter() {
                cb(true);
            }
            return;
        }

        warn!(plugin = %id, exit_code = ?exit.code, "plugin crashed");
        if self.transition(PluginState::Crashed).await.is_err() {
            return;
        }
        // pid stays visible in CRASHED; the monitor has nothing left to watch
        {
            let mut state = self.inner.state.lock();
            if let Some(monitor) = state.monitor.take() {
                monitor.stop();
            }
            if let Some(task) = state.breach_task.take() {
                task.abort();
            }
            state.handle = None;
        }

        self.publish(
            Envelope::new(Subject::plugin(&id, "crashed"), "plugin.crashed", SOURCE)
                .with_priority(Priority::High)
                .with_data("plugin", json!(id))
                .with_data("exit_code", json!(exit.code)),
        )
        .await;
        for cb in self.inner.observers.crashed.lock().iter() {
            cb(exit.code);
        }

        if policy == RestartPolicy::Never {
            self.inner.state.lock().pid = None;
            let _ = self.transition(PluginState::Failed).await;
            return;
        }

        let decision = {
            let now = self.inner.clock.now();
            self.inner.state.lock().tracker.on_crash(now)
        };

        match decision {
            RestartDecision::CircuitOpen => {
                error!(plugin = %id, "restart circuit open");
                self.inner.state.lock().pid = None;
                let _ = self.transition(PluginState::Failed).await;
                self.publish(
                    Envelope::new(
                        Subject::plugin(&id, "circuit_open"),
                        "plugin.circuit_open",
                        SOURCE,
                    )
                    .with_priority(Priority::Critical)
                    .with_data("plugin", json!(id))
                    .with_data("max_restarts", json!(self.inner.metadata.restart.max_restarts)),
                )
                .await;
            }
            RestartDecision::Restart { delay, attempt } => {
                info!(plugin = %id, attempt, ?delay, "restarting after backoff");
                tokio::time::sleep(delay).await;
                if self.state() != PluginState::Crashed {
                    return;
                }
                if let Err(e) = self.start().await {
                    warn!(plugin = %id, error = %e, "restart attempt failed");
                }
            }
        }
    }

    async fn publish(&self, envelope: Envelope) {
        if let Err(e) = self.inner.bus.publish(envelope).await {
            warn!(plugin = %self.inner.metadata.id, error = %e, "event publish failed");
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
