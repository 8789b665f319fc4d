// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process adapters.
//!
//! The supervisor talks to child processes through [`ProcessAdapter`] so
//! tests can script process behavior without spawning anything. The polite
//! "ask it to exit" step is the shutdown envelope on the bus; the handle
//! only offers a forced kill.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Errors from process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("kill failed: {0}")]
    KillFailed(String),

    #[error("wait failed: {0}")]
    WaitFailed(String),
}

/// How a child process ended. `code` is `None` for signal deaths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// What to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

/// A running child process.
///
/// `wait` may be called from several tasks concurrently; every waiter
/// observes the same exit.
#[async_trait]
pub trait ProcessHandle: Send + Sync + 'static {
    fn pid(&self) -> u32;

    /// Wait for the process to exit.
    async fn wait(&self) -> Result<ExitStatus, ProcessError>;

    /// Exit status if the process has already exited.
    async fn try_wait(&self) -> Result<Option<ExitStatus>, ProcessError>;

    /// Force-terminate the process. A no-op once it has exited.
    async fn kill(&self) -> Result<(), ProcessError>;
}

/// Adapter for spawning child processes.
#[async_trait]
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    type Handle: ProcessHandle;

    async fn spawn(&self, spec: &SpawnSpec) -> Result<Self::Handle, ProcessError>;
}

/// Real adapter over `tokio::process`.
#[derive(Clone, Copy, Default)]
pub struct TokioProcessAdapter;

/// Handle over a tokio child.
///
/// A reaper task owns the child: it forwards kill requests and broadcasts
/// the exit status, so multiple waiters never contend on the child itself.
#[derive(Debug)]
pub struct TokioProcessHandle {
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
    kill_tx: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl ProcessAdapter for TokioProcessAdapter {
    type Handle = TokioProcessHandle;

    async fn spawn(&self, spec: &SpawnSpec) -> Result<Self::Handle, ProcessError> {
        let mut command = tokio::process::Command::new(&spec.executable);
        command.args(&spec.args);
        command.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        command.kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| ProcessError::SpawnFailed("child has no pid".to_string()))?;

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, mut kill_rx) = mpsc::unbounded_channel::<()>();

        tokio::spawn(async move {
            let to_exit = |status: std::io::Result<std::process::ExitStatus>| match status {
                Ok(s) => ExitStatus { code: s.code() },
                Err(_) => ExitStatus { code: None },
            };
            loop {
                tokio::select! {
                    status = child.wait() => {
                        let _ = exit_tx.send(Some(to_exit(status)));
                        break;
                    }
                    recv = kill_rx.recv() => {
                        match recv {
                            Some(()) => {
                                let _ = child.start_kill();
                            }
                            None => {
                                // handle dropped; nothing left to signal, just reap
                                let _ = exit_tx.send(Some(to_exit(child.wait().await)));
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(TokioProcessHandle {
            pid,
            exit_rx,
            kill_tx,
        })
    }
}

#[async_trait]
impl ProcessHandle for TokioProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&self) -> Result<ExitStatus, ProcessError> {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(exit) = *rx.borrow() {
                return Ok(exit);
            }
            rx.changed()
                .await
                .map_err(|_| ProcessError::WaitFailed("reaper task gone".to_string()))?;
        }
    }

    async fn try_wait(&self) -> Result<Option<ExitStatus>, ProcessError> {
        Ok(*self.exit_rx.borrow())
    }

    async fn kill(&self) -> Result<(), ProcessError> {
        // send fails only after exit, which is fine
        let _ = self.kill_tx.send(());
        Ok(())
    }
}

// =============================================================================
// Fake adapter - only compiled for tests or when explicitly requested
// =============================================================================

/// Recorded process call
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub enum ProcessCall {
    Spawn { spec: SpawnSpec },
    Kill { pid: u32 },
}

/// How fake children behave when spawned.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnBehavior {
    /// Run until the test triggers an exit.
    Stay,
    /// Exit immediately with the given code.
    ExitWith(i32),
    /// Fail the spawn itself.
    FailSpawn,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Debug)]
struct FakeState {
    next_pid: u32,
    behavior: SpawnBehavior,
    calls: Vec<ProcessCall>,
    procs: std::collections::HashMap<u32, watch::Sender<Option<ExitStatus>>>,
}

/// Fake process adapter for testing
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct FakeProcessAdapter {
    inner: std::sync::Arc<parking_lot::Mutex<FakeState>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeProcessAdapter {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(parking_lot::Mutex::new(FakeState {
                next_pid: 1000,
                behavior: SpawnBehavior::Stay,
                calls: Vec::new(),
                procs: std::collections::HashMap::new(),
            })),
        }
    }

    /// Behavior applied to subsequent spawns.
    pub fn set_behavior(&self, behavior: SpawnBehavior) {
        self.inner.lock().behavior = behavior;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ProcessCall> {
        self.inner.lock().calls.clone()
    }

    /// Pids spawned so far, ascending.
    pub fn spawned_pids(&self) -> Vec<u32> {
        let inner = self.inner.lock();
        let mut pids: Vec<u32> = inner.procs.keys().copied().collect();
        pids.sort();
        pids
    }

    /// Number of spawn calls recorded.
    pub fn spawn_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProcessCall::Spawn { .. }))
            .count()
    }

    /// Number of kill calls recorded.
    pub fn kill_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProcessCall::Kill { .. }))
            .count()
    }

    /// Trigger an exit for a running fake process.
    pub fn exit(&self, pid: u32, code: i32) {
        if let Some(tx) = self.inner.lock().procs.get(&pid) {
            let _ = tx.send(Some(ExitStatus { code: Some(code) }));
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a fake process.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug)]
pub struct FakeProcessHandle {
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
    inner: std::sync::Arc<parking_lot::Mutex<FakeState>>,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    type Handle = FakeProcessHandle;

    async fn spawn(&self, spec: &SpawnSpec) -> Result<Self::Handle, ProcessError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProcessCall::Spawn { spec: spec.clone() });

        match inner.behavior {
            SpawnBehavior::FailSpawn => {
                Err(ProcessError::SpawnFailed("scripted spawn failure".to_string()))
            }
            behavior => {
                inner.next_pid += 1;
                let pid = inner.next_pid;
                let initial = match behavior {
                    SpawnBehavior::ExitWith(code) => Some(ExitStatus { code: Some(code) }),
                    _ => None,
                };
                let (tx, rx) = watch::channel(initial);
                inner.procs.insert(pid, tx);
                Ok(FakeProcessHandle {
                    pid,
                    exit_rx: rx,
                    inner: std::sync::Arc::clone(&self.inner),
                })
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl ProcessHandle for FakeProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&self) -> Result<ExitStatus, ProcessError> {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(exit) = *rx.borrow() {
                return Ok(exit);
            }
            rx.changed()
                .await
                .map_err(|_| ProcessError::WaitFailed("fake process gone".to_string()))?;
        }
    }

    async fn try_wait(&self) -> Result<Option<ExitStatus>, ProcessError> {
        Ok(*self.exit_rx.borrow())
    }

    async fn kill(&self) -> Result<(), ProcessError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProcessCall::Kill { pid: self.pid });
        if let Some(tx) = inner.procs.get(&self.pid) {
            // killed by signal: no exit code
            let _ = tx.send(Some(ExitStatus { code: None }));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
