// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! Start order: lock → bus → streams/KV → plugins → router. Shutdown runs
//! the same steps in reverse, stopping plugins gracefully before the bus
//! connection goes away.

use crate::config::{ConfigError, RoseyConfig};
use fs2::FileExt;
use rosey_bus::{Bus, BusError, NatsBus, StreamConfig};
use rosey_core::SystemClock;
use rosey_manager::{ManagerError, PluginManager};
use rosey_memory::ConversationMemory;
use rosey_router::{CommandResolver, CommandRouter, RouterError};
use rosey_supervisor::{ProcfsSampler, TokioProcessAdapter};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("another roseyd already holds {0}")]
    LockFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type Manager = PluginManager<TokioProcessAdapter, ProcfsSampler, SystemClock>;

/// The running daemon.
pub struct Daemon {
    pub config: RoseyConfig,
    pub bus: Arc<NatsBus>,
    pub manager: Arc<Manager>,
    pub router: CommandRouter,
    /// Conversational memory over the shared KV bucket, for embedded
    /// services and operator tooling.
    pub memory: Arc<ConversationMemory>,
    // dropped on shutdown, releasing the lock
    _lock_file: std::fs::File,
}

/// The registry's command index, as the router sees it.
struct IndexResolver(Arc<Manager>);

impl CommandResolver for IndexResolver {
    fn resolve(&self, prefix: &str) -> Option<rosey_core::PluginId> {
        self.0.for_command(prefix)
    }
}

/// Bring the daemon up.
pub async fn startup(config: RoseyConfig) -> Result<Daemon, LifecycleError> {
    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)?;

    let lock_path = config.lock_path();
    let lock_file = std::fs::File::create(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(lock_path.display().to_string()))?;

    // resolve plugin config before anything network-facing
    let plugins = config.plugin_metadata()?;

    info!(servers = ?config.bus.servers, "connecting to bus");
    let bus = Arc::new(NatsBus::connect(config.bus.to_bus_config()).await?);
    bus.on_connect(|| info!("bus connection established"));
    bus.on_disconnect(|| warn!("bus connection lost"));
    bus.on_error(|e| error!(error = e, "bus error"));

    // durable stream for normalized events, and the shared memory bucket
    bus.create_stream(StreamConfig::new(
        "rosey-events",
        vec!["rosey.events.>".to_string()],
    ))
    .await?;
    let bucket = bus.kv_bucket(&config.memory.bucket).await?;
    let memory = Arc::new(ConversationMemory::new(bucket, config.memory.to_config()));

    let bus_dyn: Arc<dyn Bus> = bus.clone();
    let endpoint = config
        .bus
        .servers
        .first()
        .cloned()
        .unwrap_or_else(|| "nats://localhost:4222".to_string());
    let manager = Arc::new(PluginManager::new(
        bus_dyn.clone(),
        endpoint,
        TokioProcessAdapter,
        ProcfsSampler::new(),
        SystemClock,
    ));

    for metadata in plugins {
        manager.load(metadata).await?;
    }
    let failures = manager.start_all().await;
    for (id, e) in &failures {
        error!(plugin = %id, error = %e, "plugin failed to start");
    }
    info!(
        loaded = manager.list().len(),
        failed = failures.len(),
        "plugins started"
    );

    let router = CommandRouter::new(bus_dyn)
        .with_resolver(Arc::new(IndexResolver(Arc::clone(&manager))));
    router.bind().await?;

    info!("daemon ready");
    Ok(Daemon {
        config,
        bus,
        manager,
        router,
        memory,
        _lock_file: lock_file,
    })
}

/// Tear the daemon down in reverse start order.
pub async fn shutdown(daemon: &Daemon) {
    info!("shutting down");
    daemon.router.unbind().await;
    daemon.manager.stop_all().await;
    if let Err(e) = daemon.bus.disconnect().await {
        warn!(error = %e, "bus disconnect failed");
    }
    info!("daemon stopped");
}
