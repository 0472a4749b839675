// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Daemon lifecycle management: startup, shutdown, and the on-disk layout
//! a single running instance owns.

mod startup;
pub use startup::{build_runtime, Runtime};

use std::fs::File;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

/// On-disk layout for one daemon instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub routes_persistent_dir: PathBuf,
    pub routes_system_dir: PathBuf,
    pub events_wal_path: PathBuf,
    pub events_snapshot_path: PathBuf,
    pub queues_wal_path: PathBuf,
    pub queues_snapshot_path: PathBuf,
}

impl Config {
    /// Load configuration from the environment (`crate::env`), defaulting
    /// to fixed paths under the resolved state directory. One daemon
    /// instance serves every client connecting to its socket.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;
        let socket_path = crate::env::socket_path()?;
        let routes_dir = crate::env::routes_dir()?;

        Ok(Self {
            socket_path,
            lock_path: state_dir.join("ksid.pid"),
            version_path: state_dir.join("ksid.version"),
            routes_persistent_dir: routes_dir.join("persistent"),
            routes_system_dir: routes_dir.join("system"),
            events_wal_path: state_dir.join("wal").join("events.jsonl"),
            events_snapshot_path: state_dir.join("snapshot").join("events.json"),
            queues_wal_path: state_dir.join("wal").join("queues.jsonl"),
            queues_snapshot_path: state_dir.join("snapshot").join("queues.json"),
            state_dir,
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,
    #[error("failed to acquire instance lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),
    #[error(transparent)]
    State(#[from] ksi_state::StateError),
    #[error(transparent)]
    Router(#[from] ksi_router::RouterError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Release sequence mirroring [`startup`]: flush both stores to a final
/// snapshot, then remove the files only this instance should own.
pub fn shutdown(config: &Config, lock_file: &File, entity_store: &ksi_state::EntityStore, queue_store: &ksi_state::QueueStore) {
    info!("shutting down");
    if let Err(e) = entity_store.checkpoint() {
        warn!(error = %e, "final entity checkpoint failed");
    }
    if let Err(e) = queue_store.checkpoint() {
        warn!(error = %e, "final queue checkpoint failed");
    }

    if config.socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.socket_path) {
            warn!(error = %e, "failed to remove socket file");
        }
    }
    if config.lock_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.lock_path) {
            warn!(error = %e, "failed to remove lock file");
        }
    }
    if config.version_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.version_path) {
            warn!(error = %e, "failed to remove version file");
        }
    }
    drop(lock_file);
    info!("shutdown complete");
}
