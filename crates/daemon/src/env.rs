// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Centralized environment variable access for the daemon binary.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve the state directory: `KSI_STATE_DIR` > `XDG_STATE_HOME/ksi` >
/// `~/.local/state/ksi`.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("KSI_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("ksi"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/ksi"))
}

/// Unix-domain socket path, defaulting to a file under the state directory.
pub fn socket_path() -> Result<PathBuf, LifecycleError> {
    if let Ok(path) = std::env::var("KSI_SOCKET_PATH") {
        return Ok(PathBuf::from(path));
    }
    Ok(state_dir()?.join("ksid.sock"))
}

/// Directory holding persisted (`routes/persistent`) and bundled
/// (`routes/system`) YAML routing rules.
pub fn routes_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("KSI_ROUTES_DIR") {
        return Ok(PathBuf::from(dir));
    }
    Ok(state_dir()?.join("routes"))
}

pub fn log_level() -> String {
    std::env::var("KSI_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Timeout applied while reading a single request frame off a connection.
pub fn ipc_timeout() -> Duration {
    std::env::var("KSI_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// `system:shutdown` drain timeout: how long the router waits for queued
/// lanes to empty before giving up.
pub fn drain_timeout() -> Duration {
    std::env::var("KSI_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

/// Maximum causal chain depth before a derived event is dropped.
pub fn max_depth() -> u32 {
    std::env::var("KSI_MAX_DEPTH").ok().and_then(|s| s.parse::<u32>().ok()).unwrap_or(ksi_core::DEFAULT_MAX_DEPTH)
}

/// Grace period an originator mirror is kept installed after its chain's
/// terminal event, to catch straggling late arrivals.
pub fn mirror_grace() -> Duration {
    std::env::var("KSI_MIRROR_GRACE_MS").ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis).unwrap_or(Duration::from_secs(30))
}

/// Deadline a handler invocation is cancelled under, inherited from the
/// root event of its dispatch.
pub fn handler_timeout() -> Duration {
    std::env::var("KSI_HANDLER_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(ksi_router::DEFAULT_HANDLER_TIMEOUT)
}

/// Per-call timeout for the completion provider.
pub fn completion_call_timeout() -> Duration {
    std::env::var("KSI_COMPLETION_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(ksi_completion::DEFAULT_CALL_TIMEOUT)
}

/// Interval between periodic WAL checkpoints.
pub fn checkpoint_interval() -> Duration {
    std::env::var("KSI_CHECKPOINT_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(300))
}

/// Artificial delay for the built-in echo provider, used only by tests
/// that need to observe in-flight ordering (e.g. inject-priority queue
/// jumps) against a provider that would otherwise resolve calls
/// immediately. Unset in production; a real provider adapter ignores
/// this entirely.
pub fn completion_echo_delay() -> Option<Duration> {
    std::env::var("KSI_COMPLETION_ECHO_DELAY_MS").ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// Credential handed to the completion provider adapter. The provider
/// trait itself takes no opinion on how a concrete adapter authenticates;
/// this is read here only so `main.rs` can fail fast with a clear message
/// when a real provider is wired in and no credential is configured.
pub fn provider_api_key() -> Option<String> {
    std::env::var("KSI_PROVIDER_API_KEY").ok().filter(|s| !s.is_empty())
}
