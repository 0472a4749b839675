// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! `ksictl start` - launch the daemon, in the foreground or detached.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use ksi_wire::Request;

use crate::client::DaemonClient;
use crate::exit_error::ExitError;

pub async fn run(foreground: bool) -> Result<(), ExitError> {
    let socket_path = ksid::env::socket_path().map_err(|_| ExitError::misconfig("could not determine socket path"))?;

    if foreground {
        let ksid_path = find_ksid_binary()?;
        let status = Command::new(&ksid_path).status().map_err(|e| ExitError::generic(format!("failed to launch {}: {e}", ksid_path.display())))?;
        if !status.success() {
            return Err(ExitError::generic(format!("daemon exited with {status}")));
        }
        return Ok(());
    }

    if let Ok(mut client) = DaemonClient::connect(&socket_path).await {
        if client.send(Request::new("system:status", serde_json::json!({}))).await.is_ok() {
            println!("daemon already running");
            return Ok(());
        }
    }

    let ksid_path = find_ksid_binary()?;
    let state_dir = ksid::env::state_dir().map_err(|_| ExitError::misconfig("could not determine state directory"))?;
    std::fs::create_dir_all(&state_dir).map_err(|e| ExitError::generic(format!("failed to create state dir: {e}")))?;
    let log_path = state_dir.join("daemon.log");
    let log_file = std::fs::File::create(&log_path).map_err(|e| ExitError::generic(format!("failed to open {}: {e}", log_path.display())))?;
    let log_file_err = log_file.try_clone().map_err(|e| ExitError::generic(format!("failed to duplicate log handle: {e}")))?;

    Command::new(&ksid_path)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err))
        .spawn()
        .map_err(|e| ExitError::generic(format!("failed to launch {}: {e}", ksid_path.display())))?;

    wait_until_reachable(&socket_path).await?;
    println!("daemon started");
    Ok(())
}

async fn wait_until_reachable(socket_path: &std::path::Path) -> Result<(), ExitError> {
    const ATTEMPTS: u32 = 20;
    for attempt in 0..ATTEMPTS {
        if DaemonClient::connect(socket_path).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt + 1).min(5))).await;
    }
    Err(ExitError::socket(format!("daemon did not become reachable at {}", socket_path.display())))
}

fn find_ksid_binary() -> Result<PathBuf, ExitError> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("ksid");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }
    Ok(PathBuf::from("ksid"))
}
