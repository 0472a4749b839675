// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! `ksictl stop` - request a graceful shutdown.

use ksi_wire::Request;

use crate::client::DaemonClient;
use crate::exit_error::ExitError;

pub async fn run() -> Result<(), ExitError> {
    let socket_path = ksid::env::socket_path().map_err(|_| ExitError::misconfig("could not determine socket path"))?;

    let mut client = match DaemonClient::connect(&socket_path).await {
        Ok(client) => client,
        Err(_) => {
            println!("daemon not running");
            return Ok(());
        }
    };

    let response = client.send(Request::new("system:shutdown", serde_json::json!({}))).await?;
    if response.event.starts_with("error:") {
        return Err(ExitError::generic(format!("shutdown request failed: {}", response.data)));
    }
    println!("daemon shutting down");
    Ok(())
}
