// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! `ksictl reload` - diff and reload the system routing rule set.
//!
//! Reloading is a request, not a signal: the daemon re-reads its routes
//! directories and swaps in whatever changed.

use ksi_wire::Request;

use crate::client::DaemonClient;
use crate::exit_error::ExitError;

pub async fn run() -> Result<(), ExitError> {
    let socket_path = ksid::env::socket_path().map_err(|_| ExitError::misconfig("could not determine socket path"))?;
    let mut client = DaemonClient::connect(&socket_path).await?;

    let response = client.send(Request::new("system:reload_routes", serde_json::json!({}))).await?;
    if response.event.starts_with("error:") {
        return Err(ExitError::generic(format!("reload failed: {}", response.data)));
    }
    println!(
        "routes reloaded: {} added, {} changed, {} removed, {} unchanged",
        response.data.get("added").unwrap_or(&serde_json::json!(0)),
        response.data.get("changed").unwrap_or(&serde_json::json!(0)),
        response.data.get("removed").unwrap_or(&serde_json::json!(0)),
        response.data.get("unchanged").unwrap_or(&serde_json::json!(0)),
    );
    Ok(())
}
