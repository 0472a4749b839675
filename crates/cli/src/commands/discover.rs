// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! `ksictl discover` - print every pattern currently registered with the
//! router (handlers and transformer source patterns alike).

use ksi_wire::Request;

use crate::client::DaemonClient;
use crate::exit_error::ExitError;

pub async fn run(json: bool) -> Result<(), ExitError> {
    let socket_path = ksid::env::socket_path().map_err(|_| ExitError::misconfig("could not determine socket path"))?;
    let mut client = DaemonClient::connect(&socket_path).await?;

    let response = client.send(Request::new("system:discover", serde_json::json!({}))).await?;
    if response.event.starts_with("error:") {
        return Err(ExitError::generic(format!("discover failed: {}", response.data)));
    }

    if json {
        println!("{}", response.data);
        return Ok(());
    }

    let patterns = response.data.get("events").and_then(serde_json::Value::as_array).cloned().unwrap_or_default();
    if patterns.is_empty() {
        println!("no patterns registered");
        return Ok(());
    }
    for pattern in patterns {
        if let Some(s) = pattern.as_str() {
            println!("{s}");
        }
    }
    Ok(())
}
