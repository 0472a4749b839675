// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! `ksictl stats` - a snapshot of what the daemon is doing right now:
//! registered pattern count, loaded rule count, and the most recent
//! events on the log.

use ksi_wire::Request;
use serde_json::Value;

use crate::client::DaemonClient;
use crate::exit_error::ExitError;

pub async fn run(json: bool) -> Result<(), ExitError> {
    let socket_path = ksid::env::socket_path().map_err(|_| ExitError::misconfig("could not determine socket path"))?;
    let mut client = DaemonClient::connect(&socket_path).await?;

    let status = client.send(Request::new("system:status", serde_json::json!({}))).await?;
    let rules = client.send(Request::new("routing:list_rules", serde_json::json!({}))).await?;
    let recent = client.send(Request::new("monitor:get_events", serde_json::json!({ "limit": 10 }))).await?;

    let pattern_count = status.data.get("patterns").and_then(Value::as_array).map_or(0, Vec::len);
    let rule_count = rules.data.get("rules").and_then(Value::as_array).map_or(0, Vec::len);
    let recent_events = recent.data.get("events").and_then(Value::as_array).cloned().unwrap_or_default();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "patterns_registered": pattern_count,
                "rules_loaded": rule_count,
                "recent_events": recent_events,
            })
        );
        return Ok(());
    }

    println!("patterns registered: {pattern_count}");
    println!("rules loaded:        {rule_count}");
    println!("recent events:");
    for event in recent_events.iter().rev() {
        let name = event.get("name").and_then(Value::as_str).unwrap_or("?");
        let ts = event.get("timestamp_ms").and_then(Value::as_u64).unwrap_or(0);
        println!("  [{ts}] {name}");
    }
    Ok(())
}
