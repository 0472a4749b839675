// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Inbound frame shapes: requests (await a response) and notifications
//! (fire-and-forget), which share one wire shape.

use ksi_core::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame from a client. `awaits_response` is not on the wire; it is the
/// listener's own bookkeeping (a notification is a request the caller does
/// not block on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, rename = "context", skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

impl Request {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data, context: None }
    }
}
