// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Outbound frame shape: `{event, data, _ksi_context}`.

use ksi_core::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub event: String,
    pub data: Value,
    #[serde(rename = "_ksi_context")]
    pub context: Context,
}

impl Response {
    pub fn new(event: impl Into<String>, data: Value, context: Context) -> Self {
        Self { event: event.into(), data, context }
    }

    /// An `error:*` response carrying a bounded error payload.
    pub fn error(kind: &str, message: impl Into<String>, context: Context) -> Self {
        Self {
            event: format!("error:{kind}"),
            data: serde_json::json!({ "message": message.into() }),
            context,
        }
    }
}
