// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The handler trait: the router's only extension point for code that
//! reacts to an event rather than declaratively re-routing it.

use async_trait::async_trait;
use ksi_core::Context;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler rejected the event: {0}")]
    Rejected(String),
    #[error("handler panicked or otherwise failed unexpectedly: {0}")]
    Failed(String),
}

/// A registered event handler. Handlers never rewrite or re-route events
/// themselves — that is the transformer engine's job; a
/// handler only observes and may emit new events as a side effect through
/// whatever emit handle it was constructed with.
#[async_trait]
pub trait Handler: Send + Sync {
    fn id(&self) -> &str;

    /// Whether this handler runs on the blocking dispatch path (`false`)
    /// or is fired-and-forgotten onto a background task (`true`). Spec
    /// §4.3/§9: keeping this a handler-declared property, checked
    /// independently of the transformer fan-out, is what fixes the
    /// historical bug where slow handlers stalled transformer delivery.
    fn is_async(&self) -> bool {
        false
    }

    async fn handle(&self, name: &str, data: &Value, context: &Context) -> Result<(), HandlerError>;
}
