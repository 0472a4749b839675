// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The provider boundary. A concrete provider adapter (e.g. a
//! CLI-subprocess wrapper) is an external collaborator and out of scope
//! here; only the trait and an in-memory test double live in this crate.
//!
//! Architectural rule: whatever session concept a provider
//! needs internally (a subprocess handle, an HTTP keep-alive connection)
//! never crosses into a public event or queue record. The trait is
//! intentionally session-less at its public boundary — `agent_id` is the
//! only identity the completion queue and the router understand.

use async_trait::async_trait;
use ksi_core::AgentId;
use serde_json::Value;
use std::time::Duration;

use crate::error::CompletionError;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Perform one completion call for `agent_id`. Implementations own
    /// whatever session/connection state they need to do this; none of
    /// it is visible to the caller.
    async fn call(&self, agent_id: &AgentId, input: Value, timeout: Duration) -> Result<Value, CompletionError>;
}

/// In-memory provider used by tests and as the default until a real
/// adapter is wired in by the daemon. Echoes its input back, optionally
/// after a configured delay, so tests can exercise timeout handling.
pub struct EchoProvider {
    delay: Option<Duration>,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self { delay: None }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for EchoProvider {
    async fn call(&self, _agent_id: &AgentId, input: Value, timeout: Duration) -> Result<Value, CompletionError> {
        if let Some(delay) = self.delay {
            match tokio::time::timeout(timeout, tokio::time::sleep(delay)).await {
                Ok(()) => {}
                Err(_) => return Err(CompletionError::Timeout),
            }
        }
        Ok(serde_json::json!({ "echo": input }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_provider_returns_input() {
        let provider = EchoProvider::new();
        let result = provider.call(&AgentId::new(), serde_json::json!({"a": 1}), Duration::from_secs(1)).await.unwrap();
        assert_eq!(result["echo"]["a"], 1);
    }

    #[tokio::test]
    async fn echo_provider_times_out_when_delay_exceeds_budget() {
        let provider = EchoProvider::with_delay(Duration::from_millis(50));
        let result = provider.call(&AgentId::new(), serde_json::json!({}), Duration::from_millis(5)).await;
        assert!(matches!(result, Err(CompletionError::Timeout)));
    }
}
