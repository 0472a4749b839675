// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Error taxonomy for the completion queue and its provider boundary.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CompletionError {
    #[error("provider call exceeded its timeout")]
    Timeout,
    #[error("circuit breaker is open for this agent")]
    CircuitOpen,
    #[error("call was cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected the call: {0}")]
    Provider(String),
    #[error("agent queue is at capacity")]
    QueueFull,
}

impl CompletionError {
    /// Transport/timeout-class failures are the only ones eligible for
    /// retry.
    /// A provider-level rejection (bad input, policy refusal) is not
    /// retried — retrying it would just repeat the same rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CompletionError::Timeout | CompletionError::Transport(_))
    }
}
