// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Per-agent completion queue: `Idle -> Queued -> InFlight -> Idle`, FIFO
//! with inject-at-head, backed by one worker task per agent with calls in
//! flight. The worker drives the provider through the
//! circuit breaker and retry policy and reports the result back through
//! a channel rather than the router directly, so this crate stays
//! independent of `ksi-router`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ksi_core::{AgentId, RequestId};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::CompletionError;
use crate::provider::Provider;
use crate::retry::{backoff_delay, should_retry, RetryPolicy};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Queued,
    InFlight,
}

pub struct CompletionOutcome {
    pub request_id: RequestId,
    pub agent_id: AgentId,
    pub result: Result<Value, CompletionError>,
}

struct QueuedCall {
    request_id: RequestId,
    input: Value,
    cancelled: Arc<std::sync::atomic::AtomicBool>,
}

struct AgentQueue {
    state: AgentState,
    pending: VecDeque<QueuedCall>,
    inflight: Option<(RequestId, Arc<std::sync::atomic::AtomicBool>)>,
}

impl AgentQueue {
    fn new() -> Self {
        Self { state: AgentState::Idle, pending: VecDeque::new(), inflight: None }
    }
}

/// Shared per-runtime completion queue state. One [`CircuitBreaker`] per
/// agent; a single [`Provider`] and [`RetryPolicy`] shared across agents.
pub struct CompletionQueues<P: Provider> {
    provider: Arc<P>,
    retry_policy: RetryPolicy,
    call_timeout: Duration,
    agents: Mutex<HashMap<AgentId, AgentQueue>>,
    breakers: Mutex<HashMap<AgentId, Arc<CircuitBreaker>>>,
    breaker_config: CircuitBreakerConfig,
    outcomes: mpsc::UnboundedSender<CompletionOutcome>,
}

impl<P: Provider + 'static> CompletionQueues<P> {
    pub fn new(provider: Arc<P>, retry_policy: RetryPolicy, breaker_config: CircuitBreakerConfig, call_timeout: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<CompletionOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::new(Self {
            provider,
            retry_policy,
            call_timeout,
            agents: Mutex::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
            breaker_config,
            outcomes: tx,
        });
        (this, rx)
    }

    fn breaker_for(&self, agent_id: &AgentId) -> Arc<CircuitBreaker> {
        self.breakers.lock().entry(agent_id.clone()).or_insert_with(|| Arc::new(CircuitBreaker::new(self.breaker_config))).clone()
    }

    /// `completion:async`: enqueue at the tail. Starts the agent's worker
    /// if it's currently idle.
    pub fn enqueue(self: &Arc<Self>, agent_id: AgentId, request_id: RequestId, input: Value) {
        self.push(agent_id, request_id, input, false);
    }

    /// `completion:inject`: push to the head of the queue, ahead of
    /// anything already waiting (but never ahead of an in-flight call).
    pub fn inject(self: &Arc<Self>, agent_id: AgentId, request_id: RequestId, input: Value) {
        self.push(agent_id, request_id, input, true);
    }

    fn push(self: &Arc<Self>, agent_id: AgentId, request_id: RequestId, input: Value, at_head: bool) {
        let call = QueuedCall { request_id, input, cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)) };
        let should_start = {
            let mut agents = self.agents.lock();
            let entry = agents.entry(agent_id.clone()).or_insert_with(AgentQueue::new);
            if at_head {
                entry.pending.push_front(call);
            } else {
                entry.pending.push_back(call);
            }
            let was_idle = entry.state == AgentState::Idle;
            if was_idle {
                entry.state = AgentState::Queued;
            }
            was_idle
        };
        if should_start {
            self.drive(agent_id);
        }
    }

    /// Cancellation on agent termination: queued entries are
    /// dropped immediately; an in-flight call is marked for best-effort
    /// cooperative cancellation and will report `error:cancelled` when
    /// its provider call unwinds.
    pub fn cancel_agent(&self, agent_id: &AgentId) {
        let mut agents = self.agents.lock();
        if let Some(queue) = agents.get_mut(agent_id) {
            for call in queue.pending.drain(..) {
                let _ = self.outcomes.send(CompletionOutcome {
                    request_id: call.request_id,
                    agent_id: agent_id.clone(),
                    result: Err(CompletionError::Cancelled),
                });
            }
            if let Some((_, flag)) = &queue.inflight {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    fn drive(self: &Arc<Self>, agent_id: AgentId) {
        let this = self.clone();
        tokio::spawn(async move { this.worker_loop(agent_id).await });
    }

    /// Runs until the agent's queue is empty, processing one call at a
    /// time (the FIFO + in-flight invariant: never more than one call per
    /// agent outstanding at once).
    async fn worker_loop(self: Arc<Self>, agent_id: AgentId) {
        loop {
            let next = {
                let mut agents = self.agents.lock();
                let Some(queue) = agents.get_mut(&agent_id) else { return };
                match queue.pending.pop_front() {
                    Some(call) => {
                        queue.state = AgentState::InFlight;
                        queue.inflight = Some((call.request_id, call.cancelled.clone()));
                        Some(call)
                    }
                    None => {
                        queue.state = AgentState::Idle;
                        queue.inflight = None;
                        None
                    }
                }
            };
            let Some(call) = next else { return };

            let result = self.run_with_retry(&agent_id, &call).await;
            {
                let mut agents = self.agents.lock();
                if let Some(queue) = agents.get_mut(&agent_id) {
                    queue.inflight = None;
                }
            }
            let _ = self.outcomes.send(CompletionOutcome { request_id: call.request_id, agent_id: agent_id.clone(), result });
        }
    }

    async fn run_with_retry(&self, agent_id: &AgentId, call: &QueuedCall) -> Result<Value, CompletionError> {
        let breaker = self.breaker_for(agent_id);
        let mut attempt = 0u32;
        loop {
            if call.cancelled.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(CompletionError::Cancelled);
            }
            if !breaker.allow(Instant::now()) {
                return Err(CompletionError::CircuitOpen);
            }

            let outcome = self.provider.call(agent_id, call.input.clone(), self.call_timeout).await;
            match &outcome {
                Ok(_) => {
                    breaker.record_success();
                    return outcome;
                }
                Err(e) if e.is_retryable() && should_retry(&self.retry_policy, attempt) => {
                    breaker.record_failure(Instant::now());
                    let delay = backoff_delay(&self.retry_policy, attempt);
                    debug!(agent = %agent_id, attempt, delay_ms = delay.as_millis() as u64, "retrying completion call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(_) => {
                    breaker.record_failure(Instant::now());
                    if attempt > 0 {
                        warn!(agent = %agent_id, attempts = attempt + 1, "completion call failed after retries");
                    }
                    return outcome;
                }
            }
        }
    }
}
