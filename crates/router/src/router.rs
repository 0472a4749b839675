// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The event router: priority-lane dispatch, transformer
//! fan-out, handler supervision, the originator mirror, and two-phase
//! shutdown, all wired around the pattern index.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ksi_core::{Clock, Context, Event, EventId, Originator, Pattern, RuleId, Transformer, DEFAULT_MAX_DEPTH};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::event_log::{BoundedEventLog, EventLog};
use crate::handler::{Handler, HandlerError};
use crate::lanes::{LaneError, LaneSender, Lanes, Priority, DEFAULT_ENQUEUE_TIMEOUT, DEFAULT_HIGH_CAPACITY, DEFAULT_LOW_CAPACITY, DEFAULT_NORMAL_CAPACITY};
use crate::originator::{OriginatorRegistry, DEFAULT_MIRROR_GRACE, DEFAULT_OVERFLOW_INTERVAL};
use crate::pattern_index::PatternIndex;
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::transformer::{compile, ApplyOutcome, CompiledTransformer, EngineError};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("event name {0:?} is not a valid `namespace:verb` name")]
    InvalidName(String),
    #[error(transparent)]
    Lane(#[from] LaneError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("no transformer registered with rule id {0:?}")]
    UnknownRule(String),
    #[error("no handler registered with id {0:?}")]
    UnknownHandler(String),
}

/// Deadline a handler invocation runs under before it is cancelled and
/// `error:handler_timeout` is emitted, inherited from the root event.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RouterConfig {
    pub high_capacity: usize,
    pub normal_capacity: usize,
    pub low_capacity: usize,
    pub enqueue_timeout: Duration,
    pub max_depth: u32,
    pub mirror_grace: Duration,
    pub overflow_interval: Duration,
    pub event_log_capacity: usize,
    pub drain_timeout: Duration,
    pub handler_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            high_capacity: DEFAULT_HIGH_CAPACITY,
            normal_capacity: DEFAULT_NORMAL_CAPACITY,
            low_capacity: DEFAULT_LOW_CAPACITY,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
            max_depth: DEFAULT_MAX_DEPTH,
            mirror_grace: DEFAULT_MIRROR_GRACE,
            overflow_interval: DEFAULT_OVERFLOW_INTERVAL,
            event_log_capacity: 10_000,
            drain_timeout: Duration::from_secs(10),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

/// Rolling per-handler timeout counters behind `handler:degraded`
///. A handler is degraded once `K` of its last `K`
/// completions timed out or failed.
const DEGRADED_WINDOW: usize = 20;
const DEGRADED_THRESHOLD: usize = 10;

struct HandlerHealth {
    recent_failures: std::collections::VecDeque<bool>,
}

impl HandlerHealth {
    fn new() -> Self {
        Self { recent_failures: std::collections::VecDeque::with_capacity(DEGRADED_WINDOW) }
    }

    /// Returns `true` the instant this handler crosses into degraded.
    fn record(&mut self, failed: bool) -> bool {
        if self.recent_failures.len() >= DEGRADED_WINDOW {
            self.recent_failures.pop_front();
        }
        self.recent_failures.push_back(failed);
        let failures = self.recent_failures.iter().filter(|f| **f).count();
        failures >= DEGRADED_THRESHOLD && self.recent_failures.len() >= DEGRADED_THRESHOLD
    }
}

struct Shared<C: Clock> {
    handlers: RwLock<PatternIndex<Arc<dyn Handler>>>,
    transformers: RwLock<PatternIndex<Arc<CompiledTransformer>>>,
    handler_health: Mutex<HashMap<String, HandlerHealth>>,
    lane_sender: LaneSender,
    scheduler: SchedulerHandle,
    originator: Mutex<OriginatorRegistry>,
    event_log: Arc<BoundedEventLog>,
    clock: C,
    max_depth: u32,
    mirror_grace: Duration,
    overflow_interval: Duration,
    handler_timeout: Duration,
    shutdown: CancellationToken,
}

/// Cloneable handle to the router: emit events, (un)register handlers and
/// transformers, inspect the event log. Cheap to clone; every clone
/// shares the same dispatch loop.
#[derive(Clone)]
pub struct Router<C: Clock> {
    shared: Arc<Shared<C>>,
}

/// Owns the receive side of the priority lanes and the scheduler task;
/// must be driven by [`RouterRunner::run`] on a background task.
pub struct RouterRunner<C: Clock> {
    shared: Arc<Shared<C>>,
    lanes: Lanes,
    timer_fired: tokio::sync::mpsc::UnboundedReceiver<Event>,
}

pub fn build<C: Clock>(clock: C, config: RouterConfig) -> (Router<C>, RouterRunner<C>) {
    let lanes = Lanes::new(config.high_capacity, config.normal_capacity, config.low_capacity, config.enqueue_timeout);
    let lane_sender = lanes.sender();
    let (timer_tx, timer_fired) = tokio::sync::mpsc::unbounded_channel();
    let scheduler = Scheduler::new(timer_tx);
    let scheduler_handle = scheduler.handle();
    tokio::spawn(scheduler.run());

    let shared = Arc::new(Shared {
        handlers: RwLock::new(PatternIndex::new()),
        transformers: RwLock::new(PatternIndex::new()),
        handler_health: Mutex::new(HashMap::new()),
        lane_sender,
        scheduler: scheduler_handle,
        originator: Mutex::new(OriginatorRegistry::new()),
        event_log: Arc::new(BoundedEventLog::new(config.event_log_capacity)),
        clock,
        max_depth: config.max_depth,
        mirror_grace: config.mirror_grace,
        overflow_interval: config.overflow_interval,
        handler_timeout: config.handler_timeout,
        shutdown: CancellationToken::new(),
    });

    let router = Router { shared: shared.clone() };
    let runner = RouterRunner { shared, lanes, timer_fired };
    (router, runner)
}

impl<C: Clock> Router<C> {
    pub fn register_handler(&self, id: impl Into<String>, pattern: Pattern, priority: i32, handler: Arc<dyn Handler>) {
        let id = id.into();
        self.shared.handler_health.lock().insert(id.clone(), HandlerHealth::new());
        self.shared.handlers.write().register(id, pattern, priority, handler);
    }

    pub fn unregister_handler(&self, id: &str) -> bool {
        self.shared.handler_health.lock().remove(id);
        self.shared.handlers.write().unregister(id)
    }

    /// `routing:add_rule`: compile and register a transformer. Rejects
    /// unsafe universal-pattern rules.
    pub fn add_rule(&self, transformer: Transformer) -> Result<RuleId, RouterError> {
        let rule_id = transformer.rule_id;
        let pattern = transformer.source_pattern.clone();
        let priority = transformer.priority;
        let ttl_seconds = transformer.ttl_seconds;
        let compiled = compile(transformer)?;
        self.shared.transformers.write().register(rule_id.as_str().to_string(), pattern, priority, Arc::new(compiled));
        if let Some(ttl) = ttl_seconds {
            self.shared.scheduler.schedule_after(Duration::from_secs(ttl), rule_expire_event(rule_id.as_str()));
        }
        Ok(rule_id)
    }

    /// `routing:remove_rule`.
    pub fn remove_rule(&self, rule_id: &str) -> Result<(), RouterError> {
        if self.shared.transformers.write().unregister(rule_id) {
            Ok(())
        } else {
            Err(RouterError::UnknownRule(rule_id.to_string()))
        }
    }

    /// `system:discover`: the set of registered patterns this router can
    /// handle or transform. Payload schemas are
    /// intentionally not part of this introspection.
    pub fn discover(&self) -> Vec<String> {
        let handlers = self.shared.handlers.read();
        let transformers = self.shared.transformers.read();
        let mut patterns: Vec<String> = handlers
            .registered_patterns()
            .into_iter()
            .chain(transformers.registered_patterns())
            .map(|(_, pattern)| pattern.as_str().to_string())
            .collect();
        patterns.sort();
        patterns.dedup();
        patterns
    }

    pub async fn emit(&self, name: impl Into<String>, data: serde_json::Value, originator: Originator) -> Result<EventId, RouterError> {
        let context = Context::root(originator);
        self.emit_with_context(name, data, context).await
    }

    pub async fn emit_with_context(&self, name: impl Into<String>, data: serde_json::Value, context: Context) -> Result<EventId, RouterError> {
        let name = name.into();
        let event = Event::new(name.clone(), data, context, self.shared.clock.epoch_ms())
            .map_err(|_| RouterError::InvalidName(name))?;
        let id = event.id;
        self.enqueue(event).await?;
        Ok(id)
    }

    async fn enqueue(&self, event: Event) -> Result<(), RouterError> {
        let priority = priority_for(&event.name);
        let dropped = event.clone();
        match self.shared.lane_sender.send(priority, event).await {
            Ok(()) => Ok(()),
            Err(LaneError::QueueFull) => {
                let _ = self.shared.lane_sender.send(Priority::High, queue_full_event(&dropped)).await;
                Err(RouterError::Lane(LaneError::QueueFull))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn event_log(&self) -> Arc<BoundedEventLog> {
        self.shared.event_log.clone()
    }

    /// `system:shutdown`, phase one: stop accepting new dispatch and let
    /// `RouterRunner::run` drain whatever is already queued.
    pub fn begin_shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

fn priority_for(name: &str) -> Priority {
    if name.starts_with("system:") || name.starts_with("error:") {
        Priority::High
    } else if name.starts_with("monitor:") {
        Priority::Low
    } else {
        Priority::Normal
    }
}

impl<C: Clock> RouterRunner<C> {
    /// Drives dispatch until shutdown is requested and the lanes drain
    /// (bounded by `drain_timeout`), or are closed outright.
    pub async fn run(mut self, drain_timeout: Duration) {
        loop {
            tokio::select! {
                biased;
                Some(fired) = self.timer_fired.recv() => {
                    self.dispatch(fired).await;
                }
                maybe_event = self.lanes.recv() => {
                    match maybe_event {
                        Some(event) => self.dispatch(event).await,
                        None => break,
                    }
                }
                () = self.shared.shutdown.cancelled() => {
                    info!("router shutdown requested, draining queued events");
                    self.drain(drain_timeout).await;
                    break;
                }
            }
        }
        info!("router dispatch loop exited");
    }

    async fn drain(&mut self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                warn!("drain timeout elapsed with events still queued");
                break;
            }
            match tokio::time::timeout(remaining, self.lanes.recv()).await {
                Ok(Some(event)) => self.dispatch(event).await,
                Ok(None) | Err(_) => break,
            }
        }
    }

    async fn dispatch(&mut self, event: Event) {
        if event.name == MIRROR_EXPIRE_EVENT {
            self.shared.originator.lock().remove(&event.context.chain_id);
            return;
        }
        if event.name == RULE_EXPIRE_EVENT {
            if let Some(rule_id) = event.data.get("rule_id").and_then(serde_json::Value::as_str) {
                if self.shared.transformers.write().unregister(rule_id) {
                    debug!(rule_id, "ephemeral rule expired");
                }
            }
            // Fall through to ordinary dispatch so anything registered on
            // this event (e.g. the daemon's own ephemeral-rule bookkeeping)
            // still observes it.
        }

        debug!(event = %event.name, id = %event.id, "dispatching");
        self.shared.event_log.append(event.clone()).await;
        self.handle_originator(&event).await;

        let matching_transformers: Vec<Arc<CompiledTransformer>> = {
            let index = self.shared.transformers.read();
            index.lookup(&event.name).into_iter().map(|entry| entry.value.clone()).collect()
        };
        for compiled in matching_transformers {
            match crate::transformer::engine::apply(&compiled, &event, self.shared.max_depth, self.shared.clock.epoch_ms()) {
                Ok(ApplyOutcome::Derived(derived)) => {
                    for child in derived {
                        if compiled.transformer.r#async {
                            let sender = self.shared.lane_sender.clone();
                            tokio::spawn(async move {
                                let priority = priority_for(&child.name);
                                let dropped = child.clone();
                                if let Err(e) = sender.send(priority, child).await {
                                    warn!(error = %e, "async transformer emission dropped");
                                    if matches!(e, LaneError::QueueFull) {
                                        let _ = sender.send(Priority::High, queue_full_event(&dropped)).await;
                                    }
                                }
                            });
                        } else {
                            let priority = priority_for(&child.name);
                            let dropped = child.clone();
                            if let Err(e) = self.shared.lane_sender.send(priority, child).await {
                                warn!(error = %e, "transformer emission dropped");
                                if matches!(e, LaneError::QueueFull) {
                                    let _ = self.shared.lane_sender.send(Priority::High, queue_full_event(&dropped)).await;
                                }
                            }
                        }
                    }
                }
                Ok(ApplyOutcome::LoopSuppressed) => {
                    debug!(rule = compiled.rule_id(), "transformer loop guard suppressed reapplication");
                    let error_event = transformer_loop_suppressed_event(&event, compiled.rule_id());
                    let _ = self.shared.lane_sender.send(Priority::Low, error_event).await;
                }
                Err(EngineError::DepthExceeded) => {
                    warn!(rule = compiled.rule_id(), "derived event exceeded max depth, dropping");
                }
                Err(e) => {
                    error!(rule = compiled.rule_id(), error = %e, "transformer application failed");
                    let error_event = transformer_eval_event(&event, compiled.rule_id(), &e);
                    let _ = self.shared.lane_sender.send(Priority::High, error_event).await;
                }
            }
        }

        let matching_handlers: Vec<Arc<dyn Handler>> = {
            let index = self.shared.handlers.read();
            index.lookup(&event.name).into_iter().map(|entry| entry.value.clone()).collect()
        };
        let handler_timeout = self.shared.handler_timeout;
        for handler in matching_handlers {
            if handler.is_async() {
                let name = event.name.clone();
                let data = event.data.clone();
                let context = event.context.clone();
                let task_handler = handler.clone();
                let lane_sender = self.shared.lane_sender.clone();
                let source = event.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(handler_timeout, task_handler.handle(&name, &data, &context)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            warn!(handler = task_handler.id(), error = %e, "async handler failed");
                            let error_event = handler_failed_event(&source, task_handler.id(), &e);
                            let _ = lane_sender.send(Priority::High, error_event).await;
                        }
                        Err(_) => {
                            warn!(handler = task_handler.id(), timeout_ms = handler_timeout.as_millis() as u64, "async handler timed out");
                            let error_event = handler_timeout_event(&source, task_handler.id(), handler_timeout);
                            let _ = lane_sender.send(Priority::High, error_event).await;
                        }
                    }
                });
            } else {
                let name = event.name.clone();
                let data = event.data.clone();
                let context = event.context.clone();
                let task_handler = handler.clone();
                // Spawned rather than awaited inline so a panicking handler
                // surfaces as a `JoinError` instead of unwinding this
                // dispatch loop; the `.await` right below still makes this
                // handler's completion block the next one, same as before.
                let joined = tokio::spawn(async move { tokio::time::timeout(handler_timeout, task_handler.handle(&name, &data, &context)).await });
                match joined.await {
                    Ok(Ok(Ok(()))) => {
                        self.record_handler_outcome(handler.id(), false).await;
                    }
                    Ok(Ok(Err(e))) => {
                        error!(handler = handler.id(), error = %e, "handler failed");
                        self.record_handler_outcome(handler.id(), true).await;
                        let error_event = handler_failed_event(&event, handler.id(), &e);
                        let _ = self.shared.lane_sender.send(Priority::High, error_event).await;
                    }
                    Ok(Err(_)) => {
                        warn!(handler = handler.id(), timeout_ms = handler_timeout.as_millis() as u64, "handler timed out");
                        self.record_handler_outcome(handler.id(), true).await;
                        let error_event = handler_timeout_event(&event, handler.id(), handler_timeout);
                        let _ = self.shared.lane_sender.send(Priority::High, error_event).await;
                    }
                    Err(join_err) => {
                        error!(handler = handler.id(), error = %join_err, "handler panicked");
                        self.record_handler_outcome(handler.id(), true).await;
                        let error_event = handler_failed_event(&event, handler.id(), &HandlerError::Failed(join_err.to_string()));
                        let _ = self.shared.lane_sender.send(Priority::High, error_event).await;
                    }
                }
            }
        }
    }

    /// Emits `handler:degraded` the instant a handler's rolling failure
    /// count crosses [`DEGRADED_THRESHOLD`].
    async fn record_handler_outcome(&self, handler_id: &str, failed: bool) {
        let crossed = {
            let mut health = self.shared.handler_health.lock();
            health.get_mut(handler_id).is_some_and(|entry| entry.record(failed))
        };
        if crossed {
            warn!(handler = handler_id, "handler crossed degraded threshold");
            let context = Context::root(Originator::system());
            if let Ok(event) = Event::new("handler:degraded", serde_json::json!({"handler_id": handler_id}), context, self.shared.clock.epoch_ms()) {
                let dropped = event.clone();
                if let Err(e) = self.shared.lane_sender.send(Priority::High, event).await {
                    if matches!(e, LaneError::QueueFull) {
                        let _ = self.shared.lane_sender.send(Priority::High, queue_full_event(&dropped)).await;
                    }
                }
            }
        }
    }

    async fn handle_originator(&self, event: &Event) {
        let chain_id = event.context.chain_id;
        let (return_path, is_terminal) = {
            let mut originator = self.shared.originator.lock();
            if let Some(return_path) = &event.context.originator.return_path {
                if !originator.is_installed(&chain_id) {
                    originator.install(chain_id, return_path.clone());
                }
            }
            let return_path = originator.return_path_for(&chain_id).map(str::to_string);
            (return_path, OriginatorRegistry::is_terminal(&event.name))
        };

        let Some(return_path) = return_path else { return };
        if return_path == event.name {
            // Never mirror an event back onto its own return path.
            return;
        }

        let overflow_interval = self.shared.overflow_interval;
        let now = self.shared.clock.now();
        let sent = self
            .shared
            .lane_sender
            .send(Priority::Low, mirrored_event(&return_path, event))
            .await;
        if sent.is_err() {
            let mut originator = self.shared.originator.lock();
            if originator.try_emit_overflow(&chain_id, now, overflow_interval) {
                warn!(chain = %chain_id, "mirror delivery overflowed, emitting error:originator_overflow");
                drop(originator);
                let error_event = mirror_overflow_event(event);
                let _ = self.shared.lane_sender.send(Priority::High, error_event).await;
            }
        }

        if is_terminal {
            let grace = self.shared.mirror_grace;
            self.shared.scheduler.schedule_after(grace, terminal_marker_event(chain_id));
        }
    }
}

/// A private marker event the scheduler fires after a chain's grace
/// period elapses; the runner's dispatch loop never routes it through
/// handlers or transformers, it only tears down the mirror.
const MIRROR_EXPIRE_EVENT: &str = "system:_mirror_expire";

/// A private timer-fired event carrying the id of an ephemeral rule whose
/// `ttl_seconds` has elapsed; unregistering it is a router-internal side
/// effect of dispatching this event (see [`RouterRunner::dispatch`]).
const RULE_EXPIRE_EVENT: &str = "routing:_rule_expired";

#[allow(clippy::expect_used)]
fn rule_expire_event(rule_id: &str) -> Event {
    let context = Context::root(Originator::system());
    Event::new(RULE_EXPIRE_EVENT, serde_json::json!({"rule_id": rule_id}), context, 0)
        .expect("static event name is always valid")
}

/// Build the event streamed to an originator's `return_path`: the source
/// event's wire payload, re-emitted under the return path name so it
/// never re-enters the pattern space the originator's own rules watch.
fn mirror_payload(source: &Event) -> serde_json::Value {
    serde_json::json!({"source_event": source.name, "data": source.data})
}

fn mirrored_event(return_path: &str, source: &Event) -> Event {
    let hop = (return_path.to_string(), "mirror".to_string());
    let context = source.context.child(hop, source.context.agent_id);
    Event::new(return_path.to_string(), mirror_payload(source), context, source.timestamp_ms)
        .unwrap_or_else(|_| fallback_mirror_event(source))
}

#[allow(clippy::expect_used)]
fn fallback_mirror_event(source: &Event) -> Event {
    let context = source.context.child(("stream:mirror".to_string(), "mirror".to_string()), source.context.agent_id);
    Event::new("stream:mirror", mirror_payload(source), context, source.timestamp_ms)
        .expect("static event name is always valid")
}

#[allow(clippy::expect_used)]
fn mirror_overflow_event(source: &Event) -> Event {
    let context = source.context.child(("error:originator_overflow".to_string(), "mirror".to_string()), source.context.agent_id);
    Event::new(
        "error:originator_overflow",
        serde_json::json!({"message": "originator mirror could not keep up with chain volume", "chain_id": source.context.chain_id}),
        context,
        source.timestamp_ms,
    )
    .expect("static event name is always valid")
}

#[allow(clippy::expect_used)]
fn terminal_marker_event(chain_id: EventId) -> Event {
    let mut context = Context::root(Originator::system());
    context.chain_id = chain_id;
    Event::new(MIRROR_EXPIRE_EVENT, serde_json::Value::Null, context, 0)
        .expect("static event name is always valid")
}

/// Truncates an error's `Display` output so a bounded-size payload is all
/// that ever rides in an `error:*` event, regardless of how verbose the
/// underlying error is.
const MAX_ERROR_PAYLOAD_CHARS: usize = 2_000;

fn bounded_error_message(message: impl std::fmt::Display) -> String {
    let message = message.to_string();
    if message.chars().count() <= MAX_ERROR_PAYLOAD_CHARS {
        message
    } else {
        message.chars().take(MAX_ERROR_PAYLOAD_CHARS).collect()
    }
}

#[allow(clippy::expect_used)]
fn handler_failed_event(source: &Event, handler_id: &str, error: &HandlerError) -> Event {
    let hop = ("error:handler_failed".to_string(), format!("handler:{handler_id}"));
    let context = source.context.child(hop, source.context.agent_id);
    Event::new(
        "error:handler_failed",
        serde_json::json!({
            "handler_id": handler_id,
            "event_id": source.id.to_string(),
            "error": bounded_error_message(error),
        }),
        context,
        source.timestamp_ms,
    )
    .expect("static event name is always valid")
}

#[allow(clippy::expect_used)]
fn handler_timeout_event(source: &Event, handler_id: &str, timeout: Duration) -> Event {
    let hop = ("error:handler_timeout".to_string(), format!("handler:{handler_id}"));
    let context = source.context.child(hop, source.context.agent_id);
    Event::new(
        "error:handler_timeout",
        serde_json::json!({
            "handler_id": handler_id,
            "event_id": source.id.to_string(),
            "timeout_ms": timeout.as_millis() as u64,
        }),
        context,
        source.timestamp_ms,
    )
    .expect("static event name is always valid")
}

#[allow(clippy::expect_used)]
fn queue_full_event(dropped: &Event) -> Event {
    let hop = ("error:queue_full".to_string(), "lane".to_string());
    let context = dropped.context.child(hop, dropped.context.agent_id);
    Event::new(
        "error:queue_full",
        serde_json::json!({
            "dropped_event": dropped.name,
            "event_id": dropped.id.to_string(),
            "chain_id": dropped.context.chain_id,
        }),
        context,
        dropped.timestamp_ms,
    )
    .expect("static event name is always valid")
}

#[allow(clippy::expect_used)]
fn transformer_loop_suppressed_event(source: &Event, rule_id: &str) -> Event {
    let hop = ("error:transformer_loop_suppressed".to_string(), format!("transformer:{rule_id}"));
    let context = source.context.child(hop, source.context.agent_id);
    Event::new(
        "error:transformer_loop_suppressed",
        serde_json::json!({"rule_id": rule_id, "event_id": source.id.to_string()}),
        context,
        source.timestamp_ms,
    )
    .expect("static event name is always valid")
}

#[allow(clippy::expect_used)]
fn transformer_eval_event(source: &Event, rule_id: &str, error: &EngineError) -> Event {
    let hop = ("error:transformer_eval".to_string(), format!("transformer:{rule_id}"));
    let context = source.context.child(hop, source.context.agent_id);
    Event::new(
        "error:transformer_eval",
        serde_json::json!({
            "rule_id": rule_id,
            "event_id": source.id.to_string(),
            "error": bounded_error_message(error),
        }),
        context,
        source.timestamp_ms,
    )
    .expect("static event name is always valid")
}
