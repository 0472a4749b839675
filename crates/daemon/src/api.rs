// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The daemon's request/response surface: one method per socket-visible
//! operation, each translating a
//! [`Request`] into calls against the router, completion queues, and
//! durable stores, and building the matching [`Response`].
//!
//! Every operation is still routed through [`ksi_router::Router::emit_with_context`]
//! as well, so the declarative routing fabric (transformers, the
//! originator mirror, `monitor:get_events`) observes it exactly as it
//! would an event arriving from any other source.

use std::collections::HashMap;
use std::sync::Arc;

use ksi_completion::{CompletionError, CompletionOutcome, CompletionQueues, EchoProvider};
use ksi_core::{
    AgentId, Clock, Context, DeliveryMode, Originator, ParentScope, Pattern, PersistenceClass, QueueItem, RuleId, SubscriptionId, SystemClock, Target, Transformer,
};
use ksi_router::{EventLog, Router, RouterError};
use ksi_state::{EntityRecord, EntityStore, QueueStore, ReloadDiff, RuleStore};
use ksi_wire::{Request, Response};
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    State(#[from] ksi_state::StateError),
    #[error("malformed request payload: {0}")]
    BadRequest(String),
    #[error("no such rule {0:?}")]
    UnknownRule(String),
    #[error("no such subscription {0:?}")]
    UnknownSubscription(String),
}

/// Everything a connection handler needs to answer a [`Request`].
pub struct Api {
    router: Router<SystemClock>,
    completion: Arc<CompletionQueues<EchoProvider>>,
    entity_store: Arc<EntityStore>,
    queue_store: Arc<QueueStore>,
    rule_store: Arc<RuleStore>,
    clock: SystemClock,
    /// Mirrors what's registered in the router, keyed by rule id, so
    /// `routing:list_rules` can report full rule bodies (the router
    /// itself only exposes registered *patterns* via `discover`).
    rules: Mutex<HashMap<String, Transformer>>,
    /// Rule ids installed on behalf of a `pubsub:subscribe`, for cascade
    /// removal on `pubsub:unsubscribe`.
    subscription_rules: Mutex<HashMap<String, Vec<RuleId>>>,
    /// Content hashes of the system rule set as of the last load/reload,
    /// for `system:reload_routes` diffing.
    system_rule_hashes: Mutex<HashMap<String, String>>,
    /// Context of the request that enqueued a completion call, so the
    /// eventual result can be emitted back onto the same causal chain
    /// (and therefore reach the same originator mirror).
    pending_completions: Mutex<HashMap<String, Context>>,
}

impl Api {
    pub fn new(
        router: Router<SystemClock>,
        completion: Arc<CompletionQueues<EchoProvider>>,
        entity_store: Arc<EntityStore>,
        queue_store: Arc<QueueStore>,
        rule_store: Arc<RuleStore>,
        rules: HashMap<String, Transformer>,
        system_rule_hashes: HashMap<String, String>,
    ) -> Self {
        Self {
            router,
            completion,
            entity_store,
            queue_store,
            rule_store,
            clock: SystemClock,
            rules: Mutex::new(rules),
            subscription_rules: Mutex::new(HashMap::new()),
            system_rule_hashes: Mutex::new(system_rule_hashes),
            pending_completions: Mutex::new(HashMap::new()),
        }
    }

    pub fn router(&self) -> &Router<SystemClock> {
        &self.router
    }

    fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    fn ctx_of(req: &Request) -> Context {
        req.context.clone().unwrap_or_else(|| Context::root(Originator::external("cli", None)))
    }

    /// Dispatch one request, always also mirroring it onto the router so
    /// the declarative routing fabric sees it.
    pub async fn dispatch(&self, request: Request) -> Response {
        let context = Self::ctx_of(&request);
        let _ = self.router.emit_with_context(request.event.clone(), request.data.clone(), context.clone()).await;

        let result = match request.event.as_str() {
            "system:startup" | "system:status" => Ok(self.system_status()),
            "system:shutdown" => self.system_shutdown(),
            "system:discover" => Ok(json!({"events": self.router.discover()})),
            "system:reload_routes" => self.system_reload_routes(),
            "routing:add_rule" => self.routing_add_rule(&request.data, &context),
            "routing:remove_rule" => self.routing_remove_rule(&request.data),
            "routing:list_rules" => Ok(self.routing_list_rules()),
            "async_state:push" => self.async_state_push(&request.data),
            "async_state:pop" => self.async_state_pop(&request.data),
            "async_state:get_queue" => Ok(self.async_state_get_queue(&request.data)),
            "async_state:expire_queue" => self.async_state_expire_queue(&request.data),
            "pubsub:subscribe" => self.pubsub_subscribe(&request.data),
            "pubsub:unsubscribe" => self.pubsub_unsubscribe(&request.data),
            "pubsub:get_messages" => self.pubsub_get_messages(&request.data),
            "completion:async" => self.completion_enqueue(&request.data, &context, false).await,
            "completion:inject" => self.completion_enqueue(&request.data, &context, true).await,
            "agent:spawned" => self.agent_spawned(&request.data),
            "agent:terminated" => self.agent_terminated(&request.data),
            "monitor:get_events" => Ok(self.monitor_get_events(&request.data).await),
            // The actual upgrade to a long-lived tail happens in the listener
            // once it sees this ack go out; nothing more to do here.
            "monitor:subscribe_stream" => Ok(json!({"streaming": true})),
            other => Err(ApiError::BadRequest(format!("unrecognized event {other:?}"))),
        };

        match result {
            Ok(data) => Response::new(format!("{}:ok", request.event), data, context),
            Err(e) => {
                warn!(event = %request.event, error = %e, "request failed");
                Response::error(&error_kind(&e), e.to_string(), context)
            }
        }
    }

    fn system_status(&self) -> Value {
        json!({ "patterns": self.router.discover() })
    }

    fn system_shutdown(&self) -> Result<Value, ApiError> {
        info!("system:shutdown requested");
        self.router.begin_shutdown();
        Ok(json!({ "shutting_down": true }))
    }

    fn system_reload_routes(&self) -> Result<Value, ApiError> {
        let previous = self.system_rule_hashes.lock().clone();
        let diff: ReloadDiff = self.rule_store.reload_diff(&previous)?;

        for loaded in diff.added.iter().chain(diff.changed.iter()) {
            let rule_id = loaded.transformer.rule_id.as_str().to_string();
            let _ = self.router.remove_rule(&rule_id);
            self.router.add_rule(loaded.transformer.clone())?;
            self.rules.lock().insert(rule_id, loaded.transformer.clone());
        }
        for rule_id in &diff.removed {
            let _ = self.router.remove_rule(rule_id);
            self.rules.lock().remove(rule_id);
        }

        let mut hashes = self.system_rule_hashes.lock();
        hashes.clear();
        for loaded in self.rule_store.load_system_all()? {
            hashes.insert(loaded.transformer.rule_id.as_str().to_string(), loaded.content_hash);
        }

        Ok(json!({
            "added": diff.added.len(),
            "changed": diff.changed.len(),
            "removed": diff.removed.len(),
            "unchanged": diff.unchanged_count,
        }))
    }

    fn routing_add_rule(&self, data: &Value, _context: &Context) -> Result<Value, ApiError> {
        let mut transformer: Transformer = serde_json::from_value(data.clone()).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if transformer.rule_id.as_str().is_empty() {
            transformer.rule_id = RuleId::new();
        }
        let rule_id = self.router.add_rule(transformer.clone())?;

        match transformer.persistence_class {
            PersistenceClass::Persistent => {
                let namespace = transformer.source_pattern.segments().first().copied().unwrap_or("default").to_string();
                self.rule_store.save_persistent(&namespace, &transformer)?;
            }
            PersistenceClass::Ephemeral => {
                self.store_ephemeral_rule(&transformer)?;
            }
            PersistenceClass::System => {}
        }
        self.rules.lock().insert(rule_id.as_str().to_string(), transformer);
        Ok(json!({ "rule_id": rule_id.as_str() }))
    }

    fn store_ephemeral_rule(&self, transformer: &Transformer) -> Result<(), ApiError> {
        let mut properties = serde_json::to_value(transformer).unwrap_or(Value::Null);
        if let (Some(ttl), Value::Object(map)) = (transformer.ttl_seconds, &mut properties) {
            map.insert("_expires_at_ms".to_string(), json!(self.now_ms() + ttl * 1000));
        }
        self.entity_store.put_entity(EntityRecord {
            id: transformer.rule_id.as_str().to_string(),
            entity_type: "ephemeral_rule".to_string(),
            properties,
            created_at_ms: self.now_ms(),
            updated_at_ms: self.now_ms(),
        })?;
        Ok(())
    }

    fn routing_remove_rule(&self, data: &Value) -> Result<Value, ApiError> {
        let rule_id = data.get("rule_id").and_then(Value::as_str).ok_or_else(|| ApiError::BadRequest("missing rule_id".into()))?;
        self.router.remove_rule(rule_id)?;
        self.rules.lock().remove(rule_id);
        let _ = self.entity_store.delete_entity(rule_id);
        // Best-effort: only persistent rules actually live under a
        // namespace directory; unknown namespace is a harmless no-op.
        if let Some(transformer) = self.rules.lock().get(rule_id) {
            let namespace = transformer.source_pattern.segments().first().copied().unwrap_or("default");
            let _ = self.rule_store.delete_persistent(namespace, &ksi_core::RuleId::from_string(rule_id));
        }
        Ok(json!({ "removed": rule_id }))
    }

    fn routing_list_rules(&self) -> Value {
        let rules = self.rules.lock();
        let list: Vec<Value> = rules.values().map(|t| serde_json::to_value(t).unwrap_or(Value::Null)).collect();
        json!({ "rules": list })
    }

    fn async_state_push(&self, data: &Value) -> Result<Value, ApiError> {
        let namespace = require_str(data, "namespace")?;
        let key = require_str(data, "key")?;
        let payload = data.get("data").cloned().unwrap_or(Value::Null);
        let queue_id = self.queue_store.push(namespace, key, payload, self.now_ms())?;
        if let Some(ttl) = data.get("ttl_seconds").and_then(Value::as_u64) {
            let (ns, key) = split_queue_id(&queue_id);
            self.queue_store.set_ttl(ns, key, Some(self.now_ms() + ttl * 1000), self.now_ms())?;
        }
        Ok(json!({ "queue_id": queue_id }))
    }

    fn async_state_pop(&self, data: &Value) -> Result<Value, ApiError> {
        let queue_id = require_str(data, "queue_id")?;
        let item = self.queue_store.pop(queue_id)?;
        Ok(json!({ "item": item.map(item_to_json) }))
    }

    fn async_state_get_queue(&self, data: &Value) -> Value {
        let Ok(queue_id) = require_str(data, "queue_id") else {
            return json!({ "items": [] });
        };
        let limit = data.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;
        let items: Vec<Value> = self.queue_store.peek(queue_id, limit).into_iter().map(item_to_json).collect();
        json!({ "items": items })
    }

    fn async_state_expire_queue(&self, data: &Value) -> Result<Value, ApiError> {
        let queue_id = require_str(data, "queue_id")?;
        let (namespace, key) = split_queue_id(queue_id);
        self.queue_store.set_ttl(namespace, key, Some(0), self.now_ms())?;
        let expired = self.queue_store.expire_due(self.now_ms())?;
        Ok(json!({ "expired": expired }))
    }

    fn pubsub_subscribe(&self, data: &Value) -> Result<Value, ApiError> {
        let subscriber_id = require_str(data, "subscriber_id")?.to_string();
        let topics: Vec<String> = data
            .get("topics")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::BadRequest("missing topics".into()))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let delivery = match data.get("delivery").and_then(Value::as_str).unwrap_or("queue") {
            "event" => DeliveryMode::Event,
            "stream" => DeliveryMode::Stream,
            "inject" => DeliveryMode::Inject,
            _ => DeliveryMode::Queue,
        };

        let subscription = ksi_core::Subscription::new(subscriber_id, topics.clone(), delivery);
        self.entity_store.put_entity(EntityRecord {
            id: subscription.id.as_str().to_string(),
            entity_type: "subscription".to_string(),
            properties: serde_json::to_value(&subscription).unwrap_or(Value::Null),
            created_at_ms: self.now_ms(),
            updated_at_ms: self.now_ms(),
        })?;

        let mut rule_ids = Vec::with_capacity(topics.len());
        for topic in &topics {
            let rule_id = RuleId::new();
            let transformer = Transformer {
                rule_id: rule_id.clone(),
                source_pattern: Pattern::new(topic.clone()),
                condition: None,
                targets: vec![Target {
                    event: "pubsub:_deliver".to_string(),
                    mapping: json!({
                        "subscription_id": subscription.id.as_str(),
                        "topic": topic,
                        "payload": "{{$}}",
                        "source_event": "{{__source_event__}}",
                    }),
                    condition: None,
                }],
                r#async: true,
                ttl_seconds: None,
                parent_scope: Some(ParentScope { kind: "subscription".to_string(), id: subscription.id.as_str().to_string() }),
                persistence_class: PersistenceClass::Ephemeral,
                priority: 100,
                exclude_patterns: vec![Pattern::new("pubsub:*")],
                loop_safe: false,
            };
            self.router.add_rule(transformer.clone())?;
            self.rules.lock().insert(rule_id.as_str().to_string(), transformer);
            rule_ids.push(rule_id);
        }
        self.subscription_rules.lock().insert(subscription.id.as_str().to_string(), rule_ids);

        Ok(json!({ "subscription_id": subscription.id.as_str() }))
    }

    fn pubsub_unsubscribe(&self, data: &Value) -> Result<Value, ApiError> {
        let subscription_id = require_str(data, "subscription_id")?;
        let rule_ids = self
            .subscription_rules
            .lock()
            .remove(subscription_id)
            .ok_or_else(|| ApiError::UnknownSubscription(subscription_id.to_string()))?;
        for rule_id in rule_ids {
            let _ = self.router.remove_rule(rule_id.as_str());
            self.rules.lock().remove(rule_id.as_str());
        }
        let _ = self.entity_store.delete_entity(subscription_id);
        Ok(json!({ "unsubscribed": subscription_id }))
    }

    fn pubsub_get_messages(&self, data: &Value) -> Result<Value, ApiError> {
        let subscription_id = require_str(data, "subscription_id")?;
        let limit = data.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
        let queue_id = ksi_core::queue::queue_id("pubsub", subscription_id);
        let mut messages = Vec::with_capacity(limit);
        for _ in 0..limit {
            match self.queue_store.pop(&queue_id)? {
                Some(item) => messages.push(item_to_json(item)),
                None => break,
            }
        }
        Ok(json!({ "messages": messages }))
    }

    /// Delivery handler for the internal `pubsub:_deliver` bridging event
    /// emitted by the per-topic transformer registered in
    /// [`Self::pubsub_subscribe`] (see [`crate::listener::PubsubDeliverHandler`]).
    pub fn deliver_pubsub_message(&self, data: &Value) -> Result<(), ApiError> {
        let subscription_id = require_str(data, "subscription_id")?;
        let Some(entity) = self.entity_store.get_entity(subscription_id) else {
            return Ok(());
        };
        let subscription: ksi_core::Subscription = serde_json::from_value(entity.properties).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let payload = data.get("payload").cloned().unwrap_or(Value::Null);
        match subscription.delivery {
            DeliveryMode::Queue => {
                self.queue_store.push("pubsub", subscription_id, payload, self.now_ms())?;
            }
            DeliveryMode::Event | DeliveryMode::Stream | DeliveryMode::Inject => {
                let ctx = Context::root(Originator::system());
                self.entity_store.append_event(ksi_state::EventRecord {
                    id: ctx.event_id,
                    chain_id: ctx.chain_id,
                    parent_id: None,
                    name: "pubsub:message".to_string(),
                    payload: json!({ "subscription_id": subscription_id, "data": payload }),
                    ts_ms: self.now_ms(),
                })?;
            }
        }
        Ok(())
    }

    async fn completion_enqueue(&self, data: &Value, context: &Context, inject: bool) -> Result<Value, ApiError> {
        let agent_id = AgentId::from_string(require_str(data, "agent_id")?);
        let input = data.get("input").cloned().unwrap_or(Value::Null);
        let request_id = ksi_core::RequestId::new();
        self.pending_completions.lock().insert(request_id.as_str().to_string(), context.clone());
        if inject {
            self.completion.inject(agent_id, request_id.clone(), input);
        } else {
            self.completion.enqueue(agent_id, request_id.clone(), input);
        }
        Ok(json!({ "request_id": request_id.as_str() }))
    }

    fn agent_spawned(&self, data: &Value) -> Result<Value, ApiError> {
        let agent_id = require_str(data, "agent_id")?.to_string();
        let mut handle = ksi_core::AgentHandle::new(AgentId::from_string(&agent_id));
        handle.return_path = data.get("return_path").and_then(Value::as_str).map(str::to_string);
        self.entity_store.put_entity(EntityRecord {
            id: agent_id,
            entity_type: "agent".to_string(),
            properties: serde_json::to_value(&handle).unwrap_or(Value::Null),
            created_at_ms: self.now_ms(),
            updated_at_ms: self.now_ms(),
        })?;
        Ok(json!({ "ok": true }))
    }

    fn agent_terminated(&self, data: &Value) -> Result<Value, ApiError> {
        let agent_id = require_str(data, "agent_id")?;
        self.completion.cancel_agent(&AgentId::from_string(agent_id));
        let _ = self.entity_store.delete_entity(agent_id);
        Ok(json!({ "ok": true }))
    }

    async fn monitor_get_events(&self, data: &Value) -> Value {
        let limit = data.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;
        let events = self.router.event_log().tail(limit).await;
        json!({ "events": events })
    }

    /// Reacts to the router's internal `routing:_rule_expired` event (fired
    /// once a rule's `ttl_seconds` scheduler timer elapses): drop the
    /// bookkeeping this layer keeps alongside the router's own registry so
    /// `routing:list_rules` and the ephemeral-rule entity table agree with
    /// what the router actually has registered.
    pub fn handle_rule_expired(&self, data: &Value) -> Result<(), ApiError> {
        let rule_id = require_str(data, "rule_id")?;
        self.rules.lock().remove(rule_id);
        let _ = self.entity_store.delete_entity(rule_id);
        Ok(())
    }

    pub fn event_log(&self) -> Arc<ksi_router::BoundedEventLog> {
        self.router.event_log()
    }

    /// Consumes completion outcomes forever, translating each into a
    /// `completion:result` (or `error:*`) event emitted back onto the
    /// originating causal chain, so it reaches the originator mirror like
    /// any other event on that chain.
    pub async fn run_completion_forwarder(self: Arc<Self>, mut outcomes: mpsc::UnboundedReceiver<CompletionOutcome>) {
        while let Some(outcome) = outcomes.recv().await {
            let context = self
                .pending_completions
                .lock()
                .remove(outcome.request_id.as_str())
                .unwrap_or_else(|| Context::root(Originator::agent(outcome.agent_id.as_str())));
            let child = context.child(("completion:result".to_string(), "completion:queue".to_string()), Some(outcome.agent_id.clone()));

            let (name, data) = match outcome.result {
                Ok(value) => ("completion:result".to_string(), json!({ "request_id": outcome.request_id.as_str(), "agent_id": outcome.agent_id.as_str(), "result": value })),
                Err(e) => (format!("error:{}", completion_error_kind(&e)), json!({ "request_id": outcome.request_id.as_str(), "agent_id": outcome.agent_id.as_str(), "message": e.to_string() })),
            };
            if let Err(e) = self.router.emit_with_context(name, data, child).await {
                warn!(error = %e, "failed to emit completion outcome");
            }
        }
    }

    /// Periodic checkpoint of both durable stores, run on a timer by
    /// `main.rs`.
    pub fn checkpoint(&self) {
        if let Err(e) = self.entity_store.checkpoint() {
            warn!(error = %e, "entity store checkpoint failed");
        }
        if let Err(e) = self.queue_store.checkpoint() {
            warn!(error = %e, "queue store checkpoint failed");
        }
    }

    /// Drop every queue whose TTL has elapsed. Run on the same cadence as
    /// the checkpoint timer.
    pub fn expire_queues(&self) {
        if let Err(e) = self.queue_store.expire_due(self.now_ms()) {
            warn!(error = %e, "queue expiry sweep failed");
        }
    }
}

fn require_str<'a>(data: &'a Value, field: &str) -> Result<&'a str, ApiError> {
    data.get(field).and_then(Value::as_str).ok_or_else(|| ApiError::BadRequest(format!("missing {field:?}")))
}

fn split_queue_id(queue_id: &str) -> (&str, &str) {
    let rest = queue_id.strip_prefix("queue:").unwrap_or(queue_id);
    rest.split_once(':').unwrap_or((rest, ""))
}

fn item_to_json(item: QueueItem) -> Value {
    json!({ "data": item.data, "pushed_at_ms": item.pushed_at_ms })
}

fn completion_error_kind(e: &CompletionError) -> &'static str {
    match e {
        CompletionError::Timeout => "completion_timeout",
        CompletionError::CircuitOpen => "completion_circuit_open",
        CompletionError::Cancelled => "cancelled",
        CompletionError::Transport(_) => "completion_transport",
        CompletionError::Provider(_) => "completion_provider",
        CompletionError::QueueFull => "completion_queue_full",
    }
}

fn error_kind(e: &ApiError) -> String {
    match e {
        ApiError::Router(_) => "validation".to_string(),
        ApiError::State(_) => "internal".to_string(),
        ApiError::BadRequest(_) => "validation".to_string(),
        ApiError::UnknownRule(_) => "not_found".to_string(),
        ApiError::UnknownSubscription(_) => "not_found".to_string(),
    }
}
