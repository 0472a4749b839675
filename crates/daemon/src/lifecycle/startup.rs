// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Daemon startup: acquire the instance lock, recover durable state, load
//! the routing rule set, and wire the router/completion/state layers
//! together behind one bound socket.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write as _;
use std::sync::Arc;

use fs2::FileExt;
use ksi_completion::{CircuitBreakerConfig, CompletionOutcome, CompletionQueues, EchoProvider, RetryPolicy};
use ksi_core::{Pattern, SystemClock, Transformer};
use ksi_router::{Router, RouterConfig, RouterRunner};
use ksi_state::{EntityStore, QueueStore, RuleStore};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::Api;
use crate::listener::{PubsubDeliverHandler, RuleExpiredHandler};

use super::{Config, LifecycleError};

/// Everything `main.rs` needs to drive the daemon: the dispatch surface,
/// the router's background loop, the completion-outcome stream, and the
/// bound listener socket.
pub struct Runtime {
    pub api: Arc<Api>,
    pub router_runner: RouterRunner<SystemClock>,
    pub completion_outcomes: mpsc::UnboundedReceiver<CompletionOutcome>,
    pub listener: UnixListener,
    pub entity_store: Arc<EntityStore>,
    pub queue_store: Arc<QueueStore>,
    pub lock_file: File,
}

pub async fn build_runtime(config: &Config) -> Result<Runtime, LifecycleError> {
    match build_runtime_inner(config).await {
        Ok(runtime) => Ok(runtime),
        Err(e) => {
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn build_runtime_inner(config: &Config) -> Result<Runtime, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    if let Some(parent) = config.events_wal_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = config.events_snapshot_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.routes_persistent_dir)?;
    std::fs::create_dir_all(&config.routes_system_dir)?;

    // Acquire the lock before truncating it, so a crash-recovered daemon
    // never wipes the PID of one that's genuinely still running.
    let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    let entity_store = Arc::new(EntityStore::open(&config.events_wal_path, &config.events_snapshot_path)?);
    let queue_store = Arc::new(QueueStore::open(&config.queues_wal_path, &config.queues_snapshot_path)?);
    let rule_store = Arc::new(RuleStore::new(config.routes_persistent_dir.clone(), config.routes_system_dir.clone()));

    let router_config = RouterConfig {
        max_depth: crate::env::max_depth(),
        mirror_grace: crate::env::mirror_grace(),
        drain_timeout: crate::env::drain_timeout(),
        handler_timeout: crate::env::handler_timeout(),
        ..RouterConfig::default()
    };
    let (router, router_runner) = ksi_router::build(SystemClock, router_config);

    let mut rules: HashMap<String, Transformer> = HashMap::new();
    let mut system_rule_hashes: HashMap<String, String> = HashMap::new();
    let now_ms = ksi_core::Clock::epoch_ms(&SystemClock);

    for loaded in rule_store.load_system_all()? {
        let rule_id = loaded.transformer.rule_id.as_str().to_string();
        router.add_rule(loaded.transformer.clone())?;
        system_rule_hashes.insert(rule_id.clone(), loaded.content_hash);
        rules.insert(rule_id, loaded.transformer);
    }
    for loaded in rule_store.load_persistent_all()? {
        let rule_id = loaded.transformer.rule_id.as_str().to_string();
        router.add_rule(loaded.transformer.clone())?;
        rules.insert(rule_id, loaded.transformer);
    }
    for entity in entity_store.entities_of_type("ephemeral_rule") {
        let expired = entity.properties.get("_expires_at_ms").and_then(serde_json::Value::as_u64).is_some_and(|deadline| deadline <= now_ms);
        if expired {
            let _ = entity_store.delete_entity(&entity.id);
            continue;
        }
        match serde_json::from_value::<Transformer>(entity.properties) {
            Ok(transformer) => {
                let rule_id = transformer.rule_id.as_str().to_string();
                if let Err(e) = router.add_rule(transformer.clone()) {
                    warn!(rule_id, error = %e, "dropping unregisterable ephemeral rule recovered at startup");
                    continue;
                }
                rules.insert(rule_id, transformer);
            }
            Err(e) => warn!(entity_id = %entity.id, error = %e, "failed to deserialize recovered ephemeral rule"),
        }
    }
    info!(rule_count = rules.len(), "routing rules loaded");

    let provider = Arc::new(match crate::env::completion_echo_delay() {
        Some(delay) => EchoProvider::with_delay(delay),
        None => EchoProvider::new(),
    });
    let (completion, completion_outcomes) = CompletionQueues::new(provider, RetryPolicy::default(), CircuitBreakerConfig::default(), crate::env::completion_call_timeout());

    let api = Arc::new(Api::new(router.clone(), completion, entity_store.clone(), queue_store.clone(), rule_store, rules, system_rule_hashes));

    router.register_handler("pubsub:_deliver", Pattern::new("pubsub:_deliver"), 100, Arc::new(PubsubDeliverHandler::new(api.clone())));
    router.register_handler("routing:_rule_expired", Pattern::new("routing:_rule_expired"), 100, Arc::new(RuleExpiredHandler::new(api.clone())));

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path).map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(socket = %config.socket_path.display(), "daemon started");

    Ok(Runtime { api, router_runner, completion_outcomes, listener, entity_store, queue_store, lock_file })
}

fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.version_path.exists() {
        let _ = std::fs::remove_file(&config.version_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}
