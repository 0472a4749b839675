// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Black-box scenarios driving the real `ksid` binary over its
//! Unix-domain socket, the way an actual client would. Each test spawns
//! its own daemon in a scratch state directory so they can run
//! concurrently; `#[serial]` is reserved for the ones that restart a
//! daemon against a shared directory.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use ksi_core::{Context, Originator, Pattern, PersistenceClass, RuleId, Target, Transformer};
use ksi_wire::{decode, encode, read_message, write_message, Request, Response};
use serial_test::serial;
use tempfile::TempDir;
use tokio::net::UnixStream;

struct Daemon {
    child: Child,
    socket_path: PathBuf,
}

impl Daemon {
    /// Spawn into a fresh, self-contained scratch directory.
    async fn spawn(extra_env: &[(&str, &str)]) -> (Self, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let daemon = Self::spawn_at(dir.path(), extra_env).await;
        (daemon, dir)
    }

    /// Spawn against a caller-owned directory, for scenarios that need the
    /// same state directory across a restart.
    async fn spawn_at(root: &Path, extra_env: &[(&str, &str)]) -> Self {
        let state_dir = root.join("state");
        let socket_path = state_dir.join("ksid.sock");
        let routes_dir = state_dir.join("routes");

        let mut command = Command::new(env!("CARGO_BIN_EXE_ksid"));
        command
            .env("KSI_STATE_DIR", &state_dir)
            .env("KSI_SOCKET_PATH", &socket_path)
            .env("KSI_ROUTES_DIR", &routes_dir)
            .env("KSI_LOG_LEVEL", "error")
            .env("KSI_CHECKPOINT_INTERVAL_MS", "200")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in extra_env {
            command.env(key, value);
        }
        let child = command.spawn().expect("spawn ksid");

        let daemon = Self { child, socket_path };
        daemon.wait_for_socket().await;
        daemon
    }

    async fn wait_for_socket(&self) {
        for _ in 0..200 {
            if UnixStream::connect(&self.socket_path).await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("ksid never opened its socket at {}", self.socket_path.display());
    }

    async fn connect(&self) -> UnixStream {
        UnixStream::connect(&self.socket_path).await.expect("connect to ksid socket")
    }

    async fn call(&self, event: &str, data: serde_json::Value) -> Response {
        let mut stream = self.connect().await;
        send(&mut stream, Request::new(event, data)).await
    }

    async fn call_with_context(&self, event: &str, data: serde_json::Value, context: Context) -> Response {
        let mut stream = self.connect().await;
        let mut request = Request::new(event, data);
        request.context = Some(context);
        send(&mut stream, request).await
    }

    /// Stop the daemon the way a process supervisor would (`SIGTERM`), so
    /// its own checkpoint-and-cleanup shutdown path actually runs.
    async fn terminate(mut self) {
        let pid = self.child.id();
        let _ = Command::new("kill").arg("-TERM").arg(pid.to_string()).status();
        tokio::task::spawn_blocking(move || {
            let _ = self.child.wait();
        })
        .await
        .ok();
    }
}

async fn send(stream: &mut UnixStream, request: Request) -> Response {
    let bytes = encode(&request).expect("encode request");
    write_message(stream, &bytes).await.expect("write request");
    let raw = tokio::time::timeout(Duration::from_secs(5), read_message(stream)).await.expect("daemon response timed out").expect("read response");
    decode(&raw).expect("decode response")
}

async fn read_until(stream: &mut UnixStream, timeout: Duration, pred: impl Fn(&Response) -> bool) -> Response {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            panic!("timed out waiting for a matching frame");
        }
        let raw = tokio::time::timeout(remaining, read_message(stream)).await.expect("timed out waiting for a frame").expect("read frame");
        let response: Response = decode(&raw).expect("decode frame");
        if pred(&response) {
            return response;
        }
    }
}

fn basic_transformer(rule_id: &str, source: &str, target_event: &str, mapping: serde_json::Value) -> Transformer {
    Transformer {
        rule_id: RuleId::from_string(rule_id),
        source_pattern: Pattern::new(source),
        condition: None,
        targets: vec![Target { event: target_event.to_string(), mapping, condition: None }],
        r#async: true,
        ttl_seconds: None,
        parent_scope: None,
        persistence_class: PersistenceClass::Ephemeral,
        priority: 100,
        exclude_patterns: vec![],
        loop_safe: false,
    }
}

#[tokio::test]
async fn pubsub_delivers_through_a_queue_subscription() {
    let (daemon, _dir) = Daemon::spawn(&[]).await;

    let subscribe = daemon.call("pubsub:subscribe", serde_json::json!({"subscriber_id": "worker-1", "topics": ["agent:log"], "delivery": "queue"})).await;
    assert_eq!(subscribe.event, "pubsub:subscribe:ok");
    let subscription_id = subscribe.data["subscription_id"].as_str().expect("subscription_id").to_string();

    daemon.call("agent:log", serde_json::json!({"agent_id": "a1", "text": "hello"})).await;

    // The bridging transformer and its handler run asynchronously off the
    // router's normal dispatch loop.
    tokio::time::sleep(Duration::from_millis(250)).await;

    let messages = daemon.call("pubsub:get_messages", serde_json::json!({"subscription_id": subscription_id})).await;
    assert_eq!(messages.event, "pubsub:get_messages:ok");
    let items = messages.data["messages"].as_array().expect("messages array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["data"]["agent_id"], "a1");
    assert_eq!(items[0]["data"]["text"], "hello");

    let drained = daemon.call("pubsub:get_messages", serde_json::json!({"subscription_id": subscription_id})).await;
    assert!(drained.data["messages"].as_array().expect("messages array").is_empty());

    daemon.terminate().await;
}

#[tokio::test]
async fn ephemeral_rule_routes_traffic_then_expires_on_its_own_ttl() {
    let (daemon, _dir) = Daemon::spawn(&[]).await;

    let mut rule = basic_transformer("rul-watch", "completion:result", "demo:handled", serde_json::json!({"agent_id": "{{agent_id}}", "result": "{{result}}"}));
    rule.condition = Some("data.agent_id == 'agent-watch'".to_string());
    rule.ttl_seconds = Some(1);

    let added = daemon.call("routing:add_rule", serde_json::to_value(&rule).expect("serialize rule")).await;
    assert_eq!(added.event, "routing:add_rule:ok");

    daemon.call("completion:async", serde_json::json!({"agent_id": "agent-watch", "input": {"prompt": "hi"}})).await;

    // Let the echo provider resolve and the forwarder re-emit completion:result.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let events = daemon.call("monitor:get_events", serde_json::json!({"limit": 50})).await;
    let fired = events.data["events"]
        .as_array()
        .expect("events array")
        .iter()
        .any(|event| event["name"] == "demo:handled" && event["data"]["agent_id"] == "agent-watch");
    assert!(fired, "watch rule never routed a matching completion:result");

    // The rule is still registered until its ttl_seconds elapses.
    let rules = daemon.call("routing:list_rules", serde_json::json!({})).await;
    let still_present = rules.data["rules"].as_array().expect("rules array").iter().any(|r| r["rule_id"] == "rul-watch");
    assert!(still_present);

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let rules = daemon.call("routing:list_rules", serde_json::json!({})).await;
    let still_present = rules.data["rules"].as_array().expect("rules array").iter().any(|r| r["rule_id"] == "rul-watch");
    assert!(!still_present, "watch rule should have expired and been unregistered");

    daemon.terminate().await;
}

#[tokio::test]
async fn originator_mirror_streams_chain_events_to_the_return_path() {
    let (daemon, _dir) = Daemon::spawn(&[]).await;

    let mut tail = daemon.connect().await;
    let ack = send(&mut tail, Request::new("monitor:subscribe_stream", serde_json::json!({}))).await;
    assert_eq!(ack.event, "monitor:subscribe_stream:ok");

    let context = Context::root(Originator::external("client-2", Some("stream:c1".to_string())));
    daemon.call_with_context("completion:async", serde_json::json!({"agent_id": "agent-stream", "input": {"x": 1}}), context).await;

    let mirrored = read_until(&mut tail, Duration::from_secs(5), |response| {
        response.event == "monitor:event" && response.data.get("source_event").and_then(|v| v.as_str()) == Some("completion:result")
    })
    .await;
    assert_eq!(mirrored.data["data"]["agent_id"], "agent-stream");
    assert_eq!(mirrored.data["data"]["result"]["echo"]["x"], 1);

    daemon.terminate().await;
}

#[tokio::test]
async fn injected_completion_call_jumps_the_queue() {
    let (daemon, _dir) = Daemon::spawn(&[("KSI_COMPLETION_ECHO_DELAY_MS", "150")]).await;

    let agent_id = "agent-inject";
    daemon.call("completion:async", serde_json::json!({"agent_id": agent_id, "input": {"label": "first"}})).await;
    daemon.call("completion:async", serde_json::json!({"agent_id": agent_id, "input": {"label": "second"}})).await;
    daemon.call("completion:inject", serde_json::json!({"agent_id": agent_id, "input": {"label": "third"}})).await;

    // Three ~150ms calls, serialized one per agent; give it ample headroom.
    tokio::time::sleep(Duration::from_millis(900)).await;

    let events = daemon.call("monitor:get_events", serde_json::json!({"limit": 50})).await;
    let labels: Vec<String> = events.data["events"]
        .as_array()
        .expect("events array")
        .iter()
        .filter(|event| event["name"] == "completion:result" && event["data"]["agent_id"] == agent_id)
        .filter_map(|event| event["data"]["result"]["echo"]["label"].as_str().map(str::to_string))
        .collect();

    assert_eq!(labels, vec!["first", "third", "second"]);

    daemon.terminate().await;
}

#[tokio::test]
async fn self_matching_rule_needs_an_explicit_loop_guard() {
    let (daemon, _dir) = Daemon::spawn(&[]).await;

    let unguarded = basic_transformer("rul-loop", "demo:echo", "demo:echo", serde_json::json!({}));
    let rejected = daemon.call("routing:add_rule", serde_json::to_value(&unguarded).expect("serialize rule")).await;
    assert!(rejected.event.starts_with("error:"), "unguarded self-matching rule should have been rejected");

    let mut guarded = unguarded;
    guarded.rule_id = RuleId::from_string("rul-loop-guarded");
    guarded.exclude_patterns = vec![Pattern::new("demo:echo")];
    let accepted = daemon.call("routing:add_rule", serde_json::to_value(&guarded).expect("serialize rule")).await;
    assert_eq!(accepted.event, "routing:add_rule:ok");

    daemon.terminate().await;
}

#[tokio::test]
#[serial]
async fn routes_and_queued_state_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    let daemon = Daemon::spawn_at(dir.path(), &[]).await;

    let mut persistent_rule = basic_transformer("rul-persisted", "demo:persisted", "demo:persisted_out", serde_json::json!({}));
    persistent_rule.persistence_class = PersistenceClass::Persistent;
    let added = daemon.call("routing:add_rule", serde_json::to_value(&persistent_rule).expect("serialize rule")).await;
    assert_eq!(added.event, "routing:add_rule:ok");

    let mut ephemeral_rule = basic_transformer("rul-ephemeral", "demo:ephemeral_src", "demo:ephemeral_out", serde_json::json!({}));
    ephemeral_rule.ttl_seconds = Some(120);
    let added = daemon.call("routing:add_rule", serde_json::to_value(&ephemeral_rule).expect("serialize rule")).await;
    assert_eq!(added.event, "routing:add_rule:ok");

    let pushed = daemon.call("async_state:push", serde_json::json!({"namespace": "demo", "key": "k1", "data": {"x": 1}})).await;
    assert_eq!(pushed.event, "async_state:push:ok");
    let queue_id = pushed.data["queue_id"].as_str().expect("queue_id").to_string();

    // Force a checkpoint before the restart rather than racing the timer.
    tokio::time::sleep(Duration::from_millis(300)).await;
    daemon.terminate().await;

    let daemon = Daemon::spawn_at(dir.path(), &[]).await;

    let rules = daemon.call("routing:list_rules", serde_json::json!({})).await;
    let rule_ids: Vec<&str> = rules.data["rules"].as_array().expect("rules array").iter().filter_map(|r| r["rule_id"].as_str()).collect();
    assert!(rule_ids.contains(&"rul-persisted"), "persistent rule did not survive the restart");
    assert!(rule_ids.contains(&"rul-ephemeral"), "unexpired ephemeral rule did not survive the restart");

    let queue = daemon.call("async_state:get_queue", serde_json::json!({"queue_id": queue_id})).await;
    let items = queue.data["items"].as_array().expect("items array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["data"]["x"], 1);

    daemon.terminate().await;
}
