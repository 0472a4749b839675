// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The Unix-domain socket accept loop. Each connection is handled on its
//! own task; most requests are one read, one dispatch, one write, but
//! `monitor:subscribe_stream` upgrades the connection into a long-lived
//! tail of the live event log.

use std::sync::Arc;

use async_trait::async_trait;
use ksi_core::Context;
use ksi_router::{Handler, HandlerError};
use ksi_wire::{read_request, write_response, Response};
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::Api;

/// Delivers `pubsub:_deliver` bridging events (installed per-topic by
/// [`crate::api::Api::dispatch`]'s `pubsub:subscribe` handling) into the
/// subscriber's actual queue or stream.
pub struct PubsubDeliverHandler {
    api: Arc<Api>,
}

impl PubsubDeliverHandler {
    pub fn new(api: Arc<Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Handler for PubsubDeliverHandler {
    fn id(&self) -> &str {
        "pubsub:_deliver"
    }

    async fn handle(&self, _name: &str, data: &Value, _context: &Context) -> Result<(), HandlerError> {
        self.api.deliver_pubsub_message(data).map_err(|e| HandlerError::Failed(e.to_string()))
    }
}

/// Reacts to the router's `routing:_rule_expired` event, emitted once an
/// ephemeral rule's `ttl_seconds` timer fires, by dropping the daemon's own
/// rule bookkeeping (the router has already unregistered the rule itself).
pub struct RuleExpiredHandler {
    api: Arc<Api>,
}

impl RuleExpiredHandler {
    pub fn new(api: Arc<Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Handler for RuleExpiredHandler {
    fn id(&self) -> &str {
        "routing:_rule_expired"
    }

    async fn handle(&self, _name: &str, data: &Value, _context: &Context) -> Result<(), HandlerError> {
        self.api.handle_rule_expired(data).map_err(|e| HandlerError::Failed(e.to_string()))
    }
}

/// Accept connections until `shutdown` fires, spawning one task per
/// connection so a slow or streaming client never blocks another.
pub async fn run(listener: UnixListener, api: Arc<Api>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let api = api.clone();
                        let conn_shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, api, conn_shutdown).await {
                                debug!(error = %e, "connection closed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            () = shutdown.cancelled() => {
                info!("listener stopping: shutdown requested");
                break;
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, api: Arc<Api>, shutdown: CancellationToken) -> Result<(), ksi_wire::ProtocolError> {
    loop {
        let request = match tokio::time::timeout(crate::env::ipc_timeout(), read_request(&mut stream)).await {
            Ok(result) => result?,
            Err(_) => return Err(ksi_wire::ProtocolError::Closed),
        };

        let streaming = request.event == "monitor:subscribe_stream";
        let response = api.dispatch(request).await;
        write_response(&mut stream, &response).await?;

        if streaming {
            return stream_events(&mut stream, &api, &response.context, shutdown).await;
        }
    }
}

/// `monitor:subscribe_stream`: after the initial ack, push every
/// subsequently dispatched event to this connection as its own frame
/// until the client disconnects or the daemon shuts down.
async fn stream_events(stream: &mut UnixStream, api: &Arc<Api>, context: &Context, shutdown: CancellationToken) -> Result<(), ksi_wire::ProtocolError> {
    let mut events = api.event_log().subscribe();
    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        let response = Response::new("monitor:event", event.to_wire_payload(), context.clone());
                        write_response(stream, &response).await?;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "monitor:subscribe_stream consumer fell behind, dropping events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
            () = shutdown.cancelled() => return Ok(()),
        }
    }
}
