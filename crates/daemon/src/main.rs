// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! ksid: the KSI event runtime daemon binary.

use ksid::lifecycle::{self, Config};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(ksid::env::log_level())).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load daemon configuration: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match lifecycle::build_runtime(&config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start daemon: {e}");
            std::process::exit(1);
        }
    };

    let router = runtime.api.router().clone();
    let shutdown = CancellationToken::new();

    let runner_handle = tokio::spawn(runtime.router_runner.run(ksid::env::drain_timeout()));

    let forwarder_handle = tokio::spawn(runtime.api.clone().run_completion_forwarder(runtime.completion_outcomes));

    let checkpoint_api = runtime.api.clone();
    let checkpoint_shutdown = shutdown.clone();
    let checkpoint_handle = tokio::spawn(async move {
        let interval = ksid::env::checkpoint_interval();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    checkpoint_api.expire_queues();
                    checkpoint_api.checkpoint();
                }
                () = checkpoint_shutdown.cancelled() => break,
            }
        }
    });

    let listener_shutdown = shutdown.clone();
    let listener_handle = tokio::spawn(ksid::listener::run(runtime.listener, runtime.api.clone(), listener_shutdown));

    info!("ksid ready");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    shutdown.cancel();
    router.begin_shutdown();

    let _ = listener_handle.await;
    let _ = runner_handle.await;
    forwarder_handle.abort();
    let _ = checkpoint_handle.await;

    lifecycle::shutdown(&config, &runtime.lock_file, &runtime.entity_store, &runtime.queue_store);
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
