// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use log_sink::{
    config, logger::Formatter, Dispatcher, HttpUpstreamClient, Ingress, TokenSource,
    UpstreamClient,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_SINK_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return;
    }

    debug!("Logging subsystem enabled");

    let config = match config::Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on log sink startup: {e}");
            return;
        }
    };

    let upstream_url = config.upstream_url();
    let client: Arc<dyn UpstreamClient> =
        match HttpUpstreamClient::try_new(upstream_url.clone(), config.proxy_url.as_deref()) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("Error creating upstream client, check the proxy configuration: {e}");
                return;
            }
        };
    let tokens: Arc<dyn TokenSource> = Arc::new(config.token.clone());
    let dispatcher = Arc::new(Dispatcher::new(
        config.dispatcher_config(),
        client,
        tokens,
    ));

    let ingress = Ingress::new(config.ingress_config(), Arc::clone(&dispatcher));
    let ingress_cancel_token = CancellationToken::new();
    let ingress_shutdown = ingress_cancel_token.clone();
    let mut ingress_handle = tokio::spawn(async move {
        if let Err(e) = ingress.start(ingress_shutdown).await {
            error!("Error when running log sink ingress: {e}");
        }
    });

    info!(
        "log-sink: listening on {}:{}, forwarding to {upstream_url}",
        config.host, config.port
    );

    tokio::select! {
        _ = shutdown_signal() => info!("log-sink: shutdown signal received"),
        _ = &mut ingress_handle => warn!("log-sink: ingress stopped unexpectedly"),
    }

    ingress_cancel_token.cancel();
    let drained = dispatcher.shutdown(config.shutdown_timeout).await;
    let stats = dispatcher.stats();
    info!(
        "log-sink: stopped (drained: {drained}, accepted: {}, delivered: {}, exhausted: {}, rejected by upstream: {}, rejected on overflow: {}, abandoned: {})",
        stats.accepted,
        stats.delivered,
        stats.exhausted,
        stats.rejected_by_upstream,
        stats.rejected_on_overflow,
        stats.abandoned
    );
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Unable to listen for SIGTERM: {e}");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Unable to listen for ctrl-c: {e}");
                    }
                    return;
                }
            };
        tokio::select! {
            _ = sigterm.recv() => {},
            res = tokio::signal::ctrl_c() => if let Err(e) = res {
                error!("Unable to listen for ctrl-c: {e}");
            },
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for ctrl-c: {e}");
        }
    }
}
