// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Process entrypoint: wires an in-memory demo fleet into the admin HTTP
//! surface and serves it until Ctrl-C.

mod demo;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use corral_admin::AppState;
use corral_drain::Drainer;
use corral_filter::FilterGate;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::demo::{DemoConnector, DemoRegistry};

#[derive(Parser)]
#[command(name = "corral", version, about = "Admin-driven control plane for a fleet of device connections")]
struct Cli {
    /// Address the admin HTTP server binds to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Seeds an in-memory demo fleet of this many devices for local trial
    /// runs, in place of a real device registry.
    #[arg(long, default_value_t = 0)]
    demo_devices: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let registry = Arc::new(DemoRegistry::new(cli.demo_devices));
    let connector = Arc::new(DemoConnector::new(Arc::clone(&registry)));
    let state = AppState {
        gate: Arc::new(FilterGate::new()),
        drainer: Drainer::new(registry, connector),
    };

    let listener = TcpListener::bind(cli.bind).await?;
    tracing::info!(bind = %cli.bind, demo_devices = cli.demo_devices, "admin server listening");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    axum::serve(listener, corral_admin::router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}
