//! Hourly Airdrop Rebuilder
//!
//! Rebuilds the hourly mint airdrop proofs, publishes the artifact and keeps
//! the distributor root in sync. Runs once (`--once`) or as an HTTP-triggered
//! service with an optional interval scheduler.

mod api;
mod auth;
mod chain;
mod config;
mod distributor;
mod publisher;
mod rebuild;
mod scanner;
mod scheduler;
mod state;
mod storage;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, RebuildConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use rebuild::{RebuildError, Rebuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.log_json);

    let config = RebuildConfig::try_from(&args).map_err(RebuildError::from);

    if args.once {
        return run_once(config).await;
    }

    let config = config?;

    tracing::info!("Starting hourly airdrop rebuilder");
    tracing::info!(
        nft = %config.nft_address,
        distributor = %config.distributor_address,
        signer = ?config.signer.address(),
        window = config.blocks_per_round,
        "Targets"
    );
    tracing::info!(listen = %args.listen, "API server");

    let metrics_addr: SocketAddr = args
        .metrics_listen
        .parse()
        .with_context(|| format!("invalid metrics listen address {}", args.metrics_listen))?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    tracing::info!(address = %metrics_addr, "Metrics exporter listening");

    let auth = auth::RebuildAuth::new(args.rebuild_token.clone(), args.alchemy_signing_key.clone());
    tracing::info!(?auth, "Rebuild trigger auth");

    let app_state = state::AppState::new(Rebuilder::connect(&config), auth);

    // Start API server
    let api_handle = tokio::spawn(api::run_server(args.listen.clone(), app_state.clone()));

    let scheduler_handle = args
        .interval_secs
        .filter(|secs| *secs > 0)
        .map(|secs| tokio::spawn(scheduler::run(app_state.clone(), Duration::from_secs(secs))));

    // Wait for shutdown
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "API server error"),
                Err(e) => tracing::error!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
        }
    }

    if let Some(handle) = scheduler_handle {
        handle.abort();
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Single rebuild; prints the result (or the failure) as JSON on stdout.
async fn run_once(config: Result<RebuildConfig, RebuildError>) -> Result<()> {
    let result = match config {
        Ok(config) => Rebuilder::connect(&config).run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            let body = serde_json::json!({
                "ok": false,
                "kind": e.kind(),
                "error": e.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(e.into())
        }
    }
}
