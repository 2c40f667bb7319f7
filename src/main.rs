/*
 * Meeting Orchestrator
 * Copyright (c) 2024 Meeting Orchestrator Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 */

use std::sync::Arc;

use anyhow::{Context, Result};

use meeting_orchestrator::api;
use meeting_orchestrator::artifact_store::{ArtifactStore, HttpArtifactStore, LocalArtifactStore};
use meeting_orchestrator::browser::BrowserContextPool;
use meeting_orchestrator::config::Config;
use meeting_orchestrator::diarizer::{Diarizer, DisabledLocalDiarizer};
use meeting_orchestrator::events::{EventSink, HybridEventSink};
use meeting_orchestrator::profile_registry::ProfileRegistry;
use meeting_orchestrator::scheduler::Scheduler;
use meeting_orchestrator::session_runner::Services;

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(EnvFilter::from_default_env().add_directive("meeting_orchestrator=info".parse().unwrap())),
    );

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already set");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let config = Arc::new(Config::load().await.context("failed to load configuration")?);
    tracing::info!(port = config.api_port, "meeting orchestrator starting");

    let artifact_store: Arc<dyn ArtifactStore> = match &config.artifact_store_endpoint {
        Some(endpoint) => Arc::new(HttpArtifactStore::new(config.data_dir.clone(), endpoint.clone())),
        None => Arc::new(LocalArtifactStore::new(config.data_dir.clone())),
    };
    let event_sink: Arc<dyn EventSink> = Arc::new(HybridEventSink::new(config.event_sink_endpoint.clone()));

    let services = Arc::new(Services {
        profile_registry: Arc::new(
            ProfileRegistry::new(config.profiles_root.clone(), config.default_profile_name.clone())
                .context("failed to initialize profile registry")?,
        ),
        browser_pool: Arc::new(BrowserContextPool::new(config.clone())),
        diarizer: Arc::new(Diarizer::new(Box::new(DisabledLocalDiarizer), config.diarization_endpoint_url.clone())),
        event_sink,
        artifact_store,
        config: config.clone(),
    });

    let scheduler = Arc::new(Scheduler::new(services));

    let shutdown_scheduler = scheduler.clone();
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("failed to install signal handler")?;

    let app = api::router(scheduler.clone());
    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind admission server on {addr}"))?;
    tracing::info!(%addr, "admission server listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("admission server exited unexpectedly")?;
        }
        _ = shutdown_rx.recv() => {
            tracing::info!("shutdown signal received, draining sessions");
            shutdown_scheduler.shutdown().await;
        }
    }

    Ok(())
}
