// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally serve` command implementation.
//!
//! Starts the full pipeline: an axum ingress accepting normalized
//! inbound events, the classifier and bounded task queue, dispatch
//! workers driving the analysis engine, and the configured chat
//! platform adapter. Supports graceful shutdown via signal handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tracing::{error, info, warn};

use tally_config::model::TallyConfig;
use tally_core::error::TallyError;
use tally_core::types::{HealthStatus, InboundEvent};
use tally_core::{AnalysisEngine, PlatformClient, ReplyRenderer};
use tally_engine::HttpEngine;
use tally_pipeline::{
    Deduplicator, Dispatcher, DispatcherOptions, EventClassifier, TaskQueue, UserFileRegistry,
    shutdown,
};
use tally_report::MarkdownRenderer;
use tally_webhook::WebhookPlatform;

/// Window granted to in-flight tasks after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct AppState {
    classifier: Arc<EventClassifier>,
    platform: Arc<dyn PlatformClient>,
}

/// Instantiates the chat platform adapter named by `platform.kind`.
fn build_platform(config: &TallyConfig) -> Result<Arc<dyn PlatformClient>, TallyError> {
    match config.platform.kind.as_str() {
        "webhook" => Ok(Arc::new(WebhookPlatform::new(&config.platform)?)),
        other => Err(TallyError::Config(format!(
            "unknown platform kind '{other}' (supported: webhook)"
        ))),
    }
}

/// Runs the `tally serve` command.
///
/// Wires the pipeline stages together, spawns the dispatch workers, and
/// serves the event ingress until SIGINT or SIGTERM. On shutdown the
/// queue is closed, discarded tasks are logged, and in-flight tasks get
/// a bounded drain window.
pub async fn run_serve(config: TallyConfig) -> Result<(), TallyError> {
    init_tracing(&config.server.log_level);

    info!(name = config.server.name.as_str(), "starting tally serve");

    let platform = build_platform(&config)?;
    info!(platform = platform.name(), "platform adapter initialized");

    let engine: Arc<dyn AnalysisEngine> = Arc::new(HttpEngine::new(&config.engine).map_err(|e| {
        error!(error = %e, "failed to initialize analysis engine client");
        e
    })?);
    let renderer: Arc<dyn ReplyRenderer> = Arc::new(MarkdownRenderer::new());

    let dedup = Arc::new(Deduplicator::new(Duration::from_secs(
        config.pipeline.dedup_retention_secs,
    )));
    let registry = Arc::new(UserFileRegistry::new(&config.storage.base_dir)?);
    let queue = Arc::new(TaskQueue::new(config.pipeline.queue_capacity));

    let classifier = Arc::new(EventClassifier::new(
        Arc::clone(&dedup),
        Arc::clone(&registry),
        Arc::clone(&queue),
        Arc::clone(&platform),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&registry),
        engine,
        renderer,
        Arc::clone(&platform),
        DispatcherOptions {
            engine_timeout: Duration::from_secs(config.pipeline.engine_timeout_secs),
            reply_retry_attempts: config.pipeline.reply_retry_attempts,
            reply_retry_backoff: Duration::from_millis(config.pipeline.reply_retry_backoff_ms),
        },
    ));
    let workers = dispatcher.spawn_workers(config.pipeline.workers);
    info!(workers = config.pipeline.workers, "dispatch workers spawned");

    let state = AppState {
        classifier,
        platform,
    };
    let app = Router::new()
        .route("/events", post(ingest_event))
        .route("/healthz", get(health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(
        bind_address = config.server.bind_address.as_str(),
        "event ingress listening"
    );

    let token = shutdown::install_signal_handler();
    let shutdown_token = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await
        .map_err(|e| TallyError::Internal(format!("ingress server failed: {e}")))?;

    // Ingress is down; stop accepting work and let running tasks finish.
    let discarded = queue.close();
    if discarded > 0 {
        warn!(discarded, "queued tasks discarded at shutdown");
    }
    shutdown::drain_in_flight(&queue, DRAIN_TIMEOUT).await;

    for worker in workers {
        if tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .is_err()
        {
            warn!("dispatch worker did not stop within the drain window");
        }
    }

    info!("tally serve stopped");
    Ok(())
}

/// Accepts one normalized inbound event.
///
/// Always returns 202: duplicates and empty events are suppressed
/// internally, and a full queue answers the user through the platform,
/// not through this response.
async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> StatusCode {
    state.classifier.handle(event).await;
    StatusCode::ACCEPTED
}

async fn health(State(state): State<AppState>) -> (StatusCode, String) {
    match state.platform.health_check().await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "ok".to_string()),
        Ok(HealthStatus::Degraded(reason)) => (StatusCode::OK, format!("degraded: {reason}")),
        Ok(HealthStatus::Unhealthy(reason)) => {
            (StatusCode::SERVICE_UNAVAILABLE, format!("unhealthy: {reason}"))
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("health check failed: {e}"),
        ),
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
