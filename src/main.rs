//! Grade Prediction Service - Main Entry Point
//!
//! Serves letter-grade predictions over HTTP and, when enabled, answers
//! NATS request/reply traffic with the same pipeline.

use anyhow::{Context, Result};
use futures::StreamExt;
use grade_prediction_service::{
    config::{AppConfig, LoggingConfig, NatsConfig},
    consumer::RequestConsumer,
    metrics::{MetricsReporter, PredictionMetrics},
    pipeline::GradePredictor,
    producer::ReplyProducer,
    responder::{IncomingRequest, Responder},
    server::{build_router, AppState},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Grade Prediction Service");
    info!(
        model = %config.models.model_path,
        scaler = %config.models.scaler_path,
        max_batch_size = config.batch.max_size,
        "Configuration loaded successfully"
    );

    let metrics = Arc::new(PredictionMetrics::new());
    let predictor = Arc::new(GradePredictor::from_config(&config.models, metrics.clone()));
    info!(
        model_loaded = predictor.model_loaded(),
        scaler_loaded = predictor.scaler_loaded(),
        "Prediction pipeline initialized"
    );

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let responder = if config.nats.enabled {
        Some(
            start_responder(
                &config.nats,
                config.pipeline.workers,
                config.batch.max_size,
                predictor.clone(),
            )
            .await?,
        )
    } else {
        None
    };

    let state = Arc::new(AppState::new(predictor, config.batch.max_size));
    let app = build_router(state, &config.server.static_dir);

    let listen_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Service shutting down...");
    if let Some(responder) = responder {
        responder.stop().await;
    }
    metrics.print_summary();

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("grade_prediction_service={}", config.level).parse()?);

    match config.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// Subscribe to the request subject and answer each message on a worker task.
async fn start_responder(
    config: &NatsConfig,
    workers: usize,
    max_batch_size: usize,
    predictor: Arc<GradePredictor>,
) -> Result<Responder> {
    let client = async_nats::connect(&config.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.url))?;
    info!("Connected to NATS at {}", config.url);

    let consumer = RequestConsumer::new(client.clone(), &config.request_subject);
    let subscription = consumer.subscribe().await?;

    info!(
        subject = consumer.subject(),
        workers, "Starting NATS responder"
    );

    Ok(Responder::spawn(
        subscription.map(IncomingRequest::from),
        ReplyProducer::new(client),
        predictor,
        workers,
        max_batch_size,
    ))
}
