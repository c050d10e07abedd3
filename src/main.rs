//! Maternal Risk Assessment Service - Main Entry Point
//!
//! Loads the model artifacts once, then serves the prediction and alert
//! endpoints over HTTP.

use anyhow::{Context, Result};
use maternal_risk_service::{
    advice::AdviceService,
    config::{AppConfig, LogFormat, LoggingConfig},
    feature_extractor::FeatureExtractor,
    messaging::{AlertSender, TwilioSender},
    metrics::{MetricsReporter, ServiceMetrics},
    models::{loader::ModelLoader, pipeline::PipelineContext},
    server::{self, AppState},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    init_tracing(&config.logging)?;
    info!("Starting Maternal Risk Assessment Service");

    let metrics = Arc::new(ServiceMetrics::new());

    // Load models once; handles are immutable afterwards
    let loader = ModelLoader::with_threads(config.models.onnx_threads)?;
    let handles = loader.load_all(&config.models)?;
    let extractor = FeatureExtractor::new(config.pipeline.stage_b_age_source);
    info!(
        age_source = ?extractor.age_source(),
        strict = config.models.strict,
        "Pipeline initialized"
    );
    let pipeline = Arc::new(PipelineContext::new(extractor, handles));

    let advice = if config.advice.enabled {
        Some(Arc::new(AdviceService::from_config(&config.advice, metrics.clone())?))
    } else {
        info!("Advice generation disabled");
        None
    };

    let alerts = TwilioSender::from_config(&config.messaging)?
        .map(|s| Arc::new(s) as Arc<dyn AlertSender>);
    if alerts.is_none() {
        warn!("Messaging credentials not found, WhatsApp alerts will be disabled");
    }

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = AppState {
        pipeline,
        advice,
        alerts,
        default_recipient: config.messaging.default_recipient.clone(),
        metrics: metrics.clone(),
    };
    let app = server::router(state, server::cors_layer(&config.server)?);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "maternal_risk_service={level},tower_http={level}",
            level = config.level
        ))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
