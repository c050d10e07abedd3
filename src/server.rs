//! HTTP API: prediction, alerting and health endpoints

use crate::advice::{Advice, AdviceService, HealthPlan};
use crate::config::ServerConfig;
use crate::error::PipelineError;
use crate::messaging::{normalize_recipient, AlertSender};
use crate::metrics::ServiceMetrics;
use crate::models::pipeline::PipelineContext;
use crate::types::alert::{AlertReceipt, AlertRequest};
use crate::types::assessment::RiskAssessment;
use crate::types::record::ClinicalRecord;
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Instrument};

const ALERT_SENT_MESSAGE: &str = "WhatsApp Alert Sent";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PipelineContext>,
    /// `None` when advice is disabled
    pub advice: Option<Arc<AdviceService>>,
    /// `None` when messaging credentials are missing
    pub alerts: Option<Arc<dyn AlertSender>>,
    pub default_recipient: String,
    pub metrics: Arc<ServiceMetrics>,
}

/// Errors surfaced to HTTP clients as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    InvalidBody(String),
    Messaging(anyhow::Error),
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Pipeline(err @ PipelineError::InputShape { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            ApiError::Pipeline(err @ PipelineError::ModelUnavailable { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            ApiError::Pipeline(err @ PipelineError::Inference(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::InvalidBody(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::Messaging(err) => (StatusCode::BAD_GATEWAY, format!("{:#}", err)),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Classification result plus optional generated advice
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub assessment: RiskAssessment,

    #[serde(rename = "AI_Advice", skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,

    #[serde(rename = "Health_Plan", skip_serializing_if = "Option::is_none")]
    pub plan: Option<HealthPlan>,
}

impl PredictResponse {
    fn new(assessment: RiskAssessment, advice: Option<Advice>) -> Self {
        let (advice, plan) = match advice {
            Some(Advice::Text(text)) => (Some(text), None),
            Some(Advice::Plan(plan)) => (None, Some(plan)),
            None => (None, None),
        };
        Self {
            assessment,
            advice,
            plan,
        }
    }
}

/// Build the CORS layer. No configured origins means any origin.
pub fn cors_layer(config: &ServerConfig) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_allowed_origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = config
        .cors_allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/predict", post(predict))
        .route("/api/send_alert", post(send_alert))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<ClinicalRecord>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("predict", request_id = %request_id);

    assess(state, payload).instrument(span).await
}

async fn assess(
    state: AppState,
    payload: Result<Json<ClinicalRecord>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(record) = payload.inspect_err(|_| state.metrics.record_assessment_error())?;

    let start = Instant::now();
    let pipeline = state.pipeline.clone();
    let classified = tokio::task::spawn_blocking(move || pipeline.classify(&record))
        .await
        .map_err(|e| ApiError::Internal(format!("Classification task failed: {e}")))?;

    let assessment = match classified {
        Ok(assessment) => assessment,
        Err(e) => {
            state.metrics.record_assessment_error();
            warn!(error = %e, "Classification rejected");
            return Err(e.into());
        }
    };

    let elapsed = start.elapsed();
    state.metrics.record_assessment(elapsed, &assessment);
    info!(
        risk_level = %assessment.risk_level,
        disease_status = %assessment.disease_status,
        disease_probability = %assessment.disease_probability,
        processing_time_us = elapsed.as_micros() as u64,
        "Assessment complete"
    );

    let advice = match &state.advice {
        Some(service) => Some(service.advise(&assessment).await),
        None => None,
    };

    Ok(Json(PredictResponse::new(assessment, advice)))
}

async fn send_alert(
    State(state): State<AppState>,
    payload: Result<Json<AlertRequest>, JsonRejection>,
) -> Result<Json<AlertReceipt>, ApiError> {
    let Json(request) = payload?;
    let recipient = normalize_recipient(request.phone_number.as_deref(), &state.default_recipient);

    let Some(sender) = &state.alerts else {
        warn!("Messaging not configured, alert not sent");
        return Ok(Json(AlertReceipt {
            message: ALERT_SENT_MESSAGE.to_string(),
            sid: None,
        }));
    };

    match sender.send(&request.risk_level, &recipient, request.audience).await {
        Ok(sid) => {
            state.metrics.record_alert(true);
            info!(sid = %sid, risk_level = %request.risk_level, "WhatsApp alert sent");
            Ok(Json(AlertReceipt {
                message: ALERT_SENT_MESSAGE.to_string(),
                sid: Some(sid),
            }))
        }
        Err(e) => {
            state.metrics.record_alert(false);
            error!(error = %format!("{:#}", e), to = %recipient, "Failed to send WhatsApp alert");
            Err(ApiError::Messaging(e))
        }
    }
}
