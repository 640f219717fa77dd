//! API request handlers

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::api::types::ApiResponse;
use crate::api::types::AskRequest;
use crate::api::types::HealthResponse;
use crate::errors::QaError;
use crate::rag::QaOutcome;
use crate::rag::QaService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub qa: Arc<QaService>,
}

type ApiError = (StatusCode, Json<ApiResponse<QaOutcome>>);

/// Health check handler
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        known_members: state.qa.resolver().cache().len(),
    }))
}

/// Answer a question, or return the members it could refer to
pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<ApiResponse<QaOutcome>>, ApiError> {
    info!("POST /api/ask: {}", req.question);

    match state.qa.answer(&req.question).await {
        Ok(outcome) => Ok(Json(ApiResponse::success(outcome))),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::BAD_REQUEST {
                warn!("Rejected question: {}", e);
            } else {
                error!("Error answering question: {}", e);
            }
            Err((status, Json(ApiResponse::error(e.to_string()))))
        }
    }
}

/// HTTP status for a pipeline error
pub fn status_for(error: &QaError) -> StatusCode {
    match error {
        QaError::InvalidQuestion(_) => StatusCode::BAD_REQUEST,
        e if e.is_service_failure() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
