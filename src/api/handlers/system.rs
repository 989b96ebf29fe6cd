//! System endpoints: health check and active guarantee rules.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Active guarantee rules as exposed to the admin UI.
#[derive(Debug, Serialize, ToSchema)]
pub struct RulesResponse {
    daily_play_threshold: u32,
    required_streak_days: u32,
    unconditional_days: u32,
    monitoring_days: u32,
    retention_days: u32,
    utc_offset_minutes: i32,
}

/// `GET /config/rules` — Thresholds the evaluator runs with.
#[utoipa::path(
    get,
    path = "/config/rules",
    tag = "System",
    summary = "Active guarantee rules",
    description = "Returns the daily play threshold, streak length, window lengths and operating timezone offset.",
    responses(
        (status = 200, description = "Guarantee rules", body = RulesResponse),
    )
)]
pub async fn rules_handler(State(state): State<AppState>) -> impl IntoResponse {
    let rules = state.rules;
    Json(RulesResponse {
        daily_play_threshold: rules.daily_play_threshold,
        required_streak_days: rules.required_streak_days,
        unconditional_days: rules.unconditional_days,
        monitoring_days: rules.monitoring_days,
        retention_days: rules.retention_days,
        utc_offset_minutes: rules.utc_offset_minutes,
    })
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/rules", get(rules_handler))
}
