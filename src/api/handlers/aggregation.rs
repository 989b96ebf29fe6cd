//! Batch handlers: on-demand aggregation and expiry sweeps.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use super::admin_actor;
use crate::api::dto::{
    AggregationReportDto, ExpirySweepDto, RunAggregationRequest, RunAggregationResponse,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GuaranteeError};
use crate::service::AggregationReport;

/// `POST /aggregation/run` — Aggregate one day or a backfill range.
///
/// # Errors
///
/// Returns [`GuaranteeError::AggregationPartialFailure`] listing every
/// failed enrollment of every day in the range,
/// [`GuaranteeError::DataUnavailable`] if enrollments could not be listed,
/// and [`GuaranteeError::Validation`] for an inverted range or one longer
/// than the retention horizon.
#[utoipa::path(
    post,
    path = "/api/v1/aggregation/run",
    tag = "Aggregation",
    summary = "Run daily aggregation",
    description = "Counts valid plays per pending enrollment for `date` (default: yesterday) or for every day from `date` to `until`, and upserts the daily records. Safe to repeat.",
    request_body = RunAggregationRequest,
    params(
        ("x-admin-actor" = String, Header, description = "Acting admin"),
    ),
    responses(
        (status = 200, description = "Aggregation finished", body = RunAggregationResponse),
        (status = 400, description = "Inverted range or longer than retention", body = ErrorResponse),
        (status = 401, description = "Missing admin identity", body = ErrorResponse),
        (status = 500, description = "Some enrollments failed", body = ErrorResponse),
        (status = 503, description = "Data unavailable", body = ErrorResponse),
    )
)]
pub async fn run_aggregation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RunAggregationRequest>,
) -> Result<impl IntoResponse, GuaranteeError> {
    let actor = admin_actor(&headers)?;
    let from = req
        .date
        .unwrap_or_else(|| state.aggregator.default_target_date());
    let to = req.until.unwrap_or(from);
    tracing::info!(%actor, %from, %to, "manual aggregation requested");

    let reports = state.aggregator.aggregate_range(from, to).await?;
    let reports = AggregationReport::all_complete(reports)?
        .into_iter()
        .map(AggregationReportDto::from)
        .collect();

    Ok(Json(RunAggregationResponse { reports }))
}

/// `POST /aggregation/expire-overdue` — Expire every lapsed enrollment.
///
/// # Errors
///
/// Returns [`GuaranteeError::DataUnavailable`] if enrollments could not be
/// listed.
#[utoipa::path(
    post,
    path = "/api/v1/aggregation/expire-overdue",
    tag = "Aggregation",
    summary = "Expire overdue enrollments",
    description = "Stores `expired` for every pending enrollment whose monitoring window closed without the required streak.",
    params(
        ("x-admin-actor" = String, Header, description = "Acting admin"),
    ),
    responses(
        (status = 200, description = "Sweep finished", body = ExpirySweepDto),
        (status = 401, description = "Missing admin identity", body = ErrorResponse),
        (status = 503, description = "Data unavailable", body = ErrorResponse),
    )
)]
pub async fn expire_overdue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GuaranteeError> {
    let actor = admin_actor(&headers)?;
    tracing::info!(%actor, "manual expiry sweep requested");
    let sweep = state.decisions.expire_overdue().await?;
    Ok(Json(ExpirySweepDto::from(sweep)))
}

/// Aggregation routes, nested under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/aggregation/run", post(run_aggregation))
        .route("/aggregation/expire-overdue", post(expire_overdue))
}
