//! Enrollment handlers: intake, status listing, detail, audit trail and
//! refund decisions.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use super::admin_actor;
use crate::api::dto::{
    AuditEntryDto, DecisionResponse, DenyRequest, EnrollRequest, EnrollResponse,
    StatusDetailResponse, StatusDto, StatusListQuery, StatusListResponse,
};
use crate::app_state::AppState;
use crate::domain::EnrollmentId;
use crate::error::{ErrorResponse, GuaranteeError};

/// `POST /enrollments` — Enroll a completed purchase.
///
/// # Errors
///
/// Returns [`GuaranteeError::Validation`] for a blank purchase id.
#[utoipa::path(
    post,
    path = "/api/v1/enrollments",
    tag = "Enrollments",
    summary = "Enroll a purchase",
    description = "Opens a guarantee enrollment for a completed purchase. Idempotent per purchase: a repeat call returns the existing enrollment with 200.",
    request_body = EnrollRequest,
    responses(
        (status = 201, description = "Enrollment created", body = EnrollResponse),
        (status = 200, description = "Purchase already enrolled", body = EnrollResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn enroll(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> Result<impl IntoResponse, GuaranteeError> {
    let (enrollment, created) = state
        .enrollments
        .enroll(req.user_id, &req.purchase_id, req.start_date)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(EnrollResponse {
            enrollment: enrollment.into(),
            created,
        }),
    ))
}

/// `GET /enrollments` — List computed statuses.
///
/// # Errors
///
/// Returns [`GuaranteeError::InvalidFilter`] for unknown filter values.
#[utoipa::path(
    get,
    path = "/api/v1/enrollments",
    tag = "Enrollments",
    summary = "List guarantee statuses",
    description = "Returns a paginated list of enrollments with their computed state, filterable by stored status, computed state and user.",
    params(StatusListQuery),
    responses(
        (status = 200, description = "Paginated status list", body = StatusListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn list_statuses(
    State(state): State<AppState>,
    Query(query): Query<StatusListQuery>,
) -> Result<impl IntoResponse, GuaranteeError> {
    let filter = query.filter()?;
    let statuses = state.status.list_statuses(&filter).await?;
    let (page, pagination) = query.pagination().paginate(statuses);

    Ok(Json(StatusListResponse {
        data: page.into_iter().map(StatusDto::from).collect(),
        pagination,
    }))
}

/// `GET /enrollments/{id}` — Status, calendar, narrative and audit trail.
///
/// # Errors
///
/// Returns [`GuaranteeError::EnrollmentNotFound`] if the enrollment does not
/// exist.
#[utoipa::path(
    get,
    path = "/api/v1/enrollments/{id}",
    tag = "Enrollments",
    summary = "Get guarantee detail",
    description = "Returns the enrollment with its computed state, a day-by-day calendar of valid plays, an explanation of the applicable rule and the audit trail.",
    params(
        ("id" = uuid::Uuid, Path, description = "Enrollment UUID"),
    ),
    responses(
        (status = 200, description = "Guarantee detail", body = StatusDetailResponse),
        (status = 404, description = "Enrollment not found", body = ErrorResponse),
    )
)]
pub async fn get_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GuaranteeError> {
    let detail = state.status.get_detail(EnrollmentId::from_uuid(id)).await?;
    Ok(Json(StatusDetailResponse::from(detail)))
}

/// `GET /enrollments/{id}/audit` — Decision audit trail.
///
/// # Errors
///
/// Returns [`GuaranteeError::EnrollmentNotFound`] if the enrollment does not
/// exist.
#[utoipa::path(
    get,
    path = "/api/v1/enrollments/{id}/audit",
    tag = "Enrollments",
    summary = "Get audit trail",
    params(
        ("id" = uuid::Uuid, Path, description = "Enrollment UUID"),
    ),
    responses(
        (status = 200, description = "Audit entries, oldest first", body = Vec<AuditEntryDto>),
        (status = 404, description = "Enrollment not found", body = ErrorResponse),
    )
)]
pub async fn audit_trail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GuaranteeError> {
    let id = EnrollmentId::from_uuid(id);
    if state.store.get_enrollment(id).await?.is_none() {
        return Err(GuaranteeError::EnrollmentNotFound(*id.as_uuid()));
    }
    let entries = state.store.audit_trail(id).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(AuditEntryDto::from)
            .collect::<Vec<_>>(),
    ))
}

/// `POST /enrollments/{id}/approve` — Approve a refund.
///
/// # Errors
///
/// Returns [`GuaranteeError::Unauthorized`] without an admin identity and
/// [`GuaranteeError::AlreadyDecided`] if the enrollment is not pending.
#[utoipa::path(
    post,
    path = "/api/v1/enrollments/{id}/approve",
    tag = "Decisions",
    summary = "Approve refund",
    description = "Moves a pending enrollment to `refunded`. The reason is generated from the evaluation at decision time.",
    params(
        ("id" = uuid::Uuid, Path, description = "Enrollment UUID"),
        ("x-admin-actor" = String, Header, description = "Acting admin"),
    ),
    responses(
        (status = 200, description = "Refund approved", body = DecisionResponse),
        (status = 401, description = "Missing admin identity", body = ErrorResponse),
        (status = 404, description = "Enrollment not found", body = ErrorResponse),
        (status = 409, description = "Already decided", body = ErrorResponse),
    )
)]
pub async fn approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GuaranteeError> {
    let actor = admin_actor(&headers)?;
    let enrollment = state
        .decisions
        .approve_refund(EnrollmentId::from_uuid(id), &actor)
        .await?;
    Ok(Json(DecisionResponse {
        enrollment: enrollment.into(),
    }))
}

/// `POST /enrollments/{id}/deny` — Deny a refund.
///
/// # Errors
///
/// Returns [`GuaranteeError::Validation`] for a blank reason and
/// [`GuaranteeError::AlreadyDecided`] if the enrollment is not pending.
#[utoipa::path(
    post,
    path = "/api/v1/enrollments/{id}/deny",
    tag = "Decisions",
    summary = "Deny refund",
    description = "Moves a pending enrollment to `denied`. A non-empty reason is mandatory.",
    request_body = DenyRequest,
    params(
        ("id" = uuid::Uuid, Path, description = "Enrollment UUID"),
        ("x-admin-actor" = String, Header, description = "Acting admin"),
    ),
    responses(
        (status = 200, description = "Refund denied", body = DecisionResponse),
        (status = 400, description = "Missing reason", body = ErrorResponse),
        (status = 401, description = "Missing admin identity", body = ErrorResponse),
        (status = 404, description = "Enrollment not found", body = ErrorResponse),
        (status = 409, description = "Already decided", body = ErrorResponse),
    )
)]
pub async fn deny(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<DenyRequest>,
) -> Result<impl IntoResponse, GuaranteeError> {
    let actor = admin_actor(&headers)?;
    let enrollment = state
        .decisions
        .deny_refund(EnrollmentId::from_uuid(id), &actor, &req.reason)
        .await?;
    Ok(Json(DecisionResponse {
        enrollment: enrollment.into(),
    }))
}

/// `POST /enrollments/{id}/expire` — Formalise a computed expiry.
///
/// # Errors
///
/// Returns [`GuaranteeError::Validation`] if the guarantee has not expired.
#[utoipa::path(
    post,
    path = "/api/v1/enrollments/{id}/expire",
    tag = "Decisions",
    summary = "Expire enrollment",
    description = "Stores `expired` for an enrollment whose monitoring window closed without the required streak. Repeating the call is a no-op.",
    params(
        ("id" = uuid::Uuid, Path, description = "Enrollment UUID"),
        ("x-admin-actor" = String, Header, description = "Acting admin"),
    ),
    responses(
        (status = 200, description = "Enrollment expired", body = DecisionResponse),
        (status = 400, description = "Guarantee not expired", body = ErrorResponse),
        (status = 401, description = "Missing admin identity", body = ErrorResponse),
        (status = 409, description = "Already refunded or denied", body = ErrorResponse),
    )
)]
pub async fn expire(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, GuaranteeError> {
    let actor = admin_actor(&headers)?;
    let enrollment = state
        .decisions
        .expire(EnrollmentId::from_uuid(id), &actor)
        .await?;
    Ok(Json(DecisionResponse {
        enrollment: enrollment.into(),
    }))
}

/// Enrollment routes, nested under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/enrollments", post(enroll).get(list_statuses))
        .route("/enrollments/{id}", get(get_detail))
        .route("/enrollments/{id}/audit", get(audit_trail))
        .route("/enrollments/{id}/approve", post(approve))
        .route("/enrollments/{id}/deny", post(deny))
        .route("/enrollments/{id}/expire", post(expire))
}
