//! OpenAPI document for the admin API.

use utoipa::OpenApi;

use super::dto;
use super::handlers;
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "guarantee-service",
        description = "Money-back guarantee tracking: enrollment, daily play aggregation, status evaluation and refund decisions."
    ),
    paths(
        handlers::system::health_handler,
        handlers::system::rules_handler,
        handlers::enrollment::enroll,
        handlers::enrollment::list_statuses,
        handlers::enrollment::get_detail,
        handlers::enrollment::audit_trail,
        handlers::enrollment::approve,
        handlers::enrollment::deny,
        handlers::enrollment::expire,
        handlers::aggregation::run_aggregation,
        handlers::aggregation::expire_overdue,
    ),
    components(schemas(
        ErrorResponse,
        ErrorBody,
        handlers::system::HealthResponse,
        handlers::system::RulesResponse,
        dto::EnrollRequest,
        dto::EnrollResponse,
        dto::EnrollmentDto,
        dto::StatusDto,
        dto::StatusListResponse,
        dto::StatusDetailResponse,
        dto::CalendarDayDto,
        dto::AuditEntryDto,
        dto::DenyRequest,
        dto::DecisionResponse,
        dto::PaginationMeta,
        dto::RunAggregationRequest,
        dto::RunAggregationResponse,
        dto::AggregationReportDto,
        dto::FailureDto,
        dto::ExpirySweepDto,
    )),
    tags(
        (name = "System", description = "Health and configuration"),
        (name = "Enrollments", description = "Guarantee enrollments and computed status"),
        (name = "Decisions", description = "Refund approvals, denials and expiries"),
        (name = "Aggregation", description = "Daily batch operations"),
    )
)]
pub struct ApiDoc;
