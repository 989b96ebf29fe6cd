//! Enrollment DTOs for intake, status listings, detail and decisions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common_dto::{PaginationMeta, PaginationParams};
use crate::domain::{
    AuditEntry, CalendarDay, ComputedState, EnrollmentStatus, GuaranteeEnrollment,
    GuaranteeStatus, StatusDetail, StatusFilter,
};
use crate::error::GuaranteeError;

/// Request body for `POST /enrollments`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollRequest {
    /// Purchasing user.
    pub user_id: Uuid,
    /// Billing purchase reference; one enrollment per purchase.
    pub purchase_id: String,
    /// Guarantee start. Defaults to the time of the request.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
}

/// Stored enrollment fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentDto {
    /// Enrollment identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Billing purchase reference.
    pub purchase_id: String,
    /// Guarantee start.
    pub start_date: DateTime<Utc>,
    /// End of the unconditional window.
    pub unconditional_until: DateTime<Utc>,
    /// End of the monitoring window.
    pub monitoring_until: DateTime<Utc>,
    /// Stored status: `pending`, `refunded`, `denied` or `expired`.
    pub status: String,
    /// When the decision was recorded.
    pub decided_at: Option<DateTime<Utc>>,
    /// Who recorded the decision.
    pub decided_by: Option<String>,
    /// Why.
    pub decision_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<GuaranteeEnrollment> for EnrollmentDto {
    fn from(e: GuaranteeEnrollment) -> Self {
        Self {
            id: e.id.into(),
            user_id: e.user_id,
            purchase_id: e.purchase_id,
            start_date: e.start_date,
            unconditional_until: e.unconditional_until,
            monitoring_until: e.monitoring_until,
            status: e.status.to_string(),
            decided_at: e.decided_at,
            decided_by: e.decided_by,
            decision_reason: e.decision_reason,
            created_at: e.created_at,
        }
    }
}

/// Response body for `POST /enrollments`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollResponse {
    /// The enrollment, new or pre-existing.
    pub enrollment: EnrollmentDto,
    /// `false` when the purchase was already enrolled.
    pub created: bool,
}

/// Enrollment with its computed guarantee status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusDto {
    /// Stored fields.
    pub enrollment: EnrollmentDto,
    /// Longest run of qualifying days so far.
    pub best_len: u32,
    /// Run ending on the latest scored day.
    pub current_len: u32,
    /// Days scored so far.
    pub scored_days: u32,
    /// Derived state, e.g. `conditional_met`.
    pub computed_state: String,
    /// Whether a refund is currently due under the guarantee.
    pub refund_available: bool,
}

impl From<GuaranteeStatus> for StatusDto {
    fn from(s: GuaranteeStatus) -> Self {
        let evaluation = s.evaluation;
        Self {
            enrollment: s.enrollment.into(),
            best_len: evaluation.best_len,
            current_len: evaluation.current_len,
            scored_days: evaluation.scored_days,
            computed_state: evaluation.computed_state.to_string(),
            refund_available: evaluation.computed_state.refund_available(),
        }
    }
}

/// One calendar day of the detail view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalendarDayDto {
    /// Local calendar day.
    pub day: NaiveDate,
    /// Valid plays counted.
    pub plays_valid: u32,
    /// Met the daily threshold.
    pub qualifying: bool,
}

impl From<CalendarDay> for CalendarDayDto {
    fn from(d: CalendarDay) -> Self {
        Self {
            day: d.day,
            plays_valid: d.plays_valid,
            qualifying: d.qualifying,
        }
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntryDto {
    /// Entry identifier.
    pub id: Uuid,
    /// `approved`, `denied` or `expired`.
    pub action: String,
    /// Acting admin, or `system`.
    pub actor: String,
    /// Recorded reason.
    pub reason: String,
    /// Best run when the decision was taken.
    pub best_len: u32,
    /// Computed state when the decision was taken.
    pub computed_state: String,
    /// Write timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryDto {
    fn from(a: AuditEntry) -> Self {
        Self {
            id: a.id,
            action: a.action.to_string(),
            actor: a.actor,
            reason: a.reason,
            best_len: a.best_len,
            computed_state: a.computed_state.to_string(),
            recorded_at: a.recorded_at,
        }
    }
}

/// Response body for `GET /enrollments/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusDetailResponse {
    /// Enrollment and computed status.
    pub status: StatusDto,
    /// Day-by-day tallies over the scored range.
    pub calendar: Vec<CalendarDayDto>,
    /// Which rule currently applies.
    pub narrative: String,
    /// Recorded decisions.
    pub audit: Vec<AuditEntryDto>,
}

impl From<StatusDetail> for StatusDetailResponse {
    fn from(d: StatusDetail) -> Self {
        Self {
            status: d.status.into(),
            calendar: d.calendar.into_iter().map(Into::into).collect(),
            narrative: d.narrative,
            audit: d.audit.into_iter().map(Into::into).collect(),
        }
    }
}

/// Query string for `GET /enrollments`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusListQuery {
    /// Stored status filter.
    pub status: Option<String>,
    /// Computed state filter.
    pub computed_state: Option<String>,
    /// Owning user filter.
    pub user_id: Option<Uuid>,
    /// Page number (1-indexed).
    pub page: Option<u32>,
    /// Items per page (max 100).
    pub per_page: Option<u32>,
}

impl StatusListQuery {
    /// Parses the filter fields.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::InvalidFilter`] for an unknown status or
    /// computed state.
    pub fn filter(&self) -> Result<StatusFilter, GuaranteeError> {
        Ok(StatusFilter {
            status: self
                .status
                .as_deref()
                .map(str::parse::<EnrollmentStatus>)
                .transpose()?,
            computed_state: self
                .computed_state
                .as_deref()
                .map(str::parse::<ComputedState>)
                .transpose()?,
            user_id: self.user_id,
        })
    }

    /// Pagination part of the query.
    #[must_use]
    pub fn pagination(&self) -> PaginationParams {
        let defaults = PaginationParams::default();
        PaginationParams {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

/// Paginated response for `GET /enrollments`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusListResponse {
    /// Statuses on this page.
    pub data: Vec<StatusDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Request body for `POST /enrollments/{id}/deny`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DenyRequest {
    /// Mandatory explanation, kept in the audit trail.
    #[serde(default)]
    pub reason: String,
}

/// Response body for decision endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecisionResponse {
    /// The enrollment after the decision.
    pub enrollment: EnrollmentDto,
}
