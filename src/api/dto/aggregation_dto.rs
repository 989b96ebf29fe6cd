//! Batch DTOs: aggregation runs and expiry sweeps.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::service::{AggregationReport, ExpirySweep};

/// Request body for `POST /aggregation/run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RunAggregationRequest {
    /// Day to aggregate. Defaults to yesterday in the operating timezone.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Last day of a backfill range starting at `date`.
    #[serde(default)]
    pub until: Option<NaiveDate>,
}

/// One enrollment that failed to aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FailureDto {
    /// Enrollment identifier.
    pub enrollment_id: Uuid,
    /// Error message.
    pub error: String,
}

/// Result of aggregating one day.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AggregationReportDto {
    /// Aggregated day.
    pub day: NaiveDate,
    /// Enrollments examined.
    pub examined: usize,
    /// Daily records written.
    pub written: usize,
    /// Records meeting the threshold.
    pub qualifying: usize,
    /// Failed enrollments.
    pub failures: Vec<FailureDto>,
}

impl From<AggregationReport> for AggregationReportDto {
    fn from(r: AggregationReport) -> Self {
        Self {
            day: r.day,
            examined: r.examined,
            written: r.written,
            qualifying: r.qualifying,
            failures: r
                .failures
                .into_iter()
                .map(|f| FailureDto {
                    enrollment_id: f.enrollment_id.into(),
                    error: f.error,
                })
                .collect(),
        }
    }
}

/// Response body for `POST /aggregation/run`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunAggregationResponse {
    /// One report per aggregated day, oldest first.
    pub reports: Vec<AggregationReportDto>,
}

/// Response body for `POST /aggregation/expire-overdue`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExpirySweepDto {
    /// Pending enrollments past their monitoring window.
    pub examined: usize,
    /// Enrollments moved to `expired`.
    pub expired: Vec<Uuid>,
    /// Enrollments that could not be processed.
    pub failures: Vec<FailureDto>,
}

impl From<ExpirySweep> for ExpirySweepDto {
    fn from(s: ExpirySweep) -> Self {
        Self {
            examined: s.examined,
            expired: s.expired.into_iter().map(Into::into).collect(),
            failures: s
                .failures
                .into_iter()
                .map(|(id, error)| FailureDto {
                    enrollment_id: id.into(),
                    error,
                })
                .collect(),
        }
    }
}
