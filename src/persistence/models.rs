//! Database row models and their conversion into domain types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    AuditEntry, ComputedState, EnrollmentId, EnrollmentStatus, GuaranteeDaily,
    GuaranteeEnrollment,
};
use crate::error::GuaranteeError;

/// Column list shared by every enrollment query.
pub const ENROLLMENT_COLUMNS: &str = "id, user_id, purchase_id, start_date, \
    unconditional_until, monitoring_until, retention_until, status, decided_at, \
    decided_by, decision_reason, created_at, updated_at";

/// Column list shared by every daily-record query.
pub const DAILY_COLUMNS: &str = "id, enrollment_id, day, plays_valid, meets_20, created_at";

/// Column list shared by every audit query.
pub const AUDIT_COLUMNS: &str =
    "id, enrollment_id, action, actor, reason, best_len, computed_state, recorded_at";

/// A raw play attempt as recorded by the playback subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayEvent {
    /// Listening user.
    pub user_id: Uuid,
    /// Enrollment the play is linked to, if any.
    pub enrollment_id: Option<EnrollmentId>,
    /// When the play happened.
    pub played_at: DateTime<Utc>,
    /// Whether the play satisfied the validity rule.
    pub valid: bool,
}

/// A row from the `guarantee_enrollments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnrollmentRow {
    /// Primary key.
    pub id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    /// Unique purchase reference.
    pub purchase_id: String,
    /// Guarantee start.
    pub start_date: DateTime<Utc>,
    /// Unconditional window end.
    pub unconditional_until: DateTime<Utc>,
    /// Monitoring window end.
    pub monitoring_until: DateTime<Utc>,
    /// Retention horizon.
    pub retention_until: DateTime<Utc>,
    /// Status text.
    pub status: String,
    /// Decision timestamp.
    pub decided_at: Option<DateTime<Utc>>,
    /// Decision actor.
    pub decided_by: Option<String>,
    /// Decision reason.
    pub decision_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EnrollmentRow> for GuaranteeEnrollment {
    type Error = GuaranteeError;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        let status: EnrollmentStatus = row
            .status
            .parse()
            .map_err(|_| GuaranteeError::Internal(format!("corrupt status: {}", row.status)))?;
        Ok(Self {
            id: EnrollmentId::from_uuid(row.id),
            user_id: row.user_id,
            purchase_id: row.purchase_id,
            start_date: row.start_date,
            unconditional_until: row.unconditional_until,
            monitoring_until: row.monitoring_until,
            retention_until: row.retention_until,
            status,
            decided_at: row.decided_at,
            decided_by: row.decided_by,
            decision_reason: row.decision_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `guarantee_daily` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyRow {
    /// Primary key.
    pub id: Uuid,
    /// Owning enrollment.
    pub enrollment_id: Uuid,
    /// Local calendar day.
    pub day: NaiveDate,
    /// Valid play count.
    pub plays_valid: i32,
    /// Threshold reached.
    pub meets_20: bool,
    /// First aggregation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DailyRow> for GuaranteeDaily {
    type Error = GuaranteeError;

    fn try_from(row: DailyRow) -> Result<Self, Self::Error> {
        let plays_valid = u32::try_from(row.plays_valid).map_err(|_| {
            GuaranteeError::Internal(format!("negative play count: {}", row.plays_valid))
        })?;
        Ok(Self {
            id: row.id,
            enrollment_id: EnrollmentId::from_uuid(row.enrollment_id),
            day: row.day,
            plays_valid,
            meets_20: row.meets_20,
            created_at: row.created_at,
        })
    }
}

/// A row from the `guarantee_audit` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    /// Primary key.
    pub id: Uuid,
    /// Decided enrollment.
    pub enrollment_id: Uuid,
    /// Action text.
    pub action: String,
    /// Acting admin or system actor.
    pub actor: String,
    /// Decision reason.
    pub reason: String,
    /// Best run at decision time.
    pub best_len: i32,
    /// Computed state text at decision time.
    pub computed_state: String,
    /// Write timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = GuaranteeError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let computed_state: ComputedState = row.computed_state.parse().map_err(|_| {
            GuaranteeError::Internal(format!("corrupt computed state: {}", row.computed_state))
        })?;
        Ok(Self {
            id: row.id,
            enrollment_id: EnrollmentId::from_uuid(row.enrollment_id),
            action: row.action.parse()?,
            actor: row.actor,
            reason: row.reason,
            best_len: u32::try_from(row.best_len).unwrap_or(0),
            computed_state,
            recorded_at: row.recorded_at,
        })
    }
}

/// Converts a count to the `INTEGER` column type, saturating.
#[must_use]
pub fn to_db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
