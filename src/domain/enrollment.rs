//! Guarantee enrollment: one tracking record per purchase.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EnrollmentId;
use super::rules::GuaranteeRules;
use crate::error::GuaranteeError;

/// Decision status of an enrollment.
///
/// `Pending` is the only mutable state. Once an enrollment leaves it the
/// status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    /// Not yet decided.
    Pending,
    /// Refund granted.
    Refunded,
    /// Refund refused by an admin.
    Denied,
    /// Monitoring window closed without the streak being met.
    Expired,
}

impl EnrollmentStatus {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Refunded => "refunded",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }

    /// Returns `true` for every decided status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = GuaranteeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "refunded" => Ok(Self::Refunded),
            "denied" => Ok(Self::Denied),
            "expired" => Ok(Self::Expired),
            other => Err(GuaranteeError::InvalidFilter(format!(
                "unknown enrollment status: {other}"
            ))),
        }
    }
}

/// A finalized decision, written to an enrollment exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Terminal status to move to.
    pub status: EnrollmentStatus,
    /// When the decision was taken.
    pub decided_at: DateTime<Utc>,
    /// Admin actor (or the system actor) that took the decision.
    pub decided_by: String,
    /// Free text explaining the decision.
    pub reason: String,
}

/// Guarantee tracking record tied to a single purchase.
///
/// # Invariants
///
/// - `start_date < unconditional_until < monitoring_until`
/// - `decided_at.is_some()` exactly when `status` is terminal
/// - a terminal `status` never changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuaranteeEnrollment {
    /// Enrollment identifier.
    pub id: EnrollmentId,
    /// Owner of the purchase.
    pub user_id: Uuid,
    /// Payment-provider purchase reference, unique per enrollment.
    pub purchase_id: String,
    /// When the guarantee clock started (purchase completion).
    pub start_date: DateTime<Utc>,
    /// End of the unconditional refund window.
    pub unconditional_until: DateTime<Utc>,
    /// End of the monitoring window.
    pub monitoring_until: DateTime<Utc>,
    /// Daily records are purged after this instant.
    pub retention_until: DateTime<Utc>,
    /// Decision status.
    pub status: EnrollmentStatus,
    /// Decision timestamp.
    pub decided_at: Option<DateTime<Utc>>,
    /// Decision actor.
    pub decided_by: Option<String>,
    /// Decision reason.
    pub decision_reason: Option<String>,
    /// Row creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl GuaranteeEnrollment {
    /// Opens a pending enrollment whose windows are derived from `rules`.
    #[must_use]
    pub fn open(
        user_id: Uuid,
        purchase_id: String,
        start_date: DateTime<Utc>,
        rules: &GuaranteeRules,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EnrollmentId::new(),
            user_id,
            purchase_id,
            start_date,
            unconditional_until: start_date + rules.unconditional_window(),
            monitoring_until: start_date + rules.monitoring_window(),
            retention_until: start_date + rules.retention_window(),
            status: EnrollmentStatus::Pending,
            decided_at: None,
            decided_by: None,
            decision_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` while no decision has been recorded.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, EnrollmentStatus::Pending)
    }

    /// Returns `true` if the monitoring window `[start_date,
    /// monitoring_until]` overlaps `[from, until)`.
    #[must_use]
    pub fn overlaps(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        self.start_date < until && self.monitoring_until >= from
    }

    /// Writes `decision` to all decision fields at once.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::AlreadyDecided`] if the enrollment is no
    /// longer pending, and [`GuaranteeError::Validation`] if the decision
    /// targets `Pending`.
    pub fn apply(&mut self, decision: Decision) -> Result<(), GuaranteeError> {
        if self.status.is_terminal() {
            return Err(GuaranteeError::AlreadyDecided {
                id: *self.id.as_uuid(),
                status: self.status,
            });
        }
        if !decision.status.is_terminal() {
            return Err(GuaranteeError::Validation(
                "a decision must move the enrollment to a terminal status".to_string(),
            ));
        }
        self.status = decision.status;
        self.decided_at = Some(decision.decided_at);
        self.decided_by = Some(decision.decided_by);
        self.decision_reason = Some(decision.reason);
        self.updated_at = decision.decided_at;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn start() -> DateTime<Utc> {
        let Some(at) = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).single() else {
            panic!("valid timestamp");
        };
        at
    }

    fn open() -> GuaranteeEnrollment {
        GuaranteeEnrollment::open(
            Uuid::new_v4(),
            "pi_123".to_string(),
            start(),
            &GuaranteeRules::default(),
            start(),
        )
    }

    fn decision(status: EnrollmentStatus) -> Decision {
        Decision {
            status,
            decided_at: start() + Duration::days(3),
            decided_by: "admin-1".to_string(),
            reason: "test".to_string(),
        }
    }

    #[test]
    fn open_derives_windows() {
        let e = open();
        assert_eq!(e.unconditional_until - e.start_date, Duration::days(7));
        assert_eq!(e.monitoring_until - e.start_date, Duration::days(30));
        assert_eq!(e.retention_until - e.start_date, Duration::days(90));
        assert!(e.start_date < e.unconditional_until);
        assert!(e.unconditional_until < e.monitoring_until);
        assert!(e.is_pending());
        assert!(e.decided_at.is_none());
    }

    #[test]
    fn apply_sets_every_decision_field() {
        let mut e = open();
        assert!(e.apply(decision(EnrollmentStatus::Denied)).is_ok());
        assert_eq!(e.status, EnrollmentStatus::Denied);
        assert_eq!(e.decided_at, Some(start() + Duration::days(3)));
        assert_eq!(e.decided_by.as_deref(), Some("admin-1"));
        assert_eq!(e.decision_reason.as_deref(), Some("test"));
        assert_eq!(e.updated_at, start() + Duration::days(3));
    }

    #[test]
    fn apply_refuses_second_decision() {
        let mut e = open();
        assert!(e.apply(decision(EnrollmentStatus::Refunded)).is_ok());
        let second = e.apply(decision(EnrollmentStatus::Denied));
        assert!(matches!(
            second,
            Err(GuaranteeError::AlreadyDecided {
                status: EnrollmentStatus::Refunded,
                ..
            })
        ));
        assert_eq!(e.status, EnrollmentStatus::Refunded);
    }

    #[test]
    fn apply_refuses_pending_target() {
        let mut e = open();
        assert!(e.apply(decision(EnrollmentStatus::Pending)).is_err());
        assert!(e.decided_at.is_none());
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            EnrollmentStatus::Pending,
            EnrollmentStatus::Refunded,
            EnrollmentStatus::Denied,
            EnrollmentStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<EnrollmentStatus>().ok(), Some(status));
        }
        assert!("cancelled".parse::<EnrollmentStatus>().is_err());
    }

    #[test]
    fn overlaps_is_inclusive_of_window_end() {
        let e = open();
        let day = Duration::days(1);
        assert!(e.overlaps(e.monitoring_until, e.monitoring_until + day));
        assert!(!e.overlaps(e.monitoring_until + Duration::seconds(1), e.monitoring_until + day));
        assert!(!e.overlaps(e.start_date - day, e.start_date));
        assert!(e.overlaps(e.start_date - day, e.start_date + Duration::seconds(1)));
    }
}
