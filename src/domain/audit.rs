//! Append-only audit trail of enrollment decisions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EnrollmentId;
use super::enrollment::{Decision, EnrollmentStatus};
use super::evaluator::{ComputedState, Evaluation};
use crate::error::GuaranteeError;

/// What a decision did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Refund approved.
    Approved,
    /// Refund denied.
    Denied,
    /// Expiry formalised.
    Expired,
}

impl AuditAction {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }

    /// Maps a terminal status to its audit action.
    #[must_use]
    pub const fn for_status(status: EnrollmentStatus) -> Option<Self> {
        match status {
            EnrollmentStatus::Refunded => Some(Self::Approved),
            EnrollmentStatus::Denied => Some(Self::Denied),
            EnrollmentStatus::Expired => Some(Self::Expired),
            EnrollmentStatus::Pending => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = GuaranteeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "expired" => Ok(Self::Expired),
            other => Err(GuaranteeError::Internal(format!(
                "unknown audit action: {other}"
            ))),
        }
    }
}

/// One recorded decision with the evidence it was taken on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: uuid::Uuid,
    /// Decided enrollment.
    pub enrollment_id: EnrollmentId,
    /// Decision kind.
    pub action: AuditAction,
    /// Who decided.
    pub actor: String,
    /// Why.
    pub reason: String,
    /// Best run at decision time.
    pub best_len: u32,
    /// Computed state at decision time.
    pub computed_state: ComputedState,
    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Builds the entry that accompanies `decision`.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::Validation`] if the decision does not
    /// target a terminal status.
    pub fn for_decision(
        enrollment_id: EnrollmentId,
        decision: &Decision,
        evaluation: &Evaluation,
    ) -> Result<Self, GuaranteeError> {
        let action = AuditAction::for_status(decision.status).ok_or_else(|| {
            GuaranteeError::Validation("pending is not a decision".to_string())
        })?;
        Ok(Self {
            id: uuid::Uuid::new_v4(),
            enrollment_id,
            action,
            actor: decision.decided_by.clone(),
            reason: decision.reason.clone(),
            best_len: evaluation.best_len,
            computed_state: evaluation.computed_state,
            recorded_at: decision.decided_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_mirrors_decision() {
        let decision = Decision {
            status: EnrollmentStatus::Refunded,
            decided_at: Utc::now(),
            decided_by: "admin-7".to_string(),
            reason: "approved within unconditional window".to_string(),
        };
        let evaluation = Evaluation {
            best_len: 4,
            current_len: 4,
            scored_days: 5,
            computed_state: ComputedState::UnconditionalWindow,
        };
        let id = EnrollmentId::new();
        let entry = AuditEntry::for_decision(id, &decision, &evaluation);
        let Ok(entry) = entry else {
            unreachable!("refunded is terminal");
        };
        assert_eq!(entry.enrollment_id, id);
        assert_eq!(entry.action, AuditAction::Approved);
        assert_eq!(entry.actor, "admin-7");
        assert_eq!(entry.best_len, 4);
        assert_eq!(entry.recorded_at, decision.decided_at);
    }

    #[test]
    fn pending_has_no_action() {
        assert_eq!(AuditAction::for_status(EnrollmentStatus::Pending), None);
        assert_eq!(
            AuditAction::for_status(EnrollmentStatus::Expired),
            Some(AuditAction::Expired)
        );
    }
}
