//! Guarantee status read model: an enrollment merged with its evaluation.

use serde::Serialize;
use uuid::Uuid;

use super::audit::AuditEntry;
use super::enrollment::{EnrollmentStatus, GuaranteeEnrollment};
use super::evaluator::{CalendarDay, ComputedState, Evaluation};

/// Enrollment plus its freshly computed evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuaranteeStatus {
    /// Stored enrollment.
    pub enrollment: GuaranteeEnrollment,
    /// Evaluation at read time.
    pub evaluation: Evaluation,
}

impl GuaranteeStatus {
    /// Shortcut for `evaluation.computed_state`.
    #[must_use]
    pub const fn computed_state(&self) -> ComputedState {
        self.evaluation.computed_state
    }
}

/// Per-enrollment admin detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDetail {
    /// Enrollment and evaluation.
    pub status: GuaranteeStatus,
    /// One entry per scored day.
    pub calendar: Vec<CalendarDay>,
    /// Which rule currently applies, in prose.
    pub narrative: String,
    /// Recorded decisions.
    pub audit: Vec<AuditEntry>,
}

/// Filter for status listings. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFilter {
    /// Stored status.
    pub status: Option<EnrollmentStatus>,
    /// Computed state.
    pub computed_state: Option<ComputedState>,
    /// Owning user.
    pub user_id: Option<Uuid>,
}

impl StatusFilter {
    /// Returns `true` if `status` passes every set criterion.
    #[must_use]
    pub fn matches(&self, status: &GuaranteeStatus) -> bool {
        self.status.is_none_or(|s| s == status.enrollment.status)
            && self
                .computed_state
                .is_none_or(|c| c == status.computed_state())
            && self.user_id.is_none_or(|u| u == status.enrollment.user_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::rules::GuaranteeRules;

    fn status(state: ComputedState) -> GuaranteeStatus {
        let now = Utc::now();
        GuaranteeStatus {
            enrollment: GuaranteeEnrollment::open(
                Uuid::new_v4(),
                "pi_filter".to_string(),
                now,
                &GuaranteeRules::default(),
                now,
            ),
            evaluation: Evaluation {
                best_len: 0,
                current_len: 0,
                scored_days: 1,
                computed_state: state,
            },
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(StatusFilter::default().matches(&status(ComputedState::Expired)));
    }

    #[test]
    fn computed_state_filter() {
        let filter = StatusFilter {
            computed_state: Some(ComputedState::Expired),
            ..StatusFilter::default()
        };
        assert!(filter.matches(&status(ComputedState::Expired)));
        assert!(!filter.matches(&status(ComputedState::ConditionalRunning)));
    }

    #[test]
    fn status_and_user_filters_combine() {
        let s = status(ComputedState::UnconditionalWindow);
        let filter = StatusFilter {
            status: Some(EnrollmentStatus::Pending),
            user_id: Some(s.enrollment.user_id),
            ..StatusFilter::default()
        };
        assert!(filter.matches(&s));

        let other_user = StatusFilter {
            user_id: Some(Uuid::new_v4()),
            ..filter
        };
        assert!(!other_user.matches(&s));
    }
}
