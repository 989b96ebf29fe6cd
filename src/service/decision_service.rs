//! Decision recorder: the only path that moves an enrollment out of
//! `pending`.
//!
//! Every decision is evaluated against the latest daily data, then written
//! through [`GuaranteeStore::decide`], which is a conditional update: if
//! two admins decide the same enrollment at once, exactly one write lands
//! and the other caller gets [`GuaranteeError::AlreadyDecided`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::domain::evaluator;
use crate::domain::{
    AuditEntry, ComputedState, Decision, EnrollmentId, EnrollmentStatus, Evaluation,
    GuaranteeEnrollment, GuaranteeRules,
};
use crate::error::GuaranteeError;
use crate::persistence::{EnrollmentQuery, GuaranteeStore};

/// Actor recorded for automated decisions.
pub const SYSTEM_ACTOR: &str = "system";

/// Outcome of an expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySweep {
    /// Pending enrollments whose monitoring window had closed.
    pub examined: usize,
    /// Enrollments moved to `expired`.
    pub expired: Vec<EnrollmentId>,
    /// Enrollments that could not be processed, with the error message.
    pub failures: Vec<(EnrollmentId, String)>,
}

/// Records refund approvals, denials and expiries.
#[derive(Debug, Clone)]
pub struct DecisionService {
    store: Arc<dyn GuaranteeStore>,
    clock: Arc<dyn Clock>,
    rules: GuaranteeRules,
}

impl DecisionService {
    /// Creates a new `DecisionService`.
    #[must_use]
    pub fn new(store: Arc<dyn GuaranteeStore>, clock: Arc<dyn Clock>, rules: GuaranteeRules) -> Self {
        Self {
            store,
            clock,
            rules,
        }
    }

    /// Approves a refund. The recorded reason is generated from the
    /// evaluation at decision time.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::Validation`] for a blank actor,
    /// [`GuaranteeError::EnrollmentNotFound`] for an unknown enrollment and
    /// [`GuaranteeError::AlreadyDecided`] if it is no longer pending.
    pub async fn approve_refund(
        &self,
        id: EnrollmentId,
        decided_by: &str,
    ) -> Result<GuaranteeEnrollment, GuaranteeError> {
        let actor = require_text(decided_by, "decided_by")?;
        let now = self.clock.now();
        let (enrollment, evaluation) = self.load_pending(id, now).await?;
        let reason = approval_reason(&evaluation, &self.rules);

        let decided = self
            .record(&enrollment, &evaluation, EnrollmentStatus::Refunded, actor, reason, now)
            .await?;
        tracing::info!(enrollment_id = %id, actor, best_len = evaluation.best_len, "refund approved");
        Ok(decided)
    }

    /// Denies a refund with an admin-supplied reason.
    ///
    /// The reason is validated before anything is read or written.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::Validation`] for a blank reason or actor,
    /// [`GuaranteeError::EnrollmentNotFound`] for an unknown enrollment and
    /// [`GuaranteeError::AlreadyDecided`] if it is no longer pending.
    pub async fn deny_refund(
        &self,
        id: EnrollmentId,
        decided_by: &str,
        reason: &str,
    ) -> Result<GuaranteeEnrollment, GuaranteeError> {
        let reason = require_text(reason, "reason")?;
        let actor = require_text(decided_by, "decided_by")?;
        let now = self.clock.now();
        let (enrollment, evaluation) = self.load_pending(id, now).await?;

        let decided = self
            .record(
                &enrollment,
                &evaluation,
                EnrollmentStatus::Denied,
                actor,
                reason.to_string(),
                now,
            )
            .await?;
        tracing::info!(enrollment_id = %id, actor, "refund denied");
        Ok(decided)
    }

    /// Formalises a computed expiry as a stored `expired` decision.
    ///
    /// Already-expired enrollments are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::Validation`] if the enrollment is not in
    /// the computed `expired` state, [`GuaranteeError::AlreadyDecided`] if it
    /// was refunded or denied, and [`GuaranteeError::EnrollmentNotFound`]
    /// for an unknown enrollment.
    pub async fn expire(
        &self,
        id: EnrollmentId,
        decided_by: &str,
    ) -> Result<GuaranteeEnrollment, GuaranteeError> {
        let actor = require_text(decided_by, "decided_by")?;
        let enrollment = self.load(id).await?;
        if enrollment.status == EnrollmentStatus::Expired {
            return Ok(enrollment);
        }
        let now = self.clock.now();
        let (enrollment, evaluation) = self.load_pending(id, now).await?;
        self.expire_evaluated(&enrollment, &evaluation, actor, now).await
    }

    /// Expires every pending enrollment whose computed state is `expired`.
    ///
    /// Failures are isolated per enrollment and reported in the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::DataUnavailable`] if the pending
    /// enrollments cannot be listed.
    pub async fn expire_overdue(&self) -> Result<ExpirySweep, GuaranteeError> {
        let now = self.clock.now();
        let query = EnrollmentQuery {
            status: Some(EnrollmentStatus::Pending),
            user_id: None,
        };
        let closed: Vec<GuaranteeEnrollment> = self
            .store
            .list_enrollments(&query)
            .await?
            .into_iter()
            .filter(|e| now > e.monitoring_until)
            .collect();

        let mut sweep = ExpirySweep {
            examined: closed.len(),
            ..ExpirySweep::default()
        };
        for enrollment in closed {
            match self.sweep_one(&enrollment, now).await {
                Ok(true) => sweep.expired.push(enrollment.id),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(enrollment_id = %enrollment.id, error = %err, "expiry failed");
                    sweep.failures.push((enrollment.id, err.to_string()));
                }
            }
        }

        tracing::info!(
            examined = sweep.examined,
            expired = sweep.expired.len(),
            failed = sweep.failures.len(),
            "expiry sweep finished"
        );
        Ok(sweep)
    }

    async fn sweep_one(
        &self,
        enrollment: &GuaranteeEnrollment,
        now: DateTime<Utc>,
    ) -> Result<bool, GuaranteeError> {
        let daily = self.store.daily_for(enrollment.id).await?;
        let evaluation = evaluator::evaluate(enrollment, &daily, now, &self.rules);
        if evaluation.computed_state != ComputedState::Expired {
            return Ok(false);
        }
        self.expire_evaluated(enrollment, &evaluation, SYSTEM_ACTOR, now)
            .await
            .map(|_| true)
    }

    async fn expire_evaluated(
        &self,
        enrollment: &GuaranteeEnrollment,
        evaluation: &Evaluation,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<GuaranteeEnrollment, GuaranteeError> {
        if evaluation.computed_state != ComputedState::Expired {
            return Err(GuaranteeError::Validation(format!(
                "enrollment {} is not expired (computed state: {})",
                enrollment.id, evaluation.computed_state
            )));
        }
        let reason = evaluator::narrative(enrollment, evaluation, &self.rules);
        let result = self
            .record(enrollment, evaluation, EnrollmentStatus::Expired, actor, reason, now)
            .await;
        match result {
            Err(GuaranteeError::AlreadyDecided {
                status: EnrollmentStatus::Expired,
                ..
            }) => self.load(enrollment.id).await,
            other => {
                if other.is_ok() {
                    tracing::info!(enrollment_id = %enrollment.id, actor, "enrollment expired");
                }
                other
            }
        }
    }

    async fn record(
        &self,
        enrollment: &GuaranteeEnrollment,
        evaluation: &Evaluation,
        status: EnrollmentStatus,
        actor: &str,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<GuaranteeEnrollment, GuaranteeError> {
        let decision = Decision {
            status,
            decided_at: now,
            decided_by: actor.to_string(),
            reason,
        };
        let audit = AuditEntry::for_decision(enrollment.id, &decision, evaluation)?;
        self.store.decide(enrollment.id, &decision, &audit).await
    }

    async fn load(&self, id: EnrollmentId) -> Result<GuaranteeEnrollment, GuaranteeError> {
        self.store
            .get_enrollment(id)
            .await?
            .ok_or(GuaranteeError::EnrollmentNotFound(*id.as_uuid()))
    }

    /// Loads a pending enrollment and evaluates it at `now`.
    async fn load_pending(
        &self,
        id: EnrollmentId,
        now: DateTime<Utc>,
    ) -> Result<(GuaranteeEnrollment, Evaluation), GuaranteeError> {
        let enrollment = self.load(id).await?;
        if enrollment.status.is_terminal() {
            return Err(GuaranteeError::AlreadyDecided {
                id: *id.as_uuid(),
                status: enrollment.status,
            });
        }
        let daily = self.store.daily_for(id).await?;
        let evaluation = evaluator::evaluate(&enrollment, &daily, now, &self.rules);
        Ok((enrollment, evaluation))
    }
}

fn require_text<'a>(value: &'a str, field: &str) -> Result<&'a str, GuaranteeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GuaranteeError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}

fn approval_reason(evaluation: &Evaluation, rules: &GuaranteeRules) -> String {
    match evaluation.computed_state {
        ComputedState::UnconditionalWindow => format!(
            "approved within the {}-day unconditional window (best run {} days)",
            rules.unconditional_days, evaluation.best_len
        ),
        ComputedState::ConditionalMet => format!(
            "approved: {}-day streak met (best run {} days)",
            rules.required_streak_days, evaluation.best_len
        ),
        ComputedState::ConditionalRunning
        | ComputedState::Expired
        | ComputedState::Settled => format!(
            "approved outside guarantee conditions ({}, best run {} of {} days)",
            evaluation.computed_state, evaluation.best_len, rules.required_streak_days
        ),
    }
}
