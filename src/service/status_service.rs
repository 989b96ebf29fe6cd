//! Guarantee status view: loads an enrollment and its daily records and
//! runs the evaluator on every read.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::domain::evaluator;
use crate::domain::{
    EnrollmentId, GuaranteeEnrollment, GuaranteeRules, GuaranteeStatus, StatusDetail,
    StatusFilter,
};
use crate::error::GuaranteeError;
use crate::persistence::{EnrollmentQuery, GuaranteeStore};

/// Read-only projection over enrollments.
///
/// Nothing derived is cached: every call reflects the latest decision and
/// the latest aggregated days.
#[derive(Debug, Clone)]
pub struct StatusService {
    store: Arc<dyn GuaranteeStore>,
    clock: Arc<dyn Clock>,
    rules: GuaranteeRules,
}

impl StatusService {
    /// Creates a new `StatusService`.
    #[must_use]
    pub fn new(store: Arc<dyn GuaranteeStore>, clock: Arc<dyn Clock>, rules: GuaranteeRules) -> Self {
        Self {
            store,
            clock,
            rules,
        }
    }

    /// Returns the rules the evaluator runs with.
    #[must_use]
    pub const fn rules(&self) -> &GuaranteeRules {
        &self.rules
    }

    /// Returns one enrollment with its computed status.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::EnrollmentNotFound`] if the enrollment does
    /// not exist, or [`GuaranteeError::DataUnavailable`] on store failure.
    pub async fn get_status(&self, id: EnrollmentId) -> Result<GuaranteeStatus, GuaranteeError> {
        let enrollment = self.load(id).await?;
        self.assemble(enrollment, self.clock.now()).await
    }

    /// Returns the admin detail view: status, day calendar, rule narrative
    /// and audit trail.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::EnrollmentNotFound`] if the enrollment does
    /// not exist, or [`GuaranteeError::DataUnavailable`] on store failure.
    pub async fn get_detail(&self, id: EnrollmentId) -> Result<StatusDetail, GuaranteeError> {
        let now = self.clock.now();
        let enrollment = self.load(id).await?;
        let daily = self.store.daily_for(id).await?;
        let audit = self.store.audit_trail(id).await?;

        let evaluation = evaluator::evaluate(&enrollment, &daily, now, &self.rules);
        let calendar = evaluator::calendar(&enrollment, &daily, now, &self.rules);
        let narrative = evaluator::narrative(&enrollment, &evaluation, &self.rules);

        Ok(StatusDetail {
            status: GuaranteeStatus {
                enrollment,
                evaluation,
            },
            calendar,
            narrative,
            audit,
        })
    }

    /// Lists computed statuses matching `filter`.
    ///
    /// Stored fields are filtered by the store; the computed state is
    /// filtered after evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::DataUnavailable`] on store failure.
    pub async fn list_statuses(
        &self,
        filter: &StatusFilter,
    ) -> Result<Vec<GuaranteeStatus>, GuaranteeError> {
        let now = self.clock.now();
        let query = EnrollmentQuery {
            status: filter.status,
            user_id: filter.user_id,
        };
        let enrollments = self.store.list_enrollments(&query).await?;

        let mut statuses = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            let status = self.assemble(enrollment, now).await?;
            if filter.matches(&status) {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }

    async fn load(&self, id: EnrollmentId) -> Result<GuaranteeEnrollment, GuaranteeError> {
        self.store
            .get_enrollment(id)
            .await?
            .ok_or(GuaranteeError::EnrollmentNotFound(*id.as_uuid()))
    }

    async fn assemble(
        &self,
        enrollment: GuaranteeEnrollment,
        now: DateTime<Utc>,
    ) -> Result<GuaranteeStatus, GuaranteeError> {
        let daily = self.store.daily_for(enrollment.id).await?;
        let evaluation = evaluator::evaluate(&enrollment, &daily, now, &self.rules);
        Ok(GuaranteeStatus {
            enrollment,
            evaluation,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::{ComputedState, EnrollmentStatus, GuaranteeDaily};
    use crate::persistence::MemoryStore;

    fn d0() -> DateTime<Utc> {
        let Some(at) = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single() else {
            panic!("valid timestamp");
        };
        at
    }

    async fn seeded(
        store: &MemoryStore,
        purchase: &str,
        qualifying: std::ops::RangeInclusive<i64>,
    ) -> GuaranteeEnrollment {
        let rules = GuaranteeRules::default();
        let e = GuaranteeEnrollment::open(Uuid::new_v4(), purchase.to_string(), d0(), &rules, d0());
        let _ = store.insert_enrollment(&e).await;
        for offset in qualifying {
            let day = rules.day_of(d0() + Duration::days(offset));
            let _ = store
                .upsert_daily(&GuaranteeDaily::tally(e.id, day, 25, &rules, d0()))
                .await;
        }
        e
    }

    fn service(store: Arc<MemoryStore>, now: DateTime<Utc>) -> StatusService {
        StatusService::new(
            store,
            Arc::new(FixedClock::new(now)),
            GuaranteeRules::default(),
        )
    }

    #[tokio::test]
    async fn status_reflects_latest_daily_data() {
        let store = Arc::new(MemoryStore::new());
        let e = seeded(&store, "pi_s1", 8..=28).await;
        let svc = service(Arc::clone(&store), d0() + Duration::days(29));

        let Ok(status) = svc.get_status(e.id).await else {
            panic!("status failed");
        };
        assert_eq!(status.evaluation.best_len, 21);
        assert_eq!(status.computed_state(), ComputedState::ConditionalMet);
    }

    #[tokio::test]
    async fn missing_daily_rows_are_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let e = seeded(&store, "pi_s2", 1..=0).await;
        let svc = service(Arc::clone(&store), d0() + Duration::days(31));

        let Ok(detail) = svc.get_detail(e.id).await else {
            panic!("detail failed");
        };
        assert_eq!(detail.status.evaluation.best_len, 0);
        assert_eq!(detail.status.computed_state(), ComputedState::Expired);
        assert_eq!(detail.calendar.len(), 31);
        assert!(detail.calendar.iter().all(|d| d.plays_valid == 0));
        assert!(detail.narrative.contains("closed"));
        assert!(detail.audit.is_empty());
    }

    #[tokio::test]
    async fn unknown_enrollment_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store, d0());
        let result = svc.get_status(EnrollmentId::new()).await;
        assert!(matches!(result, Err(GuaranteeError::EnrollmentNotFound(_))));
    }

    #[tokio::test]
    async fn list_filters_by_computed_state() {
        let store = Arc::new(MemoryStore::new());
        let met = seeded(&store, "pi_met", 8..=28).await;
        let _running = seeded(&store, "pi_running", 8..=12).await;
        let svc = service(Arc::clone(&store), d0() + Duration::days(29));

        let filter = StatusFilter {
            computed_state: Some(ComputedState::ConditionalMet),
            ..StatusFilter::default()
        };
        let Ok(list) = svc.list_statuses(&filter).await else {
            panic!("list failed");
        };
        assert_eq!(list.len(), 1);
        assert_eq!(list.first().map(|s| s.enrollment.id), Some(met.id));

        let pending = StatusFilter {
            status: Some(EnrollmentStatus::Pending),
            ..StatusFilter::default()
        };
        let Ok(all) = svc.list_statuses(&pending).await else {
            panic!("list failed");
        };
        assert_eq!(all.len(), 2);
    }
}
