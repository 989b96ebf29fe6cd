//! Enrollment intake, called when a purchase completes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{GuaranteeEnrollment, GuaranteeRules};
use crate::error::GuaranteeError;
use crate::persistence::GuaranteeStore;

/// Opens guarantee enrollments, one per purchase.
#[derive(Debug, Clone)]
pub struct EnrollmentService {
    store: Arc<dyn GuaranteeStore>,
    clock: Arc<dyn Clock>,
    rules: GuaranteeRules,
}

impl EnrollmentService {
    /// Creates a new `EnrollmentService`.
    #[must_use]
    pub fn new(store: Arc<dyn GuaranteeStore>, clock: Arc<dyn Clock>, rules: GuaranteeRules) -> Self {
        Self {
            store,
            clock,
            rules,
        }
    }

    /// Enrolls a purchase in the guarantee.
    ///
    /// Idempotent per `purchase_id`: enrolling the same purchase again
    /// returns the existing enrollment and `false`. `start_date` defaults
    /// to now.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::Validation`] for a blank purchase id and
    /// [`GuaranteeError::DataUnavailable`] on store failure.
    pub async fn enroll(
        &self,
        user_id: Uuid,
        purchase_id: &str,
        start_date: Option<DateTime<Utc>>,
    ) -> Result<(GuaranteeEnrollment, bool), GuaranteeError> {
        let purchase_id = purchase_id.trim();
        if purchase_id.is_empty() {
            return Err(GuaranteeError::Validation(
                "purchase_id must not be empty".to_string(),
            ));
        }

        if let Some(existing) = self.store.find_by_purchase(purchase_id).await? {
            return Ok((existing, false));
        }

        let now = self.clock.now();
        let enrollment = GuaranteeEnrollment::open(
            user_id,
            purchase_id.to_string(),
            start_date.unwrap_or(now),
            &self.rules,
            now,
        );

        match self.store.insert_enrollment(&enrollment).await {
            Ok(()) => {
                tracing::info!(
                    enrollment_id = %enrollment.id,
                    %user_id,
                    purchase_id,
                    "guarantee enrollment opened"
                );
                Ok((enrollment, true))
            }
            // Lost a race with a concurrent enroll for the same purchase.
            Err(GuaranteeError::DuplicatePurchase(_)) => self
                .store
                .find_by_purchase(purchase_id)
                .await?
                .map(|existing| (existing, false))
                .ok_or_else(|| {
                    GuaranteeError::Internal(format!(
                        "purchase {purchase_id} reported as duplicate but not found"
                    ))
                }),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::EnrollmentStatus;
    use crate::persistence::MemoryStore;

    fn now() -> DateTime<Utc> {
        let Some(at) = Utc.with_ymd_and_hms(2025, 9, 15, 12, 0, 0).single() else {
            panic!("valid timestamp");
        };
        at
    }

    fn service(store: &Arc<MemoryStore>) -> EnrollmentService {
        EnrollmentService::new(
            Arc::clone(store) as Arc<dyn GuaranteeStore>,
            Arc::new(FixedClock::new(now())),
            GuaranteeRules::default(),
        )
    }

    #[tokio::test]
    async fn enroll_opens_pending_enrollment_with_windows() {
        let store = Arc::new(MemoryStore::new());
        let Ok((e, created)) = service(&store).enroll(Uuid::new_v4(), "pi_new", None).await else {
            panic!("enroll failed");
        };
        assert!(created);
        assert_eq!(e.status, EnrollmentStatus::Pending);
        assert_eq!(e.start_date, now());
        assert_eq!(e.unconditional_until, now() + Duration::days(7));
        assert_eq!(e.monitoring_until, now() + Duration::days(30));
    }

    #[tokio::test]
    async fn enroll_is_idempotent_per_purchase() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        let user = Uuid::new_v4();
        let Ok((first, _)) = svc.enroll(user, "pi_same", None).await else {
            panic!("first enroll failed");
        };
        let Ok((second, created)) = svc.enroll(user, " pi_same ", None).await else {
            panic!("second enroll failed");
        };
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn explicit_start_date_is_used() {
        let store = Arc::new(MemoryStore::new());
        let start = now() - Duration::days(3);
        let Ok((e, _)) = service(&store)
            .enroll(Uuid::new_v4(), "pi_backdated", Some(start))
            .await
        else {
            panic!("enroll failed");
        };
        assert_eq!(e.start_date, start);
        assert_eq!(e.created_at, now());
    }

    #[tokio::test]
    async fn blank_purchase_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let result = service(&store).enroll(Uuid::new_v4(), "  ", None).await;
        assert!(matches!(result, Err(GuaranteeError::Validation(_))));
    }

    #[tokio::test]
    async fn concurrent_enrolls_create_one_enrollment() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        let user = Uuid::new_v4();
        let (a, b) = tokio::join!(
            svc.enroll(user, "pi_concurrent", None),
            svc.enroll(user, "pi_concurrent", None)
        );
        let (Ok((a, _)), Ok((b, _))) = (a, b) else {
            panic!("enroll failed");
        };
        assert_eq!(a.id, b.id);
        let Ok(all) = store.list_enrollments(&Default::default()).await else {
            panic!("list failed");
        };
        assert_eq!(all.len(), 1);
    }
}
