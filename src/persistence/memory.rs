//! In-memory store.
//!
//! Each collection sits behind its own [`tokio::sync::RwLock`]. Operations
//! that must be atomic across collections (a decision plus its audit entry,
//! a retention purge) take their locks in one fixed order: enrollments,
//! then daily records, then audit.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::models::PlayEvent;
use super::{EnrollmentQuery, GuaranteeStore, PlaySource};
use crate::domain::{AuditEntry, Decision, EnrollmentId, GuaranteeDaily, GuaranteeEnrollment};
use crate::error::GuaranteeError;

/// Volatile [`GuaranteeStore`] used by tests and database-less runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    enrollments: RwLock<HashMap<EnrollmentId, GuaranteeEnrollment>>,
    daily: RwLock<BTreeMap<(EnrollmentId, NaiveDate), GuaranteeDaily>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored daily records.
    pub async fn daily_len(&self) -> usize {
        self.daily.read().await.len()
    }
}

#[async_trait]
impl GuaranteeStore for MemoryStore {
    async fn insert_enrollment(
        &self,
        enrollment: &GuaranteeEnrollment,
    ) -> Result<(), GuaranteeError> {
        let mut map = self.enrollments.write().await;
        if map
            .values()
            .any(|existing| existing.purchase_id == enrollment.purchase_id)
        {
            return Err(GuaranteeError::DuplicatePurchase(
                enrollment.purchase_id.clone(),
            ));
        }
        if map.contains_key(&enrollment.id) {
            return Err(GuaranteeError::Internal(format!(
                "enrollment {} already exists",
                enrollment.id
            )));
        }
        map.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn get_enrollment(
        &self,
        id: EnrollmentId,
    ) -> Result<Option<GuaranteeEnrollment>, GuaranteeError> {
        Ok(self.enrollments.read().await.get(&id).cloned())
    }

    async fn find_by_purchase(
        &self,
        purchase_id: &str,
    ) -> Result<Option<GuaranteeEnrollment>, GuaranteeError> {
        Ok(self
            .enrollments
            .read()
            .await
            .values()
            .find(|e| e.purchase_id == purchase_id)
            .cloned())
    }

    async fn list_enrollments(
        &self,
        query: &EnrollmentQuery,
    ) -> Result<Vec<GuaranteeEnrollment>, GuaranteeError> {
        let map = self.enrollments.read().await;
        let mut found: Vec<GuaranteeEnrollment> = map
            .values()
            .filter(|e| query.status.is_none_or(|s| s == e.status))
            .filter(|e| query.user_id.is_none_or(|u| u == e.user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn pending_overlapping(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<GuaranteeEnrollment>, GuaranteeError> {
        let map = self.enrollments.read().await;
        let mut found: Vec<GuaranteeEnrollment> = map
            .values()
            .filter(|e| e.is_pending() && e.overlaps(from, until))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn upsert_daily(
        &self,
        record: &GuaranteeDaily,
    ) -> Result<GuaranteeDaily, GuaranteeError> {
        let mut daily = self.daily.write().await;
        let stored = daily
            .entry((record.enrollment_id, record.day))
            .and_modify(|existing| {
                existing.plays_valid = record.plays_valid;
                existing.meets_20 = record.meets_20;
            })
            .or_insert_with(|| record.clone());
        Ok(stored.clone())
    }

    async fn daily_for(&self, id: EnrollmentId) -> Result<Vec<GuaranteeDaily>, GuaranteeError> {
        Ok(self
            .daily
            .read()
            .await
            .range((id, NaiveDate::MIN)..=(id, NaiveDate::MAX))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn decide(
        &self,
        id: EnrollmentId,
        decision: &Decision,
        audit: &AuditEntry,
    ) -> Result<GuaranteeEnrollment, GuaranteeError> {
        let mut map = self.enrollments.write().await;
        let enrollment = map
            .get_mut(&id)
            .ok_or(GuaranteeError::EnrollmentNotFound(*id.as_uuid()))?;
        let mut updated = enrollment.clone();
        updated.apply(decision.clone())?;

        let mut trail = self.audit.write().await;
        *enrollment = updated.clone();
        trail.push(audit.clone());
        Ok(updated)
    }

    async fn audit_trail(&self, id: EnrollmentId) -> Result<Vec<AuditEntry>, GuaranteeError> {
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .filter(|entry| entry.enrollment_id == id)
            .cloned()
            .collect())
    }

    async fn purge_daily(&self, before: DateTime<Utc>) -> Result<u64, GuaranteeError> {
        let map = self.enrollments.read().await;
        let mut daily = self.daily.write().await;
        let len_before = daily.len();
        daily.retain(|(enrollment_id, _), _| {
            map.get(enrollment_id)
                .is_none_or(|e| e.retention_until >= before)
        });
        Ok(u64::try_from(len_before.saturating_sub(daily.len())).unwrap_or(u64::MAX))
    }
}

/// Volatile [`PlaySource`] holding raw play events.
#[derive(Debug, Default)]
pub struct MemoryPlaySource {
    events: RwLock<Vec<PlayEvent>>,
}

impl MemoryPlaySource {
    /// Creates an empty play history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one play event.
    pub async fn record(&self, event: PlayEvent) {
        self.events.write().await.push(event);
    }

    /// Records `count` plays for an enrollment at `played_at`.
    pub async fn record_many(
        &self,
        enrollment: &GuaranteeEnrollment,
        played_at: DateTime<Utc>,
        count: u32,
        valid: bool,
    ) {
        let mut events = self.events.write().await;
        for _ in 0..count {
            events.push(PlayEvent {
                user_id: enrollment.user_id,
                enrollment_id: Some(enrollment.id),
                played_at,
                valid,
            });
        }
    }
}

#[async_trait]
impl PlaySource for MemoryPlaySource {
    async fn valid_play_count(
        &self,
        enrollment: &GuaranteeEnrollment,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, GuaranteeError> {
        let events = self.events.read().await;
        let count = events
            .iter()
            .filter(|e| e.valid && e.enrollment_id == Some(enrollment.id))
            .filter(|e| e.played_at >= from && e.played_at < until)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
