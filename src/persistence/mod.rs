//! Persistence layer: storage ports and their implementations.
//!
//! Services depend only on the [`GuaranteeStore`] and [`PlaySource`]
//! traits. [`memory::MemoryStore`] backs tests and database-less runs;
//! [`postgres::PostgresStore`] uses `sqlx::PgPool` for async PostgreSQL
//! access.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AuditEntry, Decision, EnrollmentId, EnrollmentStatus, GuaranteeDaily, GuaranteeEnrollment,
};
use crate::error::GuaranteeError;

pub use memory::{MemoryPlaySource, MemoryStore};
pub use models::PlayEvent;
pub use postgres::PostgresStore;

/// Stored-field filter pushed down to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollmentQuery {
    /// Only enrollments with this status.
    pub status: Option<EnrollmentStatus>,
    /// Only enrollments of this user.
    pub user_id: Option<Uuid>,
}

/// Enrollment, daily-record and audit storage.
#[async_trait]
pub trait GuaranteeStore: Send + Sync + Debug {
    /// Inserts a new enrollment.
    ///
    /// Fails with [`GuaranteeError::DuplicatePurchase`] when the purchase is
    /// already enrolled.
    async fn insert_enrollment(&self, enrollment: &GuaranteeEnrollment)
    -> Result<(), GuaranteeError>;

    /// Loads one enrollment.
    async fn get_enrollment(
        &self,
        id: EnrollmentId,
    ) -> Result<Option<GuaranteeEnrollment>, GuaranteeError>;

    /// Loads the enrollment of a purchase.
    async fn find_by_purchase(
        &self,
        purchase_id: &str,
    ) -> Result<Option<GuaranteeEnrollment>, GuaranteeError>;

    /// Lists enrollments matching `query`, newest start date first.
    async fn list_enrollments(
        &self,
        query: &EnrollmentQuery,
    ) -> Result<Vec<GuaranteeEnrollment>, GuaranteeError>;

    /// Lists pending enrollments whose monitoring window overlaps
    /// `[from, until)`.
    async fn pending_overlapping(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<GuaranteeEnrollment>, GuaranteeError>;

    /// Atomically inserts or overwrites the record keyed by
    /// `(enrollment_id, day)` and returns the stored row.
    async fn upsert_daily(&self, record: &GuaranteeDaily)
    -> Result<GuaranteeDaily, GuaranteeError>;

    /// Loads all daily records of an enrollment, oldest day first.
    async fn daily_for(&self, id: EnrollmentId) -> Result<Vec<GuaranteeDaily>, GuaranteeError>;

    /// Moves a pending enrollment to the decision's status and appends
    /// `audit`, as one atomic write.
    ///
    /// Fails with [`GuaranteeError::AlreadyDecided`] when the enrollment is
    /// not pending at write time, and with
    /// [`GuaranteeError::EnrollmentNotFound`] when it does not exist.
    async fn decide(
        &self,
        id: EnrollmentId,
        decision: &Decision,
        audit: &AuditEntry,
    ) -> Result<GuaranteeEnrollment, GuaranteeError>;

    /// Loads the audit trail of an enrollment, oldest first.
    async fn audit_trail(&self, id: EnrollmentId) -> Result<Vec<AuditEntry>, GuaranteeError>;

    /// Deletes daily records of enrollments whose retention horizon ended
    /// before `before`. Returns the number of deleted rows.
    async fn purge_daily(&self, before: DateTime<Utc>) -> Result<u64, GuaranteeError>;
}

/// Read access to the play-event history owned by the playback subsystem.
///
/// The validity predicate (minimum listened duration or fraction) is
/// applied by the ingest side; this port only counts plays flagged valid.
#[async_trait]
pub trait PlaySource: Send + Sync + Debug {
    /// Counts valid plays linked to `enrollment` in `[from, until)`.
    async fn valid_play_count(
        &self,
        enrollment: &GuaranteeEnrollment,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, GuaranteeError>;
}
