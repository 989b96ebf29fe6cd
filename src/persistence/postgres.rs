//! PostgreSQL implementation of the persistence layer.
//!
//! Queries are checked at runtime, not at compile time, so the crate
//! builds without a database. The schema lives in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::models::{
    AUDIT_COLUMNS, AuditRow, DAILY_COLUMNS, DailyRow, ENROLLMENT_COLUMNS, EnrollmentRow,
    to_db_int,
};
use super::{EnrollmentQuery, GuaranteeStore, PlaySource};
use crate::domain::{
    AuditEntry, Decision, EnrollmentId, EnrollmentStatus, GuaranteeDaily, GuaranteeEnrollment,
};
use crate::error::GuaranteeError;

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`GuaranteeError::DataUnavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), GuaranteeError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GuaranteeError::DataUnavailable(e.to_string()))
    }
}

fn into_enrollments(rows: Vec<EnrollmentRow>) -> Result<Vec<GuaranteeEnrollment>, GuaranteeError> {
    rows.into_iter().map(GuaranteeEnrollment::try_from).collect()
}

#[async_trait]
impl GuaranteeStore for PostgresStore {
    async fn insert_enrollment(
        &self,
        enrollment: &GuaranteeEnrollment,
    ) -> Result<(), GuaranteeError> {
        let result = sqlx::query(
            "INSERT INTO guarantee_enrollments (id, user_id, purchase_id, start_date, \
             unconditional_until, monitoring_until, retention_until, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(*enrollment.id.as_uuid())
        .bind(enrollment.user_id)
        .bind(&enrollment.purchase_id)
        .bind(enrollment.start_date)
        .bind(enrollment.unconditional_until)
        .bind(enrollment.monitoring_until)
        .bind(enrollment.retention_until)
        .bind(enrollment.status.as_str())
        .bind(enrollment.created_at)
        .bind(enrollment.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                GuaranteeError::DuplicatePurchase(enrollment.purchase_id.clone()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_enrollment(
        &self,
        id: EnrollmentId,
    ) -> Result<Option<GuaranteeEnrollment>, GuaranteeError> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM guarantee_enrollments WHERE id = $1");
        sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(GuaranteeEnrollment::try_from)
            .transpose()
    }

    async fn find_by_purchase(
        &self,
        purchase_id: &str,
    ) -> Result<Option<GuaranteeEnrollment>, GuaranteeError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM guarantee_enrollments WHERE purchase_id = $1"
        );
        sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(purchase_id)
            .fetch_optional(&self.pool)
            .await?
            .map(GuaranteeEnrollment::try_from)
            .transpose()
    }

    async fn list_enrollments(
        &self,
        query: &EnrollmentQuery,
    ) -> Result<Vec<GuaranteeEnrollment>, GuaranteeError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM guarantee_enrollments \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR user_id = $2) \
             ORDER BY start_date DESC, id"
        );
        let rows = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.user_id)
            .fetch_all(&self.pool)
            .await?;
        into_enrollments(rows)
    }

    async fn pending_overlapping(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<GuaranteeEnrollment>, GuaranteeError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM guarantee_enrollments \
             WHERE status = 'pending' AND start_date < $2 AND monitoring_until >= $1 \
             ORDER BY start_date, id"
        );
        let rows = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(from)
            .bind(until)
            .fetch_all(&self.pool)
            .await?;
        into_enrollments(rows)
    }

    async fn upsert_daily(
        &self,
        record: &GuaranteeDaily,
    ) -> Result<GuaranteeDaily, GuaranteeError> {
        let sql = format!(
            "INSERT INTO guarantee_daily (id, enrollment_id, day, plays_valid, meets_20, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (enrollment_id, day) DO UPDATE \
             SET plays_valid = EXCLUDED.plays_valid, meets_20 = EXCLUDED.meets_20, aggregated_at = now() \
             RETURNING {DAILY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DailyRow>(&sql)
            .bind(record.id)
            .bind(*record.enrollment_id.as_uuid())
            .bind(record.day)
            .bind(to_db_int(record.plays_valid))
            .bind(record.meets_20)
            .bind(record.created_at)
            .fetch_one(&self.pool)
            .await?;
        GuaranteeDaily::try_from(row)
    }

    async fn daily_for(&self, id: EnrollmentId) -> Result<Vec<GuaranteeDaily>, GuaranteeError> {
        let sql = format!(
            "SELECT {DAILY_COLUMNS} FROM guarantee_daily WHERE enrollment_id = $1 ORDER BY day"
        );
        sqlx::query_as::<_, DailyRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(GuaranteeDaily::try_from)
            .collect()
    }

    async fn decide(
        &self,
        id: EnrollmentId,
        decision: &Decision,
        audit: &AuditEntry,
    ) -> Result<GuaranteeEnrollment, GuaranteeError> {
        if !decision.status.is_terminal() {
            return Err(GuaranteeError::Validation(
                "a decision must move the enrollment to a terminal status".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE guarantee_enrollments \
             SET status = $2, decided_at = $3, decided_by = $4, decision_reason = $5, updated_at = $3 \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {ENROLLMENT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(*id.as_uuid())
            .bind(decision.status.as_str())
            .bind(decision.decided_at)
            .bind(&decision.decided_by)
            .bind(&decision.reason)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = updated else {
            let current = sqlx::query_scalar::<_, String>(
                "SELECT status FROM guarantee_enrollments WHERE id = $1",
            )
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;
            return Err(match current {
                None => GuaranteeError::EnrollmentNotFound(*id.as_uuid()),
                Some(status) => GuaranteeError::AlreadyDecided {
                    id: *id.as_uuid(),
                    status: status.parse().unwrap_or(EnrollmentStatus::Expired),
                },
            });
        };

        sqlx::query(
            "INSERT INTO guarantee_audit (id, enrollment_id, action, actor, reason, best_len, \
             computed_state, recorded_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(audit.id)
        .bind(*audit.enrollment_id.as_uuid())
        .bind(audit.action.as_str())
        .bind(&audit.actor)
        .bind(&audit.reason)
        .bind(to_db_int(audit.best_len))
        .bind(audit.computed_state.as_str())
        .bind(audit.recorded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        GuaranteeEnrollment::try_from(row)
    }

    async fn audit_trail(&self, id: EnrollmentId) -> Result<Vec<AuditEntry>, GuaranteeError> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM guarantee_audit WHERE enrollment_id = $1 ORDER BY recorded_at"
        );
        sqlx::query_as::<_, AuditRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AuditEntry::try_from)
            .collect()
    }

    async fn purge_daily(&self, before: DateTime<Utc>) -> Result<u64, GuaranteeError> {
        let result = sqlx::query(
            "DELETE FROM guarantee_daily d USING guarantee_enrollments e \
             WHERE d.enrollment_id = e.id AND e.retention_until < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PlaySource for PostgresStore {
    async fn valid_play_count(
        &self,
        enrollment: &GuaranteeEnrollment,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u32, GuaranteeError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM play_events \
             WHERE enrollment_id = $1 AND is_valid AND played_at >= $2 AND played_at < $3",
        )
        .bind(*enrollment.id.as_uuid())
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}
