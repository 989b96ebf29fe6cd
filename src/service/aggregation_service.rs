//! Daily aggregator: turns raw valid plays into one `GuaranteeDaily`
//! record per pending enrollment and calendar day.
//!
//! Re-running a day overwrites the same `(enrollment_id, day)` rows, so the
//! job is safe to retry or backfill.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;

use crate::clock::Clock;
use crate::domain::{EnrollmentId, GuaranteeDaily, GuaranteeEnrollment, GuaranteeRules};
use crate::error::GuaranteeError;
use crate::persistence::{GuaranteeStore, PlaySource};

/// Default number of enrollments tallied concurrently.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// One enrollment the aggregator could not tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationFailure {
    /// Enrollment that failed.
    pub enrollment_id: EnrollmentId,
    /// Error message.
    pub error: String,
}

/// Outcome of aggregating one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    /// Aggregated calendar day.
    pub day: NaiveDate,
    /// Pending enrollments whose window overlaps the day.
    pub examined: usize,
    /// Daily records written.
    pub written: usize,
    /// Written records that met the threshold.
    pub qualifying: usize,
    /// Enrollments that failed; the rest of the batch still ran.
    pub failures: Vec<AggregationFailure>,
}

impl AggregationReport {
    fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            examined: 0,
            written: 0,
            qualifying: 0,
            failures: Vec::new(),
        }
    }

    /// Returns `true` if every examined enrollment was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts a report with failures into an error.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::AggregationPartialFailure`] listing the
    /// failed enrollments.
    pub fn into_result(self) -> Result<Self, GuaranteeError> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(GuaranteeError::AggregationPartialFailure {
            failed: self.into_failed().collect(),
        })
    }

    /// Passes a batch of reports through if every day completed, otherwise
    /// fails with the failures of every day merged.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::AggregationPartialFailure`] listing each
    /// failed `(day, enrollment)` pair across the batch.
    pub fn all_complete(reports: Vec<Self>) -> Result<Vec<Self>, GuaranteeError> {
        if reports.iter().all(Self::is_complete) {
            return Ok(reports);
        }
        Err(GuaranteeError::AggregationPartialFailure {
            failed: reports.into_iter().flat_map(Self::into_failed).collect(),
        })
    }

    fn into_failed(self) -> impl Iterator<Item = (NaiveDate, uuid::Uuid, String)> {
        let day = self.day;
        self.failures
            .into_iter()
            .map(move |f| (day, *f.enrollment_id.as_uuid(), f.error))
    }
}

/// Batch job computing daily play tallies.
#[derive(Debug, Clone)]
pub struct DailyAggregator {
    store: Arc<dyn GuaranteeStore>,
    plays: Arc<dyn PlaySource>,
    clock: Arc<dyn Clock>,
    rules: GuaranteeRules,
    concurrency: usize,
}

impl DailyAggregator {
    /// Creates a new aggregator. A `concurrency` of zero is treated as one.
    #[must_use]
    pub fn new(
        store: Arc<dyn GuaranteeStore>,
        plays: Arc<dyn PlaySource>,
        clock: Arc<dyn Clock>,
        rules: GuaranteeRules,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            plays,
            clock,
            rules,
            concurrency: concurrency.max(1),
        }
    }

    /// Yesterday in the operating timezone; the day a nightly run targets.
    #[must_use]
    pub fn default_target_date(&self) -> NaiveDate {
        let today = self.rules.day_of(self.clock.now());
        today.pred_opt().unwrap_or(today)
    }

    /// Aggregates one calendar day for every pending enrollment whose
    /// window overlaps it.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::DataUnavailable`] if the enrollments cannot
    /// be listed. Per-enrollment failures do not fail the call; they are
    /// listed in the report.
    pub async fn aggregate(&self, day: NaiveDate) -> Result<AggregationReport, GuaranteeError> {
        let (from, until) = self.rules.day_bounds(day);
        let enrollments = self.store.pending_overlapping(from, until).await?;

        let mut report = AggregationReport::empty(day);
        report.examined = enrollments.len();
        if enrollments.is_empty() {
            tracing::debug!(%day, "no enrollments to aggregate");
            return Ok(report);
        }

        let outcomes: Vec<(EnrollmentId, Result<GuaranteeDaily, GuaranteeError>)> =
            stream::iter(enrollments)
                .map(|enrollment| async move {
                    let id = enrollment.id;
                    (id, self.tally_one(&enrollment, day, from, until).await)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        for (enrollment_id, outcome) in outcomes {
            match outcome {
                Ok(record) => {
                    report.written += 1;
                    if record.meets_20 {
                        report.qualifying += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(%enrollment_id, %day, error = %err, "daily tally failed");
                    report.failures.push(AggregationFailure {
                        enrollment_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        report.failures.sort_by_key(|f| f.enrollment_id);

        tracing::info!(
            %day,
            examined = report.examined,
            written = report.written,
            qualifying = report.qualifying,
            failed = report.failures.len(),
            "daily aggregation finished"
        );
        Ok(report)
    }

    /// Aggregates every day in `[from, to]`, oldest first.
    ///
    /// A range may span at most `retention_days` days; older daily records
    /// are purged anyway.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::Validation`] if `from` is after `to` or the
    /// range is longer than the retention horizon, or the first listing
    /// failure encountered.
    pub async fn aggregate_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AggregationReport>, GuaranteeError> {
        if from > to {
            return Err(GuaranteeError::Validation(format!(
                "range start {from} is after range end {to}"
            )));
        }
        let span = (to - from).num_days() + 1;
        if span > i64::from(self.rules.retention_days) {
            return Err(GuaranteeError::Validation(format!(
                "range {from}..{to} spans {span} days, at most {} allowed",
                self.rules.retention_days
            )));
        }
        let mut reports = Vec::new();
        let mut day = from;
        while day <= to {
            reports.push(self.aggregate(day).await?);
            let Some(next) = day.checked_add_days(Days::new(1)) else {
                break;
            };
            day = next;
        }
        Ok(reports)
    }

    async fn tally_one(
        &self,
        enrollment: &GuaranteeEnrollment,
        day: NaiveDate,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<GuaranteeDaily, GuaranteeError> {
        let plays = self.plays.valid_play_count(enrollment, from, until).await?;
        let record = GuaranteeDaily::tally(enrollment.id, day, plays, &self.rules, self.clock.now());
        self.store.upsert_daily(&record).await
    }
}
