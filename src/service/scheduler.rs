//! Nightly batch: aggregate every day since the last complete one,
//! optionally expire lapsed enrollments, then purge daily records past
//! retention.
//!
//! A day whose aggregation failed, fully or for some enrollments, stays
//! behind and is aggregated again by every following run until it
//! completes. A run that leaves a day behind is retried after a short
//! backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::aggregation_service::{AggregationReport, DailyAggregator};
use super::decision_service::{DecisionService, ExpirySweep};
use crate::clock::Clock;
use crate::domain::GuaranteeRules;
use crate::persistence::GuaranteeStore;

/// Default number of days, ending yesterday, every run re-aggregates.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 3;

/// Default delay before retrying a run that left a day behind.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(15 * 60);

/// Timing and behaviour of the nightly batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Local hour (0-23) of the nightly run.
    pub run_hour: u32,
    /// Formalise computed expiries after aggregation.
    pub auto_expire: bool,
    /// Days ending yesterday that every run re-aggregates; at least one.
    pub lookback_days: u32,
    /// Delay before retrying a run that left a day behind.
    pub retry_after: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            run_hour: 2,
            auto_expire: false,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

/// Outcome of one scheduled run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledRun {
    /// Reports of the days that could be listed, oldest first.
    pub aggregation: Vec<AggregationReport>,
    /// Oldest day still not fully aggregated after this run.
    pub behind_since: Option<NaiveDate>,
    /// Expiry sweep. `None` when disabled or failed, and while aggregation
    /// is behind.
    pub expiry: Option<ExpirySweep>,
    /// Daily records purged by retention. `None` if the purge failed.
    pub purged: Option<u64>,
}

impl ScheduledRun {
    /// Returns `true` if every day up to yesterday is fully aggregated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.behind_since.is_none()
    }
}

/// Drives the nightly batch at a fixed local hour.
#[derive(Debug)]
pub struct Scheduler {
    aggregator: Arc<DailyAggregator>,
    decisions: Arc<DecisionService>,
    store: Arc<dyn GuaranteeStore>,
    clock: Arc<dyn Clock>,
    rules: GuaranteeRules,
    settings: ScheduleSettings,
    behind_since: Mutex<Option<NaiveDate>>,
}

impl Scheduler {
    /// Creates a scheduler. A run hour past 23 is clamped to 23 and a
    /// lookback of zero is treated as one.
    #[must_use]
    pub fn new(
        aggregator: Arc<DailyAggregator>,
        decisions: Arc<DecisionService>,
        store: Arc<dyn GuaranteeStore>,
        clock: Arc<dyn Clock>,
        rules: GuaranteeRules,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            aggregator,
            decisions,
            store,
            clock,
            rules,
            settings: ScheduleSettings {
                run_hour: settings.run_hour.min(23),
                lookback_days: settings.lookback_days.max(1),
                ..settings
            },
            behind_since: Mutex::new(None),
        }
    }

    /// Runs every step once.
    ///
    /// Aggregates each day from the oldest incomplete one (or the lookback
    /// window, whichever starts earlier) through yesterday, never further
    /// back than retention. The expiry sweep is skipped while a day is
    /// behind, since a missing daily record reads as zero plays. The purge
    /// always runs.
    pub async fn run_once(&self) -> ScheduledRun {
        let target = self.aggregator.default_target_date();
        let mut behind = self.behind_since.lock().await;
        let from = self.catch_up_from(target, *behind);

        let mut aggregation = Vec::new();
        let mut incomplete = None;
        let mut day = from;
        while day <= target {
            match self.aggregator.aggregate(day).await {
                Ok(report) => {
                    if !report.is_complete() {
                        incomplete = incomplete.or(Some(day));
                    }
                    aggregation.push(report);
                }
                Err(err) => {
                    tracing::error!(%day, error = %err, "scheduled aggregation failed");
                    incomplete = incomplete.or(Some(day));
                }
            }
            let Some(next) = day.checked_add_days(Days::new(1)) else {
                break;
            };
            day = next;
        }
        *behind = incomplete;
        drop(behind);

        if let Some(day) = incomplete {
            tracing::warn!(behind_since = %day, "aggregation incomplete, day will be retried");
        }

        let expiry = match (self.settings.auto_expire, incomplete) {
            (false, _) => None,
            (true, Some(day)) => {
                tracing::warn!(behind_since = %day, "expiry sweep skipped until aggregation catches up");
                None
            }
            (true, None) => match self.decisions.expire_overdue().await {
                Ok(sweep) => Some(sweep),
                Err(err) => {
                    tracing::error!(error = %err, "scheduled expiry sweep failed");
                    None
                }
            },
        };

        let purged = match self.store.purge_daily(self.clock.now()).await {
            Ok(rows) => {
                if rows > 0 {
                    tracing::info!(rows, "purged daily records past retention");
                }
                Some(rows)
            }
            Err(err) => {
                tracing::error!(error = %err, "retention purge failed");
                None
            }
        };

        ScheduledRun {
            aggregation,
            behind_since: incomplete,
            expiry,
            purged,
        }
    }

    /// First day a run targeting `target` aggregates.
    fn catch_up_from(&self, target: NaiveDate, behind: Option<NaiveDate>) -> NaiveDate {
        let back = |days: u32| {
            target
                .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
                .unwrap_or(target)
        };
        let lookback = back(self.settings.lookback_days);
        let oldest = back(self.rules.retention_days);
        behind.map_or(lookback, |day| day.min(lookback)).max(oldest)
    }

    /// Loops forever, sleeping until the next run hour between runs. A run
    /// that leaves a day behind is retried after the configured backoff.
    pub async fn run(self: Arc<Self>) {
        let retry_after = chrono::Duration::from_std(self.settings.retry_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let mut retry = false;
        loop {
            let now = self.clock.now();
            let mut next = next_run_after(now, &self.rules, self.settings.run_hour);
            if retry {
                next = next.min(now + retry_after);
            }
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(next_run = %next, retry, "scheduler sleeping");
            tokio::time::sleep(wait).await;
            retry = !self.run_once().await.is_complete();
        }
    }
}

/// Returns the first instant strictly after `now` at which the local clock
/// reads `run_hour:00`.
#[must_use]
pub fn next_run_after(now: DateTime<Utc>, rules: &GuaranteeRules, run_hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(run_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = rules.day_of(now);
    let offset = rules.offset();

    [Some(today), today.checked_add_days(Days::new(1))]
        .into_iter()
        .flatten()
        .filter_map(|day| day.and_time(at).and_local_timezone(offset).single())
        .map(|local| local.with_timezone(&Utc))
        .find(|candidate| *candidate > now)
        .unwrap_or(now + chrono::Duration::days(1))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::{EnrollmentStatus, GuaranteeEnrollment};
    use crate::error::GuaranteeError;
    use crate::persistence::{MemoryPlaySource, MemoryStore, PlaySource};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        let Some(at) = Utc.with_ymd_and_hms(y, m, d, h, min, 0).single() else {
            panic!("valid timestamp");
        };
        at
    }

    #[test]
    fn next_run_is_later_today_when_hour_not_reached() {
        let now = utc(2025, 10, 1, 1, 15);
        assert_eq!(
            next_run_after(now, &GuaranteeRules::default(), 2),
            utc(2025, 10, 1, 2, 0)
        );
    }

    #[test]
    fn next_run_rolls_to_tomorrow_at_or_after_hour() {
        let rules = GuaranteeRules::default();
        assert_eq!(
            next_run_after(utc(2025, 10, 1, 2, 0), &rules, 2),
            utc(2025, 10, 2, 2, 0)
        );
        assert_eq!(
            next_run_after(utc(2025, 10, 1, 18, 0), &rules, 2),
            utc(2025, 10, 2, 2, 0)
        );
    }

    #[test]
    fn next_run_respects_operating_offset() {
        let rules = GuaranteeRules {
            utc_offset_minutes: -300,
            ..GuaranteeRules::default()
        };
        // 02:00 at UTC-5 is 07:00 UTC.
        assert_eq!(
            next_run_after(utc(2025, 10, 1, 6, 0), &rules, 2),
            utc(2025, 10, 1, 7, 0)
        );
    }

    /// Fails the first play lookup, then delegates.
    #[derive(Debug)]
    struct FailsOnce {
        inner: Arc<MemoryPlaySource>,
        failed: AtomicBool,
    }

    #[async_trait]
    impl PlaySource for FailsOnce {
        async fn valid_play_count(
            &self,
            enrollment: &GuaranteeEnrollment,
            from: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> Result<u32, GuaranteeError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(GuaranteeError::DataUnavailable("play history timeout".to_string()));
            }
            self.inner.valid_play_count(enrollment, from, until).await
        }
    }

    fn scheduler(
        store: &Arc<MemoryStore>,
        plays: Arc<dyn PlaySource>,
        clock: &Arc<FixedClock>,
        settings: ScheduleSettings,
    ) -> Scheduler {
        let rules = GuaranteeRules::default();
        let store_port = Arc::clone(store) as Arc<dyn GuaranteeStore>;
        let clock_port = Arc::clone(clock) as Arc<dyn Clock>;
        let aggregator = Arc::new(DailyAggregator::new(
            Arc::clone(&store_port),
            plays,
            Arc::clone(&clock_port),
            rules,
            2,
        ));
        let decisions = Arc::new(DecisionService::new(
            Arc::clone(&store_port),
            Arc::clone(&clock_port),
            rules,
        ));
        Scheduler::new(aggregator, decisions, store_port, clock_port, rules, settings)
    }

    #[tokio::test]
    async fn run_once_aggregates_expires_and_purges() {
        let rules = GuaranteeRules::default();
        let store = Arc::new(MemoryStore::new());
        let start = utc(2025, 6, 1, 12, 0);
        let clock = Arc::new(FixedClock::new(start + Duration::days(31) + Duration::hours(14)));

        let lapsed = GuaranteeEnrollment::open(Uuid::new_v4(), "pi_lapsed".to_string(), start, &rules, start);
        let _ = store.insert_enrollment(&lapsed).await;

        let settings = ScheduleSettings {
            auto_expire: true,
            ..ScheduleSettings::default()
        };
        let scheduler = scheduler(&store, Arc::new(MemoryPlaySource::new()), &clock, settings);

        let run = scheduler.run_once().await;
        assert!(run.is_complete());
        assert_eq!(run.aggregation.len(), 3);
        let Some(expiry) = run.expiry else {
            panic!("sweep should run");
        };
        assert_eq!(expiry.expired, vec![lapsed.id]);
        assert_eq!(run.purged, Some(0));

        let Ok(Some(stored)) = store.get_enrollment(lapsed.id).await else {
            panic!("missing enrollment");
        };
        assert_eq!(stored.status, EnrollmentStatus::Expired);
    }

    #[tokio::test]
    async fn failed_day_is_reaggregated_by_the_next_run() {
        let rules = GuaranteeRules::default();
        let store = Arc::new(MemoryStore::new());
        let inner = Arc::new(MemoryPlaySource::new());
        let start = utc(2025, 6, 1, 0, 0);
        let e = GuaranteeEnrollment::open(Uuid::new_v4(), "pi_catch_up".to_string(), start, &rules, start);
        let _ = store.insert_enrollment(&e).await;
        for offset in 0..3 {
            inner
                .record_many(&e, start + Duration::days(offset) + Duration::hours(12), 25, true)
                .await;
        }

        let clock = Arc::new(FixedClock::new(start + Duration::days(1) + Duration::hours(2)));
        let plays = Arc::new(FailsOnce {
            inner,
            failed: AtomicBool::new(false),
        });
        let settings = ScheduleSettings {
            auto_expire: true,
            lookback_days: 1,
            ..ScheduleSettings::default()
        };
        let scheduler = scheduler(&store, plays, &clock, settings);
        let day = |offset: i64| rules.day_of(start + Duration::days(offset));

        let first = scheduler.run_once().await;
        assert_eq!(first.aggregation.first().map(|r| r.failures.len()), Some(1));
        assert_eq!(first.behind_since, Some(day(0)));
        assert!(first.expiry.is_none(), "no expiry while a day is behind");

        clock.advance(Duration::days(1));
        let second = scheduler.run_once().await;
        let days: Vec<NaiveDate> = second.aggregation.iter().map(|r| r.day).collect();
        assert_eq!(days, vec![day(0), day(1)]);
        assert!(second.is_complete());
        assert!(second.expiry.is_some());

        clock.advance(Duration::days(1));
        let third = scheduler.run_once().await;
        assert_eq!(third.aggregation.iter().map(|r| r.day).collect::<Vec<_>>(), vec![day(2)]);

        let Ok(rows) = store.daily_for(e.id).await else {
            panic!("daily read failed");
        };
        let stored: Vec<(NaiveDate, u32)> = rows.iter().map(|r| (r.day, r.plays_valid)).collect();
        assert_eq!(stored, vec![(day(0), 25), (day(1), 25), (day(2), 25)]);
    }

    #[tokio::test]
    async fn fresh_scheduler_covers_lookback_window() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(utc(2025, 6, 10, 3, 0)));
        let scheduler = scheduler(
            &store,
            Arc::new(MemoryPlaySource::new()),
            &clock,
            ScheduleSettings::default(),
        );

        let run = scheduler.run_once().await;
        let days: Vec<NaiveDate> = run.aggregation.iter().map(|r| r.day).collect();
        let Some(first) = NaiveDate::from_ymd_opt(2025, 6, 7) else {
            panic!("valid date");
        };
        assert_eq!(days.first(), Some(&first));
        assert_eq!(days.len(), DEFAULT_LOOKBACK_DAYS as usize);
        assert!(run.expiry.is_none(), "auto-expiry is off by default");
    }
}
