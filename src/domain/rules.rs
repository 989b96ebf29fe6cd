//! Tunable guarantee thresholds and calendar-day helpers.
//!
//! Every number that decides a refund verdict lives in [`GuaranteeRules`]
//! so it can be changed through configuration. The rules also own the
//! operating timezone, because "a day" for the aggregator and the
//! evaluator must mean the same calendar day.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GuaranteeError;

/// Largest supported distance from UTC, in minutes (UTC±14:00).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Thresholds and windows of the money-back guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuaranteeRules {
    /// Valid plays needed on one day for the day to qualify.
    pub daily_play_threshold: u32,
    /// Consecutive qualifying days that satisfy the condition.
    pub required_streak_days: u32,
    /// Length of the unconditional refund window, in days.
    pub unconditional_days: u32,
    /// Length of the monitoring window, in days.
    pub monitoring_days: u32,
    /// Days after the start date that daily records are kept.
    pub retention_days: u32,
    /// Operating timezone as minutes east of UTC.
    pub utc_offset_minutes: i32,
}

impl Default for GuaranteeRules {
    fn default() -> Self {
        Self {
            daily_play_threshold: 20,
            required_streak_days: 21,
            unconditional_days: 7,
            monitoring_days: 30,
            retention_days: 90,
            utc_offset_minutes: 0,
        }
    }
}

impl GuaranteeRules {
    /// Checks that the rules describe a coherent guarantee.
    ///
    /// # Errors
    ///
    /// Returns [`GuaranteeError::Validation`] when a threshold is zero, the
    /// unconditional window does not end before the monitoring window, the
    /// streak cannot fit in the monitoring window, retention ends before
    /// monitoring, or the timezone offset is out of range.
    pub fn validate(&self) -> Result<(), GuaranteeError> {
        if self.daily_play_threshold == 0 {
            return Err(GuaranteeError::Validation(
                "daily play threshold must be positive".to_string(),
            ));
        }
        if self.required_streak_days == 0 {
            return Err(GuaranteeError::Validation(
                "required streak must be at least one day".to_string(),
            ));
        }
        if self.unconditional_days == 0 || self.unconditional_days >= self.monitoring_days {
            return Err(GuaranteeError::Validation(format!(
                "unconditional window ({} days) must be positive and shorter than the monitoring window ({} days)",
                self.unconditional_days, self.monitoring_days
            )));
        }
        if self.required_streak_days > self.monitoring_days {
            return Err(GuaranteeError::Validation(format!(
                "a {}-day streak cannot fit in a {}-day monitoring window",
                self.required_streak_days, self.monitoring_days
            )));
        }
        if self.retention_days < self.monitoring_days {
            return Err(GuaranteeError::Validation(
                "retention must cover at least the monitoring window".to_string(),
            ));
        }
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(GuaranteeError::Validation(format!(
                "utc offset {} minutes is out of range",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }

    /// Returns the operating timezone. Out-of-range offsets fall back to UTC.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or(Utc.fix())
    }

    /// Returns the calendar day `at` falls on in the operating timezone.
    #[must_use]
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    /// Returns the half-open UTC interval `[start, end)` covering `day` in
    /// the operating timezone.
    #[must_use]
    pub fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let local_midnight = day.and_time(NaiveTime::MIN);
        let offset_secs = i64::from(self.offset().local_minus_utc());
        let start = (local_midnight - Duration::seconds(offset_secs)).and_utc();
        (start, start + Duration::days(1))
    }

    /// Returns `true` if `plays_valid` meets the daily threshold.
    #[must_use]
    pub const fn is_qualifying(&self, plays_valid: u32) -> bool {
        plays_valid >= self.daily_play_threshold
    }

    /// Unconditional window length.
    #[must_use]
    pub fn unconditional_window(&self) -> Duration {
        Duration::days(i64::from(self.unconditional_days))
    }

    /// Monitoring window length.
    #[must_use]
    pub fn monitoring_window(&self) -> Duration {
        Duration::days(i64::from(self.monitoring_days))
    }

    /// Retention horizon length.
    #[must_use]
    pub fn retention_window(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }
}
