//! Per-day play tally written by the daily aggregator.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::EnrollmentId;
use super::rules::GuaranteeRules;

/// One aggregated day of an enrollment, keyed by `(enrollment_id, day)`.
///
/// A day without a row counts as zero plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuaranteeDaily {
    /// Row identifier. Stable across re-aggregation of the same day.
    pub id: uuid::Uuid,
    /// Owning enrollment.
    pub enrollment_id: EnrollmentId,
    /// Calendar day in the operating timezone.
    pub day: NaiveDate,
    /// Valid plays counted on `day`.
    pub plays_valid: u32,
    /// `plays_valid` reached the daily threshold.
    pub meets_20: bool,
    /// First aggregation timestamp.
    pub created_at: DateTime<Utc>,
}

impl GuaranteeDaily {
    /// Builds the record for a day's count, deriving `meets_20` from the
    /// daily threshold in `rules`.
    #[must_use]
    pub fn tally(
        enrollment_id: EnrollmentId,
        day: NaiveDate,
        plays_valid: u32,
        rules: &GuaranteeRules,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            enrollment_id,
            day,
            plays_valid,
            meets_20: rules.is_qualifying(plays_valid),
            created_at: now,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn tally_uses_configured_threshold() {
        let Some(day) = NaiveDate::from_ymd_opt(2025, 2, 1) else {
            panic!("valid date");
        };
        let strict = GuaranteeRules {
            daily_play_threshold: 25,
            ..GuaranteeRules::default()
        };
        let id = EnrollmentId::new();

        let default_row = GuaranteeDaily::tally(id, day, 20, &GuaranteeRules::default(), Utc::now());
        assert!(default_row.meets_20);

        let strict_row = GuaranteeDaily::tally(id, day, 20, &strict, Utc::now());
        assert!(!strict_row.meets_20);
        assert_eq!(strict_row.plays_valid, 20);
    }
}
