//! Guarantee state evaluator.
//!
//! Pure functions over an enrollment and its daily records. Nothing here
//! touches storage or the wall clock: `now` is always passed in, so the
//! same inputs always produce the same verdict.
//!
//! The scored range is every calendar day from the start date up to
//! `min(now, monitoring_until)`. Days after `now` are not in the range yet,
//! so a partially elapsed window is never penalised for the future.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::daily::GuaranteeDaily;
use super::enrollment::GuaranteeEnrollment;
use super::rules::GuaranteeRules;
use crate::error::GuaranteeError;

/// Derived classification of an enrollment. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputedState {
    /// Inside the unconditional window: refund always available.
    UnconditionalWindow,
    /// Monitoring window still open, streak not reached yet.
    ConditionalRunning,
    /// Required streak reached: refund available.
    ConditionalMet,
    /// Monitoring window closed without the streak.
    Expired,
    /// A decision has been recorded; the stored status is authoritative.
    Settled,
}

impl ComputedState {
    /// Returns the wire string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnconditionalWindow => "unconditional_window",
            Self::ConditionalRunning => "conditional_running",
            Self::ConditionalMet => "conditional_met",
            Self::Expired => "expired",
            Self::Settled => "settled",
        }
    }

    /// Returns `true` if the guarantee currently entitles the user to a
    /// refund.
    #[must_use]
    pub const fn refund_available(&self) -> bool {
        matches!(self, Self::UnconditionalWindow | Self::ConditionalMet)
    }
}

impl fmt::Display for ComputedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputedState {
    type Err = GuaranteeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unconditional_window" => Ok(Self::UnconditionalWindow),
            "conditional_running" => Ok(Self::ConditionalRunning),
            "conditional_met" => Ok(Self::ConditionalMet),
            "expired" => Ok(Self::Expired),
            "settled" => Ok(Self::Settled),
            other => Err(GuaranteeError::InvalidFilter(format!(
                "unknown computed state: {other}"
            ))),
        }
    }
}

/// Result of evaluating one enrollment at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// Longest run of consecutive qualifying days in the scored range.
    pub best_len: u32,
    /// Run ending on the last scored day.
    pub current_len: u32,
    /// Number of calendar days scored so far.
    pub scored_days: u32,
    /// Derived state.
    pub computed_state: ComputedState,
}

/// One day of the admin calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    /// Calendar day in the operating timezone.
    pub day: NaiveDate,
    /// Valid plays (0 when no record exists).
    pub plays_valid: u32,
    /// Day met the threshold.
    pub qualifying: bool,
}

/// Longest and trailing run lengths over an ordered day sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLengths {
    /// Longest run found.
    pub best: u32,
    /// Run still open at the end of the sequence.
    pub current: u32,
}

/// Scans `days` in order and measures runs of days for which `qualifying`
/// holds. Any non-qualifying day resets the current run.
pub fn longest_run<I, F>(days: I, mut qualifying: F) -> RunLengths
where
    I: IntoIterator<Item = NaiveDate>,
    F: FnMut(NaiveDate) -> bool,
{
    days.into_iter().fold(RunLengths::default(), |mut acc, day| {
        if qualifying(day) {
            acc.current = acc.current.saturating_add(1);
            acc.best = acc.best.max(acc.current);
        } else {
            acc.current = 0;
        }
        acc
    })
}

/// Returns the calendar days scored at `now`, oldest first.
///
/// Empty when `now` is before the start date.
#[must_use]
pub fn scored_days(
    enrollment: &GuaranteeEnrollment,
    now: DateTime<Utc>,
    rules: &GuaranteeRules,
) -> Vec<NaiveDate> {
    if now < enrollment.start_date {
        return Vec::new();
    }
    let first = rules.day_of(enrollment.start_date);
    let last = rules.day_of(now.min(enrollment.monitoring_until));
    first.iter_days().take_while(|day| *day <= last).collect()
}

/// Evaluates `enrollment` against its daily records at instant `now`.
///
/// Records outside the scored range and records of other enrollments are
/// ignored. Missing days count as non-qualifying.
#[must_use]
pub fn evaluate(
    enrollment: &GuaranteeEnrollment,
    daily: &[GuaranteeDaily],
    now: DateTime<Utc>,
    rules: &GuaranteeRules,
) -> Evaluation {
    let by_day = index_by_day(enrollment, daily);
    let days = scored_days(enrollment, now, rules);
    let scored = u32::try_from(days.len()).unwrap_or(u32::MAX);
    let runs = longest_run(days, |day| by_day.get(&day).is_some_and(|r| r.meets_20));

    Evaluation {
        best_len: runs.best,
        current_len: runs.current,
        scored_days: scored,
        computed_state: derive_state(enrollment, runs.best, now, rules),
    }
}

/// Applies the state rules in priority order; the first match wins.
#[must_use]
pub fn derive_state(
    enrollment: &GuaranteeEnrollment,
    best_len: u32,
    now: DateTime<Utc>,
    rules: &GuaranteeRules,
) -> ComputedState {
    if !enrollment.is_pending() {
        ComputedState::Settled
    } else if now <= enrollment.unconditional_until {
        ComputedState::UnconditionalWindow
    } else if best_len >= rules.required_streak_days {
        ComputedState::ConditionalMet
    } else if now <= enrollment.monitoring_until {
        ComputedState::ConditionalRunning
    } else {
        ComputedState::Expired
    }
}

/// Builds the per-day calendar over the scored range.
#[must_use]
pub fn calendar(
    enrollment: &GuaranteeEnrollment,
    daily: &[GuaranteeDaily],
    now: DateTime<Utc>,
    rules: &GuaranteeRules,
) -> Vec<CalendarDay> {
    let by_day = index_by_day(enrollment, daily);
    scored_days(enrollment, now, rules)
        .into_iter()
        .map(|day| match by_day.get(&day) {
            Some(record) => CalendarDay {
                day,
                plays_valid: record.plays_valid,
                qualifying: record.meets_20,
            },
            None => CalendarDay {
                day,
                plays_valid: 0,
                qualifying: false,
            },
        })
        .collect()
}

/// Explains, in admin-facing prose, which rule produced the state.
#[must_use]
pub fn narrative(
    enrollment: &GuaranteeEnrollment,
    evaluation: &Evaluation,
    rules: &GuaranteeRules,
) -> String {
    let required = rules.required_streak_days;
    match evaluation.computed_state {
        ComputedState::Settled => format!(
            "decision recorded: {} ({})",
            enrollment.status,
            enrollment.decision_reason.as_deref().unwrap_or("no reason given")
        ),
        ComputedState::UnconditionalWindow => format!(
            "within the {}-day unconditional window until {}; refund available without conditions",
            rules.unconditional_days,
            enrollment.unconditional_until.to_rfc3339()
        ),
        ComputedState::ConditionalMet => format!(
            "{}-day streak reached (best run {} days); refund available",
            required, evaluation.best_len
        ),
        ComputedState::ConditionalRunning => format!(
            "best run {} of {} days, current run {}; monitoring continues until {}",
            evaluation.best_len,
            required,
            evaluation.current_len,
            enrollment.monitoring_until.to_rfc3339()
        ),
        ComputedState::Expired => format!(
            "monitoring window closed on {} with a best run of {} of {} days",
            enrollment.monitoring_until.to_rfc3339(),
            evaluation.best_len,
            required
        ),
    }
}

fn index_by_day<'a>(
    enrollment: &GuaranteeEnrollment,
    daily: &'a [GuaranteeDaily],
) -> BTreeMap<NaiveDate, &'a GuaranteeDaily> {
    daily
        .iter()
        .filter(|record| record.enrollment_id == enrollment.id)
        .map(|record| (record.day, record))
        .collect()
}
