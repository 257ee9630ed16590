//! Wall-clock drift accounting for paced battle loops.
//!
//! The simulation itself is tick-counted and never looks at a clock. Hosts
//! that pace ticks against real time feed their measurements into a
//! [`DriftTracker`] so that lateness is reported instead of silently
//! absorbed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a paced loop does when a tick starts late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DriftPolicy {
    /// Run late ticks back to back until caught up.
    #[default]
    AcceptDrift,
    /// Drop missed wall-clock slots and stay aligned to the original cadence.
    SkipToPreservePacing,
}

/// Summary of pacing quality over a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriftReport {
    /// Ticks processed.
    pub ticks: u64,
    /// Ticks that started a full slot or more after their scheduled start.
    pub late_ticks: u64,
    /// Ticks whose processing exceeded the tick budget.
    pub overruns: u64,
    /// Wall-clock slots dropped under [`DriftPolicy::SkipToPreservePacing`].
    pub skipped_slots: u64,
    /// Worst start lateness, in microseconds.
    pub max_lateness_us: u64,
    /// Sum of start lateness, in microseconds.
    pub total_lateness_us: u64,
    /// Longest tick processing time, in microseconds.
    pub max_processing_us: u64,
}

impl DriftReport {
    /// Mean start lateness per tick, in microseconds.
    #[must_use]
    pub fn mean_lateness_us(&self) -> u64 {
        self.total_lateness_us.checked_div(self.ticks).unwrap_or(0)
    }
}

/// Accumulates lateness and overruns of a paced loop.
#[derive(Debug, Clone)]
pub struct DriftTracker {
    policy: DriftPolicy,
    budget: Duration,
    report: DriftReport,
}

impl DriftTracker {
    /// Create a tracker for ticks of `budget` length.
    #[must_use]
    pub fn new(policy: DriftPolicy, budget: Duration) -> Self {
        Self {
            policy,
            budget,
            report: DriftReport::default(),
        }
    }

    /// Configured policy.
    #[must_use]
    pub const fn policy(&self) -> DriftPolicy {
        self.policy
    }

    /// Tick budget.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Record one processed tick.
    ///
    /// `lateness` is how long after its scheduled slot the tick started and
    /// `processing` how long the tick function ran. Returns the number of
    /// whole slots that were missed, which the loop skips under
    /// [`DriftPolicy::SkipToPreservePacing`].
    pub fn record_tick(&mut self, lateness: Duration, processing: Duration) -> u64 {
        let report = &mut self.report;
        report.ticks += 1;

        let lateness_us = duration_us(lateness);
        let processing_us = duration_us(processing);
        report.max_processing_us = report.max_processing_us.max(processing_us);
        if processing > self.budget {
            report.overruns += 1;
        }

        report.max_lateness_us = report.max_lateness_us.max(lateness_us);
        report.total_lateness_us = report.total_lateness_us.saturating_add(lateness_us);

        let budget_us = duration_us(self.budget).max(1);
        let missed = lateness_us / budget_us;
        if missed == 0 {
            return 0;
        }

        report.late_ticks += 1;
        match self.policy {
            DriftPolicy::AcceptDrift => 0,
            DriftPolicy::SkipToPreservePacing => {
                report.skipped_slots += missed;
                missed
            }
        }
    }

    /// Current report.
    #[must_use]
    pub const fn report(&self) -> DriftReport {
        self.report
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_millis(50);

    #[test]
    fn test_on_time_ticks_are_not_late() {
        let mut tracker = DriftTracker::new(DriftPolicy::AcceptDrift, BUDGET);
        for _ in 0..10 {
            assert_eq!(tracker.record_tick(Duration::from_millis(3), Duration::from_millis(2)), 0);
        }
        let report = tracker.report();
        assert_eq!(report.ticks, 10);
        assert_eq!(report.late_ticks, 0);
        assert_eq!(report.overruns, 0);
    }

    #[test]
    fn test_sub_slot_lateness_is_reported() {
        let mut tracker = DriftTracker::new(DriftPolicy::AcceptDrift, BUDGET);
        for lateness in [10, 30, 20] {
            tracker.record_tick(Duration::from_millis(lateness), Duration::from_millis(1));
        }
        let report = tracker.report();
        assert_eq!(report.late_ticks, 0);
        assert_eq!(report.max_lateness_us, 30_000);
        assert_eq!(report.total_lateness_us, 60_000);
        assert_eq!(report.mean_lateness_us(), 20_000);
    }

    #[test]
    fn test_accept_drift_records_without_skipping() {
        let mut tracker = DriftTracker::new(DriftPolicy::AcceptDrift, BUDGET);
        assert_eq!(tracker.record_tick(Duration::from_millis(120), Duration::from_millis(60)), 0);
        let report = tracker.report();
        assert_eq!(report.late_ticks, 1);
        assert_eq!(report.overruns, 1);
        assert_eq!(report.skipped_slots, 0);
        assert_eq!(report.max_lateness_us, 120_000);
    }

    #[test]
    fn test_skip_policy_reports_missed_slots() {
        let mut tracker = DriftTracker::new(DriftPolicy::SkipToPreservePacing, BUDGET);
        assert_eq!(tracker.record_tick(Duration::from_millis(120), Duration::from_millis(1)), 2);
        assert_eq!(tracker.report().skipped_slots, 2);
        assert_eq!(tracker.report().mean_lateness_us(), 120_000);
    }
}
