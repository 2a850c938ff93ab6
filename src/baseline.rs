//! Rolling pillar baselines
//!
//! Holds a member's dated pillar values over a rolling window and derives
//! the baseline-vs-recent comparison the trend engine classifies. Values are
//! kept in date order; the window drops the oldest days first.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default trend window in days
pub const DEFAULT_BASELINE_WINDOW: usize = 21;

/// Baseline and recent means of one series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineSplit {
    /// Mean of the earlier sub-window
    pub baseline: f64,
    /// Mean of the latest sub-window
    pub recent: f64,
    pub baseline_days: usize,
    pub recent_days: usize,
}

impl BaselineSplit {
    /// `(recent - baseline) / baseline`, `None` for a non-positive baseline
    pub fn deviation(&self) -> Option<f64> {
        calculate_deviation(self.recent, self.baseline)
    }
}

/// Rolling dated series of one pillar for one member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PillarHistory {
    values: VecDeque<(NaiveDate, f64)>,
    window_size: usize,
}

impl Default for PillarHistory {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_WINDOW)
    }
}

impl PillarHistory {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Add a day. A repeated date replaces the stored value.
    pub fn push(&mut self, date: NaiveDate, value: f64) {
        match self.values.binary_search_by(|(d, _)| d.cmp(&date)) {
            Ok(index) => self.values[index].1 = value,
            Err(index) => self.values.insert(index, (date, value)),
        }
        while self.values.len() > self.window_size {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Most recent value
    pub fn latest(&self) -> Option<f64> {
        self.values.back().map(|(_, v)| *v)
    }

    /// Split into baseline and recent means.
    ///
    /// The recent sub-window is the last `clamp(n / 3, min_recent, max_recent)`
    /// days; everything before it is the baseline. Needs at least one
    /// baseline day.
    pub fn split(&self, min_recent: usize, max_recent: usize) -> Option<BaselineSplit> {
        let n = self.values.len();
        let recent_days = (n / 3).clamp(min_recent, max_recent.max(min_recent));
        if n <= recent_days {
            return None;
        }
        let baseline_days = n - recent_days;
        let baseline = rolling_average(self.values.iter().take(baseline_days).map(|(_, v)| *v))?;
        let recent = rolling_average(self.values.iter().skip(baseline_days).map(|(_, v)| *v))?;
        Some(BaselineSplit {
            baseline,
            recent,
            baseline_days,
            recent_days,
        })
    }

    /// Longest run of consecutive calendar days with a value below `threshold`
    /// among the last `last_days` stored days. A day without data ends the run.
    pub fn longest_streak_below(&self, threshold: f64, last_days: usize) -> u32 {
        let mut longest = 0u32;
        let mut current = 0u32;
        let mut previous: Option<NaiveDate> = None;

        let skip = self.values.len().saturating_sub(last_days);
        for (date, value) in self.values.iter().skip(skip) {
            let contiguous = previous.and_then(|p| p.succ_opt()) == Some(*date);
            if *value < threshold {
                current = if contiguous { current + 1 } else { 1 };
                longest = longest.max(current);
            } else {
                current = 0;
            }
            previous = Some(*date);
        }
        longest
    }
}

/// Relative deviation from a baseline
pub fn calculate_deviation(current: f64, baseline: f64) -> Option<f64> {
    if baseline > 0.0 {
        Some((current - baseline) / baseline)
    } else {
        None
    }
}

/// Mean of a sequence, `None` when empty
pub fn rolling_average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + chrono::Duration::days(offset)
    }

    fn history(values: &[f64]) -> PillarHistory {
        let mut h = PillarHistory::default();
        for (i, v) in values.iter().enumerate() {
            h.push(day(i as i64), *v);
        }
        h
    }

    #[test]
    fn test_split_uses_clamped_recent_window() {
        // 7 days -> 7/3 = 2, clamped up to 3 recent days
        let h = history(&[80.0, 80.0, 80.0, 80.0, 60.0, 60.0, 60.0]);
        let split = h.split(3, 7).unwrap();
        assert_eq!(split.recent_days, 3);
        assert_eq!(split.baseline_days, 4);
        assert_eq!(split.baseline, 80.0);
        assert_eq!(split.recent, 60.0);
        assert!((split.deviation().unwrap() + 0.25).abs() < 1e-9);

        // 21 days -> 7 recent days
        let h = history(&[70.0; 21]);
        assert_eq!(h.split(3, 7).unwrap().recent_days, 7);
    }

    #[test]
    fn test_split_needs_a_baseline_day() {
        assert!(history(&[70.0, 71.0, 72.0]).split(3, 7).is_none());
        assert!(PillarHistory::default().split(3, 7).is_none());
    }

    #[test]
    fn test_zero_baseline_has_no_deviation() {
        assert_eq!(calculate_deviation(50.0, 0.0), None);
        let h = history(&[0.0, 0.0, 0.0, 0.0, 50.0, 50.0, 50.0]);
        assert_eq!(h.split(3, 7).unwrap().deviation(), None);
    }

    #[test]
    fn test_window_drops_oldest_and_replaces_duplicates() {
        let mut h = PillarHistory::new(3);
        h.push(day(0), 1.0);
        h.push(day(2), 3.0);
        h.push(day(1), 2.0);
        h.push(day(3), 4.0);
        assert_eq!(h.len(), 3);
        h.push(day(3), 9.0);
        assert_eq!(h.len(), 3);
        assert_eq!(h.latest(), Some(9.0));
    }

    #[test]
    fn test_streak_below_threshold() {
        let h = history(&[65.0, 60.0, 72.0, 50.0, 55.0, 61.0, 69.0, 80.0]);
        assert_eq!(h.longest_streak_below(70.0, h.len()), 4);
    }

    #[test]
    fn test_streak_only_counts_trailing_days() {
        let h = history(&[60.0, 60.0, 60.0, 60.0, 60.0, 95.0, 68.0, 68.0]);
        assert_eq!(h.longest_streak_below(70.0, h.len()), 5);
        assert_eq!(h.longest_streak_below(70.0, 3), 2);
        assert_eq!(h.longest_streak_below(70.0, 0), 0);
    }

    #[test]
    fn test_gap_breaks_streak() {
        let mut h = PillarHistory::default();
        h.push(day(0), 60.0);
        h.push(day(1), 60.0);
        h.push(day(3), 60.0);
        assert_eq!(h.longest_streak_below(70.0, h.len()), 2);
    }
}
