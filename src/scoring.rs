//! Vitality scoring engine
//!
//! Scores each pillar from raw metrics against the age-banded benchmark
//! table, combines valid pillars into a composite, and derives the progress
//! score from the age × risk matrix.
//!
//! A pillar is valid only when at least one of its required submetrics is
//! present (see [`Pillar::required_any`]). Missing submetrics never count as
//! zero: they are left out of the pillar's denominator. The composite needs at
//! least [`MIN_PILLARS_FOR_COMPOSITE`] valid pillars.

use crate::benchmarks::{BenchmarkTable, ProgressMatrix};
use crate::explain::{explain, ScoreBreakdown};
use crate::normalizer::Normalizer;
use crate::types::{
    AgeGroup, Pillar, PillarScore, RawMetrics, RiskBand, SubmetricBreakdown, SubmetricStatus,
    VitalitySnapshot,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum number of valid pillars for a composite score
pub const MIN_PILLARS_FOR_COMPOSITE: usize = 2;

/// Scoring engine over a benchmark table and progress matrix
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    table: Arc<BenchmarkTable>,
    progress: Arc<ProgressMatrix>,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(BenchmarkTable::shared(), ProgressMatrix::shared())
    }
}

impl ScoringEngine {
    pub fn new(table: Arc<BenchmarkTable>, progress: Arc<ProgressMatrix>) -> Self {
        Self { table, progress }
    }

    pub fn table(&self) -> &BenchmarkTable {
        &self.table
    }

    pub fn progress_matrix(&self) -> &ProgressMatrix {
        &self.progress
    }

    /// Score one pillar. Invalid pillars come back with `is_valid = false`
    /// and a zero score.
    pub fn score_pillar(&self, pillar: Pillar, raw: &RawMetrics) -> PillarScore {
        let group = AgeGroup::from_age(raw.age);
        let mut submetrics: Vec<SubmetricBreakdown> = Vec::with_capacity(4);

        for &submetric in pillar.submetrics() {
            let Some(benchmark) = self.table.lookup(submetric, group, raw.hrv_type()) else {
                warn!(
                    submetric = submetric.id(),
                    age_group = group.as_str(),
                    "no benchmark row; treating submetric as missing"
                );
                submetrics.push(SubmetricBreakdown {
                    submetric,
                    label: submetric.label().to_string(),
                    value: None,
                    points: 0,
                    max_points: 0,
                    status: SubmetricStatus::Missing,
                });
                continue;
            };

            let entry = match raw.value(submetric) {
                Some(value) => Normalizer::score(value, benchmark),
                None => Normalizer::missing(benchmark),
            };
            submetrics.push(entry);
        }

        let is_valid = pillar.required_any().iter().any(|required| {
            submetrics
                .iter()
                .any(|s| s.submetric == *required && s.is_present())
        });

        let (points, possible_points) = submetrics
            .iter()
            .filter(|s| s.is_present())
            .fold((0u32, 0u32), |(p, m), s| (p + s.points, m + s.max_points));

        let score = if is_valid && possible_points > 0 {
            (f64::from(points) / f64::from(possible_points) * 100.0)
                .round()
                .clamp(0.0, 100.0) as u8
        } else {
            0
        };

        PillarScore {
            pillar,
            score,
            points,
            possible_points,
            submetrics,
            is_valid,
        }
    }

    /// Score every pillar, valid or not, in display order
    pub fn score_pillars(&self, raw: &RawMetrics) -> Vec<PillarScore> {
        Pillar::ALL
            .iter()
            .map(|pillar| self.score_pillar(*pillar, raw))
            .collect()
    }

    /// Build a snapshot without a progress score
    pub fn score(&self, raw: &RawMetrics) -> VitalitySnapshot {
        self.score_with_risk(raw, None)
    }

    /// Build a snapshot; the progress score needs a risk band and a composite
    pub fn score_with_risk(&self, raw: &RawMetrics, risk: Option<RiskBand>) -> VitalitySnapshot {
        let pillars = self.score_pillars(raw);
        self.snapshot_from(raw, &pillars, risk)
    }

    /// Score when at least two pillars are valid, with the explanation.
    ///
    /// `None` means "not enough data yet", not a failure.
    pub fn score_if_possible(&self, raw: &RawMetrics) -> Option<(VitalitySnapshot, ScoreBreakdown)> {
        self.score_if_possible_with_risk(raw, None)
    }

    pub fn score_if_possible_with_risk(
        &self,
        raw: &RawMetrics,
        risk: Option<RiskBand>,
    ) -> Option<(VitalitySnapshot, ScoreBreakdown)> {
        let pillars = self.score_pillars(raw);
        let snapshot = self.snapshot_from(raw, &pillars, risk);
        if snapshot.total_score.is_none() {
            debug!(
                pillars_used = snapshot.pillars_used,
                "insufficient data for a vitality score"
            );
            return None;
        }
        let breakdown = explain(&pillars);
        Some((snapshot, breakdown))
    }

    /// Personalized optimal composite for an age and risk band
    pub fn optimal_target(&self, age: u32, risk: RiskBand) -> Option<u8> {
        self.progress.optimal_target(AgeGroup::from_age(age), risk)
    }

    fn snapshot_from(
        &self,
        raw: &RawMetrics,
        pillars: &[PillarScore],
        risk: Option<RiskBand>,
    ) -> VitalitySnapshot {
        let age_group = AgeGroup::from_age(raw.age);
        let valid: Vec<PillarScore> = pillars.iter().filter(|p| p.is_valid).cloned().collect();

        let total_score = if valid.len() >= MIN_PILLARS_FOR_COMPOSITE {
            let sum: u32 = valid.iter().map(|p| u32::from(p.score)).sum();
            Some((f64::from(sum) / valid.len() as f64).round() as u8)
        } else {
            None
        };

        let progress_score = match (total_score, risk) {
            (Some(total), Some(risk)) => self.progress.progress(total, age_group, risk),
            _ => None,
        };

        VitalitySnapshot {
            age: raw.age,
            age_group,
            total_score,
            progress_score,
            pillars_used: valid.len() as u8,
            pillars_possible: Pillar::ALL.len() as u8,
            pillar_scores: valid,
        }
    }
}

/// Progress value for display.
///
/// `Estimated` is the `current / optimal` fallback used when no true progress
/// score exists. It is for display only and has no persistable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressDisplay {
    Computed(u8),
    Estimated(u8),
    Unavailable,
}

impl ProgressDisplay {
    pub fn resolve(progress: Option<u8>, current: Option<u8>, optimal: Option<u8>) -> Self {
        if let Some(progress) = progress {
            return ProgressDisplay::Computed(progress.min(100));
        }
        match (current, optimal) {
            (Some(current), Some(optimal)) if optimal > 0 => {
                let ratio = f64::from(current) / f64::from(optimal) * 100.0;
                ProgressDisplay::Estimated(ratio.round().clamp(0.0, 100.0) as u8)
            }
            _ => ProgressDisplay::Unavailable,
        }
    }

    /// Value to render
    pub fn display_value(&self) -> Option<u8> {
        match self {
            ProgressDisplay::Computed(v) | ProgressDisplay::Estimated(v) => Some(*v),
            ProgressDisplay::Unavailable => None,
        }
    }

    /// Value that may be stored as a progress score
    pub fn persistable(&self) -> Option<u8> {
        match self {
            ProgressDisplay::Computed(v) => Some(*v),
            ProgressDisplay::Estimated(_) | ProgressDisplay::Unavailable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HrvReading, HrvType, Submetric};
    use pretty_assertions::assert_eq;

    fn complete_adult() -> RawMetrics {
        RawMetrics {
            age: 34,
            sleep_duration_hours: Some(8.0),
            restorative_sleep_percent: Some(47.5),
            sleep_efficiency_percent: Some(92.0),
            awake_percent: Some(5.0),
            movement_minutes: Some(45.0),
            steps: Some(10_500),
            active_calories: Some(520.0),
            hrv: Some(HrvReading {
                ms: 62.0,
                kind: HrvType::Sdnn,
            }),
            resting_heart_rate: Some(58.0),
            breathing_rate: Some(14.0),
        }
    }

    #[test]
    fn test_all_missing_returns_none() {
        let engine = ScoringEngine::default();
        assert!(engine.score_if_possible(&RawMetrics::new(40)).is_none());
        let snapshot = engine.score(&RawMetrics::new(40));
        assert_eq!(snapshot.pillars_used, 0);
        assert_eq!(snapshot.total_score, None);
        assert!(snapshot.pillar_scores.is_empty());
    }

    #[test]
    fn test_complete_optimal_day() {
        let engine = ScoringEngine::default();
        let (snapshot, breakdown) = engine.score_if_possible(&complete_adult()).unwrap();

        assert_eq!(snapshot.total_score, Some(100));
        assert_eq!(snapshot.pillars_used, 3);
        assert_eq!(snapshot.pillars_possible, 3);
        for pillar in &snapshot.pillar_scores {
            assert_eq!(pillar.score, 100);
            assert!(pillar
                .submetrics
                .iter()
                .all(|s| s.status == SubmetricStatus::Optimal && s.points == s.max_points));
        }
        assert!(breakdown.overall_limiting_factor.is_none());
    }

    #[test]
    fn test_single_pillar_never_composite() {
        let engine = ScoringEngine::default();
        let raw = RawMetrics {
            sleep_duration_hours: Some(8.0),
            restorative_sleep_percent: Some(45.0),
            sleep_efficiency_percent: Some(95.0),
            awake_percent: Some(3.0),
            ..RawMetrics::new(30)
        };
        let snapshot = engine.score(&raw);
        assert_eq!(snapshot.pillars_used, 1);
        assert_eq!(snapshot.pillar(Pillar::Sleep).unwrap().score, 100);
        assert_eq!(snapshot.total_score, None);
        assert!(engine.score_if_possible(&raw).is_none());
    }

    #[test]
    fn test_missing_submetrics_shrink_denominator() {
        let engine = ScoringEngine::default();
        let raw = RawMetrics {
            steps: Some(12_000),
            ..RawMetrics::new(30)
        };
        let movement = engine.score_pillar(Pillar::Movement, &raw);
        assert!(movement.is_valid);
        assert_eq!(movement.points, 40);
        assert_eq!(movement.possible_points, 40);
        assert_eq!(movement.score, 100);
        let missing: Vec<_> = movement
            .submetrics
            .iter()
            .filter(|s| s.status == SubmetricStatus::Missing)
            .map(|s| s.submetric)
            .collect();
        assert_eq!(
            missing,
            vec![Submetric::MovementMinutes, Submetric::ActiveCalories]
        );
    }

    #[test]
    fn test_pillar_invalid_without_required_submetric() {
        let engine = ScoringEngine::default();
        // Efficiency alone does not make a sleep pillar
        let raw = RawMetrics {
            sleep_efficiency_percent: Some(90.0),
            active_calories: Some(500.0),
            breathing_rate: Some(14.0),
            ..RawMetrics::new(30)
        };
        for pillar in engine.score_pillars(&raw) {
            assert!(!pillar.is_valid, "{:?} should be invalid", pillar.pillar);
            assert_eq!(pillar.score, 0);
        }
        assert!(engine.score_if_possible(&raw).is_none());
    }

    #[test]
    fn test_stress_valid_with_resting_hr_only() {
        let engine = ScoringEngine::default();
        let raw = RawMetrics {
            resting_heart_rate: Some(60.0),
            movement_minutes: Some(40.0),
            ..RawMetrics::new(30)
        };
        let (snapshot, _) = engine.score_if_possible(&raw).unwrap();
        assert_eq!(snapshot.pillars_used, 2);
        assert!(snapshot.pillar(Pillar::Sleep).is_none());
        assert_eq!(snapshot.total_score, Some(100));
    }

    #[test]
    fn test_partial_scores_average() {
        let engine = ScoringEngine::default();
        let raw = RawMetrics {
            // 6.5h -> 30/35
            sleep_duration_hours: Some(6.5),
            steps: Some(9_000),
            ..RawMetrics::new(30)
        };
        let snapshot = engine.score(&raw);
        // sleep 30/35 = 85.7 -> 86, movement 100
        assert_eq!(snapshot.pillar(Pillar::Sleep).unwrap().score, 86);
        assert_eq!(snapshot.total_score, Some(93));
    }

    #[test]
    fn test_hrv_benchmark_follows_reading_type() {
        let engine = ScoringEngine::default();
        // 45 ms is optimal RMSSD for an adult but below the SDNN range
        let mut raw = RawMetrics::new(30);
        raw.hrv = Some(HrvReading {
            ms: 45.0,
            kind: HrvType::Rmssd,
        });
        let rmssd = engine.score_pillar(Pillar::Stress, &raw);
        assert_eq!(rmssd.submetrics[0].status, SubmetricStatus::Optimal);

        raw.hrv = Some(HrvReading {
            ms: 45.0,
            kind: HrvType::Sdnn,
        });
        let sdnn = engine.score_pillar(Pillar::Stress, &raw);
        assert_ne!(sdnn.submetrics[0].status, SubmetricStatus::Optimal);
    }

    #[test]
    fn test_progress_score_requires_risk() {
        let engine = ScoringEngine::default();
        let mut raw = complete_adult();
        raw.sleep_duration_hours = Some(5.0);
        let without = engine.score(&raw);
        assert_eq!(without.progress_score, None);

        let with = engine.score_with_risk(&raw, Some(RiskBand::Moderate));
        let total = with.total_score.unwrap();
        let expected = engine
            .progress_matrix()
            .progress(total, AgeGroup::Adult, RiskBand::Moderate);
        assert_eq!(with.progress_score, expected);
        assert!(with.progress_score.unwrap() <= 100);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let engine = ScoringEngine::default();
        let mut raw = complete_adult();
        raw.steps = Some(3_200);
        raw.resting_heart_rate = Some(77.0);
        let first = engine.score_if_possible(&raw).unwrap();
        let second = engine.score_if_possible(&raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.1).unwrap(),
            serde_json::to_string(&second.1).unwrap()
        );
    }

    #[test]
    fn test_progress_display_fallback_is_not_persistable() {
        let computed = ProgressDisplay::resolve(Some(64), Some(70), Some(88));
        assert_eq!(computed, ProgressDisplay::Computed(64));
        assert_eq!(computed.persistable(), Some(64));

        let estimated = ProgressDisplay::resolve(None, Some(66), Some(88));
        assert_eq!(estimated, ProgressDisplay::Estimated(75));
        assert_eq!(estimated.display_value(), Some(75));
        assert_eq!(estimated.persistable(), None);

        assert_eq!(
            ProgressDisplay::resolve(None, Some(66), Some(0)),
            ProgressDisplay::Unavailable
        );
    }
}
