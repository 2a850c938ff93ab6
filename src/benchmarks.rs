//! Benchmark schema
//!
//! Age-banded optimal ranges, point weights and falloff curves per submetric,
//! plus the age × risk progress matrix. The built-in tables are process-wide
//! immutable statics; custom tables can be loaded from JSON and are validated
//! before use.

use crate::error::VitalityError;
use crate::types::{AgeGroup, HrvType, RiskBand, Submetric};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

/// Fraction at or above which an out-of-range value is still reported as `ok`
pub const OK_FRACTION: f64 = 0.75;

static DEFAULT_TABLE: LazyLock<Arc<BenchmarkTable>> =
    LazyLock::new(|| Arc::new(BenchmarkTable::builtin()));

static DEFAULT_MATRIX: LazyLock<Arc<ProgressMatrix>> =
    LazyLock::new(|| Arc::new(ProgressMatrix::builtin()));

/// Which side of the optimal range a value falls on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Below,
    Above,
}

/// Point falloff outside the optimal range.
///
/// Maps the distance from the nearest boundary to a fraction of the
/// submetric's maximum points. Both shapes are non-increasing in distance and
/// never drop below their floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum FalloffCurve {
    /// Straight line from 1.0 at the boundary to `floor` at `span` away
    Linear {
        span_below: f64,
        span_above: f64,
        floor: f64,
    },
    /// `span` split into equal bands, one fraction per band; the last tier
    /// applies beyond the span
    Stepped {
        span_below: f64,
        span_above: f64,
        tiers: Vec<f64>,
    },
}

impl FalloffCurve {
    /// Fraction of max points for a value `distance` outside the range
    pub fn fraction(&self, distance: f64, side: Side) -> f64 {
        let distance = distance.max(0.0);
        match self {
            FalloffCurve::Linear {
                span_below,
                span_above,
                floor,
            } => {
                let span = pick(side, *span_below, *span_above);
                if span <= 0.0 {
                    return *floor;
                }
                (1.0 - (distance / span) * (1.0 - floor)).max(*floor)
            }
            FalloffCurve::Stepped {
                span_below,
                span_above,
                tiers,
            } => {
                let Some(last) = tiers.last() else {
                    return 0.0;
                };
                let span = pick(side, *span_below, *span_above);
                if span <= 0.0 {
                    return *last;
                }
                let band = ((distance / span) * tiers.len() as f64).floor() as usize;
                tiers.get(band).copied().unwrap_or(*last)
            }
        }
    }

    /// Lowest fraction this curve can produce
    pub fn floor(&self) -> f64 {
        match self {
            FalloffCurve::Linear { floor, .. } => *floor,
            FalloffCurve::Stepped { tiers, .. } => tiers.last().copied().unwrap_or(0.0),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            FalloffCurve::Linear {
                span_below,
                span_above,
                floor,
            } => {
                if *span_below < 0.0 || *span_above < 0.0 {
                    return Err("negative span".to_string());
                }
                if !(0.0..=1.0).contains(floor) {
                    return Err(format!("floor {} outside 0-1", floor));
                }
            }
            FalloffCurve::Stepped {
                span_below,
                span_above,
                tiers,
            } => {
                if *span_below < 0.0 || *span_above < 0.0 {
                    return Err("negative span".to_string());
                }
                if tiers.is_empty() {
                    return Err("stepped curve without tiers".to_string());
                }
                if tiers.iter().any(|t| !(0.0..=1.0).contains(t)) {
                    return Err("tier outside 0-1".to_string());
                }
                if tiers.windows(2).any(|w| w[1] > w[0]) {
                    return Err("tiers must be non-increasing".to_string());
                }
            }
        }
        Ok(())
    }
}

fn pick(side: Side, below: f64, above: f64) -> f64 {
    match side {
        Side::Below => below,
        Side::Above => above,
    }
}

/// Optimal range and scoring rule for one submetric in one age group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmetricBenchmark {
    pub submetric: Submetric,
    pub age_group: AgeGroup,
    /// Only set for HRV rows; SDNN and RMSSD have separate norms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_type: Option<HrvType>,
    pub optimal_min: f64,
    pub optimal_max: f64,
    pub max_points: u32,
    pub curve: FalloffCurve,
}

impl SubmetricBenchmark {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.optimal_min && value <= self.optimal_max
    }
}

/// Complete benchmark table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkTable {
    pub benchmarks: Vec<SubmetricBenchmark>,
}

impl BenchmarkTable {
    /// Shared built-in table
    pub fn shared() -> Arc<BenchmarkTable> {
        Arc::clone(&DEFAULT_TABLE)
    }

    /// Find the benchmark for a submetric and age group.
    ///
    /// HRV rows are matched on `hrv_type`; other rows ignore it.
    pub fn lookup(
        &self,
        submetric: Submetric,
        age_group: AgeGroup,
        hrv_type: Option<HrvType>,
    ) -> Option<&SubmetricBenchmark> {
        self.benchmarks.iter().find(|b| {
            b.submetric == submetric
                && b.age_group == age_group
                && (submetric != Submetric::Hrv || b.hrv_type == hrv_type)
        })
    }

    /// Load and validate a table from JSON
    pub fn from_json(json: &str) -> Result<Self, VitalityError> {
        let table: BenchmarkTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check that every (submetric, age group) pair has a sane row
    pub fn validate(&self) -> Result<(), VitalityError> {
        for benchmark in &self.benchmarks {
            let key = format!(
                "{}/{}",
                benchmark.submetric.id(),
                benchmark.age_group.as_str()
            );
            if !(benchmark.optimal_min <= benchmark.optimal_max) {
                return Err(VitalityError::InvalidBenchmark(format!(
                    "{}: optimal_min exceeds optimal_max",
                    key
                )));
            }
            if benchmark.max_points == 0 {
                return Err(VitalityError::InvalidBenchmark(format!(
                    "{}: max_points must be positive",
                    key
                )));
            }
            benchmark
                .curve
                .validate()
                .map_err(|e| VitalityError::InvalidBenchmark(format!("{}: {}", key, e)))?;
        }

        for group in AgeGroup::ALL {
            for submetric in Submetric::ALL {
                let variants: &[Option<HrvType>] = if submetric == Submetric::Hrv {
                    &[Some(HrvType::Sdnn), Some(HrvType::Rmssd)]
                } else {
                    &[None]
                };
                for variant in variants {
                    if self.lookup(submetric, group, *variant).is_none() {
                        return Err(VitalityError::InvalidBenchmark(format!(
                            "missing row for {}/{}",
                            submetric.id(),
                            group.as_str()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Built-in reference table
    pub fn builtin() -> Self {
        let mut benchmarks = Vec::new();
        for group in AgeGroup::ALL {
            for submetric in Submetric::ALL {
                if submetric == Submetric::Hrv {
                    for kind in [HrvType::Sdnn, HrvType::Rmssd] {
                        benchmarks.push(builtin_row(submetric, group, Some(kind)));
                    }
                } else {
                    benchmarks.push(builtin_row(submetric, group, None));
                }
            }
        }
        Self { benchmarks }
    }
}

fn linear(span_below: f64, span_above: f64, floor: f64) -> FalloffCurve {
    FalloffCurve::Linear {
        span_below,
        span_above,
        floor,
    }
}

fn stepped(span_below: f64, span_above: f64, tiers: &[f64]) -> FalloffCurve {
    FalloffCurve::Stepped {
        span_below,
        span_above,
        tiers: tiers.to_vec(),
    }
}

fn builtin_row(
    submetric: Submetric,
    group: AgeGroup,
    hrv_type: Option<HrvType>,
) -> SubmetricBenchmark {
    use AgeGroup::*;

    // (optimal_min, optimal_max) per age group
    let (min, max) = match (submetric, group) {
        (Submetric::SleepDuration, Child) => (9.0, 12.0),
        (Submetric::SleepDuration, Teen) => (8.0, 10.0),
        (Submetric::SleepDuration, Adult | MiddleAge) => (7.0, 9.0),
        (Submetric::SleepDuration, Senior) => (7.0, 8.0),

        (Submetric::RestorativeSleep, Child | Teen) => (40.0, 55.0),
        (Submetric::RestorativeSleep, Adult) => (35.0, 50.0),
        (Submetric::RestorativeSleep, MiddleAge) => (30.0, 45.0),
        (Submetric::RestorativeSleep, Senior) => (25.0, 40.0),

        (Submetric::SleepEfficiency, Senior) => (80.0, 100.0),
        (Submetric::SleepEfficiency, _) => (85.0, 100.0),

        (Submetric::AwakePercent, Child) => (0.0, 8.0),
        (Submetric::AwakePercent, Senior) => (0.0, 15.0),
        (Submetric::AwakePercent, _) => (0.0, 10.0),

        (Submetric::Steps, Child) => (10_000.0, 30_000.0),
        (Submetric::Steps, Teen) => (9_000.0, 30_000.0),
        (Submetric::Steps, Adult) => (8_000.0, 30_000.0),
        (Submetric::Steps, MiddleAge) => (7_000.0, 30_000.0),
        (Submetric::Steps, Senior) => (6_000.0, 30_000.0),

        (Submetric::MovementMinutes, Child | Teen) => (60.0, 240.0),
        (Submetric::MovementMinutes, Adult | MiddleAge) => (30.0, 180.0),
        (Submetric::MovementMinutes, Senior) => (20.0, 150.0),

        (Submetric::ActiveCalories, Child) => (300.0, 900.0),
        (Submetric::ActiveCalories, Teen | Adult) => (350.0, 1_000.0),
        (Submetric::ActiveCalories, MiddleAge) => (300.0, 900.0),
        (Submetric::ActiveCalories, Senior) => (200.0, 700.0),

        (Submetric::Hrv, group) => match (hrv_type, group) {
            (Some(HrvType::Rmssd), Child | Teen) => (45.0, 150.0),
            (Some(HrvType::Rmssd), Adult) => (40.0, 130.0),
            (Some(HrvType::Rmssd), MiddleAge) => (30.0, 110.0),
            (Some(HrvType::Rmssd), Senior) => (20.0, 90.0),
            (_, Child | Teen) => (55.0, 160.0),
            (_, Adult) => (50.0, 150.0),
            (_, MiddleAge) => (40.0, 130.0),
            (_, Senior) => (30.0, 110.0),
        },

        (Submetric::RestingHeartRate, Child) => (60.0, 95.0),
        (Submetric::RestingHeartRate, Teen) => (55.0, 85.0),
        (Submetric::RestingHeartRate, Adult) => (50.0, 70.0),
        (Submetric::RestingHeartRate, MiddleAge) => (50.0, 72.0),
        (Submetric::RestingHeartRate, Senior) => (50.0, 75.0),

        (Submetric::BreathingRate, Child) => (16.0, 24.0),
        (Submetric::BreathingRate, Senior) => (12.0, 22.0),
        (Submetric::BreathingRate, _) => (12.0, 20.0),
    };

    let (max_points, curve) = match submetric {
        Submetric::SleepDuration => (35, linear(3.0, 3.0, 0.1)),
        Submetric::RestorativeSleep => (25, linear(20.0, 25.0, 0.1)),
        Submetric::SleepEfficiency => (25, stepped(25.0, 1.0, &[0.8, 0.6, 0.4, 0.2, 0.1])),
        Submetric::AwakePercent => (15, linear(1.0, 20.0, 0.1)),
        Submetric::Steps => (40, linear(min, 20_000.0, 0.05)),
        Submetric::MovementMinutes => (35, linear(min, 120.0, 0.05)),
        Submetric::ActiveCalories => (25, linear(min, 800.0, 0.05)),
        Submetric::Hrv => (40, linear(min * 0.6, 100.0, 0.1)),
        Submetric::RestingHeartRate => (40, stepped(15.0, 25.0, &[0.85, 0.7, 0.5, 0.3, 0.15])),
        Submetric::BreathingRate => (20, linear(6.0, 6.0, 0.2)),
    };

    SubmetricBenchmark {
        submetric,
        age_group: group,
        hrv_type,
        optimal_min: min,
        optimal_max: max,
        max_points,
        curve,
    }
}

/// Starting point and target composite for one (age group, risk band) cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressCell {
    pub age_group: AgeGroup,
    pub risk: RiskBand,
    /// Composite at which progress is 0
    pub floor: f64,
    /// Composite at which progress is 100
    pub target: f64,
}

/// Age × risk progress matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMatrix {
    pub cells: Vec<ProgressCell>,
}

impl ProgressMatrix {
    pub fn shared() -> Arc<ProgressMatrix> {
        Arc::clone(&DEFAULT_MATRIX)
    }

    pub fn cell(&self, age_group: AgeGroup, risk: RiskBand) -> Option<&ProgressCell> {
        self.cells
            .iter()
            .find(|c| c.age_group == age_group && c.risk == risk)
    }

    /// Personalized optimal composite for display
    pub fn optimal_target(&self, age_group: AgeGroup, risk: RiskBand) -> Option<u8> {
        self.cell(age_group, risk)
            .map(|c| c.target.round().clamp(0.0, 100.0) as u8)
    }

    /// Progress 0-100 for a composite score
    pub fn progress(&self, total: u8, age_group: AgeGroup, risk: RiskBand) -> Option<u8> {
        let cell = self.cell(age_group, risk)?;
        let span = cell.target - cell.floor;
        if span <= 0.0 {
            return None;
        }
        let progress = (f64::from(total) - cell.floor) / span * 100.0;
        Some(progress.round().clamp(0.0, 100.0) as u8)
    }

    pub fn from_json(json: &str) -> Result<Self, VitalityError> {
        let matrix: ProgressMatrix = serde_json::from_str(json)?;
        for group in AgeGroup::ALL {
            for risk in RiskBand::ALL {
                let cell = matrix.cell(group, risk).ok_or_else(|| {
                    VitalityError::InvalidBenchmark(format!(
                        "missing progress cell for {}/{:?}",
                        group.as_str(),
                        risk
                    ))
                })?;
                if cell.target <= cell.floor {
                    return Err(VitalityError::InvalidBenchmark(format!(
                        "progress target must exceed floor for {}/{:?}",
                        group.as_str(),
                        risk
                    )));
                }
            }
        }
        Ok(matrix)
    }

    pub fn builtin() -> Self {
        let mut cells = Vec::new();
        for group in AgeGroup::ALL {
            let base_target: f64 = match group {
                AgeGroup::Child | AgeGroup::Teen => 90.0,
                AgeGroup::Adult => 88.0,
                AgeGroup::MiddleAge => 84.0,
                AgeGroup::Senior => 78.0,
            };
            for risk in RiskBand::ALL {
                let (target_offset, floor) = match risk {
                    RiskBand::Low => (0.0, 40.0),
                    RiskBand::Moderate => (4.0, 35.0),
                    RiskBand::High => (9.0, 30.0),
                    RiskBand::VeryHigh => (15.0, 25.0),
                };
                cells.push(ProgressCell {
                    age_group: group,
                    risk,
                    floor,
                    target: base_target - target_offset,
                });
            }
        }
        Self { cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_builtin_table_is_complete() {
        let table = BenchmarkTable::builtin();
        table.validate().unwrap();
        // 9 plain submetrics + 2 HRV variants per group
        assert_eq!(table.benchmarks.len(), AgeGroup::ALL.len() * 11);
    }

    #[test]
    fn test_hrv_rows_differ_by_type() {
        let table = BenchmarkTable::builtin();
        let sdnn = table
            .lookup(Submetric::Hrv, AgeGroup::Adult, Some(HrvType::Sdnn))
            .unwrap();
        let rmssd = table
            .lookup(Submetric::Hrv, AgeGroup::Adult, Some(HrvType::Rmssd))
            .unwrap();
        assert_ne!(sdnn.optimal_min, rmssd.optimal_min);
        assert!(table.lookup(Submetric::Hrv, AgeGroup::Adult, None).is_none());
    }

    #[test]
    fn test_linear_curve() {
        let curve = linear(10.0, 4.0, 0.2);
        assert!((curve.fraction(0.0, Side::Below) - 1.0).abs() < 1e-9);
        assert!((curve.fraction(5.0, Side::Below) - 0.6).abs() < 1e-9);
        assert!((curve.fraction(10.0, Side::Below) - 0.2).abs() < 1e-9);
        assert!((curve.fraction(50.0, Side::Below) - 0.2).abs() < 1e-9);
        assert!((curve.fraction(2.0, Side::Above) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_stepped_curve() {
        let curve = stepped(10.0, 10.0, &[0.8, 0.5, 0.2]);
        assert_eq!(curve.fraction(1.0, Side::Below), 0.8);
        assert_eq!(curve.fraction(4.0, Side::Below), 0.5);
        assert_eq!(curve.fraction(9.0, Side::Below), 0.2);
        assert_eq!(curve.fraction(100.0, Side::Above), 0.2);
        assert_eq!(curve.floor(), 0.2);
    }

    #[test]
    fn test_rejects_increasing_tiers() {
        let mut table = BenchmarkTable::builtin();
        table.benchmarks[0].curve = stepped(1.0, 1.0, &[0.2, 0.8]);
        assert!(matches!(
            table.validate(),
            Err(VitalityError::InvalidBenchmark(_))
        ));
    }

    #[test]
    fn test_rejects_missing_row() {
        let mut table = BenchmarkTable::builtin();
        table.benchmarks.retain(|b| {
            !(b.submetric == Submetric::Steps && b.age_group == AgeGroup::Senior)
        });
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("steps/senior"));
    }

    #[test]
    fn test_table_json_roundtrip_validates() {
        let json = BenchmarkTable::builtin().to_json().unwrap();
        let loaded = BenchmarkTable::from_json(&json).unwrap();
        assert_eq!(loaded, BenchmarkTable::builtin());
    }

    #[test]
    fn test_progress_matrix() {
        let matrix = ProgressMatrix::builtin();
        // Adult / low: floor 40, target 88
        assert_eq!(matrix.progress(88, AgeGroup::Adult, RiskBand::Low), Some(100));
        assert_eq!(matrix.progress(64, AgeGroup::Adult, RiskBand::Low), Some(50));
        assert_eq!(matrix.progress(20, AgeGroup::Adult, RiskBand::Low), Some(0));
        assert_eq!(matrix.progress(99, AgeGroup::Adult, RiskBand::Low), Some(100));
        assert_eq!(matrix.optimal_target(AgeGroup::Senior, RiskBand::VeryHigh), Some(63));
    }

    proptest! {
        #[test]
        fn prop_builtin_curves_are_monotonic(
            index in 0usize..55,
            a in 0.0f64..50_000.0,
            b in 0.0f64..50_000.0,
        ) {
            let table = BenchmarkTable::builtin();
            let curve = &table.benchmarks[index].curve;
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            for side in [Side::Below, Side::Above] {
                let f_near = curve.fraction(near, side);
                let f_far = curve.fraction(far, side);
                prop_assert!(f_far <= f_near + 1e-12);
                prop_assert!(f_far >= curve.floor() - 1e-12);
                prop_assert!(f_near <= 1.0);
            }
        }
    }
}
