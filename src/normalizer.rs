//! Submetric normalization
//!
//! Converts a raw submetric value into awarded points against its benchmark:
//! - Inside the optimal range: full points
//! - Outside: the benchmark's falloff curve, never below its floor

use crate::benchmarks::{Side, SubmetricBenchmark, OK_FRACTION};
use crate::types::{SubmetricBreakdown, SubmetricStatus};

/// Normalizer for scoring individual submetrics
pub struct Normalizer;

impl Normalizer {
    /// Score a present value
    pub fn score(value: f64, benchmark: &SubmetricBenchmark) -> SubmetricBreakdown {
        let (points, status) = if benchmark.contains(value) {
            (benchmark.max_points, SubmetricStatus::Optimal)
        } else {
            let (distance, side) = if value < benchmark.optimal_min {
                (benchmark.optimal_min - value, Side::Below)
            } else {
                (value - benchmark.optimal_max, Side::Above)
            };
            let fraction = benchmark.curve.fraction(distance, side);
            let points = (f64::from(benchmark.max_points) * fraction).round() as u32;
            let status = if fraction >= OK_FRACTION {
                SubmetricStatus::Ok
            } else {
                SubmetricStatus::Low
            };
            (points.min(benchmark.max_points), status)
        };

        SubmetricBreakdown {
            submetric: benchmark.submetric,
            label: benchmark.submetric.label().to_string(),
            value: Some(value),
            points,
            max_points: benchmark.max_points,
            status,
        }
    }

    /// Breakdown entry for an absent value
    pub fn missing(benchmark: &SubmetricBenchmark) -> SubmetricBreakdown {
        SubmetricBreakdown {
            submetric: benchmark.submetric,
            label: benchmark.submetric.label().to_string(),
            value: None,
            points: 0,
            max_points: benchmark.max_points,
            status: SubmetricStatus::Missing,
        }
    }
}
