//! Feature derivation
//!
//! Pure conversions shared by every provider adapter:
//! - Sleep duration in hours
//! - Restorative sleep, sleep efficiency and awake percentages
//!
//! Each function returns `None` whenever an input it needs is absent or the
//! denominator is not positive. Nothing here ever substitutes zero for a
//! missing measurement.

pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Convert seconds to hours
pub fn seconds_to_hours(seconds: Option<f64>) -> Option<f64> {
    seconds.map(|s| s / SECONDS_PER_HOUR)
}

/// Restorative sleep: (REM + deep) / total sleep * 100
pub fn restorative_sleep_percent(
    rem_seconds: Option<f64>,
    deep_seconds: Option<f64>,
    total_seconds: Option<f64>,
) -> Option<f64> {
    match (rem_seconds, deep_seconds, total_seconds) {
        (Some(rem), Some(deep), Some(total)) if total > 0.0 => Some((rem + deep) / total * 100.0),
        _ => None,
    }
}

/// Sleep efficiency: the provider score when present, else duration / time in bed * 100
pub fn sleep_efficiency_percent(
    provider_score: Option<f64>,
    duration_seconds: Option<f64>,
    time_in_bed_seconds: Option<f64>,
) -> Option<f64> {
    if provider_score.is_some() {
        return provider_score;
    }
    match (duration_seconds, time_in_bed_seconds) {
        (Some(duration), Some(in_bed)) if in_bed > 0.0 => Some(duration / in_bed * 100.0),
        _ => None,
    }
}

/// Awake share of the sleep period.
///
/// The denominator is time in bed when known, otherwise sleep duration.
pub fn awake_percent(
    awake_seconds: Option<f64>,
    time_in_bed_seconds: Option<f64>,
    duration_seconds: Option<f64>,
) -> Option<f64> {
    let awake = awake_seconds?;
    let denominator = time_in_bed_seconds.or(duration_seconds)?;
    if denominator <= 0.0 {
        return None;
    }
    Some(awake / denominator * 100.0)
}
