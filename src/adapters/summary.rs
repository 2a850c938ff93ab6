//! Summary payload adapter
//!
//! Maps the aggregated day payload (a `sleep_summary` and a
//! `physical_summary` section) to canonical raw metrics.

use crate::error::VitalityError;
use crate::features::{
    awake_percent, restorative_sleep_percent, seconds_to_hours, sleep_efficiency_percent,
};
use crate::types::{DatedRawMetrics, RawMetrics};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use super::{choose_hrv, section, HrvCandidates, ProviderPayloadAdapter};

/// Summary payload adapter
pub struct SummaryAdapter;

impl SummaryAdapter {
    /// Map one day's payload to raw metrics.
    ///
    /// Fails only when the payload is not a JSON object.
    pub fn map_day(age: u32, raw_json: &str) -> Result<RawMetrics, VitalityError> {
        let value: Value = serde_json::from_str(raw_json)?;
        Self::map_value(age, &value)
    }

    /// Map an already decoded payload
    pub fn map_value(age: u32, payload: &Value) -> Result<RawMetrics, VitalityError> {
        if !payload.is_object() {
            return Err(VitalityError::ParseError(
                "summary payload must be a JSON object".to_string(),
            ));
        }

        let sleep = payload.get("sleep_summary").cloned().unwrap_or(Value::Null);
        let physical = payload
            .get("physical_summary")
            .cloned()
            .unwrap_or(Value::Null);

        let duration: SleepDuration = section(&sleep, "duration").unwrap_or_default();
        let scores: SleepScores = section(&sleep, "scores").unwrap_or_default();
        let sleep_hr: HeartRateBlock = section(&sleep, "heart_rate").unwrap_or_default();
        let breathing: Breathing = section(&sleep, "breathing").unwrap_or_default();

        let activity: Activity = section(&physical, "activity").unwrap_or_default();
        let calories: Calories = section(&physical, "calories").unwrap_or_default();
        let physical_hr: HeartRateBlock = section(&physical, "heart_rate").unwrap_or_default();

        let total = duration.sleep_duration_seconds;
        let in_bed = duration.time_in_bed_seconds;

        Ok(RawMetrics {
            age,
            sleep_duration_hours: seconds_to_hours(total),
            restorative_sleep_percent: restorative_sleep_percent(
                duration.rem_sleep_duration_seconds,
                duration.deep_sleep_duration_seconds,
                total,
            ),
            sleep_efficiency_percent: sleep_efficiency_percent(
                scores.sleep_efficiency_score,
                total,
                in_bed,
            ),
            awake_percent: awake_percent(duration.time_awake_during_sleep_seconds, in_bed, total),
            movement_minutes: activity.active_minutes,
            steps: activity.steps,
            // total_calories is never a source for active calories
            active_calories: calories.active_calories,
            hrv: choose_hrv(&[sleep_hr.candidates(), physical_hr.candidates()]),
            resting_heart_rate: sleep_hr.hr_resting_bpm.or(physical_hr.hr_resting_bpm),
            breathing_rate: breathing.breaths_avg_per_min,
        })
    }
}

impl ProviderPayloadAdapter for SummaryAdapter {
    fn map_days(&self, age: u32, raw: &str) -> Result<Vec<DatedRawMetrics>, VitalityError> {
        let value: Value = serde_json::from_str(raw)?;

        // Either a single day object or an array of them
        let days = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        let mut mapped = Vec::with_capacity(days.len());
        for day in &days {
            let metrics = Self::map_value(age, day)?;
            let date = match day.get("date").and_then(Value::as_str) {
                Some(s) => Some(NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                    VitalityError::DateParseError(format!("{}: {}", s, e))
                })?),
                None => None,
            };
            mapped.push(DatedRawMetrics { date, metrics });
        }

        mapped.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(mapped)
    }
}

// Summary payload structures

#[derive(Debug, Default, Deserialize)]
struct SleepDuration {
    sleep_duration_seconds: Option<f64>,
    time_in_bed_seconds: Option<f64>,
    rem_sleep_duration_seconds: Option<f64>,
    deep_sleep_duration_seconds: Option<f64>,
    time_awake_during_sleep_seconds: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SleepScores {
    sleep_efficiency_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct HeartRateBlock {
    hr_resting_bpm: Option<f64>,
    hrv_sdnn_avg_ms: Option<f64>,
    hrv_rmssd_avg_ms: Option<f64>,
}

impl HeartRateBlock {
    fn candidates(&self) -> HrvCandidates {
        HrvCandidates {
            sdnn: self.hrv_sdnn_avg_ms,
            rmssd: self.hrv_rmssd_avg_ms,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Breathing {
    breaths_avg_per_min: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Activity {
    steps: Option<u32>,
    active_minutes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Calories {
    active_calories: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HrvType;
    use pretty_assertions::assert_eq;

    fn full_payload() -> &'static str {
        r#"{
            "date": "2024-03-04",
            "sleep_summary": {
                "duration": {
                    "sleep_duration_seconds": 28800,
                    "time_in_bed_seconds": 30600,
                    "rem_sleep_duration_seconds": 6480,
                    "deep_sleep_duration_seconds": 7200,
                    "time_awake_during_sleep_seconds": 1530
                },
                "scores": { "sleep_efficiency_score": 92 },
                "heart_rate": {
                    "hr_resting_bpm": 54,
                    "hrv_sdnn_avg_ms": 61.5,
                    "hrv_rmssd_avg_ms": 48.0
                },
                "breathing": { "breaths_avg_per_min": 14.2 }
            },
            "physical_summary": {
                "activity": { "steps": 9120, "active_minutes": 48 },
                "calories": { "active_calories": 512.0, "total_calories": 2340.8 },
                "heart_rate": { "hr_resting_bpm": 58 }
            }
        }"#
    }

    #[test]
    fn test_map_full_summary() {
        let raw = SummaryAdapter::map_day(41, full_payload()).unwrap();

        assert_eq!(raw.age, 41);
        assert_eq!(raw.sleep_duration_hours, Some(8.0));
        assert!((raw.restorative_sleep_percent.unwrap() - 47.5).abs() < 1e-9);
        assert_eq!(raw.sleep_efficiency_percent, Some(92.0));
        assert!((raw.awake_percent.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(raw.steps, Some(9120));
        assert_eq!(raw.movement_minutes, Some(48.0));
        assert_eq!(raw.active_calories, Some(512.0));
        assert_eq!(raw.hrv_ms(), Some(61.5));
        assert_eq!(raw.hrv_type(), Some(HrvType::Sdnn));
        assert_eq!(raw.resting_heart_rate, Some(54.0));
        assert_eq!(raw.breathing_rate, Some(14.2));
    }

    #[test]
    fn test_total_calories_never_used_for_active() {
        let json = r#"{
            "physical_summary": {
                "calories": { "total_calories": 2340.8 }
            }
        }"#;
        let raw = SummaryAdapter::map_day(30, json).unwrap();
        assert_eq!(raw.active_calories, None);
    }

    #[test]
    fn test_rmssd_only_stays_rmssd() {
        let json = r#"{
            "sleep_summary": {
                "heart_rate": { "hrv_rmssd_avg_ms": 42.7 }
            }
        }"#;
        let raw = SummaryAdapter::map_day(30, json).unwrap();
        assert_eq!(raw.hrv_ms(), Some(42.7));
        assert_eq!(raw.hrv_type(), Some(HrvType::Rmssd));
    }

    #[test]
    fn test_physical_layer_fallbacks() {
        let json = r#"{
            "sleep_summary": { "heart_rate": {} },
            "physical_summary": {
                "heart_rate": { "hr_resting_bpm": 61, "hrv_rmssd_avg_ms": 33.0 }
            }
        }"#;
        let raw = SummaryAdapter::map_day(30, json).unwrap();
        assert_eq!(raw.resting_heart_rate, Some(61.0));
        assert_eq!(raw.hrv_type(), Some(HrvType::Rmssd));
        assert_eq!(raw.hrv_ms(), Some(33.0));
    }

    #[test]
    fn test_efficiency_computed_without_score() {
        let json = r#"{
            "sleep_summary": {
                "duration": { "sleep_duration_seconds": 25200, "time_in_bed_seconds": 28800 }
            }
        }"#;
        let raw = SummaryAdapter::map_day(30, json).unwrap();
        assert!((raw.sleep_efficiency_percent.unwrap() - 87.5).abs() < 1e-9);
        assert_eq!(raw.restorative_sleep_percent, None);
        assert_eq!(raw.awake_percent, None);
    }

    #[test]
    fn test_malformed_sections_yield_none() {
        let json = r#"{
            "sleep_summary": {
                "duration": "corrupted",
                "breathing": { "breaths_avg_per_min": 15.0 }
            },
            "physical_summary": ["not", "an", "object"]
        }"#;
        let raw = SummaryAdapter::map_day(30, json).unwrap();
        assert_eq!(raw.sleep_duration_hours, None);
        assert_eq!(raw.restorative_sleep_percent, None);
        assert_eq!(raw.steps, None);
        assert_eq!(raw.breathing_rate, Some(15.0));
    }

    #[test]
    fn test_empty_payload_is_all_none() {
        let raw = SummaryAdapter::map_day(30, "{}").unwrap();
        assert_eq!(raw, RawMetrics::new(30));
    }

    #[test]
    fn test_structurally_invalid_payload_errors() {
        assert!(matches!(
            SummaryAdapter::map_day(30, "not json"),
            Err(VitalityError::JsonError(_))
        ));
        assert!(matches!(
            SummaryAdapter::map_day(30, "[1, 2]"),
            Err(VitalityError::ParseError(_))
        ));
    }

    #[test]
    fn test_map_days_array_sorted_by_date() {
        let json = r#"[
            { "date": "2024-03-05", "physical_summary": { "activity": { "steps": 5000 } } },
            { "date": "2024-03-04", "physical_summary": { "activity": { "steps": 7000 } } }
        ]"#;
        let days = SummaryAdapter.map_days(30, json).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(days[0].metrics.steps, Some(7000));
        assert_eq!(days[1].metrics.steps, Some(5000));
    }

    #[test]
    fn test_map_days_rejects_bad_date() {
        let json = r#"{ "date": "04/03/2024" }"#;
        assert!(matches!(
            SummaryAdapter.map_days(30, json),
            Err(VitalityError::DateParseError(_))
        ));
    }
}
