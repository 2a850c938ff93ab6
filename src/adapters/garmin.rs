//! Garmin provider adapter
//!
//! Parses Garmin Health API payloads and maps them to daily raw metrics.

use crate::error::VitalityError;
use crate::features::{
    awake_percent, restorative_sleep_percent, seconds_to_hours, sleep_efficiency_percent,
};
use crate::types::{DatedRawMetrics, RawMetrics};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{choose_hrv, HrvCandidates, ProviderPayloadAdapter};

/// Garmin payload adapter
pub struct GarminAdapter;

impl ProviderPayloadAdapter for GarminAdapter {
    fn map_days(&self, age: u32, raw: &str) -> Result<Vec<DatedRawMetrics>, VitalityError> {
        let payload: GarminPayload = serde_json::from_str(raw)?;

        // Group data by date
        let mut by_date: BTreeMap<NaiveDate, DayData> = BTreeMap::new();

        for summary in payload.dailies.unwrap_or_default() {
            let date = parse_calendar_date(&summary.calendar_date)?;
            by_date.entry(date).or_default().daily = Some(summary);
        }

        for sleep in payload.sleep.unwrap_or_default() {
            let date = parse_calendar_date(&sleep.calendar_date)?;
            by_date.entry(date).or_default().sleep = Some(sleep);
        }

        Ok(by_date
            .into_iter()
            .map(|(date, day)| DatedRawMetrics {
                date: Some(date),
                metrics: convert_day(age, &day),
            })
            .collect())
    }
}

/// Internal structure to group Garmin data by date
#[derive(Default)]
struct DayData {
    daily: Option<GarminDaily>,
    sleep: Option<GarminSleep>,
}

fn parse_calendar_date(s: &str) -> Result<NaiveDate, VitalityError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| VitalityError::DateParseError(format!("{}: {}", s, e)))
}

fn convert_day(age: u32, day: &DayData) -> RawMetrics {
    let sleep = day.sleep.as_ref();
    let daily = day.daily.as_ref();

    let total = sleep.and_then(|s| s.sleep_time_seconds).map(|s| s as f64);
    // Garmin has no time-in-bed field; the sleep window stands in for it
    let in_bed = sleep.and_then(|s| {
        match (s.sleep_start_timestamp_gmt, s.sleep_end_timestamp_gmt) {
            (Some(start), Some(end)) if end > start => Some((end - start) as f64 / 1000.0),
            _ => None,
        }
    });
    let rem = sleep.and_then(|s| s.rem_sleep_seconds).map(|s| s as f64);
    let deep = sleep.and_then(|s| s.deep_sleep_seconds).map(|s| s as f64);
    let awake = sleep.and_then(|s| s.awake_sleep_seconds).map(|s| s as f64);

    RawMetrics {
        age,
        sleep_duration_hours: seconds_to_hours(total),
        restorative_sleep_percent: restorative_sleep_percent(rem, deep, total),
        sleep_efficiency_percent: sleep_efficiency_percent(None, total, in_bed),
        awake_percent: awake_percent(awake, in_bed, total),
        movement_minutes: daily
            .and_then(|d| d.active_time_seconds)
            .map(|secs| secs as f64 / 60.0),
        steps: daily.and_then(|d| d.total_steps),
        // totalKilocalories is total energy and never a substitute
        active_calories: daily.and_then(|d| d.active_kilocalories).map(f64::from),
        // Garmin overnight HRV is RMSSD
        hrv: choose_hrv(&[
            HrvCandidates {
                sdnn: None,
                rmssd: sleep.and_then(|s| s.avg_overnight_hrv),
            },
            HrvCandidates {
                sdnn: None,
                rmssd: daily.and_then(|d| d.resting_heart_rate_hrv),
            },
        ]),
        resting_heart_rate: daily.and_then(|d| d.resting_heart_rate).map(f64::from),
        breathing_rate: sleep.and_then(|s| s.avg_sleep_respiration),
    }
}

// Garmin API response structures

#[derive(Debug, Deserialize)]
struct GarminPayload {
    dailies: Option<Vec<GarminDaily>>,
    sleep: Option<Vec<GarminSleep>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminDaily {
    calendar_date: String,
    total_steps: Option<u32>,
    active_kilocalories: Option<i32>,
    active_time_seconds: Option<i64>,
    resting_heart_rate: Option<i32>,
    resting_heart_rate_hrv: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminSleep {
    calendar_date: String,
    sleep_start_timestamp_gmt: Option<i64>,
    sleep_end_timestamp_gmt: Option<i64>,
    sleep_time_seconds: Option<i64>,
    awake_sleep_seconds: Option<i64>,
    deep_sleep_seconds: Option<i64>,
    rem_sleep_seconds: Option<i64>,
    avg_sleep_respiration: Option<f64>,
    avg_overnight_hrv: Option<f64>,
}
