//! WHOOP provider adapter
//!
//! Parses WHOOP API payloads and maps them to daily raw metrics.

use crate::error::VitalityError;
use crate::features::{
    awake_percent, restorative_sleep_percent, seconds_to_hours, sleep_efficiency_percent,
};
use crate::types::{DatedRawMetrics, RawMetrics};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::{choose_hrv, lenient, HrvCandidates, ProviderPayloadAdapter};

/// WHOOP payload adapter
pub struct WhoopAdapter;

impl ProviderPayloadAdapter for WhoopAdapter {
    fn map_days(&self, age: u32, raw: &str) -> Result<Vec<DatedRawMetrics>, VitalityError> {
        let payload: WhoopPayload = serde_json::from_str(raw)?;

        // Group data by date; BTreeMap keeps the output in date order
        let mut by_date: BTreeMap<NaiveDate, DayData> = BTreeMap::new();

        for sleep in payload.sleep.unwrap_or_default() {
            match extract_date_from_whoop_time(&sleep.start) {
                Some(date) => by_date.entry(date).or_default().sleep = Some(sleep),
                None => debug!(start = %sleep.start, "skipping WHOOP sleep with bad start"),
            }
        }

        for recovery in payload.recovery.unwrap_or_default() {
            match extract_date_from_whoop_time(&recovery.created_at) {
                Some(date) => by_date.entry(date).or_default().recovery = Some(recovery),
                None => debug!(created_at = %recovery.created_at, "skipping WHOOP recovery with bad timestamp"),
            }
        }

        for cycle in payload.cycle.unwrap_or_default() {
            match extract_date_from_whoop_time(&cycle.start) {
                Some(date) => by_date.entry(date).or_default().cycle = Some(cycle),
                None => debug!(start = %cycle.start, "skipping WHOOP cycle with bad start"),
            }
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

/// Internal structure to group WHOOP data by date
#[derive(Default)]
struct DayData {
    sleep: Option<WhoopSleep>,
    recovery: Option<WhoopRecovery>,
    cycle: Option<WhoopCycle>,
}

fn millis_to_seconds(ms: Option<i64>) -> Option<f64> {
    ms.map(|ms| ms as f64 / 1000.0)
}

fn convert_day(age: u32, day: &DayData) -> RawMetrics {
    let sleep_score = day.sleep.as_ref().and_then(|s| s.score.as_ref());
    let stages = sleep_score.and_then(|sc| sc.stage_summary.as_ref());

    let total = stages.and_then(|ss| millis_to_seconds(ss.total_sleep_time_milli));
    let in_bed = stages.and_then(|ss| millis_to_seconds(ss.total_in_bed_time_milli));
    let rem = stages.and_then(|ss| millis_to_seconds(ss.total_rem_sleep_time_milli));
    let deep = stages.and_then(|ss| millis_to_seconds(ss.total_slow_wave_sleep_time_milli));
    let awake = stages.and_then(|ss| millis_to_seconds(ss.total_awake_time_milli));

    let recovery_score = day.recovery.as_ref().and_then(|r| r.score.as_ref());

    RawMetrics {
        age,
        sleep_duration_hours: seconds_to_hours(total),
        restorative_sleep_percent: restorative_sleep_percent(rem, deep, total),
        sleep_efficiency_percent: sleep_efficiency_percent(
            sleep_score.and_then(|sc| sc.sleep_efficiency_percentage),
            total,
            in_bed,
        ),
        awake_percent: awake_percent(awake, in_bed, total),
        // WHOOP does not report steps or an aggregate movement duration
        movement_minutes: None,
        steps: None,
        // Cycle kilojoules are total energy, not active energy
        active_calories: None,
        hrv: choose_hrv(&[HrvCandidates {
            sdnn: None,
            rmssd: recovery_score.and_then(|sc| sc.hrv_rmssd_milli),
        }]),
        resting_heart_rate: recovery_score.and_then(|sc| sc.resting_heart_rate),
        breathing_rate: sleep_score.and_then(|sc| sc.respiratory_rate),
    }
}

fn extract_date_from_whoop_time(time_str: &str) -> Option<NaiveDate> {
    // WHOOP times are in ISO 8601 format: "2024-01-15T08:30:00.000Z"
    let prefix = time_str.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

// WHOOP API response structures

#[derive(Debug, Deserialize)]
struct WhoopPayload {
    sleep: Option<Vec<WhoopSleep>>,
    recovery: Option<Vec<WhoopRecovery>>,
    cycle: Option<Vec<WhoopCycle>>,
}

#[derive(Debug, Deserialize)]
struct WhoopSleep {
    start: String,
    #[serde(default, deserialize_with = "lenient")]
    score: Option<WhoopSleepScore>,
}

#[derive(Debug, Deserialize)]
struct WhoopSleepScore {
    #[serde(default, deserialize_with = "lenient")]
    stage_summary: Option<WhoopStageSummary>,
    sleep_efficiency_percentage: Option<f64>,
    respiratory_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhoopStageSummary {
    total_in_bed_time_milli: Option<i64>,
    total_awake_time_milli: Option<i64>,
    total_slow_wave_sleep_time_milli: Option<i64>,
    total_rem_sleep_time_milli: Option<i64>,
    total_sleep_time_milli: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WhoopRecovery {
    created_at: String,
    #[serde(default, deserialize_with = "lenient")]
    score: Option<WhoopRecoveryScore>,
}

#[derive(Debug, Deserialize)]
struct WhoopRecoveryScore {
    resting_heart_rate: Option<f64>,
    hrv_rmssd_milli: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WhoopCycle {
    start: String,
}
