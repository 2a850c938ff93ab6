//! CSV import adapter
//!
//! Reads the daily vitality CSV produced from an Apple Health export
//! (`date,sleep_hours,steps,hrv_ms,resting_hr`). Empty cells are missing
//! measurements. Apple Health reports SDNN, so HRV is tagged SDNN unless an
//! `hrv_type` column says otherwise. Optional extra columns:
//! `hrv_type`, `movement_minutes`, `active_calories`, `breathing_rate`.

use crate::error::VitalityError;
use crate::types::{DatedRawMetrics, HrvReading, HrvType, RawMetrics};
use chrono::NaiveDate;
use serde::Deserialize;

use super::ProviderPayloadAdapter;

/// CSV import adapter
pub struct CsvImportAdapter;

impl ProviderPayloadAdapter for CsvImportAdapter {
    fn map_days(&self, age: u32, raw: &str) -> Result<Vec<DatedRawMetrics>, VitalityError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());

        let mut days = Vec::new();
        for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
            let row = record?;
            let kind = match row.hrv_type.as_deref() {
                None | Some("") => HrvType::Sdnn,
                Some(tag) => HrvType::parse(tag).ok_or_else(|| {
                    VitalityError::ParseError(format!(
                        "row {}: unknown hrv_type '{}'",
                        index + 1,
                        tag
                    ))
                })?,
            };

            days.push(DatedRawMetrics {
                date: Some(row.date),
                metrics: RawMetrics {
                    age,
                    sleep_duration_hours: row.sleep_hours,
                    movement_minutes: row.movement_minutes,
                    steps: row.steps,
                    active_calories: row.active_calories,
                    hrv: row.hrv_ms.map(|ms| HrvReading { ms, kind }),
                    resting_heart_rate: row.resting_hr,
                    breathing_rate: row.breathing_rate,
                    ..RawMetrics::new(age)
                },
            });
        }

        days.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(days)
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    #[serde(default)]
    sleep_hours: Option<f64>,
    #[serde(default)]
    steps: Option<u32>,
    #[serde(default)]
    hrv_ms: Option<f64>,
    #[serde(default)]
    resting_hr: Option<f64>,
    #[serde(default)]
    hrv_type: Option<String>,
    #[serde(default)]
    movement_minutes: Option<f64>,
    #[serde(default)]
    active_calories: Option<f64>,
    #[serde(default)]
    breathing_rate: Option<f64>,
}
