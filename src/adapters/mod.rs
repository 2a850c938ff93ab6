//! Provider payload adapters
//!
//! This module provides adapters that parse raw provider payloads and map them
//! to canonical [`RawMetrics`](crate::types::RawMetrics) records.

mod csv_import;
mod garmin;
mod summary;
mod whoop;

pub use csv_import::CsvImportAdapter;
pub use garmin::GarminAdapter;
pub use summary::SummaryAdapter;
pub use whoop::WhoopAdapter;

use crate::error::VitalityError;
use crate::types::{DatedRawMetrics, HrvReading, HrvType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// Trait for provider payload adapters
pub trait ProviderPayloadAdapter {
    /// Parse a raw payload and map every day it contains to raw metrics
    fn map_days(&self, age: u32, raw: &str) -> Result<Vec<DatedRawMetrics>, VitalityError>;
}

/// Supported payload sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Summary,
    Whoop,
    Garmin,
    Csv,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Summary => "summary",
            Provider::Whoop => "whoop",
            Provider::Garmin => "garmin",
            Provider::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VitalityError> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Ok(Provider::Summary),
            "whoop" => Ok(Provider::Whoop),
            "garmin" => Ok(Provider::Garmin),
            "csv" => Ok(Provider::Csv),
            other => Err(VitalityError::UnsupportedProvider(other.to_string())),
        }
    }

    /// Adapter instance for this provider
    pub fn adapter(&self) -> Box<dyn ProviderPayloadAdapter> {
        match self {
            Provider::Summary => Box::new(SummaryAdapter),
            Provider::Whoop => Box::new(WhoopAdapter),
            Provider::Garmin => Box::new(GarminAdapter),
            Provider::Csv => Box::new(CsvImportAdapter),
        }
    }
}

/// HRV values one payload layer offers
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HrvCandidates {
    pub sdnn: Option<f64>,
    pub rmssd: Option<f64>,
}

/// Pick an HRV reading: SDNN from any layer before RMSSD from any layer,
/// earlier layers first. The chosen value keeps its own type.
pub(crate) fn choose_hrv(layers: &[HrvCandidates]) -> Option<HrvReading> {
    let sdnn = layers.iter().find_map(|l| l.sdnn).map(|ms| HrvReading {
        ms,
        kind: HrvType::Sdnn,
    });
    sdnn.or_else(|| {
        layers.iter().find_map(|l| l.rmssd).map(|ms| HrvReading {
            ms,
            kind: HrvType::Rmssd,
        })
    })
}

/// Deserialize an optional nested section.
///
/// Absent, null and malformed sections all yield `None`; only the caller's
/// top-level decode can fail.
pub(crate) fn section<T: DeserializeOwned>(parent: &serde_json::Value, key: &str) -> Option<T> {
    let value = parent.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(section = key, error = %e, "ignoring malformed payload section");
            None
        }
    }
}

/// Field-level counterpart of [`section`] for `#[serde(deserialize_with)]`.
///
/// Pair with `#[serde(default)]` so an absent field also yields `None`.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            debug!(error = %e, "ignoring malformed payload field");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_hrv_prefers_sdnn_across_layers() {
        let sleep = HrvCandidates {
            sdnn: None,
            rmssd: Some(40.0),
        };
        let physical = HrvCandidates {
            sdnn: Some(55.0),
            rmssd: None,
        };
        let hrv = choose_hrv(&[sleep, physical]).unwrap();
        assert_eq!(hrv.kind, HrvType::Sdnn);
        assert_eq!(hrv.ms, 55.0);
    }

    #[test]
    fn test_choose_hrv_keeps_rmssd_value() {
        let hrv = choose_hrv(&[
            HrvCandidates::default(),
            HrvCandidates {
                sdnn: None,
                rmssd: Some(42.7),
            },
        ])
        .unwrap();
        assert_eq!(hrv.kind, HrvType::Rmssd);
        assert_eq!(hrv.ms, 42.7);
        assert!(choose_hrv(&[HrvCandidates::default()]).is_none());
    }

    #[test]
    fn test_section_tolerates_bad_shape() {
        #[derive(Deserialize)]
        struct Block {
            value: Option<f64>,
        }
        let parent = serde_json::json!({
            "good": { "value": 1.5 },
            "bad": "not an object",
            "null": null
        });
        let good: Option<Block> = section(&parent, "good");
        assert_eq!(good.and_then(|b| b.value), Some(1.5));
        assert!(section::<Block>(&parent, "bad").is_none());
        assert!(section::<Block>(&parent, "null").is_none());
        assert!(section::<Block>(&parent, "absent").is_none());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(Provider::parse("WHOOP").unwrap(), Provider::Whoop);
        assert!(matches!(
            Provider::parse("oura"),
            Err(VitalityError::UnsupportedProvider(_))
        ));
    }
}
