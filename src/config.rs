//! Engine configuration
//!
//! Every threshold the freshness gate, trend engine and badge engine apply
//! lives here. All sections default to the production values, so a partial
//! JSON document only overrides what it names.

use crate::error::VitalityError;
use serde::{Deserialize, Serialize};

/// Upper bound for every day-count window in the configuration
pub const MAX_WINDOW_DAYS: u32 = 366;

/// Freshness gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// A score older than this many days is stale
    pub max_age_days: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self { max_age_days: 3 }
    }
}

/// Trend engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Length of the look-back window ending today
    pub window_days: u32,
    /// Days of data needed before any insight is produced
    pub min_days: u32,
    /// Deviation at or above which a trend is celebrated
    pub celebrate_deviation: f64,
    /// Magnitude of decline that raises a watch
    pub watch_deviation: f64,
    /// Magnitude of decline that raises attention
    pub attention_deviation: f64,
    /// Pillar value under which a day counts toward a low streak
    pub optimal_threshold: u8,
    /// Low streak length that escalates watch to attention
    pub escalation_streak_days: u32,
    /// Current pillar score at or above which negative alerts are suppressed
    pub suppression_score: u8,
    pub high_confidence_days: u32,
    pub medium_confidence_days: u32,
    /// Recent window bounds for the baseline/recent split
    pub recent_min_days: usize,
    pub recent_max_days: usize,
    /// Fallback focus is shown below this fraction of the optimal score
    pub focus_ratio: f64,
    /// and only when the weakest pillar is under this value
    pub focus_pillar_ceiling: u8,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_days: 21,
            min_days: 7,
            celebrate_deviation: 0.10,
            watch_deviation: 0.10,
            attention_deviation: 0.20,
            optimal_threshold: 70,
            escalation_streak_days: 5,
            suppression_score: 85,
            high_confidence_days: 14,
            medium_confidence_days: 10,
            recent_min_days: 3,
            recent_max_days: 7,
            focus_ratio: 0.9,
            focus_pillar_ceiling: 75,
        }
    }
}

/// Badge engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeConfig {
    /// Persisted weekly sets with fewer winners are recomputed
    pub min_persisted_winners: usize,
    pub consistency_min_days: usize,
    /// Daily total at or above which a day extends a streak
    pub streak_threshold: u8,
    pub streak_window_days: u32,
    pub streak_min_days: u32,
    pub completeness_window_days: u32,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            min_persisted_winners: 3,
            consistency_min_days: 5,
            streak_threshold: 70,
            streak_window_days: 14,
            streak_min_days: 2,
            completeness_window_days: 14,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalityConfig {
    pub freshness: FreshnessConfig,
    pub trends: TrendConfig,
    pub badges: BadgeConfig,
}

impl VitalityConfig {
    /// Parse and validate a configuration document
    pub fn from_json(json: &str) -> Result<Self, VitalityError> {
        let config: VitalityConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), VitalityError> {
        let invalid = |msg: &str| Err(VitalityError::InvalidConfig(msg.to_string()));

        if self.freshness.max_age_days < 0
            || self.freshness.max_age_days > i64::from(MAX_WINDOW_DAYS)
        {
            return invalid("freshness.max_age_days must be within 0-366");
        }

        let t = &self.trends;
        if t.window_days == 0 || t.min_days == 0 {
            return invalid("trends.window_days and trends.min_days must be positive");
        }
        if t.window_days > MAX_WINDOW_DAYS {
            return invalid("trends.window_days must not exceed 366");
        }
        if t.min_days > t.window_days {
            return invalid("trends.min_days cannot exceed trends.window_days");
        }
        if t.recent_min_days == 0 || t.recent_min_days > t.recent_max_days {
            return invalid("trends recent window bounds are inverted or zero");
        }
        if !(t.celebrate_deviation > 0.0
            && t.watch_deviation > 0.0
            && t.attention_deviation >= t.watch_deviation)
        {
            return invalid("trend deviations must be positive with attention >= watch");
        }
        if t.medium_confidence_days > t.high_confidence_days {
            return invalid("trends.medium_confidence_days cannot exceed high_confidence_days");
        }
        if !(t.focus_ratio > 0.0 && t.focus_ratio <= 1.0) {
            return invalid("trends.focus_ratio must be in (0, 1]");
        }
        if t.optimal_threshold > 100 || t.suppression_score > 100 || t.focus_pillar_ceiling > 100 {
            return invalid("trend score thresholds must be within 0-100");
        }

        let b = &self.badges;
        if b.streak_threshold > 100 {
            return invalid("badges.streak_threshold must be within 0-100");
        }
        if b.streak_window_days == 0 || b.completeness_window_days == 0 {
            return invalid("badge windows must be positive");
        }
        if b.streak_window_days > MAX_WINDOW_DAYS
            || b.completeness_window_days > MAX_WINDOW_DAYS
        {
            return invalid("badge windows must not exceed 366 days");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_validate() {
        VitalityConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_overrides_only_named_fields() {
        let config =
            VitalityConfig::from_json(r#"{ "trends": { "min_days": 10 }, "freshness": {} }"#)
                .unwrap();
        assert_eq!(config.trends.min_days, 10);
        assert_eq!(config.trends.window_days, 21);
        assert_eq!(config.freshness, FreshnessConfig::default());
        assert_eq!(config.badges, BadgeConfig::default());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = VitalityConfig::default();
        let parsed = VitalityConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_min_days_above_window() {
        let err = VitalityConfig::from_json(r#"{ "trends": { "window_days": 5 } }"#).unwrap_err();
        assert!(matches!(err, VitalityError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_oversized_windows() {
        for json in [
            r#"{ "freshness": { "max_age_days": 9223372036854775807 } }"#,
            r#"{ "trends": { "window_days": 4000000000 } }"#,
            r#"{ "badges": { "streak_window_days": 367 } }"#,
            r#"{ "badges": { "completeness_window_days": 100000 } }"#,
        ] {
            let err = VitalityConfig::from_json(json).unwrap_err();
            assert!(matches!(err, VitalityError::InvalidConfig(_)), "{json}");
        }
        VitalityConfig::from_json(r#"{ "trends": { "window_days": 366 } }"#).unwrap();
    }

    #[test]
    fn test_rejects_negative_freshness() {
        let err =
            VitalityConfig::from_json(r#"{ "freshness": { "max_age_days": -1 } }"#).unwrap_err();
        assert!(matches!(err, VitalityError::InvalidConfig(_)));
    }
}
