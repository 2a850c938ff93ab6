//! Pipeline orchestration
//!
//! This module provides the public API for the vitality engine.
//! It takes provider payloads through adaptation and scoring, and family
//! score rows through the trend and badge engines.

use crate::adapters::{Provider, ProviderPayloadAdapter, SummaryAdapter};
use crate::badges::{
    resolve_weekly, week_start_for, BadgeEngine, BadgeWinner, CallerRole, PersistedWeeklyBadges,
    WeeklyResolution,
};
use crate::benchmarks::{BenchmarkTable, ProgressMatrix};
use crate::config::VitalityConfig;
use crate::error::VitalityError;
use crate::explain::ScoreBreakdown;
use crate::scoring::ScoringEngine;
use crate::trends::{
    merge_alerts, FamilyAlert, FocusInsight, ServerPatternAlert, TrendEngine, TrendMember,
    TrendReport,
};
use crate::types::{DailyScoreRow, MemberScoreState, RawMetrics, RiskBand, VitalitySnapshot};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Result of scoring one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreOutcome {
    Scored {
        snapshot: VitalitySnapshot,
        breakdown: ScoreBreakdown,
    },
    /// Fewer than two pillars had enough data
    InsufficientData { pillars_used: u8, pillars_possible: u8 },
}

/// One adapted and scored day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayResult {
    pub date: Option<NaiveDate>,
    pub raw: RawMetrics,
    pub outcome: ScoreOutcome,
}

impl DayResult {
    pub fn snapshot(&self) -> Option<&VitalitySnapshot> {
        match &self.outcome {
            ScoreOutcome::Scored { snapshot, .. } => Some(snapshot),
            ScoreOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Family trend request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRequest {
    /// Last day of the window; defaults to the date of `now`
    #[serde(default)]
    pub today: Option<NaiveDate>,
    /// Reference time for freshness; defaults to the current time
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    pub members: Vec<TrendMember>,
    #[serde(default)]
    pub rows: Vec<DailyScoreRow>,
    #[serde(default)]
    pub server_alerts: Vec<ServerPatternAlert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResponse {
    pub report: TrendReport,
    /// Server alerts merged with local insights
    pub alerts: Vec<FamilyAlert>,
    /// Only filled when there is no alert to show
    pub focus: Vec<FocusInsight>,
}

/// Family badge request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeRequest {
    #[serde(default)]
    pub today: Option<NaiveDate>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    pub members: Vec<MemberScoreState>,
    #[serde(default)]
    pub rows: Vec<DailyScoreRow>,
    #[serde(default)]
    pub persisted_weekly: Option<PersistedWeeklyBadges>,
    #[serde(default = "default_role")]
    pub role: CallerRole,
}

fn default_role() -> CallerRole {
    CallerRole::Member
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeResponse {
    pub daily: Vec<BadgeWinner>,
    pub weekly: WeeklyResolution,
}

fn resolve_clock(
    today: Option<NaiveDate>,
    now: Option<DateTime<Utc>>,
) -> (NaiveDate, DateTime<Utc>) {
    let now = now.unwrap_or_else(Utc::now);
    (today.unwrap_or_else(|| now.date_naive()), now)
}

/// Score a single-day summary payload with the built-in benchmarks.
///
/// # Example
/// ```ignore
/// let day = summary_to_vitality(summary_json, 42)?;
/// ```
pub fn summary_to_vitality(raw_json: &str, age: u32) -> Result<DayResult, VitalityError> {
    VitalityProcessor::new().process_summary(raw_json, age, None)
}

/// Score every day of a provider payload with the built-in benchmarks.
pub fn provider_to_vitality(
    provider: Provider,
    raw: &str,
    age: u32,
) -> Result<Vec<DayResult>, VitalityError> {
    VitalityProcessor::new().process_provider(provider, raw, age, None)
}

/// Configured engine set.
///
/// Holds the scoring, trend and badge engines built from one
/// [`VitalityConfig`]. Cheap to clone; the benchmark tables are shared.
#[derive(Debug, Clone)]
pub struct VitalityProcessor {
    config: VitalityConfig,
    scoring: ScoringEngine,
    trends: TrendEngine,
    badges: BadgeEngine,
}

impl Default for VitalityProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl VitalityProcessor {
    /// Create a processor with default settings
    pub fn new() -> Self {
        Self::build(VitalityConfig::default(), ScoringEngine::default())
    }

    /// Create a processor with a validated configuration
    pub fn with_config(config: VitalityConfig) -> Result<Self, VitalityError> {
        config.validate()?;
        Ok(Self::build(config, ScoringEngine::default()))
    }

    /// Replace the benchmark table and progress matrix
    pub fn with_benchmarks(mut self, table: BenchmarkTable, progress: ProgressMatrix) -> Self {
        self.scoring = ScoringEngine::new(Arc::new(table), Arc::new(progress));
        self
    }

    fn build(config: VitalityConfig, scoring: ScoringEngine) -> Self {
        Self {
            trends: TrendEngine::new(config.trends.clone(), &config.freshness),
            badges: BadgeEngine::new(config.badges.clone(), &config.freshness),
            scoring,
            config,
        }
    }

    /// Load configuration from JSON, keeping the current benchmarks
    pub fn load_config(&mut self, json: &str) -> Result<(), VitalityError> {
        let config = VitalityConfig::from_json(json)?;
        *self = Self::build(config, self.scoring.clone());
        Ok(())
    }

    /// Save configuration to JSON
    pub fn save_config(&self) -> Result<String, VitalityError> {
        Ok(self.config.to_json()?)
    }

    pub fn config(&self) -> &VitalityConfig {
        &self.config
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    pub fn trends(&self) -> &TrendEngine {
        &self.trends
    }

    pub fn badges(&self) -> &BadgeEngine {
        &self.badges
    }

    /// Score raw metrics that are already adapted
    pub fn score_metrics(
        &self,
        date: Option<NaiveDate>,
        raw: RawMetrics,
        risk: Option<RiskBand>,
    ) -> DayResult {
        let outcome = match self.scoring.score_if_possible_with_risk(&raw, risk) {
            Some((snapshot, breakdown)) => ScoreOutcome::Scored {
                snapshot,
                breakdown,
            },
            None => {
                let snapshot = self.scoring.score(&raw);
                ScoreOutcome::InsufficientData {
                    pillars_used: snapshot.pillars_used,
                    pillars_possible: snapshot.pillars_possible,
                }
            }
        };
        DayResult { date, raw, outcome }
    }

    /// Score a single-day summary payload
    pub fn process_summary(
        &self,
        raw_json: &str,
        age: u32,
        risk: Option<RiskBand>,
    ) -> Result<DayResult, VitalityError> {
        let value: serde_json::Value = serde_json::from_str(raw_json)?;
        let raw = SummaryAdapter::map_value(age, &value)?;
        let date = match value.get("date").and_then(|d| d.as_str()) {
            Some(s) => Some(
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|e| VitalityError::DateParseError(format!("{}: {}", s, e)))?,
            ),
            None => None,
        };
        Ok(self.score_metrics(date, raw, risk))
    }

    /// Adapt and score every day of a provider payload
    pub fn process_provider(
        &self,
        provider: Provider,
        raw: &str,
        age: u32,
        risk: Option<RiskBand>,
    ) -> Result<Vec<DayResult>, VitalityError> {
        let adapter = provider.adapter();
        self.process_with_adapter(adapter.as_ref(), raw, age, risk)
    }

    fn process_with_adapter(
        &self,
        adapter: &dyn ProviderPayloadAdapter,
        raw: &str,
        age: u32,
        risk: Option<RiskBand>,
    ) -> Result<Vec<DayResult>, VitalityError> {
        let days = adapter.map_days(age, raw)?;
        debug!(days = days.len(), "adapted provider payload");
        Ok(days
            .into_iter()
            .map(|day| self.score_metrics(day.date, day.metrics, risk))
            .collect())
    }

    /// Trends, merged alerts and the fallback focus for a family
    pub fn compute_trends(&self, request: &TrendRequest) -> TrendResponse {
        let (today, now) = resolve_clock(request.today, request.now);
        let report = self
            .trends
            .compute_trends(&request.members, &request.rows, today, now);
        let alerts = merge_alerts(request.server_alerts.clone(), report.insights.clone());
        let focus = if alerts.is_empty() {
            self.trends.fallback_focus(&request.members, now)
        } else {
            Vec::new()
        };
        TrendResponse {
            report,
            alerts,
            focus,
        }
    }

    /// Daily winners for today and the resolved weekly set for this week
    pub fn compute_badges(&self, request: &BadgeRequest) -> BadgeResponse {
        let (today, now) = resolve_clock(request.today, request.now);
        let daily = self
            .badges
            .compute_daily(&request.members, &request.rows, today, now);

        let week_start = week_start_for(today);
        let computed = self
            .badges
            .compute_weekly(&request.members, &request.rows, week_start, now);
        let weekly = resolve_weekly(
            request.persisted_weekly.clone(),
            computed,
            week_start,
            request.role,
            self.config.badges.min_persisted_winners,
        );
        BadgeResponse { daily, weekly }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HrvType, Pillar, PillarValues};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn sample_summary_json() -> &'static str {
        r#"{
            "date": "2024-01-15",
            "sleep_summary": {
                "duration": {
                    "sleep_duration_seconds": 28800,
                    "time_in_bed_seconds": 30600,
                    "rem_sleep_duration_seconds": 6480,
                    "deep_sleep_duration_seconds": 7200,
                    "time_awake_during_sleep_seconds": 1800
                },
                "heart_rate": { "hr_resting_bpm": 56, "hrv_sdnn_avg_ms": 64.0 },
                "breathing": { "breaths_avg_per_min": 14.2 }
            },
            "physical_summary": {
                "activity": { "steps": 11200, "active_minutes": 52 },
                "calories": { "active_calories": 540, "total_calories": 2340.8 }
            }
        }"#
    }

    fn sample_whoop_json() -> &'static str {
        r#"{
            "sleep": [{
                "start": "2024-01-15T22:30:00.000Z",
                "score": {
                    "stage_summary": {
                        "total_in_bed_time_milli": 28800000,
                        "total_awake_time_milli": 1800000,
                        "total_slow_wave_sleep_time_milli": 7200000,
                        "total_rem_sleep_time_milli": 7200000,
                        "total_sleep_time_milli": 27000000
                    },
                    "sleep_efficiency_percentage": 93.75,
                    "respiratory_rate": 14.5
                }
            }],
            "recovery": [{
                "created_at": "2024-01-15T06:30:00.000Z",
                "score": { "resting_heart_rate": 52.0, "hrv_rmssd_milli": 65.0 }
            }]
        }"#
    }

    #[test]
    fn test_summary_to_vitality() {
        let day = summary_to_vitality(sample_summary_json(), 42).unwrap();
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(day.raw.active_calories, Some(540.0));
        assert_eq!(day.raw.hrv_type(), Some(HrvType::Sdnn));

        let snapshot = day.snapshot().unwrap();
        assert_eq!(snapshot.pillars_used, 3);
        assert!(snapshot.total_score.is_some());

        let json = serde_json::to_value(&day).unwrap();
        assert_eq!(json["outcome"]["status"], "scored");
    }

    #[test]
    fn test_whoop_payload_without_movement() {
        // Sleep and stress only still make two pillars
        let days = provider_to_vitality(Provider::Whoop, sample_whoop_json(), 35).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].snapshot().unwrap().pillars_used, 2);

        let sparse = r#"{ "recovery": [{ "created_at": "2024-01-15T06:30:00.000Z",
                          "score": { "resting_heart_rate": 52.0 } }] }"#;
        let days = provider_to_vitality(Provider::Whoop, sparse, 35).unwrap();
        assert_eq!(
            days[0].outcome,
            ScoreOutcome::InsufficientData {
                pillars_used: 1,
                pillars_possible: 3
            }
        );
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            summary_to_vitality("not valid json", 30),
            Err(VitalityError::JsonError(_))
        ));
        assert!(provider_to_vitality(Provider::Garmin, "[", 30).is_err());
    }

    #[test]
    fn test_risk_band_fills_progress() {
        let processor = VitalityProcessor::new();
        let day = processor
            .process_summary(sample_summary_json(), 42, Some(RiskBand::High))
            .unwrap();
        assert!(day.snapshot().unwrap().progress_score.is_some());
    }

    #[test]
    fn test_config_roundtrip_through_processor() {
        let mut processor = VitalityProcessor::new();
        processor
            .load_config(r#"{ "trends": { "min_days": 10 } }"#)
            .unwrap();
        assert_eq!(processor.trends().config().min_days, 10);

        let saved = processor.save_config().unwrap();
        let restored = VitalityProcessor::with_config(VitalityConfig::from_json(&saved).unwrap())
            .unwrap();
        assert_eq!(restored.config(), processor.config());
    }

    #[test]
    fn test_trend_request_falls_back_to_focus() {
        let now = Utc.with_ymd_and_hms(2024, 3, 21, 12, 0, 0).unwrap();
        let member = TrendMember {
            state: MemberScoreState {
                member_id: Uuid::from_u128(7),
                has_profile: true,
                current_score: Some(60),
                optimal_score: Some(88),
                scored_at: Some(now - Duration::hours(2)),
            },
            is_self: false,
            display_name: Some("Sam".to_string()),
            current_pillars: PillarValues {
                sleep: Some(55),
                movement: Some(64),
                stress: Some(61),
            },
        };
        let request = TrendRequest {
            today: None,
            now: Some(now),
            members: vec![member],
            rows: Vec::new(),
            server_alerts: Vec::new(),
        };

        let response = VitalityProcessor::new().compute_trends(&request);
        assert!(!response.report.coverage.has_minimum_coverage);
        assert!(response.alerts.is_empty());
        assert_eq!(response.focus.len(), 1);
        assert_eq!(response.focus[0].pillar, Pillar::Sleep);
    }

    #[test]
    fn test_badge_request_from_json() {
        let json = r#"{
            "today": "2024-03-21",
            "now": "2024-03-21T18:00:00Z",
            "members": [
                { "member_id": "00000000-0000-0000-0000-000000000001", "current_score": 70,
                  "optimal_score": 88, "scored_at": "2024-03-21T07:00:00Z" },
                { "member_id": "00000000-0000-0000-0000-000000000002", "current_score": 64,
                  "optimal_score": 84, "scored_at": "2024-03-21T07:00:00Z" }
            ],
            "rows": [
                { "member_id": "00000000-0000-0000-0000-000000000001", "date": "2024-03-20", "total": 70, "sleep": 60 },
                { "member_id": "00000000-0000-0000-0000-000000000001", "date": "2024-03-21", "total": 72, "sleep": 66 },
                { "member_id": "00000000-0000-0000-0000-000000000002", "date": "2024-03-20", "total": 61, "sleep": 70 },
                { "member_id": "00000000-0000-0000-0000-000000000002", "date": "2024-03-21", "total": 64, "sleep": 71 }
            ]
        }"#;
        let request: BadgeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.role, CallerRole::Member);

        let response = VitalityProcessor::new().compute_badges(&request);
        assert_eq!(response.daily.len(), 1);
        assert_eq!(response.daily[0].member_id, Uuid::from_u128(1));
        assert_eq!(
            response.weekly.week_start,
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap()
        );
        assert!(!response.weekly.persist);
        assert!(!response.weekly.winners.is_empty());
    }
}
