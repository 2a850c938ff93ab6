//! Core types for the Miya vitality engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: canonical raw metrics, pillar scores, vitality snapshots and the
//! per-member scoring state consumed by the trend and badge engines.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Family member identifier (backend profile id)
pub type MemberId = Uuid;

/// HRV measurement method.
///
/// SDNN and RMSSD are different measurements and are never converted into
/// each other; a reading always keeps the tag of its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HrvType {
    Sdnn,
    Rmssd,
}

impl HrvType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HrvType::Sdnn => "sdnn",
            HrvType::Rmssd => "rmssd",
        }
    }

    /// Parse a provider or CSV tag
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sdnn" => Some(HrvType::Sdnn),
            "rmssd" => Some(HrvType::Rmssd),
            _ => None,
        }
    }
}

/// An HRV value together with the method that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvReading {
    /// HRV in milliseconds
    pub ms: f64,
    /// Measurement method of `ms`
    pub kind: HrvType,
}

/// Canonical raw metrics for one member on one calendar day.
///
/// Every measurement is optional. A field that cannot be derived from the
/// source payload is `None`; a zero is only ever a real zero reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    /// Member age in years
    pub age: u32,
    /// Total sleep (hours)
    pub sleep_duration_hours: Option<f64>,
    /// REM + deep sleep as a share of total sleep (0-100)
    pub restorative_sleep_percent: Option<f64>,
    /// Sleep efficiency (0-100)
    pub sleep_efficiency_percent: Option<f64>,
    /// Time awake during the sleep period (0-100)
    pub awake_percent: Option<f64>,
    /// Active movement (minutes)
    pub movement_minutes: Option<f64>,
    /// Step count
    pub steps: Option<u32>,
    /// Active energy expenditure (kcal), never total energy
    pub active_calories: Option<f64>,
    /// Heart rate variability with its measurement method
    pub hrv: Option<HrvReading>,
    /// Resting heart rate (bpm)
    pub resting_heart_rate: Option<f64>,
    /// Breathing rate (breaths per minute)
    pub breathing_rate: Option<f64>,
}

impl RawMetrics {
    /// Create an empty record for a member of the given age
    pub fn new(age: u32) -> Self {
        Self {
            age,
            ..Default::default()
        }
    }

    pub fn hrv_ms(&self) -> Option<f64> {
        self.hrv.map(|h| h.ms)
    }

    pub fn hrv_type(&self) -> Option<HrvType> {
        self.hrv.map(|h| h.kind)
    }

    /// Raw value for a submetric, in the unit its benchmark uses.
    ///
    /// Non-finite values are reported as absent.
    pub fn value(&self, submetric: Submetric) -> Option<f64> {
        let value = match submetric {
            Submetric::SleepDuration => self.sleep_duration_hours,
            Submetric::RestorativeSleep => self.restorative_sleep_percent,
            Submetric::SleepEfficiency => self.sleep_efficiency_percent,
            Submetric::AwakePercent => self.awake_percent,
            Submetric::Steps => self.steps.map(f64::from),
            Submetric::MovementMinutes => self.movement_minutes,
            Submetric::ActiveCalories => self.active_calories,
            Submetric::Hrv => self.hrv_ms(),
            Submetric::RestingHeartRate => self.resting_heart_rate,
            Submetric::BreathingRate => self.breathing_rate,
        };
        value.filter(|v| v.is_finite())
    }

    /// True when no measurement is present
    pub fn is_empty(&self) -> bool {
        Submetric::ALL.iter().all(|s| self.value(*s).is_none())
    }
}

/// Raw metrics tagged with the calendar day they describe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedRawMetrics {
    pub date: Option<NaiveDate>,
    pub metrics: RawMetrics,
}

/// Age band used as the benchmark lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Teen,
    Adult,
    MiddleAge,
    Senior,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 5] = [
        AgeGroup::Child,
        AgeGroup::Teen,
        AgeGroup::Adult,
        AgeGroup::MiddleAge,
        AgeGroup::Senior,
    ];

    /// Map an age in years to its band. Total over all ages.
    pub fn from_age(age: u32) -> Self {
        match age {
            0..=12 => AgeGroup::Child,
            13..=17 => AgeGroup::Teen,
            18..=39 => AgeGroup::Adult,
            40..=59 => AgeGroup::MiddleAge,
            _ => AgeGroup::Senior,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Child => "child",
            AgeGroup::Teen => "teen",
            AgeGroup::Adult => "adult",
            AgeGroup::MiddleAge => "middle_age",
            AgeGroup::Senior => "senior",
        }
    }
}

/// Top-level health dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Sleep,
    Movement,
    Stress,
}

impl Pillar {
    /// Display order
    pub const ALL: [Pillar; 3] = [Pillar::Sleep, Pillar::Movement, Pillar::Stress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pillar::Sleep => "sleep",
            Pillar::Movement => "movement",
            Pillar::Stress => "stress",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Pillar::Sleep => "Sleep",
            Pillar::Movement => "Movement",
            Pillar::Stress => "Stress",
        }
    }

    /// Submetrics contributing to this pillar, in breakdown order
    pub fn submetrics(&self) -> &'static [Submetric] {
        match self {
            Pillar::Sleep => &[
                Submetric::SleepDuration,
                Submetric::RestorativeSleep,
                Submetric::SleepEfficiency,
                Submetric::AwakePercent,
            ],
            Pillar::Movement => &[
                Submetric::Steps,
                Submetric::MovementMinutes,
                Submetric::ActiveCalories,
            ],
            Pillar::Stress => &[
                Submetric::Hrv,
                Submetric::RestingHeartRate,
                Submetric::BreathingRate,
            ],
        }
    }

    /// Submetrics of which at least one must be present for the pillar to be valid
    pub fn required_any(&self) -> &'static [Submetric] {
        match self {
            Pillar::Sleep => &[Submetric::SleepDuration],
            Pillar::Movement => &[Submetric::Steps, Submetric::MovementMinutes],
            Pillar::Stress => &[Submetric::Hrv, Submetric::RestingHeartRate],
        }
    }
}

/// A single measured quantity contributing to exactly one pillar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Submetric {
    SleepDuration,
    RestorativeSleep,
    SleepEfficiency,
    AwakePercent,
    Steps,
    MovementMinutes,
    ActiveCalories,
    Hrv,
    RestingHeartRate,
    BreathingRate,
}

impl Submetric {
    pub const ALL: [Submetric; 10] = [
        Submetric::SleepDuration,
        Submetric::RestorativeSleep,
        Submetric::SleepEfficiency,
        Submetric::AwakePercent,
        Submetric::Steps,
        Submetric::MovementMinutes,
        Submetric::ActiveCalories,
        Submetric::Hrv,
        Submetric::RestingHeartRate,
        Submetric::BreathingRate,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Submetric::SleepDuration => "sleep_duration",
            Submetric::RestorativeSleep => "restorative_sleep",
            Submetric::SleepEfficiency => "sleep_efficiency",
            Submetric::AwakePercent => "awake_percent",
            Submetric::Steps => "steps",
            Submetric::MovementMinutes => "movement_minutes",
            Submetric::ActiveCalories => "active_calories",
            Submetric::Hrv => "hrv",
            Submetric::RestingHeartRate => "resting_heart_rate",
            Submetric::BreathingRate => "breathing_rate",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Submetric::SleepDuration => "Sleep duration",
            Submetric::RestorativeSleep => "Restorative sleep",
            Submetric::SleepEfficiency => "Sleep efficiency",
            Submetric::AwakePercent => "Time awake",
            Submetric::Steps => "Steps",
            Submetric::MovementMinutes => "Movement minutes",
            Submetric::ActiveCalories => "Active calories",
            Submetric::Hrv => "Heart rate variability",
            Submetric::RestingHeartRate => "Resting heart rate",
            Submetric::BreathingRate => "Breathing rate",
        }
    }

    pub fn pillar(&self) -> Pillar {
        match self {
            Submetric::SleepDuration
            | Submetric::RestorativeSleep
            | Submetric::SleepEfficiency
            | Submetric::AwakePercent => Pillar::Sleep,
            Submetric::Steps | Submetric::MovementMinutes | Submetric::ActiveCalories => {
                Pillar::Movement
            }
            Submetric::Hrv | Submetric::RestingHeartRate | Submetric::BreathingRate => {
                Pillar::Stress
            }
        }
    }
}

/// How a submetric value relates to its optimal range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmetricStatus {
    Missing,
    Low,
    Ok,
    Optimal,
}

/// Points awarded to one submetric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmetricBreakdown {
    pub submetric: Submetric,
    pub label: String,
    /// Raw value that was scored, if present
    pub value: Option<f64>,
    pub points: u32,
    pub max_points: u32,
    pub status: SubmetricStatus,
}

impl SubmetricBreakdown {
    /// Points lost against the maximum
    pub fn points_lost(&self) -> u32 {
        self.max_points.saturating_sub(self.points)
    }

    pub fn is_present(&self) -> bool {
        self.status != SubmetricStatus::Missing
    }
}

/// Score for one pillar on one member-day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarScore {
    pub pillar: Pillar,
    /// 0-100; zero when the pillar is not valid
    pub score: u8,
    /// Points achieved by present submetrics
    pub points: u32,
    /// Maximum points of present submetrics
    pub possible_points: u32,
    pub submetrics: Vec<SubmetricBreakdown>,
    /// Whether the pillar had enough inputs to be scored
    pub is_valid: bool,
}

/// Profile risk band, the second key of the progress matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl RiskBand {
    pub const ALL: [RiskBand; 4] = [
        RiskBand::Low,
        RiskBand::Moderate,
        RiskBand::High,
        RiskBand::VeryHigh,
    ];
}

/// Vitality for one member-day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalitySnapshot {
    pub age: u32,
    pub age_group: AgeGroup,
    /// Composite 0-100, only with at least two valid pillars
    pub total_score: Option<u8>,
    /// Progress toward the age/risk target, 0-100
    pub progress_score: Option<u8>,
    /// Valid pillars, in display order
    pub pillar_scores: Vec<PillarScore>,
    pub pillars_used: u8,
    pub pillars_possible: u8,
}

impl VitalitySnapshot {
    pub fn pillar(&self, pillar: Pillar) -> Option<&PillarScore> {
        self.pillar_scores.iter().find(|p| p.pillar == pillar)
    }
}

/// Optional 0-100 value per pillar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarValues {
    #[serde(default)]
    pub sleep: Option<u8>,
    #[serde(default)]
    pub movement: Option<u8>,
    #[serde(default)]
    pub stress: Option<u8>,
}

impl PillarValues {
    pub fn get(&self, pillar: Pillar) -> Option<u8> {
        match pillar {
            Pillar::Sleep => self.sleep,
            Pillar::Movement => self.movement,
            Pillar::Stress => self.stress,
        }
    }

    pub fn has_any(&self) -> bool {
        Pillar::ALL.iter().any(|p| self.get(*p).is_some())
    }

    /// Collect the valid pillar scores of a snapshot
    pub fn from_snapshot(snapshot: &VitalitySnapshot) -> Self {
        let get = |pillar| snapshot.pillar(pillar).map(|p| p.score);
        Self {
            sleep: get(Pillar::Sleep),
            movement: get(Pillar::Movement),
            stress: get(Pillar::Stress),
        }
    }
}

/// Current scoring state of a member as known to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberScoreState {
    pub member_id: MemberId,
    /// False for pending invitations without a profile row
    #[serde(default = "default_true")]
    pub has_profile: bool,
    pub current_score: Option<u8>,
    pub optimal_score: Option<u8>,
    /// When `current_score` was computed
    pub scored_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// One member-day row of scores, as stored by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScoreRow {
    pub member_id: MemberId,
    pub date: NaiveDate,
    #[serde(default)]
    pub total: Option<u8>,
    #[serde(flatten)]
    pub pillars: PillarValues,
}
