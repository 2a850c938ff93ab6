//! Family trend engine
//!
//! Looks at each member's pillar history over a trailing window, compares the
//! latest days against the earlier baseline and turns sustained deviations
//! into ranked insights. Output is gated on coverage: without enough days of
//! history the report carries no insights, only the coverage status, so a
//! caller can tell "still collecting" apart from "nothing to report".

use crate::baseline::{BaselineSplit, PillarHistory};
use crate::config::{FreshnessConfig, TrendConfig};
use crate::freshness::FreshnessGate;
use crate::types::{DailyScoreRow, MemberId, MemberScoreState, Pillar, PillarValues};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Severity of a trend insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSeverity {
    Celebrate,
    Watch,
    Attention,
}

impl TrendSeverity {
    /// Display rank, lower first
    fn rank(&self) -> u8 {
        match self {
            TrendSeverity::Attention => 0,
            TrendSeverity::Watch => 1,
            TrendSeverity::Celebrate => 2,
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, TrendSeverity::Watch | TrendSeverity::Attention)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A family member as seen by the trend engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendMember {
    #[serde(flatten)]
    pub state: MemberScoreState,
    /// The viewing user; never analysed and never the coverage representative
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Latest pillar scores, used for suppression and focus
    #[serde(default)]
    pub current_pillars: PillarValues,
}

impl TrendMember {
    pub fn member_id(&self) -> MemberId {
        self.state.member_id
    }

    fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("This family member")
    }
}

/// One member, one pillar, one trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendInsight {
    pub member_id: MemberId,
    pub pillar: Pillar,
    pub severity: TrendSeverity,
    pub title: String,
    pub body: String,
    pub baseline_value: f64,
    pub recent_value: f64,
    pub deviation_percent: f64,
    pub window_days: u32,
    pub min_required_days: u32,
    pub days_used: u32,
    pub longest_streak_below_optimal: u32,
    pub confidence: Confidence,
}

/// Whether the family has enough history for insights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendCoverageStatus {
    pub window_days: u32,
    pub days_available: u32,
    pub missing_days: u32,
    pub required_days_for_any_insight: u32,
    pub has_minimum_coverage: bool,
    pub representative_member: Option<MemberId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub insights: Vec<TrendInsight>,
    pub coverage: TrendCoverageStatus,
}

/// Alert produced by the server-side pattern detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPatternAlert {
    pub member_id: MemberId,
    pub pillar: Pillar,
    pub severity: TrendSeverity,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub deviation_percent: Option<f64>,
}

/// Alert shown on the family surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FamilyAlert {
    Server(ServerPatternAlert),
    Local(TrendInsight),
}

/// Single focus suggestion used when there are no trend insights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusInsight {
    pub member_id: MemberId,
    pub pillar: Pillar,
    pub pillar_score: u8,
    pub current_score: u8,
    pub optimal_score: u8,
    pub title: String,
    pub body: String,
}

/// Trend engine
#[derive(Debug, Clone, Default)]
pub struct TrendEngine {
    config: TrendConfig,
    gate: FreshnessGate,
}

impl TrendEngine {
    pub fn new(config: TrendConfig, freshness: &FreshnessConfig) -> Self {
        Self {
            config,
            gate: FreshnessGate::new(freshness),
        }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    fn is_eligible(&self, member: &TrendMember, now: DateTime<Utc>) -> bool {
        !member.is_self && self.gate.is_fresh(&member.state, now)
    }

    /// Rows inside the window, one per member-day; a later duplicate wins
    fn window_rows<'a>(
        &self,
        rows: &'a [DailyScoreRow],
        today: NaiveDate,
    ) -> BTreeMap<MemberId, BTreeMap<NaiveDate, &'a DailyScoreRow>> {
        let start = today
            .checked_sub_signed(Duration::days(i64::from(self.config.window_days) - 1))
            .unwrap_or(NaiveDate::MIN);
        let mut by_member: BTreeMap<MemberId, BTreeMap<NaiveDate, &DailyScoreRow>> =
            BTreeMap::new();
        for row in rows.iter().filter(|r| r.date >= start && r.date <= today) {
            by_member
                .entry(row.member_id)
                .or_default()
                .insert(row.date, row);
        }
        by_member
    }

    /// Coverage over eligible members
    pub fn coverage(
        &self,
        members: &[TrendMember],
        rows: &[DailyScoreRow],
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> TrendCoverageStatus {
        let windowed = self.window_rows(rows, today);
        self.coverage_from(members, &windowed, now)
    }

    fn coverage_from(
        &self,
        members: &[TrendMember],
        windowed: &BTreeMap<MemberId, BTreeMap<NaiveDate, &DailyScoreRow>>,
        now: DateTime<Utc>,
    ) -> TrendCoverageStatus {
        let mut representative: Option<(MemberId, u32)> = None;
        for member in members.iter().filter(|m| self.is_eligible(m, now)) {
            let id = member.member_id();
            let days = windowed.get(&id).map_or(0, |d| d.len() as u32);
            let better = match representative {
                None => true,
                Some((best_id, best_days)) => days > best_days || (days == best_days && id < best_id),
            };
            if better {
                representative = Some((id, days));
            }
        }

        let days_available = representative.map_or(0, |(_, d)| d);
        let window_days = self.config.window_days;
        TrendCoverageStatus {
            window_days,
            days_available,
            missing_days: window_days.saturating_sub(days_available),
            required_days_for_any_insight: self.config.min_days,
            has_minimum_coverage: days_available >= self.config.min_days,
            representative_member: representative.map(|(id, _)| id),
        }
    }

    /// Compute ranked insights for eligible members
    pub fn compute_trends(
        &self,
        members: &[TrendMember],
        rows: &[DailyScoreRow],
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> TrendReport {
        let windowed = self.window_rows(rows, today);
        let coverage = self.coverage_from(members, &windowed, now);

        if !coverage.has_minimum_coverage {
            debug!(
                days_available = coverage.days_available,
                required = coverage.required_days_for_any_insight,
                "trend coverage below minimum"
            );
            return TrendReport {
                insights: Vec::new(),
                coverage,
            };
        }

        let mut insights = Vec::new();
        let mut seen: HashSet<MemberId> = HashSet::new();
        for member in members.iter().filter(|m| self.is_eligible(m, now)) {
            if !seen.insert(member.member_id()) {
                continue;
            }
            let Some(days) = windowed.get(&member.member_id()) else {
                continue;
            };
            for pillar in Pillar::ALL {
                if let Some(insight) = self.pillar_insight(member, pillar, days) {
                    insights.push(insight);
                }
            }
        }

        insights.sort_by(compare_insights);
        TrendReport { insights, coverage }
    }

    fn pillar_insight(
        &self,
        member: &TrendMember,
        pillar: Pillar,
        days: &BTreeMap<NaiveDate, &DailyScoreRow>,
    ) -> Option<TrendInsight> {
        let cfg = &self.config;
        let mut history = PillarHistory::new(days.len());
        for (date, row) in days {
            if let Some(value) = row.pillars.get(pillar) {
                history.push(*date, f64::from(value));
            }
        }

        let days_used = history.len() as u32;
        if days_used < cfg.min_days {
            return None;
        }

        let split = history.split(cfg.recent_min_days, cfg.recent_max_days)?;
        let deviation = split.deviation()?;
        let streak =
            history.longest_streak_below(f64::from(cfg.optimal_threshold), split.recent_days);

        let severity = if deviation >= cfg.celebrate_deviation {
            TrendSeverity::Celebrate
        } else if deviation <= -cfg.attention_deviation {
            TrendSeverity::Attention
        } else if deviation <= -cfg.watch_deviation {
            if streak >= cfg.escalation_streak_days {
                TrendSeverity::Attention
            } else {
                TrendSeverity::Watch
            }
        } else {
            return None;
        };

        if severity.is_negative() {
            if let Some(current) = member.current_pillars.get(pillar) {
                if current >= cfg.suppression_score {
                    debug!(
                        member_id = %member.member_id(),
                        pillar = pillar.as_str(),
                        current,
                        "suppressing negative trend; current score already high"
                    );
                    return None;
                }
            }
        }

        let confidence = if days_used >= cfg.high_confidence_days {
            Confidence::High
        } else if days_used >= cfg.medium_confidence_days {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        let deviation_percent = deviation * 100.0;
        let (title, body) = insight_copy(member.name(), pillar, severity, &split, deviation_percent);

        Some(TrendInsight {
            member_id: member.member_id(),
            pillar,
            severity,
            title,
            body,
            baseline_value: split.baseline,
            recent_value: split.recent,
            deviation_percent,
            window_days: cfg.window_days,
            min_required_days: cfg.min_days,
            days_used,
            longest_streak_below_optimal: streak,
            confidence,
        })
    }

    /// Weakest-pillar suggestion for each eligible member below target
    pub fn fallback_focus(&self, members: &[TrendMember], now: DateTime<Utc>) -> Vec<FocusInsight> {
        let cfg = &self.config;
        let mut focus: Vec<FocusInsight> = members
            .iter()
            .filter(|m| self.is_eligible(m, now))
            .filter_map(|member| {
                let current = member.state.current_score?;
                let optimal = member.state.optimal_score.filter(|o| *o > 0)?;
                if f64::from(current) / f64::from(optimal) >= cfg.focus_ratio {
                    return None;
                }

                let (pillar, pillar_score) = Pillar::ALL
                    .iter()
                    .filter_map(|p| member.current_pillars.get(*p).map(|v| (*p, v)))
                    .min_by_key(|(_, v)| *v)?;
                if pillar_score >= cfg.focus_pillar_ceiling {
                    return None;
                }

                Some(FocusInsight {
                    member_id: member.member_id(),
                    pillar,
                    pillar_score,
                    current_score: current,
                    optimal_score: optimal,
                    title: format!("Focus on {}", pillar.label().to_lowercase()),
                    body: format!(
                        "{} has the most room to grow in {} ({} today).",
                        member.name(),
                        pillar.label().to_lowercase(),
                        pillar_score
                    ),
                })
            })
            .collect();

        focus.sort_by(|a, b| {
            a.pillar_score
                .cmp(&b.pillar_score)
                .then_with(|| a.member_id.cmp(&b.member_id))
        });
        focus
    }
}

fn insight_copy(
    name: &str,
    pillar: Pillar,
    severity: TrendSeverity,
    split: &BaselineSplit,
    deviation_percent: f64,
) -> (String, String) {
    let pillar_name = pillar.label().to_lowercase();
    let title = match severity {
        TrendSeverity::Celebrate => format!("{} is trending up", pillar.label()),
        TrendSeverity::Watch => format!("{} is slipping", pillar.label()),
        TrendSeverity::Attention => format!("{} needs attention", pillar.label()),
    };
    let direction = if deviation_percent >= 0.0 { "up" } else { "down" };
    let body = format!(
        "{}'s {} is {} {:.0}% over the last {} days ({:.0} vs {:.0}).",
        name,
        pillar_name,
        direction,
        deviation_percent.abs(),
        split.recent_days,
        split.recent,
        split.baseline
    );
    (title, body)
}

fn compare_insights(a: &TrendInsight, b: &TrendInsight) -> Ordering {
    a.severity
        .rank()
        .cmp(&b.severity.rank())
        .then_with(|| {
            b.deviation_percent
                .abs()
                .partial_cmp(&a.deviation_percent.abs())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.member_id.cmp(&b.member_id))
        .then_with(|| a.pillar.cmp(&b.pillar))
}

/// Combine server alerts with local insights.
///
/// When the server has produced anything, local celebrations are dropped and
/// local insights for a member/pillar the server already covers are dropped.
/// Server alerts come first.
pub fn merge_alerts(server: Vec<ServerPatternAlert>, local: Vec<TrendInsight>) -> Vec<FamilyAlert> {
    if server.is_empty() {
        return local.into_iter().map(FamilyAlert::Local).collect();
    }

    let covered: HashSet<(MemberId, Pillar)> = server
        .iter()
        .map(|alert| (alert.member_id, alert.pillar))
        .collect();

    let mut merged: Vec<FamilyAlert> = server.into_iter().map(FamilyAlert::Server).collect();
    merged.extend(
        local
            .into_iter()
            .filter(|insight| insight.severity != TrendSeverity::Celebrate)
            .filter(|insight| !covered.contains(&(insight.member_id, insight.pillar)))
            .map(FamilyAlert::Local),
    );
    merged
}
