//! Family badge engine
//!
//! Compares fresh members' daily score rows and picks one winner per badge.
//! Daily badges reward day-over-day improvement; weekly badges reward the
//! week's averages, consistency, streaks and data completeness. Every winner
//! is chosen deterministically: ties fall through to a secondary value and
//! finally to the member id.

use crate::config::{BadgeConfig, FreshnessConfig};
use crate::freshness::FreshnessGate;
use crate::types::{DailyScoreRow, MemberId, MemberScoreState, Pillar};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Closed badge catalog, declared in display priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    MostImprovedSleep,
    MostImprovedMovement,
    BestRecovery,
    VitalityMvp,
    SleepChampion,
    MovementChampion,
    StressChampion,
    Comeback,
    Consistency,
    StreakLeader,
    DataCompleteness,
}

impl BadgeKind {
    pub const DAILY: [BadgeKind; 3] = [
        BadgeKind::MostImprovedSleep,
        BadgeKind::MostImprovedMovement,
        BadgeKind::BestRecovery,
    ];

    pub const WEEKLY: [BadgeKind; 8] = [
        BadgeKind::VitalityMvp,
        BadgeKind::SleepChampion,
        BadgeKind::MovementChampion,
        BadgeKind::StressChampion,
        BadgeKind::Comeback,
        BadgeKind::Consistency,
        BadgeKind::StreakLeader,
        BadgeKind::DataCompleteness,
    ];

    pub fn period(&self) -> BadgePeriod {
        if Self::DAILY.contains(self) {
            BadgePeriod::Daily
        } else {
            BadgePeriod::Weekly
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BadgeKind::MostImprovedSleep => "Most improved sleep",
            BadgeKind::MostImprovedMovement => "Most improved movement",
            BadgeKind::BestRecovery => "Best recovery",
            BadgeKind::VitalityMvp => "Vitality MVP",
            BadgeKind::SleepChampion => "Sleep champion",
            BadgeKind::MovementChampion => "Movement champion",
            BadgeKind::StressChampion => "Stress champion",
            BadgeKind::Comeback => "Comeback of the week",
            BadgeKind::Consistency => "Most consistent",
            BadgeKind::StreakLeader => "Streak leader",
            BadgeKind::DataCompleteness => "Data completeness",
        }
    }

    fn champion_pillar(&self) -> Option<Pillar> {
        match self {
            BadgeKind::SleepChampion => Some(Pillar::Sleep),
            BadgeKind::MovementChampion => Some(Pillar::Movement),
            BadgeKind::StressChampion => Some(Pillar::Stress),
            _ => None,
        }
    }

    fn daily_pillar(&self) -> Option<Pillar> {
        match self {
            BadgeKind::MostImprovedSleep => Some(Pillar::Sleep),
            BadgeKind::MostImprovedMovement => Some(Pillar::Movement),
            BadgeKind::BestRecovery => Some(Pillar::Stress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgePeriod {
    Daily,
    Weekly,
}

/// Typed payload attached to a winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BadgeMetadata {
    Improvement {
        previous: u8,
        current: u8,
        percent_increase: f64,
    },
    WeeklyAverage {
        average: f64,
        days: u32,
    },
    Comeback {
        previous_average: f64,
        current_average: f64,
        percent_increase: f64,
    },
    Consistency {
        std_dev: f64,
        average: f64,
        days: u32,
    },
    Streak {
        streak_days: u32,
    },
    Completeness {
        days_with_data: u32,
        window_days: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeWinner {
    pub badge: BadgeKind,
    pub period: BadgePeriod,
    pub member_id: MemberId,
    pub metadata: BadgeMetadata,
}

/// A weekly set already stored by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedWeeklyBadges {
    pub week_start: NaiveDate,
    pub winners: Vec<BadgeWinner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeSource {
    Persisted,
    Computed,
}

/// Weekly winners to show, and whether the caller should store them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyResolution {
    pub week_start: NaiveDate,
    pub winners: Vec<BadgeWinner>,
    pub source: BadgeSource,
    pub persist: bool,
}

/// Monday of the week containing `date`
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Pick between a persisted weekly set and a freshly computed one.
///
/// A persisted set for the same week is reused once it holds at least
/// `min_persisted` winners, reordered by badge priority. Otherwise the
/// computed set is returned, and only an admin caller is told to persist it.
pub fn resolve_weekly(
    persisted: Option<PersistedWeeklyBadges>,
    computed: Vec<BadgeWinner>,
    week_start: NaiveDate,
    role: CallerRole,
    min_persisted: usize,
) -> WeeklyResolution {
    if let Some(mut stored) = persisted {
        if stored.week_start == week_start && stored.winners.len() >= min_persisted {
            stored.winners.sort_by_key(|w| w.badge);
            return WeeklyResolution {
                week_start,
                winners: stored.winners,
                source: BadgeSource::Persisted,
                persist: false,
            };
        }
        debug!(
            stored_week = %stored.week_start,
            stored_winners = stored.winners.len(),
            "persisted weekly badges not reusable; recomputing"
        );
    }
    WeeklyResolution {
        week_start,
        winners: computed,
        source: BadgeSource::Computed,
        persist: role == CallerRole::Admin,
    }
}

/// Candidate ranked by a primary value, then a secondary value, then id
struct Candidate {
    member_id: MemberId,
    primary: f64,
    secondary: f64,
    metadata: BadgeMetadata,
}

fn pick(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.into_iter().min_by(|a, b| {
        b.primary
            .partial_cmp(&a.primary)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.secondary.partial_cmp(&a.secondary).unwrap_or(Ordering::Equal))
            .then_with(|| a.member_id.cmp(&b.member_id))
    })
}

type MemberDays<'a> = BTreeMap<MemberId, BTreeMap<NaiveDate, &'a DailyScoreRow>>;

/// Values of the rows dated within `start..=end`
fn values_in<F>(
    by_date: &BTreeMap<NaiveDate, &DailyScoreRow>,
    start: NaiveDate,
    end: NaiveDate,
    value: F,
) -> Vec<f64>
where
    F: Fn(&DailyScoreRow) -> Option<u8>,
{
    by_date
        .range(start..=end)
        .filter_map(|(_, row)| value(row).map(f64::from))
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Badge engine
#[derive(Debug, Clone, Default)]
pub struct BadgeEngine {
    config: BadgeConfig,
    gate: FreshnessGate,
}

impl BadgeEngine {
    pub fn new(config: BadgeConfig, freshness: &FreshnessConfig) -> Self {
        Self {
            config,
            gate: FreshnessGate::new(freshness),
        }
    }

    pub fn config(&self) -> &BadgeConfig {
        &self.config
    }

    /// Rows of fresh members keyed by member and date; a later duplicate wins
    fn eligible_rows<'a>(
        &self,
        members: &[MemberScoreState],
        rows: &'a [DailyScoreRow],
        now: DateTime<Utc>,
    ) -> MemberDays<'a> {
        let fresh: HashSet<MemberId> = self.gate.fresh_members(members, now).into_iter().collect();
        let mut by_member: MemberDays<'a> = BTreeMap::new();
        for row in rows.iter().filter(|r| fresh.contains(&r.member_id)) {
            by_member
                .entry(row.member_id)
                .or_default()
                .insert(row.date, row);
        }
        by_member
    }

    /// Daily improvement badges for `today` against the day before
    pub fn compute_daily(
        &self,
        members: &[MemberScoreState],
        rows: &[DailyScoreRow],
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Vec<BadgeWinner> {
        let days = self.eligible_rows(members, rows, now);
        let Some(yesterday) = today.pred_opt() else {
            return Vec::new();
        };

        let mut winners = Vec::new();
        for badge in BadgeKind::DAILY {
            let Some(pillar) = badge.daily_pillar() else {
                continue;
            };
            let candidates = days
                .iter()
                .filter_map(|(member_id, by_date)| {
                    let current = by_date.get(&today)?.pillars.get(pillar)?;
                    let previous = by_date.get(&yesterday)?.pillars.get(pillar)?;
                    if previous == 0 {
                        return None;
                    }
                    let percent_increase =
                        (f64::from(current) - f64::from(previous)) / f64::from(previous) * 100.0;
                    if percent_increase <= 0.0 {
                        return None;
                    }
                    Some(Candidate {
                        member_id: *member_id,
                        primary: percent_increase,
                        secondary: f64::from(current),
                        metadata: BadgeMetadata::Improvement {
                            previous,
                            current,
                            percent_increase,
                        },
                    })
                })
                .collect();

            match pick(candidates) {
                Some(winner) => winners.push(BadgeWinner {
                    badge,
                    period: BadgePeriod::Daily,
                    member_id: winner.member_id,
                    metadata: winner.metadata,
                }),
                None => debug!(badge = badge.label(), "no positive improvement; badge omitted"),
            }
        }
        winners
    }

    /// Weekly badges for the week starting `week_start` (a Monday)
    pub fn compute_weekly(
        &self,
        members: &[MemberScoreState],
        rows: &[DailyScoreRow],
        week_start: NaiveDate,
        now: DateTime<Utc>,
    ) -> Vec<BadgeWinner> {
        let days = self.eligible_rows(members, rows, now);
        let week_end = week_start + Duration::days(6);
        let previous_start = week_start - Duration::days(7);
        let window_start = |days: u32| {
            week_end
                .checked_sub_signed(Duration::days(i64::from(days) - 1))
                .unwrap_or(NaiveDate::MIN)
        };
        let streak_start = window_start(self.config.streak_window_days);
        let completeness_start = window_start(self.config.completeness_window_days);

        let mut winners = Vec::new();
        for badge in BadgeKind::WEEKLY {
            let candidates: Vec<Candidate> = days
                .iter()
                .filter_map(|(member_id, by_date)| {
                    let member_id = *member_id;
                    match badge {
                        BadgeKind::VitalityMvp
                        | BadgeKind::SleepChampion
                        | BadgeKind::MovementChampion
                        | BadgeKind::StressChampion => {
                            let values = match badge.champion_pillar() {
                                Some(pillar) => values_in(by_date, week_start, week_end, |r| {
                                    r.pillars.get(pillar)
                                }),
                                None => values_in(by_date, week_start, week_end, |r| r.total),
                            };
                            let average = mean(&values)?;
                            Some(Candidate {
                                member_id,
                                primary: average,
                                secondary: values.len() as f64,
                                metadata: BadgeMetadata::WeeklyAverage {
                                    average,
                                    days: values.len() as u32,
                                },
                            })
                        }
                        BadgeKind::Comeback => {
                            let current =
                                mean(&values_in(by_date, week_start, week_end, |r| r.total))?;
                            let previous = mean(&values_in(
                                by_date,
                                previous_start,
                                week_start - Duration::days(1),
                                |r| r.total,
                            ))?;
                            if previous <= 0.0 {
                                return None;
                            }
                            let percent_increase = (current - previous) / previous * 100.0;
                            if percent_increase <= 0.0 {
                                return None;
                            }
                            Some(Candidate {
                                member_id,
                                primary: percent_increase,
                                secondary: current,
                                metadata: BadgeMetadata::Comeback {
                                    previous_average: previous,
                                    current_average: current,
                                    percent_increase,
                                },
                            })
                        }
                        BadgeKind::Consistency => {
                            let values = values_in(by_date, week_start, week_end, |r| r.total);
                            if values.len() < self.config.consistency_min_days {
                                return None;
                            }
                            let average = mean(&values)?;
                            let variance = values.iter().map(|v| (v - average).powi(2)).sum::<f64>()
                                / values.len() as f64;
                            let std_dev = variance.sqrt();
                            Some(Candidate {
                                member_id,
                                primary: -std_dev,
                                secondary: average,
                                metadata: BadgeMetadata::Consistency {
                                    std_dev,
                                    average,
                                    days: values.len() as u32,
                                },
                            })
                        }
                        BadgeKind::StreakLeader => {
                            let streak = self.longest_streak(by_date, streak_start, week_end);
                            if streak < self.config.streak_min_days {
                                return None;
                            }
                            Some(Candidate {
                                member_id,
                                primary: f64::from(streak),
                                secondary: 0.0,
                                metadata: BadgeMetadata::Streak {
                                    streak_days: streak,
                                },
                            })
                        }
                        BadgeKind::DataCompleteness => {
                            let days_with_data =
                                values_in(by_date, completeness_start, week_end, |r| r.total)
                                    .len() as u32;
                            if days_with_data == 0 {
                                return None;
                            }
                            Some(Candidate {
                                member_id,
                                primary: f64::from(days_with_data),
                                secondary: 0.0,
                                metadata: BadgeMetadata::Completeness {
                                    days_with_data,
                                    window_days: self.config.completeness_window_days,
                                },
                            })
                        }
                        BadgeKind::MostImprovedSleep
                        | BadgeKind::MostImprovedMovement
                        | BadgeKind::BestRecovery => None,
                    }
                })
                .collect();

            if let Some(winner) = pick(candidates) {
                winners.push(BadgeWinner {
                    badge,
                    period: BadgePeriod::Weekly,
                    member_id: winner.member_id,
                    metadata: winner.metadata,
                });
            }
        }
        winners
    }

    /// Longest run of consecutive days with a total at or above the threshold
    fn longest_streak(
        &self,
        by_date: &BTreeMap<NaiveDate, &DailyScoreRow>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> u32 {
        let threshold = self.config.streak_threshold;
        let mut longest = 0u32;
        let mut current = 0u32;
        let mut day = start;
        while day <= end {
            let hit = by_date
                .get(&day)
                .and_then(|row| row.total)
                .is_some_and(|total| total >= threshold);
            current = if hit { current + 1 } else { 0 };
            longest = longest.max(current);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        longest
    }
}
