//! Score freshness gate
//!
//! A member's current score is only shown, averaged, compared or trended
//! while it is fresh. Stale and missing members are excluded from every
//! family-level computation.

use crate::config::{FreshnessConfig, MAX_WINDOW_DAYS};
use crate::types::{MemberId, MemberScoreState};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Freshness classification of a member's current score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFreshness {
    Fresh,
    Stale,
    Missing,
}

/// Score pair to render for a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayScore {
    pub freshness: ScoreFreshness,
    pub current: u8,
    pub optimal: u8,
}

/// Classifies members by the age of their current score
#[derive(Debug, Clone)]
pub struct FreshnessGate {
    max_age: Duration,
}

impl Default for FreshnessGate {
    fn default() -> Self {
        Self::new(&FreshnessConfig::default())
    }
}

impl FreshnessGate {
    pub fn new(config: &FreshnessConfig) -> Self {
        let days = config.max_age_days.clamp(0, i64::from(MAX_WINDOW_DAYS));
        Self {
            max_age: Duration::days(days),
        }
    }

    pub fn classify(&self, state: &MemberScoreState, now: DateTime<Utc>) -> ScoreFreshness {
        if !state.has_profile || !matches!(state.current_score, Some(score) if score > 0) {
            return ScoreFreshness::Missing;
        }
        match state.scored_at {
            // A timestamp in the future yields a negative age and counts as fresh
            Some(scored_at) if now - scored_at <= self.max_age => ScoreFreshness::Fresh,
            Some(_) => ScoreFreshness::Stale,
            None => {
                debug!(member_id = %state.member_id, "score has no timestamp; treating as stale");
                ScoreFreshness::Stale
            }
        }
    }

    pub fn is_fresh(&self, state: &MemberScoreState, now: DateTime<Utc>) -> bool {
        self.classify(state, now) == ScoreFreshness::Fresh
    }

    /// Scores to render; missing members show 0/0
    pub fn display_score(&self, state: &MemberScoreState, now: DateTime<Utc>) -> DisplayScore {
        let freshness = self.classify(state, now);
        match freshness {
            ScoreFreshness::Missing => DisplayScore {
                freshness,
                current: 0,
                optimal: 0,
            },
            ScoreFreshness::Fresh | ScoreFreshness::Stale => DisplayScore {
                freshness,
                current: state.current_score.unwrap_or(0),
                optimal: state.optimal_score.unwrap_or(0),
            },
        }
    }

    /// Rounded mean of fresh members' current scores
    pub fn family_average(&self, states: &[MemberScoreState], now: DateTime<Utc>) -> Option<u8> {
        let fresh: Vec<u32> = states
            .iter()
            .filter(|s| self.is_fresh(s, now))
            .filter_map(|s| s.current_score.map(u32::from))
            .collect();
        if fresh.is_empty() {
            return None;
        }
        let sum: u32 = fresh.iter().sum();
        Some((f64::from(sum) / fresh.len() as f64).round() as u8)
    }

    /// Ids of members whose scores are fresh, in input order
    pub fn fresh_members(&self, states: &[MemberScoreState], now: DateTime<Utc>) -> Vec<MemberId> {
        states
            .iter()
            .filter(|s| self.is_fresh(s, now))
            .map(|s| s.member_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn state(score: Option<u8>, scored_at: Option<DateTime<Utc>>) -> MemberScoreState {
        MemberScoreState {
            member_id: Uuid::from_u128(1),
            has_profile: true,
            current_score: score,
            optimal_score: Some(88),
            scored_at,
        }
    }

    #[test]
    fn test_fresh_within_three_days() {
        let gate = FreshnessGate::default();
        let s = state(Some(72), Some(now() - Duration::days(3)));
        assert_eq!(gate.classify(&s, now()), ScoreFreshness::Fresh);
    }

    #[test]
    fn test_stale_after_three_days() {
        let gate = FreshnessGate::default();
        let s = state(Some(72), Some(now() - Duration::days(3) - Duration::seconds(1)));
        assert_eq!(gate.classify(&s, now()), ScoreFreshness::Stale);
        assert_eq!(gate.classify(&state(Some(72), None), now()), ScoreFreshness::Stale);
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let gate = FreshnessGate::default();
        let s = state(Some(72), Some(now() + Duration::hours(5)));
        assert_eq!(gate.classify(&s, now()), ScoreFreshness::Fresh);
    }

    #[test]
    fn test_missing_without_profile_or_score() {
        let gate = FreshnessGate::default();
        let recent = Some(now());
        assert_eq!(gate.classify(&state(None, recent), now()), ScoreFreshness::Missing);
        assert_eq!(gate.classify(&state(Some(0), recent), now()), ScoreFreshness::Missing);

        let mut pending = state(Some(80), recent);
        pending.has_profile = false;
        assert_eq!(gate.classify(&pending, now()), ScoreFreshness::Missing);

        let shown = gate.display_score(&pending, now());
        assert_eq!((shown.current, shown.optimal), (0, 0));
    }

    #[test]
    fn test_family_average_uses_fresh_only() {
        let gate = FreshnessGate::default();
        let mut stale = state(Some(40), Some(now() - Duration::days(10)));
        stale.member_id = Uuid::from_u128(2);
        let mut other = state(Some(81), Some(now() - Duration::hours(2)));
        other.member_id = Uuid::from_u128(3);
        let states = vec![state(Some(70), Some(now())), stale, other];

        assert_eq!(gate.family_average(&states, now()), Some(76));
        assert_eq!(
            gate.fresh_members(&states, now()),
            vec![Uuid::from_u128(1), Uuid::from_u128(3)]
        );
        assert_eq!(gate.family_average(&[], now()), None);
    }

    #[test]
    fn test_configurable_window() {
        let gate = FreshnessGate::new(&FreshnessConfig { max_age_days: 1 });
        let s = state(Some(72), Some(now() - Duration::days(2)));
        assert_eq!(gate.classify(&s, now()), ScoreFreshness::Stale);
    }

    #[test]
    fn test_unvalidated_max_age_is_capped() {
        let gate = FreshnessGate::new(&FreshnessConfig {
            max_age_days: i64::MAX,
        });
        let year_old = state(Some(72), Some(now() - Duration::days(300)));
        assert_eq!(gate.classify(&year_old, now()), ScoreFreshness::Fresh);
        let too_old = state(Some(72), Some(now() - Duration::days(400)));
        assert_eq!(gate.classify(&too_old, now()), ScoreFreshness::Stale);
    }
}
