//! Score explanations
//!
//! Post-processes pillar scores into a per-pillar limiting factor and a
//! human-readable summary. Nothing here changes a score.

use crate::types::{Pillar, PillarScore, Submetric, SubmetricBreakdown};
use serde::{Deserialize, Serialize};

/// The submetric costing the most points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitingFactor {
    pub pillar: Pillar,
    pub submetric: Submetric,
    pub label: String,
    pub points_lost: u32,
    pub value: Option<f64>,
}

/// Explanation for one pillar, valid or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarExplanation {
    pub pillar: Pillar,
    pub score: PillarScore,
    pub limiting_factor: Option<LimitingFactor>,
    pub sentence: String,
}

/// Full explanation of a scored day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub pillars: Vec<PillarExplanation>,
    pub overall_limiting_factor: Option<LimitingFactor>,
    pub summary: String,
}

/// Largest point loss among present submetrics; earlier submetrics win ties
fn pillar_limiting_factor(score: &PillarScore) -> Option<LimitingFactor> {
    let mut best: Option<&SubmetricBreakdown> = None;
    for entry in score.submetrics.iter().filter(|s| s.is_present()) {
        let lost = entry.points_lost();
        if lost == 0 {
            continue;
        }
        if best.map_or(true, |b| lost > b.points_lost()) {
            best = Some(entry);
        }
    }
    best.map(|entry| LimitingFactor {
        pillar: score.pillar,
        submetric: entry.submetric,
        label: entry.label.clone(),
        points_lost: entry.points_lost(),
        value: entry.value,
    })
}

fn pillar_sentence(score: &PillarScore, factor: Option<&LimitingFactor>) -> String {
    if !score.is_valid {
        return format!("{} was not scored: not enough data.", score.pillar.label());
    }
    match factor {
        Some(f) => format!(
            "{} scored {}. {} is the main limiting factor.",
            score.pillar.label(),
            score.score,
            f.label
        ),
        None => format!(
            "{} scored {} with every measured input in range.",
            score.pillar.label(),
            score.score
        ),
    }
}

/// Build the breakdown for all pillars
pub fn explain(pillars: &[PillarScore]) -> ScoreBreakdown {
    let explanations: Vec<PillarExplanation> = pillars
        .iter()
        .map(|score| {
            let limiting_factor = if score.is_valid {
                pillar_limiting_factor(score)
            } else {
                None
            };
            let sentence = pillar_sentence(score, limiting_factor.as_ref());
            PillarExplanation {
                pillar: score.pillar,
                score: score.clone(),
                limiting_factor,
                sentence,
            }
        })
        .collect();

    let mut overall: Option<&LimitingFactor> = None;
    for factor in explanations.iter().filter_map(|e| e.limiting_factor.as_ref()) {
        if overall.map_or(true, |o| factor.points_lost > o.points_lost) {
            overall = Some(factor);
        }
    }
    let overall_limiting_factor = overall.cloned();

    let summary = match &overall_limiting_factor {
        Some(f) => format!(
            "{} is the main limiting factor across pillars ({} points lost in {}).",
            f.label,
            f.points_lost,
            f.pillar.label()
        ),
        None => "Every measured input is in its optimal range.".to_string(),
    };

    ScoreBreakdown {
        pillars: explanations,
        overall_limiting_factor,
        summary,
    }
}
