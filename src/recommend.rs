//! Turns a ranked match list into a confidence-annotated recommendation

use serde::{Deserialize, Serialize};

use crate::types::PatternRecord;

/// Score below which the gap to the runner-up is considered too close to
/// call without mentioning the alternative
const CLOSE_ALTERNATIVE_GAP: f64 = 0.1;

/// Confidence bucket for the top-ranked match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    fn for_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// The top recommendation with a human-readable explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub pattern: PatternRecord,
    pub score: f64,
    pub confidence: Confidence,
    pub explanation: String,
}

/// Pure function over a ranked match list; `None` when the list is empty.
pub fn recommend(matches: &[(PatternRecord, f64)]) -> Option<Recommendation> {
    let (top_pattern, top_score) = matches.first()?;

    let confidence = Confidence::for_score(*top_score);
    let mut explanation = match confidence {
        Confidence::High => "Strong match on keywords, high success rate, and well-tested",
        Confidence::Medium => "Good keyword match and reasonable success rate",
        Confidence::Low => "Partial keyword match, consider if this is the right pattern",
    }
    .to_string();

    if let Some((_, second_score)) = matches.get(1) {
        if top_score - second_score < CLOSE_ALTERNATIVE_GAP {
            explanation.push_str(". Note: Very close alternative available (see Match 2)");
        }
    }

    Some(Recommendation {
        pattern: top_pattern.clone(),
        score: *top_score,
        confidence,
        explanation,
    })
}
