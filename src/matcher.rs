//! Lexical pattern matching and multi-factor ranking.
//!
//! Matching is a pure read over an in-memory snapshot of pattern records:
//! keyword overlap gates candidacy, then a weighted composite of keyword
//! coverage, success rate, usage volume, and recency ranks the candidates.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::MatchingConfig;
use crate::types::PatternRecord;

/// Fixed English stop words dropped during keyword extraction: articles,
/// prepositions, and generic task verbs that carry no signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "with", "and", "or", "for", "to", "from", "in", "on", "at", "by", "of",
    "as", "is", "are", "was", "were", "build", "create", "make", "setup", "set", "up", "my", "i",
    "me",
];

/// Minimum token length kept after stop-word removal
const MIN_TOKEN_LEN: usize = 3;

/// Extract normalized keywords from free text: lowercase, whitespace split,
/// stop words and short tokens dropped, first occurrence order preserved.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(|w| w.to_string())
        .collect()
}

/// Recency score: a step function of days since the last update.
/// Undated patterns score 0.
pub fn recency_score(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(updated) = last_updated else {
        return 0.0;
    };

    let days_ago = now.signed_duration_since(updated).num_days();
    if days_ago < 7 {
        1.0
    } else if days_ago < 30 {
        0.8
    } else if days_ago < 90 {
        0.5
    } else {
        0.2
    }
}

/// Stateless scoring engine over a loaded pattern snapshot
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    config: MatchingConfig,
}

impl PatternMatcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    /// Match a free-text request against the pattern set and return the
    /// top `top_k` candidates with composite scores in [0, 1].
    ///
    /// An empty request token set or zero candidates yields an empty
    /// result, never an error. Ties keep encounter order (stable sort).
    pub fn match_patterns(
        &self,
        request: &str,
        patterns: &[PatternRecord],
        top_k: usize,
    ) -> Vec<(PatternRecord, f64)> {
        let request_keywords: HashSet<String> = extract_keywords(request).into_iter().collect();

        if request_keywords.is_empty() {
            debug!("No keywords extracted from request");
            return Vec::new();
        }

        let now = Utc::now();
        let mut candidates: Vec<(PatternRecord, f64)> = Vec::new();

        for pattern in patterns {
            let pattern_keywords: HashSet<&str> =
                pattern.task_keywords.iter().map(String::as_str).collect();
            let overlap = request_keywords
                .iter()
                .filter(|kw| pattern_keywords.contains(kw.as_str()))
                .count();

            if overlap < self.config.min_keyword_overlap {
                continue;
            }

            let keyword_score = if pattern_keywords.is_empty() {
                0.0
            } else {
                overlap as f64 / pattern_keywords.len() as f64
            };

            let score = self.composite_score(pattern, keyword_score, now);
            candidates.push((pattern.clone(), score));
        }

        debug!(
            candidates = candidates.len(),
            "Ranked pattern candidates for request"
        );

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(top_k);
        candidates
    }

    /// Weighted sum of the normalized ranking factors
    fn composite_score(
        &self,
        pattern: &PatternRecord,
        keyword_score: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        let weights = &self.config.weights;

        let usage_norm = (pattern.metrics.total_executions as f64 / 100.0).min(1.0);
        let recency = recency_score(pattern.last_updated, now);

        keyword_score * weights.keyword_match
            + pattern.metrics.success_rate * weights.success_rate
            + usage_norm * weights.usage
            + recency * weights.recency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PatternMetrics, PatternRecord};
    use chrono::Duration;

    fn pattern(id: &str, keywords: &[&str], metrics: PatternMetrics, days_ago: i64) -> PatternRecord {
        let now = Utc::now();
        PatternRecord {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            domain: "general".into(),
            subdomain: String::new(),
            task_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            capability_sequence: vec![],
            metrics,
            known_issues: vec![],
            tags: vec![],
            environment_requirements: vec![],
            created: now,
            last_updated: Some(now - Duration::days(days_ago)),
        }
    }

    fn metrics(total: u64, success_rate: f64) -> PatternMetrics {
        let successful = (total as f64 * success_rate).round() as u64;
        PatternMetrics {
            total_executions: total,
            successful_executions: successful,
            failed_executions: total - successful,
            success_rate,
            avg_completion_time: 1.0,
        }
    }

    #[test]
    fn test_extract_keywords_drops_stop_words() {
        let keywords = extract_keywords("Build a FastAPI REST API with authentication");
        assert_eq!(keywords, vec!["fastapi", "rest", "api", "authentication"]);
    }

    #[test]
    fn test_extract_keywords_drops_short_tokens() {
        let keywords = extract_keywords("go do it now");
        assert_eq!(keywords, vec!["now"]);
    }

    #[test]
    fn test_extract_keywords_dedupes() {
        let keywords = extract_keywords("docker docker docker");
        assert_eq!(keywords, vec!["docker"]);
    }

    #[test]
    fn test_single_shared_keyword_never_matches() {
        let matcher = PatternMatcher::new(MatchingConfig::default());
        let patterns = vec![pattern("p1", &["docker", "deploy"], metrics(10, 0.9), 1)];

        let matches = matcher.match_patterns("docker something unrelated", &patterns, 3);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_two_shared_keywords_make_candidate() {
        let matcher = PatternMatcher::new(MatchingConfig::default());
        let patterns = vec![pattern("p1", &["docker", "deploy"], metrics(10, 0.9), 1)];

        let matches = matcher.match_patterns("deploy docker image", &patterns, 3);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0.id, "p1");
    }

    #[test]
    fn test_fastapi_scenario_score() {
        let matcher = PatternMatcher::new(MatchingConfig::default());
        let patterns = vec![pattern(
            "fastapi-v1",
            &["fastapi", "rest", "api", "auth"],
            metrics(10, 0.9),
            2,
        )];

        let matches =
            matcher.match_patterns("build a FastAPI REST API with authentication", &patterns, 3);
        assert_eq!(matches.len(), 1);

        // overlap {fastapi, rest, api} = 3 of 4 keywords
        // 0.75*0.4 + 0.9*0.3 + 0.1*0.2 + 1.0*0.1
        let expected = 0.75 * 0.4 + 0.9 * 0.3 + 0.1 * 0.2 + 0.1;
        assert!((matches[0].1 - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_request_yields_empty_result() {
        let matcher = PatternMatcher::new(MatchingConfig::default());
        let patterns = vec![pattern("p1", &["docker", "deploy"], metrics(10, 0.9), 1)];

        assert!(matcher.match_patterns("a the of", &patterns, 3).is_empty());
        assert!(matcher.match_patterns("", &patterns, 3).is_empty());
    }

    #[test]
    fn test_ranking_prefers_higher_success_rate() {
        let matcher = PatternMatcher::new(MatchingConfig::default());
        let patterns = vec![
            pattern("weak", &["docker", "deploy"], metrics(10, 0.2), 1),
            pattern("strong", &["docker", "deploy"], metrics(10, 0.95), 1),
        ];

        let matches = matcher.match_patterns("deploy docker image", &patterns, 3);
        assert_eq!(matches[0].0.id, "strong");
        assert_eq!(matches[1].0.id, "weak");
    }

    #[test]
    fn test_ties_keep_encounter_order() {
        let matcher = PatternMatcher::new(MatchingConfig::default());
        let patterns = vec![
            pattern("first", &["docker", "deploy"], metrics(10, 0.9), 1),
            pattern("second", &["docker", "deploy"], metrics(10, 0.9), 1),
        ];

        let matches = matcher.match_patterns("deploy docker image", &patterns, 3);
        assert_eq!(matches[0].0.id, "first");
        assert_eq!(matches[1].0.id, "second");
    }

    #[test]
    fn test_top_k_truncates() {
        let matcher = PatternMatcher::new(MatchingConfig::default());
        let patterns: Vec<PatternRecord> = (0..5)
            .map(|i| pattern(&format!("p{i}"), &["docker", "deploy"], metrics(10, 0.9), 1))
            .collect();

        let matches = matcher.match_patterns("deploy docker image", &patterns, 2);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_recency_step_function() {
        let now = Utc::now();
        assert_eq!(recency_score(Some(now - Duration::days(2)), now), 1.0);
        assert_eq!(recency_score(Some(now - Duration::days(10)), now), 0.8);
        assert_eq!(recency_score(Some(now - Duration::days(45)), now), 0.5);
        assert_eq!(recency_score(Some(now - Duration::days(200)), now), 0.2);
        assert_eq!(recency_score(None, now), 0.0);
    }

    #[test]
    fn test_usage_norm_saturates_at_one_hundred() {
        let matcher = PatternMatcher::new(MatchingConfig::default());
        let patterns = vec![pattern("busy", &["docker", "deploy"], metrics(500, 1.0), 1)];

        let matches = matcher.match_patterns("deploy docker image", &patterns, 1);
        // keyword 1.0*0.4 + success 1.0*0.3 + usage capped 1.0*0.2 + recency 1.0*0.1
        assert!((matches[0].1 - 1.0).abs() < 1e-9);
    }
}
