//! Capability catalog records and the derived graph relations

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pattern::CapabilityStep;

fn default_category() -> String {
    "general".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_marketplace() -> String {
    "unknown".to_string()
}

/// A capability record as supplied by the catalog feed.
///
/// Only `name` is required; every other field defaults when the feed
/// omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_marketplace")]
    pub marketplace_source: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub success_rate: f64,
}

impl CapabilityRecord {
    /// Parse a JSON array catalog feed entry-by-entry.
    ///
    /// A malformed entry is skipped with its reason collected; the rest of
    /// the batch still parses.
    pub fn parse_feed(json: &str) -> crate::Result<(Vec<CapabilityRecord>, Vec<String>)> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| crate::CadenceError::Serialization(format!("Invalid feed JSON: {e}")))?;

        let mut records = Vec::new();
        let mut skipped = Vec::new();

        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<CapabilityRecord>(value) {
                Ok(record) => records.push(record),
                Err(e) => skipped.push(format!("entry {index}: {e}")),
            }
        }

        Ok((records, skipped))
    }
}

/// Jaccard-style tag overlap between two capabilities.
///
/// Returns the ratio `|shared| / |union|` and the sorted shared-tag set.
/// Both ratios are 0 when either side has no tags.
pub fn tag_similarity(a: &[String], b: &[String]) -> (f64, Vec<String>) {
    let set_a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: BTreeSet<&str> = b.iter().map(String::as_str).collect();

    if set_a.is_empty() || set_b.is_empty() {
        return (0.0, Vec::new());
    }

    let shared: Vec<String> = set_a
        .intersection(&set_b)
        .map(|s| s.to_string())
        .collect();
    let union_size = set_a.union(&set_b).count();

    (shared.len() as f64 / union_size as f64, shared)
}

/// Undirected, fully derived similarity relation between two capabilities.
/// Keys are kept in canonical order (`a < b`) so a pair maps to one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub a: String,
    pub b: String,
    pub similarity_score: f64,
    pub shared_tags: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

/// Directed relation recording that a pattern's step N invokes a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEdge {
    pub pattern_id: String,
    pub capability: String,
    pub step_number: usize,
    pub required: bool,
    pub purpose: String,
}

impl UsageEdge {
    /// One edge per sequence step, numbered from 1
    pub fn from_sequence(pattern_id: &str, sequence: &[CapabilityStep]) -> Vec<UsageEdge> {
        sequence
            .iter()
            .enumerate()
            .filter(|(_, step)| !step.capability.is_empty())
            .map(|(i, step)| UsageEdge {
                pattern_id: pattern_id.to_string(),
                capability: step.capability.clone(),
                step_number: i + 1,
                required: true,
                purpose: step.purpose.clone(),
            })
            .collect()
    }
}

/// Outcome status of one pattern execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// One pattern run, immutable once created. Linked to exactly one pattern
/// via an IMPLEMENTS relation in the graph projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub task_description: String,
    pub status: ExecutionStatus,
    pub duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub error_message: String,
}

impl ExecutionRecord {
    /// Create a record for a just-completed run.
    ///
    /// Duration is reported in minutes by the orchestrator and stored in
    /// milliseconds.
    pub fn new(task_description: &str, status: ExecutionStatus, duration_minutes: f64) -> Self {
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let execution_id = format!("exec_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8]);

        Self {
            execution_id,
            task_description: task_description.to_string(),
            status,
            duration_ms: (duration_minutes * 60_000.0) as i64,
            started_at: now,
            completed_at: now,
            error_message: match status {
                ExecutionStatus::Success => String::new(),
                ExecutionStatus::Failed => "Execution failed".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_feed_defaults_applied() {
        let record: CapabilityRecord =
            serde_json::from_str(r#"{"name": "docker-builder"}"#).unwrap();
        assert_eq!(record.name, "docker-builder");
        assert_eq!(record.category, "general");
        assert_eq!(record.version, "1.0.0");
        assert_eq!(record.marketplace_source, "unknown");
        assert!(record.tags.is_empty());
        assert_eq!(record.success_rate, 0.0);
    }

    #[test]
    fn test_parse_feed_skips_malformed_entries() {
        let feed = r#"[
            {"name": "docker-builder", "tags": ["docker"]},
            {"description": "missing the name field"},
            {"name": "test-runner", "category": "testing"}
        ]"#;

        let (records, skipped) = CapabilityRecord::parse_feed(feed).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].contains("entry 1"));
    }

    #[test]
    fn test_parse_feed_rejects_non_array() {
        let result = CapabilityRecord::parse_feed(r#"{"name": "not-a-list"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_tag_similarity_scenario() {
        // {docker, containers} x {docker, kubernetes}: shared 1, union 3
        let (score, shared) = tag_similarity(
            &tags(&["docker", "containers"]),
            &tags(&["docker", "kubernetes"]),
        );
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(shared, vec!["docker".to_string()]);
    }

    #[test]
    fn test_tag_similarity_empty_side() {
        let (score, shared) = tag_similarity(&tags(&["docker"]), &[]);
        assert_eq!(score, 0.0);
        assert!(shared.is_empty());
    }

    #[test]
    fn test_tag_similarity_ignores_duplicates() {
        let (score, _) = tag_similarity(
            &tags(&["docker", "docker"]),
            &tags(&["docker"]),
        );
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_usage_edges_numbered_from_one() {
        let sequence = vec![
            CapabilityStep {
                capability: "scaffold".into(),
                purpose: "setup".into(),
                avg_time: 1.0,
                success_rate: 1.0,
            },
            CapabilityStep {
                capability: "deploy".into(),
                purpose: "ship".into(),
                avg_time: 2.0,
                success_rate: 1.0,
            },
        ];

        let edges = UsageEdge::from_sequence("p-v1", &sequence);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].step_number, 1);
        assert_eq!(edges[1].step_number, 2);
        assert!(edges.iter().all(|e| e.required));
    }

    #[test]
    fn test_usage_edges_skip_unnamed_steps() {
        let sequence = vec![CapabilityStep {
            capability: String::new(),
            purpose: "mystery".into(),
            avg_time: 0.0,
            success_rate: 0.0,
        }];
        assert!(UsageEdge::from_sequence("p-v1", &sequence).is_empty());
    }

    #[test]
    fn test_execution_record_id_shape() {
        let record = ExecutionRecord::new("deploy service", ExecutionStatus::Success, 2.0);
        assert!(record.execution_id.starts_with("exec_"));
        assert_eq!(record.duration_ms, 120_000);
        assert!(record.error_message.is_empty());
    }

    #[test]
    fn test_execution_status_roundtrip() {
        for status in [ExecutionStatus::Success, ExecutionStatus::Failed] {
            assert_eq!(ExecutionStatus::from_str(status.as_str()).unwrap(), status);
        }
    }
}
