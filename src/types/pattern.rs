//! Pattern records: reusable capability sequences with running metrics

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain;
use crate::matcher::extract_keywords;

/// Maximum number of task keywords stored on a pattern
const MAX_TASK_KEYWORDS: usize = 10;

/// Keywords taken from the task description to form the pattern id
const ID_KEYWORD_COUNT: usize = 5;

/// A recorded, reusable sequence of capability invocations that previously
/// solved a task, with accumulated success metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub domain: String,
    #[serde(default)]
    pub subdomain: String,
    pub task_keywords: Vec<String>,
    pub capability_sequence: Vec<CapabilityStep>,
    pub metrics: PatternMetrics,
    #[serde(default)]
    pub known_issues: Vec<KnownIssue>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub environment_requirements: Vec<String>,
    pub created: DateTime<Utc>,
    /// Refreshed on every execution; legacy records may lack it
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PatternRecord {
    /// Derive the stable pattern id from a task description.
    ///
    /// Lowercased leading keywords joined with `-`, commas stripped, `-v1`
    /// suffix. The same task signature always maps to the same id.
    pub fn id_for(task_description: &str) -> String {
        let keywords: Vec<String> = task_description
            .to_lowercase()
            .split_whitespace()
            .take(ID_KEYWORD_COUNT)
            .map(|w| w.replace(',', ""))
            .collect();
        format!("{}-v1", keywords.join("-"))
    }

    /// Create a new pattern from the first observed execution of a task.
    ///
    /// Initial metrics reflect the single run, so a new pattern always
    /// classifies as `Discovered`.
    pub fn from_outcome(outcome: &WorkflowOutcome) -> Self {
        let now = Utc::now();
        let task = &outcome.task_description;

        let mut record = Self {
            id: Self::id_for(task),
            name: task.clone(),
            description: task.clone(),
            domain: domain::infer_domain(task).to_string(),
            subdomain: String::new(),
            task_keywords: extract_keywords(task)
                .into_iter()
                .take(MAX_TASK_KEYWORDS)
                .collect(),
            capability_sequence: outcome
                .steps
                .iter()
                .map(CapabilityStep::from_outcome)
                .collect(),
            metrics: PatternMetrics::from_first_run(outcome.success, outcome.duration_minutes),
            known_issues: Vec::new(),
            tags: domain::infer_tags(task),
            environment_requirements: outcome.environment_requirements.clone(),
            created: now,
            last_updated: Some(now),
        };

        if !outcome.success {
            let issue = outcome.error.clone().unwrap_or_else(|| "Unknown error".into());
            record.record_issue(&issue);
        }

        record
    }

    /// Merge a new execution of the same task signature into this record.
    pub fn record_outcome(&mut self, outcome: &WorkflowOutcome) {
        self.metrics
            .record(outcome.success, outcome.duration_minutes);

        if !outcome.success {
            let issue = outcome.error.clone().unwrap_or_else(|| "Unknown error".into());
            self.record_issue(&issue);
        }

        self.last_updated = Some(Utc::now());
    }

    /// Record a known issue; a repeated issue text increments its frequency
    /// instead of duplicating the entry.
    pub fn record_issue(&mut self, issue: &str) {
        if let Some(existing) = self.known_issues.iter_mut().find(|k| k.issue == issue) {
            existing.frequency += 1;
            return;
        }

        self.known_issues.push(KnownIssue {
            issue: issue.to_string(),
            frequency: 1,
            fix: "Manual investigation required".to_string(),
        });
    }

    /// Lifecycle stage, derived from current metrics and never stored
    pub fn stage(&self) -> LifecycleStage {
        LifecycleStage::from_metrics(&self.metrics)
    }
}

/// One ordered step in a pattern's capability sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityStep {
    pub capability: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub avg_time: f64,
    #[serde(default)]
    pub success_rate: f64,
}

impl CapabilityStep {
    fn from_outcome(step: &StepOutcome) -> Self {
        Self {
            capability: step.capability.clone(),
            purpose: step.purpose.clone(),
            avg_time: step.duration_minutes,
            success_rate: if step.success { 1.0 } else { 0.0 },
        }
    }
}

/// Running execution metrics for a pattern.
///
/// Invariant: `successful_executions + failed_executions ==
/// total_executions` and `0 <= success_rate <= 1` after every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub success_rate: f64,
    /// Running mean of completion time in minutes
    pub avg_completion_time: f64,
}

impl PatternMetrics {
    /// Metrics after the first observed run
    pub fn from_first_run(success: bool, duration_minutes: f64) -> Self {
        Self {
            total_executions: 1,
            successful_executions: if success { 1 } else { 0 },
            failed_executions: if success { 0 } else { 1 },
            success_rate: if success { 1.0 } else { 0.0 },
            avg_completion_time: duration_minutes,
        }
    }

    /// Fold one more execution into the running metrics
    pub fn record(&mut self, success: bool, duration_minutes: f64) {
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }

        self.success_rate = self.successful_executions as f64 / self.total_executions as f64;

        let n = self.total_executions as f64;
        self.avg_completion_time = (self.avg_completion_time * (n - 1.0) + duration_minutes) / n;
    }
}

impl Default for PatternMetrics {
    fn default() -> Self {
        Self {
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            success_rate: 0.0,
            avg_completion_time: 0.0,
        }
    }
}

/// A known failure mode observed while executing a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownIssue {
    pub issue: String,
    pub frequency: u32,
    pub fix: String,
}

/// Lifecycle stage of a pattern, derived from execution metrics.
///
/// `Deprecated` is terminal and only ever set externally; the derivation
/// rule never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    Discovered,
    Validated,
    Learned,
    Deprecated,
}

impl LifecycleStage {
    /// Derive the stage from current metrics.
    ///
    /// Pure and hysteresis-free: a pattern moves backward if its success
    /// rate drops.
    pub fn from_metrics(metrics: &PatternMetrics) -> Self {
        if metrics.total_executions >= 20 && metrics.success_rate >= 0.90 {
            Self::Learned
        } else if metrics.total_executions >= 5 && metrics.success_rate >= 0.80 {
            Self::Validated
        } else {
            Self::Discovered
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Validated => "validated",
            Self::Learned => "learned",
            Self::Deprecated => "deprecated",
        }
    }

    /// Stages searched on read, in priority order (deprecated excluded)
    pub fn active_stages() -> [LifecycleStage; 3] {
        [Self::Learned, Self::Validated, Self::Discovered]
    }
}

/// Error type for parsing LifecycleStage from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLifecycleStageError(String);

impl std::fmt::Display for ParseLifecycleStageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown lifecycle stage: {}", self.0)
    }
}

impl std::error::Error for ParseLifecycleStageError {}

impl FromStr for LifecycleStage {
    type Err = ParseLifecycleStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "validated" => Ok(Self::Validated),
            "learned" => Ok(Self::Learned),
            "deprecated" => Ok(Self::Deprecated),
            _ => Err(ParseLifecycleStageError(s.to_string())),
        }
    }
}

/// The observed result of one workflow execution, as reported by the
/// orchestrator. Input to pattern extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub task_description: String,
    pub success: bool,
    #[serde(default)]
    pub duration_minutes: f64,
    #[serde(default)]
    pub steps: Vec<StepOutcome>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub environment_requirements: Vec<String>,
}

/// One capability invocation inside a workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub capability: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub duration_minutes: f64,
    pub success: bool,
}
