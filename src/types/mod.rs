//! Data model for patterns, capabilities, and executions

pub mod capability;
pub mod pattern;

pub use capability::{
    CapabilityRecord, ExecutionRecord, ExecutionStatus, SimilarityEdge, UsageEdge, tag_similarity,
};
pub use pattern::{
    CapabilityStep, KnownIssue, LifecycleStage, PatternMetrics, PatternRecord, StepOutcome,
    WorkflowOutcome,
};
