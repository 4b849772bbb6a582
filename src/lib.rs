//! Workflow pattern store, lifecycle management, and recommendation engine.
//!
//! Cadence records how past tasks were solved as reusable patterns
//! (ordered capability sequences with running success metrics), promotes
//! or demotes them through a metrics-derived lifecycle
//! (discovered/validated/learned, with a terminal deprecated stage), and
//! recommends the best prior pattern for a new task description via
//! multi-factor lexical ranking.
//!
//! Persistence is dual: a durable filesystem record store is the source
//! of truth, and an optional CozoDB graph projection mirrors patterns,
//! capabilities, and executions with derived similarity and usage edges.
//! Projection writes are best-effort and never fail the durable path.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod recommend;
pub mod repository;
pub mod store;
pub mod types;

pub use config::{CadenceConfig, MatchWeights, MatchingConfig, SimilarityConfig};
pub use engine::PatternEngine;
pub use error::{CadenceError, Result};
pub use matcher::PatternMatcher;
pub use recommend::{Confidence, Recommendation};
pub use repository::PatternRepository;
pub use store::{CatalogImportReport, CozoGraph, GraphStats, PatternSearchHit};
pub use types::{
    CapabilityRecord, CapabilityStep, ExecutionRecord, ExecutionStatus, KnownIssue,
    LifecycleStage, PatternMetrics, PatternRecord, StepOutcome, WorkflowOutcome,
};
