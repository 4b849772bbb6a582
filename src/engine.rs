//! Engine facade wiring the repository, matcher, and recommender together

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::CadenceConfig;
use crate::matcher::PatternMatcher;
use crate::recommend::{self, Recommendation};
use crate::repository::PatternRepository;
use crate::store::{CatalogImportReport, CozoGraph, GraphStats};
use crate::types::{CapabilityRecord, ExecutionStatus, PatternRecord, WorkflowOutcome};
use crate::Result;

/// Top-level entry point: records workflow outcomes into the pattern
/// library and recommends prior patterns for new requests.
///
/// Construction takes an explicit configuration object. The graph
/// projection is optional; when its database cannot be opened the engine
/// runs without it rather than failing startup.
pub struct PatternEngine {
    config: CadenceConfig,
    repository: PatternRepository,
    matcher: PatternMatcher,
    graph: Option<Arc<CozoGraph>>,
}

impl PatternEngine {
    pub async fn new(config: CadenceConfig) -> Result<Self> {
        let graph = match &config.graph_db_path {
            Some(path) => match CozoGraph::open(path).await {
                Ok(graph) => Some(Arc::new(graph)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Graph projection unavailable, continuing without it");
                    None
                }
            },
            None => None,
        };

        let mut repository = PatternRepository::new(&config)?;
        if let Some(graph) = &graph {
            repository = repository.with_graph(Arc::clone(graph));
        }

        let matcher = PatternMatcher::new(config.matching.clone());

        Ok(Self {
            config,
            repository,
            matcher,
            graph,
        })
    }

    /// Whether a graph projection is attached
    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Direct access to the durable record store
    pub fn repository(&self) -> &PatternRepository {
        &self.repository
    }

    /// The ranked match list for a request, best first
    pub async fn matches(&self, request: &str, top_k: usize) -> Result<Vec<(PatternRecord, f64)>> {
        let patterns = self.repository.load_all().await?;
        Ok(self.matcher.match_patterns(request, &patterns, top_k))
    }

    /// Recommend the best prior pattern for a request, or `None` when
    /// nothing in the library qualifies.
    pub async fn recommend(&self, request: &str) -> Result<Option<Recommendation>> {
        let matches = self.matches(request, self.config.matching.top_k).await?;
        Ok(recommend::recommend(&matches))
    }

    /// Fold a completed workflow into the library: extract or merge the
    /// pattern, persist it at its derived stage, and log the execution.
    pub async fn record_workflow(&self, outcome: &WorkflowOutcome) -> Result<PatternRecord> {
        let record = self.repository.extract_pattern(outcome).await?;
        let stage = self.repository.save(&record).await?;
        self.repository.log_success_rate(&record).await?;

        let status = if outcome.success {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };
        self.repository
            .log_execution(&record, status, outcome.duration_minutes, &outcome.task_description)
            .await?;

        info!(
            pattern_id = %record.id,
            stage = stage.as_str(),
            total = record.metrics.total_executions,
            "Workflow recorded"
        );
        Ok(record)
    }

    /// Move a pattern into the terminal deprecated stage
    pub async fn deprecate(&self, id: &str) -> Result<()> {
        self.repository.deprecate(id).await
    }

    /// Import a capability catalog feed into the graph projection and
    /// recompute the similarity edges. Returns `None` without a graph.
    pub async fn import_capabilities(
        &self,
        records: &[CapabilityRecord],
    ) -> Result<Option<CatalogImportReport>> {
        let Some(graph) = &self.graph else {
            debug!("No graph projection attached, catalog import skipped");
            return Ok(None);
        };

        let report = graph.import_catalog(records).await?;
        let edges = graph
            .compute_similarities(self.config.similarity.min_similarity)
            .await?;
        info!(
            imported = report.succeeded,
            total = report.total,
            similarity_edges = edges,
            "Capability catalog imported"
        );
        Ok(Some(report))
    }

    /// Node and relation counts from the graph projection
    pub async fn graph_stats(&self) -> Result<Option<GraphStats>> {
        match &self.graph {
            Some(graph) => Ok(Some(graph.stats().await?)),
            None => Ok(None),
        }
    }

    /// Capabilities similar to the given one, via the projection's
    /// similarity edges
    pub async fn similar_capabilities(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64, Vec<String>)>> {
        match &self.graph {
            Some(graph) => {
                graph
                    .find_similar_capabilities(name, self.config.similarity.min_similarity, limit)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(tmp: &TempDir, with_graph: bool) -> CadenceConfig {
        CadenceConfig {
            patterns_dir: tmp.path().join("patterns"),
            metrics_dir: tmp.path().join("metrics"),
            graph_db_path: with_graph.then(|| tmp.path().join("graph")),
            ..CadenceConfig::default()
        }
    }

    fn outcome(task: &str, success: bool) -> WorkflowOutcome {
        WorkflowOutcome {
            task_description: task.to_string(),
            success,
            duration_minutes: 2.0,
            steps: vec![],
            error: None,
            environment_requirements: vec![],
        }
    }

    #[tokio::test]
    async fn test_engine_without_graph() {
        let tmp = TempDir::new().unwrap();
        let engine = PatternEngine::new(config(&tmp, false)).await.unwrap();

        assert!(!engine.has_graph());
        assert!(engine.graph_stats().await.unwrap().is_none());
        assert!(engine.import_capabilities(&[]).await.unwrap().is_none());
        assert!(engine
            .similar_capabilities("anything", 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_record_then_recommend() {
        let tmp = TempDir::new().unwrap();
        let engine = PatternEngine::new(config(&tmp, false)).await.unwrap();

        engine
            .record_workflow(&outcome("deploy fastapi rest api", true))
            .await
            .unwrap();

        let rec = engine
            .recommend("deploy a fastapi rest service")
            .await
            .unwrap();
        assert!(rec.is_some());
        assert_eq!(rec.unwrap().pattern.id, "deploy-fastapi-rest-api-v1");
    }

    #[tokio::test]
    async fn test_no_match_is_none_not_error() {
        let tmp = TempDir::new().unwrap();
        let engine = PatternEngine::new(config(&tmp, false)).await.unwrap();

        assert!(engine.recommend("anything at all").await.unwrap().is_none());
        assert!(engine.matches("anything at all", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_recordings_accumulate() {
        let tmp = TempDir::new().unwrap();
        let engine = PatternEngine::new(config(&tmp, false)).await.unwrap();

        for _ in 0..3 {
            engine
                .record_workflow(&outcome("deploy fastapi rest api", true))
                .await
                .unwrap();
        }

        let record = engine
            .record_workflow(&outcome("deploy fastapi rest api", true))
            .await
            .unwrap();
        assert_eq!(record.metrics.total_executions, 4);
        assert_eq!(record.metrics.successful_executions, 4);
    }
}
