//! Durable pattern record store.
//!
//! Patterns live as one JSON file per record under a lifecycle-staged
//! directory tree; the directory a record sits in encodes its stage. This
//! store is the source of truth. After every durable write the record is
//! propagated to the graph projection on a best-effort basis: a projection
//! failure is logged and swallowed, never surfaced to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::CadenceConfig;
use crate::store::CozoGraph;
use crate::types::{
    ExecutionRecord, ExecutionStatus, LifecycleStage, PatternRecord, WorkflowOutcome,
};
use crate::{CadenceError, Result};

/// Append-only execution log, one CSV line per run
const EXECUTIONS_LOG: &str = "executions.log";

/// Append-only success-rate history, one CSV line per metrics update
const SUCCESS_RATES_LOG: &str = "success_rates.log";

/// Filesystem-backed pattern store with lifecycle-staged placement
pub struct PatternRepository {
    patterns_dir: PathBuf,
    metrics_dir: PathBuf,
    graph: Option<Arc<CozoGraph>>,
}

impl PatternRepository {
    /// Create the store, ensuring the stage and metrics directories exist
    pub fn new(config: &CadenceConfig) -> Result<Self> {
        for stage in [
            LifecycleStage::Discovered,
            LifecycleStage::Validated,
            LifecycleStage::Learned,
            LifecycleStage::Deprecated,
        ] {
            std::fs::create_dir_all(config.patterns_dir.join(stage.as_str()))?;
        }
        std::fs::create_dir_all(&config.metrics_dir)?;

        Ok(Self {
            patterns_dir: config.patterns_dir.clone(),
            metrics_dir: config.metrics_dir.clone(),
            graph: None,
        })
    }

    /// Attach a graph projection for best-effort mirroring
    pub fn with_graph(mut self, graph: Arc<CozoGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    fn record_path(&self, stage: LifecycleStage, id: &str) -> PathBuf {
        self.patterns_dir.join(stage.as_str()).join(format!("{id}.json"))
    }

    /// Look up a pattern by id across the active stages, most trusted
    /// stage first. Deprecated patterns are never returned.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<PatternRecord>> {
        for stage in LifecycleStage::active_stages() {
            let path = self.record_path(stage, id);
            if !path.exists() {
                continue;
            }

            match read_record(&path) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable pattern file");
                }
            }
        }

        Ok(None)
    }

    /// Fold a workflow outcome into the pattern library: merge into the
    /// existing record for this task signature, or create a new one.
    ///
    /// The returned record is not yet persisted; callers follow with
    /// [`save`](Self::save).
    pub async fn extract_pattern(&self, outcome: &WorkflowOutcome) -> Result<PatternRecord> {
        let id = PatternRecord::id_for(&outcome.task_description);

        match self.find_by_id(&id).await? {
            Some(mut existing) => {
                existing.record_outcome(outcome);
                debug!(pattern_id = %id, total = existing.metrics.total_executions, "Merged outcome into existing pattern");
                Ok(existing)
            }
            None => {
                let record = PatternRecord::from_outcome(outcome);
                debug!(pattern_id = %record.id, "Extracted new pattern");
                Ok(record)
            }
        }
    }

    /// Persist a pattern record at its metrics-derived stage.
    ///
    /// The file is written atomically (temp sibling then rename) and the
    /// record is removed from any other active stage directory, so an id
    /// exists in at most one stage. Returns the stage it landed in.
    pub async fn save(&self, record: &PatternRecord) -> Result<LifecycleStage> {
        let stage = record.stage();
        let path = self.record_path(stage, &record.id);

        write_record_atomic(&path, record)?;

        for other in LifecycleStage::active_stages() {
            if other == stage {
                continue;
            }
            let stale = self.record_path(other, &record.id);
            if stale.exists() {
                std::fs::remove_file(&stale)?;
                debug!(pattern_id = %record.id, from = other.as_str(), to = stage.as_str(), "Pattern moved between stages");
            }
        }

        if let Some(graph) = &self.graph {
            if let Err(e) = graph.upsert_pattern(record).await {
                warn!(pattern_id = %record.id, error = %e, "Graph pattern sync failed");
            } else if let Err(e) = graph.replace_usage_edges(record).await {
                warn!(pattern_id = %record.id, error = %e, "Graph usage edge sync failed");
            }
        }

        Ok(stage)
    }

    /// Load every pattern from the active stages. Malformed files are
    /// logged and skipped; the rest still load.
    pub async fn load_all(&self) -> Result<Vec<PatternRecord>> {
        let mut records = Vec::new();

        for stage in LifecycleStage::active_stages() {
            let dir = self.patterns_dir.join(stage.as_str());
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }

                match read_record(&path) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable pattern file");
                    }
                }
            }
        }

        Ok(records)
    }

    /// Append one run to the execution log and mirror it into the graph.
    ///
    /// Line format: `timestamp,pattern_id,status,duration`. The durable
    /// append is authoritative; the graph execution node and capability
    /// use counters are best-effort.
    pub async fn log_execution(
        &self,
        record: &PatternRecord,
        status: ExecutionStatus,
        duration_minutes: f64,
        task_description: &str,
    ) -> Result<ExecutionRecord> {
        let line = format!(
            "{},{},{},{}\n",
            Utc::now().to_rfc3339(),
            record.id,
            status.as_str(),
            duration_minutes
        );
        append_line(&self.metrics_dir.join(EXECUTIONS_LOG), &line)?;

        let execution = ExecutionRecord::new(task_description, status, duration_minutes);

        if let Some(graph) = &self.graph {
            if let Err(e) = graph.record_execution(&execution, &record.id).await {
                warn!(pattern_id = %record.id, error = %e, "Graph execution sync failed");
            }

            for step in &record.capability_sequence {
                if let Err(e) = graph.increment_capability_use(&step.capability).await {
                    debug!(capability = %step.capability, error = %e, "Capability use counter not updated");
                }
            }
        }

        Ok(execution)
    }

    /// Append the pattern's current success rate to the rate history log.
    /// Line format: `timestamp,pattern_id,success_rate`.
    pub async fn log_success_rate(&self, record: &PatternRecord) -> Result<()> {
        let line = format!(
            "{},{},{}\n",
            Utc::now().to_rfc3339(),
            record.id,
            record.metrics.success_rate
        );
        append_line(&self.metrics_dir.join(SUCCESS_RATES_LOG), &line)
    }

    /// Move a pattern into the terminal deprecated stage.
    ///
    /// The record file is relocated, never deleted; deprecated patterns
    /// stop participating in lookup and matching.
    pub async fn deprecate(&self, id: &str) -> Result<()> {
        for stage in LifecycleStage::active_stages() {
            let path = self.record_path(stage, id);
            if !path.exists() {
                continue;
            }

            let target = self.record_path(LifecycleStage::Deprecated, id);
            std::fs::rename(&path, &target)?;
            debug!(pattern_id = %id, from = stage.as_str(), "Pattern deprecated");

            if let Some(graph) = &self.graph {
                match read_record(&target) {
                    Ok(record) => {
                        if let Err(e) = graph
                            .set_pattern_status(&record, LifecycleStage::Deprecated)
                            .await
                        {
                            warn!(pattern_id = %id, error = %e, "Graph status sync failed");
                        }
                    }
                    Err(e) => {
                        warn!(pattern_id = %id, error = %e, "Deprecated record unreadable, graph not updated");
                    }
                }
            }

            return Ok(());
        }

        Err(CadenceError::NotFound(id.to_string()))
    }
}

fn read_record(path: &Path) -> Result<PatternRecord> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| CadenceError::Serialization(format!("{}: {e}", path.display())))
}

fn write_record_atomic(path: &Path, record: &PatternRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| CadenceError::Serialization(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
