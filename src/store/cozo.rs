//! CozoDB-backed graph projection.
//!
//! Holds the mirrored capability/pattern/execution nodes and the derived
//! similarity and usage relations. Every operation here is advisory from
//! the engine's point of view: the durable record store remains the source
//! of truth and callers treat failures as "this sync did not happen".

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use cozo::{DataValue, DbInstance, NamedRows};
use tracing::{debug, warn};

use super::schema::MIGRATIONS;
use crate::types::{
    CapabilityRecord, ExecutionRecord, LifecycleStage, PatternRecord, SimilarityEdge, UsageEdge,
    tag_similarity,
};
use crate::{CadenceError, Result};

/// Escape a string for inclusion in a Datalog literal
fn esc(s: &str) -> String {
    s.replace('\'', "''")
}

/// Outcome of a bulk catalog import: how many records landed, plus an
/// itemized reason per skipped record.
#[derive(Debug, Clone, Default)]
pub struct CatalogImportReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<(String, String)>,
}

/// Node and relation counts for the projection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub capabilities: u64,
    pub patterns: u64,
    pub executions: u64,
    pub similarity_edges: u64,
    pub usage_edges: u64,
}

/// One row from a pattern text search
#[derive(Debug, Clone)]
pub struct PatternSearchHit {
    pub pattern_id: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub success_rate: f64,
    pub total_executions: u64,
}

/// CozoDB-backed graph projection store
pub struct CozoGraph {
    db: Arc<DbInstance>,
    initialized: bool,
}

impl CozoGraph {
    /// Open or create a projection database at the given path.
    ///
    /// Schema setup runs as a one-time idempotent versioned migration.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CadenceError::Database(format!("Failed to create directory: {e}")))?;
        }

        let db = DbInstance::new("rocksdb", path, "")
            .map_err(|e| CadenceError::Database(format!("Failed to open database: {e}")))?;

        let mut store = Self {
            db: Arc::new(db),
            initialized: false,
        };

        store.ensure_schema().await?;
        store.initialized = true;

        Ok(store)
    }

    /// Check if the store finished schema setup
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Get current schema version from the database
    pub async fn get_schema_version(&self) -> Result<u32> {
        let query = "?[max(version)] := *schema_version{version}";

        match self.run_query(query, Default::default()).await {
            Ok(rows) if !rows.rows.is_empty() => {
                let version = rows.rows[0][0]
                    .get_int()
                    .ok_or_else(|| CadenceError::Database("Invalid version type".into()))?;
                Ok(version as u32)
            }
            Ok(_) => Ok(0),
            Err(e) => {
                // Table might not exist yet on a fresh database
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("Cannot find") {
                    Ok(0)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn ensure_schema(&mut self) -> Result<()> {
        let current = self.get_schema_version().await?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            self.apply_migration(migration).await?;
        }

        Ok(())
    }

    async fn apply_migration(&self, migration: &super::schema::Migration) -> Result<()> {
        self.db
            .run_script(
                migration.script,
                Default::default(),
                cozo::ScriptMutability::Mutable,
            )
            .map_err(|e| {
                CadenceError::Migration(format!("Migration {} failed: {e}", migration.version))
            })?;

        let record_query = format!(
            "?[version, applied_at, description] <- [[{}, {}, '{}']] :put schema_version {{version => applied_at, description}}",
            migration.version,
            Utc::now().timestamp(),
            esc(migration.description)
        );

        self.db
            .run_script(
                &record_query,
                Default::default(),
                cozo::ScriptMutability::Mutable,
            )
            .map_err(|e| {
                CadenceError::Migration(format!(
                    "Failed to record migration {}: {e}",
                    migration.version
                ))
            })?;

        Ok(())
    }

    async fn run_query(
        &self,
        query: &str,
        params: BTreeMap<String, DataValue>,
    ) -> Result<NamedRows> {
        self.db
            .run_script(query, params, cozo::ScriptMutability::Immutable)
            .map_err(|e| CadenceError::Database(format!("Query failed: {e}")))
    }

    async fn run_mutation(
        &self,
        query: &str,
        params: BTreeMap<String, DataValue>,
    ) -> Result<NamedRows> {
        self.db
            .run_script(query, params, cozo::ScriptMutability::Mutable)
            .map_err(|e| CadenceError::Database(format!("Mutation failed: {e}")))
    }

    // ===== Capability nodes =====

    /// Merge a capability node by name.
    ///
    /// The usage counter and last-used timestamp survive re-imports of the
    /// catalog feed.
    pub async fn upsert_capability(&self, record: &CapabilityRecord) -> Result<()> {
        let (total_uses, last_used) = self.capability_use(&record.name).await?.unwrap_or((0, None));

        let tags_json = serde_json::to_string(&record.tags)
            .map_err(|e| CadenceError::Serialization(e.to_string()))?;
        let last_used_str = match last_used {
            Some(ts) => ts.to_string(),
            None => "null".to_string(),
        };

        let query = format!(
            r#"?[name, description, category, marketplace_source, version, tags_json, success_rate, total_uses, last_used] <- [[
                '{}', '{}', '{}', '{}', '{}', '{}', {}, {}, {}
            ]]
            :put capability {{
                name => description, category, marketplace_source, version, tags_json, success_rate, total_uses, last_used
            }}"#,
            esc(&record.name),
            esc(&record.description),
            esc(&record.category),
            esc(&record.marketplace_source),
            esc(&record.version),
            esc(&tags_json),
            format_args!("{:?}", record.success_rate),
            total_uses,
            last_used_str,
        );

        self.run_mutation(&query, Default::default()).await?;
        Ok(())
    }

    /// Bulk upsert capability nodes from a catalog feed.
    ///
    /// A failure on one record is logged and counted; the batch continues.
    pub async fn import_catalog(&self, records: &[CapabilityRecord]) -> Result<CatalogImportReport> {
        let mut report = CatalogImportReport {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            match self.upsert_capability(record).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!(capability = %record.name, error = %e, "Skipping capability import");
                    report.failed += 1;
                    report.failures.push((record.name.clone(), e.to_string()));
                }
            }
        }

        debug!(
            succeeded = report.succeeded,
            total = report.total,
            "Catalog import finished"
        );
        Ok(report)
    }

    /// Bump the usage counter for a capability and stamp its last use
    pub async fn increment_capability_use(&self, name: &str) -> Result<()> {
        let row = self.capability_row(name).await?;
        let Some(mut row) = row else {
            return Err(CadenceError::CapabilityNotFound(name.to_string()));
        };

        row.total_uses += 1;
        row.last_used = Some(Utc::now().timestamp());

        let query = format!(
            r#"?[name, description, category, marketplace_source, version, tags_json, success_rate, total_uses, last_used] <- [[
                '{}', '{}', '{}', '{}', '{}', '{}', {}, {}, {}
            ]]
            :put capability {{
                name => description, category, marketplace_source, version, tags_json, success_rate, total_uses, last_used
            }}"#,
            esc(name),
            esc(&row.description),
            esc(&row.category),
            esc(&row.marketplace_source),
            esc(&row.version),
            esc(&row.tags_json),
            format_args!("{:?}", row.success_rate),
            row.total_uses,
            row.last_used.unwrap_or_default(),
        );

        self.run_mutation(&query, Default::default()).await?;
        Ok(())
    }

    /// Usage counter and last-used timestamp for a capability, if present
    async fn capability_use(&self, name: &str) -> Result<Option<(i64, Option<i64>)>> {
        let query = format!(
            "?[total_uses, last_used] := *capability{{name, total_uses, last_used}}, name == '{}'",
            esc(name)
        );
        let rows = self.run_query(&query, Default::default()).await?;

        if rows.rows.is_empty() {
            return Ok(None);
        }

        let total_uses = rows.rows[0][0]
            .get_int()
            .ok_or_else(|| CadenceError::Database("Invalid total_uses type".into()))?;
        let last_used = match &rows.rows[0][1] {
            DataValue::Null => None,
            val => val.get_int(),
        };

        Ok(Some((total_uses, last_used)))
    }

    async fn capability_row(&self, name: &str) -> Result<Option<CapabilityRow>> {
        let query = format!(
            r#"?[description, category, marketplace_source, version, tags_json, success_rate, total_uses, last_used] :=
                *capability{{name, description, category, marketplace_source, version, tags_json, success_rate, total_uses, last_used}},
                name == '{}'"#,
            esc(name)
        );
        let rows = self.run_query(&query, Default::default()).await?;

        if rows.rows.is_empty() {
            return Ok(None);
        }

        let row = &rows.rows[0];
        Ok(Some(CapabilityRow {
            description: str_cell(&row[0], "description")?,
            category: str_cell(&row[1], "category")?,
            marketplace_source: str_cell(&row[2], "marketplace_source")?,
            version: str_cell(&row[3], "version")?,
            tags_json: str_cell(&row[4], "tags_json")?,
            success_rate: float_cell(&row[5], "success_rate")?,
            total_uses: int_cell(&row[6], "total_uses")?,
            last_used: match &row[7] {
                DataValue::Null => None,
                val => val.get_int(),
            },
        }))
    }

    /// All capabilities that carry at least one tag, with their tags
    async fn capabilities_with_tags(&self) -> Result<Vec<(String, Vec<String>)>> {
        let query = "?[name, tags_json] := *capability{name, tags_json}";
        let rows = self.run_query(query, Default::default()).await?;

        let mut out = Vec::new();
        for row in &rows.rows {
            let name = str_cell(&row[0], "name")?;
            let tags_json = str_cell(&row[1], "tags_json")?;
            let tags: Vec<String> = serde_json::from_str(&tags_json)
                .map_err(|e| CadenceError::Serialization(format!("Invalid tags JSON: {e}")))?;
            if !tags.is_empty() {
                out.push((name, tags));
            }
        }

        // Canonical order so pair keys always satisfy a < b
        out.sort_by(|x, y| x.0.cmp(&y.0));
        Ok(out)
    }

    // ===== Similarity edges =====

    /// Recompute the full similarity edge set from tag overlap.
    ///
    /// Replace semantics: the prior edge set is dropped first, so a pair
    /// that fell below the threshold after a tag change leaves no stale
    /// edge behind. Re-running on an unchanged node set reproduces the
    /// same edges. Must not run concurrently with itself.
    pub async fn compute_similarities(&self, min_similarity: f64) -> Result<usize> {
        let capabilities = self.capabilities_with_tags().await?;

        self.run_mutation(
            "?[a, b] := *similar_to{a, b} :rm similar_to {a, b}",
            Default::default(),
        )
        .await?;

        let computed_at = Utc::now();
        let mut edges = Vec::new();

        for i in 0..capabilities.len() {
            for j in (i + 1)..capabilities.len() {
                let (a_name, a_tags) = &capabilities[i];
                let (b_name, b_tags) = &capabilities[j];

                let (score, shared) = tag_similarity(a_tags, b_tags);
                if score < min_similarity {
                    continue;
                }

                edges.push(SimilarityEdge {
                    a: a_name.clone(),
                    b: b_name.clone(),
                    similarity_score: score,
                    shared_tags: shared,
                    computed_at,
                });
            }
        }

        if edges.is_empty() {
            return Ok(0);
        }

        let mut rows = Vec::with_capacity(edges.len());
        for edge in &edges {
            let shared_json = serde_json::to_string(&edge.shared_tags)
                .map_err(|e| CadenceError::Serialization(e.to_string()))?;
            rows.push(format!(
                "['{}', '{}', {:?}, '{}', {}]",
                esc(&edge.a),
                esc(&edge.b),
                edge.similarity_score,
                esc(&shared_json),
                edge.computed_at.timestamp()
            ));
        }

        let query = format!(
            "?[a, b, similarity_score, shared_tags_json, computed_at] <- [{}] :put similar_to {{a, b => similarity_score, shared_tags_json, computed_at}}",
            rows.join(", ")
        );
        self.run_mutation(&query, Default::default()).await?;

        debug!(edges = rows.len(), min_similarity, "Recomputed similarity edges");
        Ok(rows.len())
    }

    /// Capabilities similar to the given one, best first.
    ///
    /// Returns `(name, similarity_score, shared_tags)` tuples.
    pub async fn find_similar_capabilities(
        &self,
        name: &str,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<(String, f64, Vec<String>)>> {
        let name = esc(name);
        let query = format!(
            r#"pairs[b, similarity_score, shared_tags_json] := *similar_to{{a, b, similarity_score, shared_tags_json}}, a == '{name}'
            pairs[a, similarity_score, shared_tags_json] := *similar_to{{a, b, similarity_score, shared_tags_json}}, b == '{name}'
            ?[other, similarity_score, shared_tags_json] := pairs[other, similarity_score, shared_tags_json], similarity_score >= {min_similarity}
            :order -similarity_score
            :limit {limit}"#
        );

        let rows = self.run_query(&query, Default::default()).await?;

        let mut out = Vec::new();
        for row in &rows.rows {
            let other = str_cell(&row[0], "capability name")?;
            let score = float_cell(&row[1], "similarity_score")?;
            let shared: Vec<String> = serde_json::from_str(&str_cell(&row[2], "shared_tags")?)
                .map_err(|e| CadenceError::Serialization(format!("Invalid shared tags: {e}")))?;
            out.push((other, score, shared));
        }

        Ok(out)
    }

    // ===== Pattern nodes =====

    /// Merge a pattern node by id, with its stage derived from metrics
    pub async fn upsert_pattern(&self, record: &PatternRecord) -> Result<()> {
        self.put_pattern(record, record.stage()).await
    }

    /// Overwrite the stored status of a pattern node. Used when a pattern
    /// is deprecated externally rather than reclassified by metrics.
    pub async fn set_pattern_status(&self, record: &PatternRecord, stage: LifecycleStage) -> Result<()> {
        self.put_pattern(record, stage).await
    }

    async fn put_pattern(&self, record: &PatternRecord, stage: LifecycleStage) -> Result<()> {
        let last_updated = match record.last_updated {
            Some(ts) => ts.timestamp().to_string(),
            None => "null".to_string(),
        };

        let query = format!(
            r#"?[pattern_id, name, description, domain, status, success_rate, total_executions, created_at, last_updated] <- [[
                '{}', '{}', '{}', '{}', '{}', {}, {}, {}, {}
            ]]
            :put pattern {{
                pattern_id => name, description, domain, status, success_rate, total_executions, created_at, last_updated
            }}"#,
            esc(&record.id),
            esc(&record.name),
            esc(&record.description),
            esc(&record.domain),
            stage.as_str(),
            format_args!("{:?}", record.metrics.success_rate),
            record.metrics.total_executions,
            record.created.timestamp(),
            last_updated,
        );

        self.run_mutation(&query, Default::default()).await?;
        Ok(())
    }

    /// Replace the usage edges for a pattern with one edge per sequence
    /// step. A resync never leaves edges from a prior, different sequence.
    pub async fn replace_usage_edges(&self, record: &PatternRecord) -> Result<usize> {
        let rm_query = format!(
            "?[pattern_id, capability] := *uses{{pattern_id, capability}}, pattern_id == '{}' :rm uses {{pattern_id, capability}}",
            esc(&record.id)
        );
        self.run_mutation(&rm_query, Default::default()).await?;

        let edges = UsageEdge::from_sequence(&record.id, &record.capability_sequence);
        if edges.is_empty() {
            return Ok(0);
        }

        let rows: Vec<String> = edges
            .iter()
            .map(|edge| {
                format!(
                    "['{}', '{}', {}, {}, '{}']",
                    esc(&edge.pattern_id),
                    esc(&edge.capability),
                    edge.step_number,
                    edge.required,
                    esc(&edge.purpose),
                )
            })
            .collect();

        let query = format!(
            "?[pattern_id, capability, step_number, required, purpose] <- [{}] :put uses {{pattern_id, capability => step_number, required, purpose}}",
            rows.join(", ")
        );
        self.run_mutation(&query, Default::default()).await?;

        Ok(edges.len())
    }

    /// Usage edges currently stored for a pattern, ordered by step number
    pub async fn usage_edges(&self, pattern_id: &str) -> Result<Vec<UsageEdge>> {
        let query = format!(
            r#"?[capability, step_number, required, purpose] :=
                *uses{{pattern_id, capability, step_number, required, purpose}},
                pattern_id == '{}'
            :order step_number"#,
            esc(pattern_id)
        );
        let rows = self.run_query(&query, Default::default()).await?;

        let mut out = Vec::new();
        for row in &rows.rows {
            out.push(UsageEdge {
                pattern_id: pattern_id.to_string(),
                capability: str_cell(&row[0], "capability")?,
                step_number: int_cell(&row[1], "step_number")? as usize,
                required: matches!(row[2], DataValue::Bool(true)),
                purpose: str_cell(&row[3], "purpose")?,
            });
        }

        Ok(out)
    }

    // ===== Execution nodes =====

    /// Record an execution node and link it to its pattern via IMPLEMENTS.
    /// Create-only: execution records are immutable once written.
    pub async fn record_execution(
        &self,
        execution: &ExecutionRecord,
        pattern_id: &str,
    ) -> Result<()> {
        let query = format!(
            r#"?[execution_id, task_description, status, duration_ms, started_at, completed_at, error_message] <- [[
                '{}', '{}', '{}', {}, {}, {}, '{}'
            ]]
            :put execution {{
                execution_id => task_description, status, duration_ms, started_at, completed_at, error_message
            }}"#,
            esc(&execution.execution_id),
            esc(&execution.task_description),
            execution.status.as_str(),
            execution.duration_ms,
            execution.started_at.timestamp(),
            execution.completed_at.timestamp(),
            esc(&execution.error_message),
        );
        self.run_mutation(&query, Default::default()).await?;

        let link_query = format!(
            "?[execution_id, pattern_id] <- [['{}', '{}']] :put implements {{execution_id, pattern_id}}",
            esc(&execution.execution_id),
            esc(pattern_id),
        );
        self.run_mutation(&link_query, Default::default()).await?;

        Ok(())
    }

    // ===== Queries =====

    /// Substring search over pattern name and description, ordered by
    /// success rate then execution count.
    pub async fn search_patterns(&self, text: &str, limit: usize) -> Result<Vec<PatternSearchHit>> {
        let needle = esc(text);
        let query = format!(
            r#"hits[pattern_id] := *pattern{{pattern_id, name}}, str_includes(name, '{needle}')
            hits[pattern_id] := *pattern{{pattern_id, description}}, str_includes(description, '{needle}')
            ?[pattern_id, name, description, status, success_rate, total_executions] :=
                hits[pattern_id],
                *pattern{{pattern_id, name, description, status, success_rate, total_executions}}
            :order -success_rate, -total_executions
            :limit {limit}"#
        );

        let rows = self.run_query(&query, Default::default()).await?;

        let mut out = Vec::new();
        for row in &rows.rows {
            out.push(PatternSearchHit {
                pattern_id: str_cell(&row[0], "pattern_id")?,
                name: str_cell(&row[1], "name")?,
                description: str_cell(&row[2], "description")?,
                status: str_cell(&row[3], "status")?,
                success_rate: float_cell(&row[4], "success_rate")?,
                total_executions: int_cell(&row[5], "total_executions")? as u64,
            });
        }

        Ok(out)
    }

    /// Node and relation counts
    pub async fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            capabilities: self.count("?[count(name)] := *capability{name}").await?,
            patterns: self
                .count("?[count(pattern_id)] := *pattern{pattern_id}")
                .await?,
            executions: self
                .count("?[count(execution_id)] := *execution{execution_id}")
                .await?,
            similarity_edges: self.count("?[count(b)] := *similar_to{a, b}").await?,
            usage_edges: self
                .count("?[count(capability)] := *uses{pattern_id, capability}")
                .await?,
        })
    }

    async fn count(&self, query: &str) -> Result<u64> {
        let rows = self.run_query(query, Default::default()).await?;

        if rows.rows.is_empty() {
            return Ok(0);
        }

        let count = rows.rows[0][0]
            .get_int()
            .ok_or_else(|| CadenceError::Database("Invalid count type".into()))?;
        Ok(count as u64)
    }
}

struct CapabilityRow {
    description: String,
    category: String,
    marketplace_source: String,
    version: String,
    tags_json: String,
    success_rate: f64,
    total_uses: i64,
    last_used: Option<i64>,
}

fn str_cell(value: &DataValue, field: &str) -> Result<String> {
    value
        .get_str()
        .map(|s| s.to_string())
        .ok_or_else(|| CadenceError::Database(format!("Invalid {field} type")))
}

fn int_cell(value: &DataValue, field: &str) -> Result<i64> {
    value
        .get_int()
        .ok_or_else(|| CadenceError::Database(format!("Invalid {field} type")))
}

fn float_cell(value: &DataValue, field: &str) -> Result<f64> {
    value
        .get_float()
        .ok_or_else(|| CadenceError::Database(format!("Invalid {field} type")))
}
