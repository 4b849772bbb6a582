//! Configuration for the cadence pattern engine.
//!
//! All tunable policy lives here rather than in ambient globals: the
//! matcher's candidacy threshold and ranking weights, the similarity
//! threshold for the graph projection, and the storage locations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the pattern engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Base directory for lifecycle-staged pattern records
    pub patterns_dir: PathBuf,
    /// Directory for append-only execution and success-rate logs
    pub metrics_dir: PathBuf,
    /// Path to the graph projection database; `None` disables projection
    pub graph_db_path: Option<PathBuf>,
    /// Matching policy
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Capability similarity policy
    #[serde(default)]
    pub similarity: SimilarityConfig,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence");

        Self {
            patterns_dir: base.join("patterns"),
            metrics_dir: base.join("metrics"),
            graph_db_path: None,
            matching: MatchingConfig::default(),
            similarity: SimilarityConfig::default(),
        }
    }
}

/// Policy parameters for request-to-pattern matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum shared keywords for a pattern to be a candidate at all
    pub min_keyword_overlap: usize,
    /// Default number of ranked matches returned
    pub top_k: usize,
    /// Ranking factor weights
    #[serde(default)]
    pub weights: MatchWeights,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_keyword_overlap: 2,
            top_k: 3,
            weights: MatchWeights::default(),
        }
    }
}

/// Weights for the composite ranking score. Expected to sum to 1.0 so the
/// composite stays in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchWeights {
    pub keyword_match: f64,
    pub success_rate: f64,
    pub usage: f64,
    pub recency: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            keyword_match: 0.4,
            success_rate: 0.3,
            usage: 0.2,
            recency: 0.1,
        }
    }
}

/// Policy parameters for capability similarity edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Minimum Jaccard tag-overlap ratio for an edge to exist
    pub min_similarity: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.3,
        }
    }
}
