//! CozoDB schema for the graph projection.
//!
//! Relations mirror the durable record store: capability nodes, pattern
//! nodes with derived status, immutable execution nodes, plus the derived
//! similarity and usage relations. Uniqueness comes from relation keys;
//! secondary indexes cover the category, success-rate, and status queries.

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Initial schema creation script (Datalog)
pub const INITIAL_SCHEMA: &str = r#"
{
    :create schema_version {
        version: Int =>
        applied_at: Int,
        description: String
    }
}
{
    :create capability {
        name: String =>
        description: String,
        category: String,
        marketplace_source: String,
        version: String,
        tags_json: String,
        success_rate: Float,
        total_uses: Int,
        last_used: Int?
    }
}
{
    :create pattern {
        pattern_id: String =>
        name: String,
        description: String,
        domain: String,
        status: String,
        success_rate: Float,
        total_executions: Int,
        created_at: Int,
        last_updated: Int?
    }
}
{
    :create execution {
        execution_id: String =>
        task_description: String,
        status: String,
        duration_ms: Int,
        started_at: Int,
        completed_at: Int,
        error_message: String
    }
}
{
    :create similar_to {
        a: String,
        b: String =>
        similarity_score: Float,
        shared_tags_json: String,
        computed_at: Int
    }
}
{
    :create uses {
        pattern_id: String,
        capability: String =>
        step_number: Int,
        required: Bool,
        purpose: String
    }
}
{
    :create implements {
        execution_id: String,
        pattern_id: String
    }
}
{
    ::index create capability:by_category { category }
}
{
    ::index create capability:by_success_rate { success_rate }
}
{
    ::index create pattern:by_status { status }
}
{
    ::index create pattern:by_success_rate { success_rate }
}
{
    ::index create uses:by_capability { capability }
}
"#;

/// Schema migration definition
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number for this migration
    pub version: u32,
    /// Human-readable description of what this migration does
    pub description: &'static str,
    /// The Datalog script to execute for this migration
    pub script: &'static str,
}

/// All migrations in order
pub static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema",
    script: INITIAL_SCHEMA,
}];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version_constant() {
        assert_eq!(CURRENT_SCHEMA_VERSION, 1);
    }

    #[test]
    fn test_migrations_end_at_current_version() {
        assert_eq!(MIGRATIONS.last().unwrap().version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_initial_schema_contains_node_relations() {
        assert!(INITIAL_SCHEMA.contains(":create capability {"));
        assert!(INITIAL_SCHEMA.contains(":create pattern {"));
        assert!(INITIAL_SCHEMA.contains(":create execution {"));
    }

    #[test]
    fn test_initial_schema_contains_derived_relations() {
        assert!(INITIAL_SCHEMA.contains(":create similar_to {"));
        assert!(INITIAL_SCHEMA.contains(":create uses {"));
        assert!(INITIAL_SCHEMA.contains(":create implements {"));
    }

    #[test]
    fn test_initial_schema_contains_indexes() {
        assert!(INITIAL_SCHEMA.contains("::index create capability:by_category"));
        assert!(INITIAL_SCHEMA.contains("::index create pattern:by_status"));
        assert!(INITIAL_SCHEMA.contains("::index create capability:by_success_rate"));
    }
}
