//! Keyword-driven domain and tag inference.
//!
//! The rules are deliberately plain lexical lookups kept as ordered tables
//! so they can be unit-tested and extended without touching the matcher.

/// Ordered domain rules: the first rule with any keyword present in the
/// task description wins.
pub static DOMAIN_RULES: &[(&[&str], &str)] = &[
    (
        &["api", "web", "frontend", "backend", "next", "react"],
        "web-development",
    ),
    (
        &["docker", "kubernetes", "deploy", "ci/cd", "pipeline"],
        "devops",
    ),
    (
        &["etl", "data", "bigquery", "spark", "airflow"],
        "data-engineering",
    ),
    (
        &["security", "audit", "vulnerability", "secret"],
        "security",
    ),
    (&["test", "pytest", "jest", "e2e"], "testing"),
    (
        &["ml", "model", "pytorch", "tensorflow", "training"],
        "ai-ml",
    ),
];

/// Tag rules: every matching rule contributes its tag.
pub static TAG_RULES: &[(&[&str], &str)] = &[
    (&["api"], "api"),
    (&["auth", "authentication"], "authentication"),
    (&["cache", "caching"], "caching"),
    (&["deploy"], "deployment"),
    (&["test"], "testing"),
];

/// Infer the domain of a task description; falls back to "general".
pub fn infer_domain(task_description: &str) -> &'static str {
    let task = task_description.to_lowercase();
    for (keywords, domain) in DOMAIN_RULES {
        if keywords.iter().any(|kw| task.contains(kw)) {
            return domain;
        }
    }
    "general"
}

/// Infer free-form tags from a task description.
pub fn infer_tags(task_description: &str) -> Vec<String> {
    let task = task_description.to_lowercase();
    TAG_RULES
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|kw| task.contains(kw)))
        .map(|(_, tag)| tag.to_string())
        .collect()
}
