//! Graph projection storage backed by CozoDB

pub mod cozo;
pub mod schema;

pub use cozo::{CatalogImportReport, CozoGraph, GraphStats, PatternSearchHit};
pub use schema::{CURRENT_SCHEMA_VERSION, INITIAL_SCHEMA, MIGRATIONS, Migration};
