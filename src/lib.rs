// Electoral Intelligence Engine - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod model;
pub mod profile;
pub mod store;
pub mod db;
pub mod ingest;
pub mod config;
pub mod cache;
pub mod similarity;   // Twin cities
pub mod opportunity;  // Demographic gap
pub mod efficiency;   // Cost per vote
pub mod projection;   // Goal projection
pub mod migration;    // Vote migration
pub mod engine;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{IntelError, IntelResult};
pub use model::{
    Candidate, CandidateVotes, CategoryCounts, CategoryGroup, Election, Municipality,
    VoteAggregate,
};
pub use profile::{DemographicProfile, ProfileHighlights, ProfileVector};
pub use store::{CandidateDirectory, DemographicSource, ElectoralStore, MemoryStore, VoteSource};
pub use db::{open_database, setup_database, table_counts, TableCounts, VoteRecord};
pub use ingest::{
    import_candidates, import_elections, import_municipalities, import_voter_profile,
    import_votes, ImportSummary, ProfileImportSummary,
};
pub use config::{AppConfig, EngineConfig};
pub use cache::{CacheStats, ResultCache};
pub use similarity::{similarity_percentage, SimilarityParams, SimilarityResult, SimilarMunicipality};
pub use opportunity::{OpportunityParams, OpportunityRow};
pub use efficiency::{CostOrder, EfficiencyParams, EfficiencyRow};
pub use projection::{ProjectionParams, ProjectionResult, ProjectionRow};
pub use migration::{MigrationParams, MigrationResult, MigrationRow, Selection};
pub use engine::IntelligenceEngine;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
