//! Harvesting core: relationship resolution, deduplication and run
//! orchestration.
//!
//! - **Resolver**: three-tier lookup for relationship targets with a
//!   drain-once deferred queue ([`resolver::RelationshipResolver`])
//! - **Deduplicator**: collapses records sharing a PID ([`dedup::deduplicate`])
//! - **Run**: sequences harvesting, resolution, deduplication and
//!   publication ([`run::HarvestRun`])

pub mod dedup;
pub mod resolver;
pub mod run;

// Re-export commonly used types
pub use dedup::{deduplicate, largest_record, most_diverse_record};
pub use resolver::{
    BackReference, BatchError, BatchState, PendingRelationship, RelationshipResolver, ResolveError,
    Resolution,
};
pub use run::{
    reindex_from_file, HarvestRun, ReindexError, RunError, RunOptions, RunPhase, RunReport,
};
