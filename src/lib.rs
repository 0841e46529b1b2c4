//! PID record harvesting core.
//!
//! This crate harvests metadata records from external repositories, turns
//! each into a normalized key/value record identified by a persistent
//! identifier (PID), and publishes the records to a remote record store and
//! search index. Its centerpiece is the relationship-linking engine: records
//! may reference each other by PID before either side exists, and the
//! [`harvest::RelationshipResolver`] locates targets across the in-flight
//! creation buffer, the in-memory cache of materialized records, and the
//! remote store, deferring unresolved references for exactly one retry.
//!
//! Repository-specific field mapping and the concrete HTTP clients for the
//! record store, search index and terminology service live outside this
//! crate; they plug in through the traits in [`traits`].

pub mod datatypes;
pub mod harvest;
pub mod model;
pub mod traits;
pub mod util;

// Re-export common types for convenience
pub use harvest::{
    deduplicate, BackReference, BatchError, BatchState, HarvestRun, RelationshipResolver,
    ResolveError, Resolution, RunError, RunOptions, RunPhase, RunReport,
};
pub use model::{Entry, EntryValue, ModelError, Record};
pub use traits::{
    RawResource, RecordStore, Repository, RepositoryError, ResourceSelection, SearchError,
    SearchIndex, StoreError, TerminologyError, TerminologyService,
};
