//! Collaborator interfaces for the harvesting core.
//!
//! The core treats every external system as a trait object:
//! - [`Repository`]: a harvestable source of raw resources
//! - [`RecordStore`]: the remote PID record store (create/update/get)
//! - [`SearchIndex`]: the search index (approximate PID lookup, bulk index)
//! - [`TerminologyService`]: vocabulary lookup used by extractors
//!
//! Concrete HTTP clients live outside this crate; tests use in-memory
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::harvest::resolver::RelationshipResolver;
use crate::model::{ModelError, Record};

// ============================================================================
// Resource selection
// ============================================================================

/// Which resources a harvesting run should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSelection {
    /// Every resource the repository exposes
    All,

    /// Resources modified within `[start, end]`
    TimeWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// A raw resource as delivered by a repository, prior to extraction.
///
/// The payload format is repository-specific; the core only needs a stable
/// identifier for error reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResource {
    /// Source-side identity of the resource (typically its URL)
    pub identifier: String,

    /// Raw resource content
    pub payload: serde_json::Value,
}

impl RawResource {
    pub fn new(identifier: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            identifier: identifier.into(),
            payload,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by a [`Repository`] collaborator.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The resource listing call failed; fatal to the run
    #[error("Failed to list resources: {0}")]
    Listing(String),

    /// Extraction of a single resource failed; recorded, run continues
    #[error("Failed to extract record: {0}")]
    Extraction(String),

    /// A record or entry built during extraction was invalid
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors raised by the remote [`RecordStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists under the given PID
    #[error("No record found for PID '{pid}'")]
    NotFound { pid: String },

    /// The store rejected or failed a request
    #[error("Record store request failed: {0}")]
    Request(String),

    /// The store returned a document that is not a valid record
    #[error(transparent)]
    Malformed(#[from] ModelError),
}

/// Errors raised by the [`SearchIndex`].
#[derive(Error, Debug)]
pub enum SearchError {
    /// The index rejected or failed a request
    #[error("Search index request failed: {0}")]
    Request(String),
}

/// Errors raised by the [`TerminologyService`].
#[derive(Error, Debug)]
pub enum TerminologyError {
    /// The terminology service rejected or failed a request
    #[error("Terminology request failed: {0}")]
    Request(String),
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// A harvestable source repository.
///
/// Implementations own the repository-specific field mapping: given a raw
/// resource they produce a [`Record`] with a computed candidate PID, and may
/// call back into the [`RelationshipResolver`] to link the record under
/// construction to other records discovered earlier or later in the run.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Stable identifier of the repository (used for logging and run
    /// artifacts).
    fn repository_id(&self) -> &str;

    /// Lists the raw resources covered by `selection`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Listing`] when the repository cannot be
    /// enumerated at all; this aborts the run.
    async fn list_resources(
        &self,
        selection: &ResourceSelection,
    ) -> Result<Vec<RawResource>, RepositoryError>;

    /// Extracts a record from one raw resource.
    ///
    /// Returns `Ok(None)` when the resource carries nothing worth a record.
    /// The resolver is available for establishing cross-record links while
    /// the record is still under construction.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Extraction`] on a per-resource failure;
    /// the run records it and continues with the next resource.
    async fn extract_record(
        &self,
        resource: &RawResource,
        resolver: &mut RelationshipResolver<'_>,
    ) -> Result<Option<Record>, RepositoryError>;

    /// Builds the source-description record for the repository itself.
    ///
    /// Every harvested record references this record as its primary source.
    fn source_description(&self) -> Result<Record, RepositoryError>;
}

/// The remote PID record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates a single record; the response carries the final PID.
    async fn create(&self, record: &Record) -> Result<Record, StoreError>;

    /// Creates a batch of records in one request.
    async fn create_batch(&self, records: &[Record]) -> Result<Vec<Record>, StoreError>;

    /// Fetches the record stored under `pid`.
    async fn get(&self, pid: &str) -> Result<Record, StoreError>;

    /// Replaces the stored record with the given content.
    async fn update(&self, record: &Record) -> Result<Record, StoreError>;
}

/// The search index over published records.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Indexes a single record.
    async fn index(&self, record: &Record) -> Result<(), SearchError>;

    /// Indexes a batch of records.
    async fn index_batch(&self, records: &[Record]) -> Result<(), SearchError>;

    /// Finds the PID best matching `candidate` (a PID or clear-text
    /// location). Returns `None` when nothing matches.
    async fn find_pid(&self, candidate: &str) -> Result<Option<String>, SearchError>;
}

/// External vocabulary lookup used by extractors to normalize terms.
#[async_trait]
pub trait TerminologyService: Send + Sync {
    /// Resolves a free-text term within an ontology to its IRI, if any.
    async fn search_term(
        &self,
        term: &str,
        ontology: &str,
    ) -> Result<Option<String>, TerminologyError>;
}
