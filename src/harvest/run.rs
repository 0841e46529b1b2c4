//! Harvest run orchestration.
//!
//! A [`HarvestRun`] drives one harvesting pass over one repository:
//! listing resources, extracting records (with resolver access for
//! cross-record links), draining the deferred-relationship queue,
//! deduplicating, and publishing the batch to the remote store and search
//! index. Per-item failures are recorded and never abort the batch; only a
//! failed resource listing aborts the run.
//!
//! Each run owns its [`BatchState`]. Two repositories harvested in the same
//! process get two runs and two states, so buffer and cache matches cannot
//! leak across unrelated batches.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::datatypes::{PRIMARY_SOURCE, PRIMARY_SOURCE_NAME};
use crate::harvest::dedup::deduplicate;
use crate::harvest::resolver::{
    BatchError, BatchState, PendingRelationship, RelationshipResolver,
};
use crate::model::{ModelError, Record};
use crate::traits::{
    RecordStore, Repository, RepositoryError, ResourceSelection, SearchError, SearchIndex,
};

// ============================================================================
// Run configuration and reporting
// ============================================================================

/// Phase of a harvesting run, for logging and the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Harvesting,
    Resolving,
    Deduplicating,
    Publishing,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Harvesting => "harvesting",
            RunPhase::Resolving => "resolving",
            RunPhase::Deduplicating => "deduplicating",
            RunPhase::Publishing => "publishing",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Configuration of one harvesting run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Which resources to harvest
    pub selection: ResourceSelection,

    /// Skip all remote store and search index writes; records remain in
    /// memory only
    pub dry_run: bool,

    /// Directory for best-effort run artifacts (error list, deduplicated
    /// batch), keyed by repository id
    pub artifact_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            selection: ResourceSelection::All,
            dry_run: false,
            artifact_dir: None,
        }
    }
}

/// Result of a harvesting run.
#[derive(Debug)]
pub struct RunReport {
    /// Published records, or the deduplicated in-memory batch in dry-run
    pub records: Vec<Record>,

    /// All per-item failures recorded during the run
    pub errors: Vec<BatchError>,

    /// Final phase, [`RunPhase::Done`] on normal completion
    pub phase: RunPhase,

    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

/// Run-level failures. Everything else is recorded as a batch error.
#[derive(Error, Debug)]
pub enum RunError {
    /// The repository could not be enumerated; nothing to harvest
    #[error("Repository '{repository}' could not be enumerated: {source}")]
    SourceListing {
        repository: String,
        #[source]
        source: RepositoryError,
    },

    /// The repository could not produce its source-description record
    #[error("Repository '{repository}' has no source description: {source}")]
    SourceDescription {
        repository: String,
        #[source]
        source: RepositoryError,
    },

    /// Record manipulation failed at run level (deduplication merge)
    #[error(transparent)]
    Model(#[from] ModelError),
}

// ============================================================================
// Harvest run
// ============================================================================

/// Orchestrates one harvesting pass over one repository.
pub struct HarvestRun {
    repository: Arc<dyn Repository>,
    store: Arc<dyn RecordStore>,
    search: Arc<dyn SearchIndex>,
    options: RunOptions,
    state: BatchState,
    phase: RunPhase,
}

impl HarvestRun {
    pub fn new(
        repository: Arc<dyn Repository>,
        store: Arc<dyn RecordStore>,
        search: Arc<dyn SearchIndex>,
        options: RunOptions,
    ) -> Self {
        // The resolver persists tier-2/tier-3 updates through the shared
        // state, so it has to know about dry-run mode as well.
        let state = BatchState {
            dry_run: options.dry_run,
            ..BatchState::default()
        };
        Self {
            repository,
            store,
            search,
            options,
            state,
            phase: RunPhase::Idle,
        }
    }

    /// Current phase of the run.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Executes the run to completion.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::SourceListing`] when the repository cannot be
    /// enumerated and [`RunError::SourceDescription`] when it cannot
    /// describe itself; per-resource and per-relationship failures are
    /// reported through [`RunReport::errors`] instead. After a run-level
    /// error, [`HarvestRun::phase`] reports [`RunPhase::Failed`].
    pub async fn execute(&mut self) -> Result<RunReport, RunError> {
        match self.execute_inner().await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.phase = RunPhase::Failed;
                Err(e)
            }
        }
    }

    async fn execute_inner(&mut self) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let repository_id = self.repository.repository_id().to_string();
        info!(repository = %repository_id, phase = %RunPhase::Harvesting, "Starting harvest run");
        self.phase = RunPhase::Harvesting;

        let resources = self
            .repository
            .list_resources(&self.options.selection)
            .await
            .map_err(|source| RunError::SourceListing {
                repository: repository_id.clone(),
                source,
            })?;
        info!(count = resources.len(), "Listed resources");

        let (source_record, source_is_new) = self.source_description_record().await?;

        // Per-resource extraction loop. One resource failing never stops
        // the others.
        for resource in &resources {
            let mut resolver = RelationshipResolver::new(
                &mut self.state,
                self.store.as_ref(),
                self.search.as_ref(),
            );
            match self
                .repository
                .extract_record(resource, &mut resolver)
                .await
            {
                Ok(Some(mut record)) => {
                    if let Err(e) = record.add_entry(
                        PRIMARY_SOURCE,
                        source_record.pid(),
                        Some(PRIMARY_SOURCE_NAME.to_string()),
                    ) {
                        warn!(pid = record.pid(), error = %e, "Failed to stamp primary source");
                    }
                    debug!(pid = record.pid(), resource = %resource.identifier, "Extracted record");
                    self.state.creation_buffer.push(record);
                }
                Ok(None) => {
                    self.state
                        .record_error(resource.identifier.clone(), "no record extracted");
                }
                Err(e) => {
                    self.state
                        .record_error(resource.identifier.clone(), e.to_string());
                }
            }
        }

        info!(
            phase = %RunPhase::Resolving,
            pending = self.state.pending.len(),
            "Draining deferred relationships"
        );
        self.phase = RunPhase::Resolving;
        self.drain_pending().await;

        // Publish the source description alongside the batch when new,
        // otherwise push the merged update remotely right away.
        if source_is_new {
            debug!(pid = source_record.pid(), "Source description joins the batch");
            self.state.creation_buffer.push(source_record);
        } else if self.options.dry_run {
            debug!(pid = source_record.pid(), "Dry run: skipping source description update");
        } else {
            self.update_source_description(&source_record).await;
        }

        self.phase = RunPhase::Deduplicating;
        let buffered = std::mem::take(&mut self.state.creation_buffer);
        info!(phase = %RunPhase::Deduplicating, count = buffered.len(), "Deduplicating batch");
        let deduplicated = deduplicate(buffered)?;

        self.write_records_artifact(&repository_id, &deduplicated);

        self.phase = RunPhase::Publishing;
        let records = if self.options.dry_run {
            warn!("Dry run: skipping record store and search index publication");
            deduplicated
        } else {
            self.publish(deduplicated).await
        };

        // Written after publishing so publish-phase failures are included.
        self.write_errors_artifact(&repository_id);

        self.phase = RunPhase::Done;
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            repository = %repository_id,
            records = records.len(),
            errors = self.state.errors.len(),
            duration_ms,
            "Harvest run finished"
        );

        Ok(RunReport {
            records,
            errors: std::mem::take(&mut self.state.errors),
            phase: RunPhase::Done,
            duration_ms,
        })
    }

    /// Obtains the source-description record, preferring an already
    /// published one. Returns the record and whether it is new to the
    /// remote store.
    ///
    /// Lookup failures fall back to treating the record as new; the next
    /// publish reconciles.
    async fn source_description_record(&mut self) -> Result<(Record, bool), RunError> {
        let new_record =
            self.repository
                .source_description()
                .map_err(|source| RunError::SourceDescription {
                    repository: self.repository.repository_id().to_string(),
                    source,
                })?;

        let existing_pid = match self.search.find_pid(new_record.pid()).await {
            Ok(Some(pid)) => pid,
            Ok(None) => return Ok((new_record, true)),
            Err(e) => {
                debug!(error = %e, "Source description lookup failed, treating as new");
                return Ok((new_record, true));
            }
        };

        match self.store.get(&existing_pid).await {
            Ok(mut existing) => {
                info!(pid = existing.pid(), "Found existing source description");
                // Union the locally built content into the stored record.
                // The stored PID is authoritative and may differ from the
                // locally computed candidate.
                let updates: Vec<_> = new_record
                    .iter()
                    .flat_map(|(_, entries)| entries.iter().cloned())
                    .collect();
                existing.add_record_entries(updates);
                Ok((existing, false))
            }
            Err(e) => {
                debug!(pid = %existing_pid, error = %e, "Source description fetch failed, treating as new");
                Ok((new_record, true))
            }
        }
    }

    /// Single LIFO pass over the deferred queue. Items failing here are
    /// recorded, never re-queued.
    async fn drain_pending(&mut self) {
        while let Some(pending) = self.state.pending.pop() {
            let PendingRelationship {
                presumed_target,
                entries,
                on_resolved,
                ..
            } = pending;
            debug!(presumed_target = %presumed_target, "Retrying deferred relationship");

            let mut resolver = RelationshipResolver::new(
                &mut self.state,
                self.store.as_ref(),
                self.search.as_ref(),
            );
            if let Err(e) = resolver
                .resolve(&presumed_target, entries, on_resolved, false)
                .await
            {
                self.state.record_error(presumed_target, e.to_string());
            }
        }
    }

    /// Pushes an updated source description to the store and index,
    /// best-effort.
    async fn update_source_description(&mut self, record: &Record) {
        info!(pid = record.pid(), "Updating existing source description");
        if let Err(e) = self.store.update(record).await {
            self.state
                .record_error(record.pid().to_string(), e.to_string());
        }
        if let Err(e) = self.search.index(record).await {
            self.state
                .record_error(record.pid().to_string(), e.to_string());
        }
    }

    /// Publishes the deduplicated batch. Store failure yields an empty
    /// result; index failure retains the created records.
    async fn publish(&mut self, records: Vec<Record>) -> Vec<Record> {
        info!(phase = %RunPhase::Publishing, count = records.len(), "Publishing batch");
        let created = match self.store.create_batch(&records).await {
            Ok(created) => created,
            Err(e) => {
                self.state.record_error("record-store", e.to_string());
                return Vec::new();
            }
        };

        self.state.materialized.extend(created.iter().cloned());

        if let Err(e) = self.search.index_batch(&created).await {
            // Records already exist remotely; only the indexing is lost.
            self.state.record_error("search-index", e.to_string());
        }

        created
    }

    /// Best-effort artifact of the deduplicated batch, for later inspection
    /// or reindexing; failures are logged and otherwise ignored.
    fn write_records_artifact(&self, repository_id: &str, deduplicated: &[Record]) {
        if let Some(path) = self.artifact_path(repository_id, "records") {
            write_json_artifact(&path, &deduplicated);
        }
    }

    /// Best-effort artifact of all errors recorded over the run.
    fn write_errors_artifact(&self, repository_id: &str) {
        if let Some(path) = self.artifact_path(repository_id, "errors") {
            write_json_artifact(&path, &self.state.errors);
        }
    }

    fn artifact_path(&self, repository_id: &str, prefix: &str) -> Option<PathBuf> {
        let dir = self.options.artifact_dir.as_ref()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "Cannot create artifact directory");
            return None;
        }
        let key = repository_id.replace('/', "_");
        Some(dir.join(format!("{prefix}_{key}.json")))
    }
}

fn write_json_artifact<T: serde::Serialize>(path: &Path, content: &T) {
    match serde_json::to_string_pretty(content) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!(path = %path.display(), error = %e, "Failed to write run artifact");
            } else {
                debug!(path = %path.display(), "Wrote run artifact");
            }
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to serialize run artifact"),
    }
}

// ============================================================================
// Reindexing
// ============================================================================

/// Errors raised by [`reindex_from_file`].
#[derive(Error, Debug)]
pub enum ReindexError {
    #[error("Failed to read record file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record file is not a valid record list: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Bulk-indexes a previously persisted wire-format record list, e.g. to
/// rebuild the search index from a run artifact.
///
/// Returns the number of records indexed.
pub async fn reindex_from_file(
    path: &Path,
    search: &dyn SearchIndex,
) -> Result<usize, ReindexError> {
    let content = std::fs::read_to_string(path)?;
    let records: Vec<Record> = serde_json::from_str(&content)?;
    info!(path = %path.display(), count = records.len(), "Reindexing records from file");
    search.index_batch(&records).await?;
    Ok(records.len())
}

// ============================================================================
// Tests
// ============================================================================
