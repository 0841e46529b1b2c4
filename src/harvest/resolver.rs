//! Relationship resolution across in-flight, cached and remote records.
//!
//! Sources are discovered in arbitrary order: a dataset may reference its
//! parent study before the study's record exists, and vice versa. The
//! [`RelationshipResolver`] therefore looks for a relationship target in
//! three tiers, first match wins:
//!
//! 1. the creation buffer (records extracted this run, not yet created
//!    remotely)
//! 2. the materialized cache (records confirmed to exist remotely during
//!    this run)
//! 3. the remote store, located through the search index
//!
//! A target found in no tier is deferred exactly once: the relationship is
//! queued and retried after the per-resource extraction loop has finished,
//! this time without a further retry. An item failing twice becomes a hard,
//! reported error rather than looping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::datatypes::DIGITAL_OBJECT_LOCATION;
use crate::model::{Entry, EntryValue, Record};
use crate::traits::{RecordStore, SearchIndex};
use crate::util::decode_identifier_lossy;

// ============================================================================
// Batch state
// ============================================================================

/// One recorded per-item failure of a harvesting run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    /// What the failure relates to (resource URL, presumed PID, phase name)
    pub context: String,

    /// Human-readable failure description
    pub message: String,

    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

impl BatchError {
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Mutable state of one harvesting run.
///
/// Owned by a single `HarvestRun`; runs never share an instance, otherwise
/// tier-1/tier-2 matches could leak across unrelated batches.
#[derive(Debug, Default)]
pub struct BatchState {
    /// Records extracted this run but not yet sent to the remote store
    pub creation_buffer: Vec<Record>,

    /// Records confirmed to exist remotely, fetched or created this run
    pub materialized: Vec<Record>,

    /// Relationships whose target was not found on first attempt
    pub pending: Vec<PendingRelationship>,

    /// Per-item failures accumulated over the run
    pub errors: Vec<BatchError>,

    /// When set, tier-2/tier-3 resolutions skip remote persistence; the
    /// read-only lookups still run
    pub dry_run: bool,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a per-item failure without interrupting the run.
    pub fn record_error(&mut self, context: impl Into<String>, message: impl Into<String>) {
        let error = BatchError::new(context, message);
        warn!(
            context = %error.context,
            message = %error.message,
            "Recorded batch error"
        );
        self.errors.push(error);
    }
}

// ============================================================================
// Pending relationships
// ============================================================================

/// Continuation applied once a relationship target has been resolved:
/// adds an entry pointing at the resolved PID to the originating record.
///
/// Modeled as a command object rather than a closure so it can sit in the
/// deferred queue until the second resolution pass. Applying it when the
/// originating record is not buffered yet is a silent no-op; duplicate
/// suppression on [`Record::add_record_entry`] makes a later repeat add
/// harmless.
#[derive(Debug, Clone)]
pub struct BackReference {
    /// PID of the record the back-reference entry is added to
    pub source_pid: String,

    /// Attribute key of the back-reference entry
    pub key: String,

    /// Display name of the back-reference entry
    pub name: Option<String>,
}

impl BackReference {
    pub fn new(source_pid: impl Into<String>, key: impl Into<String>, name: Option<String>) -> Self {
        Self {
            source_pid: source_pid.into(),
            key: key.into(),
            name,
        }
    }
}

/// A relationship whose target could not be located immediately.
#[derive(Debug)]
pub struct PendingRelationship {
    /// The presumed identifier of the target record
    pub presumed_target: String,

    /// Entries to attach to the target once found
    pub entries: Vec<Entry>,

    /// Back-reference to apply on resolution
    pub on_resolved: Option<BackReference>,

    /// Whether another deferral is allowed; always `false` once queued
    pub retriable: bool,
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Entries were attached to the record with this PID
    Resolved(String),

    /// No target found; the relationship was queued for one retry
    Deferred,
}

/// Errors raised by the resolver.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Target not found and no retry allowed
    #[error("No record found for presumed target '{presumed_target}', retry disabled")]
    Unresolved {
        presumed_target: String,
        entries: Vec<Entry>,
    },
}

// ============================================================================
// Resolver
// ============================================================================

/// Three-tier relationship resolver over one run's [`BatchState`].
pub struct RelationshipResolver<'a> {
    state: &'a mut BatchState,
    store: &'a dyn RecordStore,
    search: &'a dyn SearchIndex,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(
        state: &'a mut BatchState,
        store: &'a dyn RecordStore,
        search: &'a dyn SearchIndex,
    ) -> Self {
        Self {
            state,
            store,
            search,
        }
    }

    /// Attaches `entries` to the record presumed to live under
    /// `presumed_target`, wherever that record currently is.
    ///
    /// `presumed_target` is either a final PID or the base64 encoding of the
    /// target's clear-text location; the decoded form is compared against
    /// each record's digital-object-location entry.
    ///
    /// Tier-2/tier-3 matches are persisted to the remote store best-effort:
    /// a persistence failure is recorded as a batch error, but the in-memory
    /// attachment still counts as success and is reconciled on the next
    /// publish. With [`BatchState::dry_run`] set, persistence is skipped
    /// entirely and only the read-only lookups reach the remote services.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unresolved`] when no tier matches and
    /// `allow_retry` is `false`. With `allow_retry` the miss is not an
    /// error: the relationship is queued and [`Resolution::Deferred`] is
    /// returned.
    pub async fn resolve(
        &mut self,
        presumed_target: &str,
        entries: Vec<Entry>,
        on_resolved: Option<BackReference>,
        allow_retry: bool,
    ) -> Result<Resolution, ResolveError> {
        let candidate = decode_identifier_lossy(presumed_target);
        debug!(
            presumed_target,
            candidate = %candidate,
            entry_count = entries.len(),
            "Resolving relationship"
        );

        // Tier 1: creation buffer. No remote contact.
        if let Some(index) = self
            .state
            .creation_buffer
            .iter()
            .position(|record| Self::matches(record, presumed_target, &candidate))
        {
            let pid = {
                let record = &mut self.state.creation_buffer[index];
                record.add_record_entries(entries);
                record.pid().to_string()
            };
            debug!(%pid, "Resolved against record in creation buffer");
            self.apply_back_reference(on_resolved, &pid);
            return Ok(Resolution::Resolved(pid));
        }

        // Tier 2: materialized cache, persisted best-effort.
        if let Some(index) = self
            .state
            .materialized
            .iter()
            .position(|record| Self::matches(record, presumed_target, &candidate))
        {
            let (pid, snapshot) = {
                let record = &mut self.state.materialized[index];
                record.add_record_entries(entries);
                (record.pid().to_string(), record.clone())
            };
            debug!(%pid, "Resolved against materialized record");
            self.persist_update(&snapshot).await;
            self.apply_back_reference(on_resolved, &pid);
            return Ok(Resolution::Resolved(pid));
        }

        // Tier 3: remote lookup through the search index.
        if let Some(mut record) = self.lookup_remote(&candidate).await {
            record.add_record_entries(entries);
            let pid = record.pid().to_string();
            let snapshot = record.clone();
            self.state.materialized.push(record);
            debug!(%pid, "Resolved against remote record");
            self.persist_update(&snapshot).await;
            self.apply_back_reference(on_resolved, &pid);
            return Ok(Resolution::Resolved(pid));
        }

        if allow_retry {
            debug!(presumed_target, "Target not found, deferring for one retry");
            self.state.pending.push(PendingRelationship {
                presumed_target: presumed_target.to_string(),
                entries,
                on_resolved,
                retriable: false,
            });
            return Ok(Resolution::Deferred);
        }

        Err(ResolveError::Unresolved {
            presumed_target: presumed_target.to_string(),
            entries,
        })
    }

    /// Matching rule shared by tiers 1 and 2: the record's PID equals the
    /// presumed target, or its declared location equals the decoded
    /// candidate.
    fn matches(record: &Record, presumed_target: &str, candidate: &str) -> bool {
        record.pid() == presumed_target
            || record.entry_exists(
                DIGITAL_OBJECT_LOCATION,
                Some(&EntryValue::scalar(candidate)),
            )
    }

    /// Tier-3 lookup: search index, then full fetch from the store.
    /// Every failure mode is a miss, never an error.
    async fn lookup_remote(&mut self, candidate: &str) -> Option<Record> {
        let pid = match self.search.find_pid(candidate).await {
            Ok(Some(pid)) => pid,
            Ok(None) => {
                debug!(candidate, "No match in search index");
                return None;
            }
            Err(e) => {
                debug!(candidate, error = %e, "Search index lookup failed");
                return None;
            }
        };

        match self.store.get(&pid).await {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(%pid, error = %e, "Record store fetch failed");
                None
            }
        }
    }

    /// Pushes an updated record to the remote store, downgrading failures
    /// to batch errors. In-memory state is already correct at this point.
    async fn persist_update(&mut self, record: &Record) {
        if self.state.dry_run {
            debug!(pid = record.pid(), "Dry run: skipping remote update of resolved record");
            return;
        }
        if let Err(e) = self.store.update(record).await {
            warn!(pid = record.pid(), error = %e, "Failed to persist resolved update");
            self.state
                .record_error(record.pid().to_string(), e.to_string());
        }
    }

    /// Applies a back-reference command against the buffer, then the cache.
    fn apply_back_reference(&mut self, on_resolved: Option<BackReference>, resolved_pid: &str) {
        let Some(back_ref) = on_resolved else {
            return;
        };

        let source = self
            .state
            .creation_buffer
            .iter_mut()
            .chain(self.state.materialized.iter_mut())
            .find(|record| record.pid() == back_ref.source_pid);

        match source {
            Some(record) => match Entry::new(back_ref.key, resolved_pid, back_ref.name) {
                Ok(entry) => record.add_record_entry(entry),
                Err(e) => warn!(
                    source_pid = %back_ref.source_pid,
                    error = %e,
                    "Discarding invalid back-reference entry"
                ),
            },
            None => debug!(
                source_pid = %back_ref.source_pid,
                "Back-reference source not buffered yet, skipping"
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
