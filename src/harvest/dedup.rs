//! Deduplication of records sharing a PID.
//!
//! The same logical entity can be discovered through several sources within
//! one run (e.g. the same DOI reached from two datasets). Before publishing,
//! all records carrying the same PID are collapsed into one merged record.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{ModelError, Record};

/// Collapses records sharing a PID into one merged record per PID.
///
/// The first occurrence of each PID is the merge base; later duplicates are
/// merged into it in input order. The output preserves first-seen order of
/// PIDs. Idempotent: deduplicating an already-deduplicated list is a no-op.
///
/// # Errors
///
/// Propagates [`ModelError`] from [`Record::merge`]; cannot occur in
/// practice since only records with equal PIDs are merged.
pub fn deduplicate(records: Vec<Record>) -> Result<Vec<Record>, ModelError> {
    let mut order: Vec<String> = Vec::new();
    let mut by_pid: HashMap<String, Record> = HashMap::new();

    for record in records {
        match by_pid.get_mut(record.pid()) {
            Some(existing) => {
                debug!(pid = record.pid(), "Merging duplicate record");
                existing.merge(&record)?;
            }
            None => {
                order.push(record.pid().to_string());
                by_pid.insert(record.pid().to_string(), record);
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|pid| by_pid.remove(&pid))
        .collect())
}

/// Returns the record with the most entries in total.
pub fn largest_record(records: &[Record]) -> Option<&Record> {
    records.iter().max_by_key(|record| record.entry_count())
}

/// Returns the record with the most distinct attribute keys.
pub fn most_diverse_record(records: &[Record]) -> Option<&Record> {
    records.iter().max_by_key(|record| record.key_count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: &str, entries: &[(&str, &str)]) -> Record {
        let mut record = Record::new(pid).unwrap();
        for (key, value) in entries {
            record.add_entry(*key, *value, None).unwrap();
        }
        record
    }

    #[test]
    fn test_deduplicate_merges_by_first_occurrence() {
        let records = vec![
            record("sandbox/a", &[("k1", "v1")]),
            record("sandbox/b", &[("k1", "vb")]),
            record("sandbox/a", &[("k1", "v2"), ("k2", "v3")]),
        ];

        let deduplicated = deduplicate(records).unwrap();

        assert_eq!(deduplicated.len(), 2);
        assert_eq!(deduplicated[0].pid(), "sandbox/a");
        assert_eq!(deduplicated[1].pid(), "sandbox/b");
        assert_eq!(deduplicated[0].entry("k1").len(), 2);
        assert!(deduplicated[0].entry_exists("k2", None));
    }

    #[test]
    fn test_deduplicate_is_idempotent() {
        let records = vec![
            record("sandbox/a", &[("k1", "v1")]),
            record("sandbox/a", &[("k1", "v2")]),
        ];

        let once = deduplicate(records).unwrap();
        let twice = deduplicate(once.clone()).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_deduplicate_empty_input() {
        assert!(deduplicate(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_record_selection_helpers() {
        let records = vec![
            record(
                "sandbox/deep",
                &[("k1", "a"), ("k1", "b"), ("k1", "c"), ("k2", "d")],
            ),
            record("sandbox/wide", &[("k1", "a"), ("k2", "b"), ("k3", "c")]),
        ];

        assert_eq!(largest_record(&records).unwrap().pid(), "sandbox/deep");
        assert_eq!(most_diverse_record(&records).unwrap().pid(), "sandbox/wide");
        assert!(largest_record(&[]).is_none());
        assert!(most_diverse_record(&[]).is_none());
    }
}
