//! Per-document file record table.
//!
//! One [`FileRecord`] per distinct hash, created on first discovery and never
//! removed. State moves `Loading → {Named | Unnamed}`, `Unnamed → Named` once
//! the agent acknowledges a name, and never leaves `Named` within an epoch.
//! A missing archive directory overrides every record with `Unavailable`;
//! restoring it starts a new epoch in which every record is `Loading` again.

use std::collections::HashMap;

use crate::discovery::DiscoveredMedia;
use crate::protocol::NameMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState {
    Loading,
    Named(String),
    Unnamed,
    Unavailable(String),
}

impl RecordState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Named(_) => "named",
            Self::Unnamed => "unnamed",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub hash: String,
    pub original_filename: String,
    pub current_filename: String,
    pub source_url: String,
    /// 1-based position in discovery order; drives focus traversal.
    pub index: usize,
    pub state: RecordState,
    /// Name submitted with a `set` that the agent has not acknowledged yet.
    pub pending: Option<String>,
}

impl FileRecord {
    fn new(media: DiscoveredMedia, index: usize) -> Self {
        Self {
            hash: media.hash,
            original_filename: media.original_filename,
            current_filename: media.current_filename,
            source_url: media.source_url,
            index,
            state: RecordState::Loading,
            pending: None,
        }
    }

    /// Accepts user input: unnamed and not waiting on an acknowledgement.
    pub fn is_editable(&self) -> bool {
        self.state == RecordState::Unnamed && self.pending.is_none()
    }
}

/// Why a submission was not turned into a `set` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitRejected {
    EmptyName,
    UnknownHash,
    NotEditable(&'static str),
    AlreadyPending,
}

/// Outcome of applying a name map.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NamesApplied {
    /// Hashes whose record changed and must be re-rendered.
    pub changed: Vec<String>,
    /// Names confirmed by this map, for the suggestion engine.
    pub confirmed: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RecordTable {
    records: HashMap<String, FileRecord>,
    order: Vec<String>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, hash: &str) -> Option<&FileRecord> {
        self.records.get(hash)
    }

    /// Records in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.order.iter().filter_map(|h| self.records.get(h))
    }

    pub fn hashes(&self) -> &[String] {
        &self.order
    }

    /// Hashes still waiting for an answer, in discovery order.
    pub fn loading_hashes(&self) -> Vec<String> {
        self.iter()
            .filter(|r| r.state == RecordState::Loading)
            .map(|r| r.hash.clone())
            .collect()
    }

    /// Insert newly discovered media. Already-known hashes are ignored, so a
    /// record is created at most once per hash. Returns the new hashes.
    pub fn discover(&mut self, batch: impl IntoIterator<Item = DiscoveredMedia>) -> Vec<String> {
        let mut added = Vec::new();
        for media in batch {
            if self.records.contains_key(&media.hash) {
                continue;
            }
            let hash = media.hash.clone();
            let index = self.order.len() + 1;
            self.records.insert(hash.clone(), FileRecord::new(media, index));
            self.order.push(hash.clone());
            added.push(hash);
        }
        added
    }

    /// Apply an authoritative name map. Hashes absent from the map are left
    /// untouched; unknown hashes are ignored.
    pub fn apply_names(&mut self, names: &NameMap) -> NamesApplied {
        let mut applied = NamesApplied::default();
        for (hash, name) in names {
            let Some(record) = self.records.get_mut(hash) else {
                continue;
            };
            match (name, &record.state) {
                (_, RecordState::Unavailable(_)) => {}
                (Some(name), RecordState::Loading | RecordState::Unnamed) => {
                    record.state = RecordState::Named(name.clone());
                    record.pending = None;
                    applied.changed.push(hash.clone());
                    applied.confirmed.push(name.clone());
                }
                (Some(name), RecordState::Named(_)) => {
                    applied.confirmed.push(name.clone());
                }
                (None, RecordState::Loading) => {
                    record.state = RecordState::Unnamed;
                    applied.changed.push(hash.clone());
                }
                (None, RecordState::Unnamed | RecordState::Named(_)) => {}
            }
        }
        applied
    }

    /// Validate a user submission and mark it pending.
    pub fn begin_submit(&mut self, hash: &str, name: &str) -> Result<&FileRecord, SubmitRejected> {
        if name.is_empty() {
            return Err(SubmitRejected::EmptyName);
        }
        let record = self
            .records
            .get_mut(hash)
            .ok_or(SubmitRejected::UnknownHash)?;
        if record.state != RecordState::Unnamed {
            return Err(SubmitRejected::NotEditable(record.state.label()));
        }
        if record.pending.is_some() {
            return Err(SubmitRejected::AlreadyPending);
        }
        record.pending = Some(name.to_string());
        Ok(record)
    }

    /// Drop a pending submission after the `set` failed. Returns true if the
    /// record changed.
    pub fn fail_submit(&mut self, hash: &str) -> bool {
        self.records
            .get_mut(hash)
            .and_then(|r| r.pending.take())
            .is_some()
    }

    /// Override every record with `Unavailable(reason)`.
    pub fn mark_all_unavailable(&mut self, reason: &str) -> Vec<String> {
        for record in self.records.values_mut() {
            record.state = RecordState::Unavailable(reason.to_string());
            record.pending = None;
        }
        self.order.clone()
    }

    /// Give up on the listed hashes that are still `Loading`.
    pub fn mark_unavailable(&mut self, hashes: &[String], reason: &str) -> Vec<String> {
        let mut changed = Vec::new();
        for hash in hashes {
            let Some(record) = self.records.get_mut(hash) else {
                continue;
            };
            if record.state == RecordState::Loading {
                record.state = RecordState::Unavailable(reason.to_string());
                changed.push(hash.clone());
            }
        }
        changed
    }

    /// Start a new epoch: every record goes back to `Loading`.
    pub fn reset_all_loading(&mut self) -> Vec<String> {
        for record in self.records.values_mut() {
            record.state = RecordState::Loading;
            record.pending = None;
        }
        self.order.clone()
    }

    /// Put records that gave up with `reason` back into `Loading`, in
    /// discovery order.
    pub fn retry_unavailable(&mut self, reason: &str) -> Vec<String> {
        let mut retried = Vec::new();
        for hash in &self.order {
            let Some(record) = self.records.get_mut(hash) else {
                continue;
            };
            if matches!(&record.state, RecordState::Unavailable(r) if r == reason) {
                record.state = RecordState::Loading;
                retried.push(hash.clone());
            }
        }
        retried
    }

    /// The next editable record after `hash` in discovery order.
    pub fn next_editable_after(&self, hash: &str) -> Option<&FileRecord> {
        let index = self.records.get(hash)?.index;
        self.iter().find(|r| r.index > index && r.is_editable())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Rediscovering any mix of hashes never duplicates a record.
        #[test]
        fn one_record_per_hash(batches in proptest::collection::vec(
            proptest::collection::vec("[a-e]", 0..6), 0..6)
        ) {
            let mut table = RecordTable::new();
            let mut distinct = std::collections::HashSet::new();
            for batch in &batches {
                table.discover(batch.iter().map(|h| DiscoveredMedia {
                    hash: h.clone(),
                    original_filename: "o".into(),
                    current_filename: "c".into(),
                    source_url: "u".into(),
                }));
                distinct.extend(batch.iter().cloned());
            }
            prop_assert_eq!(table.len(), distinct.len());
            let indexes: Vec<usize> = table.iter().map(|r| r.index).collect();
            let expected: Vec<usize> = (1..=distinct.len()).collect();
            prop_assert_eq!(indexes, expected);
        }
    }
}
