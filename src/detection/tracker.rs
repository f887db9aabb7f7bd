//! DetectionTracker: snapshot tags for in-flight detection calls
//!
//! Every call is tagged with a generation number and the content hash of the
//! flat text it was built from. When the response comes back:
//! - a newer response was already applied → superseded, ignored
//! - the text is unchanged → applied as is
//! - the text changed → applied after re-validating every occurrence

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Identifies the snapshot a detection call was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotTag {
    pub generation: u64,
    pub content_hash: u64,
}

/// How a response relates to the current document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    /// Snapshot still current
    Applied,
    /// Text changed since the request; mismatching occurrences dropped
    Revalidated,
    /// A newer response already landed
    Superseded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub issued: u64,
    pub applied: u64,
    pub revalidated: u64,
    pub superseded: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
pub struct DetectionTracker {
    generation: u64,
    last_applied: Option<u64>,
    stats: TrackerStats,
}

pub fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

impl DetectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a new detection call
    pub fn begin(&mut self, flat_text: &str) -> SnapshotTag {
        self.generation += 1;
        self.stats.issued += 1;
        SnapshotTag { generation: self.generation, content_hash: content_hash(flat_text) }
    }

    /// Decide what to do with a response; records it as applied unless superseded
    pub fn classify(&mut self, tag: SnapshotTag, current_text: &str) -> ReconcileStatus {
        if self.last_applied.map_or(false, |applied| applied >= tag.generation) {
            self.stats.superseded += 1;
            return ReconcileStatus::Superseded;
        }
        self.last_applied = Some(tag.generation);
        if tag.content_hash == content_hash(current_text) {
            self.stats.applied += 1;
            ReconcileStatus::Applied
        } else {
            self.stats.revalidated += 1;
            ReconcileStatus::Revalidated
        }
    }

    /// A call failed; nothing to apply
    pub fn fail(&mut self, _tag: SnapshotTag) {
        self.stats.failed += 1;
    }

    /// Generation of the newest call issued
    pub fn latest(&self) -> u64 {
        self.generation
    }

    pub fn is_in_flight(&self, tag: SnapshotTag) -> bool {
        tag.generation > self.last_applied.unwrap_or(0)
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }
}
