//! PositionMapping: flat-text offsets ↔ document positions
//!
//! Built by the extractor for one document snapshot. Stored as parallel
//! arrays: `doc_positions[i]` is the document position of flat character `i`.
//! Document positions are strictly increasing, so the reverse direction is a
//! binary search instead of a hash lookup.
//!
//! # Boundary convention
//! The detection service speaks `start..end` with `end` exclusive. The host
//! document addresses the *last included* character. `resolve_range` is the
//! single place where one is converted into the other.

use serde::{Deserialize, Serialize};

use crate::console;

// =============================================================================
// Types
// =============================================================================

/// Range in flat-text character offsets, `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlatRange {
    pub start: usize,
    pub end: usize,
}

impl FlatRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True if the two ranges share at least one character
    pub fn overlaps(&self, other: &FlatRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if `other` lies entirely inside `self`
    pub fn covers(&self, other: &FlatRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Resolved range in document positions; `to` is the position after the last
/// included character, which is what host decorations expect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocRange {
    pub from: usize,
    pub to: usize,
}

/// Why a flat range could not be placed on the current document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// `start >= end`
    Empty,
    /// One of the ends lies past the flat text
    OutOfBounds,
    /// Resolved start did not come before resolved end
    Inverted,
}

/// A range the mapper refused, kept for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRange {
    pub range: FlatRange,
    pub reason: DropReason,
}

// =============================================================================
// PositionMapping
// =============================================================================

/// Bidirectional index for one document snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionMapping {
    flat_text: String,
    flat_chars: Vec<char>,
    doc_positions: Vec<usize>,
    content_size: usize,
}

impl PositionMapping {
    /// Assemble from extractor output; `doc_positions` must be strictly increasing
    pub(crate) fn from_parts(flat_chars: Vec<char>, doc_positions: Vec<usize>, content_size: usize) -> Self {
        debug_assert_eq!(flat_chars.len(), doc_positions.len());
        debug_assert!(doc_positions.windows(2).all(|w| w[0] < w[1]));
        Self {
            flat_text: flat_chars.iter().collect(),
            flat_chars,
            doc_positions,
            content_size,
        }
    }

    pub fn flat_text(&self) -> &str {
        &self.flat_text
    }

    pub fn flat_chars(&self) -> &[char] {
        &self.flat_chars
    }

    /// Number of flat characters
    pub fn len(&self) -> usize {
        self.flat_chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat_chars.is_empty()
    }

    pub fn content_size(&self) -> usize {
        self.content_size
    }

    /// Flat text of a range, clamped to the text
    pub fn slice(&self, range: FlatRange) -> String {
        let end = range.end.min(self.flat_chars.len());
        let start = range.start.min(end);
        self.flat_chars[start..end].iter().collect()
    }

    /// Document position of a flat character
    pub fn doc_position(&self, flat_offset: usize) -> Option<usize> {
        self.doc_positions.get(flat_offset).copied()
    }

    /// Flat offset of the character at an exact document position
    pub fn flat_offset_at(&self, pos: usize) -> Option<usize> {
        self.doc_positions.binary_search(&pos).ok()
    }

    /// Flat range covering the characters of a document selection `from..to`
    pub fn flat_range_for(&self, from: usize, to: usize) -> FlatRange {
        let start = self.doc_positions.partition_point(|&p| p < from);
        let end = self.doc_positions.partition_point(|&p| p < to);
        FlatRange::new(start, end.max(start))
    }

    /// Resolve an exclusive-end flat range onto the document
    pub fn resolve_range(&self, range: FlatRange) -> Result<DocRange, DropReason> {
        if range.is_empty() {
            return Err(DropReason::Empty);
        }
        // Exclusive end → last included character
        let last = range.end - 1;
        let from = self.doc_position(range.start).ok_or(DropReason::OutOfBounds)?;
        let last_pos = self.doc_position(last).ok_or(DropReason::OutOfBounds)?;
        let to = last_pos + 1;
        if from >= to {
            return Err(DropReason::Inverted);
        }
        if to > self.content_size {
            return Err(DropReason::OutOfBounds);
        }
        Ok(DocRange { from, to })
    }
}

// =============================================================================
// PositionMapper
// =============================================================================

/// Resolution counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStats {
    pub resolved: u64,
    pub dropped: u64,
    pub dropped_empty: u64,
    pub dropped_out_of_bounds: u64,
    pub dropped_inverted: u64,
}

/// Resolves batches of flat ranges, counting and logging the ones it drops
#[derive(Debug, Default)]
pub struct PositionMapper {
    stats: MappingStats,
    dropped: Vec<DroppedRange>,
}

impl PositionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one range; failures are recorded and reported as `None`
    pub fn resolve(&mut self, mapping: &PositionMapping, range: FlatRange) -> Option<DocRange> {
        match mapping.resolve_range(range) {
            Ok(doc_range) => {
                self.stats.resolved += 1;
                Some(doc_range)
            }
            Err(reason) => {
                self.record_drop(range, reason);
                None
            }
        }
    }

    /// Resolve many ranges, keeping input order for the survivors
    pub fn resolve_all(&mut self, mapping: &PositionMapping, ranges: &[FlatRange]) -> Vec<(FlatRange, DocRange)> {
        ranges
            .iter()
            .filter_map(|&range| self.resolve(mapping, range).map(|doc| (range, doc)))
            .collect()
    }

    fn record_drop(&mut self, range: FlatRange, reason: DropReason) {
        self.stats.dropped += 1;
        match reason {
            DropReason::Empty => self.stats.dropped_empty += 1,
            DropReason::OutOfBounds => self.stats.dropped_out_of_bounds += 1,
            DropReason::Inverted => self.stats.dropped_inverted += 1,
        }
        console::warn(&format!(
            "[PositionMapper] Dropped range {}..{} ({:?})",
            range.start, range.end, reason
        ));
        self.dropped.push(DroppedRange { range, reason });
    }

    pub fn stats(&self) -> &MappingStats {
        &self.stats
    }

    pub fn dropped(&self) -> &[DroppedRange] {
        &self.dropped
    }

    pub fn into_parts(self) -> (MappingStats, Vec<DroppedRange>) {
        (self.stats, self.dropped)
    }
}

// =============================================================================
// Tests
// =============================================================================
