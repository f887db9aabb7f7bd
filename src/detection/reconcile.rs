//! reconcile: pure merge step for a detection response
//!
//! Input is the current flat text, the response, the tag of the request it
//! answers and, when known, the edit between the request's text and the
//! current one. Offsets outside that edit are shifted before validation;
//! offsets inside it are refused. Output is the entity list ready for `SessionStore::merge_detected_entities`
//! plus every occurrence that was refused. No state besides the tracker is touched.

use serde::{Deserialize, Serialize};

use crate::annotation::fold;
use crate::console;
use crate::detection::{DetectionResponse, DetectionTracker, ReconcileStatus, SnapshotTag};
use crate::document::{FlatRange, TextEdit};
use crate::session::{Entity, Occurrence};

/// Why a reported occurrence was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Empty,
    OutOfBounds,
    /// The text at the range no longer reads as the entity
    TextMismatch,
    /// Reported for a segment the response did not echo back
    UnknownSegment,
    /// The text was edited inside the range after the request was sent
    Edited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedOccurrence {
    pub label: String,
    pub range: FlatRange,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub status: ReconcileStatus,
    pub entities: Vec<Entity>,
    pub rejected: Vec<RejectedOccurrence>,
}

/// Validate a response against the current text
pub fn reconcile(
    current_text: &str,
    response: DetectionResponse,
    tag: SnapshotTag,
    since: Option<&TextEdit>,
    tracker: &mut DetectionTracker,
) -> ReconcileOutcome {
    let status = tracker.classify(tag, current_text);
    if status == ReconcileStatus::Superseded {
        console::log(&format!("[Detection] Ignoring superseded response (generation {})", tag.generation));
        return ReconcileOutcome { status, entities: Vec::new(), rejected: Vec::new() };
    }

    let chars: Vec<char> = current_text.chars().collect();
    let bases = segment_bases(&response);
    let since = since.filter(|_| status == ReconcileStatus::Revalidated);
    let mut entities: Vec<Entity> = Vec::new();
    let mut rejected = Vec::new();

    for (segment, found) in response.pii.into_iter().enumerate() {
        let base = bases.get(segment).copied();
        for detected in found {
            let mut accepted: Vec<Occurrence> = Vec::new();
            for occurrence in &detected.occurrences {
                let local = occurrence.range();
                let check = match base {
                    None => Err(RejectReason::UnknownSegment),
                    Some(base) => {
                        let range = FlatRange::new(local.start + base, local.end + base);
                        let shifted = match since {
                            Some(edit) => edit.apply(range).ok_or(RejectReason::Edited),
                            None => Ok(range),
                        };
                        shifted.and_then(|range| {
                            validate(&chars, range, &detected.raw_text, status).map(|_| range)
                        })
                    }
                };
                match check {
                    Ok(range) => accepted.push(range.into()),
                    Err(reason) => rejected.push(RejectedOccurrence {
                        label: detected.label.clone(),
                        range: local,
                        reason,
                    }),
                }
            }
            if accepted.is_empty() {
                continue;
            }

            match entities.iter_mut().find(|e| e.label == detected.label) {
                Some(existing) => {
                    existing.absorb_occurrences(&accepted);
                }
                None => {
                    let mut entity = Entity { occurrences: Vec::new(), ..detected };
                    entity.absorb_occurrences(&accepted);
                    entities.push(entity);
                }
            }
        }
    }

    if !rejected.is_empty() {
        console::warn(&format!(
            "[Detection] {:?}: rejected {} occurrence(s)",
            status,
            rejected.len()
        ));
    }

    ReconcileOutcome { status, entities, rejected }
}

/// Char offset of each echoed segment when the segments are joined by '\n'
fn segment_bases(response: &DetectionResponse) -> Vec<usize> {
    if response.text.is_empty() {
        // Service did not echo the text; a single segment is the whole text
        return vec![0];
    }
    let mut bases = Vec::with_capacity(response.text.len());
    let mut offset = 0;
    for segment in &response.text {
        bases.push(offset);
        offset += segment.chars().count() + 1;
    }
    bases
}

fn validate(chars: &[char], range: FlatRange, raw_text: &str, status: ReconcileStatus) -> Result<(), RejectReason> {
    if range.is_empty() {
        return Err(RejectReason::Empty);
    }
    if range.end > chars.len() {
        return Err(RejectReason::OutOfBounds);
    }
    if status == ReconcileStatus::Revalidated {
        let current: String = chars[range.start..range.end].iter().collect();
        if fold(&current) != fold(raw_text) {
            return Err(RejectReason::TextMismatch);
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
