//! PiiOverlay: one running document session
//!
//! Owns the current document snapshot and its position mapping, the session
//! store, and the detection bookkeeping. Every mutation ends with a rebuild of
//! the annotation set, so `annotations()` always reflects the current state.
//!
//! # Flow
//! 1. `set_document` on every editor change (remaps stored occurrences, arms the debouncer)
//!
//! Stored occurrences are only remapped against the text they were recorded
//! on. After a scope switch or a reload there is no such text yet, so the
//! first snapshot becomes the baseline unchanged.
//! 2. `detection_due` → `begin_detection` → host calls the service
//! 3. `apply_detection` / `fail_detection` when the call settles

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::annotation::{AnnotationBuilder, AnnotationSet, AnnotationSpan};
use crate::config::OverlayConfig;
use crate::console;
use crate::detection::{
    reconcile, Debouncer, DetectionRequest, DetectionResponse, DetectionTracker, ReconcileStatus,
    RejectedOccurrence, SnapshotTag, TrackerStats,
};
use crate::document::{extract, Document, FlatRange, PositionMapping, TextEdit};
use crate::masking::{mask_text, unmask_text};
use crate::session::{
    Entity, MemoryPersistence, MergeSummary, Modifier, ModifierAction, ModifierRequest,
    PersistStats, ScopeKey, ScopePersistence, SessionStore, TransferSummary,
};
use crate::tokenizer::{find_conflicts, SelectionAnalysis, SelectionRejection, Tokenizer};

// =============================================================================
// Errors and reports
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    InvalidDocument(String),
    InvalidResponse(String),
    Selection(SelectionRejection),
    RangeOutsideText { start: usize, end: usize, len: usize },
}

impl std::fmt::Display for OverlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayError::InvalidDocument(msg) => write!(f, "Invalid document: {}", msg),
            OverlayError::InvalidResponse(msg) => write!(f, "Invalid detection response: {}", msg),
            OverlayError::Selection(reason) => write!(f, "Selection rejected: {}", reason),
            OverlayError::RangeOutsideText { start, end, len } => {
                write!(f, "Range {}..{} outside text of length {}", start, end, len)
            }
        }
    }
}

impl std::error::Error for OverlayError {}

impl From<SelectionRejection> for OverlayError {
    fn from(reason: SelectionRejection) -> Self {
        OverlayError::Selection(reason)
    }
}

/// What `set_document` changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    pub edit: Option<TextEdit>,
    pub dropped_occurrences: usize,
}

/// A detection call ready to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDetection {
    pub tag: SnapshotTag,
    pub request: DetectionRequest,
}

/// What a detection response did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub status: ReconcileStatus,
    pub merged: MergeSummary,
    pub rejected: Vec<RejectedOccurrence>,
}

// =============================================================================
// PiiOverlay
// =============================================================================

pub struct PiiOverlay {
    config: OverlayConfig,
    store: SessionStore,
    scope: ScopeKey,
    document: Document,
    mapping: PositionMapping,
    tokenizer: Tokenizer,
    builder: AnnotationBuilder,
    tracker: DetectionTracker,
    debouncer: Debouncer,
    annotations: AnnotationSet,
    /// Flat text the active scope's occurrences refer to
    baseline: Option<String>,
    /// Scope and flat text each in-flight detection call was built from
    snapshots: HashMap<u64, (ScopeKey, String)>,
}

/// Snapshots kept for calls that never settle
const MAX_TRACKED_SNAPSHOTS: u64 = 32;

impl Default for PiiOverlay {
    fn default() -> Self {
        Self::new(OverlayConfig::default(), Box::new(MemoryPersistence::new()))
    }
}

impl PiiOverlay {
    pub fn new(config: OverlayConfig, persistence: Box<dyn ScopePersistence>) -> Self {
        Self {
            store: SessionStore::new(persistence, &config),
            scope: ScopeKey::Temporary,
            document: Document::default(),
            mapping: PositionMapping::default(),
            tokenizer: Tokenizer::new(&config),
            builder: AnnotationBuilder::new(&config),
            tracker: DetectionTracker::new(),
            debouncer: Debouncer::new(config.debounce_ms),
            annotations: AnnotationSet::default(),
            baseline: None,
            snapshots: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn flat_text(&self) -> &str {
        self.mapping.flat_text()
    }

    pub fn mapping(&self) -> &PositionMapping {
        &self.mapping
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    // -------------------------------------------------------------------------
    // Document
    // -------------------------------------------------------------------------

    /// Take a new snapshot: shift stored occurrences across the edit since the
    /// scope's baseline text, re-extract, rebuild
    pub fn set_document(&mut self, document: Document) -> DocumentChange {
        let mapping = extract(&document);
        let edit = self
            .baseline
            .as_deref()
            .and_then(|baseline| TextEdit::between(baseline, mapping.flat_text()));

        let mut change = DocumentChange { edit, dropped_occurrences: 0 };
        if let Some(edit) = &change.edit {
            change.dropped_occurrences = self.store.remap_occurrences(&self.scope, edit);
        }
        if self.mapping.flat_text() != mapping.flat_text() {
            self.debouncer.notify_change();
        }
        self.baseline = Some(mapping.flat_text().to_string());

        self.document = document;
        self.mapping = mapping;
        self.rebuild();
        change
    }

    pub fn set_document_json(&mut self, json: &str) -> Result<DocumentChange, OverlayError> {
        let document = Document::from_json(json).map_err(OverlayError::InvalidDocument)?;
        Ok(self.set_document(document))
    }

    // -------------------------------------------------------------------------
    // Detection
    // -------------------------------------------------------------------------

    /// Quiet interval elapsed since the last edit; consumes the pending change
    pub fn detection_due(&mut self) -> bool {
        self.debouncer.take_due()
    }

    /// Tag the current snapshot and build the service request
    pub fn begin_detection(&mut self) -> PendingDetection {
        self.debouncer.cancel();
        let tag = self.tracker.begin(self.mapping.flat_text());
        self.snapshots
            .retain(|generation, _| generation + MAX_TRACKED_SNAPSHOTS > tag.generation);
        self.snapshots
            .insert(tag.generation, (self.scope.clone(), self.mapping.flat_text().to_string()));
        let request = DetectionRequest::single(
            self.mapping.flat_text(),
            self.store.export_known_entities_for_detection_call(&self.scope),
            self.store.export_modifiers_for_detection_call(&self.scope),
        );
        PendingDetection { tag, request }
    }

    /// Merge a response into the active scope after validating it against the current text
    pub fn apply_detection(&mut self, tag: SnapshotTag, response: DetectionResponse) -> DetectionReport {
        let snapshot = self.snapshots.remove(&tag.generation);
        if let Some((scope, _)) = &snapshot {
            if *scope != self.scope {
                console::warn(&format!(
                    "[PiiOverlay] Dropping detection call {} issued for another scope",
                    tag.generation
                ));
                self.tracker.fail(tag);
                return DetectionReport {
                    status: ReconcileStatus::Superseded,
                    merged: MergeSummary::default(),
                    rejected: Vec::new(),
                };
            }
        }
        let since = snapshot.and_then(|(_, text)| TextEdit::between(&text, self.mapping.flat_text()));
        let outcome = reconcile(self.mapping.flat_text(), response, tag, since.as_ref(), &mut self.tracker);
        let merged = if outcome.entities.is_empty() {
            MergeSummary::default()
        } else {
            self.store.merge_detected_entities(&self.scope, outcome.entities)
        };
        if outcome.status != ReconcileStatus::Superseded {
            self.rebuild();
        }
        DetectionReport { status: outcome.status, merged, rejected: outcome.rejected }
    }

    pub fn apply_detection_json(&mut self, tag: SnapshotTag, json: &str) -> Result<DetectionReport, OverlayError> {
        match DetectionResponse::from_json(json) {
            Ok(response) => Ok(self.apply_detection(tag, response)),
            Err(e) => {
                self.fail_detection(tag, &e);
                Err(OverlayError::InvalidResponse(e))
            }
        }
    }

    /// The call failed; annotations stay as they are
    pub fn fail_detection(&mut self, tag: SnapshotTag, message: &str) {
        self.snapshots.remove(&tag.generation);
        self.tracker.fail(tag);
        console::warn(&format!(
            "[PiiOverlay] Detection call {} failed, keeping current annotations: {}",
            tag.generation, message
        ));
    }

    pub fn tracker_stats(&self) -> &TrackerStats {
        self.tracker.stats()
    }

    // -------------------------------------------------------------------------
    // Annotations
    // -------------------------------------------------------------------------

    fn rebuild(&mut self) {
        let entities = self.store.get_entities_for_display(&self.scope);
        let modifiers = self.store.get_active_modifiers(&self.scope);
        self.annotations = self.builder.build(&self.mapping, &entities, &modifiers);
    }

    pub fn annotations(&self) -> &[AnnotationSpan] {
        &self.annotations.spans
    }

    pub fn annotation_set(&self) -> &AnnotationSet {
        &self.annotations
    }

    // -------------------------------------------------------------------------
    // Selection → modifier
    // -------------------------------------------------------------------------

    /// Candidates for a document selection `from..to`
    pub fn analyze_selection(&self, from: usize, to: usize) -> Result<SelectionAnalysis, OverlayError> {
        let range = self.mapping.flat_range_for(from, to);
        let occupied = self.annotations.occupied_ranges();
        Ok(self.tokenizer.analyze_selection(self.mapping.flat_chars(), range, &occupied)?)
    }

    /// Create a modifier from a chosen candidate range. Rejected without any
    /// state change when the range overlaps an existing annotation.
    pub fn create_modifier_from_selection(
        &mut self,
        range: FlatRange,
        action: ModifierAction,
        modifier_type: Option<String>,
    ) -> Result<Modifier, OverlayError> {
        if range.end > self.mapping.len() || range.start > range.end {
            return Err(OverlayError::RangeOutsideText {
                start: range.start,
                end: range.end,
                len: self.mapping.len(),
            });
        }
        let range = self.tokenizer.trim(self.mapping.flat_chars(), range);
        let text = self.mapping.slice(range);
        self.tokenizer.validate(&text)?;

        let conflicts = find_conflicts(range, &self.annotations.occupied_ranges());
        if !conflicts.is_empty() {
            return Err(SelectionRejection::Conflicts(conflicts).into());
        }

        let request = ModifierRequest { action, entity: text, modifier_type };
        let modifier = self
            .store
            .add_modifier(&self.scope, request)
            .ok_or(OverlayError::Selection(SelectionRejection::Empty))?;
        self.rebuild();
        Ok(modifier)
    }

    // -------------------------------------------------------------------------
    // Store passthroughs (active scope)
    // -------------------------------------------------------------------------

    pub fn add_modifier(&mut self, request: ModifierRequest) -> Option<Modifier> {
        let modifier = self.store.add_modifier(&self.scope, request);
        if modifier.is_some() {
            self.rebuild();
        }
        modifier
    }

    pub fn remove_modifier(&mut self, id: &str) -> bool {
        let removed = self.store.remove_modifier(&self.scope, id);
        if removed {
            self.rebuild();
        }
        removed
    }

    pub fn toggle_masking(&mut self, label: &str, occurrence_index: Option<usize>) -> bool {
        let toggled = self.store.toggle_masking(&self.scope, label, occurrence_index);
        if toggled {
            self.rebuild();
        }
        toggled
    }

    pub fn entities_for_display(&mut self) -> Vec<Entity> {
        self.store.get_entities_for_display(&self.scope)
    }

    pub fn active_modifiers(&mut self) -> Vec<Modifier> {
        self.store.get_active_modifiers(&self.scope)
    }

    // -------------------------------------------------------------------------
    // Scopes
    // -------------------------------------------------------------------------

    /// Show another scope's state on the current document
    pub fn switch_scope(&mut self, scope: ScopeKey) {
        if scope.is_temporary() {
            self.store.activate_temporary_scope();
        }
        if scope != self.scope {
            // The new scope's occurrences were not recorded on this text
            self.baseline = None;
        }
        self.scope = scope;
        self.rebuild();
    }

    pub fn activate_temporary_scope(&mut self) {
        self.switch_scope(ScopeKey::Temporary);
    }

    /// Move the temporary bucket under a durable key and continue in that scope
    pub fn transfer_to_scope(&mut self, key: &str) -> TransferSummary {
        let summary = self.store.transfer_temporary_to_scope(key);
        let durable = ScopeKey::conversation(key);
        if summary.merged_into_existing {
            self.baseline = None;
        }
        if self.scope.is_temporary() {
            for (scope, _) in self.snapshots.values_mut() {
                if scope.is_temporary() {
                    *scope = durable.clone();
                }
            }
        }
        self.scope = durable;
        self.rebuild();
        summary
    }

    pub fn set_session_id(&mut self, key: &str, session_id: Option<String>) {
        self.store.set_session_id(key, session_id);
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn flush_pending(&mut self) -> usize {
        self.store.flush_pending()
    }

    pub fn persist_stats(&self) -> &PersistStats {
        self.store.persist_stats()
    }

    // -------------------------------------------------------------------------
    // Masking
    // -------------------------------------------------------------------------

    /// Flat text with every masked, non-ignored entity replaced by its placeholder
    pub fn masked_text(&mut self) -> String {
        let modifiers = self.store.get_active_modifiers(&self.scope);
        let ignored: Vec<&Modifier> = modifiers.iter().filter(|m| m.action == ModifierAction::Ignore).collect();
        let mask_texts: Vec<String> = modifiers
            .iter()
            .filter(|m| m.action == ModifierAction::Mask)
            .map(|m| m.entity.clone())
            .collect();

        // Same suppression rule as the annotation builder: whole-text ignores
        // and ignore hits covering an occurrence; partial hits do not count
        let ignore_ranges = self.builder.ignore_ranges(self.mapping.flat_chars(), &modifiers);
        let entities: Vec<Entity> = self
            .store
            .get_entities_for_display(&self.scope)
            .into_iter()
            .filter(|e| e.should_mask && !ignored.iter().any(|m| m.targets(e.raw_text.trim())))
            .map(|mut e| {
                e.occurrences
                    .retain(|o| !ignore_ranges.iter().any(|r| r.covers(&o.range())));
                e
            })
            .collect();

        mask_text(self.mapping.flat_text(), &entities, &mask_texts)
    }

    /// Put known names back into placeholder text
    pub fn unmask(&mut self, text: &str) -> String {
        let known = self.store.export_known_entities_for_detection_call(&self.scope);
        unmask_text(text, &known)
    }
}

// =============================================================================
// Tests
// =============================================================================
