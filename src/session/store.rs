//! SessionStore: the authoritative entity/modifier registry
//!
//! # Rules
//! 1. Entities are append-only and keyed by `label` within a scope
//! 2. Re-detecting a label unions its occurrences and keeps `should_mask`
//! 3. At most one modifier per case-insensitive entity text; newer replaces older
//! 4. Unknown scopes are created (or loaded) on first touch, never rejected
//! 5. Transferring the temporary bucket always leaves it empty and inactive
//!
//! One store per running document session, passed by reference; there is no
//! global instance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::OverlayConfig;
use crate::console;
use crate::document::TextEdit;
use crate::session::{
    ConversationPiiState, Entity, KnownEntity, MemoryPersistence, Modifier, ModifierAction,
    ModifierRequest, Occurrence, ModifierWire, PersistQueue, PersistStats, ScopeKey, ScopePersistence,
    TemporaryState,
};

// =============================================================================
// Result types
// =============================================================================

/// What a merge changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub new_occurrences: usize,
}

/// What a temporary → durable transfer moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub entities: usize,
    pub modifiers: usize,
    /// The durable key already held state and the bucket was merged into it
    pub merged_into_existing: bool,
}

/// Mutable view of one scope's collections
struct ScopeBucket<'a> {
    entities: &'a mut Vec<Entity>,
    modifiers: &'a mut Vec<Modifier>,
}

// =============================================================================
// SessionStore
// =============================================================================

pub struct SessionStore {
    temporary: TemporaryState,
    conversations: HashMap<String, ConversationPiiState>,
    persist: PersistQueue,
    default_mask_type: String,
    modifier_seq: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl SessionStore {
    pub fn new(persistence: Box<dyn ScopePersistence>, config: &OverlayConfig) -> Self {
        Self {
            temporary: TemporaryState::default(),
            conversations: HashMap::new(),
            persist: PersistQueue::new(persistence, config.persist_max_retries),
            default_mask_type: config.default_mask_type.clone(),
            modifier_seq: 0,
        }
    }

    /// Store backed by `MemoryPersistence` with default config
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryPersistence::new()), &OverlayConfig::default())
    }

    // -------------------------------------------------------------------------
    // Scope access
    // -------------------------------------------------------------------------

    fn ensure_conversation(&mut self, key: &str) {
        if self.conversations.contains_key(key) {
            return;
        }
        let state = match self.persist.load(key) {
            Ok(Some(state)) => state,
            Ok(None) => ConversationPiiState::default(),
            Err(e) => {
                console::warn(&format!("[SessionStore] Could not load '{}', starting empty: {}", key, e));
                ConversationPiiState::default()
            }
        };
        self.conversations.insert(key.to_string(), state);
    }

    /// Mutating access; the first write to the temporary bucket opens it
    fn bucket_for_write(&mut self, scope: &ScopeKey) -> ScopeBucket<'_> {
        if scope.is_temporary() {
            self.temporary.active = true;
        }
        self.bucket(scope)
    }

    fn bucket(&mut self, scope: &ScopeKey) -> ScopeBucket<'_> {
        match scope {
            ScopeKey::Temporary => {
                ScopeBucket {
                    entities: &mut self.temporary.entities,
                    modifiers: &mut self.temporary.modifiers,
                }
            }
            ScopeKey::Conversation(key) => {
                self.ensure_conversation(key);
                let state = self
                    .conversations
                    .entry(key.clone())
                    .or_default();
                ScopeBucket {
                    entities: &mut state.entities,
                    modifiers: &mut state.modifiers,
                }
            }
        }
    }

    /// Stamp and save a durable scope after a mutation
    fn commit(&mut self, scope: &ScopeKey) {
        if let ScopeKey::Conversation(key) = scope {
            if let Some(state) = self.conversations.get_mut(key) {
                state.last_updated = chrono::Utc::now().timestamp_millis();
                self.persist.save(key, state);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    /// Merge a detection result into a scope, matching by label
    pub fn merge_detected_entities(&mut self, scope: &ScopeKey, incoming: Vec<Entity>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        {
            let bucket = self.bucket_for_write(scope);
            for entity in incoming {
                match bucket.entities.iter_mut().find(|e| e.label == entity.label) {
                    Some(existing) => {
                        let added = existing.absorb_occurrences(&entity.occurrences);
                        if added > 0 {
                            summary.updated += 1;
                            summary.new_occurrences += added;
                        }
                    }
                    None => {
                        let occurrences = entity.occurrences.clone();
                        let mut fresh = Entity { occurrences: Vec::new(), should_mask: true, ..entity };
                        summary.new_occurrences += fresh.absorb_occurrences(&occurrences);
                        bucket.entities.push(fresh);
                        summary.inserted += 1;
                    }
                }
            }
        }
        self.commit(scope);
        summary
    }

    /// Flip `should_mask` for a label. Missing labels are a silent no-op.
    pub fn toggle_masking(&mut self, scope: &ScopeKey, label: &str, occurrence_index: Option<usize>) -> bool {
        let toggled = {
            let bucket = self.bucket_for_write(scope);
            match bucket.entities.iter_mut().find(|e| e.label == label) {
                Some(entity) => {
                    entity.should_mask = !entity.should_mask;
                    true
                }
                None => false,
            }
        };
        if toggled {
            self.commit(scope);
        } else {
            console::log(&format!(
                "[SessionStore] toggle_masking: no entity '{}' (occurrence {:?})",
                label, occurrence_index
            ));
        }
        toggled
    }

    /// Shift occurrences across a text edit, dropping those it touched.
    /// Returns the number of occurrences dropped. Saves only if something moved.
    pub fn remap_occurrences(&mut self, scope: &ScopeKey, edit: &TextEdit) -> usize {
        let mut dropped = 0;
        let mut changed = false;
        {
            let bucket = self.bucket(scope);
            for entity in bucket.entities.iter_mut() {
                let before = entity.occurrences.len();
                let remapped: Vec<Occurrence> = entity
                    .occurrences
                    .iter()
                    .filter_map(|o| edit.apply(o.range()).map(Into::into))
                    .collect();
                dropped += before - remapped.len();
                if remapped != entity.occurrences {
                    changed = true;
                    entity.occurrences = remapped;
                }
            }
        }
        if changed {
            self.commit(scope);
        }
        dropped
    }

    pub fn get_entities_for_display(&mut self, scope: &ScopeKey) -> Vec<Entity> {
        self.bucket(scope).entities.clone()
    }

    pub fn entity(&mut self, scope: &ScopeKey, label: &str) -> Option<Entity> {
        self.bucket(scope).entities.iter().find(|e| e.label == label).cloned()
    }

    // -------------------------------------------------------------------------
    // Modifiers
    // -------------------------------------------------------------------------

    fn next_modifier_id(&mut self) -> String {
        self.modifier_seq += 1;
        format!("modifier_{}_{}", chrono::Utc::now().timestamp_millis(), self.modifier_seq)
    }

    /// Add a modifier, replacing any existing one for the same text.
    /// Returns `None` only for blank text.
    pub fn add_modifier(&mut self, scope: &ScopeKey, request: ModifierRequest) -> Option<Modifier> {
        let entity = request.entity.trim().to_string();
        if entity.is_empty() {
            console::warn("[SessionStore] Ignoring modifier with empty text");
            return None;
        }

        let modifier_type = match request.action {
            ModifierAction::Ignore => None,
            ModifierAction::Mask => Some(
                request
                    .modifier_type
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| self.default_mask_type.clone()),
            ),
        };
        let modifier = Modifier {
            id: self.next_modifier_id(),
            action: request.action,
            entity,
            modifier_type,
        };

        {
            let bucket = self.bucket_for_write(scope);
            bucket.modifiers.retain(|m| !m.targets(&modifier.entity));
            bucket.modifiers.push(modifier.clone());
        }
        self.commit(scope);
        Some(modifier)
    }

    pub fn remove_modifier(&mut self, scope: &ScopeKey, id: &str) -> bool {
        let removed = {
            let bucket = self.bucket_for_write(scope);
            let before = bucket.modifiers.len();
            bucket.modifiers.retain(|m| m.id != id);
            bucket.modifiers.len() != before
        };
        if removed {
            self.commit(scope);
        }
        removed
    }

    pub fn get_active_modifiers(&mut self, scope: &ScopeKey) -> Vec<Modifier> {
        self.bucket(scope).modifiers.clone()
    }

    // -------------------------------------------------------------------------
    // Temporary scope lifecycle
    // -------------------------------------------------------------------------

    pub fn activate_temporary_scope(&mut self) {
        self.temporary.active = true;
    }

    pub fn temporary_state(&self) -> &TemporaryState {
        &self.temporary
    }

    /// Move the temporary bucket into a durable scope and clear it
    pub fn transfer_temporary_to_scope(&mut self, key: &str) -> TransferSummary {
        let taken = std::mem::take(&mut self.temporary);
        let mut summary = TransferSummary {
            entities: taken.entities.len(),
            modifiers: taken.modifiers.len(),
            merged_into_existing: false,
        };

        self.ensure_conversation(key);
        let scope = ScopeKey::conversation(key);
        let existing_empty = self.conversations.get(key).map_or(true, |s| s.is_empty());

        if existing_empty {
            let state = self.conversations.entry(key.to_string()).or_default();
            state.entities = taken.entities;
            state.modifiers = taken.modifiers;
            self.commit(&scope);
        } else {
            summary.merged_into_existing = true;
            let TemporaryState { entities, modifiers, .. } = taken;
            self.merge_preserving_mask(&scope, entities);
            for modifier in modifiers {
                let bucket = self.bucket(&scope);
                bucket.modifiers.retain(|m| !m.targets(&modifier.entity));
                bucket.modifiers.push(modifier);
            }
            self.commit(&scope);
        }

        debug_assert!(!self.temporary.active && self.temporary.entities.is_empty());

        console::log(&format!(
            "[SessionStore] Transferred {} entities / {} modifiers to '{}'",
            summary.entities, summary.modifiers, key
        ));
        summary
    }

    /// Like `merge_detected_entities`, but new labels keep their own mask flag
    fn merge_preserving_mask(&mut self, scope: &ScopeKey, incoming: Vec<Entity>) {
        let bucket = self.bucket(scope);
        for entity in incoming {
            match bucket.entities.iter_mut().find(|e| e.label == entity.label) {
                Some(existing) => {
                    existing.absorb_occurrences(&entity.occurrences);
                }
                None => bucket.entities.push(entity),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Durable scope metadata
    // -------------------------------------------------------------------------

    /// Record the detection service's session id for a durable scope
    pub fn set_session_id(&mut self, key: &str, session_id: Option<String>) {
        self.ensure_conversation(key);
        if let Some(state) = self.conversations.get_mut(key) {
            state.session_id = session_id;
        }
        self.commit(&ScopeKey::conversation(key));
    }

    /// Loaded state of a durable scope, if it has been touched
    pub fn scope_state(&self, key: &str) -> Option<&ConversationPiiState> {
        self.conversations.get(key)
    }

    /// Retry saves that failed earlier
    pub fn flush_pending(&mut self) -> usize {
        self.persist.flush_pending()
    }

    pub fn persist_stats(&self) -> &PersistStats {
        self.persist.stats()
    }

    // -------------------------------------------------------------------------
    // Detection-call exports
    // -------------------------------------------------------------------------

    /// Known entities to send with every detection call, so labels stay stable
    pub fn export_known_entities_for_detection_call(&mut self, scope: &ScopeKey) -> Vec<KnownEntity> {
        self.bucket(scope)
            .entities
            .iter()
            .map(|e| KnownEntity { id: e.id, label: e.label.clone(), name: e.raw_text.clone() })
            .collect()
    }

    pub fn export_modifiers_for_detection_call(&mut self, scope: &ScopeKey) -> Vec<ModifierWire> {
        self.bucket(scope).modifiers.iter().map(ModifierWire::from).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
