//! Annotation Builder: entities + modifiers → renderable spans
//!
//! # Precedence
//! - an `ignore` modifier suppresses every occurrence of an entity with the
//!   same text, and any entity occurrence it covers
//! - a `mask` modifier renders with modifier styling over any entity span
//!   it overlaps
//! - remaining overlaps go through `resolve_overlaps`
//!
//! Every range is resolved through the `PositionMapper` of the current
//! snapshot; ranges it refuses are dropped one by one and counted.

pub mod matcher;
pub mod overlap;

pub use matcher::*;
pub use overlap::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::OverlayConfig;
use crate::document::{DroppedRange, FlatRange, MappingStats, PositionMapper, PositionMapping};
use crate::session::{Entity, Modifier, ModifierAction};
use crate::tokenizer::{ConflictKind, OccupiedRange, WordClass};

pub const STYLE_MASKED: &str = "pii-highlight pii-masked";
pub const STYLE_UNMASKED: &str = "pii-highlight pii-unmasked";
pub const STYLE_MODIFIER_MASK: &str = "pii-modifier pii-modifier-mask";
pub const STYLE_MODIFIER_IGNORE: &str = "pii-modifier pii-modifier-ignore";

// =============================================================================
// Span types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Entity,
    Modifier,
}

/// What a span stands for, for menus and tooltips
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpanPayload {
    Entity {
        label: String,
        #[serde(rename = "type")]
        entity_type: String,
        raw_text: String,
        #[serde(rename = "shouldMask")]
        should_mask: bool,
        /// Index into the entity's occurrence list
        #[serde(rename = "occurrenceIndex")]
        occurrence_index: usize,
    },
    Modifier {
        id: String,
        action: ModifierAction,
        entity: String,
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        modifier_type: Option<String>,
    },
}

/// A resolved, non-editable decoration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSpan {
    pub from: usize,
    pub to: usize,
    /// Flat-text range the span was resolved from
    pub flat: FlatRange,
    pub source_kind: SourceKind,
    pub style_class: String,
    pub payload: SpanPayload,
}

impl AnnotationSpan {
    /// Label for entity spans, id for modifier spans
    pub fn key(&self) -> &str {
        match &self.payload {
            SpanPayload::Entity { label, .. } => label,
            SpanPayload::Modifier { id, .. } => id,
        }
    }
}

/// Build counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationStats {
    pub entity_spans: usize,
    pub modifier_spans: usize,
    pub suppressed_by_ignore: usize,
    /// Ignore hits dropped because they only partly cover an entity occurrence
    pub partial_ignore_skipped: usize,
    pub overridden_by_modifier: usize,
    pub overlap_dropped: usize,
    pub stale_occurrences: usize,
    pub mapping: MappingStats,
}

/// Output of one build: spans sorted by `from`, no two sharing a character
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSet {
    pub spans: Vec<AnnotationSpan>,
    pub stats: AnnotationStats,
    pub dropped: Vec<DroppedRange>,
}

impl AnnotationSet {
    /// Ranges a new modifier selection must not overlap
    pub fn occupied_ranges(&self) -> Vec<OccupiedRange> {
        self.spans
            .iter()
            .map(|span| OccupiedRange {
                kind: match span.source_kind {
                    SourceKind::Entity => ConflictKind::Entity,
                    SourceKind::Modifier => ConflictKind::Modifier,
                },
                key: span.key().to_string(),
                range: span.flat,
            })
            .collect()
    }
}

fn ignore_ranges(hits: &[ModifierMatch], modifiers: &[Modifier]) -> Vec<FlatRange> {
    hits.iter()
        .filter(|hit| modifiers[hit.modifier_index].action == ModifierAction::Ignore)
        .map(|hit| hit.range)
        .collect()
}

fn modifier_style(action: ModifierAction) -> &'static str {
    match action {
        ModifierAction::Mask => STYLE_MODIFIER_MASK,
        ModifierAction::Ignore => STYLE_MODIFIER_IGNORE,
    }
}

// =============================================================================
// AnnotationBuilder
// =============================================================================

enum Source<'a> {
    Entity { entity: &'a Entity, occurrence_index: usize },
    Modifier(&'a Modifier),
}

pub struct AnnotationBuilder {
    whole_words: bool,
    verify_text: bool,
    word_class: WordClass,
}

impl Default for AnnotationBuilder {
    fn default() -> Self {
        Self::new(&OverlayConfig::default())
    }
}

impl AnnotationBuilder {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            whole_words: config.modifier_whole_words,
            verify_text: config.verify_occurrence_text,
            word_class: WordClass::new(config.extra_word_chars.clone()),
        }
    }

    pub fn build(&self, mapping: &PositionMapping, entities: &[Entity], modifiers: &[Modifier]) -> AnnotationSet {
        let mut stats = AnnotationStats::default();
        let flat_chars = mapping.flat_chars();

        // Modifier claims
        let matcher = ModifierMatcher::new(modifiers, self.whole_words, self.word_class.clone());
        let hits = matcher.find(flat_chars);

        let ignored_texts: HashSet<String> = modifiers
            .iter()
            .filter(|m| m.action == ModifierAction::Ignore)
            .map(|m| fold(m.entity.trim()))
            .collect();
        let ignore_ranges = ignore_ranges(&hits, modifiers);

        // Entity claims
        let mut claims: Vec<Claim<Source<'_>>> = Vec::new();
        for entity in entities {
            let ignored = ignored_texts.contains(&fold(entity.raw_text.trim()));
            for (occurrence_index, occurrence) in entity.occurrences.iter().enumerate() {
                let range = occurrence.range();
                if ignored || ignore_ranges.iter().any(|r| r.covers(&range)) {
                    stats.suppressed_by_ignore += 1;
                    continue;
                }
                if self.is_stale(mapping, entity, range) {
                    stats.stale_occurrences += 1;
                    continue;
                }
                claims.push(Claim::detection(
                    range,
                    entity.label.clone(),
                    Source::Entity { entity, occurrence_index },
                ));
            }
        }

        // Modifier claims. An ignore hit that only clips an entity occurrence
        // yields to it, so the entity keeps its span and its mask.
        for hit in &hits {
            let modifier = &modifiers[hit.modifier_index];
            let clips_entity = modifier.action == ModifierAction::Ignore
                && claims
                    .iter()
                    .any(|c| c.range.overlaps(&hit.range) && !hit.range.covers(&c.range));
            if clips_entity {
                stats.partial_ignore_skipped += 1;
                continue;
            }
            claims.push(Claim::modifier(hit.range, modifier.id.clone(), Source::Modifier(modifier)));
        }

        let resolved = resolve_overlaps(claims);
        for (_, by_modifier) in &resolved.lost {
            if *by_modifier {
                stats.overridden_by_modifier += 1;
            } else {
                stats.overlap_dropped += 1;
            }
        }

        // Place on the document
        let mut mapper = PositionMapper::new();
        let mut spans = Vec::with_capacity(resolved.kept.len());
        for claim in resolved.kept {
            let Some(doc_range) = mapper.resolve(mapping, claim.range) else { continue };
            let span = match claim.item {
                Source::Entity { entity, occurrence_index } => {
                    stats.entity_spans += 1;
                    AnnotationSpan {
                        from: doc_range.from,
                        to: doc_range.to,
                        flat: claim.range,
                        source_kind: SourceKind::Entity,
                        style_class: (if entity.should_mask { STYLE_MASKED } else { STYLE_UNMASKED }).to_string(),
                        payload: SpanPayload::Entity {
                            label: entity.label.clone(),
                            entity_type: entity.entity_type.clone(),
                            raw_text: entity.raw_text.clone(),
                            should_mask: entity.should_mask,
                            occurrence_index,
                        },
                    }
                }
                Source::Modifier(modifier) => {
                    stats.modifier_spans += 1;
                    AnnotationSpan {
                        from: doc_range.from,
                        to: doc_range.to,
                        flat: claim.range,
                        source_kind: SourceKind::Modifier,
                        style_class: modifier_style(modifier.action).to_string(),
                        payload: SpanPayload::Modifier {
                            id: modifier.id.clone(),
                            action: modifier.action,
                            entity: modifier.entity.clone(),
                            modifier_type: modifier.modifier_type.clone(),
                        },
                    }
                }
            };
            spans.push(span);
        }
        spans.sort_by_key(|s| (s.from, s.to));

        let (mapping_stats, dropped) = mapper.into_parts();
        stats.mapping = mapping_stats;
        AnnotationSet { spans, stats, dropped }
    }

    /// Flat ranges covered by `ignore` modifier text
    pub fn ignore_ranges(&self, flat_chars: &[char], modifiers: &[Modifier]) -> Vec<FlatRange> {
        let matcher = ModifierMatcher::new(modifiers, self.whole_words, self.word_class.clone());
        ignore_ranges(&matcher.find(flat_chars), modifiers)
    }

    /// The text under an in-bounds occurrence no longer reads as the entity.
    /// Out-of-bounds ranges are left to the mapper, which records why.
    fn is_stale(&self, mapping: &PositionMapping, entity: &Entity, range: FlatRange) -> bool {
        if !self.verify_text || range.is_empty() || range.end > mapping.len() {
            return false;
        }
        fold(&mapping.slice(range)) != fold(&entity.raw_text)
    }
}

// =============================================================================
// Tests
// =============================================================================
