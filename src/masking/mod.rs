//! Text masking and unmasking with `[{LABEL}]` placeholders
//!
//! `mask_text` replaces entity occurrences in flat text, resolving overlaps the
//! same way the annotation builder does: entities whose text is also a mask
//! modifier beat plain detections. `unmask_text` puts known names back.

use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::annotation::{fold, resolve_overlaps, Claim};
use crate::console;
use crate::session::{Entity, KnownEntity};

/// Placeholder written in place of a masked occurrence
pub fn placeholder(label: &str) -> String {
    format!("[{{{}}}]", label)
}

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(r"\[\{([A-Za-z0-9_]+)\}\]") {
            Ok(re) => Some(re),
            Err(e) => {
                console::error(&format!("[Masking] Invalid placeholder pattern: {}", e));
                None
            }
        })
        .as_ref()
}

/// Replace every occurrence of `entities` in `text` with its placeholder.
///
/// `modifier_texts` are the texts of mask modifiers; an entity whose text is
/// one of them wins any overlap. Occurrences outside the text are skipped.
pub fn mask_text(text: &str, entities: &[Entity], modifier_texts: &[String]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let modifier_set: HashSet<String> = modifier_texts.iter().map(|t| fold(t.trim())).collect();

    let mut claims = Vec::new();
    for entity in entities {
        let is_modifier = modifier_set.contains(&fold(entity.raw_text.trim()));
        for occurrence in &entity.occurrences {
            let range = occurrence.range();
            if range.is_empty() || range.end > chars.len() {
                console::warn(&format!(
                    "[Masking] Skipping {} occurrence {}..{} outside text",
                    entity.label, range.start, range.end
                ));
                continue;
            }
            let claim = if is_modifier {
                Claim::modifier(range, entity.label.clone(), entity.label.as_str())
            } else {
                Claim::detection(range, entity.label.clone(), entity.label.as_str())
            };
            claims.push(claim);
        }
    }

    let resolved = resolve_overlaps(claims);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for claim in &resolved.kept {
        out.extend(&chars[cursor..claim.range.start]);
        out.push_str(&placeholder(claim.item));
        cursor = claim.range.end;
    }
    out.extend(&chars[cursor..]);
    out
}

/// Replace `[{LABEL}]` placeholders with known names; unknown labels stay
pub fn unmask_text(text: &str, known_entities: &[KnownEntity]) -> String {
    if text.is_empty() || known_entities.is_empty() {
        return text.to_string();
    }
    let Some(pattern) = placeholder_pattern() else {
        return text.to_string();
    };
    let names: HashMap<&str, &str> = known_entities
        .iter()
        .map(|k| (k.label.as_str(), k.name.as_str()))
        .collect();

    pattern
        .replace_all(text, |caps: &Captures| match names.get(&caps[1]) {
            Some(name) => name.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Align detected entity ids with the known entities of a scope.
///
/// An entity whose text matches a known name (case-insensitive) takes that
/// id; any other gets the next id above every known one. Labels are rebuilt
/// as `TYPE_id`, with the type taken from the known label when reused.
pub fn consolidate_entity_ids(entities: Vec<Entity>, known_entities: &[KnownEntity]) -> Vec<Entity> {
    let known: HashMap<String, &KnownEntity> =
        known_entities.iter().map(|k| (fold(k.name.trim()), k)).collect();
    let mut next_id = known_entities.iter().map(|k| k.id).max().unwrap_or(0);
    let mut assigned: HashMap<String, (i64, String)> = HashMap::new();

    entities
        .into_iter()
        .map(|mut entity| {
            let key = fold(entity.raw_text.trim());
            let (id, entity_type) = match (assigned.get(&key), known.get(&key)) {
                (Some(done), _) => done.clone(),
                (None, Some(k)) => {
                    let entity_type = k
                        .label
                        .rsplit_once('_')
                        .map(|(prefix, _)| prefix.to_string())
                        .unwrap_or_else(|| entity.entity_type.clone());
                    (k.id, entity_type)
                }
                (None, None) => {
                    next_id += 1;
                    (next_id, entity.entity_type.clone())
                }
            };
            assigned.insert(key, (id, entity_type.clone()));
            entity.id = id;
            entity.label = format!("{}_{}", entity_type, id);
            entity.entity_type = entity_type;
            entity
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
