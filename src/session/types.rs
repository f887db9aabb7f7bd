//! Entity, modifier and scope state types
//!
//! Field names on the detection wire are snake_case (`raw_text`, `start_idx`);
//! state handed to the host UI and persistence uses the host's camelCase
//! (`shouldMask`, `lastUpdated`). Both spellings are accepted when reading.

use serde::{Deserialize, Serialize};

use crate::document::FlatRange;

fn default_true() -> bool { true }

// =============================================================================
// Entity
// =============================================================================

/// One place an entity appears, in flat-text char offsets (`end_idx` exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Occurrence {
    pub start_idx: usize,
    pub end_idx: usize,
}

impl Occurrence {
    pub fn new(start_idx: usize, end_idx: usize) -> Self {
        Self { start_idx, end_idx }
    }

    pub fn range(&self) -> FlatRange {
        FlatRange::new(self.start_idx, self.end_idx)
    }
}

impl From<FlatRange> for Occurrence {
    fn from(range: FlatRange) -> Self {
        Self::new(range.start, range.end)
    }
}

/// A detected piece of sensitive information.
///
/// `label` (`PERSON_1`) is the stable key: two entities with the same label
/// are the same person or item even if the service reported different ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub raw_text: String,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
    #[serde(rename = "shouldMask", alias = "should_mask", default = "default_true")]
    pub should_mask: bool,
}

impl Entity {
    pub fn new(id: i64, label: impl Into<String>, entity_type: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            entity_type: entity_type.into(),
            raw_text: raw_text.into(),
            occurrences: Vec::new(),
            should_mask: true,
        }
    }

    pub fn with_occurrence(mut self, start_idx: usize, end_idx: usize) -> Self {
        self.occurrences.push(Occurrence::new(start_idx, end_idx));
        self
    }

    /// Union `incoming` into the occurrence list; returns how many were new
    pub fn absorb_occurrences(&mut self, incoming: &[Occurrence]) -> usize {
        let mut added = 0;
        for occurrence in incoming {
            if !self.occurrences.contains(occurrence) {
                self.occurrences.push(*occurrence);
                added += 1;
            }
        }
        if added > 0 {
            self.occurrences.sort();
        }
        added
    }
}

// =============================================================================
// Modifier
// =============================================================================

/// What the user wants the detection service to do with a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierAction {
    /// Never report this text as PII
    Ignore,
    /// Always report this text as PII
    #[serde(alias = "string-mask", alias = "word-mask")]
    Mask,
}

impl ModifierAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModifierAction::Ignore => "ignore",
            ModifierAction::Mask => "mask",
        }
    }
}

impl std::str::FromStr for ModifierAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(ModifierAction::Ignore),
            "mask" | "string-mask" | "word-mask" => Ok(ModifierAction::Mask),
            other => Err(format!("Unknown modifier action '{}'", other)),
        }
    }
}

/// A user-authored override, unique per case-insensitive `entity` text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub id: String,
    pub action: ModifierAction,
    pub entity: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub modifier_type: Option<String>,
}

impl Modifier {
    /// Same target text, ignoring case
    pub fn targets(&self, text: &str) -> bool {
        self.entity.to_lowercase() == text.to_lowercase()
    }
}

/// Input for `SessionStore::add_modifier`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierRequest {
    pub action: ModifierAction,
    pub entity: String,
    #[serde(rename = "type", default)]
    pub modifier_type: Option<String>,
}

impl ModifierRequest {
    pub fn ignore(entity: impl Into<String>) -> Self {
        Self { action: ModifierAction::Ignore, entity: entity.into(), modifier_type: None }
    }

    pub fn mask(entity: impl Into<String>, modifier_type: Option<&str>) -> Self {
        Self {
            action: ModifierAction::Mask,
            entity: entity.into(),
            modifier_type: modifier_type.map(str::to_string),
        }
    }
}

// =============================================================================
// Detection-call exports
// =============================================================================

/// Entity as sent back to the service so it keeps assigning the same label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownEntity {
    pub id: i64,
    pub label: String,
    pub name: String,
}

/// Modifier in the service's request shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierWire {
    pub action: ModifierAction,
    pub entity: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub modifier_type: Option<String>,
}

impl From<&Modifier> for ModifierWire {
    fn from(modifier: &Modifier) -> Self {
        Self {
            action: modifier.action,
            entity: modifier.entity.clone(),
            modifier_type: modifier.modifier_type.clone(),
        }
    }
}

// =============================================================================
// Scopes
// =============================================================================

/// Isolation boundary for entity/modifier state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// Anonymous bucket used before a durable identifier exists
    Temporary,
    /// Keyed by conversation/session identifier
    Conversation(String),
}

impl ScopeKey {
    pub fn conversation(key: impl Into<String>) -> Self {
        ScopeKey::Conversation(key.into())
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, ScopeKey::Temporary)
    }
}

impl From<Option<String>> for ScopeKey {
    fn from(key: Option<String>) -> Self {
        match key {
            Some(key) if !key.is_empty() => ScopeKey::Conversation(key),
            _ => ScopeKey::Temporary,
        }
    }
}

/// Pre-identification bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryState {
    pub entities: Vec<Entity>,
    pub modifiers: Vec<Modifier>,
    pub active: bool,
}

/// Durable per-conversation state, the unit of persistence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationPiiState {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(rename = "sessionId", alias = "session_id", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Unix milliseconds of the last mutation
    #[serde(rename = "lastUpdated", alias = "last_updated", default)]
    pub last_updated: i64,
}

impl ConversationPiiState {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.modifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_from_service_json_defaults_to_masked() {
        let json = r#"{
            "id": 1, "label": "PERSON_1", "type": "PERSON", "raw_text": "John Doe",
            "text": "john doe",
            "occurrences": [{ "start_idx": 8, "end_idx": 16 }]
        }"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        assert!(entity.should_mask);
        assert_eq!(entity.entity_type, "PERSON");
        assert_eq!(entity.occurrences[0].range(), FlatRange::new(8, 16));
    }

    #[test]
    fn test_entity_serializes_should_mask_camel_case() {
        let entity = Entity::new(1, "EMAIL_1", "EMAIL", "a@b.de");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["shouldMask"], true);
        assert_eq!(json["type"], "EMAIL");
    }

    #[test]
    fn test_absorb_occurrences_is_a_union() {
        let mut entity = Entity::new(1, "PERSON_1", "PERSON", "Ann").with_occurrence(10, 13);
        let added = entity.absorb_occurrences(&[Occurrence::new(0, 3), Occurrence::new(10, 13)]);
        assert_eq!(added, 1);
        assert_eq!(entity.occurrences, vec![Occurrence::new(0, 3), Occurrence::new(10, 13)]);
    }

    #[test]
    fn test_modifier_action_aliases() {
        let action: ModifierAction = serde_json::from_str("\"word-mask\"").unwrap();
        assert_eq!(action, ModifierAction::Mask);
        assert_eq!(serde_json::to_string(&ModifierAction::Ignore).unwrap(), "\"ignore\"");
        assert_eq!("string-mask".parse::<ModifierAction>(), Ok(ModifierAction::Mask));
        assert!("unmask".parse::<ModifierAction>().is_err());
    }

    #[test]
    fn test_modifier_wire_omits_missing_type() {
        let wire = ModifierWire { action: ModifierAction::Ignore, entity: "Acme".into(), modifier_type: None };
        let json = serde_json::to_string(&wire).unwrap();
        assert_eq!(json, r#"{"action":"ignore","entity":"Acme"}"#);
    }

    #[test]
    fn test_scope_key_from_option() {
        assert_eq!(ScopeKey::from(None), ScopeKey::Temporary);
        assert_eq!(ScopeKey::from(Some(String::new())), ScopeKey::Temporary);
        assert_eq!(ScopeKey::from(Some("chat-1".to_string())), ScopeKey::conversation("chat-1"));
    }
}
