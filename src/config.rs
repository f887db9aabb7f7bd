//! Configuration types and defaults for the PII overlay
//!
//! Every field has a serde default so hosts can pass a partial object.

use serde::{Deserialize, Serialize};

// =============================================================================
// Defaults
// =============================================================================

fn default_true() -> bool { true }
fn default_debounce_ms() -> u64 { 500 }
fn default_min_selection_chars() -> usize { 2 }
fn default_max_selection_chars() -> usize { 100 }
fn default_min_token_chars() -> usize { 2 }
fn default_extra_word_chars() -> Vec<char> { vec!['\'', '\u{2019}', '-', '_'] }
fn default_mask_type() -> String { "CUSTOM".to_string() }
fn default_persist_max_retries() -> u32 { 3 }

// =============================================================================
// OverlayConfig
// =============================================================================

/// Tunables for selection handling, annotation building and persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Quiet interval before a detection call is issued. Default: 500
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Shortest selection (graphemes) that may become a modifier. Default: 2
    #[serde(default = "default_min_selection_chars")]
    pub min_selection_chars: usize,
    /// Longest selection (graphemes) that may become a modifier. Default: 100
    #[serde(default = "default_max_selection_chars")]
    pub max_selection_chars: usize,
    /// Tokens shorter than this are discarded after splitting. Default: 2
    #[serde(default = "default_min_token_chars")]
    pub min_token_chars: usize,
    /// Non-alphanumeric characters that still belong to a word
    #[serde(default = "default_extra_word_chars")]
    pub extra_word_chars: Vec<char>,
    /// Category used for `mask` modifiers created without a type. Default: "CUSTOM"
    #[serde(default = "default_mask_type")]
    pub default_mask_type: String,
    /// Modifier text only matches whole tokens in the document. Default: true
    #[serde(default = "default_true")]
    pub modifier_whole_words: bool,
    /// Drop occurrences whose current text no longer matches the entity. Default: true
    #[serde(default = "default_true")]
    pub verify_occurrence_text: bool,
    /// Save attempts for a backed-up scope before it is left in memory only. Default: 3
    #[serde(default = "default_persist_max_retries")]
    pub persist_max_retries: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_selection_chars: default_min_selection_chars(),
            max_selection_chars: default_max_selection_chars(),
            min_token_chars: default_min_token_chars(),
            extra_word_chars: default_extra_word_chars(),
            default_mask_type: default_mask_type(),
            modifier_whole_words: true,
            verify_occurrence_text: true,
            persist_max_retries: default_persist_max_retries(),
        }
    }
}

impl OverlayConfig {
    /// Strict preset: longer quiet interval, whole-word modifiers, text verification
    pub fn strict() -> Self {
        Self {
            debounce_ms: 800,
            ..Self::default()
        }
    }

    /// Lenient preset: modifiers match inside words, occurrences are trusted as sent
    pub fn lenient() -> Self {
        Self {
            debounce_ms: 300,
            modifier_whole_words: false,
            verify_occurrence_text: false,
            ..Self::default()
        }
    }

    /// Parse from a JSON string, falling back to defaults for missing fields
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid overlay config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = OverlayConfig::from_json(r#"{ "debounce_ms": 250 }"#).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.max_selection_chars, 100);
        assert_eq!(config.default_mask_type, "CUSTOM");
        assert!(config.modifier_whole_words);
    }

    #[test]
    fn test_empty_json_equals_default() {
        let config = OverlayConfig::from_json("{}").unwrap();
        assert_eq!(config, OverlayConfig::default());
    }

    #[test]
    fn test_invalid_json_reports_error() {
        let err = OverlayConfig::from_json("{ not json").unwrap_err();
        assert!(err.starts_with("Invalid overlay config"));
    }

    #[test]
    fn test_lenient_preset() {
        let config = OverlayConfig::lenient();
        assert!(!config.modifier_whole_words);
        assert!(!config.verify_occurrence_text);
        assert_eq!(config.min_selection_chars, 2);
    }
}
