//! Selection tokenizer and conflict resolver
//!
//! Turns a raw user selection into modifier candidates:
//! - `smart`: the selection grown to whole tokens
//! - `exact`: the literal selection, offered whenever it differs from `smart`
//!
//! A candidate that overlaps a rendered entity span or an existing modifier
//! range carries those ranges as conflicts. Creating a modifier from a
//! conflicting candidate is rejected, never merged.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::OverlayConfig;
use crate::document::FlatRange;

// =============================================================================
// WordClass
// =============================================================================

/// Characters that belong to a word: letters (any script), digits, plus extras
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordClass {
    extra: Vec<char>,
}

impl Default for WordClass {
    fn default() -> Self {
        Self::new(OverlayConfig::default().extra_word_chars)
    }
}

impl WordClass {
    pub fn new(extra: Vec<char>) -> Self {
        Self { extra }
    }

    pub fn contains(&self, ch: char) -> bool {
        ch.is_alphanumeric() || self.extra.contains(&ch)
    }
}

// =============================================================================
// Types
// =============================================================================

/// What an overlapping range belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Entity,
    Modifier,
}

/// A flat range already claimed by an annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupiedRange {
    pub kind: ConflictKind,
    /// Entity label or modifier id
    pub key: String,
    pub range: FlatRange,
}

/// Why a selection cannot become a modifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SelectionRejection {
    Empty,
    TooShort { graphemes: usize, min: usize },
    TooLong { graphemes: usize, max: usize },
    Conflicts(Vec<OccupiedRange>),
}

impl std::fmt::Display for SelectionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionRejection::Empty => write!(f, "Selection is empty"),
            SelectionRejection::TooShort { graphemes, min } => {
                write!(f, "Selection too short: {} < {}", graphemes, min)
            }
            SelectionRejection::TooLong { graphemes, max } => {
                write!(f, "Selection too long: {} > {}", graphemes, max)
            }
            SelectionRejection::Conflicts(conflicts) => {
                write!(f, "Selection overlaps {} existing annotation(s)", conflicts.len())
            }
        }
    }
}

/// One offer to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionCandidate {
    pub range: FlatRange,
    pub text: String,
    /// Whitespace-separated tokens, short ones removed
    pub tokens: Vec<String>,
    pub conflicts: Vec<OccupiedRange>,
}

impl SelectionCandidate {
    pub fn is_available(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// The range, or the conflicts that block it
    pub fn check(&self) -> Result<FlatRange, SelectionRejection> {
        if self.conflicts.is_empty() {
            Ok(self.range)
        } else {
            Err(SelectionRejection::Conflicts(self.conflicts.clone()))
        }
    }
}

/// Both readings of a selection. At least one is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionAnalysis {
    pub smart: Option<SelectionCandidate>,
    pub exact: Option<SelectionCandidate>,
}

impl SelectionAnalysis {
    /// Smart candidate if valid, else the exact one
    pub fn preferred(&self) -> Option<&SelectionCandidate> {
        self.smart.as_ref().or(self.exact.as_ref())
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone)]
pub struct Tokenizer {
    word_class: WordClass,
    min_token_chars: usize,
    min_selection_chars: usize,
    max_selection_chars: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&OverlayConfig::default())
    }
}

impl Tokenizer {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            word_class: WordClass::new(config.extra_word_chars.clone()),
            min_token_chars: config.min_token_chars,
            min_selection_chars: config.min_selection_chars,
            max_selection_chars: config.max_selection_chars,
        }
    }

    /// Strip whitespace from both ends of a range
    pub fn trim(&self, chars: &[char], range: FlatRange) -> FlatRange {
        let mut end = range.end.min(chars.len());
        let mut start = range.start.min(end);
        while start < end && chars[start].is_whitespace() {
            start += 1;
        }
        while end > start && chars[end - 1].is_whitespace() {
            end -= 1;
        }
        FlatRange::new(start, end)
    }

    /// Trim, then grow both ends while the neighbouring char is a word char.
    /// Expanding an already expanded range returns it unchanged.
    pub fn expand_selection(&self, chars: &[char], range: FlatRange) -> FlatRange {
        let FlatRange { mut start, mut end } = self.trim(chars, range);
        if start == end {
            return FlatRange::new(start, end);
        }
        while start > 0 && self.word_class.contains(chars[start - 1]) {
            start -= 1;
        }
        while end < chars.len() && self.word_class.contains(chars[end]) {
            end += 1;
        }
        FlatRange::new(start, end)
    }

    /// Whitespace-split tokens of a range, dropping those under the minimum length
    pub fn tokens(&self, chars: &[char], range: FlatRange) -> Vec<String> {
        let end = range.end.min(chars.len());
        let start = range.start.min(end);
        chars[start..end]
            .split(|c| c.is_whitespace())
            .filter(|token| token.len() >= self.min_token_chars)
            .map(|token| token.iter().collect())
            .collect()
    }

    /// Length rule, counted in user-perceived characters
    pub fn validate(&self, text: &str) -> Result<(), SelectionRejection> {
        let graphemes = text.graphemes(true).count();
        if graphemes == 0 {
            return Err(SelectionRejection::Empty);
        }
        if graphemes < self.min_selection_chars {
            return Err(SelectionRejection::TooShort { graphemes, min: self.min_selection_chars });
        }
        if graphemes > self.max_selection_chars {
            return Err(SelectionRejection::TooLong { graphemes, max: self.max_selection_chars });
        }
        Ok(())
    }

    fn candidate(&self, chars: &[char], range: FlatRange, occupied: &[OccupiedRange]) -> SelectionCandidate {
        SelectionCandidate {
            range,
            text: chars[range.start..range.end].iter().collect(),
            tokens: self.tokens(chars, range),
            conflicts: find_conflicts(range, occupied),
        }
    }

    /// Build the smart and exact candidates for a raw selection.
    ///
    /// Fails only when neither reading passes the length rule; the error is
    /// the exact reading's reason, since that is what the user selected.
    pub fn analyze_selection(
        &self,
        chars: &[char],
        raw: FlatRange,
        occupied: &[OccupiedRange],
    ) -> Result<SelectionAnalysis, SelectionRejection> {
        let exact_range = self.trim(chars, raw);
        if exact_range.is_empty() {
            return Err(SelectionRejection::Empty);
        }
        let smart_range = self.expand_selection(chars, exact_range);

        let smart = self.candidate(chars, smart_range, occupied);
        let smart_check = self.validate(&smart.text);

        if smart_range == exact_range {
            smart_check?;
            return Ok(SelectionAnalysis { smart: Some(smart), exact: None });
        }

        let exact = self.candidate(chars, exact_range, occupied);
        let exact_check = self.validate(&exact.text);

        match (smart_check, exact_check) {
            (Err(_), Err(reason)) => Err(reason),
            (smart_check, exact_check) => Ok(SelectionAnalysis {
                smart: smart_check.ok().map(|_| smart),
                exact: exact_check.ok().map(|_| exact),
            }),
        }
    }
}

/// Every occupied range sharing at least one character with `range`
pub fn find_conflicts(range: FlatRange, occupied: &[OccupiedRange]) -> Vec<OccupiedRange> {
    occupied
        .iter()
        .filter(|o| o.range.overlaps(&range))
        .cloned()
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    // -------------------------------------------------------------------------
    // Requirement 1: Partial selections grow to whole tokens
    // -------------------------------------------------------------------------
    #[test]
    fn test_partial_word_expands() {
        let tokenizer = Tokenizer::default();
        let text = chars("Hi John");
        // "oh"
        let expanded = tokenizer.expand_selection(&text, FlatRange::new(4, 6));
        assert_eq!(expanded, FlatRange::new(3, 7));
    }

    #[test]
    fn test_expansion_is_a_fixed_point() {
        let tokenizer = Tokenizer::default();
        let text = chars("Hi John");
        let once = tokenizer.expand_selection(&text, FlatRange::new(4, 6));
        let twice = tokenizer.expand_selection(&text, once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_expansion_at_text_edges() {
        let tokenizer = Tokenizer::default();
        let text = chars("John");
        assert_eq!(tokenizer.expand_selection(&text, FlatRange::new(1, 3)), FlatRange::new(0, 4));
    }

    #[test]
    fn test_expansion_keeps_accents_apostrophes_and_hyphens() {
        let tokenizer = Tokenizer::default();
        let text = chars("bei O'Brien-Müller zuhause");
        let expanded = tokenizer.expand_selection(&text, FlatRange::new(6, 9));
        assert_eq!(text[expanded.start..expanded.end].iter().collect::<String>(), "O'Brien-Müller");
    }

    #[test]
    fn test_expansion_trims_whitespace_first() {
        let tokenizer = Tokenizer::default();
        let text = chars("Hi  John  there");
        let expanded = tokenizer.expand_selection(&text, FlatRange::new(2, 10));
        assert_eq!(expanded, FlatRange::new(4, 8));
    }

    #[test]
    fn test_expansion_stops_at_punctuation() {
        let tokenizer = Tokenizer::default();
        let text = chars("Doe, John.");
        assert_eq!(tokenizer.expand_selection(&text, FlatRange::new(6, 7)), FlatRange::new(5, 9));
    }

    // -------------------------------------------------------------------------
    // Requirement 2: Tokens and length rule
    // -------------------------------------------------------------------------
    #[test]
    fn test_short_tokens_dropped() {
        let tokenizer = Tokenizer::default();
        let text = chars("J Doe and A Smith");
        let tokens = tokenizer.tokens(&text, FlatRange::new(0, text.len()));
        assert_eq!(tokens, vec!["Doe", "and", "Smith"]);
    }

    #[test]
    fn test_length_limits() {
        let tokenizer = Tokenizer::default();
        assert!(matches!(tokenizer.validate("J"), Err(SelectionRejection::TooShort { .. })));
        assert!(tokenizer.validate("Jo").is_ok());
        assert!(matches!(tokenizer.validate(&"x".repeat(101)), Err(SelectionRejection::TooLong { .. })));
        assert_eq!(tokenizer.validate(""), Err(SelectionRejection::Empty));
    }

    #[test]
    fn test_length_counts_graphemes() {
        let tokenizer = Tokenizer::default();
        // One user-perceived character built from two scalar values
        assert!(matches!(tokenizer.validate("e\u{301}"), Err(SelectionRejection::TooShort { .. })));
    }

    // -------------------------------------------------------------------------
    // Requirement 3: Both readings are offered
    // -------------------------------------------------------------------------
    #[test]
    fn test_analysis_offers_smart_and_exact() {
        let tokenizer = Tokenizer::default();
        let text = chars("Contact John Doe");
        let analysis = tokenizer.analyze_selection(&text, FlatRange::new(9, 14), &[]).unwrap();

        let smart = analysis.smart.unwrap();
        let exact = analysis.exact.unwrap();
        assert_eq!(smart.text, "John Doe");
        assert_eq!(exact.text, "ohn D");
        assert_eq!(smart.tokens, vec!["John", "Doe"]);
    }

    #[test]
    fn test_analysis_omits_exact_when_identical() {
        let tokenizer = Tokenizer::default();
        let text = chars("Contact John Doe");
        let analysis = tokenizer.analyze_selection(&text, FlatRange::new(8, 16), &[]).unwrap();
        assert!(analysis.exact.is_none());
        assert_eq!(analysis.preferred().unwrap().text, "John Doe");
    }

    #[test]
    fn test_exact_survives_when_smart_is_too_long() {
        let config = OverlayConfig { max_selection_chars: 4, ..OverlayConfig::default() };
        let tokenizer = Tokenizer::new(&config);
        let text = chars("Johnathan");
        let analysis = tokenizer.analyze_selection(&text, FlatRange::new(0, 4), &[]).unwrap();
        assert!(analysis.smart.is_none());
        assert_eq!(analysis.exact.unwrap().text, "John");
    }

    #[test]
    fn test_whitespace_selection_rejected() {
        let tokenizer = Tokenizer::default();
        let text = chars("a   b");
        assert_eq!(
            tokenizer.analyze_selection(&text, FlatRange::new(1, 4), &[]),
            Err(SelectionRejection::Empty)
        );
    }

    // -------------------------------------------------------------------------
    // Requirement 4: Overlaps are reported, even partial ones
    // -------------------------------------------------------------------------
    #[test]
    fn test_partial_overlap_is_a_conflict() {
        let tokenizer = Tokenizer::default();
        let text = chars("Contact John Doe");
        let occupied = vec![
            OccupiedRange { kind: ConflictKind::Entity, key: "PERSON_1".into(), range: FlatRange::new(13, 16) },
            OccupiedRange { kind: ConflictKind::Modifier, key: "modifier_1".into(), range: FlatRange::new(0, 7) },
        ];
        let analysis = tokenizer.analyze_selection(&text, FlatRange::new(8, 14), &occupied).unwrap();

        let smart = analysis.smart.unwrap();
        assert!(!smart.is_available());
        assert_eq!(smart.conflicts.len(), 1);
        assert_eq!(smart.conflicts[0].key, "PERSON_1");
        assert!(matches!(smart.check(), Err(SelectionRejection::Conflicts(_))));
    }

    #[test]
    fn test_adjacent_range_is_not_a_conflict() {
        let occupied = vec![OccupiedRange {
            kind: ConflictKind::Modifier,
            key: "m".into(),
            range: FlatRange::new(0, 7),
        }];
        assert!(find_conflicts(FlatRange::new(8, 12), &occupied).is_empty());
        assert!(find_conflicts(FlatRange::new(7, 12), &occupied).is_empty());
    }
}
