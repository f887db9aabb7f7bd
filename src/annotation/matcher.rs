//! ModifierMatcher: find every place a modifier's text appears in flat text
//!
//! Case folding is done one char to one char before matching, so byte offsets
//! from the automaton convert back to char offsets of the original text.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::console;
use crate::document::FlatRange;
use crate::session::Modifier;
use crate::tokenizer::WordClass;

/// A modifier text hit in flat-text char offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierMatch {
    /// Index into the modifier slice the matcher was built from
    pub modifier_index: usize,
    pub range: FlatRange,
}

/// Lowercase without changing the char count
pub(crate) fn fold_char(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

pub(crate) fn fold(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

pub struct ModifierMatcher {
    automaton: Option<AhoCorasick>,
    /// Pattern id → modifier index
    pattern_owner: Vec<usize>,
    whole_words: bool,
    word_class: WordClass,
}

impl ModifierMatcher {
    pub fn new(modifiers: &[Modifier], whole_words: bool, word_class: WordClass) -> Self {
        let mut patterns = Vec::new();
        let mut pattern_owner = Vec::new();
        for (index, modifier) in modifiers.iter().enumerate() {
            let pattern = fold(modifier.entity.trim());
            if !pattern.is_empty() {
                patterns.push(pattern);
                pattern_owner.push(index);
            }
        }

        let automaton = if patterns.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .build(&patterns)
            {
                Ok(automaton) => Some(automaton),
                Err(e) => {
                    console::error(&format!("[ModifierMatcher] Failed to build automaton: {}", e));
                    None
                }
            }
        };

        Self { automaton, pattern_owner, whole_words, word_class }
    }

    /// All hits, overlapping ones included; overlap resolution happens later
    pub fn find(&self, flat_chars: &[char]) -> Vec<ModifierMatch> {
        let Some(automaton) = &self.automaton else {
            return Vec::new();
        };

        let mut haystack = String::with_capacity(flat_chars.len());
        // byte offset → char offset, with one trailing entry for the end
        let mut char_at_byte = Vec::with_capacity(flat_chars.len() + 1);
        for (i, &ch) in flat_chars.iter().enumerate() {
            let folded = fold_char(ch);
            char_at_byte.extend(std::iter::repeat(i).take(folded.len_utf8()));
            haystack.push(folded);
        }
        char_at_byte.push(flat_chars.len());

        automaton
            .find_overlapping_iter(&haystack)
            .filter_map(|mat| {
                let start = char_at_byte[mat.start()];
                let end = char_at_byte[mat.end()];
                let range = FlatRange::new(start, end);
                if self.whole_words && !self.is_whole_word(flat_chars, range) {
                    return None;
                }
                let modifier_index = *self.pattern_owner.get(mat.pattern().as_usize())?;
                Some(ModifierMatch { modifier_index, range })
            })
            .collect()
    }

    fn is_whole_word(&self, chars: &[char], range: FlatRange) -> bool {
        let left_ok = range.start == 0 || !self.word_class.contains(chars[range.start - 1]);
        let right_ok = range.end >= chars.len() || !self.word_class.contains(chars[range.end]);
        left_ok && right_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ModifierAction;

    fn modifier(id: &str, text: &str) -> Modifier {
        Modifier { id: id.into(), action: ModifierAction::Mask, entity: text.into(), modifier_type: None }
    }

    fn chars(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    #[test]
    fn test_case_insensitive_hits() {
        let matcher = ModifierMatcher::new(&[modifier("m1", "acme corp")], true, WordClass::default());
        let hits = matcher.find(&chars("ACME Corp and Acme corp"));
        let ranges: Vec<_> = hits.iter().map(|h| (h.range.start, h.range.end)).collect();
        assert_eq!(ranges, vec![(0, 9), (14, 23)]);
    }

    #[test]
    fn test_whole_word_filter() {
        let text = chars("Annabel met Ann");
        let strict = ModifierMatcher::new(&[modifier("m1", "Ann")], true, WordClass::default());
        assert_eq!(strict.find(&text).len(), 1);

        let loose = ModifierMatcher::new(&[modifier("m1", "Ann")], false, WordClass::default());
        assert_eq!(loose.find(&text).len(), 2);
    }

    #[test]
    fn test_offsets_are_chars_after_multibyte_text() {
        let matcher = ModifierMatcher::new(&[modifier("m1", "JÖRG")], true, WordClass::default());
        let hits = matcher.find(&chars("Grüße an Jörg"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].range, FlatRange::new(9, 13));
    }

    #[test]
    fn test_no_modifiers_no_hits() {
        let matcher = ModifierMatcher::new(&[modifier("m1", "  ")], true, WordClass::default());
        assert!(matcher.find(&chars("anything")).is_empty());
    }
}
