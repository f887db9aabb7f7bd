//! TextEdit: single-region diff between two flat snapshots
//!
//! Keystroke-sized edits touch one contiguous region. Everything before the
//! region keeps its offsets, everything after shifts by the length delta, and
//! anything overlapping the region can no longer be trusted.

use serde::{Deserialize, Serialize};

use crate::document::FlatRange;

/// The changed region between an old and a new flat text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    /// First changed character (same in both texts)
    pub start: usize,
    /// End of the replaced region in the old text
    pub old_end: usize,
    /// End of the inserted region in the new text
    pub new_end: usize,
}

impl TextEdit {
    /// Diff two texts by common prefix and suffix; `None` if they are equal
    pub fn between(old: &str, new: &str) -> Option<Self> {
        if old == new {
            return None;
        }
        let old_chars: Vec<char> = old.chars().collect();
        let new_chars: Vec<char> = new.chars().collect();

        let prefix = old_chars
            .iter()
            .zip(new_chars.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
        let suffix = old_chars
            .iter()
            .rev()
            .zip(new_chars.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        Some(Self {
            start: prefix,
            old_end: old_chars.len() - suffix,
            new_end: new_chars.len() - suffix,
        })
    }

    /// Net length change
    pub fn shift(&self) -> i64 {
        self.new_end as i64 - self.old_end as i64
    }

    /// The replaced region in old-text coordinates
    pub fn old_range(&self) -> FlatRange {
        FlatRange::new(self.start, self.old_end)
    }

    /// Map a range from the old text into the new text.
    /// Returns `None` when the edit touched the range's characters.
    pub fn apply(&self, range: FlatRange) -> Option<FlatRange> {
        if range.end <= self.start {
            return Some(range);
        }
        if range.start >= self.old_end {
            let shift = self.shift();
            let start = (range.start as i64 + shift).max(0) as usize;
            let end = (range.end as i64 + shift).max(0) as usize;
            return Some(FlatRange::new(start, end));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_have_no_edit() {
        assert!(TextEdit::between("same", "same").is_none());
    }

    #[test]
    fn test_insertion() {
        let edit = TextEdit::between("Hi John", "Hi dear John").unwrap();
        assert_eq!(edit, TextEdit { start: 3, old_end: 3, new_end: 8 });
        assert_eq!(edit.shift(), 5);
    }

    #[test]
    fn test_deletion() {
        let edit = TextEdit::between("Hi dear John", "Hi John").unwrap();
        assert_eq!(edit.start, 3);
        assert_eq!(edit.old_end, 8);
        assert_eq!(edit.new_end, 3);
        assert_eq!(edit.shift(), -5);
    }

    #[test]
    fn test_repeated_chars_do_not_overlap_prefix_and_suffix() {
        let edit = TextEdit::between("aaa", "aaaa").unwrap();
        assert_eq!(edit.old_end - edit.start, 0);
        assert_eq!(edit.new_end - edit.start, 1);
    }

    #[test]
    fn test_ranges_before_edit_unchanged() {
        let edit = TextEdit::between("John went home", "John went back home").unwrap();
        assert_eq!(edit.apply(FlatRange::new(0, 4)), Some(FlatRange::new(0, 4)));
    }

    #[test]
    fn test_ranges_after_edit_shift() {
        let edit = TextEdit::between("Hi John", "Hi dear John").unwrap();
        assert_eq!(edit.apply(FlatRange::new(3, 7)), Some(FlatRange::new(8, 12)));
    }

    #[test]
    fn test_edit_inside_range_drops_it() {
        let edit = TextEdit::between("Hi John Doe", "Hi John X. Doe").unwrap();
        assert_eq!(edit.apply(FlatRange::new(3, 11)), None);
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let edit = TextEdit::between("Grüße Jörg", "Liebe Grüße Jörg").unwrap();
        assert_eq!(edit.apply(FlatRange::new(6, 10)), Some(FlatRange::new(12, 16)));
    }
}
