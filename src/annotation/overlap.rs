//! Overlap resolution shared by the annotation builder and text masking
//!
//! Priority, highest first:
//! 1. modifier claims over detection claims
//! 2. longer ranges over shorter ones
//! 3. earlier start
//! 4. tiebreak key (label or modifier id), so the result never depends on input order

use std::cmp::Ordering;

use crate::document::FlatRange;

/// A range some source wants to own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim<T> {
    pub range: FlatRange,
    pub from_modifier: bool,
    pub tiebreak: String,
    pub item: T,
}

impl<T> Claim<T> {
    pub fn detection(range: FlatRange, tiebreak: impl Into<String>, item: T) -> Self {
        Self { range, from_modifier: false, tiebreak: tiebreak.into(), item }
    }

    pub fn modifier(range: FlatRange, tiebreak: impl Into<String>, item: T) -> Self {
        Self { range, from_modifier: true, tiebreak: tiebreak.into(), item }
    }

    fn priority(&self, other: &Self) -> Ordering {
        other
            .from_modifier
            .cmp(&self.from_modifier)
            .then_with(|| other.range.len().cmp(&self.range.len()))
            .then_with(|| self.range.start.cmp(&other.range.start))
            .then_with(|| self.tiebreak.cmp(&other.tiebreak))
    }
}

/// Outcome of `resolve_overlaps`
#[derive(Debug)]
pub struct Resolved<T> {
    /// Non-overlapping winners, sorted by start
    pub kept: Vec<Claim<T>>,
    /// Losers, each paired with whether a modifier claim beat it
    pub lost: Vec<(Claim<T>, bool)>,
}

/// Keep the highest-priority claim for every contested character
pub fn resolve_overlaps<T>(mut claims: Vec<Claim<T>>) -> Resolved<T> {
    claims.sort_by(|a, b| a.priority(b));

    let mut kept: Vec<Claim<T>> = Vec::with_capacity(claims.len());
    let mut lost = Vec::new();

    for claim in claims {
        let beaten_by = kept.iter().find(|k| k.range.overlaps(&claim.range)).map(|k| k.from_modifier);
        match beaten_by {
            Some(by_modifier) => lost.push((claim, by_modifier)),
            None => kept.push(claim),
        }
    }

    kept.sort_by_key(|c| (c.range.start, c.range.end));
    Resolved { kept, lost }
}
