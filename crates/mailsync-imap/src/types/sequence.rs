//! Sequence sets for message ranges.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A sequence set as written in commands: numbers, ranges and `*`.
///
/// The numbers are sequence numbers or UIDs depending on the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single number.
    Single(NonZeroU32),
    /// Inclusive range.
    Range(NonZeroU32, NonZeroU32),
    /// Range from start to the last message (`n:*`).
    RangeFrom(NonZeroU32),
    /// The last message (`*`).
    Last,
    /// Multiple specifications joined by commas.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// Creates a sequence set from a single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self::Single)
    }

    /// Creates a range sequence set.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(NonZeroU32::new(start)?, NonZeroU32::new(end)?))
    }

    /// `1:*`, every message in the mailbox.
    #[must_use]
    pub const fn all() -> Self {
        Self::RangeFrom(NonZeroU32::MIN)
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::Last => f.write_str("*"),
            Self::Set(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// A concrete set of message numbers.
///
/// Displays in compressed form (`1:3,5:6,8`) and parses the same syntax
/// back, so it is the bridge between id lists and wire sequence sets.
/// Ids are held as disjoint, non-adjacent ranges keyed by their start, so
/// `1:4294967295` costs one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<(u32, u32)>", into = "Vec<(u32, u32)>")]
pub struct IdSet(BTreeMap<u32, u32>);

impl IdSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parses `a`, `a:b` and comma-separated combinations.
    ///
    /// Reversed ranges (`5:3`) are accepted. `*` and zero are rejected since
    /// they have no concrete value.
    pub fn parse(s: &str) -> Result<Self> {
        let mut set = Self::new();
        for part in s.split(',') {
            let (lo, hi) = match part.split_once(':') {
                Some((a, b)) => (parse_id(a, s)?, parse_id(b, s)?),
                None => {
                    let n = parse_id(part, s)?;
                    (n, n)
                }
            };
            set.insert_range(lo, hi);
        }
        Ok(set)
    }

    /// Adds an id. Zero is ignored.
    pub fn insert(&mut self, id: u32) {
        self.insert_range(id, id);
    }

    /// Adds every id between `a` and `b` inclusive, in either order.
    /// Zero is ignored.
    pub fn insert_range(&mut self, a: u32, b: u32) {
        let (mut lo, mut hi) = (a.min(b).max(1), a.max(b));
        if hi == 0 {
            return;
        }
        if let Some((&start, &end)) = self.0.range(..lo).next_back()
            && end.saturating_add(1) >= lo
        {
            lo = start;
            hi = hi.max(end);
        }
        let absorbed: Vec<(u32, u32)> = self
            .0
            .range(lo..=hi.saturating_add(1))
            .map(|(&start, &end)| (start, end))
            .collect();
        for (start, end) in absorbed {
            self.0.remove(&start);
            hi = hi.max(end);
        }
        self.0.insert(lo, hi);
    }

    /// Removes an id.
    pub fn remove(&mut self, id: u32) -> bool {
        let Some((start, end)) = self.range_of(id) else {
            return false;
        };
        self.0.remove(&start);
        if start < id {
            self.0.insert(start, id - 1);
        }
        if id < end {
            self.0.insert(id + 1, end);
        }
        true
    }

    fn range_of(&self, id: u32) -> Option<(u32, u32)> {
        self.0
            .range(..=id)
            .next_back()
            .filter(|&(_, &end)| end >= id)
            .map(|(&start, &end)| (start, end))
    }

    /// Returns true if the id is present.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.range_of(id).is_some()
    }

    /// Number of ids.
    #[must_use]
    pub fn len(&self) -> usize {
        let total: u64 = self
            .0
            .iter()
            .map(|(&start, &end)| u64::from(end - start) + 1)
            .sum();
        usize::try_from(total).unwrap_or(usize::MAX)
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in ascending order. Ranges are expanded lazily.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().flat_map(|(&start, &end)| start..=end)
    }

    /// Largest id.
    #[must_use]
    pub fn max(&self) -> Option<u32> {
        self.0.last_key_value().map(|(_, &end)| end)
    }

    /// Inclusive ranges in ascending order.
    #[must_use]
    pub fn ranges(&self) -> Vec<(u32, u32)> {
        self.0.iter().map(|(&start, &end)| (start, end)).collect()
    }

    /// Converts to a wire sequence set, or `None` if empty.
    #[must_use]
    pub fn to_sequence_set(&self) -> Option<SequenceSet> {
        let mut parts: Vec<SequenceSet> = self
            .0
            .iter()
            .filter_map(|(&lo, &hi)| {
                if lo == hi {
                    SequenceSet::single(lo)
                } else {
                    SequenceSet::range(lo, hi)
                }
            })
            .collect();
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(SequenceSet::Set(parts)),
        }
    }

    /// Adds every id of `other`.
    pub fn union_with(&mut self, other: &Self) {
        for (&start, &end) in &other.0 {
            self.insert_range(start, end);
        }
    }

    /// Ids present in both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = Self::new();
        for (&lo, &hi) in &self.0 {
            for (start, end) in other.overlapping(lo, hi) {
                out.0.insert(start.max(lo), end.min(hi));
            }
        }
        out
    }

    /// Ids present in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Self::new();
        for (&lo, &hi) in &self.0 {
            let mut next = Some(lo);
            for (start, end) in other.overlapping(lo, hi) {
                if let Some(n) = next
                    && start > n
                {
                    out.0.insert(n, start - 1);
                }
                next = end.checked_add(1);
            }
            if let Some(n) = next
                && n <= hi
            {
                out.0.insert(n, hi);
            }
        }
        out
    }

    /// Ranges of `self` that share at least one id with `lo..=hi`.
    fn overlapping(&self, lo: u32, hi: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        let before = self
            .0
            .range(..lo)
            .next_back()
            .filter(|&(_, &end)| end >= lo);
        before
            .into_iter()
            .chain(self.0.range(lo..=hi))
            .map(|(&start, &end)| (start, end))
    }
}

fn parse_id(part: &str, whole: &str) -> Result<u32> {
    match part.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(Error::Protocol(format!("invalid sequence set: {whole:?}"))),
        Ok(n) => Ok(n),
    }
}

impl std::fmt::Display for IdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (&lo, &hi)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if lo == hi {
                write!(f, "{lo}")?;
            } else {
                write!(f, "{lo}:{hi}")?;
            }
        }
        Ok(())
    }
}

impl FromIterator<u32> for IdSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<u32> for IdSet {
    fn extend<T: IntoIterator<Item = u32>>(&mut self, iter: T) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl From<Vec<(u32, u32)>> for IdSet {
    fn from(ranges: Vec<(u32, u32)>) -> Self {
        let mut set = Self::new();
        for (lo, hi) in ranges {
            set.insert_range(lo, hi);
        }
        set
    }
}

impl From<IdSet> for Vec<(u32, u32)> {
    fn from(set: IdSet) -> Self {
        set.0.into_iter().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sequence_set_display() {
        assert_eq!(SequenceSet::single(1).unwrap().to_string(), "1");
        assert_eq!(SequenceSet::range(1, 10).unwrap().to_string(), "1:10");
        assert_eq!(SequenceSet::all().to_string(), "1:*");
        assert_eq!(SequenceSet::Last.to_string(), "*");
        assert!(SequenceSet::single(0).is_none());
    }

    #[test]
    fn test_compress() {
        let ids: IdSet = [1, 2, 3, 5, 6, 8].into_iter().collect();
        assert_eq!(ids.to_string(), "1:3,5:6,8");
        assert_eq!(ids.to_sequence_set().unwrap().to_string(), "1:3,5:6,8");
    }

    #[test]
    fn test_expand() {
        let ids = IdSet::parse("1:3,5:6,8").unwrap();
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![1, 2, 3, 5, 6, 8]);
    }

    #[test]
    fn test_reversed_range_and_duplicates() {
        let ids = IdSet::parse("5:3,4,9").unwrap();
        assert_eq!(ids.to_string(), "3:5,9");
    }

    #[test]
    fn test_parse_rejects_star_and_zero() {
        assert!(IdSet::parse("1:*").is_err());
        assert!(IdSet::parse("0").is_err());
        assert!(IdSet::parse("").is_err());
        assert!(IdSet::parse("1,,2").is_err());
    }

    #[test]
    fn test_unsorted_input() {
        let ids: IdSet = [8, 1, 3, 2].into_iter().collect();
        assert_eq!(ids.to_string(), "1:3,8");
        assert_eq!(ids.max(), Some(8));
    }

    #[test]
    fn test_empty_has_no_sequence_set() {
        assert!(IdSet::new().to_sequence_set().is_none());
        assert_eq!(IdSet::new().to_string(), "");
    }

    #[test]
    fn test_upper_bound_does_not_overflow() {
        let ids: IdSet = [u32::MAX - 1, u32::MAX].into_iter().collect();
        assert_eq!(ids.to_string(), format!("{}:{}", u32::MAX - 1, u32::MAX));
    }

    #[test]
    fn test_full_uid_range_stays_compact() {
        let ids = IdSet::parse("1:4294967295").unwrap();
        assert_eq!(ids.ranges(), vec![(1, u32::MAX)]);
        assert!(ids.contains(1));
        assert!(ids.contains(2_000_000_000));
        assert!(ids.contains(u32::MAX));
        assert!(!ids.contains(0));
        assert_eq!(ids.max(), Some(u32::MAX));
        assert_eq!(ids.to_string(), "1:4294967295");
        assert_eq!(ids.iter().take(3).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_overlapping_and_adjacent_ranges_merge() {
        let ids = IdSet::parse("10:20,5:9,15:30,40,32:31").unwrap();
        assert_eq!(ids.ranges(), vec![(5, 32), (40, 40)]);
        assert_eq!(ids.len(), 29);
    }

    #[test]
    fn test_remove_splits_range() {
        let mut ids = IdSet::parse("1:10").unwrap();
        assert!(ids.remove(5));
        assert!(!ids.remove(5));
        assert!(ids.remove(1));
        assert_eq!(ids.to_string(), "2:4,6:10");
    }

    #[test]
    fn test_difference_and_intersection() {
        let a = IdSet::parse("1:10,20:30").unwrap();
        let b = IdSet::parse("3:4,8:22,30").unwrap();
        assert_eq!(a.difference(&b).to_string(), "1:2,5:7,23:29");
        assert_eq!(a.intersection(&b).to_string(), "3:4,8:10,20:22,30");

        let everything = IdSet::parse("1:4294967295").unwrap();
        assert!(a.difference(&everything).is_empty());
        assert_eq!(everything.difference(&a).ranges(), vec![(11, 19), (31, u32::MAX)]);
        assert_eq!(everything.intersection(&a), a);
    }

    #[test]
    fn test_serde_uses_ranges() {
        let ids = IdSet::parse("1:3,7").unwrap();
        let json = serde_json::to_string(&ids).unwrap();
        assert_eq!(json, "[[1,3],[7,7]]");
        let back: IdSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ids);
    }

    proptest! {
        #[test]
        fn prop_compress_expand_round_trip(ids in proptest::collection::btree_set(1u32..5000, 1..200)) {
            let set: IdSet = ids.iter().copied().collect();
            let text = set.to_string();
            let back = IdSet::parse(&text).unwrap();
            prop_assert_eq!(back.iter().collect::<Vec<_>>(), ids.into_iter().collect::<Vec<_>>());
        }
    }
}
