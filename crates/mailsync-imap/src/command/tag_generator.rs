//! Command tag generation.
//!
//! Tags match commands with their tagged completions.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Tag;

/// Sequential tag source for one session.
///
/// Produces `A0000`, `A0001`, ... and keeps growing past four digits.
/// The counter is 64-bit and wraps instead of failing, so a long-lived
/// session never runs out of tags.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU64,
    prefix: char,
}

impl TagGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU64::new(0),
            prefix,
        }
    }

    /// Returns the next tag.
    #[must_use]
    pub fn next(&self) -> Tag {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Tag::new(format!("{}{n:04}", self.prefix))
    }

    /// Returns how many tags were handed out.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_tags() {
        let generator = TagGenerator::default();
        assert_eq!(generator.next().as_str(), "A0000");
        assert_eq!(generator.next().as_str(), "A0001");
        assert_eq!(generator.current(), 2);
    }

    #[test]
    fn test_custom_prefix() {
        let generator = TagGenerator::new('T');
        assert_eq!(generator.next().as_str(), "T0000");
    }

    #[test]
    fn test_grows_past_padding() {
        let generator = TagGenerator::default();
        generator.counter.store(10_000, Ordering::Relaxed);
        assert_eq!(generator.next().as_str(), "A10000");
    }

    #[test]
    fn test_wraps_without_panic() {
        let generator = TagGenerator::default();
        generator.counter.store(u64::MAX, Ordering::Relaxed);
        assert_eq!(generator.next().as_str(), format!("A{}", u64::MAX));
        assert_eq!(generator.next().as_str(), "A0000");
    }

    #[test]
    fn test_uniqueness() {
        let generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10000 {
            assert!(seen.insert(generator.next()), "duplicate tag generated");
        }
    }
}
