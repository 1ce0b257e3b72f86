//! Core IMAP identifiers.
//!
//! Types for tags, sequence numbers, UIDs and UIDVALIDITY.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// IMAP command tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! nonzero_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $raw:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Creates the identifier, returning `None` for zero.
            #[must_use]
            pub fn new(n: $raw) -> Option<Self> {
                <$inner>::new(n).map(Self)
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn get(self) -> $raw {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

nonzero_id!(
    /// Message sequence number. Ephemeral: shifts when messages are expunged.
    SeqNum,
    NonZeroU32,
    u32
);

nonzero_id!(
    /// Unique identifier of a message, stable while UIDVALIDITY is unchanged.
    Uid,
    NonZeroU32,
    u32
);

nonzero_id!(
    /// UIDVALIDITY of a mailbox. When it changes every cached UID is void.
    UidValidity,
    NonZeroU32,
    u32
);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rejected() {
        assert!(SeqNum::new(0).is_none());
        assert!(Uid::new(0).is_none());
        assert!(UidValidity::new(0).is_none());
    }

    #[test]
    fn test_get_and_display() {
        assert_eq!(Uid::new(42).unwrap().get(), 42);
        assert_eq!(SeqNum::new(7).unwrap().to_string(), "7");
        assert_eq!(Tag::new("A0001").to_string(), "A0001");
    }

    #[test]
    fn test_ordering() {
        assert!(Uid::new(3).unwrap() < Uid::new(10).unwrap());
    }

    #[test]
    fn test_serde_transparent() {
        let uid = Uid::new(17).unwrap();
        assert_eq!(serde_json::to_string(&uid).unwrap(), "17");
        let back: Uid = serde_json::from_str("17").unwrap();
        assert_eq!(back, uid);
    }
}
