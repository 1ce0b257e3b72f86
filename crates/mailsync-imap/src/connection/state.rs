//! Session states (RFC 3501 section 3).

use crate::command::Requires;
use crate::types::{SelectedMailbox, SeqNum, Uid};

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Greeting received; LOGIN, AUTHENTICATE and STARTTLS are allowed.
    NotAuthenticated,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is selected.
    Selected(SelectedMailbox),
    /// LOGOUT completed, BYE received or the transport failed.
    Logout,
}

impl SessionState {
    /// State name for error messages and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::NotAuthenticated => "not authenticated",
            Self::Authenticated => "authenticated",
            Self::Selected(_) => "selected",
            Self::Logout => "logout",
        }
    }

    /// Returns true if a command with the given requirement may be sent.
    #[must_use]
    pub const fn allows(&self, requires: Requires) -> bool {
        match (self, requires) {
            (Self::Disconnected | Self::Logout, _) => false,
            (_, Requires::Any)
            | (Self::NotAuthenticated, Requires::NotAuthenticated)
            | (Self::Authenticated | Self::Selected(_), Requires::Authenticated)
            | (Self::Selected(_), Requires::Selected) => true,
            _ => false,
        }
    }

    /// The selected mailbox, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<&SelectedMailbox> {
        match self {
            Self::Selected(mailbox) => Some(mailbox),
            _ => None,
        }
    }

    /// The selected mailbox, mutably.
    pub const fn selected_mut(&mut self) -> Option<&mut SelectedMailbox> {
        match self {
            Self::Selected(mailbox) => Some(mailbox),
            _ => None,
        }
    }
}

/// Sequence number to UID map for the selected mailbox.
///
/// Filled from FETCH responses that carry a UID and kept in step with
/// EXISTS and EXPUNGE, so EXPUNGE can be turned into a UID for the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidIndex {
    uids: Vec<Option<u32>>,
}

impl UidIndex {
    /// Forgets everything.
    pub fn clear(&mut self) {
        self.uids.clear();
    }

    /// Applies EXISTS.
    pub fn set_exists(&mut self, count: u32) {
        self.uids.resize(count as usize, None);
    }

    /// Records the UID of a message.
    pub fn record(&mut self, seq: SeqNum, uid: Uid) {
        let index = seq.get() as usize - 1;
        if index >= self.uids.len() {
            self.uids.resize(index + 1, None);
        }
        self.uids[index] = Some(uid.get());
    }

    /// Looks up a UID.
    #[must_use]
    pub fn get(&self, seq: SeqNum) -> Option<u32> {
        self.uids.get(seq.get() as usize - 1).copied().flatten()
    }

    /// Applies EXPUNGE, returning the UID of the removed message if known.
    pub fn expunge(&mut self, seq: SeqNum) -> Option<u32> {
        let index = seq.get() as usize - 1;
        if index < self.uids.len() {
            self.uids.remove(index)
        } else {
            None
        }
    }

    /// Removes messages by UID (VANISHED).
    pub fn vanish(&mut self, uids: &crate::types::IdSet) {
        self.uids.retain(|uid| !uid.is_some_and(|u| uids.contains(u)));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::{IdSet, Mailbox};

    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n).unwrap()
    }

    #[test]
    fn test_state_allows() {
        let selected = SessionState::Selected(SelectedMailbox::new(Mailbox::inbox(), false));
        assert!(SessionState::NotAuthenticated.allows(Requires::NotAuthenticated));
        assert!(!SessionState::NotAuthenticated.allows(Requires::Authenticated));
        assert!(SessionState::Authenticated.allows(Requires::Authenticated));
        assert!(!SessionState::Authenticated.allows(Requires::Selected));
        assert!(!SessionState::Authenticated.allows(Requires::NotAuthenticated));
        assert!(selected.allows(Requires::Selected));
        assert!(selected.allows(Requires::Any));
        assert!(!SessionState::Logout.allows(Requires::Any));
        assert_eq!(selected.name(), "selected");
    }

    #[test]
    fn test_uid_index_expunge_shifts() {
        let mut index = UidIndex::default();
        index.set_exists(3);
        index.record(seq(1), Uid::new(10).unwrap());
        index.record(seq(2), Uid::new(20).unwrap());
        index.record(seq(3), Uid::new(30).unwrap());
        assert_eq!(index.expunge(seq(2)), Some(20));
        assert_eq!(index.get(seq(2)), Some(30));
        assert_eq!(index.expunge(seq(9)), None);

        index.vanish(&IdSet::parse("10").unwrap());
        assert_eq!(index.get(seq(1)), Some(30));
        index.set_exists(4);
        assert_eq!(index.get(seq(4)), None);
    }
}
