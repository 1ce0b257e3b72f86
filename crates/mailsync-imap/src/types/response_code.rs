//! Response codes carried in `[...]` after a status keyword.

use super::{CapabilitySet, Flags, IdSet, SeqNum, Uid, UidValidity};

/// A response code attached to a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: the text must be shown to the user.
    Alert,
    /// BADCHARSET, with the charsets the server supports.
    BadCharset(Vec<String>),
    /// CAPABILITY list.
    Capability(CapabilitySet),
    /// PARSE: the server failed to parse a message.
    Parse,
    /// PERMANENTFLAGS.
    PermanentFlags(Flags),
    /// READ-ONLY.
    ReadOnly,
    /// READ-WRITE.
    ReadWrite,
    /// TRYCREATE: target mailbox does not exist but could be created.
    TryCreate,
    /// UIDNEXT.
    UidNext(Uid),
    /// UIDVALIDITY.
    UidValidity(UidValidity),
    /// UNSEEN: first unseen message.
    Unseen(SeqNum),
    /// APPENDUID (UIDPLUS).
    AppendUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: UidValidity,
        /// UIDs assigned to the appended messages.
        uids: IdSet,
    },
    /// COPYUID (UIDPLUS).
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: UidValidity,
        /// Source UIDs.
        source: IdSet,
        /// Destination UIDs, in the same order as `source`.
        destination: IdSet,
    },
    /// UIDNOTSTICKY: UIDs are not persistent in this mailbox.
    UidNotSticky,
    /// HIGHESTMODSEQ (CONDSTORE).
    HighestModSeq(u64),
    /// NOMODSEQ: the mailbox does not support mod-sequences.
    NoModSeq,
    /// MODIFIED: messages that failed an UNCHANGEDSINCE test.
    Modified(IdSet),
    /// CLOSED: the previous mailbox was deselected (QRESYNC).
    Closed,
    /// Any other code, with its raw argument text.
    Unknown(String),
}

impl ResponseCode {
    /// Returns true for codes that describe the selected mailbox.
    #[must_use]
    pub const fn is_selection_data(&self) -> bool {
        matches!(
            self,
            Self::UidValidity(_)
                | Self::UidNext(_)
                | Self::Unseen(_)
                | Self::PermanentFlags(_)
                | Self::HighestModSeq(_)
                | Self::NoModSeq
                | Self::ReadOnly
                | Self::ReadWrite
        )
    }
}
