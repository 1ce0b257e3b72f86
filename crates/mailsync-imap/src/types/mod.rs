//! Core IMAP types.

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;
mod sequence;
pub mod utf7;

pub use capability::{Capability, CapabilitySet, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use mailbox::{
    AclEntry, ListResponse, Mailbox, MailboxAttribute, MailboxStatus, NamespaceEntry, Namespaces,
    Quota, QuotaResource, SelectedMailbox,
};
pub use response_code::ResponseCode;
pub use sequence::{IdSet, SequenceSet};
