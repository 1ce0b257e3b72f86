//! Mailbox names, selection state and per-mailbox server data.

use super::{Flags, ResponseCode, SeqNum, Uid, UidValidity, utf7};

/// Mailbox name, held decoded (UTF-8).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mailbox(String);

impl Mailbox {
    /// Creates a mailbox from a UTF-8 name. `INBOX` is normalized to uppercase.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("INBOX") {
            Self("INBOX".to_string())
        } else {
            Self(name)
        }
    }

    /// Creates a mailbox from its modified UTF-7 wire form.
    ///
    /// Names that are not valid modified UTF-7 are kept verbatim.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        Self::new(utf7::decode(raw).unwrap_or_else(|| raw.to_string()))
    }

    /// The INBOX mailbox.
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// Returns the decoded name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the modified UTF-7 form sent to the server.
    #[must_use]
    pub fn to_wire(&self) -> String {
        utf7::encode(&self.0)
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Mailbox {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The currently selected mailbox and everything the server told us about it.
///
/// Updated in place as untagged responses and response codes arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMailbox {
    /// Mailbox name.
    pub mailbox: Mailbox,
    /// Selected with EXAMINE or reported READ-ONLY.
    pub read_only: bool,
    /// Number of messages (EXISTS).
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// First unseen message.
    pub unseen: Option<SeqNum>,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY.
    pub uid_validity: Option<UidValidity>,
    /// Flags defined for the mailbox.
    pub flags: Flags,
    /// Flags the client can store permanently.
    pub permanent_flags: Flags,
    /// HIGHESTMODSEQ when CONDSTORE is active.
    pub highest_mod_seq: Option<u64>,
    /// The server reported NOMODSEQ.
    pub no_mod_seq: bool,
}

impl SelectedMailbox {
    /// Creates an empty selection for `mailbox`.
    #[must_use]
    pub fn new(mailbox: Mailbox, read_only: bool) -> Self {
        Self {
            mailbox,
            read_only,
            exists: 0,
            recent: 0,
            unseen: None,
            uid_next: None,
            uid_validity: None,
            flags: Flags::new(),
            permanent_flags: Flags::new(),
            highest_mod_seq: None,
            no_mod_seq: false,
        }
    }

    /// Applies a response code to the selection.
    pub fn apply_code(&mut self, code: &ResponseCode) {
        match code {
            ResponseCode::UidValidity(v) => self.uid_validity = Some(*v),
            ResponseCode::UidNext(n) => self.uid_next = Some(*n),
            ResponseCode::Unseen(s) => self.unseen = Some(*s),
            ResponseCode::PermanentFlags(flags) => self.permanent_flags = flags.clone(),
            ResponseCode::HighestModSeq(m) => self.highest_mod_seq = Some(*m),
            ResponseCode::NoModSeq => {
                self.no_mod_seq = true;
                self.highest_mod_seq = None;
            }
            ResponseCode::ReadOnly => self.read_only = true,
            ResponseCode::ReadWrite => self.read_only = false,
            _ => {}
        }
    }

    /// Records an EXPUNGE of one message.
    pub const fn expunged(&mut self) {
        self.exists = self.exists.saturating_sub(1);
    }

    /// Returns true if CONDSTORE mod-sequences are available.
    #[must_use]
    pub const fn condstore_active(&self) -> bool {
        self.highest_mod_seq.is_some() && !self.no_mod_seq
    }

    /// A string that changes whenever the mailbox contents may have changed.
    ///
    /// `None` when the server gives no HIGHESTMODSEQ, since then flag
    /// changes are invisible to the client.
    #[must_use]
    pub fn fingerprint(&self) -> Option<String> {
        let modseq = self.highest_mod_seq.filter(|_| !self.no_mod_seq)?;
        let validity = self.uid_validity?;
        Some(format!(
            "{validity}|{}|{}|{modseq}",
            self.uid_next.map_or(0, Uid::get),
            self.exists
        ))
    }
}

/// STATUS response data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Mailbox name.
    pub mailbox: Option<Mailbox>,
    /// MESSAGES.
    pub messages: Option<u32>,
    /// RECENT.
    pub recent: Option<u32>,
    /// UIDNEXT.
    pub uid_next: Option<u32>,
    /// UIDVALIDITY.
    pub uid_validity: Option<u32>,
    /// UNSEEN.
    pub unseen: Option<u32>,
    /// HIGHESTMODSEQ.
    pub highest_mod_seq: Option<u64>,
}

/// LIST/LSUB response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub mailbox: Mailbox,
}

/// Mailbox attributes from LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// `\Noinferiors`
    NoInferiors,
    /// `\Noselect`
    NoSelect,
    /// `\HasNoChildren`
    HasNoChildren,
    /// `\HasChildren`
    HasChildren,
    /// `\Marked`
    Marked,
    /// `\Unmarked`
    Unmarked,
    /// `\Drafts`
    Drafts,
    /// `\Junk`
    Junk,
    /// `\Sent`
    Sent,
    /// `\Trash`
    Trash,
    /// Any other attribute.
    Other(String),
}

impl MailboxAttribute {
    /// Parses a mailbox attribute.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\NOINFERIORS" => Self::NoInferiors,
            "\\NOSELECT" | "\\NONEXISTENT" => Self::NoSelect,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\DRAFTS" => Self::Drafts,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            _ => Self::Other(s.to_string()),
        }
    }
}

/// One `(prefix delimiter)` pair of a NAMESPACE response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    /// Namespace prefix.
    pub prefix: String,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
}

/// NAMESPACE response (RFC 2342).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    /// Personal namespaces.
    pub personal: Vec<NamespaceEntry>,
    /// Other users' namespaces.
    pub other: Vec<NamespaceEntry>,
    /// Shared namespaces.
    pub shared: Vec<NamespaceEntry>,
}

/// One resource of a QUOTA response (RFC 2087).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaResource {
    /// Resource name, e.g. `STORAGE`.
    pub name: String,
    /// Current usage.
    pub usage: u64,
    /// Limit.
    pub limit: u64,
}

/// QUOTA response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    /// Quota root name.
    pub root: String,
    /// Resources with usage and limits.
    pub resources: Vec<QuotaResource>,
}

/// One identifier/rights pair of an ACL response (RFC 4314).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    /// Identifier, e.g. a user name.
    pub identifier: String,
    /// Rights string.
    pub rights: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::Flag;

    #[test]
    fn test_inbox_normalized() {
        assert_eq!(Mailbox::new("inbox"), Mailbox::inbox());
        assert_eq!(Mailbox::new("Inbox/Sub").as_str(), "Inbox/Sub");
    }

    #[test]
    fn test_wire_round_trip() {
        let mb = Mailbox::new("Entwürfe");
        assert_eq!(mb.to_wire(), "Entw&APw-rfe");
        assert_eq!(Mailbox::from_wire("Entw&APw-rfe"), mb);
    }

    #[test]
    fn test_invalid_wire_kept_verbatim() {
        assert_eq!(Mailbox::from_wire("Broken&xyz").as_str(), "Broken&xyz");
    }

    #[test]
    fn test_apply_codes() {
        let mut sel = SelectedMailbox::new(Mailbox::inbox(), false);
        sel.apply_code(&ResponseCode::UidValidity(UidValidity::new(42).unwrap()));
        sel.apply_code(&ResponseCode::UidNext(Uid::new(6).unwrap()));
        sel.apply_code(&ResponseCode::PermanentFlags(vec![Flag::Seen, Flag::MayCreate].into()));
        sel.apply_code(&ResponseCode::ReadOnly);
        assert_eq!(sel.uid_validity.unwrap().get(), 42);
        assert_eq!(sel.uid_next.unwrap().get(), 6);
        assert!(sel.permanent_flags.contains(&Flag::MayCreate));
        assert!(sel.read_only);
        assert!(!sel.condstore_active());
    }

    #[test]
    fn test_nomodseq_disables_condstore() {
        let mut sel = SelectedMailbox::new(Mailbox::inbox(), false);
        sel.apply_code(&ResponseCode::HighestModSeq(10));
        assert!(sel.condstore_active());
        sel.apply_code(&ResponseCode::NoModSeq);
        assert!(!sel.condstore_active());
    }

    #[test]
    fn test_expunged_saturates() {
        let mut sel = SelectedMailbox::new(Mailbox::inbox(), false);
        sel.expunged();
        assert_eq!(sel.exists, 0);
    }

    #[test]
    fn test_fingerprint_requires_modseq() {
        let mut sel = SelectedMailbox::new(Mailbox::inbox(), false);
        sel.apply_code(&ResponseCode::UidValidity(UidValidity::new(7).unwrap()));
        assert!(sel.fingerprint().is_none());
        sel.apply_code(&ResponseCode::HighestModSeq(99));
        sel.exists = 3;
        let before = sel.fingerprint().unwrap();
        sel.exists = 4;
        assert_ne!(sel.fingerprint().unwrap(), before);
    }

    #[test]
    fn test_attribute_parse() {
        assert_eq!(MailboxAttribute::parse("\\Noselect"), MailboxAttribute::NoSelect);
        assert_eq!(MailboxAttribute::parse("\\Spam"), MailboxAttribute::Junk);
        assert_eq!(
            MailboxAttribute::parse("\\Archive"),
            MailboxAttribute::Other("\\Archive".into())
        );
    }
}
