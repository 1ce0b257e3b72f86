//! Response data types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::parser::lexer::Value;
use crate::sort::ThreadNode;
use crate::types::{
    AclEntry, CapabilitySet, Flags, IdSet, ListResponse, Mailbox, MailboxStatus, Namespaces, Quota,
    ResponseCode, SeqNum, Uid,
};

/// One data item of a FETCH response.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    /// Message flags.
    Flags(Flags),
    /// INTERNALDATE, unparsed.
    InternalDate(String),
    /// RFC822.SIZE.
    Rfc822Size(u32),
    /// ENVELOPE.
    Envelope(Box<Envelope>),
    /// UID.
    Uid(Uid),
    /// Body section data. `RFC822`, `RFC822.HEADER` and `RFC822.TEXT` map to
    /// the sections `""`, `HEADER` and `TEXT`.
    Body {
        /// Section specifier, uppercased; empty for the whole message.
        section: String,
        /// Origin octet of a partial fetch.
        origin: Option<u32>,
        /// Section data, `None` for NIL.
        data: Option<Vec<u8>>,
    },
    /// BODY or BODYSTRUCTURE.
    BodyStructure(BodyStructure),
    /// MODSEQ (CONDSTORE).
    ModSeq(u64),
    /// An attribute this parser has no grammar for.
    Extension {
        /// Attribute name, including any section suffix.
        name: String,
        /// Attribute value as a token tree.
        value: Value,
    },
}

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Date header.
    pub date: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// Address from an envelope. NIL fields are `None`; empty strings stay `Some("")`.
///
/// Group syntax is kept as the server sends it: a start marker has a NIL
/// host and the group name in `mailbox`, the end marker has NIL mailbox and host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route (obsolete).
    pub adl: Option<String>,
    /// Mailbox name (local part).
    pub mailbox: Option<String>,
    /// Host name (domain part).
    pub host: Option<String>,
}

impl Address {
    /// Returns `mailbox@host` when both are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }

    /// Returns true for group start/end markers.
    #[must_use]
    pub const fn is_group_marker(&self) -> bool {
        self.host.is_none()
    }
}

/// Body structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyStructure {
    /// Non-text, non-message single part.
    Basic {
        /// MIME type.
        media_type: String,
        /// MIME subtype.
        media_subtype: String,
        /// Body parameters.
        params: Vec<(String, String)>,
        /// Content-ID.
        id: Option<String>,
        /// Content-Description.
        description: Option<String>,
        /// Content-Transfer-Encoding.
        encoding: String,
        /// Body size in octets.
        size: u32,
    },
    /// `message/rfc822` part.
    Message {
        /// Body parameters.
        params: Vec<(String, String)>,
        /// Content-Transfer-Encoding.
        encoding: String,
        /// Body size in octets.
        size: u32,
        /// Envelope of nested message.
        envelope: Box<Envelope>,
        /// Body structure of nested message.
        body: Box<Self>,
        /// Size in lines.
        lines: u32,
    },
    /// `text/*` part.
    Text {
        /// Text subtype.
        subtype: String,
        /// Body parameters.
        params: Vec<(String, String)>,
        /// Content-ID.
        id: Option<String>,
        /// Content-Description.
        description: Option<String>,
        /// Content-Transfer-Encoding.
        encoding: String,
        /// Body size in octets.
        size: u32,
        /// Size in lines.
        lines: u32,
    },
    /// Multipart body.
    Multipart {
        /// Child body parts.
        bodies: Vec<Self>,
        /// Multipart subtype.
        subtype: String,
    },
}

/// ESEARCH response (RFC 4731).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ESearchResponse {
    /// Correlator tag.
    pub tag: Option<String>,
    /// Results are UIDs.
    pub uid: bool,
    /// MIN.
    pub min: Option<u32>,
    /// MAX.
    pub max: Option<u32>,
    /// COUNT.
    pub count: Option<u32>,
    /// ALL.
    pub all: Option<IdSet>,
    /// MODSEQ.
    pub mod_seq: Option<u64>,
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// OK with optional code.
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// NO.
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BAD.
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// PREAUTH greeting.
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BYE.
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY.
    Capability(CapabilitySet),
    /// LIST.
    List(ListResponse),
    /// LSUB.
    Lsub(ListResponse),
    /// FLAGS.
    Flags(Flags),
    /// EXISTS.
    Exists(u32),
    /// RECENT.
    Recent(u32),
    /// EXPUNGE.
    Expunge(SeqNum),
    /// FETCH.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Fetch data items.
        items: Vec<FetchItem>,
    },
    /// SEARCH, with the CONDSTORE `(MODSEQ n)` suffix when present.
    Search {
        /// Matching ids.
        ids: Vec<u32>,
        /// Highest MODSEQ of the matches.
        mod_seq: Option<u64>,
    },
    /// SORT, ids in sorted order.
    Sort {
        /// Sorted ids.
        ids: Vec<u32>,
        /// Highest MODSEQ of the matches.
        mod_seq: Option<u64>,
    },
    /// THREAD.
    Thread(Vec<ThreadNode>),
    /// ESEARCH.
    ESearch(ESearchResponse),
    /// STATUS.
    Status(MailboxStatus),
    /// NAMESPACE.
    Namespace(Namespaces),
    /// ID; `None` when the server answers NIL.
    Id(Option<Vec<(String, Option<String>)>>),
    /// ENABLED.
    Enabled(Vec<String>),
    /// VANISHED (QRESYNC).
    Vanished {
        /// `(EARLIER)`: reports expunges from before this session.
        earlier: bool,
        /// Expunged UIDs.
        uids: IdSet,
    },
    /// QUOTA.
    Quota(Quota),
    /// QUOTAROOT.
    QuotaRoot {
        /// Mailbox the roots apply to.
        mailbox: Mailbox,
        /// Quota root names.
        roots: Vec<String>,
    },
    /// ACL.
    Acl {
        /// Mailbox.
        mailbox: Mailbox,
        /// Identifier/rights pairs.
        entries: Vec<AclEntry>,
    },
    /// MYRIGHTS.
    MyRights {
        /// Mailbox.
        mailbox: Mailbox,
        /// Rights string.
        rights: String,
    },
    /// A response keyword without a dedicated grammar.
    Other {
        /// Keyword, uppercased.
        keyword: String,
        /// Leading number for `* n KEYWORD` forms.
        number: Option<u64>,
        /// Remaining data as token trees.
        data: Vec<Value>,
    },
}

/// Everything fetched for one message, merged across FETCH responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    /// Sequence number, when known for this session.
    #[serde(skip)]
    pub seq: Option<SeqNum>,
    /// UID.
    pub uid: Option<Uid>,
    /// FLAGS.
    pub flags: Option<Flags>,
    /// ENVELOPE.
    pub envelope: Option<Envelope>,
    /// INTERNALDATE, unparsed.
    pub internal_date: Option<String>,
    /// RFC822.SIZE.
    pub size: Option<u32>,
    /// BODYSTRUCTURE.
    pub body_structure: Option<BodyStructure>,
    /// Body sections keyed by their uppercased section specifier. Partial
    /// data is keyed as `SECTION<origin>`.
    pub sections: BTreeMap<String, Vec<u8>>,
    /// MODSEQ.
    pub mod_seq: Option<u64>,
    /// Attributes without a dedicated field.
    #[serde(skip)]
    pub extensions: Vec<(String, Value)>,
}

impl MessageData {
    /// Builds message data from the items of one FETCH response.
    #[must_use]
    pub fn from_items(seq: Option<SeqNum>, items: Vec<FetchItem>) -> Self {
        let mut data = Self {
            seq,
            ..Self::default()
        };
        data.merge_items(items);
        data
    }

    /// Merges further items; later values replace earlier ones.
    pub fn merge_items(&mut self, items: Vec<FetchItem>) {
        for item in items {
            match item {
                FetchItem::Flags(flags) => self.flags = Some(flags),
                FetchItem::InternalDate(date) => self.internal_date = Some(date),
                FetchItem::Rfc822Size(size) => self.size = Some(size),
                FetchItem::Envelope(envelope) => self.envelope = Some(*envelope),
                FetchItem::Uid(uid) => self.uid = Some(uid),
                FetchItem::Body {
                    section,
                    origin,
                    data,
                } => {
                    let key = match origin {
                        Some(origin) => format!("{section}<{origin}>"),
                        None => section,
                    };
                    self.sections.insert(key, data.unwrap_or_default());
                }
                FetchItem::BodyStructure(structure) => self.body_structure = Some(structure),
                FetchItem::ModSeq(m) => self.mod_seq = Some(m),
                FetchItem::Extension { name, value } => self.extensions.push((name, value)),
            }
        }
    }

    /// Copies every field present in `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        self.seq = other.seq.or(self.seq);
        self.uid = other.uid.or(self.uid);
        if other.flags.is_some() {
            self.flags = other.flags;
        }
        if other.envelope.is_some() {
            self.envelope = other.envelope;
        }
        if other.internal_date.is_some() {
            self.internal_date = other.internal_date;
        }
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.body_structure.is_some() {
            self.body_structure = other.body_structure;
        }
        self.sections.extend(other.sections);
        if other.mod_seq.is_some() {
            self.mod_seq = other.mod_seq;
        }
        self.extensions.extend(other.extensions);
    }

    /// Returns a body section by specifier (case-insensitive).
    #[must_use]
    pub fn section(&self, section: &str) -> Option<&[u8]> {
        self.sections
            .get(&section.to_ascii_uppercase())
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::Flag;

    fn address(name: Option<&str>, mailbox: Option<&str>, host: Option<&str>) -> Address {
        Address {
            name: name.map(str::to_string),
            adl: None,
            mailbox: mailbox.map(str::to_string),
            host: host.map(str::to_string),
        }
    }

    #[test]
    fn test_address_email() {
        assert_eq!(
            address(Some("John"), Some("john"), Some("example.com")).email(),
            Some("john@example.com".to_string())
        );
        assert_eq!(address(None, Some("john"), None).email(), None);
    }

    #[test]
    fn test_group_marker() {
        assert!(address(None, Some("undisclosed-recipients"), None).is_group_marker());
        assert!(!address(None, Some("a"), Some("b")).is_group_marker());
    }

    #[test]
    fn test_message_data_merge_items() {
        let seq = SeqNum::new(3);
        let mut data = MessageData::from_items(
            seq,
            vec![
                FetchItem::Uid(Uid::new(30).unwrap()),
                FetchItem::Flags(vec![Flag::Seen].into()),
            ],
        );
        data.merge_items(vec![
            FetchItem::Flags(vec![Flag::Flagged].into()),
            FetchItem::Body {
                section: "HEADER".into(),
                origin: None,
                data: Some(b"Subject: x\r\n".to_vec()),
            },
        ]);
        assert_eq!(data.uid.unwrap().get(), 30);
        assert_eq!(data.flags.as_ref().unwrap(), &Flags::from(vec![Flag::Flagged]));
        assert_eq!(data.section("header").unwrap(), b"Subject: x\r\n");
    }

    #[test]
    fn test_merge_keeps_existing_fields() {
        let mut cached = MessageData {
            uid: Uid::new(5),
            size: Some(100),
            ..MessageData::default()
        };
        let live = MessageData {
            uid: Uid::new(5),
            flags: Some(vec![Flag::Seen].into()),
            ..MessageData::default()
        };
        cached.merge(live);
        assert_eq!(cached.size, Some(100));
        assert!(cached.flags.unwrap().is_seen());
    }

    #[test]
    fn test_message_data_serde_skips_session_fields() {
        let data = MessageData {
            seq: SeqNum::new(1),
            uid: Uid::new(9),
            extensions: vec![("X-GM-LABELS".into(), Value::Nil)],
            ..MessageData::default()
        };
        let json = serde_json::to_string(&data).unwrap();
        let back: MessageData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.uid, Uid::new(9));
        assert!(back.seq.is_none());
        assert!(back.extensions.is_empty());
    }
}
