//! Command-related type definitions.

use chrono::NaiveDate;
use encoding_rs::Encoding;

use crate::types::{Flag, IdSet, SequenceSet, UidValidity};

/// STATUS attributes to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// Number of messages.
    Messages,
    /// Number of recent messages.
    Recent,
    /// Next UID.
    UidNext,
    /// UIDVALIDITY.
    UidValidity,
    /// Number of unseen messages.
    Unseen,
    /// Highest mod-sequence (CONDSTORE).
    HighestModSeq,
}

impl StatusAttribute {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
            Self::HighestModSeq => "HIGHESTMODSEQ",
        }
    }
}

/// FETCH items to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// FLAGS INTERNALDATE RFC822.SIZE ENVELOPE.
    All,
    /// FLAGS INTERNALDATE RFC822.SIZE ENVELOPE BODY.
    Full,
    /// FLAGS INTERNALDATE RFC822.SIZE.
    Fast,
    /// Explicit list of attributes.
    Items(Vec<FetchAttribute>),
}

impl FetchItems {
    /// Expands macros into their attribute lists.
    #[must_use]
    pub fn attributes(&self) -> Vec<FetchAttribute> {
        match self {
            Self::All => vec![
                FetchAttribute::Flags,
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
                FetchAttribute::Envelope,
            ],
            Self::Full => vec![
                FetchAttribute::Flags,
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
                FetchAttribute::Envelope,
                FetchAttribute::BodyStructure,
            ],
            Self::Fast => vec![
                FetchAttribute::Flags,
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
            ],
            Self::Items(attrs) => attrs.clone(),
        }
    }
}

impl From<Vec<FetchAttribute>> for FetchItems {
    fn from(attrs: Vec<FetchAttribute>) -> Self {
        Self::Items(attrs)
    }
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// Envelope structure.
    Envelope,
    /// Body structure.
    BodyStructure,
    /// UID.
    Uid,
    /// Body section.
    Body {
        /// Section specifier; `None` for the whole message.
        section: Option<String>,
        /// Peek (don't set \Seen).
        peek: bool,
        /// Partial fetch range (origin, length).
        partial: Option<(u32, u32)>,
    },
    /// RFC822 (full message).
    Rfc822,
    /// RFC822.HEADER.
    Rfc822Header,
    /// RFC822.TEXT.
    Rfc822Text,
    /// MODSEQ.
    ModSeq,
}

impl FetchAttribute {
    /// A `BODY.PEEK[section]` attribute.
    #[must_use]
    pub fn peek(section: impl Into<String>) -> Self {
        Self::Body {
            section: Some(section.into()),
            peek: true,
            partial: None,
        }
    }

    /// Returns true if the value can change after the message is stored.
    #[must_use]
    pub const fn is_mutable(&self) -> bool {
        matches!(self, Self::Flags | Self::ModSeq)
    }

    /// Returns the section key the response reports this attribute under,
    /// for body-like attributes without a partial range.
    #[must_use]
    pub fn section_key(&self) -> Option<String> {
        match self {
            Self::Body {
                section,
                partial: None,
                ..
            } => Some(crate::parser::normalize_section(section.as_deref().unwrap_or(""))),
            Self::Rfc822 => Some(String::new()),
            Self::Rfc822Header => Some("HEADER".to_string()),
            Self::Rfc822Text => Some("TEXT".to_string()),
            _ => None,
        }
    }
}

/// STORE flag operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace flags.
    SetFlags(Vec<Flag>),
    /// Add flags.
    AddFlags(Vec<Flag>),
    /// Remove flags.
    RemoveFlags(Vec<Flag>),
}

impl StoreAction {
    pub(crate) const fn keyword(&self) -> &'static str {
        match self {
            Self::SetFlags(_) => "FLAGS",
            Self::AddFlags(_) => "+FLAGS",
            Self::RemoveFlags(_) => "-FLAGS",
        }
    }

    pub(crate) fn flags(&self) -> &[Flag] {
        match self {
            Self::SetFlags(f) | Self::AddFlags(f) | Self::RemoveFlags(f) => f,
        }
    }
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with \Answered flag.
    Answered,
    /// Messages with \Deleted flag.
    Deleted,
    /// Messages with \Draft flag.
    Draft,
    /// Messages with \Flagged flag.
    Flagged,
    /// Recent and unseen.
    New,
    /// Not recent.
    Old,
    /// Messages with \Recent flag.
    Recent,
    /// Messages with \Seen flag.
    Seen,
    /// Messages without \Answered flag.
    Unanswered,
    /// Messages without \Deleted flag.
    Undeleted,
    /// Messages without \Draft flag.
    Undraft,
    /// Messages without \Flagged flag.
    Unflagged,
    /// Messages without \Seen flag.
    Unseen,
    /// Messages with the keyword.
    Keyword(String),
    /// Messages without the keyword.
    Unkeyword(String),
    /// Sequence number set.
    SequenceSet(SequenceSet),
    /// UID set.
    Uid(IdSet),
    /// Subject contains text.
    Subject(String),
    /// From contains text.
    From(String),
    /// To contains text.
    To(String),
    /// Cc contains text.
    Cc(String),
    /// Bcc contains text.
    Bcc(String),
    /// Body contains text.
    Body(String),
    /// Text in header or body.
    Text(String),
    /// Header field contains value.
    Header(String, String),
    /// Internal date on or after.
    Since(NaiveDate),
    /// Internal date before.
    Before(NaiveDate),
    /// Internal date on.
    On(NaiveDate),
    /// Date header on or after.
    SentSince(NaiveDate),
    /// Date header before.
    SentBefore(NaiveDate),
    /// Date header on.
    SentOn(NaiveDate),
    /// Larger than size.
    Larger(u32),
    /// Smaller than size.
    Smaller(u32),
    /// Mod-sequence at least this value (CONDSTORE).
    ModSeq(u64),
    /// AND of criteria.
    And(Vec<Self>),
    /// OR of criteria.
    Or(Box<Self>, Box<Self>),
    /// NOT of criteria.
    Not(Box<Self>),
}

impl SearchCriteria {
    /// Collects the free-text arguments that are subject to a charset.
    pub fn texts(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(c) = stack.pop() {
            match c {
                Self::Subject(s)
                | Self::From(s)
                | Self::To(s)
                | Self::Cc(s)
                | Self::Bcc(s)
                | Self::Body(s)
                | Self::Text(s) => out.push(s.as_str()),
                Self::Header(name, value) => {
                    out.push(name.as_str());
                    out.push(value.as_str());
                }
                Self::And(all) => stack.extend(all.iter().rev()),
                Self::Or(a, b) => {
                    stack.push(b);
                    stack.push(a);
                }
                Self::Not(inner) => stack.push(inner),
                _ => {}
            }
        }
        out
    }

    /// Returns true if any text argument contains non-ASCII characters.
    #[must_use]
    pub fn has_non_ascii(&self) -> bool {
        self.texts().iter().any(|s| !s.is_ascii())
    }

    /// Returns true if every text argument can be encoded in `charset`.
    #[must_use]
    pub fn encodable_in(&self, charset: &str) -> bool {
        self.texts()
            .iter()
            .all(|s| encode_charset(s, charset).is_some())
    }
}

/// Encodes text for a SEARCH charset.
///
/// Labels resolve through the WHATWG encoding registry. Returns `None` when
/// the label is unknown, names an encoding that cannot be produced (UTF-16,
/// replacement), or the text has characters the charset lacks.
#[must_use]
pub fn encode_charset(text: &str, charset: &str) -> Option<Vec<u8>> {
    let label = charset.trim();
    // WHATWG folds US-ASCII into windows-1252.
    if label.eq_ignore_ascii_case("US-ASCII") || label.eq_ignore_ascii_case("ASCII") {
        return text.is_ascii().then(|| text.as_bytes().to_vec());
    }
    let encoding = Encoding::for_label(label.as_bytes())?;
    if encoding.output_encoding() != encoding {
        return None;
    }
    let (bytes, _, had_errors) = encoding.encode(text);
    (!had_errors).then(|| bytes.into_owned())
}

/// SORT key (RFC 5256, RFC 5957).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    /// Internal date and time.
    Arrival,
    /// First Cc address mailbox.
    Cc,
    /// Sent date, falling back to internal date.
    Date,
    /// First From address mailbox.
    From,
    /// Size.
    Size,
    /// Base subject.
    Subject,
    /// First To address mailbox.
    To,
    /// From display name.
    DisplayFrom,
    /// To display name.
    DisplayTo,
}

impl SortKey {
    /// Wire name of the key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "ARRIVAL",
            Self::Cc => "CC",
            Self::Date => "DATE",
            Self::From => "FROM",
            Self::Size => "SIZE",
            Self::Subject => "SUBJECT",
            Self::To => "TO",
            Self::DisplayFrom => "DISPLAYFROM",
            Self::DisplayTo => "DISPLAYTO",
        }
    }

    /// Returns true for the RFC 5957 keys that need `SORT=DISPLAY`.
    #[must_use]
    pub const fn is_display(self) -> bool {
        matches!(self, Self::DisplayFrom | Self::DisplayTo)
    }
}

/// One SORT criterion. `reverse` applies to this key only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortCriterion {
    /// Sort key.
    pub key: SortKey,
    /// Descending order for this key.
    pub reverse: bool,
}

impl SortCriterion {
    /// Ascending criterion.
    #[must_use]
    pub const fn asc(key: SortKey) -> Self {
        Self {
            key,
            reverse: false,
        }
    }

    /// Descending criterion.
    #[must_use]
    pub const fn desc(key: SortKey) -> Self {
        Self { key, reverse: true }
    }
}

impl std::fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reverse {
            f.write_str("REVERSE ")?;
        }
        f.write_str(self.key.as_str())
    }
}

/// THREAD algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThreadAlgorithm {
    /// ORDEREDSUBJECT.
    OrderedSubject,
    /// REFERENCES.
    References,
    /// Any other server algorithm (no client-side emulation).
    Other(String),
}

impl ThreadAlgorithm {
    /// Wire name of the algorithm.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::OrderedSubject => "ORDEREDSUBJECT",
            Self::References => "REFERENCES",
            Self::Other(name) => name,
        }
    }
}

/// Parameter attached to SELECT/EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SelectModifier {
    /// Plain SELECT.
    #[default]
    None,
    /// `(CONDSTORE)`.
    CondStore,
    /// `(QRESYNC (uidvalidity modseq [known-uids]))`.
    QResync {
        /// Last known UIDVALIDITY.
        uid_validity: UidValidity,
        /// Last known HIGHESTMODSEQ.
        mod_seq: u64,
        /// UIDs the client has cached.
        known_uids: Option<IdSet>,
    },
}

/// ESEARCH `RETURN` options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchReturn {
    /// MIN.
    pub min: bool,
    /// MAX.
    pub max: bool,
    /// ALL.
    pub all: bool,
    /// COUNT.
    pub count: bool,
}

impl SearchReturn {
    /// Every return option.
    #[must_use]
    pub const fn everything() -> Self {
        Self {
            min: true,
            max: true,
            all: true,
            count: true,
        }
    }

    pub(crate) fn options(self) -> Vec<&'static str> {
        [
            (self.min, "MIN"),
            (self.max, "MAX"),
            (self.all, "ALL"),
            (self.count, "COUNT"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_encoding() {
        assert_eq!(encode_charset("abc", "US-ASCII").unwrap(), b"abc");
        assert!(encode_charset("café", "US-ASCII").is_none());
        assert_eq!(encode_charset("café", "ISO-8859-1").unwrap(), b"caf\xe9");
        assert_eq!(encode_charset("café", "utf-8").unwrap(), "café".as_bytes());
        assert!(encode_charset("日本", "ISO-8859-1").is_none());
        assert_eq!(encode_charset("café", "windows-1252").unwrap(), b"caf\xe9");
        assert_eq!(encode_charset("€", "ISO-8859-15").unwrap(), b"\xa4");
        assert_eq!(encode_charset("да", "KOI8-R").unwrap(), b"\xc4\xc1");
        assert!(encode_charset("Grüße", "KOI8-R").is_none());
        assert!(encode_charset("x", "UTF-16LE").is_none());
        assert!(encode_charset("x", "X-NO-SUCH-CHARSET").is_none());
    }

    #[test]
    fn test_texts_walks_nested_criteria() {
        let criteria = SearchCriteria::And(vec![
            SearchCriteria::Unseen,
            SearchCriteria::Or(
                Box::new(SearchCriteria::Subject("Grüße".into())),
                Box::new(SearchCriteria::Not(Box::new(SearchCriteria::From("bob".into())))),
            ),
        ]);
        assert_eq!(criteria.texts(), vec!["Grüße", "bob"]);
        assert!(criteria.has_non_ascii());
        assert!(criteria.encodable_in("ISO-8859-1"));
        assert!(!criteria.encodable_in("US-ASCII"));
    }

    #[test]
    fn test_sort_criterion_display() {
        assert_eq!(SortCriterion::desc(SortKey::Subject).to_string(), "REVERSE SUBJECT");
        assert_eq!(SortCriterion::asc(SortKey::Date).to_string(), "DATE");
    }

    #[test]
    fn test_fetch_all_expands() {
        assert_eq!(FetchItems::All.attributes().len(), 4);
        assert!(FetchAttribute::Flags.is_mutable());
        assert!(!FetchAttribute::Envelope.is_mutable());
    }

    #[test]
    fn test_section_keys() {
        assert_eq!(
            FetchAttribute::peek("header.fields (References)").section_key().unwrap(),
            "HEADER.FIELDS (REFERENCES)"
        );
        assert_eq!(FetchAttribute::Rfc822.section_key().unwrap(), "");
        assert!(FetchAttribute::Envelope.section_key().is_none());
    }
}
