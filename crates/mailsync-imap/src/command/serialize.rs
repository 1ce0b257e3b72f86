//! Command serialization.
//!
//! A command is written as one or more chunks. Every chunk except the last
//! ends with a synchronizing literal header (`{n}\r\n`) and the next chunk
//! may only be sent after the server's `+` continuation. With LITERAL+ the
//! literals are non-synchronizing (`{n+}\r\n`) and the command is a single
//! chunk.

use chrono::NaiveDate;

use crate::types::{Flag, Mailbox};

use super::types::{FetchAttribute, FetchItems, SearchCriteria, StoreAction, encode_charset};

/// Builds the wire form of one command.
#[derive(Debug)]
pub struct CommandWriter {
    chunks: Vec<Vec<u8>>,
    current: Vec<u8>,
    literal_plus: bool,
}

impl CommandWriter {
    /// Creates a writer. `literal_plus` selects non-synchronizing literals.
    #[must_use]
    pub const fn new(literal_plus: bool) -> Self {
        Self {
            chunks: Vec::new(),
            current: Vec::new(),
            literal_plus,
        }
    }

    /// Writes raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.current.extend_from_slice(bytes);
        self
    }

    /// Writes an atom or other pre-validated token.
    pub fn atom(&mut self, s: &str) -> &mut Self {
        self.raw(s.as_bytes())
    }

    /// Writes a single space.
    pub fn sp(&mut self) -> &mut Self {
        self.current.push(b' ');
        self
    }

    /// Writes an astring: atom when possible, otherwise quoted or literal.
    pub fn astring(&mut self, s: &str) -> &mut Self {
        if !s.is_empty() && s.bytes().all(is_astring_char) {
            self.atom(s)
        } else {
            self.string(s.as_bytes())
        }
    }

    /// Writes a string: quoted when possible, otherwise a literal.
    pub fn string(&mut self, bytes: &[u8]) -> &mut Self {
        if bytes.iter().all(|&b| is_quotable(b)) {
            self.current.push(b'"');
            for &b in bytes {
                if b == b'"' || b == b'\\' {
                    self.current.push(b'\\');
                }
                self.current.push(b);
            }
            self.current.push(b'"');
            self
        } else {
            self.literal(bytes)
        }
    }

    /// Writes a literal.
    pub fn literal(&mut self, bytes: &[u8]) -> &mut Self {
        if self.literal_plus {
            self.current
                .extend_from_slice(format!("{{{}+}}\r\n", bytes.len()).as_bytes());
        } else {
            self.current
                .extend_from_slice(format!("{{{}}}\r\n", bytes.len()).as_bytes());
            self.chunks.push(std::mem::take(&mut self.current));
        }
        self.current.extend_from_slice(bytes);
        self
    }

    /// Writes a mailbox name in modified UTF-7.
    pub fn mailbox(&mut self, mailbox: &Mailbox) -> &mut Self {
        let wire = mailbox.to_wire();
        self.astring(&wire)
    }

    /// Writes a LIST pattern. `%` and `*` stay unquoted.
    pub fn list_pattern(&mut self, pattern: &str) -> &mut Self {
        let wire = Mailbox::new(pattern).to_wire();
        if !wire.is_empty()
            && wire
                .bytes()
                .all(|b| is_astring_char(b) || b == b'%' || b == b'*')
        {
            self.atom(&wire)
        } else {
            self.string(wire.as_bytes())
        }
    }

    /// Writes a parenthesized flag list.
    pub fn flag_list(&mut self, flags: &[Flag]) -> &mut Self {
        self.current.push(b'(');
        for (i, flag) in flags.iter().enumerate() {
            if i > 0 {
                self.sp();
            }
            self.atom(flag.as_str());
        }
        self.current.push(b')');
        self
    }

    /// Writes FETCH items. A single attribute is written bare unless
    /// `force_parens` is set.
    pub fn fetch_items(&mut self, items: &FetchItems, force_parens: bool) -> &mut Self {
        match items {
            FetchItems::All if !force_parens => self.atom("ALL"),
            FetchItems::Full if !force_parens => self.atom("FULL"),
            FetchItems::Fast if !force_parens => self.atom("FAST"),
            _ => {
                let attrs = items.attributes();
                if attrs.len() == 1 && !force_parens {
                    self.fetch_attribute(&attrs[0]);
                } else {
                    self.current.push(b'(');
                    for (i, attr) in attrs.iter().enumerate() {
                        if i > 0 {
                            self.sp();
                        }
                        self.fetch_attribute(attr);
                    }
                    self.current.push(b')');
                }
                self
            }
        }
    }

    /// Writes one FETCH attribute.
    pub fn fetch_attribute(&mut self, attr: &FetchAttribute) -> &mut Self {
        match attr {
            FetchAttribute::Flags => self.atom("FLAGS"),
            FetchAttribute::InternalDate => self.atom("INTERNALDATE"),
            FetchAttribute::Rfc822Size => self.atom("RFC822.SIZE"),
            FetchAttribute::Envelope => self.atom("ENVELOPE"),
            FetchAttribute::BodyStructure => self.atom("BODYSTRUCTURE"),
            FetchAttribute::Uid => self.atom("UID"),
            FetchAttribute::Rfc822 => self.atom("RFC822"),
            FetchAttribute::Rfc822Header => self.atom("RFC822.HEADER"),
            FetchAttribute::Rfc822Text => self.atom("RFC822.TEXT"),
            FetchAttribute::ModSeq => self.atom("MODSEQ"),
            FetchAttribute::Body {
                section,
                peek,
                partial,
            } => {
                self.atom(if *peek { "BODY.PEEK[" } else { "BODY[" });
                if let Some(s) = section {
                    self.atom(s);
                }
                self.atom("]");
                if let Some((origin, len)) = partial {
                    self.atom(&format!("<{origin}.{len}>"));
                }
                self
            }
        }
    }

    /// Writes a STORE action: `+FLAGS.SILENT (\Seen)`.
    pub fn store_action(&mut self, action: &StoreAction, silent: bool) -> &mut Self {
        self.atom(action.keyword());
        if silent {
            self.atom(".SILENT");
        }
        self.sp().flag_list(action.flags())
    }

    /// Writes search criteria. Text arguments are encoded in `charset`,
    /// falling back to UTF-8 when the text does not fit.
    pub fn search_criteria(&mut self, criteria: &SearchCriteria, charset: &str) -> &mut Self {
        self.criteria(criteria, charset, false)
    }

    fn criteria(&mut self, criteria: &SearchCriteria, charset: &str, nested: bool) -> &mut Self {
        match criteria {
            SearchCriteria::All => self.atom("ALL"),
            SearchCriteria::Answered => self.atom("ANSWERED"),
            SearchCriteria::Deleted => self.atom("DELETED"),
            SearchCriteria::Draft => self.atom("DRAFT"),
            SearchCriteria::Flagged => self.atom("FLAGGED"),
            SearchCriteria::New => self.atom("NEW"),
            SearchCriteria::Old => self.atom("OLD"),
            SearchCriteria::Recent => self.atom("RECENT"),
            SearchCriteria::Seen => self.atom("SEEN"),
            SearchCriteria::Unanswered => self.atom("UNANSWERED"),
            SearchCriteria::Undeleted => self.atom("UNDELETED"),
            SearchCriteria::Undraft => self.atom("UNDRAFT"),
            SearchCriteria::Unflagged => self.atom("UNFLAGGED"),
            SearchCriteria::Unseen => self.atom("UNSEEN"),
            SearchCriteria::Keyword(k) => self.atom("KEYWORD ").atom(k),
            SearchCriteria::Unkeyword(k) => self.atom("UNKEYWORD ").atom(k),
            SearchCriteria::SequenceSet(set) => self.atom(&set.to_string()),
            SearchCriteria::Uid(set) => self.atom("UID ").atom(&set.to_string()),
            SearchCriteria::Subject(s) => self.atom("SUBJECT ").text(s, charset),
            SearchCriteria::From(s) => self.atom("FROM ").text(s, charset),
            SearchCriteria::To(s) => self.atom("TO ").text(s, charset),
            SearchCriteria::Cc(s) => self.atom("CC ").text(s, charset),
            SearchCriteria::Bcc(s) => self.atom("BCC ").text(s, charset),
            SearchCriteria::Body(s) => self.atom("BODY ").text(s, charset),
            SearchCriteria::Text(s) => self.atom("TEXT ").text(s, charset),
            SearchCriteria::Header(name, value) => self
                .atom("HEADER ")
                .text(name, charset)
                .sp()
                .text(value, charset),
            SearchCriteria::Since(d) => self.atom("SINCE ").date(*d),
            SearchCriteria::Before(d) => self.atom("BEFORE ").date(*d),
            SearchCriteria::On(d) => self.atom("ON ").date(*d),
            SearchCriteria::SentSince(d) => self.atom("SENTSINCE ").date(*d),
            SearchCriteria::SentBefore(d) => self.atom("SENTBEFORE ").date(*d),
            SearchCriteria::SentOn(d) => self.atom("SENTON ").date(*d),
            SearchCriteria::Larger(n) => self.atom(&format!("LARGER {n}")),
            SearchCriteria::Smaller(n) => self.atom(&format!("SMALLER {n}")),
            SearchCriteria::ModSeq(m) => self.atom(&format!("MODSEQ {m}")),
            SearchCriteria::And(all) => match all.as_slice() {
                [] => self.atom("ALL"),
                [only] => self.criteria(only, charset, nested),
                many => {
                    if nested {
                        self.atom("(");
                    }
                    for (i, c) in many.iter().enumerate() {
                        if i > 0 {
                            self.sp();
                        }
                        self.criteria(c, charset, true);
                    }
                    if nested {
                        self.atom(")");
                    }
                    self
                }
            },
            SearchCriteria::Or(a, b) => {
                self.atom("OR ");
                self.criteria(a, charset, true).sp();
                self.criteria(b, charset, true)
            }
            SearchCriteria::Not(inner) => {
                self.atom("NOT ");
                self.criteria(inner, charset, true)
            }
        }
    }

    fn text(&mut self, s: &str, charset: &str) -> &mut Self {
        let bytes = encode_charset(s, charset).unwrap_or_else(|| s.as_bytes().to_vec());
        self.string(&bytes)
    }

    fn date(&mut self, date: NaiveDate) -> &mut Self {
        self.atom(&date.format("%-d-%b-%Y").to_string())
    }

    /// Finishes the command with CRLF and returns its chunks.
    #[must_use]
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        self.current.extend_from_slice(b"\r\n");
        self.chunks.push(self.current);
        self.chunks
    }
}

/// Returns true if the byte may appear in an unquoted astring.
const fn is_astring_char(b: u8) -> bool {
    b > 0x20
        && b < 0x7F
        && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\')
}

/// Returns true if the byte may appear inside a quoted string.
const fn is_quotable(b: u8) -> bool {
    b != 0 && b != b'\r' && b != b'\n' && b < 0x80
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::IdSet;

    fn single(w: CommandWriter) -> String {
        let chunks = w.finish();
        assert_eq!(chunks.len(), 1);
        String::from_utf8(chunks[0].clone()).unwrap()
    }

    #[test]
    fn test_astring_forms() {
        let mut w = CommandWriter::new(false);
        w.astring("INBOX").sp().astring("two words").sp().astring("").sp().astring("a\"b");
        assert_eq!(single(w), "INBOX \"two words\" \"\" \"a\\\"b\"\r\n");
    }

    #[test]
    fn test_synchronizing_literal_splits_chunks() {
        let mut w = CommandWriter::new(false);
        w.atom("A1 LOGIN ").astring("user").sp().astring("pa\r\nss");
        let chunks = w.finish();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], b"A1 LOGIN user {6}\r\n");
        assert_eq!(chunks[1], b"pa\r\nss\r\n");
    }

    #[test]
    fn test_literal_plus_single_chunk() {
        let mut w = CommandWriter::new(true);
        w.atom("A1 LOGIN ").astring("user").sp().astring("pässword");
        let chunks = w.finish();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with(b"A1 LOGIN user {9+}\r\np"));
    }

    #[test]
    fn test_mailbox_is_utf7() {
        let mut w = CommandWriter::new(false);
        w.mailbox(&Mailbox::new("Entwürfe"));
        assert_eq!(single(w), "Entw&APw-rfe\r\n");
    }

    #[test]
    fn test_list_pattern_keeps_wildcards() {
        let mut w = CommandWriter::new(false);
        w.list_pattern("INBOX/%").sp().list_pattern("*");
        assert_eq!(single(w), "INBOX/% *\r\n");
    }

    #[test]
    fn test_fetch_items_parens() {
        let mut w = CommandWriter::new(false);
        w.fetch_items(&FetchItems::Items(vec![FetchAttribute::Flags]), false);
        assert_eq!(single(w), "FLAGS\r\n");

        let mut w = CommandWriter::new(false);
        w.fetch_items(
            &FetchItems::Items(vec![
                FetchAttribute::Uid,
                FetchAttribute::Body {
                    section: Some("HEADER".into()),
                    peek: true,
                    partial: Some((0, 1024)),
                },
            ]),
            false,
        );
        assert_eq!(single(w), "(UID BODY.PEEK[HEADER]<0.1024>)\r\n");
    }

    #[test]
    fn test_store_action() {
        let mut w = CommandWriter::new(false);
        w.store_action(&StoreAction::AddFlags(vec![Flag::Seen, Flag::Flagged]), true);
        assert_eq!(single(w), "+FLAGS.SILENT (\\Seen \\Flagged)\r\n");
    }

    #[test]
    fn test_search_nesting() {
        let criteria = SearchCriteria::Or(
            Box::new(SearchCriteria::And(vec![
                SearchCriteria::Unseen,
                SearchCriteria::Since(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
            ])),
            Box::new(SearchCriteria::Not(Box::new(SearchCriteria::Uid(
                IdSet::parse("1:3").unwrap(),
            )))),
        );
        let mut w = CommandWriter::new(false);
        w.search_criteria(&criteria, "US-ASCII");
        assert_eq!(single(w), "OR (UNSEEN SINCE 5-Mar-2024) NOT UID 1:3\r\n");
    }

    #[test]
    fn test_search_text_charset() {
        let mut w = CommandWriter::new(false);
        w.search_criteria(&SearchCriteria::Subject("café".into()), "ISO-8859-1");
        let chunks = w.finish();
        assert_eq!(chunks[0], b"SUBJECT {4}\r\n");
        assert_eq!(chunks[1], b"caf\xe9\r\n");
    }
}
