//! IMAP command builder.
//!
//! [`Command`] describes one client command; [`Command::encode`] turns it
//! into wire chunks split at synchronizing literals.

mod serialize;
mod tag_generator;
mod types;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};

use crate::extension::Extension;
use crate::types::{Flag, Mailbox, SequenceSet, Tag};

pub use serialize::CommandWriter;
pub use tag_generator::TagGenerator;
pub use types::{
    FetchAttribute, FetchItems, SearchCriteria, SearchReturn, SelectModifier, SortCriterion,
    SortKey, StatusAttribute, StoreAction, ThreadAlgorithm, encode_charset,
};

/// Connection state a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requires {
    /// Valid in every connected state.
    Any,
    /// Only before authentication.
    NotAuthenticated,
    /// Authenticated or selected.
    Authenticated,
    /// A mailbox must be selected.
    Selected,
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Any state
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// ID command (RFC 2971). `None` sends `ID NIL`.
    Id {
        /// Client identification fields.
        parameters: Option<Vec<(String, Option<String>)>>,
    },

    // Not authenticated
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE command.
    Authenticate {
        /// SASL mechanism.
        mechanism: String,
        /// Initial response sent inline (SASL-IR), before base64.
        initial_response: Option<Vec<u8>>,
    },

    // Authenticated
    /// ENABLE command.
    Enable {
        /// Capabilities to enable.
        capabilities: Vec<String>,
    },
    /// COMPRESS DEFLATE command.
    Compress,
    /// NAMESPACE command.
    Namespace,
    /// SELECT, or EXAMINE when `read_only`.
    Select {
        /// Mailbox to open.
        mailbox: Mailbox,
        /// Use EXAMINE.
        read_only: bool,
        /// CONDSTORE/QRESYNC parameter.
        modifier: SelectModifier,
    },
    /// CREATE command.
    Create {
        /// Mailbox to create.
        mailbox: Mailbox,
    },
    /// DELETE command.
    Delete {
        /// Mailbox to delete.
        mailbox: Mailbox,
    },
    /// RENAME command.
    Rename {
        /// Current name.
        from: Mailbox,
        /// New name.
        to: Mailbox,
    },
    /// SUBSCRIBE command.
    Subscribe {
        /// Mailbox.
        mailbox: Mailbox,
    },
    /// UNSUBSCRIBE command.
    Unsubscribe {
        /// Mailbox.
        mailbox: Mailbox,
    },
    /// LIST command.
    List {
        /// Reference name.
        reference: String,
        /// Pattern with `%`/`*` wildcards.
        pattern: String,
    },
    /// LSUB command.
    Lsub {
        /// Reference name.
        reference: String,
        /// Pattern with `%`/`*` wildcards.
        pattern: String,
    },
    /// STATUS command.
    Status {
        /// Mailbox.
        mailbox: Mailbox,
        /// Attributes to request.
        items: Vec<StatusAttribute>,
    },
    /// APPEND command.
    Append {
        /// Target mailbox.
        mailbox: Mailbox,
        /// Flags to set.
        flags: Vec<Flag>,
        /// Internal date.
        date: Option<DateTime<FixedOffset>>,
        /// Raw RFC 5322 message.
        message: Vec<u8>,
    },
    /// GETQUOTA command.
    GetQuota {
        /// Quota root.
        root: String,
    },
    /// GETQUOTAROOT command.
    GetQuotaRoot {
        /// Mailbox.
        mailbox: Mailbox,
    },
    /// GETACL command.
    GetAcl {
        /// Mailbox.
        mailbox: Mailbox,
    },
    /// MYRIGHTS command.
    MyRights {
        /// Mailbox.
        mailbox: Mailbox,
    },
    /// IDLE command.
    Idle,
    /// DONE, ending IDLE. Untagged.
    Done,

    // Selected
    /// CHECK command.
    Check,
    /// CLOSE command.
    Close,
    /// UNSELECT command.
    Unselect,
    /// EXPUNGE command.
    Expunge,
    /// UID EXPUNGE command (UIDPLUS).
    UidExpunge {
        /// UIDs to expunge.
        uids: SequenceSet,
    },
    /// SEARCH command.
    Search {
        /// Criteria.
        criteria: SearchCriteria,
        /// CHARSET argument.
        charset: Option<String>,
        /// UID SEARCH.
        uid: bool,
        /// ESEARCH RETURN options.
        ret: Option<SearchReturn>,
    },
    /// SORT command.
    Sort {
        /// Sort criteria.
        keys: Vec<SortCriterion>,
        /// Charset (mandatory on the wire).
        charset: String,
        /// Search criteria.
        criteria: SearchCriteria,
        /// UID SORT.
        uid: bool,
    },
    /// THREAD command.
    Thread {
        /// Threading algorithm.
        algorithm: ThreadAlgorithm,
        /// Charset (mandatory on the wire).
        charset: String,
        /// Search criteria.
        criteria: SearchCriteria,
        /// UID THREAD.
        uid: bool,
    },
    /// FETCH command.
    Fetch {
        /// Messages.
        sequence: SequenceSet,
        /// Items.
        items: FetchItems,
        /// UID FETCH.
        uid: bool,
        /// CHANGEDSINCE modifier (CONDSTORE).
        changed_since: Option<u64>,
        /// VANISHED modifier (QRESYNC).
        vanished: bool,
    },
    /// STORE command.
    Store {
        /// Messages.
        sequence: SequenceSet,
        /// Flag change.
        action: StoreAction,
        /// UID STORE.
        uid: bool,
        /// Use `.SILENT`.
        silent: bool,
        /// UNCHANGEDSINCE modifier (CONDSTORE).
        unchanged_since: Option<u64>,
    },
    /// COPY command.
    Copy {
        /// Messages.
        sequence: SequenceSet,
        /// Destination.
        mailbox: Mailbox,
        /// UID COPY.
        uid: bool,
    },
    /// MOVE command.
    Move {
        /// Messages.
        sequence: SequenceSet,
        /// Destination.
        mailbox: Mailbox,
        /// UID MOVE.
        uid: bool,
    },
}

impl Command {
    /// Returns the command name for logging and state errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::Id { .. } => "ID",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Enable { .. } => "ENABLE",
            Self::Compress => "COMPRESS",
            Self::Namespace => "NAMESPACE",
            Self::Select {
                read_only: true, ..
            } => "EXAMINE",
            Self::Select { .. } => "SELECT",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Rename { .. } => "RENAME",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::List { .. } => "LIST",
            Self::Lsub { .. } => "LSUB",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::GetQuota { .. } => "GETQUOTA",
            Self::GetQuotaRoot { .. } => "GETQUOTAROOT",
            Self::GetAcl { .. } => "GETACL",
            Self::MyRights { .. } => "MYRIGHTS",
            Self::Idle => "IDLE",
            Self::Done => "DONE",
            Self::Check => "CHECK",
            Self::Close => "CLOSE",
            Self::Unselect => "UNSELECT",
            Self::Expunge => "EXPUNGE",
            Self::UidExpunge { .. } => "UID EXPUNGE",
            Self::Search { .. } => "SEARCH",
            Self::Sort { .. } => "SORT",
            Self::Thread { .. } => "THREAD",
            Self::Fetch { .. } => "FETCH",
            Self::Store { .. } => "STORE",
            Self::Copy { .. } => "COPY",
            Self::Move { .. } => "MOVE",
        }
    }

    /// Returns true if the arguments carry credentials.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::Login { .. } | Self::Authenticate { .. })
    }

    /// Returns the state the command needs.
    #[must_use]
    pub const fn requires(&self) -> Requires {
        match self {
            Self::Capability | Self::Noop | Self::Logout | Self::Id { .. } | Self::Done => {
                Requires::Any
            }
            Self::StartTls | Self::Login { .. } | Self::Authenticate { .. } => {
                Requires::NotAuthenticated
            }
            Self::Enable { .. }
            | Self::Compress
            | Self::Namespace
            | Self::Select { .. }
            | Self::Create { .. }
            | Self::Delete { .. }
            | Self::Rename { .. }
            | Self::Subscribe { .. }
            | Self::Unsubscribe { .. }
            | Self::List { .. }
            | Self::Lsub { .. }
            | Self::Status { .. }
            | Self::Append { .. }
            | Self::GetQuota { .. }
            | Self::GetQuotaRoot { .. }
            | Self::GetAcl { .. }
            | Self::MyRights { .. } => Requires::Authenticated,
            Self::Idle
            | Self::Check
            | Self::Close
            | Self::Unselect
            | Self::Expunge
            | Self::UidExpunge { .. }
            | Self::Search { .. }
            | Self::Sort { .. }
            | Self::Thread { .. }
            | Self::Fetch { .. }
            | Self::Store { .. }
            | Self::Copy { .. }
            | Self::Move { .. } => Requires::Selected,
        }
    }

    /// Returns the extensions the command depends on.
    #[must_use]
    pub fn required_extensions(&self) -> Vec<Extension> {
        let mut out = Vec::new();
        match self {
            Self::StartTls => out.push(Extension::StartTls),
            Self::Id { .. } => out.push(Extension::Id),
            Self::Enable { .. } => out.push(Extension::Enable),
            Self::Compress => out.push(Extension::CompressDeflate),
            Self::Namespace => out.push(Extension::Namespace),
            Self::Select { modifier, .. } => match modifier {
                SelectModifier::None => {}
                SelectModifier::CondStore => out.push(Extension::CondStore),
                SelectModifier::QResync { .. } => out.push(Extension::QResync),
            },
            Self::GetQuota { .. } | Self::GetQuotaRoot { .. } => out.push(Extension::Quota),
            Self::GetAcl { .. } | Self::MyRights { .. } => out.push(Extension::Acl),
            Self::Idle => out.push(Extension::Idle),
            Self::Unselect => out.push(Extension::Unselect),
            Self::UidExpunge { .. } => out.push(Extension::UidPlus),
            Self::Search { ret, criteria, .. } => {
                if ret.is_some() {
                    out.push(Extension::ESearch);
                }
                if uses_modseq(criteria) {
                    out.push(Extension::CondStore);
                }
            }
            Self::Sort { keys, .. } => {
                out.push(Extension::Sort);
                if keys.iter().any(|k| k.key.is_display()) {
                    out.push(Extension::SortDisplay);
                }
            }
            Self::Thread { algorithm, .. } => out.extend(Extension::for_thread(algorithm)),
            Self::Fetch {
                changed_since,
                vanished,
                ..
            } => {
                if changed_since.is_some() {
                    out.push(Extension::CondStore);
                }
                if *vanished {
                    out.push(Extension::QResync);
                }
            }
            Self::Store {
                unchanged_since, ..
            } => {
                if unchanged_since.is_some() {
                    out.push(Extension::CondStore);
                }
            }
            Self::Move { .. } => out.push(Extension::Move),
            _ => {}
        }
        out
    }

    /// Encodes the command into wire chunks.
    ///
    /// Every chunk but the last ends with a synchronizing literal header;
    /// the caller must wait for a continuation before sending the next.
    #[must_use]
    pub fn encode(&self, tag: &Tag, literal_plus: bool) -> Vec<Vec<u8>> {
        let mut w = CommandWriter::new(literal_plus);
        if matches!(self, Self::Done) {
            w.atom("DONE");
            return w.finish();
        }
        w.atom(tag.as_str()).sp();
        self.write_body(&mut w);
        w.finish()
    }

    /// Serializes the command into one buffer, using non-synchronizing
    /// literals where literals are needed.
    #[must_use]
    pub fn serialize(&self, tag: &Tag) -> Vec<u8> {
        self.encode(tag, true).concat()
    }

    /// Returns a loggable rendering with credentials removed.
    #[must_use]
    pub fn redacted(&self, tag: &Tag) -> String {
        if self.is_sensitive() {
            format!("{tag} {} <redacted>", self.name())
        } else {
            String::from_utf8_lossy(&self.serialize(tag)).trim_end().to_string()
        }
    }

    fn write_body(&self, w: &mut CommandWriter) {
        match self {
            Self::Capability
            | Self::Noop
            | Self::Logout
            | Self::StartTls
            | Self::Namespace
            | Self::Idle
            | Self::Check
            | Self::Close
            | Self::Unselect
            | Self::Expunge
            | Self::Done => {
                w.atom(self.name());
            }
            Self::Compress => {
                w.atom("COMPRESS DEFLATE");
            }
            Self::Id { parameters } => {
                w.atom("ID ");
                match parameters {
                    None => {
                        w.atom("NIL");
                    }
                    Some(params) => {
                        w.atom("(");
                        for (i, (key, value)) in params.iter().enumerate() {
                            if i > 0 {
                                w.sp();
                            }
                            w.string(key.as_bytes()).sp();
                            match value {
                                Some(v) => w.string(v.as_bytes()),
                                None => w.atom("NIL"),
                            };
                        }
                        w.atom(")");
                    }
                }
            }
            Self::Login { username, password } => {
                w.atom("LOGIN ").astring(username).sp().astring(password);
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                w.atom("AUTHENTICATE ").atom(mechanism);
                if let Some(ir) = initial_response {
                    w.sp();
                    if ir.is_empty() {
                        w.atom("=");
                    } else {
                        w.atom(&STANDARD.encode(ir));
                    }
                }
            }
            Self::Enable { capabilities } => {
                w.atom("ENABLE");
                for cap in capabilities {
                    w.sp().atom(cap);
                }
            }
            Self::Select {
                mailbox, modifier, ..
            } => {
                w.atom(self.name()).sp().mailbox(mailbox);
                match modifier {
                    SelectModifier::None => {}
                    SelectModifier::CondStore => {
                        w.atom(" (CONDSTORE)");
                    }
                    SelectModifier::QResync {
                        uid_validity,
                        mod_seq,
                        known_uids,
                    } => {
                        w.atom(&format!(" (QRESYNC ({} {mod_seq}", uid_validity.get()));
                        if let Some(uids) = known_uids.as_ref().filter(|u| !u.is_empty()) {
                            w.sp().atom(&uids.to_string());
                        }
                        w.atom("))");
                    }
                }
            }
            Self::Create { mailbox }
            | Self::Delete { mailbox }
            | Self::Subscribe { mailbox }
            | Self::Unsubscribe { mailbox }
            | Self::GetQuotaRoot { mailbox }
            | Self::GetAcl { mailbox }
            | Self::MyRights { mailbox } => {
                w.atom(self.name()).sp().mailbox(mailbox);
            }
            Self::Rename { from, to } => {
                w.atom("RENAME ").mailbox(from).sp().mailbox(to);
            }
            Self::List { reference, pattern } | Self::Lsub { reference, pattern } => {
                w.atom(self.name())
                    .sp()
                    .list_pattern(reference)
                    .sp()
                    .list_pattern(pattern);
            }
            Self::Status { mailbox, items } => {
                w.atom("STATUS ").mailbox(mailbox).atom(" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        w.sp();
                    }
                    w.atom(item.as_str());
                }
                w.atom(")");
            }
            Self::Append {
                mailbox,
                flags,
                date,
                message,
            } => {
                w.atom("APPEND ").mailbox(mailbox);
                if !flags.is_empty() {
                    w.sp().flag_list(flags);
                }
                if let Some(date) = date {
                    let formatted = date.format("%d-%b-%Y %H:%M:%S %z").to_string();
                    w.sp().string(formatted.as_bytes());
                }
                w.sp().literal(message);
            }
            Self::GetQuota { root } => {
                w.atom("GETQUOTA ").astring(root);
            }
            Self::UidExpunge { uids } => {
                w.atom("UID EXPUNGE ").atom(&uids.to_string());
            }
            Self::Search {
                criteria,
                charset,
                uid,
                ret,
            } => {
                prefix_uid(w, *uid).atom("SEARCH");
                if let Some(ret) = ret {
                    w.atom(&format!(" RETURN ({})", ret.options().join(" ")));
                }
                let charset = charset.as_deref();
                if let Some(cs) = charset {
                    w.atom(" CHARSET ").atom(cs);
                }
                w.sp()
                    .search_criteria(criteria, charset.unwrap_or("US-ASCII"));
            }
            Self::Sort {
                keys,
                charset,
                criteria,
                uid,
            } => {
                let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
                prefix_uid(w, *uid)
                    .atom(&format!("SORT ({}) ", keys.join(" ")))
                    .atom(charset)
                    .sp()
                    .search_criteria(criteria, charset);
            }
            Self::Thread {
                algorithm,
                charset,
                criteria,
                uid,
            } => {
                prefix_uid(w, *uid)
                    .atom("THREAD ")
                    .atom(algorithm.as_str())
                    .sp()
                    .atom(charset)
                    .sp()
                    .search_criteria(criteria, charset);
            }
            Self::Fetch {
                sequence,
                items,
                uid,
                changed_since,
                vanished,
            } => {
                let has_modifiers = changed_since.is_some() || *vanished;
                prefix_uid(w, *uid)
                    .atom("FETCH ")
                    .atom(&sequence.to_string())
                    .sp()
                    .fetch_items(items, has_modifiers);
                if has_modifiers {
                    let mut modifiers = Vec::new();
                    if let Some(modseq) = changed_since {
                        modifiers.push(format!("CHANGEDSINCE {modseq}"));
                    }
                    if *vanished {
                        modifiers.push("VANISHED".to_string());
                    }
                    w.atom(&format!(" ({})", modifiers.join(" ")));
                }
            }
            Self::Store {
                sequence,
                action,
                uid,
                silent,
                unchanged_since,
            } => {
                prefix_uid(w, *uid)
                    .atom("STORE ")
                    .atom(&sequence.to_string())
                    .sp();
                if let Some(modseq) = unchanged_since {
                    w.atom(&format!("(UNCHANGEDSINCE {modseq}) "));
                }
                w.store_action(action, *silent);
            }
            Self::Copy {
                sequence,
                mailbox,
                uid,
            }
            | Self::Move {
                sequence,
                mailbox,
                uid,
            } => {
                prefix_uid(w, *uid)
                    .atom(self.name())
                    .sp()
                    .atom(&sequence.to_string())
                    .sp()
                    .mailbox(mailbox);
            }
        }
    }
}

fn prefix_uid(w: &mut CommandWriter, uid: bool) -> &mut CommandWriter {
    if uid {
        w.atom("UID ");
    }
    w
}

fn uses_modseq(criteria: &SearchCriteria) -> bool {
    match criteria {
        SearchCriteria::ModSeq(_) => true,
        SearchCriteria::And(all) => all.iter().any(uses_modseq),
        SearchCriteria::Or(a, b) => uses_modseq(a) || uses_modseq(b),
        SearchCriteria::Not(inner) => uses_modseq(inner),
        _ => false,
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
    use crate::types::{IdSet, UidValidity};

    fn wire(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize(&Tag::new("A0001"))).unwrap()
    }

    #[test]
    fn test_capability_command() {
        assert_eq!(wire(&Command::Capability), "A0001 CAPABILITY\r\n");
    }

    #[test]
    fn test_login_quoted() {
        let cmd = Command::Login {
            username: "user@example.com".into(),
            password: "pass word".into(),
        };
        assert_eq!(wire(&cmd), "A0001 LOGIN user@example.com \"pass word\"\r\n");
        assert!(cmd.is_sensitive());
        assert_eq!(cmd.redacted(&Tag::new("A0001")), "A0001 LOGIN <redacted>");
    }

    #[test]
    fn test_login_literal_chunks() {
        let cmd = Command::Login {
            username: "user".into(),
            password: "pässword".into(),
        };
        let chunks = cmd.encode(&Tag::new("A0001"), false);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], b"A0001 LOGIN user {9}\r\n");
    }

    #[test]
    fn test_authenticate_initial_response() {
        let cmd = Command::Authenticate {
            mechanism: "PLAIN".into(),
            initial_response: Some(b"\0user\0pass".to_vec()),
        };
        assert_eq!(wire(&cmd), "A0001 AUTHENTICATE PLAIN AHVzZXIAcGFzcw==\r\n");
    }

    #[test]
    fn test_select_variants() {
        let plain = Command::Select {
            mailbox: Mailbox::inbox(),
            read_only: false,
            modifier: SelectModifier::None,
        };
        assert_eq!(wire(&plain), "A0001 SELECT INBOX\r\n");

        let examine = Command::Select {
            mailbox: Mailbox::new("Archive"),
            read_only: true,
            modifier: SelectModifier::CondStore,
        };
        assert_eq!(wire(&examine), "A0001 EXAMINE Archive (CONDSTORE)\r\n");

        let qresync = Command::Select {
            mailbox: Mailbox::inbox(),
            read_only: false,
            modifier: SelectModifier::QResync {
                uid_validity: UidValidity::new(67890007).unwrap(),
                mod_seq: 90060115194045000,
                known_uids: Some(IdSet::parse("41:211,214:541").unwrap()),
            },
        };
        assert_eq!(
            wire(&qresync),
            "A0001 SELECT INBOX (QRESYNC (67890007 90060115194045000 41:211,214:541))\r\n"
        );
        assert_eq!(qresync.required_extensions(), vec![Extension::QResync]);
    }

    #[test]
    fn test_fetch_forms() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::range(1, 5).unwrap(),
            items: FetchItems::Items(vec![FetchAttribute::Flags, FetchAttribute::Envelope]),
            uid: true,
            changed_since: None,
            vanished: false,
        };
        assert_eq!(wire(&cmd), "A0001 UID FETCH 1:5 (FLAGS ENVELOPE)\r\n");

        let single = Command::Fetch {
            sequence: SequenceSet::range(1, 5).unwrap(),
            items: FetchItems::Items(vec![FetchAttribute::Flags]),
            uid: true,
            changed_since: None,
            vanished: false,
        };
        assert_eq!(wire(&single), "A0001 UID FETCH 1:5 FLAGS\r\n");

        let changed = Command::Fetch {
            sequence: SequenceSet::all(),
            items: FetchItems::Items(vec![FetchAttribute::Flags]),
            uid: true,
            changed_since: Some(12345),
            vanished: true,
        };
        assert_eq!(
            wire(&changed),
            "A0001 UID FETCH 1:* (FLAGS) (CHANGEDSINCE 12345 VANISHED)\r\n"
        );
        assert_eq!(
            changed.required_extensions(),
            vec![Extension::CondStore, Extension::QResync]
        );
    }

    #[test]
    fn test_store_unchangedsince_before_action() {
        let cmd = Command::Store {
            sequence: SequenceSet::range(1, 5).unwrap(),
            action: StoreAction::AddFlags(vec![Flag::Seen]),
            uid: true,
            silent: true,
            unchanged_since: Some(12),
        };
        assert_eq!(
            wire(&cmd),
            "A0001 UID STORE 1:5 (UNCHANGEDSINCE 12) +FLAGS.SILENT (\\Seen)\r\n"
        );
    }

    #[test]
    fn test_search_with_return_and_charset() {
        let cmd = Command::Search {
            criteria: SearchCriteria::Subject("Grüße".into()),
            charset: Some("UTF-8".into()),
            uid: true,
            ret: Some(SearchReturn::everything()),
        };
        let chunks = cmd.encode(&Tag::new("A0001"), false);
        assert_eq!(
            chunks[0],
            b"A0001 UID SEARCH RETURN (MIN MAX ALL COUNT) CHARSET UTF-8 SUBJECT {7}\r\n"
        );
        assert_eq!(cmd.required_extensions(), vec![Extension::ESearch]);
    }

    #[test]
    fn test_sort_reverse_binds_next_key() {
        let cmd = Command::Sort {
            keys: vec![
                SortCriterion::desc(SortKey::Subject),
                SortCriterion::asc(SortKey::Date),
            ],
            charset: "US-ASCII".into(),
            criteria: SearchCriteria::All,
            uid: true,
        };
        assert_eq!(
            wire(&cmd),
            "A0001 UID SORT (REVERSE SUBJECT DATE) US-ASCII ALL\r\n"
        );
        assert_eq!(cmd.requires(), Requires::Selected);
    }

    #[test]
    fn test_thread_command() {
        let cmd = Command::Thread {
            algorithm: ThreadAlgorithm::References,
            charset: "UTF-8".into(),
            criteria: SearchCriteria::All,
            uid: false,
        };
        assert_eq!(wire(&cmd), "A0001 THREAD REFERENCES UTF-8 ALL\r\n");
        assert_eq!(cmd.required_extensions(), vec![Extension::ThreadReferences]);
    }

    #[test]
    fn test_append_with_date_and_literal() {
        let date = DateTime::parse_from_rfc3339("2024-07-04T09:05:00+02:00").unwrap();
        let cmd = Command::Append {
            mailbox: Mailbox::new("Sent"),
            flags: vec![Flag::Seen],
            date: Some(date),
            message: b"Subject: hi\r\n\r\nbody".to_vec(),
        };
        let chunks = cmd.encode(&Tag::new("A0001"), false);
        assert_eq!(
            chunks[0],
            b"A0001 APPEND Sent (\\Seen) \"04-Jul-2024 09:05:00 +0200\" {19}\r\n"
        );
        assert_eq!(chunks[1], b"Subject: hi\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_id_and_done() {
        let id = Command::Id {
            parameters: Some(vec![
                ("name".into(), Some("mailsync".into())),
                ("os".into(), None),
            ]),
        };
        assert_eq!(wire(&id), "A0001 ID (\"name\" \"mailsync\" \"os\" NIL)\r\n");
        assert_eq!(wire(&Command::Id { parameters: None }), "A0001 ID NIL\r\n");
        assert_eq!(wire(&Command::Done), "DONE\r\n");
    }

    #[test]
    fn test_list_and_status() {
        let list = Command::List {
            reference: String::new(),
            pattern: "*".into(),
        };
        assert_eq!(wire(&list), "A0001 LIST \"\" *\r\n");
        let status = Command::Status {
            mailbox: Mailbox::inbox(),
            items: vec![StatusAttribute::Messages, StatusAttribute::UidNext],
        };
        assert_eq!(wire(&status), "A0001 STATUS INBOX (MESSAGES UIDNEXT)\r\n");
    }

    #[test]
    fn test_state_requirements() {
        assert_eq!(Command::Noop.requires(), Requires::Any);
        assert_eq!(Command::StartTls.requires(), Requires::NotAuthenticated);
        assert_eq!(Command::Namespace.requires(), Requires::Authenticated);
        assert_eq!(Command::Expunge.requires(), Requires::Selected);
    }

    #[test]
    fn test_move_and_quota_extensions() {
        let mv = Command::Move {
            sequence: SequenceSet::single(3).unwrap(),
            mailbox: Mailbox::new("Trash"),
            uid: true,
        };
        assert_eq!(wire(&mv), "A0001 UID MOVE 3 Trash\r\n");
        assert_eq!(mv.required_extensions(), vec![Extension::Move]);
        assert_eq!(
            Command::GetQuota { root: String::new() }.required_extensions(),
            vec![Extension::Quota]
        );
    }
}
