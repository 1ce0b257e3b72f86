//! Server capabilities and response status.

/// Response status from a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// A single capability token advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// IDLE (RFC 2177)
    Idle,
    /// NAMESPACE (RFC 2342)
    Namespace,
    /// UIDPLUS (RFC 4315)
    UidPlus,
    /// MOVE (RFC 6851)
    Move,
    /// LITERAL+ (RFC 7888)
    LiteralPlus,
    /// STARTTLS
    StartTls,
    /// LOGIN disabled until TLS is active
    LoginDisabled,
    /// `AUTH=<mechanism>`
    Auth(String),
    /// ENABLE (RFC 5161)
    Enable,
    /// CONDSTORE (RFC 7162)
    CondStore,
    /// QRESYNC (RFC 7162)
    QResync,
    /// ID (RFC 2971)
    Id,
    /// `SORT` or `SORT=<variant>` (RFC 5256, RFC 5957)
    Sort(Option<String>),
    /// `THREAD=<algorithm>` (RFC 5256)
    Thread(String),
    /// ESEARCH (RFC 4731)
    ESearch,
    /// `COMPRESS=<algorithm>` (RFC 4978)
    Compress(String),
    /// QUOTA (RFC 2087)
    Quota,
    /// ACL (RFC 4314)
    Acl,
    /// SASL-IR (RFC 4959)
    SaslIr,
    /// UNSELECT (RFC 3691)
    Unselect,
    /// Any other token, kept verbatim.
    Unknown(String),
}

impl Capability {
    /// Parses a capability token. Matching is case-insensitive.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        let (name, value) = match upper.split_once('=') {
            Some((name, _)) => (name, Some(s[name.len() + 1..].to_string())),
            None => (upper.as_str(), None),
        };
        match (name, value) {
            ("IMAP4REV1", None) => Self::Imap4Rev1,
            ("IDLE", None) => Self::Idle,
            ("NAMESPACE", None) => Self::Namespace,
            ("UIDPLUS", None) => Self::UidPlus,
            ("MOVE", None) => Self::Move,
            ("LITERAL+", None) => Self::LiteralPlus,
            ("STARTTLS", None) => Self::StartTls,
            ("LOGINDISABLED", None) => Self::LoginDisabled,
            ("ENABLE", None) => Self::Enable,
            ("CONDSTORE", None) => Self::CondStore,
            ("QRESYNC", None) => Self::QResync,
            ("ID", None) => Self::Id,
            ("ESEARCH", None) => Self::ESearch,
            ("QUOTA", None) => Self::Quota,
            ("ACL", None) => Self::Acl,
            ("SASL-IR", None) => Self::SaslIr,
            ("UNSELECT", None) => Self::Unselect,
            ("SORT", variant) => Self::Sort(variant.map(|v| v.to_ascii_uppercase())),
            ("AUTH", Some(mech)) => Self::Auth(mech.to_ascii_uppercase()),
            ("THREAD", Some(alg)) => Self::Thread(alg.to_ascii_uppercase()),
            ("COMPRESS", Some(alg)) => Self::Compress(alg.to_ascii_uppercase()),
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Returns the part of the token before any `=`, uppercased.
    #[must_use]
    pub fn base_name(&self) -> String {
        let full = self.to_string().to_ascii_uppercase();
        match full.split_once('=') {
            Some((name, _)) => name.to_string(),
            None => full,
        }
    }

    /// Returns true if `name` designates this capability, either as the full
    /// token (`THREAD=REFERENCES`) or as its base name (`THREAD`).
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.to_string().eq_ignore_ascii_case(name) || self.base_name().eq_ignore_ascii_case(name)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Idle => write!(f, "IDLE"),
            Self::Namespace => write!(f, "NAMESPACE"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Move => write!(f, "MOVE"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Enable => write!(f, "ENABLE"),
            Self::CondStore => write!(f, "CONDSTORE"),
            Self::QResync => write!(f, "QRESYNC"),
            Self::Id => write!(f, "ID"),
            Self::Sort(None) => write!(f, "SORT"),
            Self::Sort(Some(variant)) => write!(f, "SORT={variant}"),
            Self::Thread(alg) => write!(f, "THREAD={alg}"),
            Self::ESearch => write!(f, "ESEARCH"),
            Self::Compress(alg) => write!(f, "COMPRESS={alg}"),
            Self::Quota => write!(f, "QUOTA"),
            Self::Acl => write!(f, "ACL"),
            Self::SaslIr => write!(f, "SASL-IR"),
            Self::Unselect => write!(f, "UNSELECT"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// The capabilities advertised by a server, in the order received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    caps: Vec<Capability>,
}

impl CapabilitySet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { caps: Vec::new() }
    }

    /// Returns true if the capability is present.
    #[must_use]
    pub fn contains(&self, cap: &Capability) -> bool {
        self.caps.contains(cap)
    }

    /// Returns true if any capability matches `name` (full token or base name).
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.caps.iter().any(|c| c.matches_name(name))
    }

    /// Returns true if `AUTH=<mechanism>` is advertised.
    #[must_use]
    pub fn has_auth(&self, mechanism: &str) -> bool {
        self.caps
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m.eq_ignore_ascii_case(mechanism)))
    }

    /// Returns the advertised THREAD algorithms.
    #[must_use]
    pub fn thread_algorithms(&self) -> Vec<&str> {
        self.caps
            .iter()
            .filter_map(|c| match c {
                Capability::Thread(alg) => Some(alg.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns a copy without the capabilities named in `ignored`.
    ///
    /// A base name (`THREAD`) removes every variant; a full token
    /// (`THREAD=REFERENCES`) removes only that one.
    #[must_use]
    pub fn without(&self, ignored: &[String]) -> Self {
        self.caps
            .iter()
            .filter(|c| !ignored.iter().any(|name| c.matches_name(name)))
            .cloned()
            .collect()
    }

    /// Iterates over the capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.iter()
    }

    /// Returns the number of capabilities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.caps.len()
    }

    /// Returns true if no capabilities are known.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        let mut caps: Vec<Capability> = Vec::new();
        for cap in iter {
            if !caps.contains(&cap) {
                caps.push(cap);
            }
        }
        Self { caps }
    }
}

impl From<Vec<Capability>> for CapabilitySet {
    fn from(caps: Vec<Capability>) -> Self {
        caps.into_iter().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn set(tokens: &[&str]) -> CapabilitySet {
        tokens.iter().map(|t| Capability::parse(t)).collect()
    }

    #[test]
    fn test_status_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(Status::PreAuth.is_ok());
        assert!(!Status::No.is_ok());
        assert!(!Status::Bye.is_ok());
    }

    #[test]
    fn test_parse_parameterized() {
        assert_eq!(Capability::parse("SORT"), Capability::Sort(None));
        assert_eq!(
            Capability::parse("SORT=DISPLAY"),
            Capability::Sort(Some("DISPLAY".into()))
        );
        assert_eq!(
            Capability::parse("thread=references"),
            Capability::Thread("REFERENCES".into())
        );
        assert_eq!(
            Capability::parse("COMPRESS=DEFLATE"),
            Capability::Compress("DEFLATE".into())
        );
        assert_eq!(Capability::parse("AUTH=plain"), Capability::Auth("PLAIN".into()));
        assert_eq!(Capability::parse("XLIST"), Capability::Unknown("XLIST".into()));
    }

    #[test]
    fn test_display_round_trip() {
        for token in ["IMAP4rev1", "SORT", "THREAD=ORDEREDSUBJECT", "LITERAL+", "SASL-IR"] {
            assert_eq!(Capability::parse(token).to_string(), token);
        }
    }

    #[test]
    fn test_base_name() {
        assert_eq!(Capability::Thread("REFERENCES".into()).base_name(), "THREAD");
        assert_eq!(Capability::Idle.base_name(), "IDLE");
    }

    #[test]
    fn test_set_queries() {
        let caps = set(&["IMAP4rev1", "AUTH=PLAIN", "THREAD=REFERENCES", "THREAD=ORDEREDSUBJECT"]);
        assert!(caps.has_auth("plain"));
        assert!(!caps.has_auth("XOAUTH2"));
        assert!(caps.has("thread"));
        assert_eq!(caps.thread_algorithms(), vec!["REFERENCES", "ORDEREDSUBJECT"]);
    }

    #[test]
    fn test_without_base_name_removes_all_variants() {
        let caps = set(&["IMAP4rev1", "SORT", "THREAD=REFERENCES", "THREAD=ORDEREDSUBJECT"]);
        let filtered = caps.without(&["THREAD".to_string()]);
        assert!(filtered.thread_algorithms().is_empty());
        assert!(filtered.contains(&Capability::Sort(None)));
    }

    #[test]
    fn test_without_full_token_removes_one() {
        let caps = set(&["THREAD=REFERENCES", "THREAD=ORDEREDSUBJECT"]);
        let filtered = caps.without(&["thread=references".to_string()]);
        assert_eq!(filtered.thread_algorithms(), vec!["ORDEREDSUBJECT"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let caps = set(&["IDLE", "idle", "IDLE"]);
        assert_eq!(caps.len(), 1);
    }
}
