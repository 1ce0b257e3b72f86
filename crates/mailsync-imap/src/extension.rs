//! Extension registry.
//!
//! Each [`Extension`] names the capability token that enables it. The
//! [`Extensions`] registry is recomputed from the advertised capabilities
//! (minus the configured ignore list) whenever they change, and commands
//! consult it before anything is written.

use crate::command::ThreadAlgorithm;
use crate::error::{Error, Result};
use crate::types::CapabilitySet;

/// Protocol extensions the client knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Extension {
    /// STARTTLS.
    StartTls,
    /// LITERAL+ (RFC 7888).
    LiteralPlus,
    /// SASL-IR (RFC 4959).
    SaslIr,
    /// ENABLE (RFC 5161).
    Enable,
    /// ID (RFC 2971).
    Id,
    /// COMPRESS=DEFLATE (RFC 4978).
    CompressDeflate,
    /// NAMESPACE (RFC 2342).
    Namespace,
    /// IDLE (RFC 2177).
    Idle,
    /// UIDPLUS (RFC 4315).
    UidPlus,
    /// MOVE (RFC 6851).
    Move,
    /// UNSELECT (RFC 3691).
    Unselect,
    /// CONDSTORE (RFC 7162).
    CondStore,
    /// QRESYNC (RFC 7162).
    QResync,
    /// ESEARCH (RFC 4731).
    ESearch,
    /// SORT (RFC 5256).
    Sort,
    /// SORT=DISPLAY (RFC 5957).
    SortDisplay,
    /// THREAD=ORDEREDSUBJECT (RFC 5256).
    ThreadOrderedSubject,
    /// THREAD=REFERENCES (RFC 5256).
    ThreadReferences,
    /// QUOTA (RFC 2087).
    Quota,
    /// ACL (RFC 4314).
    Acl,
}

impl Extension {
    /// Every known extension.
    pub const ALL: [Self; 20] = [
        Self::StartTls,
        Self::LiteralPlus,
        Self::SaslIr,
        Self::Enable,
        Self::Id,
        Self::CompressDeflate,
        Self::Namespace,
        Self::Idle,
        Self::UidPlus,
        Self::Move,
        Self::Unselect,
        Self::CondStore,
        Self::QResync,
        Self::ESearch,
        Self::Sort,
        Self::SortDisplay,
        Self::ThreadOrderedSubject,
        Self::ThreadReferences,
        Self::Quota,
        Self::Acl,
    ];

    /// The capability token that enables this extension.
    #[must_use]
    pub const fn capability(self) -> &'static str {
        match self {
            Self::StartTls => "STARTTLS",
            Self::LiteralPlus => "LITERAL+",
            Self::SaslIr => "SASL-IR",
            Self::Enable => "ENABLE",
            Self::Id => "ID",
            Self::CompressDeflate => "COMPRESS=DEFLATE",
            Self::Namespace => "NAMESPACE",
            Self::Idle => "IDLE",
            Self::UidPlus => "UIDPLUS",
            Self::Move => "MOVE",
            Self::Unselect => "UNSELECT",
            Self::CondStore => "CONDSTORE",
            Self::QResync => "QRESYNC",
            Self::ESearch => "ESEARCH",
            Self::Sort => "SORT",
            Self::SortDisplay => "SORT=DISPLAY",
            Self::ThreadOrderedSubject => "THREAD=ORDEREDSUBJECT",
            Self::ThreadReferences => "THREAD=REFERENCES",
            Self::Quota => "QUOTA",
            Self::Acl => "ACL",
        }
    }

    /// The extension that carries a THREAD algorithm, if known.
    #[must_use]
    pub const fn for_thread(algorithm: &ThreadAlgorithm) -> Option<Self> {
        match algorithm {
            ThreadAlgorithm::OrderedSubject => Some(Self::ThreadOrderedSubject),
            ThreadAlgorithm::References => Some(Self::ThreadReferences),
            ThreadAlgorithm::Other(_) => None,
        }
    }

    fn advertised_in(self, caps: &CapabilitySet) -> bool {
        match self {
            // QRESYNC implies CONDSTORE (RFC 7162 section 3.2.3).
            Self::CondStore => caps.has("CONDSTORE") || caps.has("QRESYNC"),
            // SORT=DISPLAY implies SORT.
            Self::Sort => caps.iter().any(|c| c.base_name() == "SORT"),
            other => caps
                .iter()
                .any(|c| c.to_string().eq_ignore_ascii_case(other.capability())),
        }
    }
}

impl std::fmt::Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.capability())
    }
}

/// The extensions usable on a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    enabled: Vec<Extension>,
}

impl Extensions {
    /// Computes the usable extensions from advertised capabilities.
    ///
    /// Names in `ignored` disable matching capabilities even when the
    /// server advertises them.
    #[must_use]
    pub fn negotiate(caps: &CapabilitySet, ignored: &[String]) -> Self {
        let effective = caps.without(ignored);
        let enabled = Extension::ALL
            .into_iter()
            .filter(|ext| ext.advertised_in(&effective))
            .collect();
        Self { enabled }
    }

    /// Returns true if the extension may be used.
    #[must_use]
    pub fn supports(&self, ext: Extension) -> bool {
        self.enabled.contains(&ext)
    }

    /// Fails with [`Error::CapabilityMissing`] unless the extension is usable.
    pub fn require(&self, ext: Extension) -> Result<()> {
        if self.supports(ext) {
            Ok(())
        } else {
            Err(Error::CapabilityMissing(ext.capability().to_string()))
        }
    }

    /// Iterates over the usable extensions.
    pub fn iter(&self) -> impl Iterator<Item = Extension> + '_ {
        self.enabled.iter().copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::Capability;

    fn caps(tokens: &[&str]) -> CapabilitySet {
        tokens.iter().map(|t| Capability::parse(t)).collect()
    }

    #[test]
    fn test_negotiate_basic() {
        let ext = Extensions::negotiate(
            &caps(&["IMAP4rev1", "IDLE", "SORT", "THREAD=REFERENCES", "COMPRESS=DEFLATE"]),
            &[],
        );
        assert!(ext.supports(Extension::Idle));
        assert!(ext.supports(Extension::Sort));
        assert!(ext.supports(Extension::ThreadReferences));
        assert!(!ext.supports(Extension::ThreadOrderedSubject));
        assert!(ext.supports(Extension::CompressDeflate));
        assert!(!ext.supports(Extension::Move));
    }

    #[test]
    fn test_ignore_list_disables() {
        let ext = Extensions::negotiate(
            &caps(&["IMAP4rev1", "SORT", "THREAD=REFERENCES", "MOVE"]),
            &["sort".to_string(), "THREAD".to_string()],
        );
        assert!(!ext.supports(Extension::Sort));
        assert!(!ext.supports(Extension::ThreadReferences));
        assert!(ext.supports(Extension::Move));
    }

    #[test]
    fn test_qresync_implies_condstore() {
        let ext = Extensions::negotiate(&caps(&["QRESYNC"]), &[]);
        assert!(ext.supports(Extension::CondStore));
        assert!(ext.supports(Extension::QResync));
    }

    #[test]
    fn test_sort_display_implies_sort() {
        let ext = Extensions::negotiate(&caps(&["SORT=DISPLAY"]), &[]);
        assert!(ext.supports(Extension::Sort));
        assert!(ext.supports(Extension::SortDisplay));
    }

    #[test]
    fn test_require_names_capability() {
        let ext = Extensions::negotiate(&caps(&["IMAP4rev1"]), &[]);
        let err = ext.require(Extension::Move).unwrap_err();
        assert!(matches!(err, Error::CapabilityMissing(ref c) if c == "MOVE"));
        assert!(ext.require(Extension::Move).is_err());
    }

    #[test]
    fn test_compress_other_algorithm_not_deflate() {
        let ext = Extensions::negotiate(&caps(&["COMPRESS=LZ4"]), &[]);
        assert!(!ext.supports(Extension::CompressDeflate));
    }
}
