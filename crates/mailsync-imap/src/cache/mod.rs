//! Message and search-result cache.
//!
//! Records are stored per mailbox identity (host, port, user, mailbox) and
//! UIDVALIDITY, so a UIDVALIDITY change makes every old record unreachable.
//! The session drops them explicitly as well.
//!
//! Backend failures never fail a command: reads become misses and writes
//! are skipped, both logged at `warn`.
//!
//! Several sessions may share one backend. A message record is looked up
//! directly, so the per-mailbox UID index only drives cleanup, and every
//! metadata write merges the index and search results already stored.

mod backend;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use backend::{CacheBackend, CacheError, MemoryBackend};

use crate::command::FetchAttribute;
use crate::parser::MessageData;
use crate::types::IdSet;

/// Identity of a mailbox across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxKey {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Authenticated user.
    pub username: String,
    /// Mailbox name, decoded.
    pub mailbox: String,
}

impl MailboxKey {
    fn ident(&self) -> String {
        serde_json::to_string(&(&self.host, self.port, &self.username, &self.mailbox))
            .unwrap_or_else(|_| format!("{}:{}:{}:{}", self.host, self.port, self.username, self.mailbox))
    }

    fn meta_key(&self) -> String {
        format!("meta{}", self.ident())
    }

    fn message_key(&self, uid_validity: u32, uid: u32) -> String {
        format!("msg{}/{uid_validity}/{uid}", self.ident())
    }
}

/// Per-mailbox metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxMeta {
    /// UIDVALIDITY the records belong to.
    pub uid_validity: u32,
    /// HIGHESTMODSEQ through which cached flags are known to be current.
    pub highest_mod_seq: Option<u64>,
    /// UIDs that may have a stored record. Only used to find records to
    /// delete; a listed UID whose record is gone is a miss.
    pub uids: IdSet,
    /// Mailbox fingerprint the stored search results were computed at.
    pub search_fingerprint: Option<String>,
    /// Search, sort and thread results keyed by command text.
    pub searches: BTreeMap<String, serde_json::Value>,
}

impl MailboxMeta {
    fn fresh(uid_validity: u32) -> Self {
        Self {
            uid_validity,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Record {
    data: MessageData,
    /// Set when the flags were fetched with CONDSTORE active.
    flags_mod_seq: Option<u64>,
}

/// Result of splitting a UID FETCH into cached and missing parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPlan {
    /// Everything already known, per UID. May be partial for UIDs that
    /// also appear in `missing`.
    pub cached: BTreeMap<u32, MessageData>,
    /// UID sets that share the same missing attributes, in request order.
    pub missing: Vec<(Vec<FetchAttribute>, IdSet)>,
}

impl FetchPlan {
    /// Returns true if nothing has to be fetched.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Message cache over a [`CacheBackend`].
#[derive(Clone)]
pub struct MessageCache {
    backend: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for MessageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCache").finish_non_exhaustive()
    }
}

impl MessageCache {
    /// Creates a cache over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key) {
            Ok(bytes) => bytes?,
            Err(error) => {
                tracing::warn!(?error, key, "cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(?error, key, "cache record unreadable");
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_vec(value)
            .map_err(CacheError::from)
            .and_then(|bytes| self.backend.set(key, bytes));
        if let Err(error) = result {
            tracing::warn!(?error, key, "cache write failed");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(error) = self.backend.delete(key) {
            tracing::warn!(?error, key, "cache delete failed");
        }
    }

    /// Saves mailbox metadata, first merging in what another session
    /// stored for the same UIDVALIDITY.
    pub fn save_meta(&self, key: &MailboxKey, meta: &mut MailboxMeta) {
        self.merge_stored(key, meta);
        self.write(&key.meta_key(), meta);
    }

    fn merge_stored(&self, key: &MailboxKey, meta: &mut MailboxMeta) {
        let Some(stored) = self.read::<MailboxMeta>(&key.meta_key()) else {
            return;
        };
        if stored.uid_validity != meta.uid_validity {
            return;
        }
        meta.uids.union_with(&stored.uids);
        if stored.search_fingerprint == meta.search_fingerprint {
            for (command, result) in stored.searches {
                meta.searches.entry(command).or_insert(result);
            }
        }
    }

    /// Loads the stored metadata without validating it.
    #[must_use]
    pub fn load_meta(&self, key: &MailboxKey) -> Option<MailboxMeta> {
        self.read(&key.meta_key())
    }

    /// Loads the metadata for `key` and checks it against the server's
    /// UIDVALIDITY. On mismatch every record of the mailbox is dropped and
    /// fresh metadata is returned.
    pub fn sync_validity(&self, key: &MailboxKey, uid_validity: u32) -> MailboxMeta {
        match self.read::<MailboxMeta>(&key.meta_key()) {
            Some(meta) if meta.uid_validity == uid_validity => {
                tracing::debug!(mailbox = %key.mailbox, records = meta.uids.len(), "cache metadata loaded");
                meta
            }
            Some(old) => {
                tracing::info!(
                    mailbox = %key.mailbox,
                    old = old.uid_validity,
                    new = uid_validity,
                    "UIDVALIDITY changed, mailbox cache invalidated"
                );
                self.reset(key, &old, uid_validity)
            }
            None => {
                let mut meta = MailboxMeta::fresh(uid_validity);
                self.save_meta(key, &mut meta);
                meta
            }
        }
    }

    /// Drops every record described by `old` and starts over at `uid_validity`.
    pub fn reset(&self, key: &MailboxKey, old: &MailboxMeta, uid_validity: u32) -> MailboxMeta {
        for uid in old.uids.iter() {
            self.delete(&key.message_key(old.uid_validity, uid));
        }
        let mut meta = MailboxMeta::fresh(uid_validity);
        self.save_meta(key, &mut meta);
        meta
    }

    fn load_record(&self, key: &MailboxKey, meta: &MailboxMeta, uid: u32) -> Option<Record> {
        self.read(&key.message_key(meta.uid_validity, uid))
    }

    /// Splits a UID FETCH of `attrs` for `uids` into cached and missing parts.
    ///
    /// `mod_seq` is the mailbox HIGHESTMODSEQ when CONDSTORE is active;
    /// cached flags are only trusted when it equals the metadata's value.
    pub fn plan(
        &self,
        key: &MailboxKey,
        meta: &MailboxMeta,
        uids: &IdSet,
        attrs: &[FetchAttribute],
        mod_seq: Option<u64>,
    ) -> FetchPlan {
        let flags_current = mod_seq.is_some() && meta.highest_mod_seq == mod_seq;
        let mut plan = FetchPlan::default();
        let (mut hits, mut misses) = (0usize, 0usize);

        for uid in uids.iter() {
            let record = self.load_record(key, meta, uid);
            let missing: Vec<FetchAttribute> = attrs
                .iter()
                .filter(|attr| {
                    record
                        .as_ref()
                        .is_none_or(|r| !has_attribute(r, attr, flags_current))
                })
                .cloned()
                .collect();

            if let Some(record) = record {
                plan.cached.insert(uid, record.data);
            }
            if missing.is_empty() {
                hits += 1;
                continue;
            }
            misses += 1;
            match plan.missing.iter_mut().find(|(a, _)| *a == missing) {
                Some((_, set)) => set.insert(uid),
                None => plan.missing.push((missing, std::iter::once(uid).collect())),
            }
        }

        tracing::debug!(mailbox = %key.mailbox, hits, misses, "cache lookup");
        plan
    }

    /// Stores fetched data for each UID, merging with existing records.
    pub fn store(
        &self,
        key: &MailboxKey,
        meta: &mut MailboxMeta,
        messages: &[(u32, MessageData)],
        mod_seq: Option<u64>,
    ) {
        if messages.is_empty() {
            return;
        }
        for (uid, data) in messages {
            let mut record = self.load_record(key, meta, *uid).unwrap_or_default();
            let mut incoming = data.clone();
            // Partial body data depends on the requested range.
            incoming.sections.retain(|section, _| !section.contains('<'));
            incoming.seq = None;
            incoming.extensions.clear();
            if incoming.flags.is_some() {
                record.flags_mod_seq = mod_seq;
            }
            record.data.merge(incoming);
            self.write(&key.message_key(meta.uid_validity, *uid), &record);
            meta.uids.insert(*uid);
        }
        self.save_meta(key, meta);
    }

    /// Deletes records for expunged UIDs.
    ///
    /// Only indexed UIDs are visited, so a wide VANISHED range costs no
    /// more than the records it actually hits.
    pub fn remove(&self, key: &MailboxKey, meta: &mut MailboxMeta, uids: &IdSet) {
        self.merge_stored(key, meta);
        let gone = meta.uids.intersection(uids);
        if gone.is_empty() {
            return;
        }
        for uid in gone.iter() {
            self.delete(&key.message_key(meta.uid_validity, uid));
        }
        meta.uids = meta.uids.difference(&gone);
        tracing::debug!(mailbox = %key.mailbox, removed = gone.len(), "cache records removed");
        self.write(&key.meta_key(), meta);
    }

    /// Records that cached flags are current through `mod_seq`.
    pub fn set_highest_mod_seq(&self, key: &MailboxKey, meta: &mut MailboxMeta, mod_seq: Option<u64>) {
        if meta.highest_mod_seq != mod_seq {
            meta.highest_mod_seq = mod_seq;
            self.save_meta(key, meta);
        }
    }

    /// Returns a stored search result if the mailbox is unchanged.
    #[must_use]
    pub fn search_get<T: DeserializeOwned>(
        &self,
        meta: &MailboxMeta,
        fingerprint: &str,
        command: &str,
    ) -> Option<T> {
        if meta.search_fingerprint.as_deref() != Some(fingerprint) {
            return None;
        }
        let value = meta.searches.get(command)?;
        match serde_json::from_value(value.clone()) {
            Ok(result) => {
                tracing::debug!(command, "search cache hit");
                Some(result)
            }
            Err(error) => {
                tracing::warn!(?error, command, "cached search result unreadable");
                None
            }
        }
    }

    /// Stores a search result. A new fingerprint drops all older results.
    pub fn search_put<T: Serialize>(
        &self,
        key: &MailboxKey,
        meta: &mut MailboxMeta,
        fingerprint: &str,
        command: &str,
        result: &T,
    ) {
        if meta.search_fingerprint.as_deref() != Some(fingerprint) {
            meta.searches.clear();
            meta.search_fingerprint = Some(fingerprint.to_string());
        }
        match serde_json::to_value(result) {
            Ok(value) => {
                meta.searches.insert(command.to_string(), value);
                self.save_meta(key, meta);
            }
            Err(error) => tracing::warn!(?error, command, "search result not cacheable"),
        }
    }
}

fn has_attribute(record: &Record, attr: &FetchAttribute, flags_current: bool) -> bool {
    let data = &record.data;
    match attr {
        FetchAttribute::Uid => true,
        FetchAttribute::Flags => {
            flags_current && data.flags.is_some() && record.flags_mod_seq.is_some()
        }
        FetchAttribute::ModSeq => {
            flags_current && data.mod_seq.is_some() && record.flags_mod_seq.is_some()
        }
        FetchAttribute::Envelope => data.envelope.is_some(),
        FetchAttribute::InternalDate => data.internal_date.is_some(),
        FetchAttribute::Rfc822Size => data.size.is_some(),
        FetchAttribute::BodyStructure => data.body_structure.is_some(),
        other => other
            .section_key()
            .is_some_and(|section| data.sections.contains_key(&section)),
    }
}

/// Groups fetched messages by UID, dropping those without one.
#[must_use]
pub fn by_uid(messages: Vec<MessageData>) -> HashMap<u32, MessageData> {
    let mut out: HashMap<u32, MessageData> = HashMap::with_capacity(messages.len());
    for message in messages {
        let Some(uid) = message.uid else { continue };
        match out.get_mut(&uid.get()) {
            Some(existing) => existing.merge(message),
            None => {
                out.insert(uid.get(), message);
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::parser::Envelope;
    use crate::types::{Flag, Flags, Uid};

    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }

        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
    }

    fn key() -> MailboxKey {
        MailboxKey {
            host: "imap.example.com".into(),
            port: 993,
            username: "alice".into(),
            mailbox: "INBOX".into(),
        }
    }

    fn message(uid: u32, seen: bool) -> (u32, MessageData) {
        let mut flags = Flags::new();
        if seen {
            flags.insert(Flag::Seen);
        }
        (
            uid,
            MessageData {
                uid: Uid::new(uid),
                flags: Some(flags),
                envelope: Some(Envelope {
                    subject: Some(format!("message {uid}")),
                    ..Envelope::default()
                }),
                ..MessageData::default()
            },
        )
    }

    fn set(s: &str) -> IdSet {
        IdSet::parse(s).unwrap()
    }

    #[test]
    fn test_plan_splits_immutable_and_flags() {
        let cache = MessageCache::new(Arc::new(MemoryBackend::new()));
        let mut meta = cache.sync_validity(&key(), 42);
        cache.store(&key(), &mut meta, &[message(1, true), message(2, false)], None);

        let attrs = [FetchAttribute::Flags, FetchAttribute::Envelope];
        let plan = cache.plan(&key(), &meta, &set("1:3"), &attrs, None);
        assert_eq!(plan.cached.len(), 2);
        assert_eq!(
            plan.missing,
            vec![
                (vec![FetchAttribute::Flags], set("1:2")),
                (attrs.to_vec(), set("3")),
            ]
        );
    }

    #[test]
    fn test_flags_trusted_with_matching_modseq() {
        let cache = MessageCache::new(Arc::new(MemoryBackend::new()));
        let mut meta = cache.sync_validity(&key(), 42);
        cache.set_highest_mod_seq(&key(), &mut meta, Some(100));
        cache.store(&key(), &mut meta, &[message(1, true)], Some(100));

        let attrs = [FetchAttribute::Flags, FetchAttribute::Envelope];
        assert!(cache.plan(&key(), &meta, &set("1"), &attrs, Some(100)).is_complete());
        assert!(!cache.plan(&key(), &meta, &set("1"), &attrs, Some(101)).is_complete());
        assert!(!cache.plan(&key(), &meta, &set("1"), &attrs, None).is_complete());
    }

    #[test]
    fn test_uidvalidity_change_drops_everything() {
        let backend = MemoryBackend::new();
        let cache = MessageCache::new(Arc::new(backend.clone()));
        let mut meta = cache.sync_validity(&key(), 100);
        cache.store(&key(), &mut meta, &[message(1, true), message(2, true)], None);
        assert_eq!(backend.len(), 3);

        let meta = cache.sync_validity(&key(), 101);
        assert!(meta.uids.is_empty());
        assert_eq!(backend.len(), 1);
        let plan = cache.plan(&key(), &meta, &set("1:2"), &[FetchAttribute::Envelope], None);
        assert!(plan.cached.is_empty());
        assert_eq!(plan.missing.len(), 1);
    }

    #[test]
    fn test_partial_sections_not_cached() {
        let cache = MessageCache::new(Arc::new(MemoryBackend::new()));
        let mut meta = cache.sync_validity(&key(), 1);
        let (uid, mut data) = message(5, false);
        data.sections.insert("TEXT<0>".into(), b"abc".to_vec());
        data.sections.insert("HEADER".into(), b"Subject: x\r\n".to_vec());
        cache.store(&key(), &mut meta, &[(uid, data)], None);

        let header = FetchAttribute::peek("header");
        let partial = FetchAttribute::Body {
            section: Some("TEXT".into()),
            peek: true,
            partial: Some((0, 3)),
        };
        assert!(cache.plan(&key(), &meta, &set("5"), &[header], None).is_complete());
        assert!(!cache.plan(&key(), &meta, &set("5"), &[partial], None).is_complete());
    }

    #[test]
    fn test_remove_and_search_cache() {
        let cache = MessageCache::new(Arc::new(MemoryBackend::new()));
        let mut meta = cache.sync_validity(&key(), 7);
        cache.store(&key(), &mut meta, &[message(1, true), message(2, true)], None);
        cache.remove(&key(), &mut meta, &set("2:9"));
        assert_eq!(meta.uids, set("1"));

        cache.search_put(&key(), &mut meta, "fp1", "SEARCH ALL", &vec![1u32]);
        assert_eq!(cache.search_get::<Vec<u32>>(&meta, "fp1", "SEARCH ALL"), Some(vec![1]));
        assert_eq!(cache.search_get::<Vec<u32>>(&meta, "fp2", "SEARCH ALL"), None);
        cache.search_put(&key(), &mut meta, "fp2", "SEARCH SEEN", &vec![1u32]);
        assert!(meta.searches.get("SEARCH ALL").is_none());
    }

    #[test]
    fn test_two_sessions_share_one_mailbox() {
        let backend = MemoryBackend::new();
        let first = MessageCache::new(Arc::new(backend.clone()));
        let second = MessageCache::new(Arc::new(backend.clone()));
        let mut meta_a = first.sync_validity(&key(), 5);
        let mut meta_b = second.sync_validity(&key(), 5);

        first.store(&key(), &mut meta_a, &[message(1, true)], None);
        second.store(&key(), &mut meta_b, &[message(2, true)], None);
        assert_eq!(meta_b.uids, set("1:2"));
        assert_eq!(first.load_meta(&key()).unwrap().uids, set("1:2"));

        // A stale index still finds records written by the other session.
        let plan = first.plan(&key(), &meta_a, &set("1:2"), &[FetchAttribute::Envelope], None);
        assert!(plan.is_complete());

        first.remove(&key(), &mut meta_a, &set("2"));
        assert_eq!(first.load_meta(&key()).unwrap().uids, set("1"));

        first.sync_validity(&key(), 6);
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_remove_full_range_visits_only_indexed() {
        let cache = MessageCache::new(Arc::new(MemoryBackend::new()));
        let mut meta = cache.sync_validity(&key(), 3);
        cache.store(&key(), &mut meta, &[message(4, true), message(9, false)], None);
        cache.remove(&key(), &mut meta, &set("1:4294967295"));
        assert!(meta.uids.is_empty());
        assert!(cache.load_meta(&key()).unwrap().uids.is_empty());
    }

    #[test]
    fn test_failing_backend_is_a_miss() {
        let cache = MessageCache::new(Arc::new(FailingBackend));
        let mut meta = cache.sync_validity(&key(), 1);
        cache.store(&key(), &mut meta, &[message(1, true)], None);
        let plan = cache.plan(&key(), &meta, &set("1"), &[FetchAttribute::Envelope], None);
        assert!(plan.cached.is_empty());
        assert_eq!(plan.missing, vec![(vec![FetchAttribute::Envelope], set("1"))]);
    }

    #[test]
    fn test_by_uid_merges() {
        let (_, a) = message(3, true);
        let mut b = MessageData {
            uid: Uid::new(3),
            size: Some(10),
            ..MessageData::default()
        };
        b.flags = None;
        let merged = by_uid(vec![a, b, MessageData::default()]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[&3].size, Some(10));
        assert!(merged[&3].envelope.is_some());
    }
}
