//! Selected-state commands: FETCH through the cache, STORE, COPY/MOVE,
//! EXPUNGE, and SEARCH/SORT/THREAD with client-side fallbacks.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Session;
use crate::cache::{self, FetchPlan};
use crate::command::{
    Command, FetchAttribute, FetchItems, SearchCriteria, SearchReturn, SortCriterion, StoreAction,
    ThreadAlgorithm,
};
use crate::connection::stream::Transport;
use crate::extension::Extension;
use crate::parser::{MessageData, ParseContext, UntaggedResponse};
use crate::sort::{self, ThreadInput, ThreadNode};
use crate::types::{
    IdSet, Mailbox, ResponseCode, SelectedMailbox, SeqNum, SequenceSet, Tag, Uid, UidValidity,
};
use crate::{Error, Result};

/// SEARCH result. ESEARCH fills `min`, `max` and `count` directly; for
/// plain SEARCH they are computed from `ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matching sequence numbers or UIDs.
    pub ids: Vec<u32>,
    /// Highest mod-sequence of the matches (CONDSTORE).
    pub highest_mod_seq: Option<u64>,
    /// Lowest match.
    pub min: Option<u32>,
    /// Highest match.
    pub max: Option<u32>,
    /// Number of matches.
    pub count: Option<u32>,
}

/// STORE result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreResult {
    /// Updated message data sent back by the server.
    pub messages: Vec<MessageData>,
    /// Messages left alone because of UNCHANGEDSINCE.
    pub modified: IdSet,
}

/// COPYUID data (UIDPLUS).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyResult {
    /// UIDVALIDITY of the destination.
    pub uid_validity: Option<UidValidity>,
    /// Source UIDs.
    pub source: IdSet,
    /// Destination UIDs, in the same order.
    pub destination: IdSet,
}

/// Messages removed by EXPUNGE or UID EXPUNGE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpungeResult {
    /// Sequence numbers from EXPUNGE responses, in arrival order.
    pub seqs: Vec<SeqNum>,
    /// UIDs from VANISHED responses (QRESYNC).
    pub uids: IdSet,
}

/// Cache key of a search-like command.
fn command_text(command: &Command) -> String {
    command.redacted(&Tag::new("*"))
}

impl<S: Transport> Session<S> {
    /// Sends CHECK.
    pub async fn check(&mut self) -> Result<()> {
        self.run(&Command::Check).await?;
        Ok(())
    }

    /// Fetches by sequence number. Bypasses the cache.
    pub async fn fetch(
        &mut self,
        sequence: &SequenceSet,
        items: impl Into<FetchItems>,
    ) -> Result<Vec<MessageData>> {
        let command = Command::Fetch {
            sequence: sequence.clone(),
            items: items.into(),
            uid: false,
            changed_since: None,
            vanished: false,
        };
        Ok(self.run(&command).await?.fetches())
    }

    /// Fetches by UID, answering from the cache where possible.
    ///
    /// Only attributes the cache lacks are requested, grouped by UID sets
    /// that miss the same attributes. Results are ordered by UID.
    pub async fn uid_fetch(
        &mut self,
        uids: &IdSet,
        attrs: &[FetchAttribute],
    ) -> Result<Vec<MessageData>> {
        self.check_selected("UID FETCH")?;
        if uids.is_empty() || attrs.is_empty() {
            return Ok(Vec::new());
        }
        let mod_seq = self.current_mod_seq();
        let plan = match (self.cache.as_ref(), self.scope.as_ref()) {
            (Some(cache), Some(scope)) => cache.plan(&scope.key, &scope.meta, uids, attrs, mod_seq),
            _ => FetchPlan {
                cached: BTreeMap::new(),
                missing: vec![(attrs.to_vec(), uids.clone())],
            },
        };

        let mut results = plan.cached;
        for (missing, set) in plan.missing {
            let Some(sequence) = set.to_sequence_set() else {
                continue;
            };
            let command = Command::Fetch {
                sequence,
                items: FetchItems::Items(missing),
                uid: true,
                changed_since: None,
                vanished: false,
            };
            let ctx = self.run(&command).await?;
            let fetched: Vec<(u32, MessageData)> = cache::by_uid(ctx.fetches())
                .into_iter()
                .filter(|(uid, _)| set.contains(*uid))
                .collect();
            self.with_scope(|cache, key, meta| cache.store(key, meta, &fetched, mod_seq));

            let returned: IdSet = fetched.iter().map(|(uid, _)| *uid).collect();
            for uid in set.difference(&returned).iter() {
                // Gone on the server.
                results.remove(&uid);
            }
            for (uid, data) in fetched {
                results.entry(uid).or_default().merge(data);
            }
        }

        Ok(results
            .into_iter()
            .filter(|(uid, _)| uids.contains(*uid))
            .map(|(uid, mut data)| {
                data.uid = Uid::new(uid);
                data
            })
            .collect())
    }

    /// Changes flags. With `unchanged_since`, messages modified after that
    /// mod-sequence are left alone and reported in [`StoreResult::modified`].
    pub async fn store(
        &mut self,
        sequence: &SequenceSet,
        action: StoreAction,
        uid: bool,
        unchanged_since: Option<u64>,
    ) -> Result<StoreResult> {
        let command = Command::Store {
            sequence: sequence.clone(),
            action,
            uid,
            silent: false,
            unchanged_since,
        };
        let ctx = self.run(&command).await?;
        let modified = match ctx.completion().and_then(|c| c.code.clone()) {
            Some(ResponseCode::Modified(set)) => set,
            _ => IdSet::new(),
        };
        if !modified.is_empty() {
            tracing::info!(%modified, "conditional STORE skipped modified messages");
        }
        Ok(StoreResult {
            messages: ctx.fetches(),
            modified,
        })
    }

    /// Copies messages to `mailbox`.
    pub async fn copy(
        &mut self,
        sequence: &SequenceSet,
        mailbox: impl Into<Mailbox>,
        uid: bool,
    ) -> Result<CopyResult> {
        let command = Command::Copy {
            sequence: sequence.clone(),
            mailbox: mailbox.into(),
            uid,
        };
        let ctx = self.run(&command).await?;
        Ok(copy_result(&ctx))
    }

    /// Moves messages to `mailbox` (RFC 6851).
    pub async fn move_messages(
        &mut self,
        sequence: &SequenceSet,
        mailbox: impl Into<Mailbox>,
        uid: bool,
    ) -> Result<CopyResult> {
        let command = Command::Move {
            sequence: sequence.clone(),
            mailbox: mailbox.into(),
            uid,
        };
        let ctx = self.run(&command).await?;
        Ok(copy_result(&ctx))
    }

    /// Permanently removes messages marked `\Deleted`.
    pub async fn expunge(&mut self) -> Result<ExpungeResult> {
        let ctx = self.run(&Command::Expunge).await?;
        Ok(expunge_result(&ctx))
    }

    /// Removes only the given `\Deleted` messages (UIDPLUS).
    pub async fn uid_expunge(&mut self, uids: &IdSet) -> Result<ExpungeResult> {
        let Some(sequence) = uids.to_sequence_set() else {
            return Ok(ExpungeResult::default());
        };
        let ctx = self.run(&Command::UidExpunge { uids: sequence }).await?;
        Ok(expunge_result(&ctx))
    }

    /// Searches the selected mailbox.
    ///
    /// Uses ESEARCH when available. Non-ASCII criteria are sent with the
    /// configured charset; a `[BADCHARSET]` rejection is retried once.
    pub async fn search(&mut self, criteria: &SearchCriteria, uid: bool) -> Result<SearchResult> {
        self.check_selected("SEARCH")?;
        self.ensure_capabilities().await?;
        let ret = self.supports(Extension::ESearch).then(SearchReturn::everything);
        let build = |charset: Option<String>| Command::Search {
            criteria: criteria.clone(),
            charset,
            uid,
            ret,
        };
        let charset = self.charset_for(criteria);
        let command = build(charset.clone());
        if let Some(hit) = self.cached_result::<SearchResult>(&command) {
            tracing::debug!(matches = hit.ids.len(), "search answered from cache");
            return Ok(hit);
        }

        let ctx = self.run_with_charset(criteria, charset, build).await?;
        let mut result = SearchResult::default();
        let mut extended = false;
        for response in ctx.into_responses() {
            match response {
                UntaggedResponse::Search { ids, mod_seq } => {
                    result.ids.extend(ids);
                    result.highest_mod_seq = mod_seq.or(result.highest_mod_seq);
                }
                UntaggedResponse::ESearch(esearch) => {
                    extended = true;
                    if let Some(all) = esearch.all {
                        result.ids.extend(all.iter());
                    }
                    result.min = esearch.min;
                    result.max = esearch.max;
                    result.count = esearch.count;
                    result.highest_mod_seq = esearch.mod_seq.or(result.highest_mod_seq);
                }
                _ => {}
            }
        }
        if !extended {
            result.min = result.ids.iter().copied().min();
            result.max = result.ids.iter().copied().max();
            result.count = u32::try_from(result.ids.len()).ok();
        } else if result.count.is_none() {
            result.count = Some(0);
        }

        self.remember_result(&command, &result);
        Ok(result)
    }

    /// Sorts the messages matching `criteria`.
    ///
    /// Without SORT (or SORT=DISPLAY for display keys) the sort runs
    /// client-side when enabled in the configuration; otherwise this fails
    /// with [`Error::CapabilityMissing`] before anything is sent.
    pub async fn sort(
        &mut self,
        keys: &[SortCriterion],
        criteria: &SearchCriteria,
        uid: bool,
    ) -> Result<Vec<u32>> {
        self.check_selected("SORT")?;
        if keys.is_empty() {
            return Err(Error::Protocol("SORT needs at least one key".to_string()));
        }
        self.ensure_capabilities().await?;
        let display = keys.iter().any(|k| k.key.is_display());
        let missing = if !self.supports(Extension::Sort) {
            Some(Extension::Sort)
        } else if display && !self.supports(Extension::SortDisplay) {
            Some(Extension::SortDisplay)
        } else {
            None
        };
        if let Some(extension) = missing
            && !self.config.client_sort
        {
            return Err(Error::CapabilityMissing(extension.capability().to_string()));
        }

        let build = |charset: Option<String>| Command::Sort {
            keys: keys.to_vec(),
            charset: charset.unwrap_or_else(|| "US-ASCII".to_string()),
            criteria: criteria.clone(),
            uid,
        };
        let charset = self.charset_for(criteria);
        let command = build(charset.clone());
        if let Some(hit) = self.cached_result::<Vec<u32>>(&command) {
            tracing::debug!(matches = hit.len(), "sort answered from cache");
            return Ok(hit);
        }

        let ids = if missing.is_none() {
            let ctx = self
                .run_with_charset(criteria, Some(charset.unwrap_or_else(|| "US-ASCII".into())), build)
                .await?;
            ctx.into_responses()
                .into_iter()
                .filter_map(|r| match r {
                    UntaggedResponse::Sort { ids, .. } => Some(ids),
                    _ => None,
                })
                .flatten()
                .collect()
        } else {
            tracing::debug!(?missing, "sorting client-side");
            let messages = self
                .messages_for(criteria, uid, &sort::fetch_attributes(keys))
                .await?;
            sort::sort_messages(&messages, keys, self.collator.as_ref())
        };

        self.remember_result(&command, &ids);
        Ok(ids)
    }

    /// Threads the messages matching `criteria`.
    ///
    /// ORDEREDSUBJECT and REFERENCES run client-side when the server lacks
    /// them and client-side sorting is enabled.
    pub async fn thread(
        &mut self,
        algorithm: &ThreadAlgorithm,
        criteria: &SearchCriteria,
        uid: bool,
    ) -> Result<Vec<ThreadNode>> {
        self.check_selected("THREAD")?;
        self.ensure_capabilities().await?;
        let server = match Extension::for_thread(algorithm) {
            Some(extension) => self.supports(extension),
            None => self
                .capabilities
                .thread_algorithms()
                .iter()
                .any(|a| a.eq_ignore_ascii_case(algorithm.as_str())),
        };
        let emulated = !matches!(algorithm, ThreadAlgorithm::Other(_));
        if !server && !(self.config.client_sort && emulated) {
            return Err(Error::CapabilityMissing(format!("THREAD={}", algorithm.as_str())));
        }

        let build = |charset: Option<String>| Command::Thread {
            algorithm: algorithm.clone(),
            charset: charset.unwrap_or_else(|| "US-ASCII".to_string()),
            criteria: criteria.clone(),
            uid,
        };
        let charset = self.charset_for(criteria);
        let command = build(charset.clone());
        if let Some(hit) = self.cached_result::<Vec<ThreadNode>>(&command) {
            return Ok(hit);
        }

        let threads = if server {
            let ctx = self
                .run_with_charset(criteria, Some(charset.unwrap_or_else(|| "US-ASCII".into())), build)
                .await?;
            ctx.into_responses()
                .into_iter()
                .filter_map(|r| match r {
                    UntaggedResponse::Thread(threads) => Some(threads),
                    _ => None,
                })
                .flatten()
                .collect()
        } else {
            tracing::debug!(algorithm = algorithm.as_str(), "threading client-side");
            let messages = self
                .messages_for(criteria, uid, &sort::thread_fetch_attributes(algorithm))
                .await?;
            let inputs: Vec<ThreadInput> = messages
                .iter()
                .map(|(id, message)| ThreadInput::from_message(*id, message))
                .collect();
            sort::thread_messages(algorithm, &inputs).ok_or_else(|| {
                Error::CapabilityMissing(format!("THREAD={}", algorithm.as_str()))
            })?
        };

        self.remember_result(&command, &threads);
        Ok(threads)
    }

    /// Searches, then fetches `attrs` for every match.
    async fn messages_for(
        &mut self,
        criteria: &SearchCriteria,
        uid: bool,
        attrs: &[FetchAttribute],
    ) -> Result<Vec<(u32, MessageData)>> {
        let found = self.search(criteria, uid).await?;
        let ids: IdSet = found.ids.iter().copied().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let messages = if uid {
            self.uid_fetch(&ids, attrs).await?
        } else {
            let Some(sequence) = ids.to_sequence_set() else {
                return Ok(Vec::new());
            };
            self.fetch(&sequence, FetchItems::Items(attrs.to_vec()))
                .await?
        };
        Ok(messages
            .into_iter()
            .filter_map(|m| {
                let id = if uid {
                    m.uid.map(Uid::get)
                } else {
                    m.seq.map(SeqNum::get)
                }?;
                ids.contains(id).then_some((id, m))
            })
            .collect())
    }

    async fn ensure_capabilities(&mut self) -> Result<()> {
        if !self.capabilities_known {
            self.refresh_capabilities().await?;
        }
        Ok(())
    }

    /// Charset for the first attempt: none for ASCII criteria, otherwise
    /// the configured one if it can encode them, else UTF-8.
    fn charset_for(&self, criteria: &SearchCriteria) -> Option<String> {
        if !criteria.has_non_ascii() {
            return None;
        }
        let preferred = &self.config.search_charset;
        if criteria.encodable_in(preferred) {
            Some(preferred.clone())
        } else {
            Some("UTF-8".to_string())
        }
    }

    /// Runs a charset-carrying command, retrying once on `[BADCHARSET]`
    /// (or a bare NO after a non-US-ASCII charset).
    async fn run_with_charset(
        &mut self,
        criteria: &SearchCriteria,
        first: Option<String>,
        build: impl Fn(Option<String>) -> Command,
    ) -> Result<ParseContext> {
        let error = match self.run(&build(first.clone())).await {
            Err(error @ Error::No { .. }) => error,
            other => return other,
        };
        let tried = first.unwrap_or_else(|| "US-ASCII".to_string());
        let advertised = match error.response_code() {
            Some(ResponseCode::BadCharset(list)) => Some(list.clone()),
            _ => None,
        };
        let advertised = match advertised {
            Some(list) => list,
            None if !tried.eq_ignore_ascii_case("US-ASCII") => Vec::new(),
            None => return Err(error),
        };
        let candidates = if advertised.is_empty() {
            vec!["UTF-8".to_string(), "US-ASCII".to_string()]
        } else {
            advertised.clone()
        };
        let Some(next) = candidates
            .into_iter()
            .find(|c| !c.eq_ignore_ascii_case(&tried) && criteria.encodable_in(c))
        else {
            return Err(Error::BadCharset {
                charset: tried,
                supported: advertised,
            });
        };

        tracing::info!(rejected = %tried, retry = %next, "charset rejected, retrying");
        match self.run(&build(Some(next.clone()))).await {
            Err(Error::No { code, .. }) => Err(Error::BadCharset {
                charset: next,
                supported: match code {
                    Some(ResponseCode::BadCharset(list)) => list,
                    _ => advertised,
                },
            }),
            other => other,
        }
    }

    fn cached_result<T: DeserializeOwned>(&self, command: &Command) -> Option<T> {
        let fingerprint = self.selected()?.fingerprint()?;
        let cache = self.cache.as_ref()?;
        let scope = self.scope.as_ref()?;
        cache.search_get(&scope.meta, &fingerprint, &command_text(command))
    }

    fn remember_result<T: Serialize>(&mut self, command: &Command, result: &T) {
        let Some(fingerprint) = self.selected().and_then(SelectedMailbox::fingerprint) else {
            return;
        };
        let text = command_text(command);
        self.with_scope(|cache, key, meta| cache.search_put(key, meta, &fingerprint, &text, result));
    }
}

fn copy_result(ctx: &ParseContext) -> CopyResult {
    let untagged = ctx.responses().iter().filter_map(|r| match r {
        UntaggedResponse::Ok { code, .. } => code.as_ref(),
        _ => None,
    });
    let tagged = ctx.completion().and_then(|c| c.code.as_ref());
    untagged
        .chain(tagged)
        .find_map(|code| match code {
            ResponseCode::CopyUid {
                uid_validity,
                source,
                destination,
            } => Some(CopyResult {
                uid_validity: Some(*uid_validity),
                source: source.clone(),
                destination: destination.clone(),
            }),
            _ => None,
        })
        .unwrap_or_default()
}

fn expunge_result(ctx: &ParseContext) -> ExpungeResult {
    let mut result = ExpungeResult::default();
    for response in ctx.responses() {
        match response {
            UntaggedResponse::Expunge(seq) => result.seqs.push(*seq),
            UntaggedResponse::Vanished { uids, .. } => result.uids.union_with(uids),
            _ => {}
        }
    }
    result
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
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;
    use crate::command::SortKey;
    use crate::connection::config::Config;
    use crate::types::Flag;

    fn config() -> Config {
        Config::builder("imap.example.com")
            .io_timeout(Duration::from_secs(5))
            .build()
    }

    const GREETING: &[u8] = b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n";
    const SELECT: &[u8] = b"A0000 SELECT INBOX\r\n";
    const SELECTED: &[u8] = b"* 3 EXISTS\r\n* OK [UIDVALIDITY 9] ok\r\nA0000 OK [READ-WRITE] done\r\n";

    #[tokio::test]
    async fn test_plain_search_fills_summary() {
        let mock = Builder::new()
            .read(GREETING)
            .write(SELECT)
            .read(SELECTED)
            .write(b"A0001 UID SEARCH UNSEEN\r\n")
            .read(b"* SEARCH 7 3 12\r\nA0001 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.select("INBOX").await.unwrap();
        let result = session.search(&SearchCriteria::Unseen, true).await.unwrap();
        assert_eq!(result.ids, vec![7, 3, 12]);
        assert_eq!(result.min, Some(3));
        assert_eq!(result.max, Some(12));
        assert_eq!(result.count, Some(3));
    }

    #[tokio::test]
    async fn test_store_reports_modified() {
        let mock = Builder::new()
            .read(GREETING)
            .write(SELECT)
            .read(SELECTED)
            .write(b"A0001 STORE 1:2 +FLAGS (\\Seen)\r\n")
            .read(b"* 1 FETCH (FLAGS (\\Seen))\r\nA0001 OK [MODIFIED 2] partial\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.select("INBOX").await.unwrap();
        let result = session
            .store(
                &SequenceSet::range(1, 2).unwrap(),
                StoreAction::AddFlags(vec![Flag::Seen]),
                false,
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.messages.len(), 1);
        assert!(result.modified.contains(2));
    }

    #[tokio::test]
    async fn test_expunge_updates_exists() {
        let mock = Builder::new()
            .read(GREETING)
            .write(SELECT)
            .read(SELECTED)
            .write(b"A0001 EXPUNGE\r\n")
            .read(b"* 3 EXPUNGE\r\n* 1 EXPUNGE\r\nA0001 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.select("INBOX").await.unwrap();
        let result = session.expunge().await.unwrap();
        assert_eq!(result.seqs.len(), 2);
        assert_eq!(session.selected().unwrap().exists, 1);
    }

    #[tokio::test]
    async fn test_copy_returns_copyuid() {
        let mock = Builder::new()
            .read(GREETING)
            .write(SELECT)
            .read(SELECTED)
            .write(b"A0001 UID COPY 4:5 Archive\r\n")
            .read(b"A0001 OK [COPYUID 38505 4:5 100:101] done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.select("INBOX").await.unwrap();
        let result = session
            .copy(&SequenceSet::range(4, 5).unwrap(), "Archive", true)
            .await
            .unwrap();
        assert_eq!(result.uid_validity.map(UidValidity::get), Some(38505));
        assert_eq!(result.destination.iter().collect::<Vec<_>>(), vec![100, 101]);
    }

    #[tokio::test]
    async fn test_sort_without_extension_and_emulation_writes_nothing() {
        let mock = Builder::new().read(GREETING).write(SELECT).read(SELECTED).build();
        let config = Config::builder("imap.example.com").client_sort(false).build();
        let mut session = Session::from_stream(mock, config).await.unwrap();
        session.select("INBOX").await.unwrap();
        let error = session
            .sort(&[SortCriterion::asc(SortKey::Date)], &SearchCriteria::All, true)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::CapabilityMissing(name) if name == "SORT"));
    }

    #[tokio::test]
    async fn test_badcharset_retry_with_advertised_charset() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 LITERAL+] hi\r\n")
            .write(SELECT)
            .read(SELECTED)
            .write(b"A0001 SEARCH CHARSET ISO-8859-1 SUBJECT {5+}\r\nGr\xfc\xdfe\r\n")
            .read(b"A0001 NO [BADCHARSET (UTF-8)] unsupported charset\r\n")
            .write(b"A0002 SEARCH CHARSET UTF-8 SUBJECT {7+}\r\nGr\xc3\xbc\xc3\x9fe\r\n")
            .read(b"* SEARCH 2\r\nA0002 OK done\r\n")
            .build();
        let config = Config::builder("imap.example.com")
            .search_charset("ISO-8859-1")
            .build();
        let mut session = Session::from_stream(mock, config).await.unwrap();
        session.select("INBOX").await.unwrap();
        let result = session
            .search(&SearchCriteria::Subject("Grüße".into()), false)
            .await
            .unwrap();
        assert_eq!(result.ids, vec![2]);
    }

    #[tokio::test]
    async fn test_badcharset_retry_into_windows_1252() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 LITERAL+] hi\r\n")
            .write(SELECT)
            .read(SELECTED)
            .write(b"A0001 SEARCH CHARSET UTF-8 SUBJECT {5+}\r\ncaf\xc3\xa9\r\n")
            .read(b"A0001 NO [BADCHARSET (WINDOWS-1252 ISO-8859-15)] unsupported charset\r\n")
            .write(b"A0002 SEARCH CHARSET WINDOWS-1252 SUBJECT {4+}\r\ncaf\xe9\r\n")
            .read(b"* SEARCH 4 6\r\nA0002 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.select("INBOX").await.unwrap();
        let result = session
            .search(&SearchCriteria::Subject("café".into()), false)
            .await
            .unwrap();
        assert_eq!(result.ids, vec![4, 6]);
    }

    #[tokio::test]
    async fn test_badcharset_without_alternative() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 LITERAL+] hi\r\n")
            .write(SELECT)
            .read(SELECTED)
            .write(b"A0001 SEARCH CHARSET UTF-8 SUBJECT {7+}\r\nGr\xc3\xbc\xc3\x9fe\r\n")
            .read(b"A0001 NO [BADCHARSET (KOI8-R)] unsupported charset\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.select("INBOX").await.unwrap();
        let error = session
            .search(&SearchCriteria::Subject("Grüße".into()), false)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::BadCharset { charset, supported } if charset == "UTF-8" && supported == ["KOI8-R"]
        ));
    }
}
