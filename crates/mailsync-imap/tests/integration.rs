//! Integration tests for the IMAP session.
//!
//! A scripted mock stream plays the server: each read returns the next
//! server turn, and everything the client writes is recorded.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::similar_names
)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use proptest::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailsync_imap::cache::CacheError;
use mailsync_imap::{
    CacheBackend, Config, Error, FetchAttribute, IdSet, MemoryBackend, MessageCache,
    SearchCriteria, Session, SessionState, SortCriterion, SortKey, ThreadAlgorithm, Transport,
};

/// Mock stream that returns scripted server turns.
struct MockStream {
    /// Server turns, one per read.
    turns: VecDeque<Vec<u8>>,
    /// Captured client output.
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(turns: &[&[u8]]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            turns: turns.iter().map(|t| t.to_vec()).collect(),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let Some(turn) = self.turns.front_mut() else {
            // End of script reads as EOF.
            return Poll::Ready(Ok(()));
        };
        let n = turn.len().min(buf.remaining());
        buf.put_slice(&turn[..n]);
        turn.drain(..n);
        if turn.is_empty() {
            self.turns.pop_front();
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Transport for MockStream {
    async fn start_tls(self, _host: &str) -> mailsync_imap::Result<Self> {
        Ok(self)
    }
}

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&sent.lock().unwrap()).into_owned()
}

fn memory_cache() -> MessageCache {
    MessageCache::new(Arc::new(MemoryBackend::new()))
}

fn envelope(date: &str, subject: &str, message_id: &str) -> String {
    format!("(\"{date}\" \"{subject}\" NIL NIL NIL NIL NIL NIL NIL \"{message_id}\")")
}

/// Backend whose every operation fails.
struct FailingBackend;

impl CacheBackend for FailingBackend {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Backend("disk on fire".to_string()))
    }

    fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), CacheError> {
        Err(CacheError::Backend("disk on fire".to_string()))
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("disk on fire".to_string()))
    }
}

#[tokio::test]
async fn test_end_to_end_fetch_uses_cache_for_envelopes() {
    let mut first_fetch = String::new();
    let mut second_fetch = String::new();
    for n in 1..=5 {
        let env = envelope("Mon, 1 Jan 2024 10:00:00 +0000", &format!("Message {n}"), &format!("<{n}@x>"));
        first_fetch.push_str(&format!("* {n} FETCH (UID {n} FLAGS () ENVELOPE {env})\r\n"));
        second_fetch.push_str(&format!("* {n} FETCH (UID {n} FLAGS (\\Seen))\r\n"));
    }
    first_fetch.push_str("A0002 OK FETCH completed\r\n");
    second_fetch.push_str("A0003 OK FETCH completed\r\n");

    let (stream, sent) = MockStream::new(&[
        b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n",
        b"A0000 OK [CAPABILITY IMAP4rev1] logged in\r\n",
        b"* 5 EXISTS\r\n* 0 RECENT\r\n* OK [UIDVALIDITY 42] UIDs valid\r\n* OK [UIDNEXT 6] next\r\n\
          * FLAGS (\\Seen \\Answered)\r\nA0001 OK [READ-WRITE] SELECT completed\r\n",
        first_fetch.as_bytes(),
        second_fetch.as_bytes(),
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap()
        .with_cache(memory_cache());
    assert_eq!(*session.state(), SessionState::NotAuthenticated);

    session.login("alice", "secret").await.unwrap();
    assert_eq!(*session.state(), SessionState::Authenticated);

    let inbox = session.select("INBOX").await.unwrap();
    assert!(matches!(session.state(), SessionState::Selected(_)));
    assert_eq!(inbox.exists, 5);
    assert_eq!(inbox.uid_validity.map(|v| v.get()), Some(42));

    let uids: IdSet = (1..=5).collect();
    let attrs = [FetchAttribute::Flags, FetchAttribute::Envelope];
    let first = session.uid_fetch(&uids, &attrs).await.unwrap();
    assert_eq!(first.len(), 5);

    // Without CONDSTORE flags are fetched again; envelopes come from the cache.
    let second = session.uid_fetch(&uids, &attrs).await.unwrap();
    assert_eq!(second.len(), 5);
    let subject = second[0].envelope.as_ref().and_then(|e| e.subject.clone());
    assert_eq!(subject.as_deref(), Some("Message 1"));
    assert!(second[4].flags.as_ref().unwrap().is_seen());

    assert_eq!(
        sent_text(&sent),
        "A0000 LOGIN alice secret\r\n\
         A0001 SELECT INBOX\r\n\
         A0002 UID FETCH 1:5 (FLAGS ENVELOPE)\r\n\
         A0003 UID FETCH 1:5 FLAGS\r\n"
    );
}

#[tokio::test]
async fn test_sort_gating_writes_nothing() {
    let (stream, sent) = MockStream::new(&[
        b"* PREAUTH [CAPABILITY IMAP4rev1] welcome back\r\n",
        b"* 3 EXISTS\r\nA0000 OK [READ-WRITE] selected\r\n",
    ]);
    let config = Config::builder("imap.example.com").client_sort(false).build();
    let mut session = Session::from_stream(stream, config).await.unwrap();
    session.select("INBOX").await.unwrap();
    let before = sent.lock().unwrap().len();

    let error = session
        .sort(&[SortCriterion::asc(SortKey::Subject)], &SearchCriteria::All, true)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::CapabilityMissing(_)));
    assert_eq!(sent.lock().unwrap().len(), before);
}

#[tokio::test]
async fn test_state_errors_fail_fast() {
    let (stream, sent) = MockStream::new(&[b"* OK ready\r\n"]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap();

    let error = session.select("INBOX").await.unwrap_err();
    assert!(matches!(error, Error::InvalidState { .. }));
    let error = session.search(&SearchCriteria::All, true).await.unwrap_err();
    assert!(matches!(error, Error::InvalidState { .. }));
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_starttls_requeries_capabilities() {
    let (stream, sent) = MockStream::new(&[
        b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n",
        b"A0000 OK begin TLS negotiation\r\n",
        b"* CAPABILITY IMAP4rev1 AUTH=PLAIN\r\nA0001 OK done\r\n",
        b"A0002 OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] logged in\r\n",
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap();
    assert!(session.capabilities().has("LOGINDISABLED"));

    session.starttls().await.unwrap();
    assert!(!session.capabilities().has("STARTTLS"));
    assert!(!session.capabilities().has("LOGINDISABLED"));

    session.login("alice", "secret").await.unwrap();
    assert_eq!(
        sent_text(&sent),
        "A0000 STARTTLS\r\nA0001 CAPABILITY\r\nA0002 LOGIN alice secret\r\n"
    );
}

#[tokio::test]
async fn test_uidvalidity_change_misses_cache() {
    let cache = memory_cache();
    let env = envelope("Mon, 1 Jan 2024 10:00:00 +0000", "Old", "<1@x>");
    let first_fetch = format!("* 1 FETCH (UID 1 ENVELOPE {env})\r\nA0001 OK done\r\n");
    let (stream, _) = MockStream::new(&[
        b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n",
        b"* 1 EXISTS\r\n* OK [UIDVALIDITY 100] ok\r\nA0000 OK [READ-WRITE] selected\r\n",
        first_fetch.as_bytes(),
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap()
        .with_cache(cache.clone());
    session.select("INBOX").await.unwrap();
    let uids: IdSet = std::iter::once(1).collect();
    session.uid_fetch(&uids, &[FetchAttribute::Envelope]).await.unwrap();

    let env = envelope("Tue, 2 Jan 2024 10:00:00 +0000", "New", "<2@x>");
    let second_fetch = format!("* 1 FETCH (UID 1 ENVELOPE {env})\r\nA0001 OK done\r\n");
    let (stream, sent) = MockStream::new(&[
        b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n",
        b"* 1 EXISTS\r\n* OK [UIDVALIDITY 101] ok\r\nA0000 OK [READ-WRITE] selected\r\n",
        second_fetch.as_bytes(),
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap()
        .with_cache(cache);
    session.select("INBOX").await.unwrap();
    let messages = session.uid_fetch(&uids, &[FetchAttribute::Envelope]).await.unwrap();

    assert!(sent_text(&sent).contains("A0001 UID FETCH 1 ENVELOPE\r\n"));
    let subject = messages[0].envelope.as_ref().and_then(|e| e.subject.clone());
    assert_eq!(subject.as_deref(), Some("New"));
}

#[tokio::test]
async fn test_condstore_changedsince_refreshes_cached_flags() {
    let (stream, sent) = MockStream::new(&[
        b"* OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE] ready\r\n",
        b"A0000 OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE] logged in\r\n",
        b"* ENABLED CONDSTORE\r\nA0001 OK enabled\r\n",
        b"* 2 EXISTS\r\n* OK [UIDVALIDITY 7] ok\r\n* OK [HIGHESTMODSEQ 100] ok\r\n\
          A0002 OK [READ-WRITE] selected\r\n",
        b"* 1 FETCH (UID 1 FLAGS (\\Seen) MODSEQ (90))\r\n\
          * 2 FETCH (UID 2 FLAGS () MODSEQ (95))\r\nA0003 OK done\r\n",
        b"* 2 EXISTS\r\n* OK [UIDVALIDITY 7] ok\r\n* OK [HIGHESTMODSEQ 120] ok\r\n\
          A0004 OK [READ-WRITE] selected\r\n",
        b"* 2 FETCH (UID 2 FLAGS (\\Flagged) MODSEQ (110))\r\nA0005 OK done\r\n",
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap()
        .with_cache(memory_cache());
    session.login("alice", "secret").await.unwrap();
    assert_eq!(session.enabled(), ["CONDSTORE".to_string()]);

    session.select("INBOX").await.unwrap();
    let uids: IdSet = (1..=2).collect();
    session.uid_fetch(&uids, &[FetchAttribute::Flags]).await.unwrap();

    session.select("INBOX").await.unwrap();
    let messages = session.uid_fetch(&uids, &[FetchAttribute::Flags]).await.unwrap();
    let flags: Vec<String> = messages
        .iter()
        .map(|m| m.flags.as_ref().unwrap().iter().map(|f| f.as_str().to_string()).collect())
        .collect();
    assert_eq!(flags, vec!["\\Seen".to_string(), "\\Flagged".to_string()]);

    let text = sent_text(&sent);
    assert!(text.contains("A0005 UID FETCH 1:* (FLAGS) (CHANGEDSINCE 100)\r\n"));
    // The second fetch was answered from the cache.
    assert!(!text.contains("A0006"));
}

#[tokio::test]
async fn test_failing_cache_backend_is_a_miss() {
    let (stream, sent) = MockStream::new(&[
        b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n",
        b"* 1 EXISTS\r\n* OK [UIDVALIDITY 3] ok\r\nA0000 OK [READ-WRITE] selected\r\n",
        b"* 1 FETCH (UID 1 RFC822.SIZE 120)\r\nA0001 OK done\r\n",
        b"* 1 FETCH (UID 1 RFC822.SIZE 120)\r\nA0002 OK done\r\n",
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap()
        .with_cache(MessageCache::new(Arc::new(FailingBackend)));
    session.select("INBOX").await.unwrap();
    let uids: IdSet = std::iter::once(1).collect();
    for _ in 0..2 {
        let messages = session.uid_fetch(&uids, &[FetchAttribute::Rfc822Size]).await.unwrap();
        assert_eq!(messages[0].size, Some(120));
    }
    assert!(sent_text(&sent).contains("A0002 UID FETCH 1 RFC822.SIZE\r\n"));
}

#[tokio::test]
async fn test_client_sort_subject_then_date_is_stable() {
    let dates = [
        "Wed, 3 Jan 2024 10:00:00 +0000",
        "Mon, 1 Jan 2024 10:00:00 +0000",
        "Tue, 2 Jan 2024 10:00:00 +0000",
    ];
    let mut fetch = String::new();
    for (i, date) in dates.iter().enumerate() {
        let n = i + 1;
        let env = envelope(date, "Report", &format!("<{n}@x>"));
        fetch.push_str(&format!(
            "* {n} FETCH (UID {n} ENVELOPE {env} INTERNALDATE \"01-Jan-2024 00:00:00 +0000\")\r\n"
        ));
    }
    let first = format!("{fetch}A0002 OK done\r\n");
    let second = format!("{fetch}A0004 OK done\r\n");
    let (stream, sent) = MockStream::new(&[
        b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n",
        b"* 3 EXISTS\r\nA0000 OK [READ-WRITE] selected\r\n",
        b"* SEARCH 1 2 3\r\nA0001 OK done\r\n",
        first.as_bytes(),
        b"* SEARCH 1 2 3\r\nA0003 OK done\r\n",
        second.as_bytes(),
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap();
    session.select("INBOX").await.unwrap();

    let keys = [SortCriterion::asc(SortKey::Subject), SortCriterion::asc(SortKey::Date)];
    let sorted = session.sort(&keys, &SearchCriteria::All, true).await.unwrap();
    assert_eq!(sorted, vec![2, 3, 1]);

    // REVERSE on SUBJECT leaves the DATE tiebreak ascending.
    let keys = [SortCriterion::desc(SortKey::Subject), SortCriterion::asc(SortKey::Date)];
    let sorted = session.sort(&keys, &SearchCriteria::All, true).await.unwrap();
    assert_eq!(sorted, vec![2, 3, 1]);

    assert!(!sent_text(&sent).contains(" SORT "));
}

#[tokio::test]
async fn test_client_thread_references() {
    // A is the root, B replies to A, C replies to B, D references a
    // message that is not in the mailbox.
    let messages = [
        (1, "Mon, 1 Jan 2024 10:00:00 +0000", "Plan", "<a@x>", ""),
        (2, "Mon, 1 Jan 2024 11:00:00 +0000", "Re: Plan", "<b@x>", "<a@x>"),
        (3, "Mon, 1 Jan 2024 12:00:00 +0000", "Re: Plan", "<c@x>", "<a@x> <b@x>"),
        (4, "Mon, 1 Jan 2024 09:00:00 +0000", "Re: Plan", "<d@x>", "<x@x>"),
    ];
    let mut fetch = String::new();
    for (n, date, subject, id, refs) in messages {
        let env = envelope(date, subject, id);
        let header = if refs.is_empty() {
            "\r\n".to_string()
        } else {
            format!("References: {refs}\r\n\r\n")
        };
        fetch.push_str(&format!(
            "* {n} FETCH (UID {n} ENVELOPE {env} INTERNALDATE \"01-Jan-2024 00:00:00 +0000\" \
             BODY[HEADER.FIELDS (REFERENCES)] {{{}}}\r\n{header})\r\n",
            header.len()
        ));
    }
    fetch.push_str("A0002 OK done\r\n");
    let (stream, _) = MockStream::new(&[
        b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n",
        b"* 4 EXISTS\r\nA0000 OK [READ-WRITE] selected\r\n",
        b"* SEARCH 1 2 3 4\r\nA0001 OK done\r\n",
        fetch.as_bytes(),
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap();
    session.select("INBOX").await.unwrap();

    let threads = session
        .thread(&ThreadAlgorithm::References, &SearchCriteria::All, true)
        .await
        .unwrap();
    assert_eq!(threads.len(), 2);
    let root_a = threads.iter().find(|t| t.id == Some(1)).unwrap();
    assert_eq!(root_a.ids(), vec![1, 2, 3]);
    assert!(threads.iter().any(|t| t.ids() == vec![4]));
}

#[tokio::test]
async fn test_bye_moves_to_logout() {
    let (stream, _) = MockStream::new(&[
        b"* PREAUTH hi\r\n",
        b"* BYE server shutting down\r\nA0000 OK done\r\n",
    ]);
    let mut session = Session::from_stream(stream, Config::new("imap.example.com"))
        .await
        .unwrap();
    let _ = session.noop().await;
    assert_eq!(*session.state(), SessionState::Logout);
    let error = session.noop().await.unwrap_err();
    assert!(matches!(error, Error::InvalidState { .. }));
}

proptest! {
    #[test]
    fn prop_id_set_round_trips_through_sequence_set(ids in prop::collection::btree_set(1u32..500, 1..40)) {
        let set: IdSet = ids.iter().copied().collect();
        let wire = set.to_sequence_set().unwrap().to_string();
        let parsed = IdSet::parse(&wire).unwrap();
        prop_assert_eq!(parsed.iter().collect::<Vec<_>>(), ids.into_iter().collect::<Vec<_>>());
    }
}
