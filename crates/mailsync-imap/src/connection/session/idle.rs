//! IDLE (RFC 2177).
//!
//! While idling the session reads without its I/O timeout; the caller
//! decides how long to wait. Untagged data still updates the selected
//! mailbox, the UID index and the cache before it is returned as an event.

use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use super::Session;
use crate::command::Command;
use crate::connection::stream::Transport;
use crate::parser::{FetchItem, ParseContext, Step, UntaggedResponse};
use crate::types::{Flags, IdSet, SeqNum};
use crate::{Error, Result};

/// Event received during IDLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// New message count.
    Exists(u32),
    /// New recent count.
    Recent(u32),
    /// Message expunged.
    Expunge(SeqNum),
    /// Messages expunged, by UID (QRESYNC).
    Vanished(IdSet),
    /// Message data changed, usually flags.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// New flags, if sent.
        flags: Option<Flags>,
    },
    /// Nothing arrived before the deadline.
    Timeout,
    /// The server completed IDLE on its own.
    Ended,
}

/// An active IDLE command.
///
/// The session is borrowed until [`IdleHandle::done`] is called. Dropping
/// the handle without `done` leaves the server idling and the session
/// unusable.
#[derive(Debug)]
pub struct IdleHandle<'a, S: Transport> {
    session: &'a mut Session<S>,
    ctx: ParseContext,
    finished: bool,
}

impl<S: Transport> Session<S> {
    /// Starts IDLE on the selected mailbox.
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        self.ensure_allowed(&Command::Idle).await?;
        let tag = self.tags.next();
        let mut ctx = ParseContext::new(tag.clone());
        for chunk in Command::Idle.encode(&tag, false) {
            self.write(&chunk).await?;
        }
        if !self.await_continuation(&mut ctx).await? {
            ctx.take_completion()
                .ok_or_else(|| Error::Protocol("missing completion".to_string()))?
                .into_result()?;
            return Err(Error::Protocol("IDLE completed without continuation".to_string()));
        }
        tracing::debug!(%tag, "idling");
        Ok(IdleHandle {
            session: self,
            ctx,
            finished: false,
        })
    }
}

impl<S: Transport> IdleHandle<'_, S> {
    /// Waits up to `duration` for the next event.
    ///
    /// Servers may drop a connection idle for 30 minutes; call
    /// [`IdleHandle::done`] and restart well before that.
    pub async fn wait(&mut self, duration: Duration) -> Result<IdleEvent> {
        if self.finished {
            return Ok(IdleEvent::Ended);
        }
        let deadline = Instant::now() + duration;
        loop {
            let Some(framed) = self.session.framed.as_mut() else {
                return Err(Error::ConnectionLost);
            };
            let read = timeout_at(deadline, framed.read_response()).await;
            let raw = match read {
                Err(_) => return Ok(IdleEvent::Timeout),
                Ok(result) => result.map_err(|e| self.session.fail(e))?,
            };
            tracing::trace!(line = %String::from_utf8_lossy(&raw).trim_end(), "S:");

            match self.ctx.feed(&raw).map_err(|e| e.with_line(&raw))? {
                Step::Untagged => {
                    let Some(response) = self.ctx.last() else {
                        continue;
                    };
                    self.session.apply_untagged(response);
                    if let Some(event) = event_for(response)? {
                        return Ok(event);
                    }
                }
                Step::Done => {
                    self.finished = true;
                    if let Some(completion) = self.ctx.take_completion() {
                        if let Some(code) = &completion.code {
                            self.session.apply_code(code, &completion.text);
                        }
                        completion.into_result()?;
                    }
                    return Ok(IdleEvent::Ended);
                }
                Step::Continuation(_) => {}
                Step::ForeignTag(tag) => {
                    return Err(Error::Protocol(format!("unexpected tag {tag} during IDLE")));
                }
            }
        }
    }

    /// Sends DONE and waits for the IDLE completion.
    pub async fn done(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        for chunk in Command::Done.encode(self.ctx.tag(), false) {
            self.session.write(&chunk).await?;
        }
        self.session.finish(&mut self.ctx).await?;
        if let Some(completion) = self.ctx.take_completion() {
            completion.into_result()?;
        }
        tracing::debug!(tag = %self.ctx.tag(), "idle done");
        Ok(())
    }
}

fn event_for(response: &UntaggedResponse) -> Result<Option<IdleEvent>> {
    let event = match response {
        UntaggedResponse::Exists(n) => IdleEvent::Exists(*n),
        UntaggedResponse::Recent(n) => IdleEvent::Recent(*n),
        UntaggedResponse::Expunge(seq) => IdleEvent::Expunge(*seq),
        UntaggedResponse::Vanished { uids, .. } => IdleEvent::Vanished(uids.clone()),
        UntaggedResponse::Fetch { seq, items } => IdleEvent::Fetch {
            seq: *seq,
            flags: items.iter().find_map(|item| match item {
                FetchItem::Flags(flags) => Some(flags.clone()),
                _ => None,
            }),
        },
        UntaggedResponse::Bye { text, .. } => return Err(Error::Bye(text.clone())),
        _ => return Ok(None),
    };
    Ok(Some(event))
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
    use tokio_test::io::Builder;

    use super::*;
    use crate::connection::config::Config;
    use crate::connection::state::SessionState;

    const GREETING: &[u8] = b"* PREAUTH [CAPABILITY IMAP4rev1 IDLE] hi\r\n";

    #[tokio::test]
    async fn test_idle_events_then_done() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0000 SELECT INBOX\r\n")
            .read(b"* 2 EXISTS\r\nA0000 OK [READ-WRITE] done\r\n")
            .write(b"A0001 IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* 3 EXISTS\r\n")
            .read(b"* 1 FETCH (FLAGS (\\Seen))\r\n")
            .write(b"DONE\r\n")
            .read(b"A0001 OK IDLE terminated\r\n")
            .build();
        let mut session = Session::from_stream(mock, Config::new("imap.example.com"))
            .await
            .unwrap();
        session.select("INBOX").await.unwrap();

        let mut idle = session.idle().await.unwrap();
        let wait = Duration::from_secs(5);
        assert_eq!(idle.wait(wait).await.unwrap(), IdleEvent::Exists(3));
        let event = idle.wait(wait).await.unwrap();
        assert!(matches!(event, IdleEvent::Fetch { flags: Some(f), .. } if f.is_seen()));
        idle.done().await.unwrap();
        assert_eq!(session.selected().unwrap().exists, 3);
    }

    #[tokio::test]
    async fn test_idle_requires_extension() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
            .write(b"A0000 SELECT INBOX\r\n")
            .read(b"A0000 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, Config::new("imap.example.com"))
            .await
            .unwrap();
        session.select("INBOX").await.unwrap();
        let error = session.idle().await.unwrap_err();
        assert!(matches!(error, Error::CapabilityMissing(name) if name == "IDLE"));
    }

    #[tokio::test]
    async fn test_idle_bye() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0000 SELECT INBOX\r\n")
            .read(b"A0000 OK done\r\n")
            .write(b"A0001 IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* BYE shutting down\r\n")
            .build();
        let mut session = Session::from_stream(mock, Config::new("imap.example.com"))
            .await
            .unwrap();
        session.select("INBOX").await.unwrap();
        let mut idle = session.idle().await.unwrap();
        let error = idle.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(error, Error::Bye(_)));
        drop(idle);
        assert_eq!(*session.state(), SessionState::Logout);
    }
}
