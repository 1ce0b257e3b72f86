//! Per-command response collection.
//!
//! A [`ParseContext`] is created when a command is sent and consumed when
//! its tagged completion arrives. Everything the server sends in between
//! lands here, so nothing carries over from one command to the next.

use std::collections::HashMap;

use crate::Result;
use crate::types::{ResponseCode, Status, Tag};

use super::response::{MessageData, Response, ResponseParser, UntaggedResponse};

/// Tagged completion of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// OK, NO or BAD.
    pub status: Status,
    /// Response code, if any.
    pub code: Option<ResponseCode>,
    /// Human-readable text.
    pub text: String,
}

impl Completion {
    /// Converts NO and BAD into command errors.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self),
            Status::No => Err(crate::Error::No {
                code: self.code,
                text: self.text,
            }),
            Status::Bad => Err(crate::Error::Bad {
                code: self.code,
                text: self.text,
            }),
            Status::Bye => Err(crate::Error::Bye(self.text)),
        }
    }
}

/// What a fed response meant for the command cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// An untagged response was recorded; see [`ParseContext::last`].
    Untagged,
    /// The server asked for more data.
    Continuation(Option<String>),
    /// The in-flight command completed.
    Done,
    /// A tagged response for some other tag.
    ForeignTag(Tag),
}

/// Scratch state for one command's response cycle.
#[derive(Debug)]
pub struct ParseContext {
    tag: Tag,
    untagged: Vec<UntaggedResponse>,
    alerts: Vec<String>,
    bad_charset: Option<Vec<String>>,
    completion: Option<Completion>,
}

impl ParseContext {
    /// Creates a context for the command sent with `tag`.
    #[must_use]
    pub const fn new(tag: Tag) -> Self {
        Self {
            tag,
            untagged: Vec::new(),
            alerts: Vec::new(),
            bad_charset: None,
            completion: None,
        }
    }

    /// Returns the in-flight tag.
    #[must_use]
    pub const fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Parses one complete response and records it.
    pub fn feed(&mut self, raw: &[u8]) -> Result<Step> {
        match ResponseParser::parse(raw)? {
            Response::Untagged(response) => {
                self.note_untagged(&response);
                self.untagged.push(response);
                Ok(Step::Untagged)
            }
            Response::Continuation { text } => Ok(Step::Continuation(text)),
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => {
                if tag != self.tag {
                    return Ok(Step::ForeignTag(tag));
                }
                self.note_code(code.as_ref(), &text);
                self.completion = Some(Completion { status, code, text });
                Ok(Step::Done)
            }
        }
    }

    fn note_untagged(&mut self, response: &UntaggedResponse) {
        match response {
            UntaggedResponse::Ok { code, text }
            | UntaggedResponse::No { code, text }
            | UntaggedResponse::Bad { code, text }
            | UntaggedResponse::Bye { code, text } => self.note_code(code.as_ref(), text),
            _ => {}
        }
    }

    fn note_code(&mut self, code: Option<&ResponseCode>, text: &str) {
        match code {
            Some(ResponseCode::Alert) => self.alerts.push(text.to_string()),
            Some(ResponseCode::BadCharset(charsets)) => self.bad_charset = Some(charsets.clone()),
            _ => {}
        }
    }

    /// Returns the most recent untagged response.
    #[must_use]
    pub fn last(&self) -> Option<&UntaggedResponse> {
        self.untagged.last()
    }

    /// Returns all untagged responses in arrival order.
    #[must_use]
    pub fn responses(&self) -> &[UntaggedResponse] {
        &self.untagged
    }

    /// Consumes the context, returning the untagged responses.
    #[must_use]
    pub fn into_responses(self) -> Vec<UntaggedResponse> {
        self.untagged
    }

    /// Returns the tagged completion once it arrived.
    #[must_use]
    pub const fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Takes the tagged completion.
    pub const fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    /// Returns `[ALERT]` texts seen during this command.
    #[must_use]
    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    /// Returns the charsets of the last `[BADCHARSET]` code.
    #[must_use]
    pub fn bad_charset(&self) -> Option<&[String]> {
        self.bad_charset.as_deref()
    }

    /// Merges FETCH responses per sequence number, in first-seen order.
    #[must_use]
    pub fn fetches(&self) -> Vec<MessageData> {
        let mut index: HashMap<u32, usize> = HashMap::new();
        let mut merged: Vec<MessageData> = Vec::new();
        for response in &self.untagged {
            if let UntaggedResponse::Fetch { seq, items } = response {
                match index.get(&seq.get()) {
                    Some(&i) => merged[i].merge_items(items.clone()),
                    None => {
                        index.insert(seq.get(), merged.len());
                        merged.push(MessageData::from_items(Some(*seq), items.clone()));
                    }
                }
            }
        }
        merged
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_collects_until_completion() {
        let mut ctx = ParseContext::new(Tag::new("A0001"));
        assert_eq!(ctx.feed(b"* 5 EXISTS\r\n").unwrap(), Step::Untagged);
        assert_eq!(ctx.last(), Some(&UntaggedResponse::Exists(5)));
        assert_eq!(ctx.feed(b"A0001 OK done\r\n").unwrap(), Step::Done);
        assert_eq!(ctx.completion().unwrap().status, Status::Ok);
        assert_eq!(ctx.into_responses().len(), 1);
    }

    #[test]
    fn test_foreign_tag_not_completion() {
        let mut ctx = ParseContext::new(Tag::new("A0002"));
        assert_eq!(
            ctx.feed(b"A0001 OK late\r\n").unwrap(),
            Step::ForeignTag(Tag::new("A0001"))
        );
        assert!(ctx.completion().is_none());
    }

    #[test]
    fn test_alerts_and_bad_charset() {
        let mut ctx = ParseContext::new(Tag::new("A0003"));
        ctx.feed(b"* OK [ALERT] Mailbox almost full\r\n").unwrap();
        ctx.feed(b"A0003 NO [BADCHARSET (US-ASCII)] nope\r\n").unwrap();
        assert_eq!(ctx.alerts(), ["Mailbox almost full".to_string()]);
        assert_eq!(ctx.bad_charset().unwrap(), ["US-ASCII".to_string()]);
        let err = ctx.take_completion().unwrap().into_result().unwrap_err();
        assert!(matches!(err, Error::No { .. }));
    }

    #[test]
    fn test_fetches_merge_by_sequence() {
        let mut ctx = ParseContext::new(Tag::new("A0004"));
        ctx.feed(b"* 1 FETCH (UID 10 FLAGS (\\Seen))\r\n").unwrap();
        ctx.feed(b"* 2 FETCH (UID 11)\r\n").unwrap();
        ctx.feed(b"* 1 FETCH (RFC822.SIZE 300)\r\n").unwrap();
        let fetches = ctx.fetches();
        assert_eq!(fetches.len(), 2);
        assert_eq!(fetches[0].uid.unwrap().get(), 10);
        assert_eq!(fetches[0].size, Some(300));
        assert!(fetches[0].flags.as_ref().unwrap().is_seen());
        assert_eq!(fetches[1].uid.unwrap().get(), 11);
    }

    #[test]
    fn test_continuation() {
        let mut ctx = ParseContext::new(Tag::new("A0005"));
        assert_eq!(ctx.feed(b"+ go ahead\r\n").unwrap(), Step::Continuation(Some("go ahead".into())));
    }

    #[test]
    fn test_contexts_do_not_share_state() {
        let mut first = ParseContext::new(Tag::new("A0006"));
        first.feed(b"* OK [ALERT] once\r\n").unwrap();
        first.feed(b"A0006 OK\r\n").unwrap();
        let second = ParseContext::new(Tag::new("A0007"));
        assert!(second.alerts().is_empty());
        assert!(second.responses().is_empty());
    }
}
