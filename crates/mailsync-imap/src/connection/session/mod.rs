//! IMAP session.
//!
//! A [`Session`] owns one connection and runs one command at a time. Each
//! command is checked against the session state and the negotiated
//! extensions before anything is written, then every response is fed into
//! a fresh [`ParseContext`] until the tagged completion arrives.
//!
//! Untagged data updates the selected mailbox, the sequence-to-UID index
//! and the message cache before it is handed to the [`ResponseHandler`].

#![allow(clippy::missing_errors_doc)]

mod auth;
mod idle;
mod mailbox;
mod message;

use std::sync::Arc;

pub use idle::{IdleEvent, IdleHandle};
pub use mailbox::AppendResult;
pub use message::{CopyResult, ExpungeResult, SearchResult, StoreResult};

use super::config::{Config, Security};
use super::framed::FramedStream;
use super::state::{SessionState, UidIndex};
use super::stream::{ImapStream, Transport, connect_plain, connect_tls};
use crate::cache::{MailboxKey, MailboxMeta, MessageCache};
use crate::command::{Command, TagGenerator};
use crate::extension::{Extension, Extensions};
use crate::handler::{LoggingHandler, ResponseHandler};
use crate::parser::{FetchItem, MessageData, ParseContext, Response, ResponseParser, Step, UntaggedResponse};
use crate::sort::{ByteCollator, Collator};
use crate::types::{CapabilitySet, IdSet, ResponseCode, SelectedMailbox, SeqNum, Uid};
use crate::{Error, Result};

/// Cache position of the selected mailbox.
struct CacheScope {
    key: MailboxKey,
    meta: MailboxMeta,
}

/// A connection to one IMAP server.
pub struct Session<S = ImapStream> {
    framed: Option<FramedStream<S>>,
    config: Config,
    tags: TagGenerator,
    state: SessionState,
    capabilities: CapabilitySet,
    capabilities_known: bool,
    extensions: Extensions,
    enabled: Vec<String>,
    handler: Box<dyn ResponseHandler>,
    cache: Option<MessageCache>,
    scope: Option<CacheScope>,
    uid_index: UidIndex,
    collator: Arc<dyn Collator>,
    username: Option<String>,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("state", &self.state.name())
            .field("tags", &self.tags)
            .field("capabilities", &self.capabilities)
            .field("enabled", &self.enabled)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Session<ImapStream> {
    /// Connects to `config.host` and reads the greeting.
    ///
    /// With [`Security::StartTls`] the connection is upgraded before this
    /// returns.
    pub async fn connect(config: Config) -> Result<Self> {
        tracing::info!(host = %config.host, port = config.port, security = ?config.security, "connecting");
        let limit = config.connect_timeout;
        let stream = match config.security {
            Security::Implicit => connect_tls(&config.host, config.port, limit).await?,
            Security::StartTls | Security::None => {
                connect_plain(&config.host, config.port, limit).await?
            }
        };
        let starttls = config.security == Security::StartTls;
        let mut session = Self::from_stream(stream, config).await?;
        if starttls {
            session.starttls().await?;
        }
        Ok(session)
    }
}

impl<S: Transport> Session<S> {
    /// Wraps an already connected stream and reads the server greeting.
    pub async fn from_stream(stream: S, config: Config) -> Result<Self> {
        let mut session = Self {
            framed: Some(FramedStream::new(stream)),
            config,
            tags: TagGenerator::default(),
            state: SessionState::Disconnected,
            capabilities: CapabilitySet::new(),
            capabilities_known: false,
            extensions: Extensions::default(),
            enabled: Vec::new(),
            handler: Box::new(LoggingHandler),
            cache: None,
            scope: None,
            uid_index: UidIndex::default(),
            collator: Arc::new(ByteCollator),
            username: None,
        };
        session.read_greeting().await?;
        Ok(session)
    }

    /// Routes unsolicited responses to `handler`.
    #[must_use]
    pub fn with_handler(mut self, handler: impl ResponseHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Enables the message cache.
    #[must_use]
    pub fn with_cache(mut self, cache: MessageCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the collator used by client-side SORT.
    #[must_use]
    pub fn with_collator(mut self, collator: Arc<dyn Collator>) -> Self {
        self.collator = collator;
        self
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Capabilities as last advertised by the server.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Extensions usable on this connection.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns true if `extension` is advertised and not ignored.
    #[must_use]
    pub fn supports(&self, extension: Extension) -> bool {
        self.extensions.supports(extension)
    }

    /// Capabilities the server confirmed with ENABLED.
    #[must_use]
    pub fn enabled(&self) -> &[String] {
        &self.enabled
    }

    /// The selected mailbox, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<&SelectedMailbox> {
        self.state.selected()
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true once COMPRESS=DEFLATE is active.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.framed.as_ref().is_some_and(FramedStream::is_compressed)
    }

    /// The underlying transport.
    #[must_use]
    pub fn get_ref(&self) -> Option<&S> {
        self.framed.as_ref().map(FramedStream::get_ref)
    }

    async fn read_greeting(&mut self) -> Result<()> {
        let raw = self.read().await?;
        let response = ResponseParser::parse(&raw).map_err(|e| e.with_line(&raw))?;
        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                self.state = SessionState::NotAuthenticated;
                if let Some(code) = code {
                    self.apply_code(&code, &text);
                }
                tracing::info!(greeting = %text, "connected");
                Ok(())
            }
            Response::Untagged(UntaggedResponse::PreAuth { code, text }) => {
                self.state = SessionState::Authenticated;
                if let Some(code) = code {
                    self.apply_code(&code, &text);
                }
                tracing::info!(greeting = %text, "connected, pre-authenticated");
                Ok(())
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                self.state = SessionState::Logout;
                Err(Error::Bye(text))
            }
            _ => Err(Error::Protocol("unexpected greeting".to_string())),
        }
    }

    /// Checks state and extensions, then runs `command` to completion.
    ///
    /// NO and BAD completions become errors. Nothing is written when a
    /// check fails.
    pub(crate) async fn run(&mut self, command: &Command) -> Result<ParseContext> {
        self.ensure_allowed(command).await?;
        self.run_unchecked(command).await
    }

    async fn run_unchecked(&mut self, command: &Command) -> Result<ParseContext> {
        let ctx = self.execute(command).await?;
        let completion = ctx
            .completion()
            .cloned()
            .ok_or_else(|| Error::Protocol("missing completion".to_string()))?;
        if let Err(error) = completion.into_result() {
            tracing::debug!(command = command.name(), %error, "command failed");
            return Err(error);
        }
        Ok(ctx)
    }

    async fn ensure_allowed(&mut self, command: &Command) -> Result<()> {
        if !self.state.allows(command.requires()) {
            return Err(Error::InvalidState {
                operation: command.name(),
                state: self.state.name(),
            });
        }
        let required = command.required_extensions();
        if required.is_empty() {
            return Ok(());
        }
        if !self.capabilities_known {
            self.refresh_capabilities().await?;
        }
        for extension in required {
            self.extensions.require(extension)?;
        }
        Ok(())
    }

    /// Runs CAPABILITY without the extension check.
    async fn refresh_capabilities(&mut self) -> Result<()> {
        if !self.state.allows(Command::Capability.requires()) {
            return Err(Error::InvalidState {
                operation: "CAPABILITY",
                state: self.state.name(),
            });
        }
        self.run_unchecked(&Command::Capability).await?;
        if !self.capabilities_known {
            return Err(Error::Protocol("no CAPABILITY response".to_string()));
        }
        Ok(())
    }

    /// Writes `command` and reads until its completion, whatever the status.
    async fn execute(&mut self, command: &Command) -> Result<ParseContext> {
        let tag = self.tags.next();
        let literal_plus = self.extensions.supports(Extension::LiteralPlus);
        let chunks = command.encode(&tag, literal_plus);
        tracing::debug!(%tag, command = command.name(), "sending command");
        tracing::trace!(line = %command.redacted(&tag), "C:");

        let mut ctx = ParseContext::new(tag);
        let last = chunks.len().saturating_sub(1);
        for (index, chunk) in chunks.iter().enumerate() {
            self.write(chunk).await?;
            if index < last && !self.await_continuation(&mut ctx).await? {
                // Literal refused; the completion is already in ctx.
                return Ok(ctx);
            }
        }
        self.finish(&mut ctx).await?;
        Ok(ctx)
    }

    /// Reads until `+`. Returns false if the command completed instead.
    async fn await_continuation(&mut self, ctx: &mut ParseContext) -> Result<bool> {
        loop {
            match self.next_step(ctx).await? {
                Step::Continuation(_) => return Ok(true),
                Step::Done => return Ok(false),
                Step::Untagged | Step::ForeignTag(_) => {}
            }
        }
    }

    /// Reads until the tagged completion.
    async fn finish(&mut self, ctx: &mut ParseContext) -> Result<()> {
        loop {
            match self.next_step(ctx).await? {
                Step::Done => return Ok(()),
                Step::Continuation(text) => {
                    tracing::warn!(?text, tag = %ctx.tag(), "unexpected continuation");
                }
                Step::Untagged | Step::ForeignTag(_) => {}
            }
        }
    }

    /// Reads one response, records it and applies its side effects.
    ///
    /// A foreign tag or an unparseable line ends the cycle: the remaining
    /// lines up to the in-flight completion are skipped and the error is
    /// returned.
    async fn next_step(&mut self, ctx: &mut ParseContext) -> Result<Step> {
        let raw = self.read().await?;
        tracing::trace!(line = %String::from_utf8_lossy(&raw).trim_end(), "S:");
        match ctx.feed(&raw) {
            Ok(Step::Untagged) => {
                if let Some(response) = ctx.last() {
                    self.apply_untagged(response);
                }
                Ok(Step::Untagged)
            }
            Ok(Step::Done) => {
                if let Some(completion) = ctx.completion()
                    && let Some(code) = &completion.code
                {
                    self.apply_code(code, &completion.text);
                }
                Ok(Step::Done)
            }
            Ok(Step::ForeignTag(tag)) => {
                tracing::warn!(%tag, expected = %ctx.tag(), "response for unknown tag");
                let error = Error::Protocol(format!("unexpected tag {tag}"));
                Err(self.resync(ctx, error).await)
            }
            Ok(step) => Ok(step),
            Err(error) => {
                let error = error.with_line(&raw);
                tracing::warn!(%error, tag = %ctx.tag(), "unparseable response");
                if raw.starts_with(format!("{} ", ctx.tag()).as_bytes()) {
                    return Err(error);
                }
                Err(self.resync(ctx, error).await)
            }
        }
    }

    async fn resync(&mut self, ctx: &ParseContext, error: Error) -> Error {
        let prefix = format!("{} ", ctx.tag());
        loop {
            match self.read().await {
                Ok(raw) if raw.starts_with(prefix.as_bytes()) => return error,
                Ok(_) => {}
                Err(transport) => return transport,
            }
        }
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        let limit = self.config.io_timeout;
        let result = match self.framed.as_mut() {
            Some(framed) => tokio::time::timeout(limit, framed.read_response())
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(limit))),
            None => Err(Error::ConnectionLost),
        };
        result.map_err(|e| self.fail(e))
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.config.io_timeout;
        let result = match self.framed.as_mut() {
            Some(framed) => tokio::time::timeout(limit, framed.write_all(data))
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(limit))),
            None => Err(Error::ConnectionLost),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Moves to Logout on transport failures.
    fn fail(&mut self, error: Error) -> Error {
        if error.is_connection_fatal() && self.state != SessionState::Logout {
            tracing::warn!(%error, "connection unusable");
            self.state = SessionState::Logout;
            self.scope = None;
        }
        error
    }

    fn set_capabilities(&mut self, capabilities: CapabilitySet) {
        let ignored: Vec<String> = self
            .config
            .ignored_capabilities
            .iter()
            .map(|e| e.capability().to_string())
            .collect();
        self.extensions = Extensions::negotiate(&capabilities, &ignored);
        tracing::debug!(count = capabilities.len(), "capabilities updated");
        self.capabilities = capabilities;
        self.capabilities_known = true;
    }

    /// Forgets the capabilities so the next extension check re-queries them.
    fn invalidate_capabilities(&mut self) {
        self.capabilities = CapabilitySet::new();
        self.extensions = Extensions::default();
        self.capabilities_known = false;
    }

    fn apply_code(&mut self, code: &ResponseCode, text: &str) {
        match code {
            ResponseCode::Capability(capabilities) => self.set_capabilities(capabilities.clone()),
            ResponseCode::Alert => self.handler.on_alert(text),
            ResponseCode::Closed => {
                // Everything before [CLOSED] belonged to the previous mailbox.
                if let Some(selected) = self.state.selected_mut() {
                    *selected = SelectedMailbox::new(selected.mailbox.clone(), selected.read_only);
                }
                self.uid_index.clear();
            }
            other => {
                if let Some(selected) = self.state.selected_mut() {
                    selected.apply_code(other);
                }
            }
        }
    }

    fn apply_untagged(&mut self, response: &UntaggedResponse) {
        match response {
            UntaggedResponse::Ok { code, text }
            | UntaggedResponse::No { code, text }
            | UntaggedResponse::Bad { code, text } => {
                if let Some(code) = code {
                    self.apply_code(code, text);
                }
            }
            UntaggedResponse::Bye { text, .. } => {
                tracing::info!(reason = %text, "server closing connection");
                self.state = SessionState::Logout;
                self.scope = None;
                self.handler.on_bye(text);
            }
            UntaggedResponse::Capability(capabilities) => {
                self.set_capabilities(capabilities.clone());
            }
            UntaggedResponse::Enabled(capabilities) => {
                for capability in capabilities {
                    if !self.enabled.iter().any(|c| c.eq_ignore_ascii_case(capability)) {
                        self.enabled.push(capability.to_ascii_uppercase());
                    }
                }
            }
            UntaggedResponse::Flags(flags) => {
                if let Some(selected) = self.state.selected_mut() {
                    selected.flags = flags.clone();
                }
                self.handler.on_flags(flags);
            }
            UntaggedResponse::Exists(count) => {
                if let Some(selected) = self.state.selected_mut() {
                    selected.exists = *count;
                }
                self.uid_index.set_exists(*count);
                self.handler.on_exists(*count);
            }
            UntaggedResponse::Recent(count) => {
                if let Some(selected) = self.state.selected_mut() {
                    selected.recent = *count;
                }
                self.handler.on_recent(*count);
            }
            UntaggedResponse::Expunge(seq) => {
                if let Some(selected) = self.state.selected_mut() {
                    selected.expunged();
                }
                if let Some(uid) = self.uid_index.expunge(*seq) {
                    let gone: IdSet = std::iter::once(uid).collect();
                    self.with_scope(|cache, key, meta| cache.remove(key, meta, &gone));
                }
                self.handler.on_expunge(*seq);
            }
            UntaggedResponse::Vanished { earlier, uids } => {
                if !earlier && let Some(selected) = self.state.selected_mut() {
                    let count = u32::try_from(uids.len()).unwrap_or(u32::MAX);
                    selected.exists = selected.exists.saturating_sub(count);
                }
                self.uid_index.vanish(uids);
                self.with_scope(|cache, key, meta| cache.remove(key, meta, uids));
                self.handler.on_vanished(uids, *earlier);
            }
            UntaggedResponse::Fetch { seq, items } => {
                self.note_fetch(*seq, items);
                self.handler.on_fetch(*seq, items);
            }
            _ => {}
        }
    }

    /// Records UIDs and keeps cached flags of known messages current.
    fn note_fetch(&mut self, seq: SeqNum, items: &[FetchItem]) {
        let mut uid = None;
        let mut flags = None;
        let mut mod_seq = None;
        for item in items {
            match item {
                FetchItem::Uid(u) => uid = Some(*u),
                FetchItem::Flags(f) => flags = Some(f.clone()),
                FetchItem::ModSeq(m) => mod_seq = Some(*m),
                _ => {}
            }
        }
        if let Some(uid) = uid {
            self.uid_index.record(seq, uid);
        }
        let uid = uid.map(Uid::get).or_else(|| self.uid_index.get(seq));
        let (Some(uid), Some(flags)) = (uid, flags) else {
            return;
        };
        let current = self.current_mod_seq();
        self.with_scope(|cache, key, meta| {
            if meta.uids.contains(uid) {
                let data = MessageData {
                    flags: Some(flags),
                    mod_seq,
                    ..MessageData::default()
                };
                cache.store(key, meta, &[(uid, data)], current);
            }
        });
    }

    /// HIGHESTMODSEQ of the selected mailbox when CONDSTORE is active.
    fn current_mod_seq(&self) -> Option<u64> {
        self.state
            .selected()
            .filter(|m| m.condstore_active())
            .and_then(|m| m.highest_mod_seq)
    }

    fn with_scope(&mut self, f: impl FnOnce(&MessageCache, &MailboxKey, &mut MailboxMeta)) {
        if let (Some(cache), Some(scope)) = (self.cache.as_ref(), self.scope.as_mut()) {
            f(cache, &scope.key, &mut scope.meta);
        }
    }

    fn check_selected(&self, operation: &'static str) -> Result<()> {
        if self.state.selected().is_none() {
            return Err(Error::InvalidState {
                operation,
                state: self.state.name(),
            });
        }
        Ok(())
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
    use std::time::Duration;
    use tokio_test::io::{Builder, Mock};

    impl Transport for Mock {
        async fn start_tls(self, _host: &str) -> Result<Self> {
            Ok(self)
        }
    }

    fn config() -> Config {
        Config::builder("imap.example.com")
            .io_timeout(Duration::from_secs(5))
            .build()
    }

    #[tokio::test]
    async fn test_greeting_states() {
        let mock = Builder::new().read(b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n").build();
        let session = Session::from_stream(mock, config()).await.unwrap();
        assert_eq!(session.state(), &SessionState::NotAuthenticated);
        assert!(session.supports(Extension::Idle));

        let mock = Builder::new().read(b"* PREAUTH welcome back\r\n").build();
        let session = Session::from_stream(mock, config()).await.unwrap();
        assert_eq!(session.state(), &SessionState::Authenticated);

        let mock = Builder::new().read(b"* BYE too busy\r\n").build();
        let error = Session::from_stream(mock, config()).await.unwrap_err();
        assert!(matches!(error, Error::Bye(text) if text == "too busy"));
    }

    #[tokio::test]
    async fn test_wrong_state_writes_nothing() {
        let mock = Builder::new().read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n").build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let error = session.run(&Command::Check).await.unwrap_err();
        assert!(matches!(
            error,
            Error::InvalidState {
                operation: "CHECK",
                state: "not authenticated"
            }
        ));
    }

    #[tokio::test]
    async fn test_foreign_tag_resyncs_to_own_completion() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 NOOP\r\n")
            .read(b"B0007 OK stray\r\n* 3 EXISTS\r\nA0000 OK done\r\n")
            .write(b"A0001 NOOP\r\n")
            .read(b"A0001 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let error = session.run(&Command::Noop).await.unwrap_err();
        assert!(matches!(error, Error::Protocol(message) if message.contains("B0007")));
        session.run(&Command::Noop).await.unwrap();
    }

    #[tokio::test]
    async fn test_unparseable_line_resyncs() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 NOOP\r\n")
            .read(b"* 1 FETCH (FLAGS (\\Seen)\r\n* 2 EXISTS\r\nA0000 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let error = session.run(&Command::Noop).await.unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Protocol);
        assert_eq!(session.state(), &SessionState::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_eof_moves_to_logout() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 NOOP\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let error = session.run(&Command::Noop).await.unwrap_err();
        assert!(matches!(error, Error::ConnectionLost));
        assert_eq!(session.state(), &SessionState::Logout);
        assert!(matches!(
            session.run(&Command::Noop).await,
            Err(Error::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_bye_during_command() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 NOOP\r\n")
            .read(b"* BYE shutting down\r\nA0000 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        session.run(&Command::Noop).await.unwrap();
        assert_eq!(session.state(), &SessionState::Logout);
    }
}
