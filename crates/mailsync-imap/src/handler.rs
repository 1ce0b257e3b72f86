//! Unsolicited response handling.
//!
//! Servers may send EXISTS, EXPUNGE, FETCH, VANISHED and status responses
//! at any time (RFC 2683). The session applies them to its own state first
//! and then forwards them to the registered [`ResponseHandler`].

use crate::parser::FetchItem;
use crate::types::{Flags, IdSet, SeqNum};

/// Receiver for server responses the session did not ask for.
///
/// Every method has an empty default.
pub trait ResponseHandler: Send {
    /// Message count changed.
    fn on_exists(&mut self, count: u32) {
        let _ = count;
    }

    /// Recent count changed.
    fn on_recent(&mut self, count: u32) {
        let _ = count;
    }

    /// A message was expunged. Later sequence numbers shift down by one.
    fn on_expunge(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// UIDs were expunged (QRESYNC). `earlier` marks replayed history.
    fn on_vanished(&mut self, uids: &IdSet, earlier: bool) {
        let _ = (uids, earlier);
    }

    /// Message data changed, usually flags.
    fn on_fetch(&mut self, seq: SeqNum, items: &[FetchItem]) {
        let _ = (seq, items);
    }

    /// The mailbox's defined flags changed.
    fn on_flags(&mut self, flags: &Flags) {
        let _ = flags;
    }

    /// `[ALERT]` text. Must reach the user.
    fn on_alert(&mut self, text: &str) {
        let _ = text;
    }

    /// The server is closing the connection.
    fn on_bye(&mut self, text: &str) {
        let _ = text;
    }
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ResponseHandler for NoopHandler {}

/// Logs unsolicited responses through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ResponseHandler for LoggingHandler {
    fn on_exists(&mut self, count: u32) {
        tracing::debug!(count, "EXISTS");
    }

    fn on_recent(&mut self, count: u32) {
        tracing::debug!(count, "RECENT");
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "EXPUNGE");
    }

    fn on_vanished(&mut self, uids: &IdSet, earlier: bool) {
        tracing::debug!(%uids, earlier, "VANISHED");
    }

    fn on_fetch(&mut self, seq: SeqNum, items: &[FetchItem]) {
        tracing::debug!(seq = seq.get(), items = items.len(), "FETCH");
    }

    fn on_flags(&mut self, flags: &Flags) {
        tracing::debug!(?flags, "FLAGS");
    }

    fn on_alert(&mut self, text: &str) {
        tracing::warn!(text, "ALERT");
    }

    fn on_bye(&mut self, text: &str) {
        tracing::info!(text, "BYE");
    }
}

/// Records events, mainly for tests.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    /// Collected events in arrival order.
    pub events: Vec<UnsolicitedEvent>,
}

impl CollectingHandler {
    /// Creates an empty handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes all collected events.
    pub fn take(&mut self) -> Vec<UnsolicitedEvent> {
        std::mem::take(&mut self.events)
    }
}

impl ResponseHandler for CollectingHandler {
    fn on_exists(&mut self, count: u32) {
        self.events.push(UnsolicitedEvent::Exists(count));
    }

    fn on_recent(&mut self, count: u32) {
        self.events.push(UnsolicitedEvent::Recent(count));
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        self.events.push(UnsolicitedEvent::Expunge(seq));
    }

    fn on_vanished(&mut self, uids: &IdSet, earlier: bool) {
        self.events.push(UnsolicitedEvent::Vanished {
            uids: uids.clone(),
            earlier,
        });
    }

    fn on_fetch(&mut self, seq: SeqNum, items: &[FetchItem]) {
        self.events.push(UnsolicitedEvent::Fetch(seq, items.to_vec()));
    }

    fn on_flags(&mut self, flags: &Flags) {
        self.events.push(UnsolicitedEvent::Flags(flags.clone()));
    }

    fn on_alert(&mut self, text: &str) {
        self.events.push(UnsolicitedEvent::Alert(text.to_string()));
    }

    fn on_bye(&mut self, text: &str) {
        self.events.push(UnsolicitedEvent::Bye(text.to_string()));
    }
}

/// An event recorded by [`CollectingHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum UnsolicitedEvent {
    /// EXISTS.
    Exists(u32),
    /// RECENT.
    Recent(u32),
    /// EXPUNGE.
    Expunge(SeqNum),
    /// VANISHED.
    Vanished {
        /// Expunged UIDs.
        uids: IdSet,
        /// `(EARLIER)` was present.
        earlier: bool,
    },
    /// FETCH.
    Fetch(SeqNum, Vec<FetchItem>),
    /// FLAGS.
    Flags(Flags),
    /// ALERT.
    Alert(String),
    /// BYE.
    Bye(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_handler() {
        let mut handler = NoopHandler;
        handler.on_exists(100);
        handler.on_expunge(SeqNum::new(1).unwrap());
        handler.on_bye("goodbye");
    }

    #[test]
    fn test_collecting_handler() {
        let mut handler = CollectingHandler::new();
        handler.on_exists(50);
        handler.on_vanished(&IdSet::parse("3:4").unwrap(), false);
        handler.on_alert("disk full");

        let events = handler.take();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], UnsolicitedEvent::Exists(50));
        assert!(matches!(
            &events[1],
            UnsolicitedEvent::Vanished { uids, earlier: false } if uids.len() == 2
        ));
        assert_eq!(events[2], UnsolicitedEvent::Alert("disk full".to_string()));
        assert!(handler.events.is_empty());
    }
}
