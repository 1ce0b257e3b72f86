//! # mailsync-imap
//!
//! A stateful IMAP4rev1 (RFC 3501) client with extension negotiation, a
//! pluggable message cache and client-side SORT/THREAD.
//!
//! ## Features
//!
//! - **One session, one command**: each command is checked against the
//!   connection state and the negotiated extensions before anything is
//!   written, then read to its tagged completion
//! - **Extensions**: STARTTLS, SASL-IR, LITERAL+, ENABLE, ID,
//!   COMPRESS=DEFLATE, IDLE, UIDPLUS, MOVE, UNSELECT, CONDSTORE, QRESYNC,
//!   ESEARCH, SORT, THREAD, QUOTA and ACL
//! - **Message cache**: UID-keyed per mailbox, invalidated on UIDVALIDITY
//!   change and kept current with CONDSTORE mod-sequences
//! - **Client-side SORT and THREAD** (RFC 5256) when the server lacks them
//! - **TLS via rustls**
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsync_imap::{Config, FetchAttribute, IdSet, SearchCriteria, Session};
//!
//! #[tokio::main]
//! async fn main() -> mailsync_imap::Result<()> {
//!     let mut session = Session::connect(Config::new("imap.example.com")).await?;
//!     session.login("user@example.com", "password").await?;
//!
//!     let inbox = session.select("INBOX").await?;
//!     println!("{} messages", inbox.exists);
//!
//!     let unseen = session.search(&SearchCriteria::Unseen, true).await?;
//!     let uids: IdSet = unseen.ids.into_iter().collect();
//!     for message in session.uid_fetch(&uids, &[FetchAttribute::Envelope]).await? {
//!         println!("{:?}", message.envelope.and_then(|e| e.subject));
//!     }
//!
//!     session.logout().await
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! NotAuthenticated ── login() / authenticate() ──→ Authenticated
//! Authenticated ── select() / examine() ──→ Selected
//! Selected ── close() / unselect() ──→ Authenticated
//! any ── logout(), BYE or transport failure ──→ Logout
//! ```
//!
//! ## Modules
//!
//! - [`types`]: flags, mailboxes, sequence sets and response codes
//! - [`parser`]: tokenizer, response parser and per-command parse context
//! - [`command`]: command model and wire encoding
//! - [`extension`]: capability-to-extension negotiation
//! - [`connection`]: configuration, transport and the [`Session`]
//! - [`cache`]: message and search-result cache
//! - [`sort`]: client-side SORT and THREAD
//! - [`handler`]: callbacks for unsolicited server data
//! - [`sasl`]: SASL mechanisms for AUTHENTICATE

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod command;
pub mod connection;
mod error;
pub mod extension;
pub mod handler;
pub mod parser;
pub mod sasl;
pub mod sort;
pub mod types;

pub use cache::{CacheBackend, MailboxKey, MemoryBackend, MessageCache};
pub use command::{
    Command, FetchAttribute, FetchItems, SearchCriteria, SortCriterion, SortKey, StoreAction,
    TagGenerator, ThreadAlgorithm,
};
pub use connection::{
    AppendResult, Config, ConfigBuilder, CopyResult, ExpungeResult, IdleEvent, IdleHandle,
    ImapStream, SearchResult, Security, Session, SessionState, StoreResult, Transport,
};
pub use error::{Error, ErrorKind, Result};
pub use extension::Extension;
pub use handler::ResponseHandler;
pub use parser::{MessageData, ParseContext, Response, ResponseParser, UntaggedResponse};
pub use sasl::SaslMechanism;
pub use sort::{Collator, ThreadNode};
pub use types::{
    Capability, CapabilitySet, Flag, Flags, IdSet, ListResponse, Mailbox, MailboxStatus,
    ResponseCode, SelectedMailbox, SeqNum, SequenceSet, Status, Tag, Uid, UidValidity,
};
