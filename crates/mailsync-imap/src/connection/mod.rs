//! Connections to IMAP servers.
//!
//! - [`Config`]: host, port, security mode, timeouts and client behavior
//! - [`ImapStream`] and the [`Transport`] trait: plain or TLS byte streams
//! - [`FramedStream`]: response framing, literals and COMPRESS=DEFLATE
//! - [`Session`]: the state machine that runs commands

mod compress;
mod config;
mod framed;
mod session;
mod state;
mod stream;

pub use config::{Config, ConfigBuilder, Security};
pub use framed::FramedStream;
pub use session::{
    AppendResult, CopyResult, ExpungeResult, IdleEvent, IdleHandle, SearchResult, Session,
    StoreResult,
};
pub use state::{SessionState, UidIndex};
pub use stream::{ImapStream, Transport, connect_plain, connect_tls, create_tls_connector};
