//! IMAP protocol parser.
//!
//! Sans-I/O parsing of server responses:
//!
//! - **Lexer**: tokenizes one complete response (line plus literals) and
//!   reads token trees for data without a dedicated grammar.
//! - **Response parser**: builds typed responses from tokens.
//! - **Parse context**: collects the responses of one command cycle.
//!
//! # Example
//!
//! ```
//! use mailsync_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 3 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));
//! ```

pub mod context;
pub mod lexer;
pub mod response;

pub use context::{Completion, ParseContext, Step};
pub use lexer::{Lexer, Token, Value};
pub use response::{
    Address, BodyStructure, ESearchResponse, Envelope, FetchItem, MessageData, Response,
    ResponseParser, UntaggedResponse, normalize_section,
};
