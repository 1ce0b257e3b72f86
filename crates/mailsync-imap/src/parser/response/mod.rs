//! IMAP response parser.
//!
//! Parses one complete server response (line plus literals) into a
//! [`Response`]. Keywords without a dedicated grammar are returned as
//! [`UntaggedResponse::Other`] instead of failing.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::elidable_lifetime_names)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::option_if_let_else)]

mod extension;
mod fetch;
mod helpers;
mod types;

pub use fetch::normalize_section;
pub use types::{
    Address, BodyStructure, ESearchResponse, Envelope, FetchItem, MessageData, UntaggedResponse,
};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::{Error, Result};

use helpers::{
    parse_capability_data, parse_flag_list, parse_id_list, parse_list_response,
    parse_response_code, parse_status_response, read_text_until_crlf,
};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text/data.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Ok(Self::parse_continuation(&mut lexer)),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            Token::Number(tag) => Self::parse_tagged(&mut lexer, &tag.to_string()),
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
                line: Some(input.to_vec()),
            }),
        }
    }

    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;
        let status = Self::parse_status(lexer)?;
        let (code, text) = Self::parse_resp_text(lexer);

        Ok(Response::Tagged {
            tag: Tag::new(tag),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let response = match lexer.next_token()? {
            Token::Atom(keyword) => Self::parse_keyword(lexer, keyword)?,
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                Self::parse_message_data(lexer, n, keyword)?
            }
            token => {
                return Err(lexer.error(&format!("Unexpected token in untagged response: {token:?}")));
            }
        };

        Ok(Response::Untagged(response))
    }

    fn parse_keyword(lexer: &mut Lexer<'_>, keyword: &str) -> Result<UntaggedResponse> {
        let upper = keyword.to_ascii_uppercase();
        let response = match upper.as_str() {
            "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                let (code, text) = Self::parse_resp_text(lexer);
                return Ok(match upper.as_str() {
                    "OK" => UntaggedResponse::Ok { code, text },
                    "NO" => UntaggedResponse::No { code, text },
                    "BAD" => UntaggedResponse::Bad { code, text },
                    "PREAUTH" => UntaggedResponse::PreAuth { code, text },
                    _ => UntaggedResponse::Bye { code, text },
                });
            }
            "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
            "FLAGS" => {
                lexer.expect_space()?;
                UntaggedResponse::Flags(parse_flag_list(lexer)?)
            }
            "LIST" => {
                lexer.expect_space()?;
                return Ok(UntaggedResponse::List(parse_list_response(lexer)?));
            }
            "LSUB" => {
                lexer.expect_space()?;
                return Ok(UntaggedResponse::Lsub(parse_list_response(lexer)?));
            }
            "SEARCH" => {
                let (ids, mod_seq) = parse_id_list(lexer)?;
                UntaggedResponse::Search { ids, mod_seq }
            }
            "SORT" => {
                let (ids, mod_seq) = parse_id_list(lexer)?;
                UntaggedResponse::Sort { ids, mod_seq }
            }
            "STATUS" => {
                lexer.expect_space()?;
                UntaggedResponse::Status(parse_status_response(lexer)?)
            }
            "THREAD" => return extension::parse_thread(lexer),
            "ESEARCH" => return extension::parse_esearch(lexer),
            "NAMESPACE" => return extension::parse_namespace(lexer),
            "ID" => return extension::parse_id(lexer),
            "ENABLED" => return extension::parse_enabled(lexer),
            "VANISHED" => return extension::parse_vanished(lexer),
            "QUOTA" => return extension::parse_quota(lexer),
            "QUOTAROOT" => return extension::parse_quota_root(lexer),
            "ACL" => return extension::parse_acl(lexer),
            "MYRIGHTS" => return extension::parse_my_rights(lexer),
            _ => {
                return Ok(UntaggedResponse::Other {
                    keyword: upper,
                    number: None,
                    data: lexer.read_values_until_crlf()?,
                });
            }
        };

        Self::finish_line(lexer)?;
        Ok(response)
    }

    fn parse_message_data(
        lexer: &mut Lexer<'_>,
        n: u64,
        keyword: &str,
    ) -> Result<UntaggedResponse> {
        let upper = keyword.to_ascii_uppercase();
        let response = match upper.as_str() {
            "EXISTS" => UntaggedResponse::Exists(Self::narrow(lexer, n)?),
            "RECENT" => UntaggedResponse::Recent(Self::narrow(lexer, n)?),
            "EXPUNGE" => UntaggedResponse::Expunge(Self::seq(lexer, n)?),
            "FETCH" => {
                let seq = Self::seq(lexer, n)?;
                lexer.expect_space()?;
                let items = fetch::parse_fetch_response(lexer)?;
                UntaggedResponse::Fetch { seq, items }
            }
            _ => {
                return Ok(UntaggedResponse::Other {
                    keyword: upper,
                    number: Some(n),
                    data: lexer.read_values_until_crlf()?,
                });
            }
        };

        Self::finish_line(lexer)?;
        Ok(response)
    }

    fn narrow(lexer: &Lexer<'_>, n: u64) -> Result<u32> {
        u32::try_from(n).map_err(|_| lexer.error(&format!("Number out of range: {n}")))
    }

    fn seq(lexer: &Lexer<'_>, n: u64) -> Result<SeqNum> {
        SeqNum::new(Self::narrow(lexer, n)?).ok_or_else(|| lexer.error("Invalid sequence number 0"))
    }

    /// Accepts trailing spaces, then requires CRLF or end of input.
    fn finish_line(lexer: &mut Lexer<'_>) -> Result<()> {
        lexer.skip_spaces();
        if lexer.is_eof() {
            return Ok(());
        }
        lexer.expect_crlf()?;
        if lexer.is_eof() {
            Ok(())
        } else {
            Err(lexer.error("Trailing data after response"))
        }
    }

    fn parse_continuation(lexer: &mut Lexer<'_>) -> Response {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }
        let text = read_text_until_crlf(lexer);
        Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        }
    }

    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(lexer.error(&format!("Invalid status: {s}"))),
        }
    }

    /// Parses optional response code and text. A missing text is accepted,
    /// and a code that does not parse is kept as part of the text.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> (Option<ResponseCode>, String) {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let mut code = None;
        if lexer.peek() == Some(b'[') {
            let mark = lexer.checkpoint();
            match parse_response_code(lexer) {
                Ok(parsed) => {
                    code = Some(parsed);
                    if lexer.peek() == Some(b' ') {
                        lexer.advance();
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "Unparseable response code kept as text");
                    lexer.rewind(mark);
                }
            }
        }

        (code, read_text_until_crlf(lexer))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use crate::parser::lexer::Value;
    use crate::types::{Capability, Flag, MailboxAttribute, ResponseCode};

    use super::*;

    fn untagged(input: &[u8]) -> UntaggedResponse {
        match ResponseParser::parse(input).unwrap() {
            Response::Untagged(response) => response,
            other => panic!("Expected untagged response, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_ok_response() {
        match untagged(b"* OK IMAP4rev1 server ready\r\n") {
            UntaggedResponse::Ok { code, text } => {
                assert!(code.is_none());
                assert_eq!(text, "IMAP4rev1 server ready");
            }
            other => panic!("Expected untagged OK, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tagged_ok() {
        match ResponseParser::parse(b"A001 OK LOGIN completed\r\n").unwrap() {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => {
                assert_eq!(tag.as_str(), "A001");
                assert_eq!(status, Status::Ok);
                assert!(code.is_none());
                assert_eq!(text, "LOGIN completed");
            }
            other => panic!("Expected tagged response, got {other:?}"),
        }
    }

    #[test]
    fn test_status_without_text() {
        match ResponseParser::parse(b"A002 OK\r\n").unwrap() {
            Response::Tagged { status, text, .. } => {
                assert_eq!(status, Status::Ok);
                assert_eq!(text, "");
            }
            other => panic!("Expected tagged response, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_capability() {
        match untagged(b"* CAPABILITY IMAP4rev1 IDLE NAMESPACE THREAD=REFERENCES\r\n") {
            UntaggedResponse::Capability(caps) => {
                assert!(caps.contains(&Capability::Imap4Rev1));
                assert!(caps.contains(&Capability::Idle));
                assert_eq!(caps.thread_algorithms(), vec!["REFERENCES"]);
            }
            other => panic!("Expected capability response, got {other:?}"),
        }
    }

    #[test]
    fn test_capability_code_in_tagged_ok() {
        match ResponseParser::parse(b"A0000 OK [CAPABILITY IMAP4rev1 SORT CONDSTORE] Logged in\r\n").unwrap() {
            Response::Tagged {
                code: Some(ResponseCode::Capability(caps)),
                text,
                ..
            } => {
                assert!(caps.contains(&Capability::Sort(None)));
                assert!(caps.contains(&Capability::CondStore));
                assert_eq!(text, "Logged in");
            }
            other => panic!("Expected CAPABILITY code, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_exists() {
        assert_eq!(untagged(b"* 23 EXISTS\r\n"), UntaggedResponse::Exists(23));
    }

    #[test]
    fn test_parse_flags() {
        match untagged(b"* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n") {
            UntaggedResponse::Flags(flags) => {
                assert!(flags.contains(&Flag::Seen));
                assert!(flags.contains(&Flag::Draft));
            }
            other => panic!("Expected FLAGS, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_decodes_utf7() {
        match untagged(b"* LIST (\\HasNoChildren \\Drafts) \"/\" \"Entw&APw-rfe\"\r\n") {
            UntaggedResponse::List(list) => {
                assert!(list.attributes.contains(&MailboxAttribute::Drafts));
                assert_eq!(list.delimiter, Some('/'));
                assert_eq!(list.mailbox.as_str(), "Entwürfe");
            }
            other => panic!("Expected LIST, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_continuation() {
        assert_eq!(
            ResponseParser::parse(b"+ Ready for literal\r\n").unwrap(),
            Response::Continuation {
                text: Some("Ready for literal".to_string())
            }
        );
        assert_eq!(
            ResponseParser::parse(b"+\r\n").unwrap(),
            Response::Continuation { text: None }
        );
    }

    #[test]
    fn test_parse_response_code() {
        match untagged(b"* OK [UIDVALIDITY 1234567890] UIDs valid\r\n") {
            UntaggedResponse::Ok {
                code: Some(ResponseCode::UidValidity(v)),
                text,
            } => {
                assert_eq!(v.get(), 1_234_567_890);
                assert_eq!(text, "UIDs valid");
            }
            other => panic!("Expected UIDVALIDITY code, got {other:?}"),
        }
    }

    #[test]
    fn test_highest_modseq_64_bit() {
        match untagged(b"* OK [HIGHESTMODSEQ 90000000000] Highest\r\n") {
            UntaggedResponse::Ok { code, .. } => {
                assert_eq!(code, Some(ResponseCode::HighestModSeq(90_000_000_000)));
            }
            other => panic!("Expected OK, got {other:?}"),
        }
    }

    #[test]
    fn test_uidplus_codes() {
        match ResponseParser::parse(b"A3 OK [COPYUID 38505 304,319:320 3956:3958] Done\r\n").unwrap() {
            Response::Tagged {
                code: Some(ResponseCode::CopyUid { uid_validity, source, destination }),
                ..
            } => {
                assert_eq!(uid_validity.get(), 38505);
                assert_eq!(source.iter().collect::<Vec<_>>(), vec![304, 319, 320]);
                assert_eq!(destination.len(), 3);
            }
            other => panic!("Expected COPYUID, got {other:?}"),
        }
        match ResponseParser::parse(b"A4 OK [APPENDUID 38505 3955] APPEND completed\r\n").unwrap() {
            Response::Tagged {
                code: Some(ResponseCode::AppendUid { uids, .. }),
                ..
            } => assert!(uids.contains(3955)),
            other => panic!("Expected APPENDUID, got {other:?}"),
        }
    }

    #[test]
    fn test_badcharset_code() {
        match ResponseParser::parse(b"A5 NO [BADCHARSET (US-ASCII \"ISO-8859-1\")] Unsupported\r\n").unwrap() {
            Response::Tagged {
                status,
                code: Some(ResponseCode::BadCharset(charsets)),
                ..
            } => {
                assert_eq!(status, Status::No);
                assert_eq!(charsets, vec!["US-ASCII".to_string(), "ISO-8859-1".to_string()]);
            }
            other => panic!("Expected BADCHARSET, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_code_kept() {
        match untagged(b"* NO [WEBALERT https://x.example/] Login\r\n") {
            UntaggedResponse::No { code, .. } => {
                assert_eq!(code, Some(ResponseCode::Unknown("WEBALERT https://x.example/".into())));
            }
            other => panic!("Expected NO, got {other:?}"),
        }
    }

    #[test]
    fn test_broken_code_becomes_text() {
        match untagged(b"* OK [UIDNEXT abc] hello\r\n") {
            UntaggedResponse::Ok { code, text } => {
                assert!(code.is_none());
                assert_eq!(text, "[UIDNEXT abc] hello");
            }
            other => panic!("Expected OK, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fetch() {
        match untagged(b"* 1 FETCH (FLAGS (\\Seen) UID 12345)\r\n") {
            UntaggedResponse::Fetch { seq, items } => {
                assert_eq!(seq.get(), 1);
                assert!(items.iter().any(|i| matches!(i, FetchItem::Uid(uid) if uid.get() == 12345)));
                assert!(items.iter().any(|i| matches!(i, FetchItem::Flags(f) if f.is_seen())));
            }
            other => panic!("Expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_search_with_modseq() {
        assert_eq!(
            untagged(b"* SEARCH 1 2 3 5 8 13\r\n"),
            UntaggedResponse::Search {
                ids: vec![1, 2, 3, 5, 8, 13],
                mod_seq: None
            }
        );
        assert_eq!(
            untagged(b"* SEARCH 2 5 (MODSEQ 917162500)\r\n"),
            UntaggedResponse::Search {
                ids: vec![2, 5],
                mod_seq: Some(917162500)
            }
        );
        assert_eq!(
            untagged(b"* SEARCH\r\n"),
            UntaggedResponse::Search {
                ids: Vec::new(),
                mod_seq: None
            }
        );
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!(
            untagged(b"* SORT 2 84 882\r\n"),
            UntaggedResponse::Sort {
                ids: vec![2, 84, 882],
                mod_seq: None
            }
        );
    }

    #[test]
    fn test_parse_status() {
        match untagged(b"* STATUS \"Sent\" (MESSAGES 231 UIDNEXT 44292 HIGHESTMODSEQ 7011231777)\r\n") {
            UntaggedResponse::Status(status) => {
                assert_eq!(status.mailbox.unwrap().as_str(), "Sent");
                assert_eq!(status.messages, Some(231));
                assert_eq!(status.uid_next, Some(44292));
                assert_eq!(status.highest_mod_seq, Some(7011231777));
            }
            other => panic!("Expected STATUS, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_keyword_is_other() {
        assert_eq!(
            untagged(b"* XFOO bar (1 2)\r\n"),
            UntaggedResponse::Other {
                keyword: "XFOO".into(),
                number: None,
                data: vec![
                    Value::Atom("bar".into()),
                    Value::List(vec![Value::Number(1), Value::Number(2)])
                ],
            }
        );
        assert_eq!(
            untagged(b"* 5 XNUM\r\n"),
            UntaggedResponse::Other {
                keyword: "XNUM".into(),
                number: Some(5),
                data: Vec::new(),
            }
        );
    }

    #[test]
    fn test_trailing_garbage_is_error() {
        assert!(ResponseParser::parse(b"* 3 EXISTS junk\r\n").is_err());
    }

    #[test]
    fn test_invalid_start() {
        let err = ResponseParser::parse(b")\r\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: Some(_), .. }));
    }
}
