//! Parser helper functions.

use crate::parser::lexer::{Lexer, Token, Value};
use crate::types::{
    Capability, CapabilitySet, Flag, Flags, IdSet, ListResponse, Mailbox, MailboxAttribute,
    MailboxStatus, ResponseCode, SeqNum, Uid, UidValidity,
};
use crate::Result;

/// Parses a bracketed response code.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let upper = atom.to_ascii_uppercase();

    let code = match upper.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "UIDNOTSTICKY" => ResponseCode::UidNotSticky,
        "CLOSED" => ResponseCode::Closed,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidNext(Uid::new(n).ok_or_else(|| lexer.error("Invalid UIDNEXT 0"))?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidValidity(
                UidValidity::new(n).ok_or_else(|| lexer.error("Invalid UIDVALIDITY 0"))?,
            )
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::Unseen(
                SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))?,
            )
        }
        "HIGHESTMODSEQ" => {
            lexer.expect_space()?;
            ResponseCode::HighestModSeq(lexer.read_number64()?)
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?)
        }
        "BADCHARSET" => {
            let mut charsets = Vec::new();
            if lexer.peek() == Some(b' ') {
                lexer.advance();
                if let Some(items) = lexer.read_value()?.as_list() {
                    charsets = items.iter().filter_map(Value::to_text).collect();
                }
            }
            ResponseCode::BadCharset(charsets)
        }
        "APPENDUID" => {
            lexer.expect_space()?;
            let uid_validity = read_uid_validity(lexer)?;
            lexer.expect_space()?;
            let uids = read_id_set(lexer)?;
            ResponseCode::AppendUid { uid_validity, uids }
        }
        "COPYUID" => {
            lexer.expect_space()?;
            let uid_validity = read_uid_validity(lexer)?;
            lexer.expect_space()?;
            let source = read_id_set(lexer)?;
            lexer.expect_space()?;
            let destination = read_id_set(lexer)?;
            ResponseCode::CopyUid {
                uid_validity,
                source,
                destination,
            }
        }
        "MODIFIED" => {
            lexer.expect_space()?;
            ResponseCode::Modified(read_id_set(lexer)?)
        }
        _ => {
            let before = lexer.remaining();
            skip_to_bracket(lexer);
            let consumed = before.len() - lexer.remaining().len();
            let rest = String::from_utf8_lossy(&before[..consumed]).trim().to_string();
            if rest.is_empty() {
                ResponseCode::Unknown(atom.to_string())
            } else {
                ResponseCode::Unknown(format!("{atom} {rest}"))
            }
        }
    };

    skip_to_bracket(lexer);
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

fn skip_to_bracket(lexer: &mut Lexer<'_>) {
    while !matches!(lexer.peek(), Some(b']' | b'\r') | None) {
        lexer.advance();
    }
}

fn read_uid_validity(lexer: &mut Lexer<'_>) -> Result<UidValidity> {
    let n = lexer.read_number()?;
    UidValidity::new(n).ok_or_else(|| lexer.error("Invalid UIDVALIDITY 0"))
}

/// Reads a UID set such as `4` or `3955:3957,3960`.
pub fn read_id_set(lexer: &mut Lexer<'_>) -> Result<IdSet> {
    match lexer.next_token()? {
        Token::Number(n) => {
            let text = n.to_string();
            IdSet::parse(&text).map_err(|_| lexer.error(&format!("Invalid id set: {text}")))
        }
        Token::Atom(s) => IdSet::parse(s).map_err(|_| lexer.error(&format!("Invalid id set: {s}"))),
        token => Err(lexer.error(&format!("Expected id set, got {token:?}"))),
    }
}

/// Parses capability data: space-separated atoms up to `]` or CRLF.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<CapabilitySet> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        match lexer.next_token()? {
            Token::Atom(s) => caps.push(Capability::parse(s)),
            Token::Crlf => break,
            _ => {}
        }
    }

    Ok(caps.into_iter().collect())
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Space => {}
            token => {
                return Err(lexer.error(&format!("Unexpected token in flag list: {token:?}")));
            }
        }
    }

    Ok(flags)
}

/// Parses a LIST or LSUB response body.
pub fn parse_list_response(lexer: &mut Lexer<'_>) -> Result<ListResponse> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => attributes.push(MailboxAttribute::parse(s)),
            Token::Space => {}
            token => {
                return Err(lexer.error(&format!("Unexpected token in LIST attributes: {token:?}")));
            }
        }
    }

    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => return Err(lexer.error(&format!("Expected delimiter, got {token:?}"))),
    };

    lexer.expect_space()?;
    let name = lexer.read_astring()?;

    // LIST-EXTENDED data is not interpreted.
    lexer.read_values_until_crlf()?;

    Ok(ListResponse {
        attributes,
        delimiter,
        mailbox: Mailbox::from_wire(&name),
    })
}

/// Parses the ids of a SEARCH or SORT response and its optional
/// `(MODSEQ n)` suffix.
pub fn parse_id_list(lexer: &mut Lexer<'_>) -> Result<(Vec<u32>, Option<u64>)> {
    let mut ids = Vec::new();
    let mut mod_seq = None;

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        match lexer.peek() {
            Some(b'(') => {
                let value = lexer.read_value()?;
                if let Some([name, n]) = value.as_list()
                    && name.is_atom("MODSEQ")
                {
                    mod_seq = n.as_number();
                }
            }
            Some(b'\r') | None => break,
            _ => ids.push(lexer.read_number()?),
        }
    }

    Ok((ids, mod_seq))
}

/// Parses a STATUS response body.
pub fn parse_status_response(lexer: &mut Lexer<'_>) -> Result<MailboxStatus> {
    let name = lexer.read_astring()?;
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut status = MailboxStatus {
        mailbox: Some(Mailbox::from_wire(&name)),
        ..MailboxStatus::default()
    };

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(item) => {
                lexer.expect_space()?;
                let value = lexer.read_number64()?;
                let narrow = u32::try_from(value).ok();
                match item.to_ascii_uppercase().as_str() {
                    "MESSAGES" => status.messages = narrow,
                    "RECENT" => status.recent = narrow,
                    "UIDNEXT" => status.uid_next = narrow,
                    "UIDVALIDITY" => status.uid_validity = narrow,
                    "UNSEEN" => status.unseen = narrow,
                    "HIGHESTMODSEQ" => status.highest_mod_seq = Some(value),
                    _ => {}
                }
            }
            token => return Err(lexer.error(&format!("Unexpected token in STATUS: {token:?}"))),
        }
    }

    Ok(status)
}

/// Reads text until CRLF.
pub fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();

    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end);

    if lexer.peek() == Some(b'\r') {
        lexer.skip(2);
    }

    String::from_utf8_lossy(&remaining[..end]).into_owned()
}
