//! FETCH response parsing.

use crate::Result;
use crate::parser::lexer::{Lexer, Token, Value};
use crate::types::Uid;

use super::helpers::parse_flag_list;
use super::types::{Address, BodyStructure, Envelope, FetchItem};

/// Body structures nested deeper than this are rejected.
const MAX_BODY_DEPTH: usize = 64;

/// Parses the parenthesized item list of a FETCH response.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.peek() {
            Some(b')') => {
                lexer.advance();
                break;
            }
            Some(b' ') => {
                lexer.advance();
                continue;
            }
            Some(b'\r') | None => return Err(lexer.error("Unterminated FETCH response")),
            Some(_) => {}
        }

        let mark = lexer.checkpoint();
        let name = lexer.read_atom_string()?;
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "FLAGS" => {
                lexer.expect_space()?;
                items.push(FetchItem::Flags(parse_flag_list(lexer)?));
            }
            "UID" => {
                lexer.expect_space()?;
                let n = lexer.read_number()?;
                let uid = Uid::new(n)
                    .ok_or_else(|| lexer.error(&format!("invalid UID value: {n} (UID cannot be 0)")))?;
                items.push(FetchItem::Uid(uid));
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822Size(lexer.read_number()?));
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                if let Some(date) = lexer.read_nstring()? {
                    items.push(FetchItem::InternalDate(date));
                }
            }
            "ENVELOPE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Envelope(Box::new(parse_envelope(lexer)?)));
            }
            "BODYSTRUCTURE" => {
                lexer.expect_space()?;
                items.push(FetchItem::BodyStructure(parse_body_structure(lexer)?));
            }
            // Without a section, BODY is the non-extensible body structure.
            "BODY" if lexer.peek() != Some(b'[') => {
                lexer.expect_space()?;
                items.push(FetchItem::BodyStructure(parse_body_structure(lexer)?));
            }
            "BODY" | "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                let (section, origin) = match upper.as_str() {
                    "RFC822" => (String::new(), None),
                    "RFC822.HEADER" => ("HEADER".to_string(), None),
                    "RFC822.TEXT" => ("TEXT".to_string(), None),
                    _ => parse_body_section_and_origin(lexer)?,
                };
                lexer.expect_space()?;
                let data = read_section_data(lexer)?;
                items.push(FetchItem::Body {
                    section,
                    origin,
                    data,
                });
            }
            "MODSEQ" => {
                lexer.expect_space()?;
                lexer.expect(Token::LParen)?;
                let n = lexer.read_number64()?;
                lexer.expect(Token::RParen)?;
                items.push(FetchItem::ModSeq(n));
            }
            _ => {
                lexer.rewind(mark);
                let name = match lexer.read_value()? {
                    Value::Atom(name) => name,
                    other => return Err(lexer.error(&format!("Expected fetch attribute, got {other:?}"))),
                };
                lexer.expect_space()?;
                let value = lexer.read_value()?;
                items.push(FetchItem::Extension { name, value });
            }
        }
    }

    Ok(items)
}

fn read_section_data(lexer: &mut Lexer<'_>) -> Result<Option<Vec<u8>>> {
    match lexer.next_token()? {
        Token::Literal(data) => Ok(Some(data)),
        Token::QuotedString(s) => Ok(Some(s.into_bytes())),
        Token::Nil => Ok(None),
        token => Err(lexer.error(&format!("Expected section data, got {token:?}"))),
    }
}

/// Parses `[section]` and an optional `<origin>` after BODY.
///
/// The section is returned uppercased with whitespace collapsed, so it can
/// be used as a lookup key.
fn parse_body_section_and_origin(lexer: &mut Lexer<'_>) -> Result<(String, Option<u32>)> {
    lexer.expect(Token::LBracket)?;

    let mut raw = Vec::new();
    loop {
        match lexer.advance() {
            Some(b']') => break,
            Some(b'\r') | None => return Err(lexer.error("Unterminated body section")),
            Some(b) => raw.push(b),
        }
    }
    let section = normalize_section(&String::from_utf8_lossy(&raw));

    let mut origin = None;
    if lexer.peek() == Some(b'<') {
        lexer.advance();
        let mut digits = String::new();
        loop {
            match lexer.advance() {
                Some(b'>') => break,
                Some(b) if b.is_ascii_digit() => digits.push(char::from(b)),
                _ => return Err(lexer.error("Invalid partial origin")),
            }
        }
        origin = Some(
            digits
                .parse()
                .map_err(|_| lexer.error("Invalid partial origin"))?,
        );
    }

    Ok((section, origin))
}

/// Uppercases a section specifier and collapses runs of whitespace.
#[must_use]
pub fn normalize_section(section: &str) -> String {
    section
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Parses an envelope structure.
pub fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect(Token::LParen)?;

    let date = lexer.read_nstring()?;
    lexer.expect_space()?;

    let subject = lexer.read_nstring()?;
    lexer.expect_space()?;

    let from = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let sender = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let reply_to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let cc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let bcc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let in_reply_to = lexer.read_nstring()?;
    lexer.expect_space()?;

    let message_id = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

/// Parses an address list (NIL or a list of addresses).
pub fn parse_address_list(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();

            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b'(') => addresses.push(parse_address(lexer)?),
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => return Err(lexer.error("Unterminated address list")),
                }
            }

            Ok(addresses)
        }
        token => Err(lexer.error(&format!("Expected address list, got {token:?}"))),
    }
}

/// Parses a single address.
pub fn parse_address(lexer: &mut Lexer<'_>) -> Result<Address> {
    lexer.expect(Token::LParen)?;

    let name = lexer.read_nstring()?;
    lexer.expect_space()?;

    let adl = lexer.read_nstring()?;
    lexer.expect_space()?;

    let mailbox = lexer.read_nstring()?;
    lexer.expect_space()?;

    let host = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
}

/// Parses a BODY or BODYSTRUCTURE value.
///
/// Extension data (MD5, disposition, language, location) is consumed but
/// not kept.
pub fn parse_body_structure(lexer: &mut Lexer<'_>) -> Result<BodyStructure> {
    parse_body(lexer, 0)
}

fn parse_body(lexer: &mut Lexer<'_>, depth: usize) -> Result<BodyStructure> {
    if depth > MAX_BODY_DEPTH {
        return Err(lexer.error("Body structure nested too deeply"));
    }
    lexer.expect(Token::LParen)?;

    if lexer.peek() == Some(b'(') {
        let mut bodies = Vec::new();
        while lexer.peek() == Some(b'(') {
            bodies.push(parse_body(lexer, depth + 1)?);
            lexer.skip_spaces();
        }

        let subtype = lexer.read_nstring()?.unwrap_or_default().to_ascii_uppercase();
        skip_extension_data(lexer)?;

        return Ok(BodyStructure::Multipart { bodies, subtype });
    }

    let media_type = lexer.read_nstring()?.unwrap_or_default().to_ascii_uppercase();
    lexer.expect_space()?;
    let media_subtype = lexer.read_nstring()?.unwrap_or_default().to_ascii_uppercase();
    lexer.expect_space()?;
    let params = parse_body_params(lexer)?;
    lexer.expect_space()?;
    let id = lexer.read_nstring()?;
    lexer.expect_space()?;
    let description = lexer.read_nstring()?;
    lexer.expect_space()?;
    let encoding = lexer.read_nstring()?.unwrap_or_default();
    lexer.expect_space()?;
    let size = lexer.read_number()?;

    let structure = match (media_type.as_str(), media_subtype.as_str()) {
        ("TEXT", _) => {
            lexer.expect_space()?;
            let lines = lexer.read_number()?;
            BodyStructure::Text {
                subtype: media_subtype,
                params,
                id,
                description,
                encoding,
                size,
                lines,
            }
        }
        ("MESSAGE", "RFC822") => {
            lexer.expect_space()?;
            let envelope = parse_envelope(lexer)?;
            lexer.expect_space()?;
            let body = parse_body(lexer, depth + 1)?;
            lexer.expect_space()?;
            let lines = lexer.read_number()?;
            BodyStructure::Message {
                params,
                encoding,
                size,
                envelope: Box::new(envelope),
                body: Box::new(body),
                lines,
            }
        }
        _ => BodyStructure::Basic {
            media_type,
            media_subtype,
            params,
            id,
            description,
            encoding,
            size,
        },
    };

    skip_extension_data(lexer)?;
    Ok(structure)
}

/// Parses body parameters: NIL or `(key value key value ...)`.
fn parse_body_params(lexer: &mut Lexer<'_>) -> Result<Vec<(String, String)>> {
    let value = lexer.read_value()?;
    let Some(items) = value.as_list() else {
        return Ok(Vec::new());
    };
    Ok(items
        .chunks(2)
        .filter_map(|pair| match pair {
            [key, value] => Some((key.to_text()?, value.to_text().unwrap_or_default())),
            _ => None,
        })
        .collect())
}

/// Consumes values up to and including the closing parenthesis.
fn skip_extension_data(lexer: &mut Lexer<'_>) -> Result<()> {
    loop {
        lexer.skip_spaces();
        match lexer.peek() {
            Some(b')') => {
                lexer.advance();
                return Ok(());
            }
            Some(b'\r') | None => return Err(lexer.error("Unterminated body structure")),
            Some(_) => {
                lexer.read_value()?;
            }
        }
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

    fn parse(data: &[u8]) -> Vec<FetchItem> {
        parse_fetch_response(&mut Lexer::new(data)).unwrap()
    }

    #[test]
    fn test_parse_fetch_uid_valid() {
        let items = parse(b"(UID 123 FLAGS (\\Seen))");
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], FetchItem::Uid(_)));
    }

    #[test]
    fn test_parse_fetch_uid_zero_rejected() {
        let result = parse_fetch_response(&mut Lexer::new(b"(UID 0)"));
        assert!(result.unwrap_err().to_string().contains("UID"));
    }

    #[test]
    fn test_parse_fetch_rfc822_size() {
        let items = parse(b"(RFC822.SIZE 1234)");
        assert_eq!(items, vec![FetchItem::Rfc822Size(1234)]);
    }

    #[test]
    fn test_parse_fetch_modseq_64_bit() {
        let items = parse(b"(MODSEQ (90000000000))");
        assert_eq!(items, vec![FetchItem::ModSeq(90_000_000_000)]);
    }

    #[test]
    fn test_section_with_origin() {
        let items = parse(b"(BODY[TEXT]<100> {3}\r\nabc)");
        assert_eq!(
            items,
            vec![FetchItem::Body {
                section: "TEXT".into(),
                origin: Some(100),
                data: Some(b"abc".to_vec()),
            }]
        );
    }

    #[test]
    fn test_header_fields_section_normalized() {
        let items = parse(b"(BODY[HEADER.FIELDS (References)] {15}\r\nReferences: x\r\n)");
        match &items[0] {
            FetchItem::Body { section, data, .. } => {
                assert_eq!(section, "HEADER.FIELDS (REFERENCES)");
                assert_eq!(data.as_deref().unwrap(), b"References: x\r\n");
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_rfc822_aliases() {
        let items = parse(b"(RFC822.HEADER \"a\" RFC822 NIL)");
        assert_eq!(
            items,
            vec![
                FetchItem::Body {
                    section: "HEADER".into(),
                    origin: None,
                    data: Some(b"a".to_vec()),
                },
                FetchItem::Body {
                    section: "".into(),
                    origin: None,
                    data: None,
                },
            ]
        );
    }

    #[test]
    fn test_body_without_section_is_structure() {
        let items = parse(b"(BODY (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92))");
        match &items[0] {
            FetchItem::BodyStructure(BodyStructure::Text { subtype, size, lines, params, .. }) => {
                assert_eq!(subtype, "PLAIN");
                assert_eq!(*size, 3028);
                assert_eq!(*lines, 92);
                assert_eq!(params, &vec![("CHARSET".to_string(), "US-ASCII".to_string())]);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_multipart_with_extension_data() {
        let data = b"(BODYSTRUCTURE ((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 10 1 NIL NIL NIL)(\"IMAGE\" \"PNG\" (\"NAME\" \"a.png\") NIL NIL \"BASE64\" 200 NIL (\"attachment\" (\"filename\" \"a.png\")) NIL) \"MIXED\" (\"BOUNDARY\" \"x\") NIL NIL))";
        let items = parse(data);
        match &items[0] {
            FetchItem::BodyStructure(BodyStructure::Multipart { bodies, subtype }) => {
                assert_eq!(subtype, "MIXED");
                assert_eq!(bodies.len(), 2);
                assert!(matches!(&bodies[1], BodyStructure::Basic { media_type, .. } if media_type == "IMAGE"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_message_rfc822_part() {
        let data = b"(BODYSTRUCTURE (\"MESSAGE\" \"RFC822\" NIL NIL NIL \"7BIT\" 500 (NIL \"inner\" NIL NIL NIL NIL NIL NIL NIL NIL) (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 20 2) 12))";
        match &parse(data)[0] {
            FetchItem::BodyStructure(BodyStructure::Message { envelope, body, lines, .. }) => {
                assert_eq!(envelope.subject.as_deref(), Some("inner"));
                assert!(matches!(**body, BodyStructure::Text { .. }));
                assert_eq!(*lines, 12);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_attribute_kept() {
        let items = parse(b"(X-GM-LABELS (\\Inbox \"Work\") UID 4)");
        assert_eq!(
            items[0],
            FetchItem::Extension {
                name: "X-GM-LABELS".into(),
                value: Value::List(vec![Value::Atom("\\Inbox".into()), Value::Quoted("Work".into())]),
            }
        );
        assert!(matches!(items[1], FetchItem::Uid(_)));
    }

    #[test]
    fn test_unknown_attribute_with_section() {
        let items = parse(b"(BINARY[1] {2}\r\nhi)");
        assert_eq!(
            items[0],
            FetchItem::Extension {
                name: "BINARY[1]".into(),
                value: Value::Literal(b"hi".to_vec()),
            }
        );
    }

    #[test]
    fn test_parse_envelope_with_group() {
        let data = b"(\"date\" \"subject\" ((\"A\" NIL \"a\" \"x.org\")) NIL NIL ((NIL NIL \"team\" NIL)(NIL NIL \"b\" \"y.org\")(NIL NIL NIL NIL)) NIL NIL \"<r@x>\" \"<m@x>\")";
        let envelope = parse_envelope(&mut Lexer::new(data)).unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("subject"));
        assert_eq!(envelope.from[0].email().as_deref(), Some("a@x.org"));
        assert_eq!(envelope.to.len(), 3);
        assert!(envelope.to[0].is_group_marker());
        assert_eq!(envelope.message_id.as_deref(), Some("<m@x>"));
    }

    #[test]
    fn test_unterminated_fetch_is_error() {
        assert!(parse_fetch_response(&mut Lexer::new(b"(UID 4 FLAGS (\\Seen)\r\n")).is_err());
    }
}
