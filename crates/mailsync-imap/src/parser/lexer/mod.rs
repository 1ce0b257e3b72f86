//! IMAP lexer for tokenizing server responses.
//!
//! The lexer works on one complete response: the response line plus any
//! literal payloads, as assembled by the framed stream. Tokens are produced
//! lazily; the parser peeks at raw bytes and can rewind to a checkpoint
//! when it needs to try an alternative reading.

#![allow(clippy::missing_errors_doc)]

mod token;
mod value;

pub use token::Token;
pub use value::{Value, write_values};

use crate::{Error, Result};

/// IMAP lexer state.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns a position that [`Lexer::rewind`] can return to.
    #[must_use]
    pub const fn checkpoint(&self) -> usize {
        self.pos
    }

    /// Moves back to a position returned by [`Lexer::checkpoint`].
    pub fn rewind(&mut self, checkpoint: usize) {
        self.pos = checkpoint.min(self.input.len());
    }

    /// Returns the remaining input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true if at end of input.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Peeks at the byte at offset from current position.
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Returns true if the next token is CRLF or end of input.
    #[must_use]
    pub fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some(b'\r'))
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Skips n bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("Expected LF after CR"))
                }
            }
            b' ' => {
                self.advance();
                Ok(Token::Space)
            }
            b'(' => {
                self.advance();
                Ok(Token::LParen)
            }
            b')' => {
                self.advance();
                Ok(Token::RParen)
            }
            b'[' => {
                self.advance();
                Ok(Token::LBracket)
            }
            b']' => {
                self.advance();
                Ok(Token::RBracket)
            }
            b'*' => {
                self.advance();
                Ok(Token::Asterisk)
            }
            b'+' => {
                self.advance();
                Ok(Token::Plus)
            }
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal_prefix(),
            b'0'..=b'9' => self.read_number_or_atom(),
            _ if is_atom_char(byte) => self.read_atom(),
            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    fn read_quoted_string(&mut self) -> Result<Token<'a>> {
        self.advance();
        let mut result = Vec::new();

        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => return Err(self.error(&format!("Invalid escape: \\{}", c as char))),
                    None => return Err(self.error("Unterminated quoted string")),
                },
                Some(b'\r' | b'\n') | None => {
                    return Err(self.error("Unterminated quoted string"));
                }
                Some(c) => result.push(c),
            }
        }

        // Servers occasionally put raw 8-bit text in quoted strings.
        let s = match String::from_utf8(result) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Ok(Token::QuotedString(s))
    }

    fn read_literal_prefix(&mut self) -> Result<Token<'a>> {
        self.advance();
        let start = self.pos;

        while let Some(b'0'..=b'9') = self.peek() {
            self.advance();
        }
        let digits = &self.input[start..self.pos];
        if self.peek() == Some(b'+') {
            self.advance();
        }
        if self.advance() != Some(b'}') {
            return Err(self.error("Invalid literal size"));
        }

        let size: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("Invalid literal size number"))?;

        if self.advance() != Some(b'\r') || self.advance() != Some(b'\n') {
            return Err(self.error("Expected CRLF after literal size"));
        }

        let end = self
            .pos
            .checked_add(size)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| self.error("Incomplete literal data"))?;
        let data = self.input[self.pos..end].to_vec();
        self.pos = end;

        Ok(Token::Literal(data))
    }

    fn read_number_or_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let mut all_digits = true;

        while let Some(b) = self.peek() {
            if !is_atom_char(b) {
                break;
            }
            all_digits &= b.is_ascii_digit();
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if all_digits {
            let n: u64 = s.parse().map_err(|_| self.error("Number too large"))?;
            Ok(Token::Number(n))
        } else {
            Ok(Token::Atom(s))
        }
    }

    fn read_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;

        while let Some(b) = self.peek() {
            if !is_atom_char(b) {
                break;
            }
            self.advance();
        }

        // `\*` (PERMANENTFLAGS) is a flag even though `*` is a list wildcard.
        if self.pos == start + 1 && self.input[start] == b'\\' && self.peek() == Some(b'*') {
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if s.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(s))
        }
    }

    /// Creates a parse error at the current position, carrying the input.
    #[must_use]
    pub fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
            line: Some(self.input.to_vec()),
        }
    }

    /// Expects and consumes a specific token.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {expected:?}, got {token:?}")))
        }
    }

    /// Expects and consumes a space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Expects and consumes CRLF.
    pub fn expect_crlf(&mut self) -> Result<()> {
        self.expect(Token::Crlf)
    }

    /// Reads an astring (atom, number, quoted string or literal).
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            Token::QuotedString(s) => Ok(s),
            Token::Literal(data) => Ok(String::from_utf8_lossy(&data).into_owned()),
            token => Err(self.error(&format!("Expected astring, got {token:?}"))),
        }
    }

    /// Reads an nstring (NIL or string).
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s)),
            Token::Literal(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            token => Err(self.error(&format!("Expected nstring, got {token:?}"))),
        }
    }

    /// Reads a 32-bit number. Values beyond `u32::MAX` are protocol errors.
    pub fn read_number(&mut self) -> Result<u32> {
        let n = self.read_number64()?;
        u32::try_from(n).map_err(|_| self.error(&format!("Number out of range: {n}")))
    }

    /// Reads a 64-bit number (MODSEQ values).
    pub fn read_number64(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("Expected number, got {token:?}"))),
        }
    }

    /// Reads an atom.
    pub fn read_atom_string(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("Expected atom, got {token:?}"))),
        }
    }

    /// Skips optional spaces.
    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance();
        }
    }

    /// Reads one value, building nested lists into a tree.
    ///
    /// Nesting is tracked on an explicit stack, so depth is limited only by
    /// memory. An atom directly followed by `[` absorbs the bracketed text
    /// and an optional `<origin>` suffix.
    pub fn read_value(&mut self) -> Result<Value> {
        let mut stack: Vec<(u8, Vec<Value>)> = Vec::new();

        loop {
            if let Some(&(close, _)) = stack.last() {
                match self.peek() {
                    Some(b' ') => {
                        self.advance();
                        continue;
                    }
                    Some(b) if b == close => {
                        self.advance();
                        if let Some((close, items)) = stack.pop() {
                            let value = if close == b')' {
                                Value::List(items)
                            } else {
                                Value::Section(items)
                            };
                            match stack.last_mut() {
                                Some((_, parent)) => parent.push(value),
                                None => return Ok(value),
                            }
                        }
                        continue;
                    }
                    Some(b')' | b']') => return Err(self.error("Unbalanced bracket in list")),
                    None | Some(b'\r') => return Err(self.error("Unterminated list")),
                    Some(_) => {}
                }
            }

            let value = match self.next_token()? {
                Token::LParen => {
                    stack.push((b')', Vec::new()));
                    continue;
                }
                Token::LBracket => {
                    stack.push((b']', Vec::new()));
                    continue;
                }
                Token::RParen => return Err(self.error("Unmatched ')'")),
                Token::RBracket => return Err(self.error("Unmatched ']'")),
                Token::Atom(atom) => Value::Atom(self.extend_atom(atom)?),
                Token::Number(n) => Value::Number(n),
                Token::QuotedString(s) => Value::Quoted(s),
                Token::Literal(data) => Value::Literal(data),
                Token::Nil => Value::Nil,
                Token::Asterisk => Value::Atom("*".to_string()),
                Token::Plus => Value::Atom("+".to_string()),
                token @ (Token::Space | Token::Crlf | Token::Eof) => {
                    return Err(self.error(&format!("Expected value, got {token:?}")));
                }
            };

            match stack.last_mut() {
                Some((_, items)) => items.push(value),
                None => return Ok(value),
            }
        }
    }

    fn extend_atom(&mut self, atom: &str) -> Result<String> {
        let mut text = atom.to_string();
        if self.peek() != Some(b'[') {
            return Ok(text);
        }
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.advance() {
                Some(b'[') => depth += 1,
                Some(b']') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Some(b'\r') | None => return Err(self.error("Unterminated section")),
                Some(_) => {}
            }
        }
        if self.peek() == Some(b'<') {
            while let Some(b) = self.advance() {
                if b == b'>' {
                    break;
                }
                if b == b'\r' {
                    return Err(self.error("Unterminated partial range"));
                }
            }
        }
        text.push_str(&String::from_utf8_lossy(&self.input[start..self.pos]));
        Ok(text)
    }

    /// Reads space-separated values up to CRLF or end of input.
    pub fn read_values_until_crlf(&mut self) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        loop {
            self.skip_spaces();
            if self.at_line_end() {
                if !self.is_eof() {
                    self.expect_crlf()?;
                }
                return Ok(values);
            }
            values.push(self.read_value()?);
        }
    }
}

/// Returns true if the byte is a valid atom character.
///
/// `\` is accepted so flags like `\Seen` lex as single atoms.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21..=0x27 |
        0x2B..=0x5A |
        0x5C |
        0x5E..=0x7A |
        0x7C |
        0x7D |
        0x7E
    ) && b != b'"'
        && b != b'%'
}
