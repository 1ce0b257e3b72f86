//! IMAP token types.

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom (unquoted string without special characters).
    Atom(&'a str),
    /// Quoted string, unescaped.
    QuotedString(String),
    /// Literal payload of a `{n}` or `{n+}` string.
    Literal(Vec<u8>),
    /// Number. Narrowed by the readers that need 32-bit values.
    Number(u64),
    /// Opening parenthesis.
    LParen,
    /// Closing parenthesis.
    RParen,
    /// Opening bracket.
    LBracket,
    /// Closing bracket.
    RBracket,
    /// Space character.
    Space,
    /// Asterisk (untagged response prefix).
    Asterisk,
    /// Plus (continuation response prefix).
    Plus,
    /// NIL, matched case-insensitively.
    Nil,
    /// CRLF line ending.
    Crlf,
    /// End of input.
    Eof,
}

impl Token<'_> {
    /// Returns true for the tokens that end a response line.
    #[must_use]
    pub const fn is_line_end(&self) -> bool {
        matches!(self, Self::Crlf | Self::Eof)
    }
}
