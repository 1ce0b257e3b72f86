//! Token trees for generic response data.

/// A parsed response element.
///
/// Nested lists are kept as trees so extension data can be consumed without
/// a dedicated grammar, and written back in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Atom. A fetch attribute name such as `BODY[1.MIME]<0>` is one atom.
    Atom(String),
    /// Number.
    Number(u64),
    /// Quoted string, unescaped.
    Quoted(String),
    /// Literal payload.
    Literal(Vec<u8>),
    /// NIL.
    Nil,
    /// Parenthesized list.
    List(Vec<Self>),
    /// Bracketed list not attached to an atom.
    Section(Vec<Self>),
}

impl Value {
    /// Returns string content of atoms, quoted strings and UTF-8 literals.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Atom(s) | Self::Quoted(s) => Some(s),
            Self::Literal(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    /// Like [`Value::as_str`], but also renders numbers.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            other => other.as_str().map(str::to_string),
        }
    }

    /// Returns the numeric value of a number (or all-digit atom).
    #[must_use]
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Atom(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the members of a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true for NIL.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns true if this is an atom equal to `name`, ignoring case.
    #[must_use]
    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Self::Atom(s) if s.eq_ignore_ascii_case(name))
    }

    /// Writes the canonical wire form.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Atom(s) => out.extend_from_slice(s.as_bytes()),
            Self::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
            Self::Quoted(s) => {
                out.push(b'"');
                for b in s.bytes() {
                    if b == b'"' || b == b'\\' {
                        out.push(b'\\');
                    }
                    out.push(b);
                }
                out.push(b'"');
            }
            Self::Literal(data) => {
                out.extend_from_slice(format!("{{{}}}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
            }
            Self::Nil => out.extend_from_slice(b"NIL"),
            Self::List(items) => {
                out.push(b'(');
                write_values(items, out);
                out.push(b')');
            }
            Self::Section(items) => {
                out.push(b'[');
                write_values(items, out);
                out.push(b']');
            }
        }
    }

    /// Returns the canonical wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }
}

/// Writes values separated by single spaces.
pub fn write_values(values: &[Value], out: &mut Vec<u8>) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        value.write_to(out);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Atom("INBOX".into()).as_str(), Some("INBOX"));
        assert_eq!(Value::Number(7).to_text().unwrap(), "7");
        assert_eq!(Value::Atom("42".into()).as_number(), Some(42));
        assert!(Value::Nil.is_nil());
        assert!(Value::Atom("uid".into()).is_atom("UID"));
        assert!(Value::Literal(vec![0xff]).as_str().is_none());
    }

    #[test]
    fn test_write_nested() {
        let value = Value::List(vec![
            Value::Atom("FLAGS".into()),
            Value::List(vec![Value::Atom("\\Seen".into())]),
            Value::Quoted("a \"b\"".into()),
            Value::Nil,
        ]);
        assert_eq!(value.to_bytes(), b"(FLAGS (\\Seen) \"a \\\"b\\\"\" NIL)");
    }

    #[test]
    fn test_write_literal() {
        let value = Value::Literal(b"a\r\nb".to_vec());
        assert_eq!(value.to_bytes(), b"{4}\r\na\r\nb");
    }
}
