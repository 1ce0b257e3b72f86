//! Base subject extraction (RFC 5256 section 2.1).

/// Returns the base subject used by SUBJECT sorting and threading.
///
/// Strips reply and forward markers, `[blob]` prefixes, trailing `(fwd)`
/// and `[fwd: ...]` wrappers until nothing more changes.
#[must_use]
pub fn base_subject(subject: &str) -> String {
    let mut s = collapse_whitespace(subject);
    loop {
        // Trailer: "(fwd)" and whitespace at the end.
        loop {
            let trimmed = s.trim_end();
            let cut = trimmed.len().saturating_sub(5);
            if trimmed
                .get(cut..)
                .is_some_and(|tail| tail.eq_ignore_ascii_case("(fwd)"))
            {
                s = trimmed[..cut].to_string();
            } else {
                s = trimmed.to_string();
                break;
            }
        }

        // Leaders and leading blobs.
        loop {
            let before = s.len();
            while let Some(rest) = strip_leader(&s) {
                s = rest.to_string();
            }
            if let Some(rest) = strip_blob(&s)
                && !rest.is_empty()
            {
                s = rest.to_string();
            }
            if s.len() == before {
                break;
            }
        }

        // "[fwd: ...]" wrapper.
        if s.len() >= 6
            && s.get(..5).is_some_and(|head| head.eq_ignore_ascii_case("[fwd:"))
            && s.ends_with(']')
        {
            s = s[5..s.len() - 1].trim().to_string();
            continue;
        }
        break;
    }
    s
}

fn collapse_whitespace(s: &str) -> String {
    s.split(|c: char| c == ' ' || c == '\t' || c == '\r' || c == '\n')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips one `*(blob / WSP) ("re" / "fw" / "fwd") *WSP [blob] ":"` leader.
fn strip_leader(s: &str) -> Option<&str> {
    let mut rest = s.trim_start();
    while let Some(after) = strip_blob(rest) {
        rest = after;
    }
    let lower = rest.get(..3).map(str::to_ascii_lowercase);
    let tag_len = match lower.as_deref() {
        Some("fwd") => 3,
        Some(p) if p.starts_with("re") || p.starts_with("fw") => 2,
        _ => {
            let two = rest.get(..2)?.to_ascii_lowercase();
            if two == "re" || two == "fw" { 2 } else { return None }
        }
    };
    let mut after = rest[tag_len..].trim_start();
    if let Some(b) = strip_blob(after) {
        after = b;
    }
    after.strip_prefix(':').map(str::trim_start)
}

/// Strips one leading `[blob]` and the whitespace after it.
fn strip_blob(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('[')?;
    let end = inner.find(|c| c == ']' || c == '[')?;
    if inner.as_bytes()[end] != b']' {
        return None;
    }
    Some(inner[end + 1..].trim_start())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_prefixes() {
        assert_eq!(base_subject("Re: hello"), "hello");
        assert_eq!(base_subject("RE: Re: FWD: hello"), "hello");
        assert_eq!(base_subject("Fw: hello"), "hello");
        assert_eq!(base_subject("re [2]: hello"), "hello");
    }

    #[test]
    fn test_blob_prefixes() {
        assert_eq!(base_subject("[list] Re: hello"), "hello");
        assert_eq!(base_subject("[list] [other] topic"), "topic");
        assert_eq!(base_subject("[only]"), "[only]");
    }

    #[test]
    fn test_trailer_and_wrapper() {
        assert_eq!(base_subject("hello (fwd)"), "hello");
        assert_eq!(base_subject("[Fwd: Re: hello]"), "hello");
        assert_eq!(base_subject("  many   spaces\there  "), "many spaces here");
    }

    #[test]
    fn test_words_starting_with_re_are_kept() {
        assert_eq!(base_subject("Report: numbers"), "Report: numbers");
        assert_eq!(base_subject("refund"), "refund");
        assert_eq!(base_subject(""), "");
    }
}
