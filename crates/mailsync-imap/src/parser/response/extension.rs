//! Parsers for extension responses that are read as token trees first.
//!
//! Each function consumes the rest of the response line after the keyword.

use crate::Result;
use crate::parser::lexer::{Lexer, Value};
use crate::sort::ThreadNode;
use crate::types::{AclEntry, IdSet, Mailbox, NamespaceEntry, Namespaces, Quota, QuotaResource};

use super::types::{ESearchResponse, UntaggedResponse};

/// Thread lists nested deeper than this are rejected.
const MAX_THREAD_DEPTH: usize = 1024;

fn mailbox(lexer: &Lexer<'_>, value: Option<&Value>) -> Result<Mailbox> {
    value
        .and_then(Value::to_text)
        .map(|name| Mailbox::from_wire(&name))
        .ok_or_else(|| lexer.error("Expected mailbox name"))
}

/// `THREAD` (RFC 5256).
pub fn parse_thread(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    let mut threads = Vec::with_capacity(values.len());
    for value in &values {
        let items = value
            .as_list()
            .ok_or_else(|| lexer.error("Expected parenthesized thread"))?;
        threads.push(thread_from_list(lexer, items, 0)?);
    }
    Ok(UntaggedResponse::Thread(threads))
}

/// Leading numbers form a parent/child chain; trailing lists are the
/// children of the last number. A list without numbers has no message at
/// its root.
fn thread_from_list(lexer: &Lexer<'_>, items: &[Value], depth: usize) -> Result<ThreadNode> {
    if depth > MAX_THREAD_DEPTH {
        return Err(lexer.error("Thread nested too deeply"));
    }
    let split = items
        .iter()
        .position(|v| v.as_list().is_some())
        .unwrap_or(items.len());
    let (numbers, branches) = items.split_at(split);

    let mut children = Vec::with_capacity(branches.len());
    for branch in branches {
        let list = branch
            .as_list()
            .ok_or_else(|| lexer.error("Message number after thread branch"))?;
        children.push(thread_from_list(lexer, list, depth + 1)?);
    }

    let mut ids = Vec::with_capacity(numbers.len());
    for n in numbers {
        let id = n
            .as_number()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| lexer.error("Invalid message number in thread"))?;
        ids.push(id);
    }

    let Some((&last, parents)) = ids.split_last() else {
        return Ok(ThreadNode { id: None, children });
    };
    let mut node = ThreadNode {
        id: Some(last),
        children,
    };
    for &id in parents.iter().rev() {
        node = ThreadNode {
            id: Some(id),
            children: vec![node],
        };
    }
    Ok(node)
}

/// `ESEARCH` (RFC 4731).
pub fn parse_esearch(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    let mut response = ESearchResponse::default();
    let mut rest = values.as_slice();

    if let Some((Value::List(correlator), tail)) = rest.split_first() {
        if let [name, tag] = correlator.as_slice()
            && name.is_atom("TAG")
        {
            response.tag = tag.to_text();
        }
        rest = tail;
    }

    while let Some((item, tail)) = rest.split_first() {
        if item.is_atom("UID") {
            response.uid = true;
            rest = tail;
            continue;
        }
        let Some((value, tail)) = tail.split_first() else {
            return Err(lexer.error("ESEARCH item without value"));
        };
        let number = || value.as_number().and_then(|n| u32::try_from(n).ok());
        match item.as_str().map(str::to_ascii_uppercase).as_deref() {
            Some("MIN") => response.min = number(),
            Some("MAX") => response.max = number(),
            Some("COUNT") => response.count = number(),
            Some("MODSEQ") => response.mod_seq = value.as_number(),
            Some("ALL") => {
                let text = value
                    .to_text()
                    .ok_or_else(|| lexer.error("Invalid ESEARCH ALL"))?;
                response.all =
                    Some(IdSet::parse(&text).map_err(|_| lexer.error("Invalid ESEARCH ALL"))?);
            }
            _ => {}
        }
        rest = tail;
    }

    Ok(UntaggedResponse::ESearch(response))
}

/// `NAMESPACE` (RFC 2342).
pub fn parse_namespace(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    let mut groups = values.iter().map(|value| namespace_group(lexer, value));
    let personal = groups.next().transpose()?.unwrap_or_default();
    let other = groups.next().transpose()?.unwrap_or_default();
    let shared = groups.next().transpose()?.unwrap_or_default();
    Ok(UntaggedResponse::Namespace(Namespaces {
        personal,
        other,
        shared,
    }))
}

fn namespace_group(lexer: &Lexer<'_>, value: &Value) -> Result<Vec<NamespaceEntry>> {
    if value.is_nil() {
        return Ok(Vec::new());
    }
    let entries = value
        .as_list()
        .ok_or_else(|| lexer.error("Expected namespace list"))?;
    entries
        .iter()
        .map(|entry| match entry.as_list() {
            Some([prefix, delimiter, ..]) => Ok(NamespaceEntry {
                prefix: prefix.to_text().unwrap_or_default(),
                delimiter: delimiter.as_str().and_then(|d| d.chars().next()),
            }),
            _ => Err(lexer.error("Invalid namespace entry")),
        })
        .collect()
}

/// `ID` (RFC 2971).
pub fn parse_id(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    match values.first() {
        None | Some(Value::Nil) => Ok(UntaggedResponse::Id(None)),
        Some(Value::List(items)) => {
            let pairs = items
                .chunks(2)
                .filter_map(|pair| match pair {
                    [key, value] => Some((key.to_text()?, value.to_text())),
                    _ => None,
                })
                .collect();
            Ok(UntaggedResponse::Id(Some(pairs)))
        }
        Some(_) => Err(lexer.error("Invalid ID response")),
    }
}

/// `ENABLED` (RFC 5161).
pub fn parse_enabled(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    Ok(UntaggedResponse::Enabled(
        values
            .iter()
            .filter_map(Value::to_text)
            .map(|s| s.to_ascii_uppercase())
            .collect(),
    ))
}

/// `VANISHED` (RFC 7162).
pub fn parse_vanished(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    let (earlier, rest) = match values.split_first() {
        Some((Value::List(tag), rest)) => (tag.iter().any(|v| v.is_atom("EARLIER")), rest),
        _ => (false, values.as_slice()),
    };
    let text = rest
        .first()
        .and_then(Value::to_text)
        .ok_or_else(|| lexer.error("VANISHED without UIDs"))?;
    let uids = IdSet::parse(&text).map_err(|_| lexer.error("Invalid VANISHED UID set"))?;
    Ok(UntaggedResponse::Vanished { earlier, uids })
}

/// `QUOTA` (RFC 2087).
pub fn parse_quota(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    let root = values
        .first()
        .and_then(Value::to_text)
        .ok_or_else(|| lexer.error("QUOTA without root"))?;
    let list = values
        .get(1)
        .and_then(Value::as_list)
        .ok_or_else(|| lexer.error("QUOTA without resource list"))?;
    let mut resources = Vec::new();
    for triple in list.chunks(3) {
        match triple {
            [name, usage, limit] => resources.push(QuotaResource {
                name: name.to_text().unwrap_or_default().to_ascii_uppercase(),
                usage: usage
                    .as_number()
                    .ok_or_else(|| lexer.error("Invalid quota usage"))?,
                limit: limit
                    .as_number()
                    .ok_or_else(|| lexer.error("Invalid quota limit"))?,
            }),
            _ => return Err(lexer.error("Incomplete quota resource")),
        }
    }
    Ok(UntaggedResponse::Quota(Quota { root, resources }))
}

/// `QUOTAROOT` (RFC 2087).
pub fn parse_quota_root(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    let mailbox = mailbox(lexer, values.first())?;
    let roots = values.iter().skip(1).filter_map(Value::to_text).collect();
    Ok(UntaggedResponse::QuotaRoot { mailbox, roots })
}

/// `ACL` (RFC 4314).
pub fn parse_acl(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    let mailbox = mailbox(lexer, values.first())?;
    let mut entries = Vec::new();
    for pair in values.get(1..).unwrap_or_default().chunks(2) {
        match pair {
            [identifier, rights] => entries.push(AclEntry {
                identifier: identifier.to_text().unwrap_or_default(),
                rights: rights.to_text().unwrap_or_default(),
            }),
            _ => return Err(lexer.error("ACL identifier without rights")),
        }
    }
    Ok(UntaggedResponse::Acl { mailbox, entries })
}

/// `MYRIGHTS` (RFC 4314).
pub fn parse_my_rights(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let values = lexer.read_values_until_crlf()?;
    let mailbox = mailbox(lexer, values.first())?;
    let rights = values
        .get(1)
        .and_then(Value::to_text)
        .ok_or_else(|| lexer.error("MYRIGHTS without rights"))?;
    Ok(UntaggedResponse::MyRights { mailbox, rights })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn leaf(id: u32) -> ThreadNode {
        ThreadNode {
            id: Some(id),
            children: Vec::new(),
        }
    }

    fn node(id: Option<u32>, children: Vec<ThreadNode>) -> ThreadNode {
        ThreadNode { id, children }
    }

    #[test]
    fn test_thread_rfc_example() {
        let mut lexer = Lexer::new(b" (2)(3 6 (4 23)(44 7 96))\r\n");
        let UntaggedResponse::Thread(threads) = parse_thread(&mut lexer).unwrap() else {
            panic!("expected thread");
        };
        assert_eq!(
            threads,
            vec![
                leaf(2),
                node(
                    Some(3),
                    vec![node(
                        Some(6),
                        vec![
                            node(Some(4), vec![leaf(23)]),
                            node(Some(44), vec![node(Some(7), vec![leaf(96)])]),
                        ]
                    )]
                ),
            ]
        );
    }

    #[test]
    fn test_thread_dummy_root() {
        let mut lexer = Lexer::new(b" ((3)(5))\r\n");
        let UntaggedResponse::Thread(threads) = parse_thread(&mut lexer).unwrap() else {
            panic!("expected thread");
        };
        assert_eq!(threads, vec![node(None, vec![leaf(3), leaf(5)])]);
    }

    #[test]
    fn test_thread_empty() {
        let mut lexer = Lexer::new(b"\r\n");
        assert_eq!(parse_thread(&mut lexer).unwrap(), UntaggedResponse::Thread(Vec::new()));
    }

    #[test]
    fn test_esearch_full() {
        let mut lexer = Lexer::new(b" (TAG \"A282\") UID MIN 2 COUNT 3 ALL 2,10:11 MODSEQ 917162500\r\n");
        let UntaggedResponse::ESearch(r) = parse_esearch(&mut lexer).unwrap() else {
            panic!("expected esearch");
        };
        assert_eq!(r.tag.as_deref(), Some("A282"));
        assert!(r.uid);
        assert_eq!(r.min, Some(2));
        assert_eq!(r.count, Some(3));
        assert_eq!(r.all.unwrap().iter().collect::<Vec<_>>(), vec![2, 10, 11]);
        assert_eq!(r.mod_seq, Some(917162500));
    }

    #[test]
    fn test_esearch_no_matches() {
        let mut lexer = Lexer::new(b" (TAG \"A1\")\r\n");
        let UntaggedResponse::ESearch(r) = parse_esearch(&mut lexer).unwrap() else {
            panic!("expected esearch");
        };
        assert!(r.all.is_none());
        assert!(r.count.is_none());
    }

    #[test]
    fn test_namespace() {
        let mut lexer = Lexer::new(b" ((\"\" \"/\")) NIL ((\"Shared/\" \"/\"))\r\n");
        let UntaggedResponse::Namespace(ns) = parse_namespace(&mut lexer).unwrap() else {
            panic!("expected namespace");
        };
        assert_eq!(ns.personal[0].prefix, "");
        assert_eq!(ns.personal[0].delimiter, Some('/'));
        assert!(ns.other.is_empty());
        assert_eq!(ns.shared[0].prefix, "Shared/");
    }

    #[test]
    fn test_id() {
        let mut lexer = Lexer::new(b" (\"name\" \"Cyrus\" \"support-url\" NIL)\r\n");
        assert_eq!(
            parse_id(&mut lexer).unwrap(),
            UntaggedResponse::Id(Some(vec![
                ("name".into(), Some("Cyrus".into())),
                ("support-url".into(), None),
            ]))
        );
        let mut nil = Lexer::new(b" NIL\r\n");
        assert_eq!(parse_id(&mut nil).unwrap(), UntaggedResponse::Id(None));
    }

    #[test]
    fn test_vanished_earlier() {
        let mut lexer = Lexer::new(b" (EARLIER) 300:302,405\r\n");
        let UntaggedResponse::Vanished { earlier, uids } = parse_vanished(&mut lexer).unwrap() else {
            panic!("expected vanished");
        };
        assert!(earlier);
        assert_eq!(uids.len(), 4);
    }

    #[test]
    fn test_vanished_single_number() {
        let mut lexer = Lexer::new(b" 41\r\n");
        let UntaggedResponse::Vanished { earlier, uids } = parse_vanished(&mut lexer).unwrap() else {
            panic!("expected vanished");
        };
        assert!(!earlier);
        assert!(uids.contains(41));
    }

    #[test]
    fn test_quota_and_root() {
        let mut lexer = Lexer::new(b" \"\" (STORAGE 10 512 MESSAGE 3 1000)\r\n");
        let UntaggedResponse::Quota(quota) = parse_quota(&mut lexer).unwrap() else {
            panic!("expected quota");
        };
        assert_eq!(quota.root, "");
        assert_eq!(quota.resources.len(), 2);
        assert_eq!(quota.resources[0].limit, 512);

        let mut lexer = Lexer::new(b" INBOX \"\"\r\n");
        assert_eq!(
            parse_quota_root(&mut lexer).unwrap(),
            UntaggedResponse::QuotaRoot {
                mailbox: Mailbox::inbox(),
                roots: vec!["".into()],
            }
        );
    }

    #[test]
    fn test_acl_and_myrights() {
        let mut lexer = Lexer::new(b" INBOX Fred rwipsldexta anyone lr\r\n");
        let UntaggedResponse::Acl { entries, .. } = parse_acl(&mut lexer).unwrap() else {
            panic!("expected acl");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].identifier, "anyone");

        let mut lexer = Lexer::new(b" INBOX rwiptsldaex\r\n");
        let UntaggedResponse::MyRights { rights, .. } = parse_my_rights(&mut lexer).unwrap() else {
            panic!("expected myrights");
        };
        assert_eq!(rights, "rwiptsldaex");
    }

    #[test]
    fn test_acl_odd_pairs_is_error() {
        let mut lexer = Lexer::new(b" INBOX Fred\r\n");
        assert!(parse_acl(&mut lexer).is_err());
    }
}
