//! Client-side THREAD (RFC 5256).
//!
//! REFERENCES links messages through their Message-ID, References and
//! In-Reply-To headers into a forest of containers, prunes the dummy
//! containers left for messages that are not in the mailbox, and sorts
//! siblings by sent date. Subjects are not merged across threads.
//!
//! ORDEREDSUBJECT groups messages by base subject. The oldest message of
//! each group is the root and the rest are its children.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::command::{FetchAttribute, ThreadAlgorithm};
use crate::parser::MessageData;

use super::date;
use super::subject::base_subject;

/// Header section fetched for REFERENCES threading.
pub const REFERENCES_SECTION: &str = "HEADER.FIELDS (REFERENCES)";

/// One node of a thread tree. Dummy nodes have no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    /// Message number or UID; `None` for a placeholder root.
    pub id: Option<u32>,
    /// Replies, oldest first.
    pub children: Vec<ThreadNode>,
}

impl ThreadNode {
    /// A node without children.
    #[must_use]
    pub const fn leaf(id: u32) -> Self {
        Self {
            id: Some(id),
            children: Vec::new(),
        }
    }

    /// All message ids in the tree, depth first.
    #[must_use]
    pub fn ids(&self) -> Vec<u32> {
        let mut out = Vec::new();
        self.collect_ids(&mut out);
        out
    }

    fn collect_ids(&self, out: &mut Vec<u32>) {
        out.extend(self.id);
        for child in &self.children {
            child.collect_ids(out);
        }
    }
}

/// What threading needs to know about one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadInput {
    /// Message number or UID.
    pub id: u32,
    /// Normalized Message-ID.
    pub message_id: Option<String>,
    /// References, oldest first, with In-Reply-To as fallback.
    pub references: Vec<String>,
    /// Base subject.
    pub subject: String,
    /// Sent date in UTC seconds.
    pub date: Option<i64>,
}

impl ThreadInput {
    /// Extracts threading input from fetched message data.
    #[must_use]
    pub fn from_message(id: u32, message: &MessageData) -> Self {
        let envelope = message.envelope.as_ref();
        let message_id = envelope
            .and_then(|e| e.message_id.as_deref())
            .and_then(|raw| message_ids(raw).into_iter().next());

        let mut references = message
            .section(REFERENCES_SECTION)
            .map(|raw| message_ids(&String::from_utf8_lossy(raw)))
            .unwrap_or_default();
        if references.is_empty()
            && let Some(parent) = envelope
                .and_then(|e| e.in_reply_to.as_deref())
                .and_then(|raw| message_ids(raw).into_iter().next())
        {
            references.push(parent);
        }

        Self {
            id,
            message_id,
            references,
            subject: envelope
                .and_then(|e| e.subject.as_deref())
                .map(base_subject)
                .unwrap_or_default(),
            date: date::sent(message),
        }
    }
}

/// Extracts `<...>` message ids from a header value.
fn message_ids(raw: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else { break };
        let id = after[..end].trim();
        if !id.is_empty() {
            ids.push(format!("<{id}>"));
        }
        rest = &after[end + 1..];
    }
    ids
}

/// Attributes to fetch before threading with `algorithm`.
#[must_use]
pub fn fetch_attributes(algorithm: &ThreadAlgorithm) -> Vec<FetchAttribute> {
    let mut attrs = vec![FetchAttribute::Envelope, FetchAttribute::InternalDate];
    if matches!(algorithm, ThreadAlgorithm::References) {
        attrs.push(FetchAttribute::peek(REFERENCES_SECTION));
    }
    attrs
}

/// Threads messages with `algorithm`. Returns `None` for algorithms that
/// have no client implementation.
#[must_use]
pub fn thread_messages(algorithm: &ThreadAlgorithm, inputs: &[ThreadInput]) -> Option<Vec<ThreadNode>> {
    match algorithm {
        ThreadAlgorithm::References => Some(references(inputs)),
        ThreadAlgorithm::OrderedSubject => Some(ordered_subject(inputs)),
        ThreadAlgorithm::Other(_) => None,
    }
}

/// ORDEREDSUBJECT threading.
#[must_use]
pub fn ordered_subject(inputs: &[ThreadInput]) -> Vec<ThreadNode> {
    let mut groups: BTreeMap<String, Vec<&ThreadInput>> = BTreeMap::new();
    for input in inputs {
        groups
            .entry(input.subject.to_ascii_lowercase())
            .or_default()
            .push(input);
    }

    let mut threads: Vec<(Option<i64>, u32, ThreadNode)> = groups
        .into_values()
        .filter_map(|mut members| {
            members.sort_by_key(|m| (m.date, m.id));
            let (first, rest) = members.split_first()?;
            let node = ThreadNode {
                id: Some(first.id),
                children: rest.iter().map(|m| ThreadNode::leaf(m.id)).collect(),
            };
            Some((first.date, first.id, node))
        })
        .collect();
    threads.sort_by_key(|(date, id, _)| (*date, *id));
    threads.into_iter().map(|(_, _, node)| node).collect()
}

#[derive(Debug, Default)]
struct Container {
    message: Option<usize>,
    parent: Option<usize>,
}

struct Forest<'a> {
    inputs: &'a [ThreadInput],
    containers: Vec<Container>,
    by_id: HashMap<String, usize>,
}

impl<'a> Forest<'a> {
    fn new(inputs: &'a [ThreadInput]) -> Self {
        Self {
            inputs,
            containers: Vec::with_capacity(inputs.len()),
            by_id: HashMap::with_capacity(inputs.len()),
        }
    }

    fn alloc(&mut self) -> usize {
        self.containers.push(Container::default());
        self.containers.len() - 1
    }

    fn lookup(&mut self, message_id: &str) -> usize {
        if let Some(&c) = self.by_id.get(message_id) {
            return c;
        }
        let c = self.alloc();
        self.by_id.insert(message_id.to_string(), c);
        c
    }

    /// True if `ancestor` is `node` or reachable through its parents.
    fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut current = Some(node);
        let mut steps = 0;
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.containers.len() {
                return true;
            }
            current = self.containers[c].parent;
        }
        false
    }

    fn link(&mut self) {
        let inputs = self.inputs;
        for (index, input) in inputs.iter().enumerate() {
            // A repeated Message-ID is treated as if the message had none.
            let own = match &input.message_id {
                Some(mid) => {
                    let c = self.lookup(mid);
                    if self.containers[c].message.is_some() {
                        self.alloc()
                    } else {
                        c
                    }
                }
                None => self.alloc(),
            };
            self.containers[own].message = Some(index);

            let chain: Vec<usize> = input.references.iter().map(|r| self.lookup(r)).collect();
            for pair in chain.windows(2) {
                let (parent, child) = (pair[0], pair[1]);
                if self.containers[child].parent.is_none() && !self.is_ancestor(child, parent) {
                    self.containers[child].parent = Some(parent);
                }
            }

            self.containers[own].parent = match chain.last() {
                Some(&last) if !self.is_ancestor(own, last) => Some(last),
                _ => None,
            };
        }
    }

    fn build(self) -> Vec<ThreadNode> {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.containers.len()];
        let mut roots = Vec::new();
        for (c, container) in self.containers.iter().enumerate() {
            match container.parent {
                Some(p) => children[p].push(c),
                None => roots.push(c),
            }
        }

        let mut trees: Vec<Dated> = roots
            .into_iter()
            .flat_map(|r| self.prune(r, &children, true))
            .collect();
        sort_dated(&mut trees);
        trees.into_iter().map(|d| d.node).collect()
    }

    fn prune(&self, c: usize, children: &[Vec<usize>], is_root: bool) -> Vec<Dated> {
        let mut kids: Vec<Dated> = children[c]
            .iter()
            .flat_map(|&child| self.prune(child, children, false))
            .collect();
        sort_dated(&mut kids);

        if let Some(index) = self.containers[c].message {
            let input = &self.inputs[index];
            return vec![Dated {
                date: input.date,
                id: input.id,
                node: ThreadNode {
                    id: Some(input.id),
                    children: kids.into_iter().map(|d| d.node).collect(),
                },
            }];
        }

        if !is_root || kids.len() <= 1 {
            return kids;
        }
        let first = &kids[0];
        let (date, id) = (first.date, first.id);
        vec![Dated {
            date,
            id,
            node: ThreadNode {
                id: None,
                children: kids.into_iter().map(|d| d.node).collect(),
            },
        }]
    }
}

/// A subtree with the sort key of its root.
struct Dated {
    date: Option<i64>,
    id: u32,
    node: ThreadNode,
}

fn sort_dated(nodes: &mut [Dated]) {
    nodes.sort_by_key(|d| (d.date, d.id));
}

/// REFERENCES threading.
#[must_use]
pub fn references(inputs: &[ThreadInput]) -> Vec<ThreadNode> {
    let mut forest = Forest::new(inputs);
    forest.link();
    forest.build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::parser::Envelope;

    fn input(id: u32, mid: &str, refs: &[&str], date: i64) -> ThreadInput {
        ThreadInput {
            id,
            message_id: Some(mid.to_string()),
            references: refs.iter().map(|r| (*r).to_string()).collect(),
            subject: String::new(),
            date: Some(date),
        }
    }

    fn node(id: u32, children: Vec<ThreadNode>) -> ThreadNode {
        ThreadNode {
            id: Some(id),
            children,
        }
    }

    #[test]
    fn test_references_simple_chain() {
        let inputs = vec![
            input(1, "<a>", &[], 100),
            input(2, "<b>", &["<a>"], 200),
            input(3, "<c>", &["<a>", "<b>"], 300),
            input(4, "<d>", &[], 50),
        ];
        assert_eq!(
            references(&inputs),
            vec![ThreadNode::leaf(4), node(1, vec![node(2, vec![ThreadNode::leaf(3)])])]
        );
    }

    #[test]
    fn test_references_missing_parent_dummy() {
        // Both reply to a message that is not in the mailbox.
        let inputs = vec![
            input(5, "<x>", &["<gone>"], 200),
            input(3, "<y>", &["<gone>"], 100),
        ];
        assert_eq!(
            references(&inputs),
            vec![ThreadNode {
                id: None,
                children: vec![ThreadNode::leaf(3), ThreadNode::leaf(5)],
            }]
        );

        // A single orphan is promoted.
        let inputs = vec![input(7, "<x>", &["<gone>"], 100)];
        assert_eq!(references(&inputs), vec![ThreadNode::leaf(7)]);
    }

    #[test]
    fn test_references_non_root_dummy_promotes_children() {
        let inputs = vec![
            input(1, "<a>", &[], 100),
            input(2, "<c>", &["<a>", "<missing>"], 200),
        ];
        assert_eq!(references(&inputs), vec![node(1, vec![ThreadNode::leaf(2)])]);
    }

    #[test]
    fn test_references_duplicate_message_id_and_loop() {
        let inputs = vec![
            input(1, "<a>", &["<b>"], 100),
            input(2, "<b>", &["<a>"], 200),
            input(3, "<a>", &[], 300),
        ];
        let threads = references(&inputs);
        let mut ids: Vec<u32> = threads.iter().flat_map(ThreadNode::ids).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_ordered_subject() {
        let mut a = input(1, "<a>", &[], 300);
        a.subject = "Hello".into();
        let mut b = input(2, "<b>", &[], 100);
        b.subject = "hello".into();
        let mut c = input(3, "<c>", &[], 200);
        c.subject = "Other".into();
        assert_eq!(
            ordered_subject(&[a, b, c]),
            vec![node(2, vec![ThreadNode::leaf(1)]), ThreadNode::leaf(3)]
        );
    }

    #[test]
    fn test_input_from_message() {
        let mut message = MessageData {
            envelope: Some(Envelope {
                subject: Some("Re: [list] Plans".into()),
                message_id: Some("<m2@host>".into()),
                in_reply_to: Some("<m1@host>".into()),
                date: Some("Thu, 2 Jan 2020 00:00:00 +0000".into()),
                ..Envelope::default()
            }),
            ..MessageData::default()
        };
        let parsed = ThreadInput::from_message(9, &message);
        assert_eq!(parsed.message_id.as_deref(), Some("<m2@host>"));
        assert_eq!(parsed.references, vec!["<m1@host>".to_string()]);
        assert_eq!(parsed.subject, "Plans");
        assert_eq!(parsed.date, Some(1_577_923_200));

        message.sections.insert(
            REFERENCES_SECTION.to_string(),
            b"References: <m0@host>\r\n <m1@host>\r\n\r\n".to_vec(),
        );
        let parsed = ThreadInput::from_message(9, &message);
        assert_eq!(parsed.references, vec!["<m0@host>".to_string(), "<m1@host>".to_string()]);
    }

    #[test]
    fn test_unsupported_algorithm() {
        assert!(thread_messages(&ThreadAlgorithm::Other("X".into()), &[]).is_none());
        assert_eq!(fetch_attributes(&ThreadAlgorithm::References).len(), 3);
        assert_eq!(fetch_attributes(&ThreadAlgorithm::OrderedSubject).len(), 2);
    }
}
