//! Client-side SORT and THREAD.
//!
//! Used when the server lacks the SORT or THREAD capability. The session
//! fetches the attributes each key needs and hands the messages here.

mod collate;
pub mod date;
mod subject;
mod thread;

use std::cmp::Ordering;

pub use collate::{ByteCollator, Collator, FoldingCollator};
pub use subject::base_subject;
pub use thread::{
    REFERENCES_SECTION, ThreadInput, ThreadNode, fetch_attributes as thread_fetch_attributes,
    ordered_subject, references, thread_messages,
};

use crate::command::{FetchAttribute, SortCriterion, SortKey};
use crate::parser::{Address, MessageData};

/// Attributes to fetch before sorting by `keys`.
#[must_use]
pub fn fetch_attributes(keys: &[SortCriterion]) -> Vec<FetchAttribute> {
    let mut attrs = Vec::new();
    let mut push = |attr: FetchAttribute| {
        if !attrs.contains(&attr) {
            attrs.push(attr);
        }
    };
    for criterion in keys {
        match criterion.key {
            SortKey::Arrival => push(FetchAttribute::InternalDate),
            SortKey::Date => {
                push(FetchAttribute::Envelope);
                push(FetchAttribute::InternalDate);
            }
            SortKey::Size => push(FetchAttribute::Rfc822Size),
            SortKey::Cc
            | SortKey::From
            | SortKey::Subject
            | SortKey::To
            | SortKey::DisplayFrom
            | SortKey::DisplayTo => push(FetchAttribute::Envelope),
        }
    }
    attrs
}

enum KeyValue {
    Number(Option<i64>),
    Text(Option<String>),
}

fn first_address(list: &[Address]) -> Option<&Address> {
    list.iter().find(|a| !a.is_group_marker())
}

fn address_key(list: &[Address]) -> Option<String> {
    first_address(list).and_then(|a| a.mailbox.clone())
}

/// RFC 5957: the display name, or `mailbox@host` when there is none.
fn display_key(list: &[Address]) -> Option<String> {
    let address = first_address(list)?;
    address
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| address.email())
        .or_else(|| address.mailbox.clone())
}

fn key_value(key: SortKey, message: &MessageData) -> KeyValue {
    let envelope = message.envelope.as_ref();
    match key {
        SortKey::Arrival => KeyValue::Number(date::arrival(message)),
        SortKey::Date => KeyValue::Number(date::sent(message)),
        SortKey::Size => KeyValue::Number(message.size.map(i64::from)),
        SortKey::Subject => KeyValue::Text(
            envelope
                .and_then(|e| e.subject.as_deref())
                .map(base_subject),
        ),
        SortKey::From => KeyValue::Text(envelope.and_then(|e| address_key(&e.from))),
        SortKey::To => KeyValue::Text(envelope.and_then(|e| address_key(&e.to))),
        SortKey::Cc => KeyValue::Text(envelope.and_then(|e| address_key(&e.cc))),
        SortKey::DisplayFrom => KeyValue::Text(envelope.and_then(|e| display_key(&e.from))),
        SortKey::DisplayTo => KeyValue::Text(envelope.and_then(|e| display_key(&e.to))),
    }
}

fn compare_values(a: &KeyValue, b: &KeyValue, collator: &dyn Collator) -> Ordering {
    match (a, b) {
        (KeyValue::Number(a), KeyValue::Number(b)) => a.cmp(b),
        (KeyValue::Text(Some(a)), KeyValue::Text(Some(b))) => collator.compare(a, b),
        (KeyValue::Text(a), KeyValue::Text(b)) => a.is_some().cmp(&b.is_some()),
        _ => Ordering::Equal,
    }
}

/// Sorts `(id, data)` pairs and returns the ids in order.
///
/// Keys apply left to right, each reversed on its own. Missing values sort
/// lowest; ties after every key fall back to ascending id.
#[must_use]
pub fn sort_messages(
    messages: &[(u32, MessageData)],
    keys: &[SortCriterion],
    collator: &dyn Collator,
) -> Vec<u32> {
    let mut rows: Vec<(u32, Vec<KeyValue>)> = messages
        .iter()
        .map(|(id, data)| (*id, keys.iter().map(|k| key_value(k.key, data)).collect()))
        .collect();

    rows.sort_by(|(a_id, a), (b_id, b)| {
        keys.iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(criterion, (a, b))| {
                let ord = compare_values(a, b, collator);
                if criterion.reverse { ord.reverse() } else { ord }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| a_id.cmp(b_id))
    });
    rows.into_iter().map(|(id, _)| id).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::parser::Envelope;

    fn mailbox(name: Option<&str>, local: &str) -> Address {
        Address {
            name: name.map(str::to_string),
            adl: None,
            mailbox: Some(local.to_string()),
            host: Some("example.com".to_string()),
        }
    }

    fn message(subject: &str, from: Address, size: u32, date: &str) -> MessageData {
        MessageData {
            envelope: Some(Envelope {
                subject: Some(subject.to_string()),
                from: vec![from],
                date: Some(date.to_string()),
                ..Envelope::default()
            }),
            size: Some(size),
            ..MessageData::default()
        }
    }

    fn sample() -> Vec<(u32, MessageData)> {
        vec![
            (1, message("Re: beta", mailbox(Some("Zed"), "alice"), 300, "Wed, 1 Jan 2020 10:00:00 +0000")),
            (2, message("alpha", mailbox(None, "carol"), 100, "Wed, 1 Jan 2020 09:00:00 +0000")),
            (3, message("Beta", mailbox(Some("Amy"), "bob"), 200, "Wed, 1 Jan 2020 11:00:00 +0000")),
        ]
    }

    #[test]
    fn test_sort_by_subject_then_reverse_date() {
        let keys = [SortCriterion::asc(SortKey::Subject), SortCriterion::desc(SortKey::Date)];
        assert_eq!(sort_messages(&sample(), &keys, &FoldingCollator), vec![2, 3, 1]);
        // Byte order puts "Beta" before "alpha" and "beta".
        assert_eq!(sort_messages(&sample(), &keys, &ByteCollator), vec![3, 2, 1]);
    }

    #[test]
    fn test_sort_by_size_and_from() {
        let by_size = [SortCriterion::desc(SortKey::Size)];
        assert_eq!(sort_messages(&sample(), &by_size, &ByteCollator), vec![1, 3, 2]);
        let by_from = [SortCriterion::asc(SortKey::From)];
        assert_eq!(sort_messages(&sample(), &by_from, &ByteCollator), vec![1, 3, 2]);
    }

    #[test]
    fn test_display_from_uses_name_then_address() {
        let keys = [SortCriterion::asc(SortKey::DisplayFrom)];
        // "Amy" < "Zed" < "carol@example.com" byte-wise.
        assert_eq!(sort_messages(&sample(), &keys, &ByteCollator), vec![3, 1, 2]);
    }

    #[test]
    fn test_missing_values_sort_first_and_ties_by_id() {
        let mut messages = sample();
        messages.push((9, MessageData::default()));
        messages.push((4, MessageData::default()));
        let keys = [SortCriterion::asc(SortKey::Arrival)];
        assert_eq!(sort_messages(&messages, &keys, &ByteCollator), vec![1, 2, 3, 4, 9]);
        let keys = [SortCriterion::asc(SortKey::Subject)];
        assert_eq!(sort_messages(&messages, &keys, &FoldingCollator), vec![4, 9, 2, 3, 1]);
    }

    #[test]
    fn test_fetch_attributes_deduplicated() {
        let keys = [
            SortCriterion::asc(SortKey::Date),
            SortCriterion::asc(SortKey::From),
            SortCriterion::asc(SortKey::Size),
        ];
        assert_eq!(
            fetch_attributes(&keys),
            vec![
                FetchAttribute::Envelope,
                FetchAttribute::InternalDate,
                FetchAttribute::Rfc822Size,
            ]
        );
    }
}
