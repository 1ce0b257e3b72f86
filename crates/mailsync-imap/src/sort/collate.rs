//! String collation for client-side sorting.
//!
//! A [`Collator`] is built once and handed to the session and the sort
//! functions, so two sessions can sort with different rules.

use std::cmp::Ordering;

/// Compares sort-key strings.
pub trait Collator: Send + Sync {
    /// Compares two strings.
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Byte-wise comparison. Deterministic across platforms and locales.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteCollator;

impl Collator for ByteCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }
}

/// Case- and accent-insensitive comparison for Latin script.
///
/// Strings that fold to the same text are ordered byte-wise, so the order
/// is still total.
#[derive(Debug, Default, Clone, Copy)]
pub struct FoldingCollator;

impl FoldingCollator {
    /// Returns the folded form of `s`.
    #[must_use]
    pub fn fold(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match fold_char(c) {
                Folded::One(f) => out.extend(f.to_lowercase()),
                Folded::Two(a, b) => {
                    out.push(a);
                    out.push(b);
                }
            }
        }
        out
    }
}

impl Collator for FoldingCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        Self::fold(a)
            .cmp(&Self::fold(b))
            .then_with(|| a.as_bytes().cmp(b.as_bytes()))
    }
}

enum Folded {
    One(char),
    Two(char, char),
}

fn fold_char(c: char) -> Folded {
    let base = match c {
        'À'..='Å' | 'à'..='å' | 'Ā' | 'ā' | 'Ă' | 'ă' | 'Ą' | 'ą' => 'a',
        'Ç' | 'ç' | 'Ć' | 'ć' | 'Ĉ' | 'ĉ' | 'Ċ' | 'ċ' | 'Č' | 'č' => 'c',
        'Ď' | 'ď' | 'Đ' | 'đ' | 'Ð' | 'ð' => 'd',
        'È'..='Ë' | 'è'..='ë' | 'Ē' | 'ē' | 'Ĕ' | 'ĕ' | 'Ė' | 'ė' | 'Ę' | 'ę' | 'Ě' | 'ě' => {
            'e'
        }
        'Ĝ' | 'ĝ' | 'Ğ' | 'ğ' | 'Ġ' | 'ġ' | 'Ģ' | 'ģ' => 'g',
        'Ĥ' | 'ĥ' | 'Ħ' | 'ħ' => 'h',
        'Ì'..='Ï' | 'ì'..='ï' | 'Ĩ' | 'ĩ' | 'Ī' | 'ī' | 'Ĭ' | 'ĭ' | 'Į' | 'į' | 'İ' | 'ı' => {
            'i'
        }
        'Ĵ' | 'ĵ' => 'j',
        'Ķ' | 'ķ' => 'k',
        'Ĺ' | 'ĺ' | 'Ļ' | 'ļ' | 'Ľ' | 'ľ' | 'Ŀ' | 'ŀ' | 'Ł' | 'ł' => 'l',
        'Ñ' | 'ñ' | 'Ń' | 'ń' | 'Ņ' | 'ņ' | 'Ň' | 'ň' => 'n',
        'Ò'..='Ö' | 'Ø' | 'ò'..='ö' | 'ø' | 'Ō' | 'ō' | 'Ŏ' | 'ŏ' | 'Ő' | 'ő' => 'o',
        'Ŕ' | 'ŕ' | 'Ŗ' | 'ŗ' | 'Ř' | 'ř' => 'r',
        'Ś' | 'ś' | 'Ŝ' | 'ŝ' | 'Ş' | 'ş' | 'Š' | 'š' => 's',
        'Ţ' | 'ţ' | 'Ť' | 'ť' | 'Ŧ' | 'ŧ' => 't',
        'Ù'..='Ü' | 'ù'..='ü' | 'Ũ' | 'ũ' | 'Ū' | 'ū' | 'Ŭ' | 'ŭ' | 'Ů' | 'ů' | 'Ű' | 'ű' | 'Ų'
        | 'ų' => 'u',
        'Ŵ' | 'ŵ' => 'w',
        'Ý' | 'ý' | 'ÿ' | 'Ŷ' | 'ŷ' | 'Ÿ' => 'y',
        'Ź' | 'ź' | 'Ż' | 'ż' | 'Ž' | 'ž' => 'z',
        'Þ' | 'þ' => return Folded::Two('t', 'h'),
        'ß' => return Folded::Two('s', 's'),
        'Æ' | 'æ' => return Folded::Two('a', 'e'),
        'Œ' | 'œ' => return Folded::Two('o', 'e'),
        other => other,
    };
    Folded::One(base)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_collator() {
        let c = ByteCollator;
        assert_eq!(c.compare("B", "a"), Ordering::Less);
        assert_eq!(c.compare("a", "a"), Ordering::Equal);
    }

    #[test]
    fn test_folding_ignores_case_and_accents() {
        let c = FoldingCollator;
        assert_eq!(FoldingCollator::fold("Élan Straße"), "elan strasse");
        assert_eq!(c.compare("apple", "Banana"), Ordering::Less);
        assert_eq!(c.compare("émile", "Eve"), Ordering::Less);
        assert_eq!(c.compare("zoë", "Zoe"), Ordering::Greater);
    }

    #[test]
    fn test_folding_tiebreak_is_total() {
        let c = FoldingCollator;
        assert_ne!(c.compare("Resume", "résumé"), Ordering::Equal);
        assert_eq!(c.compare("same", "same"), Ordering::Equal);
    }
}
