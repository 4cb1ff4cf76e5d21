//! Remainder-aware distribution of identifiers.

use std::collections::HashSet;

/// Split `n` items over `parts` buckets: each gets `n / parts`, and the last
/// `n % parts` buckets get one extra. Sums to `n` exactly.
pub fn split_evenly(n: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = n / parts;
    let remainder = n % parts;
    (0..parts)
        .map(|i| if i >= parts - remainder { base + 1 } else { base })
        .collect()
}

/// Slice `items` into consecutive chunks sized by [`split_evenly`].
pub fn partition<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    let mut rest = items;
    split_evenly(items.len(), parts)
        .into_iter()
        .map(|count| {
            let (head, tail) = rest.split_at(count);
            rest = tail;
            head
        })
        .collect()
}

/// Identifiers after cleaning, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanIdentifiers {
    pub identifiers: Vec<String>,
    pub duplicates: usize,
    pub blanks: usize,
}

/// Trim identifiers, drop blanks, and keep the first occurrence of each.
pub fn clean_identifiers<I, S>(raw: I) -> CleanIdentifiers
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut clean = CleanIdentifiers::default();
    for value in raw {
        let id = value.as_ref().trim();
        if id.is_empty() {
            clean.blanks += 1;
        } else if seen.insert(id.to_string()) {
            clean.identifiers.push(id.to_string());
        } else {
            clean.duplicates += 1;
        }
    }
    clean
}
