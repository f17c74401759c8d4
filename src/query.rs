//! Filtering and pagination over a cached snapshot.

use crate::types::{CachedItem, Item, ItemKey, Page};

/// A list request: optional name filter plus an offset/limit window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Build a query from raw textual parameters, dropping bounds that are
    /// negative or not numbers.
    pub fn from_raw(filter: Option<&str>, offset: Option<&str>, limit: Option<&str>) -> Self {
        Self {
            filter: filter.map(str::to_string),
            offset: offset.and_then(parse_bound),
            limit: limit.and_then(parse_bound),
        }
    }

    /// Like `from_raw`, for callers that already have integers.
    pub fn from_ints(filter: Option<String>, offset: Option<i64>, limit: Option<i64>) -> Self {
        let bound = |v: Option<i64>| v.and_then(|n| usize::try_from(n).ok());
        Self {
            filter,
            offset: bound(offset),
            limit: bound(limit),
        }
    }
}

/// Lenient integer parse: leading whitespace, optional sign, then the leading
/// run of digits. `"12abc"` is 12; `"-1"`, `"abc"` and `""` are absent.
pub fn parse_bound(raw: &str) -> Option<usize> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let digits = &digits[..end];
    if negative {
        // "-0" is zero, any other negative number is ignored
        return digits.bytes().all(|b| b == b'0').then_some(0);
    }
    // Overflowing values clamp to the end of the collection anyway.
    Some(digits.parse::<usize>().unwrap_or(usize::MAX))
}

/// Apply the filter, count the matches, then cut out the requested window.
pub fn run(items: &[CachedItem], query: &ListQuery) -> Page {
    let needle = query
        .filter
        .as_deref()
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    let matches: Vec<&CachedItem> = match &needle {
        Some(needle) => items
            .iter()
            .filter(|item| item.name_lower().contains(needle.as_str()))
            .collect(),
        None => items.iter().collect(),
    };

    let total = matches.len();
    let start = query.offset.unwrap_or(0).min(total);
    let end = match query.limit {
        Some(limit) => start.saturating_add(limit).min(total),
        None => total,
    };

    Page {
        items: matches[start..end].iter().map(|c| c.to_item()).collect(),
        total,
    }
}

pub fn find(items: &[CachedItem], key: &ItemKey) -> Option<Item> {
    items
        .iter()
        .find(|c| c.item().id().is_some_and(|id| key.matches(id)))
        .map(CachedItem::to_item)
}
