//! Groups report rows by their ring key. Keys are compared after whitespace
//! normalization so values that differ only in spacing land in one group.

use crate::helpers::text::blank_if_nan;
use crate::helpers::text::collapse_whitespace;
use crate::sheet::Table;
use std::collections::BTreeMap;

/// One document group: every row that shares a normalized ring key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Group {
    /// Normalized ring key
    pub(crate) key: String,
    /// Document title, taken from the group's first row
    pub(crate) title: String,
    /// Row indexes into the source table, in sheet order
    pub(crate) rows: Vec<usize>,
}

/// Partitions table rows into groups keyed by the ring column, ordered by key.
/// Rows whose ring value normalizes to empty are dropped. A blank or "nan"
/// title falls back to `Doc - {key}`.
pub(crate) fn partition(table: &Table, ring_col: usize, title_col: usize) -> Vec<Group> {
    let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for index in 0..table.rows.len() {
        let key = collapse_whitespace(table.value(index, ring_col));
        if key.is_empty() || key.eq_ignore_ascii_case("nan") {
            continue;
        }
        buckets.entry(key).or_default().push(index);
    }
    buckets
        .into_iter()
        .map(|(key, rows)| {
            let first = rows[0];
            let mut title = blank_if_nan(table.value(first, title_col).trim()).to_owned();
            if title.is_empty() {
                title = format!("Doc - {key}");
            }
            Group { key, title, rows }
        })
        .collect()
}
