//! Report auto-fill helpers. Columns are located by forgiving substring
//! aliases, reference sheets become lookup maps, and the topology sheet's
//! chains answer nearest-aggregation-node queries.

use crate::error::RingdocError;
use crate::helpers::text::blank_if_nan;
use crate::sheet::SheetError;
use crate::sheet::Table;
use std::collections::HashMap;

pub(crate) const SITE_ID_ALIASES: &[&str] = &["site id", "site_id", "siteid"];
pub(crate) const HOSTNAME_ALIASES: &[&str] = &["hostname", "ne name", "nename"];
pub(crate) const NE_NAME_ALIASES: &[&str] = &["ne name", "nename"];
pub(crate) const SUBNET_ALIASES: &[&str] = &["subnet"];
pub(crate) const RING_ALIASES: &[&str] = &["ring"];
pub(crate) const PAG_ALIASES: &[&str] = &["pag"];
pub(crate) const CAG_ALIASES: &[&str] = &["c/ag", "cag"];

const NOT_FOUND_LIMIT: usize = 20;

/// What a fill pass did: rows filled plus the first unmatched keys.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct FillOutcome {
    pub(crate) filled: usize,
    pub(crate) not_found: Vec<String>,
}

/// Result of a nearest-aggregation-node search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Nearest {
    Found(String),
    /// The host appears in a chain, but no chain holding it has a candidate
    NoCandidate,
    /// The host appears in no chain at all
    NotInChains,
}

/// Finds the first column whose trimmed, lowercased header contains one of
/// the aliases.
pub(crate) fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.trim().to_lowercase();
        aliases.iter().any(|alias| header.contains(alias))
    })
}

/// Like [`find_column`], but failing with the sheet's available columns.
pub(crate) fn require_column(table: &Table, label: &str, aliases: &[&str]) -> Result<usize, RingdocError> {
    find_column(&table.headers, aliases).ok_or_else(|| {
        SheetError::SchemaError(table.name.to_owned(), label.to_owned(), table.headers.join(", ")).into()
    })
}

/// Builds a lookup map from a reference sheet: keys trimmed and lowercased,
/// blank and placeholder keys skipped, later rows overriding earlier ones.
pub(crate) fn build_lookup(table: &Table, key_col: usize, value_col: usize) -> HashMap<String, String> {
    let mut lookup = HashMap::new();
    for index in 0..table.rows.len() {
        let key = table.value(index, key_col).trim().to_lowercase();
        if key.is_empty() || key == "nan" {
            continue;
        }
        let value = blank_if_nan(table.value(index, value_col).trim()).to_owned();
        lookup.insert(key, value);
    }
    lookup
}

/// Fills empty target cells by looking the key column up in the map. Rows
/// whose target already holds a value are left alone; keys that miss (or hit
/// an empty value) are reported back, deduplicated and capped.
pub(crate) fn fill_column(
    table: &mut Table,
    key_col: usize,
    target_col: usize,
    lookup: &HashMap<String, String>,
) -> FillOutcome {
    let mut outcome = FillOutcome::default();
    for index in 0..table.rows.len() {
        let key_display = table.value(index, key_col).trim().to_owned();
        let key = key_display.to_lowercase();
        if key.is_empty() || key == "nan" {
            continue;
        }
        if !blank_if_nan(table.value(index, target_col).trim()).is_empty() {
            continue;
        }
        match lookup.get(&key).filter(|value| !value.is_empty()) {
            Some(value) => {
                table.rows[index][target_col] = value.to_owned();
                outcome.filled += 1;
            }
            None => {
                if !outcome.not_found.contains(&key_display) && outcome.not_found.len() < NOT_FOUND_LIMIT {
                    outcome.not_found.push(key_display);
                }
            }
        }
    }
    outcome
}

/// Collects topology chains from a headerless grid, reading column by column.
/// Every cell holding a comma-separated list of at least two hostnames is one
/// chain.
pub(crate) fn topology_chains(grid: &[Vec<String>]) -> Vec<Vec<String>> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let mut chains = Vec::new();
    for column in 0..width {
        for row in grid {
            if let Some(cell) = row.get(column) {
                if cell.contains(',') {
                    let chain: Vec<String> = cell
                        .split(',')
                        .map(str::trim)
                        .filter(|host| !host.is_empty())
                        .map(str::to_owned)
                        .collect();
                    if chain.len() >= 2 {
                        chains.push(chain);
                    }
                }
            }
        }
    }
    chains
}

/// Finds the aggregation node nearest to the host. The first chain holding
/// the host and a candidate decides; candidates carry an `AG-` or `C-` prefix
/// (case matters), and on equal distance the left neighbor wins.
pub(crate) fn find_nearest_cag(chains: &[Vec<String>], host: &str) -> Nearest {
    let mut seen_host = false;
    for chain in chains {
        let position = match chain.iter().position(|node| node == host) {
            Some(position) => position,
            None => continue,
        };
        seen_host = true;

        let mut left = None;
        let mut right = None;
        for (index, node) in chain.iter().enumerate() {
            if index == position || !(node.starts_with("AG-") || node.starts_with("C-")) {
                continue;
            }
            if index < position {
                left = Some(index);
            } else if right.is_none() {
                right = Some(index);
            }
        }
        let candidate = match (left, right) {
            (Some(left), Some(right)) => {
                if position - left <= right - position {
                    Some(left)
                } else {
                    Some(right)
                }
            }
            (Some(left), None) => Some(left),
            (None, Some(right)) => Some(right),
            (None, None) => None,
        };
        if let Some(index) = candidate {
            return Nearest::Found(chain[index].to_owned());
        }
    }
    if seen_host {
        Nearest::NoCandidate
    } else {
        Nearest::NotInChains
    }
}

/// Fills empty target cells with the nearest aggregation node of the key
/// column's host. Returns how many rows were filled.
pub(crate) fn fill_nearest(table: &mut Table, key_col: usize, target_col: usize, chains: &[Vec<String>]) -> usize {
    let mut filled = 0;
    for index in 0..table.rows.len() {
        let host = table.value(index, key_col).trim().to_owned();
        if host.is_empty() || host.eq_ignore_ascii_case("nan") {
            continue;
        }
        if !blank_if_nan(table.value(index, target_col).trim()).is_empty() {
            continue;
        }
        if let Nearest::Found(candidate) = find_nearest_cag(chains, &host) {
            table.rows[index][target_col] = candidate;
            filled += 1;
        }
    }
    filled
}
