//! Spreadsheet access: reading XLSX sheets into row-oriented string tables and
//! writing filled tables back out. Every cell value is coerced to text so that
//! identifiers keep their leading zeros and mixed-type columns stay uniform.

use crate::helpers::text::blank_if_nan;
use thiserror::Error;

pub(crate) mod cell;
pub(crate) mod writer;
pub(crate) mod xlsx;

/// Errors raised while locating or validating sheet data.
#[derive(Error, Debug)]
pub(crate) enum SheetError {
    #[error("Workbook '{0}' is missing part '{1}'")]
    MissingPartError(String, String),

    #[error("Workbook '{0}' contains no sheets")]
    WorkbookEmptyError(String),

    #[error("Sheet '{1}' not found in '{0}'; available sheets: {2}")]
    SheetNotFoundError(String, String, String),

    #[error("Sheet '{0}' is missing required columns: {1}; available columns: {2}")]
    SchemaError(String, String, String),
}

/// A sheet loaded as a header list plus rows of text fields.
/// Header names are trimmed; duplicates get a numeric suffix so that every
/// column name is addressable. Rows are padded to the header width.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub(crate) name: String,
    pub(crate) headers: Vec<String>,
    pub(crate) rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn new(name: &str, headers: Vec<String>, mut rows: Vec<Vec<String>>) -> Table {
        let headers = dedup_headers(headers);
        for row in &mut rows {
            row.resize(headers.len(), String::new());
        }
        Table {
            name: name.to_owned(),
            headers,
            rows,
        }
    }

    /// Finds the position of a column by its exact header name.
    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Returns a cell value by row and column index.
    pub(crate) fn value(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|fields| fields.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Returns a cell value with the "nan" missing-value marker blanked.
    pub(crate) fn clean_value(&self, row: usize, column: usize) -> &str {
        blank_if_nan(self.value(row, column))
    }

    /// Verifies that every required column exists in the header set.
    /// The error lists both the missing and the available columns so a bad
    /// source file can be diagnosed without opening it.
    pub(crate) fn require_columns<'a, I>(&self, required: I) -> Result<(), SheetError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let missing: Vec<&str> = required
            .into_iter()
            .filter(|name| self.column_index(name).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SheetError::SchemaError(
                self.name.to_owned(),
                missing.join(", "),
                self.headers.join(", "),
            ))
        }
    }
}

/// Trims header names and disambiguates duplicates with ".1", ".2", ... suffixes.
fn dedup_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashMap::<String, usize>::new();
    headers
        .into_iter()
        .map(|header| {
            let name = header.trim().to_owned();
            match seen.get_mut(&name) {
                None => {
                    seen.insert(name.clone(), 0);
                    name
                }
                Some(count) => {
                    *count += 1;
                    format!("{}.{}", name, count)
                }
            }
        })
        .collect()
}
