//! Header row parsing.

use snafu::prelude::*;
use std::collections::HashSet;

use crate::error::{EmptyHeaderSnafu, InvalidHeaderSnafu, ParseHeaderSnafu, ReconcileError};

const BOM: char = '\u{feff}';

/// Parse the first line of a file into trimmed column names.
///
/// Fails when the line is blank, a column name is empty, or a name repeats.
/// Names are created as quoted identifiers, so `Name` and `NAME` are distinct.
pub fn parse_header(
    key: &str,
    line: &str,
    delimiter: u8,
    quote: u8,
) -> Result<Vec<String>, ReconcileError> {
    let line = line.strip_prefix(BOM).unwrap_or(line);
    ensure!(!line.trim().is_empty(), EmptyHeaderSnafu { key });

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .quote(quote)
        .from_reader(line.as_bytes());

    let record = match reader.records().next() {
        Some(record) => record.context(ParseHeaderSnafu { key })?,
        None => return EmptyHeaderSnafu { key }.fail(),
    };

    let columns: Vec<String> = record.iter().map(|field| field.trim().to_string()).collect();
    ensure!(!columns.is_empty(), EmptyHeaderSnafu { key });

    if let Some(position) = columns.iter().position(|name| name.is_empty()) {
        return InvalidHeaderSnafu {
            key,
            reason: format!("column {} has no name", position + 1),
        }
        .fail();
    }

    let mut seen = HashSet::new();
    for name in &columns {
        ensure!(
            seen.insert(name.as_str()),
            InvalidHeaderSnafu {
                key,
                reason: format!("duplicate column '{name}'"),
            }
        );
    }

    Ok(columns)
}
